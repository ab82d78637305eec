//! Command Line Interface module
//!
//! The service exposes a single entry point; the flags only override where
//! configuration comes from and how loudly it logs.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "ohlc-service")]
#[command(about = "Real-time OHLC aggregation and streaming service")]
#[command(version)]
pub struct Cli {
    /// Configuration file path (overrides the ENV-derived default)
    #[arg(long)]
    pub config_file: Option<String>,

    /// Log level (trace, debug, info, warn, error); overrides configuration
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_empty() {
        let cli = Cli::parse_from(["ohlc-service"]);
        assert!(cli.config_file.is_none());
        assert!(cli.log_level.is_none());
    }

    #[test]
    fn test_overrides_parse() {
        let cli = Cli::parse_from([
            "ohlc-service",
            "--config-file",
            "config/prod.toml",
            "--log-level",
            "debug",
        ]);
        assert_eq!(cli.config_file.as_deref(), Some("config/prod.toml"));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }
}
