fn main() -> Result<(), Box<dyn std::error::Error>> {
    let fds = protox::compile(["proto/ohlc.proto"], ["proto"])?;
    tonic_build::compile_fds(fds)?;
    Ok(())
}
