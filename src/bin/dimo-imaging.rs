//! dimo-imaging CLI tool
//!
//! Command-line interface for the image-editing engine: object removal,
//! background keying, contour clipping, halftones, watermarks and upscaling.

#[cfg(feature = "cli")]
use dimo_imaging::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
