//! Mural Restoration CLI Tool
//!
//! Command-line interface for the mural-restore library: restores marked
//! regions of an image through the patch pipeline and generates patch
//! training datasets.

#[cfg(feature = "cli")]
use mural_restore::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> mural_restore::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
