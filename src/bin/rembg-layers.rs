//! rembg-layers command-line tool
//!
//! Removes image backgrounds with rembg and applies the result as layers,
//! masks and square canvases.

#[cfg(feature = "cli")]
use rembg_layers::cli;

#[cfg(feature = "cli")]
fn main() -> anyhow::Result<()> {
    cli::main()
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
