//! This is the main entry point for azbridge.

use azbridge::cli;

fn main() {
    if let Err(e) = cli::parse(None) {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}
