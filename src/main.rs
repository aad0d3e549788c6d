//! Katamari entry point
//!
//! Installs logging, then hands everything else to the CLI module.

use katamari::{cli, observability};

fn main() {
    observability::init();

    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
