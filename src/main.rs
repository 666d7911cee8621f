//! clip CLI: run a pipeline of entry operations.

use clap::Parser;
use clip_kernel::cli::{self, Cli};

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => 0,
                _ => 3,
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };
    cli::setup_tracing(cli.verbose);
    std::process::exit(cli::run(cli));
}
