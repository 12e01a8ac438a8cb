use clap::Parser;

use release_watcher::cli_app::{Cli, run};

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(&cli) {
        eprintln!("rwatch: {err}");
        std::process::exit(1);
    }
}
