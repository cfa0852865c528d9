use clap::Parser;
use stratsim::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
