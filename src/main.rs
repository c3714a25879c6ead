use clap::Parser;

use artrelief::{cli, logger};

fn main() -> std::process::ExitCode {
    let args = cli::CliArgs::parse();

    // Session log (overwrites previous session log)
    logger::init(args.verbose);
    if let Some(path) = logger::log_path() {
        log::debug!("logging to {}", path.display());
    }

    cli::run(args)
}
