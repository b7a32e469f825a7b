mod cli;

use crate::cli::CliCommand;

fn main() {
    let logging_opts = fget_core::logging::LoggingOptions {
        log_to_console: true,
        ..Default::default()
    };
    fget_core::logging::init_logging(logging_opts).expect("failed to initialize logging");

    if let Err(err) = CliCommand::run_from_args() {
        eprintln!("fget error: {:#}", err);
        std::process::exit(1);
    }
}
