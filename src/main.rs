mod args;
mod report;

use clap::Parser;
use log::{debug, info};
use snafu::ErrorCompat;

use crate::args::Args;

fn main() {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
    debug!("args: {:?}", args);

    match report::run_report(&args) {
        Ok(()) => {
            info!("done");
        }
        Err(e) => {
            eprintln!("An error occured: {}", e);
            if let Some(bt) = ErrorCompat::backtrace(&e) {
                debug!("trace: {}", bt);
            }
            std::process::exit(e.exit_code());
        }
    }
}
