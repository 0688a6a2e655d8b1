//! `remedy` binary

#![warn(unreachable_pub)]

mod cli;
mod commands;

use tracing_subscriber::EnvFilter;

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() {
    let matches = cli::command().get_matches();
    init_logging(matches.get_flag("log-json"));

    let outcome = match matches.subcommand() {
        Some(("run", args)) => commands::run(args).await,
        Some(("verify-chain", args)) => commands::verify_chain(args),
        Some(("restore", args)) => commands::restore(args),
        Some(("trust", args)) => commands::trust(args),
        Some(("snapshots", args)) => commands::snapshots(args),
        _ => Ok(commands::EXIT_FATAL),
    };

    let code = match outcome {
        Ok(code) => code,
        Err(err) => {
            eprintln!("remedy: {err:#}");
            commands::EXIT_FATAL
        }
    };
    std::process::exit(code);
}
