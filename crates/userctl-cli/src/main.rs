//! `userctl`: manage Samba users and groups stored in an LDAP directory.

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::Cli;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = cli::parse_exit_code(&err);
            if let Err(io_err) = err.print() {
                eprintln!("ERROR: could not print usage: {io_err}");
            }
            std::process::exit(code);
        }
    };

    init_tracing(cli.verbosity());

    match cli::execute(cli).await {
        Ok(Some(report)) => println!("{report}"),
        Ok(None) => {}
        Err(err) => {
            if err.should_log() {
                error!(code = err.error_code(), "command failed");
            }
            eprintln!("ERROR: {err}");
            std::process::exit(1);
        }
    }
}

fn init_tracing(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
