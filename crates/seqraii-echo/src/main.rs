mod cli;
mod error;
mod server;

use std::process::ExitCode;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cli::Cli;
use crate::error::{EchoError, Result};
use crate::server::{EchoServer, EchoSummary};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(summary) => {
            info!(
                echoed = summary.echoed,
                stop = ?summary.stop,
                "echo server stopped"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            print_error(&e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<EchoSummary> {
    let mut server = EchoServer::open(cli.address())?;
    info!(addr = %server.local_addr()?, "listening");

    let summary = server.serve(&cli.options())?;
    server.shutdown();
    Ok(summary)
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_error(error: &EchoError) {
    eprintln!("error: {error}");

    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        eprintln!("caused by: {cause}");
        source = std::error::Error::source(cause);
    }
}
