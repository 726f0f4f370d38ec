//! line-echo: A line-oriented TCP echo server
//!
//! Every newline-terminated line a client sends is written back to it
//! prefixed with `Echo: `.
//!
//! Features:
//! - One task per connection, no shared state between connections
//! - Byte-exact echo, delimiter included
//! - Graceful shutdown on Ctrl-C / SIGTERM
//! - Configuration via CLI arguments or TOML file

mod config;
mod protocols;
mod server;
#[cfg(test)]
mod test_util;

use config::{Config, ConfigError};
use std::io::{self, Write};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // Load configuration
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            let status = report_config_error(&e, &mut io::stdout(), &mut io::stderr());
            return ExitCode::from(status);
        }
    };

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        workers = ?config.workers,
        "Starting line-echo server"
    );

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Server failed to start");
            ExitCode::from(EXIT_STARTUP_FAILURE)
        }
    }
}

/// Exit status for any startup failure
const EXIT_STARTUP_FAILURE: u8 = 1;

/// Print a configuration error and return the exit status.
///
/// Usage errors go to standard output, everything else to standard error.
fn report_config_error(err: &ConfigError, stdout: &mut impl Write, stderr: &mut impl Write) -> u8 {
    let _ = match err {
        ConfigError::Usage(_) => writeln!(stdout, "{err}"),
        _ => writeln!(stderr, "{err}"),
    };
    EXIT_STARTUP_FAILURE
}

/// Build the Tokio runtime and serve until a shutdown signal arrives.
fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(workers) = config.workers {
        builder.worker_threads(workers.get());
    }
    let runtime = builder.build()?;

    runtime.block_on(async {
        let listener = server::start(config.listen_addr())?;
        info!(address = %listener.local_addr(), "Listening");

        server::run(listener, shutdown_signal()).await;
        info!("Server stopped");
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
