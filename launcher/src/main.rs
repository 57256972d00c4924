//! Container entrypoint: wait for the database, run migrations, exec the application.
use std::env;

use envconfig::Envconfig;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use launcher::config::Config;
use launcher::error::LaunchError;
use launcher::handoff::{ExecHandoff, TargetCommand};

#[cfg(unix)]
async fn shutdown() -> i32 {
    use tokio::signal::unix::{signal, SignalKind};

    // As pid 1 nothing terminates us unless we listen ourselves.
    let (mut term, mut interrupt) =
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(term), Ok(interrupt)) => (term, interrupt),
            (Err(error), _) | (_, Err(error)) => {
                tracing::warn!("failed to register signal handlers: {}", error);
                return std::future::pending().await;
            }
        };

    tokio::select! {
        _ = term.recv() => 15,
        _ = interrupt.recv() => 2,
    }
}

#[cfg(not(unix))]
async fn shutdown() -> i32 {
    match tokio::signal::ctrl_c().await {
        Ok(()) => 2,
        Err(error) => {
            tracing::warn!("failed to register ctrl-c handler: {}", error);
            std::future::pending().await
        }
    }
}

async fn launch() -> Result<(), LaunchError> {
    let target = TargetCommand::from_args(env::args_os().skip(1))?;

    let config = Config::init_from_env()
        .map_err(|error| LaunchError::InvalidConfiguration(error.to_string()))?
        .validate()?;
    info!(
        "launching `{}` once {} is ready (probe: {:?}, skip preparation: {})",
        target, config.endpoint, config.probe_mode, config.skip_preparation
    );

    let launcher = config.into_launcher(target, ExecHandoff)?;

    tokio::select! {
        result = launcher.run() => result,
        signal = shutdown() => {
            info!("Shutting down before handoff...");
            Err(LaunchError::Interrupted(signal))
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(error) = launch().await {
        error!("{}", error);
        std::process::exit(error.exit_code());
    }
}
