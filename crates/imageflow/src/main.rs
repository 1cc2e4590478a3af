mod cli;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, LogFormat};
use colored::Colorize;
use imageflow_build::{BuildError, Orchestrator, ProcessRunner};
use imageflow_config::{ConfigError, StepConfig};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Exit status when SIGINT or SIGTERM stopped the step
const CANCELLED_EXIT_CODE: u8 = 130;

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Resolves once SIGINT or SIGTERM arrives
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}

async fn run(config: &StepConfig) -> anyhow::Result<()> {
    let runner = ProcessRunner;
    Orchestrator::new(config, &runner)
        .run()
        .await
        .with_context(|| format!("{} action failed", config.action))
}

/// Exit status and message for a failed run
fn report(err: &anyhow::Error) -> u8 {
    if let Some(build) = err.downcast_ref::<BuildError>() {
        eprintln!("{} {}", "Error:".red().bold(), build.user_message());
        return u8::try_from(build.exit_code()).unwrap_or(1);
    }
    if let Some(config) = err.downcast_ref::<ConfigError>() {
        eprintln!("{} {}", "Error:".red().bold(), config);
        return 2;
    }
    eprintln!("{} {:#}", "Error:".red().bold(), err);
    1
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    let config = match cli.into_config(StepConfig::capture_environment()) {
        Ok(config) => config,
        Err(e) => return ExitCode::from(report(&e.into())),
    };

    tokio::select! {
        result = run(&config) => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => ExitCode::from(report(&e)),
        },
        _ = shutdown_signal() => {
            eprintln!("{} cancelled, no further steps run", "Warning:".yellow().bold());
            ExitCode::from(CANCELLED_EXIT_CODE)
        }
    }
}
