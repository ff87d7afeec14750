use std::{process::ExitCode, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use forward_supervisor::{
    cli::Cli,
    config::{self, PortMapLoader},
    SupervisorBuilder, SupervisorExit,
};
use tracing::{debug, error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_tracing(cli.verbose) {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }
    debug!("Parsed CLI arguments: {:?}", cli);

    match run(cli).await {
        Ok(exit) => {
            info!("{exit}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<SupervisorExit> {
    let ports = PortMapLoader::new()
        .load(cli.config.as_deref())
        .context("Failed to load port maps")?;
    let specs = config::target_specs(
        &cli.targets,
        &ports,
        cli.namespace.as_deref(),
        &cli.exclude,
    )?;

    let mut supervisor = SupervisorBuilder::new()
        .with_targets(specs)
        .with_namespace(cli.namespace)
        .with_health_check_interval(Duration::from_secs(cli.health_interval.max(1)))
        .with_retry_interval(Duration::from_secs(cli.retry_interval))
        .with_max_retry_attempts(cli.max_retries)
        .build()
        .run();

    // Dropping the supervisor kills every forwarding process, so both
    // branches leave nothing running behind.
    let exit = tokio::select! {
        result = supervisor.wait() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, stopping all port forwards");
            supervisor.shutdown()?;
            supervisor.wait().await?
        }
    };
    Ok(exit)
}

fn init_tracing(verbose: u8) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    Ok(())
}
