mod metrics;
mod persist;
mod simulation;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use labflow_core::{
    load_config, validate_config, AcquisitionOrchestrator, AcquisitionOutcome, Config,
    ConfigError, ConnectionRegistry, Payload, ProgressiveFuture, SaveQueue, SingleRunGuard,
    TaskError, TaskRunner,
};

use persist::JsonLinesStore;
use simulation::{correlative_batch, SimulatedConnector};

/// Resource the guard protects, also the connection target.
const MICROSCOPE: &str = "microscope";

/// Simulated exposure per frame.
const EXPOSURE: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("LABFLOW_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("labflow.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = match load_config(&config_path) {
        Ok(config) => config,
        Err(ConfigError::FileNotFound(_)) => {
            info!("No configuration file, using defaults");
            Config::default()
        }
        Err(e) => {
            return Err(anyhow::Error::new(e)
                .context(format!("Failed to load config from {:?}", config_path)))
        }
    };
    validate_config(&config).context("Configuration validation failed")?;

    let output = std::env::var("LABFLOW_OUTPUT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("frames.jsonl"));
    let store = Arc::new(
        JsonLinesStore::open(&output)
            .with_context(|| format!("Failed to open output file {:?}", output))?,
    );
    info!("Persisting frames to {:?}", output);

    // A partially started queue is dropped on failure, which blocks.
    let queue_config = config.save_queue.clone();
    let queue = tokio::task::spawn_blocking(move || {
        SaveQueue::<Payload>::new(&queue_config, store)
    })
    .await
    .context("Save queue startup failed")?
    .context("Failed to start save queue")?;

    let outcome = run_batch(&config, &queue).await;
    shutdown_queue(queue).await?;
    report(&outcome?);
    info!("All frames handled");

    if std::env::var("LABFLOW_PRINT_METRICS").is_ok() {
        println!("{}", metrics::encode_metrics());
    }

    Ok(())
}

/// Run the simulated batch under the single-run guard, cancelling it on
/// Ctrl+C or SIGTERM.
async fn run_batch(
    config: &Config,
    queue: &SaveQueue<Payload>,
) -> Result<Result<AcquisitionOutcome, TaskError>> {
    let runner = TaskRunner::new(&config.runner, &config.polling);
    let registry = Arc::new(ConnectionRegistry::new(Arc::new(SimulatedConnector)));
    registry
        .get(MICROSCOPE)
        .context("Failed to connect to the microscope")?;
    let guard = SingleRunGuard::new(MICROSCOPE, runner.clone(), Arc::clone(&registry));

    let tasks = correlative_batch(&queue.handle(), EXPOSURE);
    let estimate = tasks.iter().map(|t| t.estimated_duration()).sum();
    let orchestrator = AcquisitionOrchestrator::new(runner);
    let future = guard
        .start_run("correlative batch", estimate, move |ctx| {
            orchestrator.drive(ctx, &tasks)
        })
        .context("Microscope busy")?;
    future.add_observer(|update| {
        info!(
            eta = %update.end.format("%H:%M:%S"),
            step = update.message.as_deref().unwrap_or(""),
            "Progress"
        )
    });

    let outcome = tokio::select! {
        outcome = wait(future.clone()) => outcome,
        _ = shutdown_signal() => {
            warn!("Interrupted, cancelling the batch");
            guard.cancel();
            wait(future).await
        }
    };
    registry.close_all();
    outcome
}

/// Drain and stop the save queue on a blocking thread.
///
/// Workers use blocking channel operations, which must stay off the runtime.
async fn shutdown_queue<P: Send + 'static>(queue: SaveQueue<P>) -> Result<()> {
    tokio::task::spawn_blocking(move || {
        queue.drain();
        drop(queue);
    })
    .await
    .context("Save queue shutdown failed")
}

async fn wait<T>(future: ProgressiveFuture<T>) -> Result<Result<T, TaskError>>
where
    T: Clone + Send + 'static,
{
    tokio::task::spawn_blocking(move || future.result(None))
        .await
        .context("Waiting for the batch failed")
}

fn report(outcome: &Result<AcquisitionOutcome, TaskError>) {
    match outcome {
        Ok(outcome) => {
            for entry in outcome.results.entries() {
                info!(task = %entry.task, kind = %entry.kind, frames = entry.payloads.len(), "Acquired");
            }
            match &outcome.error {
                None => info!("Batch complete"),
                Some(e) => warn!(tasks = outcome.results.len(), "Batch stopped early: {}", e),
            }
        }
        Err(e) => warn!("Batch produced nothing: {}", e),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
