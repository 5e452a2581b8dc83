//! Waypoint runner
//!
//! Hosts an engine over the in-memory store: loads process definitions from
//! a directory, starts the processes named in the bootstrap file, resumes due
//! scheduled steps and answers control requests until shut down.

pub mod bootstrap;
pub mod collaborators;
pub mod config;
pub mod control;
pub mod loader;

use anyhow::Context;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::watch;
use tracing::{error, info};

use waypoint_core::{
    ProcessEngine, ScheduleSweeper, SimpleConditionEvaluator, StepHandlerRegistry,
    TracingEventHandler,
};
use waypoint_state_inmemory::InMemoryStateStoreProvider;

use crate::bootstrap::Bootstrap;
use crate::collaborators::{CannedCommands, CannedQueries, GeneratedIdTaskService};
use crate::config::RunnerConfig;

/// Build an engine over `provider` answering collaborators from `bootstrap`
pub fn build_engine(
    provider: &InMemoryStateStoreProvider,
    bootstrap: &Bootstrap,
) -> anyhow::Result<Arc<ProcessEngine>> {
    let repositories = provider.repositories();
    let handlers = StepHandlerRegistry::standard(
        &repositories,
        Arc::new(CannedCommands::new(bootstrap.commands.clone())),
        Arc::new(CannedQueries::new(bootstrap.queries.clone())),
        Arc::new(GeneratedIdTaskService),
        Arc::new(SimpleConditionEvaluator),
    )
    .context("Failed to register step handlers")?;

    Ok(Arc::new(ProcessEngine::new(
        repositories,
        handlers,
        Arc::new(TracingEventHandler),
    )))
}

/// Load definitions and start configured processes on a fresh engine
pub async fn prepare(config: &RunnerConfig) -> anyhow::Result<Arc<ProcessEngine>> {
    let bootstrap = match &config.bootstrap_file {
        Some(path) => Bootstrap::load(path).await?,
        None => Bootstrap::default(),
    };

    let provider = InMemoryStateStoreProvider::new();
    let engine = build_engine(&provider, &bootstrap)?;

    let loaded = loader::load_definitions(&config.definitions_dir, engine.repositories())
        .await
        .with_context(|| {
            format!(
                "Failed to load definitions from {}",
                config.definitions_dir.display()
            )
        })?;
    info!(
        definitions = loaded.len(),
        dir = %config.definitions_dir.display(),
        "Definitions loaded"
    );

    let started = bootstrap.start_processes(&engine).await?;
    info!(started = started.len(), "Bootstrap complete");
    Ok(engine)
}

/// Run until `shutdown` turns `true`.
///
/// The sweeper keeps running after stdin closes.
pub async fn run(config: RunnerConfig, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
    let engine = prepare(&config).await?;

    let sweeper = tokio::spawn(
        ScheduleSweeper::new(Arc::clone(&engine), config.sweeper()).run(shutdown.clone()),
    );

    if config.control_stdin {
        let served = control::serve(
            &engine,
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
            shutdown,
        )
        .await;
        if let Err(e) = served {
            error!(error = %e, "Control channel failed");
        }
    }

    sweeper.await.context("Schedule sweeper panicked")?;
    Ok(())
}
