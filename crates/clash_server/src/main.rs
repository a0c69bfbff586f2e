//! Lane Clash - Match Server
//!
//! Runs the match service with in-memory collaborators and drives the
//! background sweep. Usage: `clash_server [config.ron]`.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clash_core::ability::AbilityBook;
use clash_server::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting Lane Clash match server");

    let config = match std::env::args().nth(1) {
        Some(path) => match ServerConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("{e}");
                return ExitCode::FAILURE;
            }
        },
        None => ServerConfig::default(),
    };
    let book = match AbilityBook::builtin() {
        Ok(book) => book,
        Err(e) => {
            tracing::error!("Failed to load ability catalog: {e}");
            return ExitCode::FAILURE;
        }
    };

    let period = Duration::from_secs(config.sweep_interval_secs.max(1));
    tracing::info!(
        sweep_secs = period.as_secs(),
        energy = ?config.engine.energy_rule,
        "Service ready"
    );
    let service = Arc::new(ClashService::new(
        config,
        book,
        Arc::new(SystemClock),
        Arc::new(InMemoryLedger::new()),
        Arc::new(InMemoryProfiles::new()),
    ));

    let sweeper = Arc::clone(&service);
    let sweep_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            sweeper.sweep();
        }
    });

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
    sweep_task.abort();
    tracing::info!("Shutting down");
    ExitCode::SUCCESS
}
