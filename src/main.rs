use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

mod config;
mod coordinator;
mod dashboard;
mod db;
mod fetcher;
mod messages;
mod nhl;
#[cfg(test)]
mod testing;

use config::Config;
use coordinator::{Coordinator, CoordinatorSettings};
use dashboard::AppState;
use db::Database;
use fetcher::Fetcher;
use messages::{request_queue, QUEUE_CAPACITY};
use nhl::{DataSource, NhlApi};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;
    info!(
        "Tracking {} via {} (refresh every {}h)",
        config.team, config.nhl_api_url, config.refresh_period_hours
    );

    // Open database
    let db = Database::open(&config.database_path)?;
    info!("Database opened: {}", config.database_path);

    let source: Arc<dyn DataSource> = Arc::new(NhlApi::new(
        &config.nhl_api_url,
        &config.team,
        config.nhl_api_key.clone(),
        Duration::from_secs(config.http_timeout_secs),
    )?);

    let (requests, request_rx) = request_queue();
    let (response_tx, response_rx) = mpsc::channel(QUEUE_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    let tick = Duration::from_millis(config.tick_interval_ms);

    let fetcher = Fetcher::new(
        source,
        request_rx,
        response_tx,
        config.max_requests_per_minute,
    );
    let fetcher_handle = tokio::spawn(fetcher.run(tick));

    let coordinator = Coordinator::new(
        db.clone(),
        requests.clone(),
        CoordinatorSettings::from_config(&config),
        Local::now(),
    )?;
    let coordinator_handle = {
        let shutdown_tx = shutdown_tx.clone();
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let result = coordinator.run(response_rx, shutdown_rx, tick).await;
            if let Err(e) = &result {
                error!("Coordinator failed: {:#}", e);
            }
            // Take the server down with us
            shutdown_tx.send_replace(true);
            result
        })
    };

    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Ctrl-C received, shutting down"),
                Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
            }
            shutdown_tx.send_replace(true);
        });
    }

    // Start the snapshot HTTP server
    let app = dashboard::router(AppState {
        db: db.clone(),
        requests,
    });
    let addr: SocketAddr = config.dashboard_addr.parse()?;
    info!("Snapshot server listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let mut server_shutdown = shutdown_rx;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            // A dropped sender also means shutdown
            let _ = server_shutdown.wait_for(|stop| *stop).await;
        })
        .await?;

    // Router state is gone; once the coordinator's sender drops, the fetcher exits
    coordinator_handle
        .await
        .context("coordinator task panicked")??;
    fetcher_handle.await.context("fetcher task panicked")?;

    info!("Shut down cleanly");
    Ok(())
}
