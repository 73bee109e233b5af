use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use meerkat::config::Config;
use meerkat::handlers::WalletService;
use meerkat::market::{AlertEvaluator, MarketDataClient};
use meerkat::monitor::WalletMonitor;
use meerkat::store::{TokenListClient, WalletStore};
use meerkat::util::display;

fn init_tracing() -> Result<()> {
    // Create logs directory if it doesn't exist
    std::fs::create_dir_all("logs")?;

    // Create file appender for logs
    let file_appender = tracing_appender::rolling::daily("logs", "meerkat.log");
    let (non_blocking_file, _guard) = tracing_appender::non_blocking(file_appender);

    // Create console layer with formatting
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_level(true)
        .compact();

    // Create file layer with JSON formatting
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .json()
        .with_current_span(false)
        .with_span_list(true);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Leak the guard to prevent the file appender from being dropped
    std::mem::forget(_guard);

    Ok(())
}

/// Market polling loop: refresh the snapshot on a fixed interval, derive
/// alerts, render both.
fn spawn_market_poller(
    config: meerkat::config::MarketConfig,
    shutdown_tx: &broadcast::Sender<()>,
) -> JoinHandle<()> {
    let mut shutdown = shutdown_tx.subscribe();
    tokio::spawn(async move {
        let client = MarketDataClient::new(&config);
        let mut evaluator =
            AlertEvaluator::new(config.volume_alert_threshold_percent, config.max_alerts);
        let mut ticker = tokio::time::interval(Duration::from_secs(config.poll_interval_secs));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match client.fetch_all(&config.symbols).await {
                        Ok(snapshot) => {
                            let raised = evaluator.ingest(&snapshot, Utc::now());
                            display::print_market_overview(&snapshot, Utc::now());
                            display::print_alerts(evaluator.alerts());
                            info!(symbols = snapshot.len(), alerts = raised, "Market snapshot refreshed");
                        }
                        Err(e) => error!(error = %e, "Market refresh failed"),
                    }
                }
                _ = shutdown.recv() => {
                    info!("Market poller shutting down");
                    break;
                }
            }
        }
    })
}

/// Renders wallet-activity notifications as the monitor publishes them.
fn spawn_notification_renderer(
    monitor: Arc<WalletMonitor>,
    shutdown_tx: &broadcast::Sender<()>,
) -> JoinHandle<()> {
    let mut rx = monitor.subscribe();
    let mut shutdown = shutdown_tx.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Ok(notification) => {
                        display::print_notification(&notification);
                        display::print_monitoring_summary(&monitor.status_map());
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Notification stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = shutdown.recv() => break,
            }
        }
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    info!("Meerkat - wallet activity and market watch service");
    info!("===================================================");

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/meerkat.toml".to_string());
    let config = Config::load_or_default(&config_path);

    let store =
        WalletStore::new(&config.store.database_path).context("Failed to open wallet store")?;
    let monitor = Arc::new(WalletMonitor::new(
        &config.rpc,
        &config.monitor,
        store.clone(),
    ));
    let service = WalletService::new(store.clone(), monitor.clone(), &config.rpc, &config.store);

    // Symbol directory refresh is best effort; an old copy still labels most mints.
    let directory = TokenListClient::new(&config.rpc.token_list_url);
    if let Err(e) = directory
        .ensure_fresh(&store, config.store.directory_ttl_secs)
        .await
    {
        warn!(error = %e, "Token directory refresh failed at startup");
    }

    match service.restore().await {
        Ok(_) => display::print_monitoring_summary(&monitor.status_map()),
        Err(e) => warn!(error = %e, "Wallet restore failed"),
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    let market_task = spawn_market_poller(config.market.clone(), &shutdown_tx);
    let notification_task = spawn_notification_renderer(monitor.clone(), &shutdown_tx);

    info!("Press Ctrl+C to shut down");
    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    // Tear down: every open connection and timer goes with the monitor.
    let _ = shutdown_tx.send(());
    monitor.shutdown().await;
    let _ = market_task.await;
    let _ = notification_task.await;

    info!("Shutdown complete");
    Ok(())
}
