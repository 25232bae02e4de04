use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use rotation_bot::bungie::BungieClient;
use rotation_bot::cache::RotationCache;
use rotation_bot::catalog::Catalog;
use rotation_bot::config;
use rotation_bot::scheduler::{self, SchedulerContext};
use rotation_bot::storage::Store;
use rotation_bot::surface::DiscordSurface;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let file_appender = tracing_appender::rolling::daily("logs", "rotation-bot.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false))
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .init();

    info!("[MAIN] Starting vendor rotation bot");

    let store = Arc::new(Store::open(config::rotation_db_path())?);
    let catalog = Arc::new(Catalog::open(config::manifest_db_path())?);
    if let Some(version) = catalog.version()? {
        info!("[MAIN] Reference catalog at manifest version {}", version);
    } else {
        error!("[MAIN] Reference catalog is empty, run load_manifest first");
    }

    let api = Arc::new(BungieClient::new()?);
    let surface = Arc::new(DiscordSurface::new()?);
    let cache = Arc::new(RotationCache::new(store, catalog, api.clone()));
    cache.load_from_store().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let ctx = SchedulerContext {
        cache: cache.clone(),
        api,
        surface,
    };

    // Catch up if the process was down when today's reset fired.
    let mut catchup_rx = shutdown_rx.clone();
    let scheduler = tokio::spawn(async move {
        if scheduler::reset_passed_today(Utc::now()) {
            info!("[MAIN] Reset already passed today, running catch-up cycle");
            if !scheduler::run_cycle(&ctx, &mut catchup_rx).await {
                return;
            }
        }
        scheduler::run(ctx, catchup_rx).await;
    });

    tokio::signal::ctrl_c().await?;
    info!("[MAIN] Interrupt received, shutting down");
    let _ = shutdown_tx.send(true);
    let _ = scheduler.await;

    info!("[MAIN] Shutdown complete");
    Ok(())
}
