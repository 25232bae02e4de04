//! Operator tool: refresh and publish one vendor immediately.
//!
//! Usage: run_rotation <banshee|ada|xur> [--purge-badges]

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use rotation_bot::bungie::BungieClient;
use rotation_bot::cache::RotationCache;
use rotation_bot::catalog::Catalog;
use rotation_bot::config;
use rotation_bot::render;
use rotation_bot::storage::Store;
use rotation_bot::surface::{purge_badges, DiscordSurface};
use rotation_bot::types::VendorId;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let Some(name) = args.next() else {
        bail!("usage: run_rotation <banshee|ada|xur> [--purge-badges]");
    };
    let purge = args.any(|a| a == "--purge-badges");

    let vendor = VendorId::from_name(&name)
        .with_context(|| format!("unknown vendor: {}", name))?;
    let descriptor = config::vendor_descriptor(vendor.hash())
        .context("vendor has no descriptor")?;

    let store = Arc::new(Store::open(config::rotation_db_path())?);
    let catalog = Arc::new(Catalog::open(config::manifest_db_path())?);
    let api = Arc::new(BungieClient::new()?);
    let surface = DiscordSurface::new()?;
    let cache = RotationCache::new(store.clone(), catalog, api.clone());
    cache.load_from_store().await?;

    if purge {
        let deleted = purge_badges(&surface, descriptor.badge_surface).await?;
        store.clear_badges(descriptor.badge_surface as i64)?;
        info!("[ROTATE] Purged {} badges for {}", deleted, descriptor.title);
    }

    if !cache.refresh(vendor.hash()).await {
        bail!("refresh failed for {}", descriptor.title);
    }
    render::publish(&cache, &surface, api.as_ref(), vendor.hash()).await?;
    info!("[ROTATE] {} rotation published", descriptor.title);
    Ok(())
}
