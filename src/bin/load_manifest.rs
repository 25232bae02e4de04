//! Operator tool: bulk-load a manifest dump into the reference catalog.
//!
//! Usage: load_manifest <dump.sqlite> [version]

use anyhow::{bail, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use rotation_bot::catalog::{load_manifest_dump, Catalog};
use rotation_bot::config;

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let Some(dump_path) = args.next() else {
        bail!("usage: load_manifest <dump.sqlite> [version]");
    };
    let version = args.next().unwrap_or_else(|| "unknown".to_string());

    let catalog = Catalog::open(config::manifest_db_path())?;
    let summary = load_manifest_dump(&dump_path, &catalog, &version)?;
    info!(
        "[LOAD] Loaded {} definitions across {} tables (version {})",
        summary.definitions, summary.tables, version
    );
    Ok(())
}
