//! Per-vendor daily rotation cache.
//!
//! `refresh` is the write path: it is idempotent per calendar day, holds a
//! per-vendor lock across the whole check-fetch-write sequence, and only
//! updates the in-memory entry after the store accepts the new document.

use std::sync::Arc;

use chrono::Utc;
use rustc_hash::FxHashMap;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::bungie::{SessionContext, UpstreamError, VendorApi};
use crate::catalog::Catalog;
use crate::classify::classify;
use crate::fetcher::fetch_vendor;
use crate::storage::Store;
use crate::types::{RotationEntry, VendorId};

pub struct RotationCache {
    store: Arc<Store>,
    catalog: Arc<Catalog>,
    api: Arc<dyn VendorApi + Send + Sync>,
    entries: RwLock<FxHashMap<u32, RotationEntry>>,
    // One lock per vendor, held across check-date -> fetch -> write
    locks: FxHashMap<u32, Mutex<()>>,
}

impl RotationCache {
    pub fn new(
        store: Arc<Store>,
        catalog: Arc<Catalog>,
        api: Arc<dyn VendorApi + Send + Sync>,
    ) -> Self {
        let locks = VendorId::ALL
            .iter()
            .map(|v| (v.hash(), Mutex::new(())))
            .collect();
        Self {
            store,
            catalog,
            api,
            entries: RwLock::new(FxHashMap::default()),
            locks,
        }
    }

    /// Warm the in-memory cache from the store on startup.
    pub async fn load_from_store(&self) -> anyhow::Result<()> {
        let stored = self.store.load_rotations()?;
        let mut entries = self.entries.write().await;
        for entry in stored {
            info!(
                "[CACHE] Restored rotation for vendor {} dated {}",
                entry.vendor_hash, entry.date
            );
            entries.insert(entry.vendor_hash, entry);
        }
        Ok(())
    }

    /// Refresh one vendor's rotation for today.
    ///
    /// Returns `true` when a current entry exists afterwards (fresh or
    /// already current) and `false` when the refresh failed; failures leave
    /// any previous entry untouched.
    pub async fn refresh(&self, vendor_hash: u32) -> bool {
        let Some(lock) = self.locks.get(&vendor_hash) else {
            warn!("[CACHE] Refresh requested for unknown vendor {}", vendor_hash);
            return false;
        };
        let _guard = lock.lock().await;

        let today = Utc::now().date_naive();
        let previous_message = {
            let entries = self.entries.read().await;
            match entries.get(&vendor_hash) {
                Some(entry) if entry.date == today => {
                    info!(
                        "[CACHE] Vendor {} already refreshed for {}, skipping",
                        vendor_hash, today
                    );
                    return true;
                }
                Some(entry) => entry.message_id,
                None => None,
            }
        };

        let session = match SessionContext::load(&self.store) {
            Ok(session) => session,
            Err(err) => {
                error!("[CACHE] No usable operator session: {:#}", err);
                return false;
            }
        };

        let snapshot = match fetch_vendor(self.api.as_ref(), &session, vendor_hash).await {
            Ok(snapshot) => snapshot,
            Err(UpstreamError::VendorNotFound(hash)) => {
                warn!("[CACHE] Vendor {} not available today", hash);
                return false;
            }
            Err(UpstreamError::Maintenance) => {
                warn!("[CACHE] Upstream in maintenance, vendor {} not refreshed", vendor_hash);
                return false;
            }
            Err(err) => {
                error!("[CACHE] Fetch failed for vendor {}: {}", vendor_hash, err);
                return false;
            }
        };

        let classified = match classify(&self.catalog, &snapshot) {
            Ok(classified) => classified,
            Err(err) => {
                error!("[CACHE] Classification failed for vendor {}: {:#}", vendor_hash, err);
                return false;
            }
        };

        let entry = RotationEntry::from_classified(snapshot.vendor, today, classified, previous_message);

        // Store first; the memory cache must never be ahead of the store.
        if let Err(err) = self.store.upsert_rotation(&entry) {
            error!("[CACHE] Failed to persist rotation for vendor {}: {:#}", vendor_hash, err);
            return false;
        }

        info!(
            "[CACHE] Vendor {} refreshed for {}: {} weapons, {} armor, {} shaders, {} mods",
            vendor_hash,
            today,
            entry.weapons.len(),
            entry.armor.len(),
            entry.shaders.len(),
            entry.mods.len()
        );
        self.entries.write().await.insert(vendor_hash, entry);
        true
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Clone out the current entry for a vendor, if any.
    pub async fn get(&self, vendor_hash: u32) -> Option<RotationEntry> {
        self.entries.read().await.get(&vendor_hash).cloned()
    }

    /// Record the rendered message for a vendor, in memory and in the store.
    pub async fn set_last_message(&self, vendor_hash: u32, message_id: u64) -> anyhow::Result<()> {
        self.store.set_rotation_message(vendor_hash, message_id)?;
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(&vendor_hash) {
            entry.message_id = Some(message_id);
        }
        Ok(())
    }
}
