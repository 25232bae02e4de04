//! Per-character vendor fetch and merge.
//!
//! Vendor inventories are mostly character-invariant, but class-specific
//! listings (armor) only appear for a character of that class, so every
//! character on the operator's account is queried and the component maps are
//! merged listing-by-listing, last write wins.

use std::collections::HashMap;

use tracing::debug;

use crate::bungie::{
    SaleComponent, SessionContext, SocketsComponent, StatsComponent, UpstreamError, VendorApi,
};
use crate::types::VendorMeta;

/// Merged component maps for one vendor across all characters, keyed by the
/// upstream listing index.
#[derive(Debug, Default)]
pub struct VendorSnapshot {
    pub vendor: VendorMeta,
    pub sales: HashMap<String, SaleComponent>,
    pub stats: HashMap<String, StatsComponent>,
    pub sockets: HashMap<String, SocketsComponent>,
}

/// Fetch one vendor as seen by every character and merge the results.
///
/// Characters are fetched sequentially; a failure on any character aborts
/// the whole snapshot so a partial merge never reaches the classifier.
pub async fn fetch_vendor(
    api: &dyn VendorApi,
    session: &SessionContext,
    vendor_hash: u32,
) -> Result<VendorSnapshot, UpstreamError> {
    let mut snapshot = VendorSnapshot::default();
    let mut have_meta = false;

    for &character_id in &session.character_ids {
        let response = api.get_vendor(session, character_id, vendor_hash).await?;
        debug!(
            "[FETCH] vendor {} character {}: {} listings",
            vendor_hash,
            character_id,
            response.sales.data.len()
        );

        if !have_meta {
            if let Some(vendor) = response.vendor.data {
                snapshot.vendor = VendorMeta {
                    vendor_hash: vendor.vendor_hash,
                    next_refresh_date: vendor.next_refresh_date,
                    location_index: vendor.vendor_location_index,
                    enabled: vendor.enabled,
                };
                have_meta = true;
            }
        }

        snapshot.sales.extend(response.sales.data);
        snapshot.stats.extend(response.item_components.stats.data);
        snapshot
            .sockets
            .extend(response.item_components.sockets.data);
    }

    if !have_meta {
        snapshot.vendor.vendor_hash = vendor_hash;
    }
    Ok(snapshot)
}
