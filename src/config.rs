//! System configuration and vendor descriptor definitions.
//!
//! This module contains all configuration constants, the static vendor
//! descriptor table, and environment variable parsing for the rotation bot.

use anyhow::{Context, Result};
use chrono::Weekday;

use crate::types::VendorId;

/// Bungie platform API base URL
pub const BUNGIE_API_BASE: &str = "https://www.bungie.net/Platform";

/// Bungie static asset host (definition icons live here)
pub const BUNGIE_ASSET_BASE: &str = "https://www.bungie.net";

/// Discord REST API base URL
pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Component selectors for a full vendor fetch:
/// 400 = vendor metadata, 402 = sales, 304 = item stats, 305 = item sockets
pub const VENDOR_COMPONENTS: &[u32] = &[400, 402, 304, 305];

/// Component selector for the lightweight pre-flight probe
pub const PROBE_COMPONENTS: &[u32] = &[400];

/// Upstream envelope code: request succeeded
pub const ERROR_CODE_SUCCESS: i64 = 1;

/// Upstream envelope code: API is in maintenance mode
pub const ERROR_CODE_MAINTENANCE: i64 = 5;

/// Upstream envelope code: the requested vendor is currently invalid/inactive
pub const ERROR_CODE_VENDOR_NOT_FOUND: i64 = 1627;

/// Tier code for exotic items; excluded from rendered sections
pub const EXOTIC_TIER: u8 = 6;

/// Daily reset wall-clock hour (UTC) at which vendor catalogs roll over
pub const RESET_HOUR_UTC: u32 = 17;

/// Sleep interval between maintenance re-probes (seconds)
pub const MAINTENANCE_RETRY_SECS: u64 = 300;

/// HTTP client timeout (seconds)
pub const HTTP_TIMEOUT_SECS: u64 = 10;

/// Bungie API key (required)
pub fn bungie_api_key() -> Result<String> {
    std::env::var("BUNGIE_API_KEY").context("BUNGIE_API_KEY not set")
}

/// Discord bot token (required for the live surface)
pub fn discord_token() -> Result<String> {
    std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN not set")
}

/// Discord id of the operator whose credentials drive upstream fetches
/// and who receives out-of-band failure notifications.
pub fn admin_discord_id() -> i64 {
    static CACHED: std::sync::OnceLock<i64> = std::sync::OnceLock::new();
    *CACHED.get_or_init(|| {
        std::env::var("ADMIN_DISCORD_ID")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    })
}

/// Channel that receives the rendered rotation messages
pub fn vendor_channel_id() -> u64 {
    static CACHED: std::sync::OnceLock<u64> = std::sync::OnceLock::new();
    *CACHED.get_or_init(|| {
        std::env::var("VENDOR_CHANNEL_ID")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    })
}

/// Path of the rotation document store
pub fn rotation_db_path() -> String {
    std::env::var("ROTATION_DB_PATH").unwrap_or_else(|_| "rotation.db".to_string())
}

/// Path of the bulk-loaded reference catalog
pub fn manifest_db_path() -> String {
    std::env::var("MANIFEST_DB_PATH").unwrap_or_else(|_| "manifest.db".to_string())
}

/// Static display/scheduling descriptor for one vendor.
pub struct VendorDescriptor {
    pub id: VendorId,
    pub title: &'static str,
    pub description: &'static str,
    pub thumbnail_url: &'static str,
    pub image_url: &'static str,
    /// Guild that hosts this vendor's badge emojis
    pub badge_surface: u64,
    /// Weekly vendors only refresh on this weekday; `None` = daily
    pub weekday: Option<Weekday>,
    /// Known locations indexed by the upstream location index; empty for
    /// vendors with a fixed spot
    pub locations: &'static [&'static str],
}

/// All known vendors in their fixed rotation order.
pub const VENDORS: &[VendorDescriptor] = &[
    VendorDescriptor {
        id: VendorId::Gunsmith,
        title: "Banshee-44",
        description: "Banshee-44 has lived many lives. As master weaponsmith \
                      for the Tower, he supplies Guardians with only the best.",
        thumbnail_url: "https://www.light.gg/Content/Images/banshee-icon.png",
        image_url: "https://www.bungie.net/common/destiny2_content/icons/3142923bc72bcd5a769badc26bd8b508.jpg",
        badge_surface: 1057709724843397282,
        weekday: None,
        locations: &[],
    },
    VendorDescriptor {
        id: VendorId::BlackArmory,
        title: "Ada-1",
        description: "Advanced Prototype Exo and warden of the Black Armory.",
        thumbnail_url: "https://www.light.gg/Content/Images/ada-icon.png",
        image_url: "https://www.bungie.net/common/destiny2_content/icons/e6a489d1386e2928f9a5a33b775b8f03.jpg",
        badge_surface: 1057711135668850688,
        weekday: None,
        locations: &[],
    },
    VendorDescriptor {
        id: VendorId::AgentOfNine,
        title: "Xûr, Agent of the Nine",
        description: "A peddler of strange curios, Xûr's motives are not his own. \
                      He bows to his distant masters, the Nine.",
        thumbnail_url: "https://www.light.gg/Content/Images/xur-icon.png",
        image_url: "https://www.bungie.net/common/destiny2_content/icons/801c07dc080b79c7da99ac4f59db1f66.jpg",
        badge_surface: 1057712190025170944,
        weekday: Some(Weekday::Fri),
        locations: &[
            "The Last City, Tower",
            "European Dead Zone, EDZ",
            "Arcadian Valley, Nessus",
        ],
    },
];

/// Look up the descriptor for a vendor hash.
pub fn vendor_descriptor(vendor_hash: u32) -> Option<&'static VendorDescriptor> {
    VENDORS.iter().find(|d| d.id.hash() == vendor_hash)
}
