//! Row types for the rotation document store.

use serde::{Deserialize, Serialize};

/// Stored OAuth token for a linked account.
#[derive(Debug, Clone)]
pub struct TokenRow {
    pub discord_id: i64,
    pub access_token: String,
    pub refreshed_at: String,
}

/// Linked game-platform profile for a member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinyProfile {
    pub destiny_membership_id: i64,
    pub membership_type: i32,
    pub character_ids: Vec<i64>,
}

/// One recorded badge emoji on a hosting surface.
#[derive(Debug, Clone)]
pub struct BadgeRow {
    pub surface_id: i64,
    pub name: String,
    pub badge_id: u64,
    pub item_hash: u32,
}
