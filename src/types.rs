//! Core type definitions for the vendor rotation pipeline.
//!
//! This module provides the vendor identifiers, the enriched item shapes
//! produced by the classifier, the per-vendor rotation cache entry, and the
//! display payload consumed by the rendering layer.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// === Vendor identity ===

/// The fixed set of tracked vendors. Hashes are stable upstream constants;
/// vendors are never created or destroyed at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VendorId {
    /// Banshee-44, the weapon vendor
    Gunsmith,
    /// Ada-1, the armor/shader vendor
    BlackArmory,
    /// Xûr, the weekly exotic vendor
    AgentOfNine,
}

impl VendorId {
    pub const ALL: [VendorId; 3] = [
        VendorId::Gunsmith,
        VendorId::BlackArmory,
        VendorId::AgentOfNine,
    ];

    /// Upstream vendor hash for this vendor.
    pub fn hash(self) -> u32 {
        match self {
            VendorId::Gunsmith => 672118013,
            VendorId::BlackArmory => 350061650,
            VendorId::AgentOfNine => 2190858386,
        }
    }

    pub fn from_hash(hash: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|v| v.hash() == hash)
    }

    /// Parse an operator-supplied vendor name (as used by the manual trigger).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "banshee" | "banshee-44" | "gunsmith" => Some(VendorId::Gunsmith),
            "ada" | "ada-1" => Some(VendorId::BlackArmory),
            "xur" | "xûr" => Some(VendorId::AgentOfNine),
            _ => None,
        }
    }
}

impl std::fmt::Display for VendorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VendorId::Gunsmith => write!(f, "Banshee-44"),
            VendorId::BlackArmory => write!(f, "Ada-1"),
            VendorId::AgentOfNine => write!(f, "Xûr"),
        }
    }
}

/// Player class a piece of armor fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuardianClass {
    Warlock,
    Titan,
    Hunter,
}

impl GuardianClass {
    pub const ALL: [GuardianClass; 3] = [
        GuardianClass::Warlock,
        GuardianClass::Titan,
        GuardianClass::Hunter,
    ];
}

impl std::fmt::Display for GuardianClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuardianClass::Warlock => write!(f, "Warlock"),
            GuardianClass::Titan => write!(f, "Titan"),
            GuardianClass::Hunter => write!(f, "Hunter"),
        }
    }
}

// === Enriched sale items ===

/// Purchase cost for one listing (currency item hash + amount).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemCost {
    pub item_hash: u32,
    pub quantity: i64,
}

/// One resolved stat roll, emitted in arrangement order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStat {
    pub stat_hash: u32,
    pub name: String,
    pub value: i32,
}

/// One resolved socket plug (an equipped perk).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemPerk {
    pub perk_hash: u32,
    pub name: String,
    pub description: String,
}

/// A sale listing after definition resolution and enrichment. Owned
/// exclusively by the rotation entry that contains it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedItem {
    pub item_hash: u32,
    pub name: String,
    /// Icon path relative to the upstream asset host
    pub icon: Option<String>,
    pub tier: u8,
    pub tier_name: String,
    /// Display type, with class items folded to "Class Item"
    pub item_type: String,
    /// Armor only: which player class the piece fits
    pub guardian_class: Option<GuardianClass>,
    pub costs: Vec<ItemCost>,
    /// Stats in the arrangement's declared order; unknown stats dropped
    pub stats: Vec<ItemStat>,
    /// perk-category -> perk-name -> perk, last write wins on duplicates
    pub perks: BTreeMap<String, BTreeMap<String, ItemPerk>>,
}

/// Character-invariant vendor metadata captured from the upstream response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VendorMeta {
    pub vendor_hash: u32,
    pub next_refresh_date: Option<String>,
    pub location_index: Option<i64>,
    pub enabled: bool,
}

/// Category-partitioned classifier output. Keys are item hashes as strings.
#[derive(Debug, Clone, Default)]
pub struct ClassifiedSales {
    pub weapons: BTreeMap<String, EnrichedItem>,
    pub armor: BTreeMap<String, EnrichedItem>,
    pub shaders: BTreeMap<String, EnrichedItem>,
    pub mods: BTreeMap<String, EnrichedItem>,
}

// === Rotation cache entry ===

/// Cached daily rotation snapshot for one vendor. The `date` field is the
/// idempotency key: a second refresh on the same calendar day is a no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationEntry {
    pub vendor_hash: u32,
    pub date: NaiveDate,
    pub vendor: VendorMeta,
    pub weapons: BTreeMap<String, EnrichedItem>,
    pub armor: BTreeMap<String, EnrichedItem>,
    pub shaders: BTreeMap<String, EnrichedItem>,
    pub mods: BTreeMap<String, EnrichedItem>,
    /// Last rendered message, so a refresh edits in place instead of re-posting
    pub message_id: Option<u64>,
}

impl RotationEntry {
    /// Build a fresh entry from classifier output, carrying over the previous
    /// message reference so the renderer can edit in place. Category maps come
    /// exclusively from `classified` (stale leftovers never survive a refresh).
    pub fn from_classified(
        vendor: VendorMeta,
        date: NaiveDate,
        classified: ClassifiedSales,
        previous_message: Option<u64>,
    ) -> Self {
        Self {
            vendor_hash: vendor.vendor_hash,
            date,
            vendor,
            weapons: classified.weapons,
            armor: classified.armor,
            shaders: classified.shaders,
            mods: classified.mods,
            message_id: previous_message,
        }
    }
}

// === Display payload ===

/// One named section of a rendered rotation message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Platform-agnostic rendered output for one vendor rotation.
#[derive(Debug, Clone, Default)]
pub struct DisplayPayload {
    pub title: String,
    pub description: String,
    pub thumbnail_url: Option<String>,
    pub image_url: Option<String>,
    pub fields: Vec<DisplayField>,
    pub footer: String,
}
