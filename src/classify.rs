//! Sale classification and enrichment.
//!
//! Raw sale listings are resolved against the reference catalog, bucketed
//! into mods / shaders / weapons / armor, and enriched with ordered stats
//! and socket perks. Listings in none of the four categories are dropped.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use tracing::debug;

use crate::bungie::{SocketsComponent, StatsComponent};
use crate::catalog::{Catalog, ItemDefinition, StatDefinition, ITEM_DEFINITION, STAT_DEFINITION};
use crate::fetcher::VendorSnapshot;
use crate::types::{ClassifiedSales, EnrichedItem, GuardianClass, ItemCost, ItemPerk, ItemStat};

// Item category hashes
const CATEGORY_MODS: u32 = 59;
const CATEGORY_SHADERS: u32 = 41;
const CATEGORY_WEAPONS: u32 = 1;
const CATEGORY_ARMOR: u32 = 20;

// Class affinity category hashes
const CATEGORY_WARLOCK: u32 = 21;
const CATEGORY_TITAN: u32 = 22;
const CATEGORY_HUNTER: u32 = 23;

/// Stat display order for weapons whose type has no dedicated arrangement.
const DEFAULT_ARRANGEMENT: &[&str] = &[
    "Impact",
    "Range",
    "Stability",
    "Handling",
    "Reload Speed",
    "Rounds Per Minute",
    "Magazine",
];

/// Per-weapon-type stat arrangements, keyed by item category hash. The
/// first flag present on an item wins, so the flags must stay disjoint
/// across rows (`assert_arrangements_disjoint` checks this in tests and
/// debug builds).
const WEAPON_ARRANGEMENTS: &[(u32, &[&str])] = &[
    // Swords
    (
        54,
        &[
            "Impact",
            "Swing Speed",
            "Charge Rate",
            "Guard Resistance",
            "Guard Efficiency",
            "Guard Endurance",
            "Ammo Capacity",
        ],
    ),
    // Fusion rifles
    (
        9,
        &[
            "Impact",
            "Range",
            "Stability",
            "Handling",
            "Reload Speed",
            "Charge Time",
            "Magazine",
        ],
    ),
    // Rocket launchers
    (
        13,
        &[
            "Blast Radius",
            "Velocity",
            "Stability",
            "Handling",
            "Reload Speed",
            "Rounds Per Minute",
            "Magazine",
        ],
    ),
    // Grenade launchers
    (
        153950757,
        &[
            "Blast Radius",
            "Velocity",
            "Stability",
            "Handling",
            "Reload Speed",
            "Rounds Per Minute",
            "Magazine",
        ],
    ),
    // Bows
    (
        3317538576,
        &[
            "Impact",
            "Accuracy",
            "Stability",
            "Handling",
            "Reload Speed",
            "Draw Time",
        ],
    ),
];

/// Armor stat display order.
const ARMOR_ARRANGEMENT: &[&str] = &[
    "Mobility",
    "Resilience",
    "Recovery",
    "Discipline",
    "Intellect",
    "Strength",
];

fn assert_arrangements_disjoint() {
    for (i, (flag, _)) in WEAPON_ARRANGEMENTS.iter().enumerate() {
        for (other, _) in &WEAPON_ARRANGEMENTS[i + 1..] {
            debug_assert_ne!(flag, other, "duplicate arrangement flag {}", flag);
        }
    }
}

/// Pick the stat arrangement for a weapon definition: first arrangement
/// whose flag appears in the item's categories, else the default.
fn weapon_arrangement(definition: &ItemDefinition) -> &'static [&'static str] {
    WEAPON_ARRANGEMENTS
        .iter()
        .find(|(flag, _)| definition.item_category_hashes.contains(flag))
        .map(|(_, arrangement)| *arrangement)
        .unwrap_or(DEFAULT_ARRANGEMENT)
}

fn class_affinity(definition: &ItemDefinition) -> Option<GuardianClass> {
    let categories = &definition.item_category_hashes;
    if categories.contains(&CATEGORY_WARLOCK) {
        Some(GuardianClass::Warlock)
    } else if categories.contains(&CATEGORY_TITAN) {
        Some(GuardianClass::Titan)
    } else if categories.contains(&CATEGORY_HUNTER) {
        Some(GuardianClass::Hunter)
    } else {
        None
    }
}

/// Class-specific bond/mark/cloak names collapse into one display type.
fn fold_item_type(item_type: &str) -> String {
    match item_type {
        "Warlock Bond" | "Titan Mark" | "Hunter Cloak" => "Class Item".to_string(),
        other => other.to_string(),
    }
}

/// Resolve raw stat rolls into named stats, then re-emit them in the
/// arrangement's declared order. Stats absent from the arrangement are
/// dropped; a weapon or armor roll with no resolvable stats is an error.
fn order_stats(
    catalog: &Catalog,
    stats: &StatsComponent,
    arrangement: &[&str],
) -> Result<Vec<ItemStat>> {
    let mut by_name: BTreeMap<String, ItemStat> = BTreeMap::new();
    for raw in stats.stats.values() {
        let definition: StatDefinition = catalog
            .decode(STAT_DEFINITION, raw.stat_hash)
            .with_context(|| format!("unknown stat {}", raw.stat_hash))?;
        by_name.insert(
            definition.display_properties.name.clone(),
            ItemStat {
                stat_hash: raw.stat_hash,
                name: definition.display_properties.name,
                value: raw.value,
            },
        );
    }

    Ok(arrangement
        .iter()
        .filter_map(|name| by_name.get(*name).cloned())
        .collect())
}

/// Resolve socket plugs into perks grouped by their display type. Sockets
/// with no plug are skipped; duplicate perk names within a group collapse,
/// last write wins.
fn collect_perks(
    catalog: &Catalog,
    sockets: &SocketsComponent,
) -> Result<BTreeMap<String, BTreeMap<String, ItemPerk>>> {
    let mut groups: BTreeMap<String, BTreeMap<String, ItemPerk>> = BTreeMap::new();
    for socket in &sockets.sockets {
        let Some(plug_hash) = socket.plug_hash else {
            continue;
        };
        let plug: ItemDefinition = catalog
            .decode(ITEM_DEFINITION, plug_hash)
            .with_context(|| format!("unknown plug {}", plug_hash))?;
        let group = groups
            .entry(plug.item_type_display_name.clone())
            .or_default();
        group.insert(
            plug.display_properties.name.clone(),
            ItemPerk {
                perk_hash: plug_hash,
                name: plug.display_properties.name,
                description: plug.display_properties.description,
            },
        );
    }
    Ok(groups)
}

fn enrich(
    definition: &ItemDefinition,
    guardian_class: Option<GuardianClass>,
    costs: Vec<ItemCost>,
    stats: Vec<ItemStat>,
    perks: BTreeMap<String, BTreeMap<String, ItemPerk>>,
) -> EnrichedItem {
    EnrichedItem {
        item_hash: definition.hash,
        name: definition.display_properties.name.clone(),
        icon: definition.display_properties.icon.clone(),
        tier: definition.inventory.tier_type,
        tier_name: definition.inventory.tier_type_name.clone(),
        item_type: fold_item_type(&definition.item_type_display_name),
        guardian_class,
        costs,
        stats,
        perks,
    }
}

/// Classify and enrich every listing in a snapshot.
///
/// Any resolution failure on a weapon or armor listing aborts the batch:
/// an entry with silently missing stats would be worse than no entry.
pub fn classify(catalog: &Catalog, snapshot: &VendorSnapshot) -> Result<ClassifiedSales> {
    assert_arrangements_disjoint();

    let mut out = ClassifiedSales::default();
    for (listing, sale) in &snapshot.sales {
        let definition: ItemDefinition = catalog
            .decode(ITEM_DEFINITION, sale.item_hash)
            .with_context(|| format!("listing {} has no definition", listing))?;

        let costs: Vec<ItemCost> = sale
            .costs
            .iter()
            .map(|c| ItemCost {
                item_hash: c.item_hash,
                quantity: c.quantity,
            })
            .collect();
        let key = sale.item_hash.to_string();
        let categories = &definition.item_category_hashes;

        if categories.contains(&CATEGORY_MODS) {
            out.mods.insert(
                key,
                enrich(&definition, None, costs, Vec::new(), BTreeMap::new()),
            );
        } else if categories.contains(&CATEGORY_SHADERS) {
            out.shaders.insert(
                key,
                enrich(&definition, None, costs, Vec::new(), BTreeMap::new()),
            );
        } else if categories.contains(&CATEGORY_WEAPONS) {
            let stats_component = snapshot
                .stats
                .get(listing)
                .with_context(|| format!("weapon listing {} has no stats", listing))?;
            let arrangement = weapon_arrangement(&definition);
            let stats = order_stats(catalog, stats_component, arrangement)?;
            let perks = match snapshot.sockets.get(listing) {
                Some(sockets) => collect_perks(catalog, sockets)?,
                None => BTreeMap::new(),
            };
            out.weapons
                .insert(key, enrich(&definition, None, costs, stats, perks));
        } else if categories.contains(&CATEGORY_ARMOR) {
            let stats_component = snapshot
                .stats
                .get(listing)
                .with_context(|| format!("armor listing {} has no stats", listing))?;
            let stats = order_stats(catalog, stats_component, ARMOR_ARRANGEMENT)?;
            let perks = match snapshot.sockets.get(listing) {
                Some(sockets) => collect_perks(catalog, sockets)?,
                None => BTreeMap::new(),
            };
            out.armor.insert(
                key,
                enrich(&definition, class_affinity(&definition), costs, stats, perks),
            );
        } else {
            debug!(
                "[CLASSIFY] Listing {} ({}) matches no category, dropped",
                listing, definition.display_properties.name
            );
        }
    }

    Ok(out)
}
