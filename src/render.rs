//! Rotation rendering and publishing.
//!
//! Builds the platform-agnostic display payload for a vendor's current
//! rotation, resolving one badge emoji per item, then posts it to the
//! vendor channel (editing the previous message in place when one exists).

use anyhow::{Context, Result};
use chrono::Utc;
use rustc_hash::FxHashMap;
use tracing::{info, warn};

use crate::bungie::VendorApi;
use crate::cache::RotationCache;
use crate::config::{self, VendorDescriptor, EXOTIC_TIER};
use crate::storage::types::BadgeRow;
use crate::storage::Store;
use crate::surface::{Badge, Surface};
use crate::types::{DisplayField, DisplayPayload, EnrichedItem, GuardianClass, RotationEntry};

/// Armor pieces render in this slot order within each class section.
const ARMOR_SLOT_ORDER: &[&str] = &[
    "Helmet",
    "Gauntlets",
    "Chest Armor",
    "Leg Armor",
    "Class Item",
];

/// Normalize an item name into a legal badge (emoji) name.
pub fn fold_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            ':' | '.' | '-' | '\'' | '(' | ')' | ' ' => '_',
            other => other,
        })
        .collect()
}

fn slot_rank(item_type: &str) -> usize {
    ARMOR_SLOT_ORDER
        .iter()
        .position(|slot| *slot == item_type)
        .unwrap_or(ARMOR_SLOT_ORDER.len())
}

/// Lazily-primed badge resolver for one hosting surface.
///
/// Badge failures degrade the render (item line without an icon) instead of
/// failing it.
pub struct BadgeCache<'a> {
    surface: &'a dyn Surface,
    api: &'a dyn VendorApi,
    store: Option<&'a Store>,
    surface_id: u64,
    known: Option<FxHashMap<String, Badge>>,
}

impl<'a> BadgeCache<'a> {
    pub fn new(
        surface: &'a dyn Surface,
        api: &'a dyn VendorApi,
        store: Option<&'a Store>,
        surface_id: u64,
    ) -> Self {
        Self {
            surface,
            api,
            store,
            surface_id,
            known: None,
        }
    }

    async fn prime(&mut self) -> Result<&mut FxHashMap<String, Badge>> {
        if self.known.is_none() {
            let badges = self.surface.list_badges(self.surface_id).await?;
            let map = badges.into_iter().map(|b| (b.name.clone(), b)).collect();
            self.known = Some(map);
        }
        Ok(self.known.as_mut().expect("primed above"))
    }

    /// Resolve the badge for an item, creating it from the item icon when
    /// absent. Armor badges are named by item hash (many armor pieces share
    /// display names across classes).
    pub async fn resolve(&mut self, item: &EnrichedItem, use_hash_name: bool) -> Option<Badge> {
        let name = if use_hash_name {
            format!("i{}", item.item_hash)
        } else {
            fold_name(&item.name)
        };

        match self.try_resolve(item, &name).await {
            Ok(badge) => Some(badge),
            Err(err) => {
                warn!("[RENDER] No badge for {}: {:#}", item.name, err);
                None
            }
        }
    }

    async fn try_resolve(&mut self, item: &EnrichedItem, name: &str) -> Result<Badge> {
        let surface_id = self.surface_id;
        let known = self.prime().await?;
        if let Some(badge) = known.get(name) {
            return Ok(badge.clone());
        }

        let icon = item
            .icon
            .as_deref()
            .with_context(|| format!("item {} has no icon", item.item_hash))?;
        let image = self.api.fetch_icon(icon).await?;
        let badge = self.surface.create_badge(surface_id, name, &image).await?;
        if let Some(store) = self.store {
            store.record_badge(&BadgeRow {
                surface_id: surface_id as i64,
                name: badge.name.clone(),
                badge_id: badge.id,
                item_hash: item.item_hash,
            })?;
        }
        self.known
            .as_mut()
            .expect("primed above")
            .insert(badge.name.clone(), badge.clone());
        Ok(badge)
    }
}

fn item_line(badge: Option<Badge>, item: &EnrichedItem) -> String {
    match badge {
        Some(badge) => format!("{} **{}** ({})", badge.mention(), item.name, item.item_type),
        None => format!("**{}** ({})", item.name, item.item_type),
    }
}

/// Build the display payload for a rotation entry.
///
/// Exotic items stay out of the regular sections and get dedicated
/// "Exotic Weapons" / "Exotic Armor" sections instead.
pub async fn render(
    entry: &RotationEntry,
    descriptor: &VendorDescriptor,
    badges: &mut BadgeCache<'_>,
) -> Result<DisplayPayload> {
    let mut fields = Vec::new();

    let mut exotic_weapon_lines = Vec::new();
    for item in entry.weapons.values().filter(|i| i.tier == EXOTIC_TIER) {
        let badge = badges.resolve(item, false).await;
        exotic_weapon_lines.push(item_line(badge, item));
    }
    if !exotic_weapon_lines.is_empty() {
        fields.push(DisplayField {
            name: "Exotic Weapons".to_string(),
            value: exotic_weapon_lines.join("\n"),
            inline: true,
        });
    }

    let mut exotic_armor_lines = Vec::new();
    for item in entry.armor.values().filter(|i| i.tier == EXOTIC_TIER) {
        let badge = badges.resolve(item, false).await;
        exotic_armor_lines.push(item_line(badge, item));
    }
    if !exotic_armor_lines.is_empty() {
        fields.push(DisplayField {
            name: "Exotic Armor".to_string(),
            value: exotic_armor_lines.join("\n"),
            inline: true,
        });
    }

    let mut weapon_lines = Vec::new();
    for item in entry.weapons.values() {
        if item.tier == EXOTIC_TIER {
            continue;
        }
        let badge = badges.resolve(item, false).await;
        weapon_lines.push(item_line(badge, item));
    }
    if !weapon_lines.is_empty() {
        fields.push(DisplayField {
            name: "Weapons".to_string(),
            value: weapon_lines.join("\n"),
            inline: false,
        });
    }

    for class in GuardianClass::ALL {
        let mut pieces: Vec<&EnrichedItem> = entry
            .armor
            .values()
            .filter(|item| item.guardian_class == Some(class) && item.tier != EXOTIC_TIER)
            .collect();
        if pieces.is_empty() {
            continue;
        }
        pieces.sort_by_key(|item| slot_rank(&item.item_type));

        let mut lines = Vec::new();
        for item in pieces {
            let badge = badges.resolve(item, true).await;
            lines.push(item_line(badge, item));
        }
        fields.push(DisplayField {
            name: format!("{} Armor", class),
            value: lines.join("\n"),
            inline: true,
        });
    }

    let mut shader_lines = Vec::new();
    for item in entry.shaders.values() {
        let badge = badges.resolve(item, false).await;
        shader_lines.push(item_line(badge, item));
    }
    if !shader_lines.is_empty() {
        fields.push(DisplayField {
            name: "Shaders".to_string(),
            value: shader_lines.join("\n"),
            inline: false,
        });
    }

    let mut mod_lines = Vec::new();
    for item in entry.mods.values() {
        let badge = badges.resolve(item, false).await;
        mod_lines.push(item_line(badge, item));
    }
    if !mod_lines.is_empty() {
        fields.push(DisplayField {
            name: "Mods".to_string(),
            value: mod_lines.join("\n"),
            inline: false,
        });
    }

    let mut description = descriptor.description.to_string();
    if let Some(index) = entry.vendor.location_index {
        if let Some(location) = usize::try_from(index)
            .ok()
            .and_then(|i| descriptor.locations.get(i))
        {
            description.push_str(&format!("\n\nCurrent location: **{}**", location));
        }
    }

    Ok(DisplayPayload {
        title: descriptor.title.to_string(),
        description,
        thumbnail_url: Some(descriptor.thumbnail_url.to_string()),
        image_url: Some(descriptor.image_url.to_string()),
        fields,
        footer: format!("Last updated: {} UTC", Utc::now().format("%Y-%m-%d %H:%M")),
    })
}

/// Render and publish the current rotation for one vendor, editing the
/// previous message in place when one exists.
pub async fn publish(
    cache: &RotationCache,
    surface: &dyn Surface,
    api: &dyn VendorApi,
    vendor_hash: u32,
) -> Result<()> {
    let entry = cache
        .get(vendor_hash)
        .await
        .with_context(|| format!("no cached rotation for vendor {}", vendor_hash))?;
    let descriptor = config::vendor_descriptor(vendor_hash)
        .with_context(|| format!("no descriptor for vendor {}", vendor_hash))?;

    let mut badges = BadgeCache::new(surface, api, Some(cache.store()), descriptor.badge_surface);
    let payload = render(&entry, descriptor, &mut badges).await?;

    let channel = config::vendor_channel_id();
    match entry.message_id {
        Some(message_id) => {
            surface.edit_message(channel, message_id, &payload).await?;
            info!("[RENDER] Updated rotation message {} for {}", message_id, descriptor.title);
        }
        None => {
            let message_id = surface.post_message(channel, &payload).await?;
            cache.set_last_message(vendor_hash, message_id).await?;
            info!("[RENDER] Posted rotation message {} for {}", message_id, descriptor.title);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bungie::{ProbeStatus, SessionContext, UpstreamError, VendorResponse};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;
    use crate::types::{ClassifiedSales, VendorMeta};

    struct FakeSurface {
        badges: Mutex<Vec<Badge>>,
        next_id: AtomicU64,
    }

    impl FakeSurface {
        fn new() -> Self {
            Self {
                badges: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }
        }
    }

    #[async_trait]
    impl Surface for FakeSurface {
        async fn list_badges(&self, _surface_id: u64) -> Result<Vec<Badge>> {
            Ok(self.badges.lock().unwrap().clone())
        }

        async fn create_badge(&self, _surface_id: u64, name: &str, _image: &[u8]) -> Result<Badge> {
            let badge = Badge {
                id: self.next_id.fetch_add(1, Ordering::SeqCst),
                name: name.to_string(),
            };
            self.badges.lock().unwrap().push(badge.clone());
            Ok(badge)
        }

        async fn delete_badge(&self, _surface_id: u64, _badge_id: u64) -> Result<()> {
            Ok(())
        }

        async fn post_message(&self, _channel_id: u64, _payload: &DisplayPayload) -> Result<u64> {
            Ok(1)
        }

        async fn edit_message(
            &self,
            _channel_id: u64,
            _message_id: u64,
            _payload: &DisplayPayload,
        ) -> Result<()> {
            Ok(())
        }

        async fn notify_operator(&self, _text: &str) -> Result<()> {
            Ok(())
        }
    }

    struct IconApi;

    #[async_trait]
    impl VendorApi for IconApi {
        async fn probe(&self, _session: &SessionContext) -> ProbeStatus {
            ProbeStatus::Ok
        }

        async fn get_vendor(
            &self,
            _session: &SessionContext,
            _character_id: i64,
            _vendor_hash: u32,
        ) -> Result<VendorResponse, UpstreamError> {
            Err(UpstreamError::NoResponse)
        }

        async fn fetch_icon(&self, _path: &str) -> Result<Vec<u8>> {
            Ok(vec![0x89, 0x50, 0x4e, 0x47])
        }
    }

    fn item(hash: u32, name: &str, item_type: &str, tier: u8, class: Option<GuardianClass>) -> EnrichedItem {
        EnrichedItem {
            item_hash: hash,
            name: name.to_string(),
            icon: Some("/icons/x.png".to_string()),
            tier,
            tier_name: if tier == 6 { "Exotic" } else { "Legendary" }.to_string(),
            item_type: item_type.to_string(),
            guardian_class: class,
            costs: vec![],
            stats: vec![],
            perks: BTreeMap::new(),
        }
    }

    fn entry_for(
        vendor: crate::types::VendorId,
        classified: ClassifiedSales,
        location_index: Option<i64>,
    ) -> RotationEntry {
        RotationEntry::from_classified(
            VendorMeta {
                vendor_hash: vendor.hash(),
                location_index,
                ..VendorMeta::default()
            },
            NaiveDate::from_ymd_opt(2026, 8, 25).unwrap(),
            classified,
            None,
        )
    }

    fn entry_with(classified: ClassifiedSales) -> RotationEntry {
        entry_for(crate::types::VendorId::Gunsmith, classified, None)
    }

    #[test]
    fn test_fold_name_replaces_special_characters() {
        assert_eq!(fold_name("Dead Man's Tale"), "Dead_Man_s_Tale");
        assert_eq!(fold_name("Song of Ir Yût"), "Song_of_Ir_Yût");
        assert_eq!(fold_name("BrayTech (Archived)"), "BrayTech__Archived_");
    }

    #[tokio::test]
    async fn test_exotics_render_only_in_dedicated_section() {
        let mut classified = ClassifiedSales::default();
        classified
            .weapons
            .insert("1".into(), item(1, "Rare Rifle", "Auto Rifle", 5, None));
        classified
            .weapons
            .insert("2".into(), item(2, "Exotic Rifle", "Auto Rifle", 6, None));
        let entry = entry_with(classified);
        assert_eq!(entry.weapons.len(), 2);

        let surface = FakeSurface::new();
        let api = IconApi;
        let mut badges = BadgeCache::new(&surface, &api, None, 10);
        let descriptor = config::vendor_descriptor(entry.vendor_hash).unwrap();
        let payload = render(&entry, descriptor, &mut badges).await.unwrap();

        let weapons = payload
            .fields
            .iter()
            .find(|f| f.name == "Weapons")
            .unwrap();
        assert!(weapons.value.contains("Rare Rifle"));
        assert!(!weapons.value.contains("Exotic Rifle"));

        let exotics = payload
            .fields
            .iter()
            .find(|f| f.name == "Exotic Weapons")
            .unwrap();
        assert!(exotics.value.contains("Exotic Rifle"));
        assert!(!exotics.value.contains("Rare Rifle"));
    }

    #[tokio::test]
    async fn test_all_exotic_stock_still_renders_with_location() {
        let mut classified = ClassifiedSales::default();
        classified
            .weapons
            .insert("1".into(), item(1, "Telesto", "Fusion Rifle", 6, None));
        classified.armor.insert(
            "2".into(),
            item(2, "Nezarec's Sin", "Helmet", 6, Some(GuardianClass::Warlock)),
        );
        let entry = entry_for(crate::types::VendorId::AgentOfNine, classified, Some(1));

        let surface = FakeSurface::new();
        let api = IconApi;
        let mut badges = BadgeCache::new(&surface, &api, None, 10);
        let descriptor = config::vendor_descriptor(entry.vendor_hash).unwrap();
        let payload = render(&entry, descriptor, &mut badges).await.unwrap();

        let names: Vec<&str> = payload.fields.iter().map(|f| f.name.as_str()).collect();
        assert!(names.contains(&"Exotic Weapons"));
        assert!(names.contains(&"Exotic Armor"));
        assert!(!names.contains(&"Weapons"));
        assert!(!names.contains(&"Warlock Armor"));
        assert!(payload
            .description
            .contains("Current location: **European Dead Zone, EDZ**"));
    }

    #[tokio::test]
    async fn test_location_index_without_known_locations_is_ignored() {
        let mut classified = ClassifiedSales::default();
        classified
            .weapons
            .insert("1".into(), item(1, "Rare Rifle", "Auto Rifle", 5, None));
        let entry = entry_for(crate::types::VendorId::Gunsmith, classified, Some(1));

        let surface = FakeSurface::new();
        let api = IconApi;
        let mut badges = BadgeCache::new(&surface, &api, None, 10);
        let descriptor = config::vendor_descriptor(entry.vendor_hash).unwrap();
        let payload = render(&entry, descriptor, &mut badges).await.unwrap();

        assert!(!payload.description.contains("Current location"));
    }

    #[tokio::test]
    async fn test_shaders_and_mods_get_badges() {
        let mut classified = ClassifiedSales::default();
        classified
            .shaders
            .insert("1".into(), item(1, "Amethyst Veil", "Shader", 3, None));
        classified
            .mods
            .insert("2".into(), item(2, "Targeting Adjuster", "Weapon Mod", 3, None));
        let entry = entry_with(classified);

        let surface = FakeSurface::new();
        let api = IconApi;
        let mut badges = BadgeCache::new(&surface, &api, None, 10);
        let descriptor = config::vendor_descriptor(entry.vendor_hash).unwrap();
        let payload = render(&entry, descriptor, &mut badges).await.unwrap();

        let shaders = payload.fields.iter().find(|f| f.name == "Shaders").unwrap();
        assert!(shaders.value.starts_with("<:Amethyst_Veil:"));
        let mods = payload.fields.iter().find(|f| f.name == "Mods").unwrap();
        assert!(mods.value.starts_with("<:Targeting_Adjuster:"));
        assert_eq!(surface.badges.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_armor_sections_follow_slot_order() {
        let mut classified = ClassifiedSales::default();
        classified.armor.insert(
            "3".into(),
            item(3, "Bond of Remembrance", "Class Item", 5, Some(GuardianClass::Warlock)),
        );
        classified.armor.insert(
            "4".into(),
            item(4, "Wildwood Helm", "Helmet", 5, Some(GuardianClass::Warlock)),
        );
        classified.armor.insert(
            "5".into(),
            item(5, "Wildwood Plate", "Chest Armor", 5, Some(GuardianClass::Warlock)),
        );
        let entry = entry_with(classified);

        let surface = FakeSurface::new();
        let api = IconApi;
        let mut badges = BadgeCache::new(&surface, &api, None, 10);
        let descriptor = config::vendor_descriptor(entry.vendor_hash).unwrap();
        let payload = render(&entry, descriptor, &mut badges).await.unwrap();

        let warlock = payload
            .fields
            .iter()
            .find(|f| f.name == "Warlock Armor")
            .unwrap();
        let helm = warlock.value.find("Wildwood Helm").unwrap();
        let plate = warlock.value.find("Wildwood Plate").unwrap();
        let bond = warlock.value.find("Bond of Remembrance").unwrap();
        assert!(helm < plate && plate < bond);
    }

    #[tokio::test]
    async fn test_badges_created_once_and_reused() {
        let mut classified = ClassifiedSales::default();
        classified
            .weapons
            .insert("1".into(), item(1, "Rare Rifle", "Auto Rifle", 5, None));
        let entry = entry_with(classified);
        let descriptor = config::vendor_descriptor(entry.vendor_hash).unwrap();

        let surface = FakeSurface::new();
        let api = IconApi;

        let mut badges = BadgeCache::new(&surface, &api, None, 10);
        render(&entry, descriptor, &mut badges).await.unwrap();
        let mut badges = BadgeCache::new(&surface, &api, None, 10);
        render(&entry, descriptor, &mut badges).await.unwrap();

        assert_eq!(surface.badges.lock().unwrap().len(), 1);
        assert_eq!(surface.badges.lock().unwrap()[0].name, "Rare_Rifle");
    }
}
