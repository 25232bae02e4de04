//! Reference catalog lookup backed by the bulk-loaded manifest.
//!
//! The manifest is a versioned dump of every game-content definition keyed by
//! stable integer hashes. A separate operator step (`load_manifest`) copies
//! the vendor-provided SQLite dump into our own `definitions` table; at
//! runtime every lookup goes through an in-memory memo so each definition is
//! deserialized from SQL at most once per process.

use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use anyhow::{anyhow, Context, Result};
use rusqlite::Connection;
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::info;

/// Definition table holding inventory items (weapons, armor, shaders, plugs).
pub const ITEM_DEFINITION: &str = "DestinyInventoryItemDefinition";

/// Definition table holding stat display names.
pub const STAT_DEFINITION: &str = "DestinyStatDefinition";

// === Typed definition documents ===

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayProperties {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemInventory {
    pub tier_type: u8,
    pub tier_type_name: String,
}

/// An inventory item definition, as stored in the manifest.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDefinition {
    pub hash: u32,
    pub display_properties: DisplayProperties,
    #[serde(default)]
    pub item_category_hashes: Vec<u32>,
    #[serde(default)]
    pub item_type_display_name: String,
    pub inventory: ItemInventory,
}

/// A stat definition (display name for a stat hash).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatDefinition {
    pub hash: u32,
    pub display_properties: DisplayProperties,
}

// === Catalog ===

/// Key-value lookup from (definition-table, hash) to a definition document.
pub struct Catalog {
    conn: Mutex<Connection>,
    memo: RwLock<FxHashMap<(String, u32), Arc<serde_json::Value>>>,
}

impl Catalog {
    /// Open (or create) the catalog store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path).context("failed to open catalog database")?;
        Self::from_connection(conn)
    }

    /// Build a catalog over an existing connection (tests use `:memory:`).
    pub fn from_connection(conn: Connection) -> Result<Self> {
        create_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            memo: RwLock::new(FxHashMap::default()),
        })
    }

    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Resolve `(table, hash)` to a typed definition.
    ///
    /// Returns an error if the definition is absent or does not match the
    /// expected shape; callers treat either as a classification failure.
    pub fn decode<T: DeserializeOwned>(&self, table: &str, hash: u32) -> Result<T> {
        let key = (table.to_string(), hash);
        let cached = self.memo.read().expect("memo lock poisoned").get(&key).cloned();
        let value = match cached {
            Some(v) => v,
            None => {
                let raw = self.fetch_json(table, hash)?;
                let value: Arc<serde_json::Value> = Arc::new(
                    serde_json::from_str(&raw)
                        .with_context(|| format!("malformed definition {table}:{hash}"))?,
                );
                self.memo
                    .write()
                    .expect("memo lock poisoned")
                    .insert(key, value.clone());
                value
            }
        };
        serde_json::from_value((*value).clone())
            .with_context(|| format!("unexpected definition shape for {table}:{hash}"))
    }

    fn fetch_json(&self, table: &str, hash: u32) -> Result<String> {
        let conn = self.conn.lock().expect("catalog lock poisoned");
        let mut stmt =
            conn.prepare_cached("SELECT json FROM definitions WHERE table_name = ?1 AND hash = ?2")?;
        let mut rows = stmt.query(rusqlite::params![table, hash])?;
        match rows.next()? {
            Some(row) => Ok(row.get(0)?),
            None => Err(anyhow!("definition not found: {table}:{hash}")),
        }
    }

    /// Insert or replace a single definition (used by the bulk loader and tests).
    pub fn insert_definition(&self, table: &str, hash: u32, json: &serde_json::Value) -> Result<()> {
        let conn = self.conn.lock().expect("catalog lock poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO definitions (table_name, hash, json) VALUES (?1, ?2, ?3)",
            rusqlite::params![table, hash, serde_json::to_string(json)?],
        )?;
        Ok(())
    }

    /// Record the manifest version the catalog was loaded from.
    pub fn set_version(&self, version: &str) -> Result<()> {
        let conn = self.conn.lock().expect("catalog lock poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO catalog_meta (key, value) VALUES ('manifest_version', ?1)",
            [version],
        )?;
        Ok(())
    }

    pub fn version(&self) -> Result<Option<String>> {
        let conn = self.conn.lock().expect("catalog lock poisoned");
        let mut stmt = conn.prepare("SELECT value FROM catalog_meta WHERE key = 'manifest_version'")?;
        let mut rows = stmt.query([])?;
        Ok(match rows.next()? {
            Some(row) => Some(row.get(0)?),
            None => None,
        })
    }
}

fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS definitions (
            table_name TEXT NOT NULL,
            hash INTEGER NOT NULL,
            json TEXT NOT NULL,
            PRIMARY KEY (table_name, hash)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS catalog_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

// === Bulk loader ===

/// Summary of one manifest load.
#[derive(Debug, Default)]
pub struct LoadSummary {
    pub tables: usize,
    pub definitions: usize,
}

/// Copy every `*Definition` table from a vendor-provided manifest dump into
/// the catalog. The dump stores each hash as a signed 32-bit row id; we
/// convert back to the canonical unsigned form.
pub fn load_manifest_dump<P: AsRef<Path>>(
    dump_path: P,
    catalog: &Catalog,
    version: &str,
) -> Result<LoadSummary> {
    let src = Connection::open(dump_path).context("failed to open manifest dump")?;

    let tables: Vec<String> = {
        let mut stmt = src.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE '%Definition' ORDER BY name",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<std::result::Result<_, _>>()?
    };

    let mut summary = LoadSummary::default();
    {
        let dest = catalog.conn.lock().expect("catalog lock poisoned");
        for table in &tables {
            let mut stmt = src.prepare(&format!("SELECT id, json FROM \"{table}\""))?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?;

            dest.execute_batch("BEGIN")?;
            let mut count = 0usize;
            for row in rows {
                let (id, json) = row?;
                let hash = id as i32 as u32;
                dest.execute(
                    "INSERT OR REPLACE INTO definitions (table_name, hash, json) VALUES (?1, ?2, ?3)",
                    rusqlite::params![table, hash, json],
                )?;
                count += 1;
            }
            dest.execute_batch("COMMIT")?;

            info!("[CATALOG] Loaded {} definitions from {}", count, table);
            summary.tables += 1;
            summary.definitions += count;
        }
    }

    catalog.set_version(version)?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item_json(hash: u32, name: &str) -> serde_json::Value {
        json!({
            "hash": hash,
            "displayProperties": { "name": name, "description": "", "icon": "/icons/test.png" },
            "itemCategoryHashes": [1, 5],
            "itemTypeDisplayName": "Auto Rifle",
            "inventory": { "tierType": 3, "tierTypeName": "Rare" }
        })
    }

    #[test]
    fn test_decode_typed_definition() {
        let catalog = Catalog::in_memory().unwrap();
        catalog
            .insert_definition(ITEM_DEFINITION, 999, &item_json(999, "Test Rifle"))
            .unwrap();

        let def: ItemDefinition = catalog.decode(ITEM_DEFINITION, 999).unwrap();
        assert_eq!(def.display_properties.name, "Test Rifle");
        assert_eq!(def.inventory.tier_type, 3);
        assert_eq!(def.item_category_hashes, vec![1, 5]);
    }

    #[test]
    fn test_missing_definition_is_an_error() {
        let catalog = Catalog::in_memory().unwrap();
        let result: Result<ItemDefinition> = catalog.decode(ITEM_DEFINITION, 12345);
        assert!(result.is_err());
    }

    #[test]
    fn test_memo_serves_repeat_lookups() {
        let catalog = Catalog::in_memory().unwrap();
        catalog
            .insert_definition(STAT_DEFINITION, 7, &json!({
                "hash": 7,
                "displayProperties": { "name": "Impact" }
            }))
            .unwrap();

        let first: StatDefinition = catalog.decode(STAT_DEFINITION, 7).unwrap();
        // Second decode hits the memo; dropping the row underneath must not matter.
        {
            let conn = catalog.conn.lock().unwrap();
            conn.execute("DELETE FROM definitions", []).unwrap();
        }
        let second: StatDefinition = catalog.decode(STAT_DEFINITION, 7).unwrap();
        assert_eq!(first.display_properties.name, second.display_properties.name);
    }

    #[test]
    fn test_signed_id_converts_to_hash() {
        // 2190858386 as a signed 32-bit row id is negative; the loader must
        // recover the unsigned hash.
        let id = 2190858386u32 as i32 as i64;
        assert!(id < 0);
        assert_eq!(id as i32 as u32, 2190858386);
    }

    #[test]
    fn test_version_roundtrip() {
        let catalog = Catalog::in_memory().unwrap();
        assert_eq!(catalog.version().unwrap(), None);
        catalog.set_version("2026.08.1").unwrap();
        assert_eq!(catalog.version().unwrap().as_deref(), Some("2026.08.1"));
    }
}
