//! Document-style access to the rotation SQLite database.
//!
//! Methods are synchronous; async callers hold the connection only as long
//! as one statement takes, which is fine at this call volume.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use crate::storage::schema;
use crate::storage::types::{BadgeRow, DestinyProfile, TokenRow};
use crate::types::RotationEntry;

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path).context("failed to open rotation database")?;
        schema::create_tables(&conn)?;
        info!("[STORE] Rotation database ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::create_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // === Rotation entries ===

    /// Persist the full entry for its vendor, replacing any previous day.
    pub fn upsert_rotation(&self, entry: &RotationEntry) -> Result<()> {
        let conn = self.conn.lock().expect("store lock poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO destiny_rotation (vendor_hash, date, entry, message_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.vendor_hash,
                entry.date.to_string(),
                serde_json::to_string(entry)?,
                entry.message_id.map(|id| id as i64),
            ],
        )?;
        Ok(())
    }

    /// Load every stored rotation entry (warm-start path).
    pub fn load_rotations(&self) -> Result<Vec<RotationEntry>> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn.prepare("SELECT entry FROM destiny_rotation")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut entries = Vec::new();
        for row in rows {
            let json = row?;
            entries.push(serde_json::from_str(&json).context("corrupt rotation entry")?);
        }
        Ok(entries)
    }

    /// Record the rendered message for a vendor without touching the entry body.
    pub fn set_rotation_message(&self, vendor_hash: u32, message_id: u64) -> Result<()> {
        let conn = self.conn.lock().expect("store lock poisoned");
        conn.execute(
            "UPDATE destiny_rotation SET message_id = ?2,
             entry = json_set(entry, '$.message_id', ?2)
             WHERE vendor_hash = ?1",
            params![vendor_hash, message_id as i64],
        )?;
        Ok(())
    }

    // === Tokens ===

    pub fn find_token(&self, discord_id: i64) -> Result<Option<TokenRow>> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let row = conn
            .query_row(
                "SELECT discord_id, access_token, refreshed_at FROM tokens WHERE discord_id = ?1",
                [discord_id],
                |row| {
                    Ok(TokenRow {
                        discord_id: row.get(0)?,
                        access_token: row.get(1)?,
                        refreshed_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn upsert_token(&self, token: &TokenRow) -> Result<()> {
        let conn = self.conn.lock().expect("store lock poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO tokens (discord_id, access_token, refreshed_at)
             VALUES (?1, ?2, ?3)",
            params![token.discord_id, token.access_token, token.refreshed_at],
        )?;
        Ok(())
    }

    // === Member profiles ===

    pub fn find_member_profile(&self, discord_id: i64) -> Result<Option<DestinyProfile>> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let json: Option<String> = conn
            .query_row(
                "SELECT destiny_profile FROM members WHERE discord_id = ?1",
                [discord_id],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(json) => Ok(Some(
                serde_json::from_str(&json).context("corrupt member profile")?,
            )),
            None => Ok(None),
        }
    }

    pub fn upsert_member_profile(&self, discord_id: i64, profile: &DestinyProfile) -> Result<()> {
        let conn = self.conn.lock().expect("store lock poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO members (discord_id, destiny_profile) VALUES (?1, ?2)",
            params![discord_id, serde_json::to_string(profile)?],
        )?;
        Ok(())
    }

    // === Badges ===

    pub fn record_badge(&self, badge: &BadgeRow) -> Result<()> {
        let conn = self.conn.lock().expect("store lock poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO badges (surface_id, name, badge_id, item_hash)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                badge.surface_id,
                badge.name,
                badge.badge_id as i64,
                badge.item_hash
            ],
        )?;
        Ok(())
    }

    pub fn clear_badges(&self, surface_id: i64) -> Result<()> {
        let conn = self.conn.lock().expect("store lock poisoned");
        conn.execute("DELETE FROM badges WHERE surface_id = ?1", [surface_id])?;
        Ok(())
    }
}
