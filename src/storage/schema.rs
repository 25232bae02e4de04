//! SQLite schema for the rotation document store.

use anyhow::Result;
use rusqlite::Connection;

pub fn create_tables(conn: &Connection) -> Result<()> {
    // One row per vendor; the serialized entry is the document of record.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS destiny_rotation (
            vendor_hash INTEGER PRIMARY KEY,
            date TEXT NOT NULL,
            entry TEXT NOT NULL,
            message_id INTEGER
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS tokens (
            discord_id INTEGER PRIMARY KEY,
            access_token TEXT NOT NULL,
            refreshed_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS members (
            discord_id INTEGER PRIMARY KEY,
            destiny_profile TEXT NOT NULL
        )",
        [],
    )?;

    // Badge bookkeeping, keyed by hosting surface and badge name.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS badges (
            surface_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            badge_id INTEGER NOT NULL,
            item_hash INTEGER NOT NULL,
            PRIMARY KEY (surface_id, name)
        )",
        [],
    )?;

    Ok(())
}
