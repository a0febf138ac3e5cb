use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::error::Result;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Bump when the artwork tables change shape. Older databases are dropped
/// and recreated, since every row can be fetched again.
pub const SCHEMA_VERSION: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaStatus {
    Created,
    Current,
    /// The tables were dropped and recreated; any image files they pointed
    /// at are now orphaned.
    Reset { from: i32 },
}

pub fn create_pool(db_path: &str) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(db_path);
    let pool = Pool::new(manager)?;
    Ok(pool)
}

pub fn init_database(pool: &DbPool) -> Result<SchemaStatus> {
    let mut conn = pool.get()?;
    let tx = conn.transaction()?;

    let version: i32 = tx.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    let status = if version == SCHEMA_VERSION {
        SchemaStatus::Current
    } else if version == 0 {
        SchemaStatus::Created
    } else {
        tracing::info!(
            "Artwork schema version {} does not match {}, recreating tables",
            version,
            SCHEMA_VERSION
        );
        drop_tables(&tx)?;
        SchemaStatus::Reset { from: version }
    };

    create_tables(&tx)?;
    tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    tx.commit()?;

    Ok(status)
}

pub fn drop_tables(conn: &Connection) -> Result<()> {
    conn.execute("DROP TABLE IF EXISTS album_art", [])?;
    conn.execute("DROP TABLE IF EXISTS artist_art", [])?;
    Ok(())
}

fn create_tables(conn: &Connection) -> Result<()> {
    // Absent key fields are stored as '' so UNIQUE treats them as equal.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS album_art (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            mbid TEXT NOT NULL DEFAULT '',
            name TEXT NOT NULL DEFAULT '',
            artist_name TEXT NOT NULL DEFAULT '',
            file_path TEXT,
            not_found INTEGER NOT NULL DEFAULT 0,
            fetched_at INTEGER NOT NULL,
            UNIQUE(mbid, name, artist_name),
            CHECK ((not_found = 1 AND file_path IS NULL)
                OR (not_found = 0 AND file_path IS NOT NULL))
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_album_art_mbid ON album_art(mbid)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_album_art_name ON album_art(name, artist_name)",
        [],
    )?;

    // mbid holds all of the artist's MBIDs concatenated
    conn.execute(
        "CREATE TABLE IF NOT EXISTS artist_art (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            mbid TEXT NOT NULL DEFAULT '',
            name TEXT NOT NULL DEFAULT '',
            file_path TEXT,
            not_found INTEGER NOT NULL DEFAULT 0,
            fetched_at INTEGER NOT NULL,
            UNIQUE(mbid, name),
            CHECK ((not_found = 1 AND file_path IS NULL)
                OR (not_found = 0 AND file_path IS NOT NULL))
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_artist_art_mbid ON artist_art(mbid)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_artist_art_name ON artist_art(name)",
        [],
    )?;

    Ok(())
}
