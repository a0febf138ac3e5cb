//! Persistent artwork index.
//!
//! Two independent tables (`album_art`, `artist_art`) map an entity's
//! natural key to either a content-addressed image file or a "not found"
//! marker. Every operation on a table, reads included, holds that table's
//! lock, so a reader sees a row and its file either entirely before or
//! entirely after a write.

use std::path::PathBuf;

use chrono::Utc;
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use super::keys::{resolve_keys, LookupKey, NaturalKey};
use super::store::{content_address, ImageFileStore};
use super::types::{
    ArtworkEntry, ArtworkKind, ArtworkLookup, ArtworkRequest, IndexStats, RecordOutcome,
};
use crate::db::{self, DbPool, SchemaStatus};
use crate::error::Result;

pub struct ArtworkIndex {
    pool: DbPool,
    files: ImageFileStore,
    album_lock: Mutex<()>,
    artist_lock: Mutex<()>,
}

impl ArtworkIndex {
    /// Wrap an already initialized database.
    pub fn new(pool: DbPool, files: ImageFileStore) -> Self {
        Self {
            pool,
            files,
            album_lock: Mutex::new(()),
            artist_lock: Mutex::new(()),
        }
    }

    /// Initialize the schema and wrap it. If the schema had to be recreated,
    /// the image directories are purged as well since nothing references
    /// their files anymore.
    pub fn open(pool: DbPool, image_dir: impl Into<PathBuf>) -> Result<Self> {
        let status = db::init_database(&pool)?;
        let index = Self::new(pool, ImageFileStore::new(image_dir));

        if let SchemaStatus::Reset { from } = status {
            for kind in ArtworkKind::ALL {
                let removed = index.files.clear_directory(kind)?;
                tracing::info!(
                    "Schema reset from version {}: removed {} orphaned {} images",
                    from,
                    removed,
                    kind.as_str()
                );
            }
        }

        Ok(index)
    }

    pub fn files(&self) -> &ImageFileStore {
        &self.files
    }

    fn lock(&self, kind: ArtworkKind) -> MutexGuard<'_, ()> {
        match kind {
            ArtworkKind::Album => self.album_lock.lock(),
            ArtworkKind::Artist => self.artist_lock.lock(),
        }
    }

    /// Look up a request using its resolved keys.
    pub fn lookup(&self, request: &ArtworkRequest) -> ArtworkLookup {
        self.lookup_keys(request.kind(), &resolve_keys(request))
    }

    /// Try each key in order and answer from the first matching row.
    ///
    /// Storage failures are logged and reported as [`ArtworkLookup::Absent`],
    /// which makes the caller fetch again instead of failing.
    pub fn lookup_keys(&self, kind: ArtworkKind, keys: &[LookupKey]) -> ArtworkLookup {
        if keys.is_empty() {
            return ArtworkLookup::Absent;
        }

        let _guard = self.lock(kind);
        match self.find_first(kind, keys) {
            Ok(lookup) => lookup,
            Err(e) => {
                tracing::warn!("Artwork lookup in {} failed: {}", kind.table(), e);
                ArtworkLookup::Absent
            }
        }
    }

    fn find_first(&self, kind: ArtworkKind, keys: &[LookupKey]) -> Result<ArtworkLookup> {
        let conn = self.pool.get()?;

        for key in keys.iter().filter(|k| k.kind() == kind) {
            let (clause, values) = key.selection();
            let mut stmt = conn.prepare(&format!(
                "SELECT file_path, not_found FROM {} WHERE {}
                 ORDER BY not_found ASC, fetched_at DESC",
                kind.table(),
                clause
            ))?;
            let rows = stmt.query_map(params_from_iter(values), |row| {
                Ok((row.get::<_, Option<String>>(0)?, row.get::<_, bool>(1)?))
            })?;

            for row in rows {
                match row? {
                    (_, true) => return Ok(ArtworkLookup::NotFound),
                    (Some(file), false) => {
                        let path = self.files.resolve_path(kind, &file);
                        if path.is_file() {
                            return Ok(ArtworkLookup::Found(path));
                        }
                        // Dangling reference; a later row or key may still answer
                        tracing::debug!("Indexed image {} is missing on disk", path.display());
                    }
                    (None, false) => {}
                }
            }
        }

        Ok(ArtworkLookup::Absent)
    }

    /// Record the outcome of a fetch, replacing any row with the same natural key.
    ///
    /// `Some(bytes)` stores the image under its content address. `None`
    /// marks the entity as not found and drops any image it had.
    ///
    /// Only an unaddressable request is an error. Storage failures are
    /// logged and reported as [`RecordOutcome::NotPersisted`], leaving the
    /// previous state untouched.
    pub fn record(&self, request: &ArtworkRequest, bytes: Option<&[u8]>) -> Result<RecordOutcome> {
        let key = NaturalKey::of(request);

        let Some(bytes) = bytes else {
            if key.is_empty() {
                tracing::debug!("Not recording a miss for a request without identity");
                return Ok(RecordOutcome::NotPersisted);
            }

            let _guard = self.lock(key.kind);
            return match self.store_not_found(&key) {
                Ok(()) => Ok(RecordOutcome::MarkedNotFound),
                Err(e) => {
                    tracing::warn!("Failed to record missing {} artwork: {}", key.kind.as_str(), e);
                    Ok(RecordOutcome::NotPersisted)
                }
            };
        };

        let filename = content_address(&key)?;

        let _guard = self.lock(key.kind);
        match self.store_found(&key, &filename, bytes) {
            Ok(path) => Ok(RecordOutcome::Stored(path)),
            Err(e) => {
                tracing::warn!("Failed to store {} artwork: {}", key.kind.as_str(), e);
                Ok(RecordOutcome::NotPersisted)
            }
        }
    }

    fn store_found(&self, key: &NaturalKey, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        let conn = self.pool.get()?;

        // The row is written first and the file renamed into place before
        // the commit, so a failure on either side leaves both untouched.
        let staged = self.files.stage(key.kind, filename, bytes)?;
        let tx = conn.unchecked_transaction()?;
        upsert(&tx, key, Some(filename))?;
        let path = staged.commit()?;
        tx.commit()?;

        Ok(path)
    }

    fn store_not_found(&self, key: &NaturalKey) -> Result<()> {
        let conn = self.pool.get()?;
        let previous = current_file(&conn, key)?;

        upsert(&conn, key, None)?;

        if let Some(file) = previous {
            self.release_file(&conn, key.kind, &file);
        }
        Ok(())
    }

    /// Delete the row for this request and its image. Returns whether a row existed.
    pub fn remove_one(&self, request: &ArtworkRequest) -> Result<bool> {
        let key = NaturalKey::of(request);
        if key.is_empty() {
            return Ok(false);
        }

        let _guard = self.lock(key.kind);
        let conn = self.pool.get()?;
        let previous = current_file(&conn, &key)?;

        let (clause, values) = natural_key_selection(&key);
        let deleted = conn.execute(
            &format!("DELETE FROM {} WHERE {}", key.kind.table(), clause),
            params_from_iter(values),
        )?;

        if let Some(file) = previous {
            self.release_file(&conn, key.kind, &file);
        }

        Ok(deleted > 0)
    }

    /// Delete every row of a kind and purge its image directory.
    pub fn clear_all(&self, kind: ArtworkKind) -> Result<usize> {
        let _guard = self.lock(kind);
        let conn = self.pool.get()?;

        let deleted = conn.execute(&format!("DELETE FROM {}", kind.table()), [])?;
        let removed = self.files.clear_directory(kind)?;

        tracing::info!(
            "Cleared {} {} rows and {} images",
            deleted,
            kind.as_str(),
            removed
        );
        Ok(deleted)
    }

    /// Forget recorded misses so they are fetched again. Cached images stay.
    pub fn clear_negative(&self, kind: ArtworkKind) -> Result<usize> {
        let _guard = self.lock(kind);
        let conn = self.pool.get()?;

        let deleted = conn.execute(
            &format!("DELETE FROM {} WHERE not_found = 1", kind.table()),
            [],
        )?;

        tracing::debug!("Cleared {} negative {} rows", deleted, kind.as_str());
        Ok(deleted)
    }

    pub fn stats(&self, kind: ArtworkKind) -> Result<IndexStats> {
        let _guard = self.lock(kind);
        let conn = self.pool.get()?;

        let (found, not_found): (i64, i64) = conn.query_row(
            &format!(
                "SELECT COALESCE(SUM(not_found = 0), 0), COALESCE(SUM(not_found = 1), 0) FROM {}",
                kind.table()
            ),
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(IndexStats {
            found: found as u64,
            not_found: not_found as u64,
        })
    }

    /// The row stored under this request's natural key, if any.
    pub fn entry(&self, request: &ArtworkRequest) -> Result<Option<ArtworkEntry>> {
        let key = NaturalKey::of(request);
        let _guard = self.lock(key.kind);
        let conn = self.pool.get()?;

        let artist_column = match key.kind {
            ArtworkKind::Album => "artist_name",
            ArtworkKind::Artist => "''",
        };
        let (clause, values) = natural_key_selection(&key);
        let sql = format!(
            "SELECT mbid, name, {}, file_path, not_found, fetched_at FROM {} WHERE {}",
            artist_column,
            key.kind.table(),
            clause
        );

        let entry = conn
            .query_row(&sql, params_from_iter(values), |row| {
                Ok(ArtworkEntry {
                    mbid: row.get(0)?,
                    name: row.get(1)?,
                    artist_name: row.get(2)?,
                    file_path: row.get(3)?,
                    not_found: row.get(4)?,
                    fetched_at: row.get(5)?,
                })
            })
            .optional()?;

        Ok(entry)
    }

    /// Remove an image file unless another row still points at it.
    fn release_file(&self, conn: &Connection, kind: ArtworkKind, file: &str) {
        let still_used = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {} WHERE file_path = ?1", kind.table()),
                params![file],
                |row| row.get::<_, i64>(0),
            )
            .map(|count| count > 0);

        match still_used {
            Ok(true) => {}
            Ok(false) => {
                if let Err(e) = self.files.remove(kind, file) {
                    tracing::warn!("Failed to remove image {}: {}", file, e);
                }
            }
            Err(e) => tracing::warn!("Failed to check references to {}: {}", file, e),
        }
    }
}

fn natural_key_selection(key: &NaturalKey) -> (&'static str, Vec<&str>) {
    match key.kind {
        ArtworkKind::Album => (
            "mbid = ?1 AND name = ?2 AND artist_name = ?3",
            vec![key.mbid.as_str(), key.name.as_str(), key.artist_name.as_str()],
        ),
        ArtworkKind::Artist => (
            "mbid = ?1 AND name = ?2",
            vec![key.mbid.as_str(), key.name.as_str()],
        ),
    }
}

fn current_file(conn: &Connection, key: &NaturalKey) -> Result<Option<String>> {
    let (clause, values) = natural_key_selection(key);
    let file = conn
        .query_row(
            &format!("SELECT file_path FROM {} WHERE {}", key.kind.table(), clause),
            params_from_iter(values),
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?;
    Ok(file.flatten())
}

fn upsert(conn: &Connection, key: &NaturalKey, file: Option<&str>) -> Result<()> {
    let now = Utc::now().timestamp();
    let not_found = file.is_none();

    match key.kind {
        ArtworkKind::Album => conn.execute(
            "INSERT INTO album_art (mbid, name, artist_name, file_path, not_found, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(mbid, name, artist_name)
             DO UPDATE SET file_path = ?4, not_found = ?5, fetched_at = ?6",
            params![key.mbid, key.name, key.artist_name, file, not_found, now],
        )?,
        ArtworkKind::Artist => conn.execute(
            "INSERT INTO artist_art (mbid, name, file_path, not_found, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(mbid, name)
             DO UPDATE SET file_path = ?3, not_found = ?4, fetched_at = ?5",
            params![key.mbid, key.name, file, not_found, now],
        )?,
    };

    Ok(())
}
