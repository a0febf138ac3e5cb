//! Content-addressed image files on disk.
//!
//! Files live in one directory per [`ArtworkKind`] and are named by the
//! SHA-256 of the entity's identifying fields, so the same entity always
//! maps to the same file and rewriting it overwrites in place.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use sha2::{Digest, Sha256};

use super::keys::NaturalKey;
use super::types::ArtworkKind;
use crate::error::{ArtworkError, Result};

const IMAGE_EXTENSION: &str = "jpg";
const PARTIAL_SUFFIX: &str = ".part";

/// `<hex sha256 of identity>.jpg` for the given natural key.
pub fn content_address(key: &NaturalKey) -> Result<String> {
    if key.is_empty() {
        return Err(ArtworkError::DigestUnavailable);
    }

    let digest = Sha256::digest(key.identity().as_bytes());
    Ok(format!("{:x}.{}", digest, IMAGE_EXTENSION))
}

pub struct ImageFileStore {
    root: PathBuf,
}

impl ImageFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    pub fn kind_dir(&self, kind: ArtworkKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    pub fn resolve_path(&self, kind: ArtworkKind, filename: &str) -> PathBuf {
        self.kind_dir(kind).join(filename)
    }

    /// Write `bytes` under `filename`. The data goes to a sibling temp file
    /// first and is renamed into place, so readers see either the old file or
    /// the complete new one.
    pub fn save(&self, kind: ArtworkKind, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        self.stage(kind, filename, bytes)?.commit()
    }

    /// Write `bytes` next to `filename` without replacing it yet. The file
    /// only takes its final name on [`StagedImage::commit`]; dropping the
    /// staged image deletes it.
    pub fn stage(&self, kind: ArtworkKind, filename: &str, bytes: &[u8]) -> Result<StagedImage> {
        let dir = self.kind_dir(kind);
        fs::create_dir_all(&dir)?;

        let staged = StagedImage {
            partial: dir.join(format!("{}{}", filename, PARTIAL_SUFFIX)),
            target: dir.join(filename),
            committed: false,
        };
        fs::write(&staged.partial, bytes)?;

        Ok(staged)
    }

    /// Returns whether a file was actually removed.
    pub fn remove(&self, kind: ArtworkKind, filename: &str) -> Result<bool> {
        match fs::remove_file(self.resolve_path(kind, filename)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete every file in the kind's directory. Returns how many were removed.
    pub fn clear_directory(&self, kind: ArtworkKind) -> Result<usize> {
        let dir = self.kind_dir(kind);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }

        Ok(removed)
    }

    /// Total size of the kind's directory in bytes.
    pub fn size_bytes(&self, kind: ArtworkKind) -> u64 {
        fs::read_dir(self.kind_dir(kind))
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter_map(|e| e.metadata().ok())
                    .filter(|m| m.is_file())
                    .map(|m| m.len())
                    .sum()
            })
            .unwrap_or(0)
    }
}

/// Image bytes written to disk but not yet under their final name.
pub struct StagedImage {
    partial: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl StagedImage {
    pub fn commit(mut self) -> Result<PathBuf> {
        fs::rename(&self.partial, &self.target)?;
        self.committed = true;
        Ok(self.target.clone())
    }
}

impl Drop for StagedImage {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.partial);
        }
    }
}
