use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::models::{Album, Artist, Track};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    Artist,
    Album,
    Track,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Artist => "artist",
            EntityType::Album => "album",
            EntityType::Track => "track",
        }
    }

    /// Index table holding artwork for this entity. Tracks share their album's artwork.
    pub fn kind(&self) -> ArtworkKind {
        match self {
            EntityType::Artist => ArtworkKind::Artist,
            EntityType::Album | EntityType::Track => ArtworkKind::Album,
        }
    }
}

/// Selects one of the two independent artwork tables and its image directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtworkKind {
    Album,
    Artist,
}

impl ArtworkKind {
    pub const ALL: [ArtworkKind; 2] = [ArtworkKind::Album, ArtworkKind::Artist];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtworkKind::Album => "album",
            ArtworkKind::Artist => "artist",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            ArtworkKind::Album => "album_art",
            ArtworkKind::Artist => "artist_art",
        }
    }

    pub fn dir_name(&self) -> &'static str {
        match self {
            ArtworkKind::Album => "albums",
            ArtworkKind::Artist => "artists",
        }
    }
}

/// Read-only view over an album, artist or track carrying just the fields
/// needed to resolve and fetch its artwork.
///
/// Blank strings never make it in: a blank name is stored as `None` and blank
/// MBIDs are dropped, so nothing downstream can key on an empty string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtworkRequest {
    entity_type: EntityType,
    mbids: Vec<String>,
    name: Option<String>,
    artist_name: Option<String>,
    path: Option<String>,
}

impl ArtworkRequest {
    pub fn album(album: &Album) -> Self {
        Self {
            entity_type: EntityType::Album,
            mbids: non_blank(album.mbid.as_deref()).into_iter().collect(),
            name: non_blank(Some(&album.name)),
            artist_name: non_blank(Some(&album.artist)),
            path: non_blank(album.path.as_deref()),
        }
    }

    pub fn artist(artist: &Artist) -> Self {
        Self {
            entity_type: EntityType::Artist,
            mbids: artist
                .mbids
                .iter()
                .filter_map(|mbid| non_blank(Some(mbid)))
                .collect(),
            name: non_blank(Some(&artist.name)),
            artist_name: None,
            path: None,
        }
    }

    /// Tracks are looked up through their album, using the album tags embedded in the track.
    pub fn track(track: &Track) -> Self {
        Self {
            entity_type: EntityType::Track,
            mbids: non_blank(track.album_mbid.as_deref()).into_iter().collect(),
            name: non_blank(track.album.as_deref()),
            artist_name: non_blank(track.effective_album_artist()),
            path: non_blank(Some(&track.path)),
        }
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub fn kind(&self) -> ArtworkKind {
        self.entity_type.kind()
    }

    pub fn mbids(&self) -> &[String] {
        &self.mbids
    }

    /// First MBID, for albums and tracks which carry at most one.
    pub fn mbid(&self) -> Option<&str> {
        self.mbids.first().map(String::as_str)
    }

    /// All MBIDs joined in source order without a separator.
    pub fn joined_mbids(&self) -> Option<String> {
        if self.mbids.is_empty() {
            None
        } else {
            Some(self.mbids.concat())
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn artist_name(&self) -> Option<&str> {
        self.artist_name.as_deref()
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }
}

impl From<&Album> for ArtworkRequest {
    fn from(album: &Album) -> Self {
        Self::album(album)
    }
}

impl From<&Artist> for ArtworkRequest {
    fn from(artist: &Artist) -> Self {
        Self::artist(artist)
    }
}

impl From<&Track> for ArtworkRequest {
    fn from(track: &Track) -> Self {
        Self::track(track)
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(|v| v.to_string())
}

/// Outcome of an index lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtworkLookup {
    /// Artwork is cached at this path.
    Found(PathBuf),
    /// A previous fetch definitively failed; do not fetch again.
    NotFound,
    /// Nothing is recorded; the caller should fetch.
    Absent,
}

impl ArtworkLookup {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ArtworkLookup::Found(path) => Some(path),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, ArtworkLookup::Absent)
    }
}

/// What `record` managed to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Stored(PathBuf),
    MarkedNotFound,
    /// Storage failed; nothing changed and the next lookup will fetch again.
    NotPersisted,
}

/// One row of either artwork table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtworkEntry {
    pub mbid: String,
    pub name: String,
    pub artist_name: String,
    pub file_path: Option<String>,
    pub not_found: bool,
    pub fetched_at: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub found: u64,
    pub not_found: u64,
}
