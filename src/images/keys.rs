//! Lookup keys for artwork requests.
//!
//! A request resolves to an ordered list of [`LookupKey`]s, most specific
//! first. The index tries them in order and stops at the first row it finds,
//! whether that row is a hit or a recorded miss.

use super::types::{ArtworkKind, ArtworkRequest, EntityType};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LookupKey {
    AlbumMbid(String),
    AlbumNameArtist { name: String, artist: String },
    /// Last resort: any row for an album of this name, whatever its artist.
    AlbumName(String),
    /// All of an artist's MBIDs, concatenated in source order.
    ArtistMbids(String),
    ArtistName(String),
}

impl LookupKey {
    pub fn kind(&self) -> ArtworkKind {
        match self {
            LookupKey::AlbumMbid(_)
            | LookupKey::AlbumNameArtist { .. }
            | LookupKey::AlbumName(_) => ArtworkKind::Album,
            LookupKey::ArtistMbids(_) | LookupKey::ArtistName(_) => ArtworkKind::Artist,
        }
    }

    /// WHERE clause and its positional parameters.
    pub(crate) fn selection(&self) -> (&'static str, Vec<&str>) {
        match self {
            LookupKey::AlbumMbid(mbid) => ("mbid = ?1", vec![mbid.as_str()]),
            LookupKey::AlbumNameArtist { name, artist } => (
                "name = ?1 AND artist_name = ?2",
                vec![name.as_str(), artist.as_str()],
            ),
            LookupKey::AlbumName(name) => ("name = ?1", vec![name.as_str()]),
            LookupKey::ArtistMbids(mbids) => ("mbid = ?1", vec![mbids.as_str()]),
            LookupKey::ArtistName(name) => ("name = ?1", vec![name.as_str()]),
        }
    }
}

/// Derive the candidate keys for a request, in the order they must be tried.
///
/// Track requests resolve exactly like the album named in the track's tags.
/// Blank fields never produce a key, so a request with nothing usable
/// resolves to an empty list.
pub fn resolve_keys(request: &ArtworkRequest) -> Vec<LookupKey> {
    let mut keys = Vec::with_capacity(3);

    match request.entity_type() {
        EntityType::Album | EntityType::Track => {
            if let Some(mbid) = request.mbid() {
                keys.push(LookupKey::AlbumMbid(mbid.to_string()));
            }
            if let Some(name) = request.name() {
                if let Some(artist) = request.artist_name() {
                    keys.push(LookupKey::AlbumNameArtist {
                        name: name.to_string(),
                        artist: artist.to_string(),
                    });
                }
                keys.push(LookupKey::AlbumName(name.to_string()));
            }
        }
        EntityType::Artist => {
            if let Some(mbids) = request.joined_mbids() {
                keys.push(LookupKey::ArtistMbids(mbids));
            }
            if let Some(name) = request.name() {
                keys.push(LookupKey::ArtistName(name.to_string()));
            }
        }
    }

    keys
}

/// The key a row is stored under. Recording the same natural key twice
/// replaces the row.
///
/// Absent fields are stored as empty strings so the table's UNIQUE
/// constraint applies to them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NaturalKey {
    pub kind: ArtworkKind,
    pub mbid: String,
    pub name: String,
    pub artist_name: String,
}

impl NaturalKey {
    pub fn of(request: &ArtworkRequest) -> Self {
        let kind = request.kind();
        let mbid = match kind {
            ArtworkKind::Album => request.mbid().unwrap_or_default().to_string(),
            ArtworkKind::Artist => request.joined_mbids().unwrap_or_default(),
        };
        let artist_name = match kind {
            ArtworkKind::Album => request.artist_name().unwrap_or_default().to_string(),
            ArtworkKind::Artist => String::new(),
        };

        Self {
            kind,
            mbid,
            name: request.name().unwrap_or_default().to_string(),
            artist_name,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.mbid.is_empty() && self.name.is_empty() && self.artist_name.is_empty()
    }

    /// Identifying fields concatenated in a fixed order: MBID(s), name, artist.
    pub fn identity(&self) -> String {
        format!("{}{}{}", self.mbid, self.name, self.artist_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Album, Artist, Track};

    #[test]
    fn test_album_keys_in_fallback_order() {
        let album = Album::new("Legend".to_string(), "Bob Marley".to_string())
            .with_mbid("b1a9c0e9".to_string());
        let keys = resolve_keys(&ArtworkRequest::album(&album));

        assert_eq!(
            keys,
            vec![
                LookupKey::AlbumMbid("b1a9c0e9".to_string()),
                LookupKey::AlbumNameArtist {
                    name: "Legend".to_string(),
                    artist: "Bob Marley".to_string()
                },
                LookupKey::AlbumName("Legend".to_string()),
            ]
        );
    }

    #[test]
    fn test_album_without_artist_uses_name_alone() {
        let album = Album::new("Untitled".to_string(), " ".to_string());
        let keys = resolve_keys(&ArtworkRequest::album(&album));
        assert_eq!(keys, vec![LookupKey::AlbumName("Untitled".to_string())]);
    }

    #[test]
    fn test_artist_keys_join_mbids() {
        let artist = Artist::new("Simon & Garfunkel".to_string())
            .with_mbid("aa".to_string())
            .with_mbid("bb".to_string());
        let keys = resolve_keys(&ArtworkRequest::artist(&artist));

        assert_eq!(
            keys,
            vec![
                LookupKey::ArtistMbids("aabb".to_string()),
                LookupKey::ArtistName("Simon & Garfunkel".to_string()),
            ]
        );
    }

    #[test]
    fn test_blank_artist_has_no_keys() {
        let keys = resolve_keys(&ArtworkRequest::artist(&Artist::new(String::new())));
        assert!(keys.is_empty());
    }

    #[test]
    fn test_track_resolves_like_its_album() {
        let track = Track::new("Jamming".to_string(), "Marley/Exodus/07.flac".to_string())
            .with_album("Exodus".to_string())
            .with_album_artist("Bob Marley".to_string());
        let album = Album::new("Exodus".to_string(), "Bob Marley".to_string());

        assert_eq!(
            resolve_keys(&ArtworkRequest::track(&track)),
            resolve_keys(&ArtworkRequest::album(&album))
        );
        assert_eq!(
            NaturalKey::of(&ArtworkRequest::track(&track)),
            NaturalKey::of(&ArtworkRequest::album(&album))
        );
    }

    #[test]
    fn test_keys_are_repeatable() {
        let artist = Artist::new("Queen".to_string())
            .with_mbid("0383dadf".to_string())
            .with_mbid("5eecaf18".to_string());
        let first = resolve_keys(&ArtworkRequest::artist(&artist));
        let second = resolve_keys(&ArtworkRequest::artist(&artist.clone()));
        assert_eq!(first, second);
    }

    #[test]
    fn test_natural_key_identity() {
        let album = Album::new("Legend".to_string(), "Bob Marley".to_string());
        let key = NaturalKey::of(&ArtworkRequest::album(&album));

        assert_eq!(key.identity(), "LegendBob Marley");
        assert!(!key.is_empty());
        assert!(NaturalKey::of(&ArtworkRequest::artist(&Artist::default())).is_empty());
    }
}
