use serde::{Deserialize, Serialize};

/// A track as reported by the music server, reduced to the tags that matter
/// for artwork.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub title: String,
    pub path: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub album_mbid: Option<String>,
}

impl Track {
    pub fn new(title: String, path: String) -> Self {
        Self {
            title,
            path,
            artist: None,
            album: None,
            album_artist: None,
            album_mbid: None,
        }
    }

    pub fn with_artist(mut self, artist: String) -> Self {
        self.artist = Some(artist);
        self
    }

    pub fn with_album(mut self, album: String) -> Self {
        self.album = Some(album);
        self
    }

    pub fn with_album_artist(mut self, album_artist: String) -> Self {
        self.album_artist = Some(album_artist);
        self
    }

    pub fn with_album_mbid(mut self, mbid: String) -> Self {
        self.album_mbid = Some(mbid);
        self
    }

    /// The artist credited for the track's album: album artist when tagged,
    /// otherwise the track artist.
    pub fn effective_album_artist(&self) -> Option<&str> {
        self.album_artist
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .or(self.artist.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_album_artist_prefers_album_artist() {
        let track = Track::new("Exodus".to_string(), "a/b.flac".to_string())
            .with_artist("Bob Marley & The Wailers".to_string())
            .with_album_artist("Bob Marley".to_string());
        assert_eq!(track.effective_album_artist(), Some("Bob Marley"));
    }

    #[test]
    fn test_effective_album_artist_falls_back_on_blank() {
        let track = Track::new("Exodus".to_string(), "a/b.flac".to_string())
            .with_artist("Bob Marley".to_string())
            .with_album_artist("  ".to_string());
        assert_eq!(track.effective_album_artist(), Some("Bob Marley"));
    }
}
