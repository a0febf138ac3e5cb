use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub name: String,
    pub artist: String,
    pub mbid: Option<String>,
    /// Path of one of the album's tracks, relative to the server's music directory
    pub path: Option<String>,
}

impl Album {
    pub fn new(name: String, artist: String) -> Self {
        Self {
            name,
            artist,
            mbid: None,
            path: None,
        }
    }

    pub fn with_mbid(mut self, mbid: String) -> Self {
        self.mbid = Some(mbid);
        self
    }

    pub fn with_path(mut self, path: String) -> Self {
        self.path = Some(path);
        self
    }
}
