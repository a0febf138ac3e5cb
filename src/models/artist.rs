use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub name: String,
    /// MusicBrainz artist ids in the order the server reported them
    #[serde(default)]
    pub mbids: Vec<String>,
}

impl Artist {
    pub fn new(name: String) -> Self {
        Self {
            name,
            mbids: Vec::new(),
        }
    }

    pub fn with_mbid(mut self, mbid: String) -> Self {
        self.mbids.push(mbid);
        self
    }
}
