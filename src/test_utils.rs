// Test utilities shared by the artwork tests
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::Semaphore;

use crate::db::{create_pool, DbPool};
use crate::error::FetchError;
use crate::images::{ArtworkIndex, HttpTransport};
use crate::models::{Album, Artist, Track};

/// JPEG start-of-image marker followed by filler
pub const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46];

pub fn test_album(name: &str, artist: &str) -> Album {
    Album::new(name.to_string(), artist.to_string())
}

pub fn test_album_with_mbid(mbid: &str, name: &str, artist: &str) -> Album {
    test_album(name, artist).with_mbid(mbid.to_string())
}

pub fn test_artist(name: &str, mbids: &[&str]) -> Artist {
    mbids
        .iter()
        .fold(Artist::new(name.to_string()), |artist, mbid| {
            artist.with_mbid(mbid.to_string())
        })
}

pub fn test_track(title: &str, album: &str, album_artist: &str, path: &str) -> Track {
    Track::new(title.to_string(), path.to_string())
        .with_album(album.to_string())
        .with_album_artist(album_artist.to_string())
}

/// Index backed by a database and image directory inside a temp dir.
/// Keep the `TempDir` alive for the duration of the test.
pub fn setup_test_index() -> (ArtworkIndex, DbPool, TempDir) {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("artwork.db");
    let pool = create_pool(db_path.to_str().unwrap()).unwrap();
    let index = ArtworkIndex::open(pool.clone(), dir.path().join("images")).unwrap();
    (index, pool, dir)
}

/// Scripted transport. Unknown URLs answer `NotFound`.
///
/// With a gate, every call blocks until the test adds permits, which keeps
/// fetches pending while more callers attach.
#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<HashMap<String, Result<Vec<u8>, FetchError>>>,
    calls: Mutex<Vec<String>>,
    gate: Option<Arc<Semaphore>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, url: &str, body: Vec<u8>) -> Self {
        self.responses.lock().insert(url.to_string(), Ok(body));
        self
    }

    pub fn with_error(self, url: &str, error: FetchError) -> Self {
        self.responses.lock().insert(url.to_string(), Err(error));
        self
    }

    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.calls.lock().push(url.to_string());

        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await;
        }

        self.responses
            .lock()
            .get(url)
            .cloned()
            .unwrap_or(Err(FetchError::NotFound))
    }
}

/// Poll until `condition` holds, failing the test after five seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 5s");
}
