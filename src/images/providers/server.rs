use async_trait::async_trait;

use super::ArtworkProvider;
use crate::error::FetchError;
use crate::images::transport::HttpTransport;
use crate::images::types::{ArtworkKind, ArtworkRequest};

/// Cover files served over HTTP from the music server's library directory,
/// e.g. `http://music.local/covers/Bob%20Marley/Legend/cover.jpg` for a
/// track stored at `Bob Marley/Legend/01.flac`.
pub struct ServerCoverProvider {
    base_url: String,
    filenames: Vec<String>,
}

impl ServerCoverProvider {
    pub fn new(base_url: String, filenames: Vec<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            filenames,
        }
    }

    /// Candidate URLs next to the given track path, in filename order.
    pub fn cover_urls(&self, track_path: &str) -> Vec<String> {
        let directory = match track_path.rfind('/') {
            Some(pos) => &track_path[..pos],
            None => "",
        };
        let encoded: Vec<String> = directory
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();

        self.filenames
            .iter()
            .map(|filename| {
                let mut parts = vec![self.base_url.clone()];
                parts.extend(encoded.iter().cloned());
                parts.push(urlencoding::encode(filename).into_owned());
                parts.join("/")
            })
            .collect()
    }
}

#[async_trait]
impl ArtworkProvider for ServerCoverProvider {
    fn name(&self) -> &'static str {
        "server"
    }

    fn supports(&self, request: &ArtworkRequest) -> bool {
        request.kind() == ArtworkKind::Album
            && !self.filenames.is_empty()
            && request.path().is_some_and(|path| !path.contains("://"))
    }

    async fn fetch(
        &self,
        transport: &dyn HttpTransport,
        request: &ArtworkRequest,
    ) -> Result<Vec<u8>, FetchError> {
        let path = request.path().ok_or(FetchError::NoProvider)?;

        let mut last_error = FetchError::NotFound;
        for url in self.cover_urls(path) {
            match transport.get(&url).await {
                Ok(bytes) => return Ok(bytes),
                Err(FetchError::NotFound) => continue,
                Err(e) => {
                    tracing::debug!("Server cover {} failed: {}", url, e);
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}
