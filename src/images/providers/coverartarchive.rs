use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;

use super::ArtworkProvider;
use crate::error::FetchError;
use crate::images::transport::{get_json, HttpTransport};
use crate::images::types::{ArtworkKind, ArtworkRequest};

const MUSICBRAINZ_ROOT: &str = "https://musicbrainz.org/ws/2";
const COVER_ART_ROOT: &str = "https://coverartarchive.org";
const COVER_SIZE: &str = "front-500";
// MusicBrainz allows one request per second
const SEARCH_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
struct ReleaseGroupSearchResponse {
    #[serde(rename = "release-groups", default)]
    release_groups: Vec<ReleaseGroup>,
}

#[derive(Debug, Deserialize)]
struct ReleaseGroup {
    id: String,
}

/// Album covers from the Cover Art Archive, by release MBID when the tags
/// carry one and through a MusicBrainz release-group search otherwise.
pub struct CoverArtArchiveProvider {
    last_search: Mutex<Option<Instant>>,
}

impl CoverArtArchiveProvider {
    pub fn new() -> Self {
        Self {
            last_search: Mutex::new(None),
        }
    }

    pub(crate) fn release_cover_url(release_id: &str) -> String {
        format!("{}/release/{}/{}", COVER_ART_ROOT, release_id, COVER_SIZE)
    }

    pub(crate) fn release_group_cover_url(release_group_id: &str) -> String {
        format!(
            "{}/release-group/{}/{}",
            COVER_ART_ROOT, release_group_id, COVER_SIZE
        )
    }

    pub(crate) fn release_group_search_url(album_name: &str, artist_name: Option<&str>) -> String {
        let search_query = match artist_name {
            Some(artist) => format!("releasegroup:\"{}\" AND artist:\"{}\"", album_name, artist),
            None => format!("releasegroup:\"{}\"", album_name),
        };
        format!(
            "{}/release-group/?query={}&fmt=json&limit=1",
            MUSICBRAINZ_ROOT,
            urlencoding::encode(&search_query)
        )
    }

    async fn pace_search(&self) {
        let mut last = self.last_search.lock().await;
        if let Some(at) = *last {
            let elapsed = at.elapsed();
            if elapsed < SEARCH_INTERVAL {
                tokio::time::sleep(SEARCH_INTERVAL - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn search_release_group(
        &self,
        transport: &dyn HttpTransport,
        album_name: &str,
        artist_name: Option<&str>,
    ) -> Result<Option<String>, FetchError> {
        self.pace_search().await;

        let url = Self::release_group_search_url(album_name, artist_name);
        let response: ReleaseGroupSearchResponse = get_json(transport, &url).await?;

        Ok(response.release_groups.into_iter().next().map(|rg| rg.id))
    }
}

impl Default for CoverArtArchiveProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtworkProvider for CoverArtArchiveProvider {
    fn name(&self) -> &'static str {
        "coverartarchive"
    }

    fn supports(&self, request: &ArtworkRequest) -> bool {
        request.kind() == ArtworkKind::Album
            && (request.mbid().is_some() || request.name().is_some())
    }

    async fn fetch(
        &self,
        transport: &dyn HttpTransport,
        request: &ArtworkRequest,
    ) -> Result<Vec<u8>, FetchError> {
        if let Some(mbid) = request.mbid() {
            match transport.get(&Self::release_cover_url(mbid)).await {
                Err(FetchError::NotFound) if request.name().is_some() => {
                    tracing::debug!("No cover for release {}, searching by name", mbid);
                }
                result => return result,
            }
        }

        let name = request.name().ok_or(FetchError::NoProvider)?;
        let release_group = self
            .search_release_group(transport, name, request.artist_name())
            .await?
            .ok_or(FetchError::NotFound)?;

        transport
            .get(&Self::release_group_cover_url(&release_group))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_fetch_by_mbid() {
        let transport = MockTransport::new().with_response(
            &CoverArtArchiveProvider::release_cover_url("b1a9c0e9"),
            JPEG_BYTES.to_vec(),
        );

        let request = ArtworkRequest::album(&test_album_with_mbid("b1a9c0e9", "Legend", "Bob Marley"));
        let bytes = CoverArtArchiveProvider::new()
            .fetch(&transport, &request)
            .await
            .unwrap();

        assert_eq!(bytes, JPEG_BYTES);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_fetch_by_search() {
        let transport = MockTransport::new()
            .with_response(
                &CoverArtArchiveProvider::release_group_search_url("Legend", Some("Bob Marley")),
                br#"{"release-groups":[{"id":"rg-1"}]}"#.to_vec(),
            )
            .with_response(
                &CoverArtArchiveProvider::release_group_cover_url("rg-1"),
                JPEG_BYTES.to_vec(),
            );

        let request = ArtworkRequest::album(&test_album("Legend", "Bob Marley"));
        let bytes = CoverArtArchiveProvider::new()
            .fetch(&transport, &request)
            .await
            .unwrap();

        assert_eq!(bytes, JPEG_BYTES);
    }

    #[tokio::test]
    async fn test_missing_release_falls_back_to_search() {
        let transport = MockTransport::new().with_response(
            &CoverArtArchiveProvider::release_group_search_url("Legend", Some("Bob Marley")),
            br#"{"release-groups":[]}"#.to_vec(),
        );

        let request = ArtworkRequest::album(&test_album_with_mbid("gone", "Legend", "Bob Marley"));
        let result = CoverArtArchiveProvider::new()
            .fetch(&transport, &request)
            .await;

        assert_eq!(result, Err(FetchError::NotFound));
        assert_eq!(transport.call_count(), 2);
    }

    #[test]
    fn test_does_not_serve_artists() {
        let request = ArtworkRequest::artist(&test_artist("Queen", &["0383dadf"]));
        assert!(!CoverArtArchiveProvider::new().supports(&request));
    }
}
