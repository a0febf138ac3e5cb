use async_trait::async_trait;
use serde::Deserialize;

use super::ArtworkProvider;
use crate::error::FetchError;
use crate::images::transport::{get_json, HttpTransport};
use crate::images::types::{ArtworkKind, ArtworkRequest};

const API_ROOT: &str = "https://api.deezer.com";

#[derive(Debug, Deserialize)]
struct ArtistSearchResponse {
    #[serde(default)]
    data: Vec<ArtistSearchResult>,
}

#[derive(Debug, Deserialize)]
struct ArtistSearchResult {
    #[serde(rename = "picture_xl")]
    picture_xl: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlbumSearchResponse {
    #[serde(default)]
    data: Vec<AlbumSearchResult>,
}

#[derive(Debug, Deserialize)]
struct AlbumSearchResult {
    #[serde(rename = "cover_xl")]
    cover_xl: Option<String>,
}

pub struct DeezerProvider;

impl DeezerProvider {
    fn artist_search_url(artist_name: &str) -> String {
        format!(
            "{}/search/artist?q={}",
            API_ROOT,
            urlencoding::encode(artist_name)
        )
    }

    fn album_search_url(album_name: &str, artist_name: Option<&str>) -> String {
        let search_query = match artist_name {
            Some(artist) => format!("artist:\"{}\" album:\"{}\"", artist, album_name),
            None => format!("album:\"{}\"", album_name),
        };
        format!(
            "{}/search/album?q={}",
            API_ROOT,
            urlencoding::encode(&search_query)
        )
    }

    async fn image_url(
        &self,
        transport: &dyn HttpTransport,
        request: &ArtworkRequest,
    ) -> Result<Option<String>, FetchError> {
        let name = request.name().ok_or(FetchError::NoProvider)?;

        match request.kind() {
            ArtworkKind::Artist => {
                let response: ArtistSearchResponse =
                    get_json(transport, &Self::artist_search_url(name)).await?;
                Ok(response
                    .data
                    .into_iter()
                    .next()
                    .and_then(|artist| artist.picture_xl))
            }
            ArtworkKind::Album => {
                let url = Self::album_search_url(name, request.artist_name());
                let response: AlbumSearchResponse = get_json(transport, &url).await?;
                Ok(response
                    .data
                    .into_iter()
                    .next()
                    .and_then(|album| album.cover_xl))
            }
        }
    }
}

#[async_trait]
impl ArtworkProvider for DeezerProvider {
    fn name(&self) -> &'static str {
        "deezer"
    }

    fn supports(&self, request: &ArtworkRequest) -> bool {
        request.name().is_some()
    }

    async fn fetch(
        &self,
        transport: &dyn HttpTransport,
        request: &ArtworkRequest,
    ) -> Result<Vec<u8>, FetchError> {
        let url = self
            .image_url(transport, request)
            .await?
            .filter(|url| !url.is_empty())
            .ok_or(FetchError::NotFound)?;
        transport.get(&url).await
    }
}
