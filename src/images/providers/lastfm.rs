use async_trait::async_trait;
use serde::Deserialize;

use super::ArtworkProvider;
use crate::error::FetchError;
use crate::images::transport::{get_json, HttpTransport};
use crate::images::types::{ArtworkKind, ArtworkRequest};

const API_ROOT: &str = "https://ws.audioscrobbler.com/2.0/";
const IMAGE_SIZE: &str = "extralarge"; // 300x300

#[derive(Debug, Deserialize)]
struct ArtistInfo {
    artist: Option<Artist>,
    error: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct AlbumInfo {
    album: Option<Album>,
    error: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct Artist {
    #[serde(default)]
    image: Vec<Image>,
}

#[derive(Debug, Deserialize)]
struct Album {
    #[serde(default)]
    image: Vec<Image>,
}

#[derive(Debug, Deserialize)]
struct Image {
    #[serde(rename = "#text")]
    url: String,
    size: String,
}

pub struct LastFmProvider {
    api_key: String,
}

impl LastFmProvider {
    pub fn new(api_key: String) -> Self {
        Self { api_key }
    }

    fn album_url(&self, artist: &str, album: &str) -> String {
        format!(
            "{}?method=album.getinfo&artist={}&album={}&api_key={}&format=json",
            API_ROOT,
            urlencoding::encode(artist),
            urlencoding::encode(album),
            self.api_key
        )
    }

    fn artist_url(&self, request: &ArtworkRequest) -> Option<String> {
        let selector = match (request.name(), request.mbid()) {
            (Some(name), _) => format!("artist={}", urlencoding::encode(name)),
            (None, Some(mbid)) => format!("mbid={}", urlencoding::encode(mbid)),
            (None, None) => return None,
        };

        Some(format!(
            "{}?method=artist.getinfo&{}&api_key={}&format=json",
            API_ROOT, selector, self.api_key
        ))
    }

    async fn image_url(
        &self,
        transport: &dyn HttpTransport,
        request: &ArtworkRequest,
    ) -> Result<Option<String>, FetchError> {
        match request.kind() {
            ArtworkKind::Artist => {
                let url = self.artist_url(request).ok_or(FetchError::NoProvider)?;
                let response: ArtistInfo = get_json(transport, &url).await?;
                if response.error.is_some() {
                    return Ok(None);
                }
                Ok(response
                    .artist
                    .and_then(|artist| extract_image_url(&artist.image)))
            }
            ArtworkKind::Album => {
                let (Some(album), Some(artist)) = (request.name(), request.artist_name()) else {
                    return Err(FetchError::NoProvider);
                };
                let response: AlbumInfo = get_json(transport, &self.album_url(artist, album)).await?;
                if response.error.is_some() {
                    return Ok(None);
                }
                Ok(response
                    .album
                    .and_then(|album| extract_image_url(&album.image)))
            }
        }
    }
}

fn extract_image_url(images: &[Image]) -> Option<String> {
    images
        .iter()
        .find(|img| img.size == IMAGE_SIZE)
        .and_then(|img| {
            if img.url.is_empty() {
                None
            } else {
                Some(img.url.clone())
            }
        })
}

#[async_trait]
impl ArtworkProvider for LastFmProvider {
    fn name(&self) -> &'static str {
        "lastfm"
    }

    fn supports(&self, request: &ArtworkRequest) -> bool {
        match request.kind() {
            ArtworkKind::Artist => request.name().is_some() || request.mbid().is_some(),
            ArtworkKind::Album => request.name().is_some() && request.artist_name().is_some(),
        }
    }

    async fn fetch(
        &self,
        transport: &dyn HttpTransport,
        request: &ArtworkRequest,
    ) -> Result<Vec<u8>, FetchError> {
        let url = self
            .image_url(transport, request)
            .await?
            .ok_or(FetchError::NotFound)?;
        transport.get(&url).await
    }
}
