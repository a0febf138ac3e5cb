//! Remote artwork sources.

mod coverartarchive;
mod deezer;
mod lastfm;
mod server;

use std::sync::Arc;

use async_trait::async_trait;

pub use coverartarchive::CoverArtArchiveProvider;
pub use deezer::DeezerProvider;
pub use lastfm::LastFmProvider;
pub use server::ServerCoverProvider;

use super::transport::HttpTransport;
use super::types::ArtworkRequest;
use crate::config::{ArtworkConfig, ProviderKind};
use crate::error::FetchError;

#[async_trait]
pub trait ArtworkProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the request carries enough for this provider to try.
    fn supports(&self, request: &ArtworkRequest) -> bool;

    /// Download the raw image bytes for the request.
    async fn fetch(
        &self,
        transport: &dyn HttpTransport,
        request: &ArtworkRequest,
    ) -> Result<Vec<u8>, FetchError>;
}

/// Instantiate the configured providers in order, skipping those that lack
/// the settings they need.
pub fn build_providers(config: &ArtworkConfig) -> Vec<Arc<dyn ArtworkProvider>> {
    let mut providers: Vec<Arc<dyn ArtworkProvider>> = Vec::new();

    for kind in &config.providers {
        match kind {
            ProviderKind::Server => match &config.server_url {
                Some(url) => providers.push(Arc::new(ServerCoverProvider::new(
                    url.clone(),
                    config.cover_filenames.clone(),
                ))),
                None => tracing::debug!("Server cover provider disabled: no server URL"),
            },
            ProviderKind::CoverArtArchive => {
                providers.push(Arc::new(CoverArtArchiveProvider::new()))
            }
            ProviderKind::LastFm => match &config.lastfm_api_key {
                Some(key) => providers.push(Arc::new(LastFmProvider::new(key.clone()))),
                None => tracing::debug!("Last.fm provider disabled: no API key"),
            },
            ProviderKind::Deezer => providers.push(Arc::new(DeezerProvider)),
        }
    }

    providers
}

/// Try each provider that supports the request, in order, until one returns
/// an image. Reports the last provider error, or `NoProvider` if none applied.
pub async fn fetch_first(
    providers: &[Arc<dyn ArtworkProvider>],
    transport: &dyn HttpTransport,
    request: &ArtworkRequest,
) -> Result<Vec<u8>, FetchError> {
    let mut last_error = None;

    for provider in providers.iter().filter(|p| p.supports(request)) {
        match provider.fetch(transport, request).await {
            Ok(bytes) => {
                tracing::debug!(
                    "{} returned {} bytes for {} {:?}",
                    provider.name(),
                    bytes.len(),
                    request.entity_type().as_str(),
                    request.name()
                );
                return Ok(bytes);
            }
            Err(e) => {
                tracing::debug!("{} failed: {}", provider.name(), e);
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or(FetchError::NoProvider))
}
