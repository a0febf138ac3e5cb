//! Runtime configuration, read from environment variables.
//!
//! Call `dotenvy::dotenv()` first to pick up a `.env` file. Unset
//! variables fall back to defaults under the user's cache directory
//! (`~/.cache/coverstash` on Linux).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ArtworkError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Server,
    CoverArtArchive,
    LastFm,
    Deezer,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Server => "server",
            ProviderKind::CoverArtArchive => "coverartarchive",
            ProviderKind::LastFm => "lastfm",
            ProviderKind::Deezer => "deezer",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = ArtworkError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "server" => Ok(ProviderKind::Server),
            "coverartarchive" | "musicbrainz" => Ok(ProviderKind::CoverArtArchive),
            "lastfm" => Ok(ProviderKind::LastFm),
            "deezer" => Ok(ProviderKind::Deezer),
            other => Err(ArtworkError::Config(format!("unknown provider '{}'", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArtworkConfig {
    pub database_path: PathBuf,
    pub image_dir: PathBuf,
    /// Providers in the order they are tried
    pub providers: Vec<ProviderKind>,
    /// Base URL under which the music server exposes its library directory
    pub server_url: Option<String>,
    pub cover_filenames: Vec<String>,
    pub lastfm_api_key: Option<String>,
    pub http_timeout: Duration,
}

impl Default for ArtworkConfig {
    fn default() -> Self {
        let cache_dir = default_cache_dir();
        Self {
            database_path: cache_dir.join("artwork.db"),
            image_dir: cache_dir.join("images"),
            providers: vec![
                ProviderKind::Server,
                ProviderKind::CoverArtArchive,
                ProviderKind::LastFm,
                ProviderKind::Deezer,
            ],
            server_url: None,
            cover_filenames: vec!["cover.jpg".to_string(), "folder.jpg".to_string()],
            lastfm_api_key: None,
            http_timeout: Duration::from_secs(10),
        }
    }
}

impl ArtworkConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(path) = var("COVERSTASH_DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }
        if let Some(dir) = var("COVERSTASH_IMAGE_DIR") {
            config.image_dir = PathBuf::from(dir);
        }
        if let Some(list) = var("COVERSTASH_PROVIDERS") {
            config.providers = split_list(&list)
                .iter()
                .map(|name| name.parse())
                .collect::<Result<Vec<_>>>()?;
        }
        if let Some(filenames) = var("COVERSTASH_COVER_FILENAMES") {
            config.cover_filenames = split_list(&filenames);
        }
        if let Some(secs) = var("COVERSTASH_HTTP_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                ArtworkError::Config(format!("invalid COVERSTASH_HTTP_TIMEOUT_SECS '{}'", secs))
            })?;
            config.http_timeout = Duration::from_secs(secs);
        }
        config.server_url = var("COVERSTASH_SERVER_URL");
        config.lastfm_api_key = var("LASTFM_API_KEY");

        Ok(config)
    }

    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    pub fn with_image_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.image_dir = dir.into();
        self
    }

    pub fn with_providers(mut self, providers: Vec<ProviderKind>) -> Self {
        self.providers = providers;
        self
    }

    pub fn with_server_url(mut self, url: String) -> Self {
        self.server_url = Some(url);
        self
    }

    pub fn with_lastfm_api_key(mut self, api_key: String) -> Self {
        self.lastfm_api_key = Some(api_key);
        self
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("coverstash")
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_vars(vars: &[(&str, &str)]) -> Result<ArtworkConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ArtworkConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = from_vars(&[]).unwrap();
        assert!(config.database_path.ends_with("coverstash/artwork.db"));
        assert_eq!(config.providers.len(), 4);
        assert_eq!(config.http_timeout, Duration::from_secs(10));
        assert!(config.server_url.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = from_vars(&[
            ("COVERSTASH_PROVIDERS", "deezer, musicbrainz"),
            ("COVERSTASH_COVER_FILENAMES", "front.jpg"),
            ("COVERSTASH_SERVER_URL", "http://music.local"),
            ("COVERSTASH_HTTP_TIMEOUT_SECS", "3"),
            ("LASTFM_API_KEY", ""),
        ])
        .unwrap();

        assert_eq!(
            config.providers,
            vec![ProviderKind::Deezer, ProviderKind::CoverArtArchive]
        );
        assert_eq!(config.cover_filenames, vec!["front.jpg".to_string()]);
        assert_eq!(config.server_url.as_deref(), Some("http://music.local"));
        assert_eq!(config.http_timeout, Duration::from_secs(3));
        assert!(config.lastfm_api_key.is_none());
    }

    #[test]
    fn test_unknown_provider() {
        let result = from_vars(&[("COVERSTASH_PROVIDERS", "spotify")]);
        assert!(matches!(result, Err(ArtworkError::Config(_))));
    }

    #[test]
    fn test_invalid_timeout() {
        let result = from_vars(&[("COVERSTASH_HTTP_TIMEOUT_SECS", "soon")]);
        assert!(matches!(result, Err(ArtworkError::Config(_))));
    }
}
