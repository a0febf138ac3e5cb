//! Outbound HTTP for artwork providers.
//!
//! Providers only see the [`HttpTransport`] trait, so tests can substitute a
//! scripted transport and count network calls.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::FetchError;

/// User-Agent sent with every request.
pub const CLIENT_IDENTITY: &str = concat!(
    "coverstash/",
    env!("CARGO_PKG_VERSION"),
    " ( https://github.com/coverstash/coverstash )"
);

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// GET `url` and return the response body.
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Fetch and decode a JSON document.
pub async fn get_json<T: serde::de::DeserializeOwned>(
    transport: &dyn HttpTransport,
    url: &str,
) -> Result<T, FetchError> {
    let body = transport.get(url).await?;
    Ok(serde_json::from_slice(&body)?)
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(CLIENT_IDENTITY)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound);
        }

        if !status.is_success() {
            return Err(FetchError::Transport(format!(
                "HTTP {}: {}",
                status,
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let body = response.bytes().await?;
        if body.is_empty() {
            return Err(FetchError::Malformed(format!("empty body from {}", url)));
        }

        Ok(body.to_vec())
    }
}
