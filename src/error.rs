//! Error types for the artwork engine.
//!
//! Storage-side failures use [`ArtworkError`]. Network-side failures use
//! [`FetchError`], which is `Clone` because one fetch result is handed to
//! every caller waiting on it.

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, ArtworkError>;

#[derive(Debug, thiserror::Error)]
pub enum ArtworkError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The request carries no identifying fields, so no content address
    /// can be derived for it.
    #[error("Cannot compute content address: request has no identifying fields")]
    DigestUnavailable,

    #[error("Configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The remote source answered, but has no artwork for this entity.
    #[error("artwork not found")]
    NotFound,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    /// None of the configured providers can serve this request.
    #[error("no provider accepts this request")]
    NoProvider,
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Malformed(err.to_string())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Malformed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_error_is_malformed() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(matches!(FetchError::from(err), FetchError::Malformed(_)));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(FetchError::NotFound.to_string(), "artwork not found");
        assert!(ArtworkError::DigestUnavailable
            .to_string()
            .contains("content address"));
    }
}
