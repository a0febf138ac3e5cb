mod fetch;
mod index;
mod keys;
mod providers;
mod store;
mod transport;
mod types;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::config::ArtworkConfig;
use crate::db;
use crate::error::{ArtworkError, Result};

pub use fetch::{FailureCallback, FetchCoordinator, FetchHandle, SuccessCallback};
pub use index::ArtworkIndex;
pub use keys::{resolve_keys, LookupKey, NaturalKey};
pub use providers::{
    build_providers, ArtworkProvider, CoverArtArchiveProvider, DeezerProvider, LastFmProvider,
    ServerCoverProvider,
};
pub use store::{content_address, ImageFileStore, StagedImage};
pub use transport::{HttpTransport, ReqwestTransport, CLIENT_IDENTITY};
pub use types::{
    ArtworkEntry, ArtworkKind, ArtworkLookup, ArtworkRequest, EntityType, IndexStats,
    RecordOutcome,
};

/// Artwork ready for display.
#[derive(Debug, Clone)]
pub enum Artwork {
    /// Cached on disk.
    File(PathBuf),
    /// Just downloaded; it is written to the cache in the background.
    Bytes(Arc<[u8]>),
}

/// Cache-first access to artwork: answer from the index when it knows,
/// download otherwise.
pub struct ArtworkService {
    index: Arc<ArtworkIndex>,
    fetcher: FetchCoordinator,
}

impl ArtworkService {
    pub fn new(index: Arc<ArtworkIndex>, fetcher: FetchCoordinator) -> Self {
        Self { index, fetcher }
    }

    /// Open the database and image directory and set up the configured
    /// providers. Must be called from within a Tokio runtime.
    pub fn from_config(config: &ArtworkConfig) -> Result<Self> {
        if let Some(parent) = config.database_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let pool = db::create_pool(&config.database_path.to_string_lossy())?;
        let index = Arc::new(ArtworkIndex::open(pool, &config.image_dir)?);

        let transport = ReqwestTransport::new(config.http_timeout)
            .map_err(|e| ArtworkError::Config(e.to_string()))?;
        let runtime = Handle::try_current().map_err(|e| ArtworkError::Config(e.to_string()))?;
        let providers = build_providers(config);

        tracing::info!(
            "Artwork providers: {}",
            providers
                .iter()
                .map(|p| p.name())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let fetcher = FetchCoordinator::new(Arc::clone(&index), Arc::new(transport), providers, runtime);
        Ok(Self::new(index, fetcher))
    }

    pub fn index(&self) -> &ArtworkIndex {
        &self.index
    }

    pub fn fetcher(&self) -> &FetchCoordinator {
        &self.fetcher
    }

    /// Resolve artwork for a request. `None` means no artwork is available,
    /// either from a recorded miss or because the download failed.
    ///
    /// Dropping the returned future detaches from the download without
    /// cancelling it.
    pub async fn get_artwork(&self, request: &ArtworkRequest) -> Option<Artwork> {
        // 1. Check the index first
        match self.index.lookup(request) {
            ArtworkLookup::Found(path) => return Some(Artwork::File(path)),
            ArtworkLookup::NotFound => return None,
            ArtworkLookup::Absent => {}
        }

        // 2. Download, joining any pending download for the same artwork
        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(Mutex::new(Some(tx)));
        let tx_failure = Arc::clone(&tx);

        let handle = self.fetcher.request(
            request,
            move |_, bytes| {
                if let Some(tx) = tx.lock().take() {
                    let _ = tx.send(Some(bytes));
                }
            },
            move |_, _| {
                if let Some(tx) = tx_failure.lock().take() {
                    let _ = tx.send(None);
                }
            },
        );
        let _detach = DetachOnDrop(handle);

        rx.await.ok().flatten().map(Artwork::Bytes)
    }

    /// Start downloads for every request the index knows nothing about.
    /// Returns how many new downloads were started.
    pub fn prefetch<'a>(&self, requests: impl IntoIterator<Item = &'a ArtworkRequest>) -> usize {
        requests
            .into_iter()
            .filter(|request| self.index.lookup(request).is_absent())
            .filter(|request| self.fetcher.request(request, |_, _| {}, |_, _| {}).started())
            .count()
    }
}

struct DetachOnDrop(FetchHandle);

impl Drop for DetachOnDrop {
    fn drop(&mut self) {
        self.0.detach();
    }
}
