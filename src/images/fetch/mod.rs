//! Deduplicated artwork downloads.
//!
//! At most one download runs per natural key. Callers asking for the same
//! artwork while a download is pending are attached to it and receive the
//! same result. The index is updated with every outcome, so a failed
//! download becomes a recorded miss.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::runtime::Handle;

use super::index::ArtworkIndex;
use super::keys::NaturalKey;
use super::providers::{fetch_first, ArtworkProvider};
use super::transport::HttpTransport;
use super::types::ArtworkRequest;
use crate::error::FetchError;

pub type SuccessCallback = Box<dyn FnOnce(&ArtworkRequest, Arc<[u8]>) + Send>;
pub type FailureCallback = Box<dyn FnOnce(&ArtworkRequest, FetchError) + Send>;

struct Waiter {
    id: u64,
    on_success: SuccessCallback,
    on_failure: FailureCallback,
}

struct Inner {
    index: Arc<ArtworkIndex>,
    transport: Arc<dyn HttpTransport>,
    providers: Vec<Arc<dyn ArtworkProvider>>,
    in_flight: Mutex<HashMap<NaturalKey, Vec<Waiter>>>,
    next_waiter: AtomicU64,
    runtime: Handle,
}

#[derive(Clone)]
pub struct FetchCoordinator {
    inner: Arc<Inner>,
}

/// A caller's attachment to a pending download.
pub struct FetchHandle {
    key: NaturalKey,
    waiter: u64,
    started: bool,
    inner: Weak<Inner>,
}

impl FetchHandle {
    /// Whether this request started a new download rather than joining one.
    pub fn started(&self) -> bool {
        self.started
    }

    /// Stop waiting. The download itself keeps running for everyone else
    /// and is still recorded in the index. Returns `false` if the result
    /// was already delivered.
    pub fn detach(&self) -> bool {
        let Some(inner) = self.inner.upgrade() else {
            return false;
        };

        let mut in_flight = inner.in_flight.lock();
        match in_flight.get_mut(&self.key) {
            Some(waiters) => {
                let before = waiters.len();
                waiters.retain(|w| w.id != self.waiter);
                waiters.len() != before
            }
            None => false,
        }
    }
}

impl FetchCoordinator {
    /// Downloads are spawned onto `runtime`, so `request` can be called from
    /// any thread.
    pub fn new(
        index: Arc<ArtworkIndex>,
        transport: Arc<dyn HttpTransport>,
        providers: Vec<Arc<dyn ArtworkProvider>>,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                index,
                transport,
                providers,
                in_flight: Mutex::new(HashMap::new()),
                next_waiter: AtomicU64::new(1),
                runtime,
            }),
        }
    }

    pub fn index(&self) -> &Arc<ArtworkIndex> {
        &self.inner.index
    }

    /// Number of downloads currently pending.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.lock().len()
    }

    /// Ask for the artwork of `request`. Never blocks: exactly one of the
    /// callbacks runs later on a runtime thread, unless the handle is
    /// detached first.
    pub fn request<S, F>(&self, request: &ArtworkRequest, on_success: S, on_failure: F) -> FetchHandle
    where
        S: FnOnce(&ArtworkRequest, Arc<[u8]>) + Send + 'static,
        F: FnOnce(&ArtworkRequest, FetchError) + Send + 'static,
    {
        let key = NaturalKey::of(request);

        if key.is_empty() {
            // Nothing to download by and nowhere to record it.
            let request = request.clone();
            self.inner.runtime.spawn(async move {
                on_failure(&request, FetchError::NoProvider);
            });
            return FetchHandle {
                key,
                waiter: 0,
                started: false,
                inner: Weak::new(),
            };
        }

        let waiter = Waiter {
            id: self.inner.next_waiter.fetch_add(1, Ordering::Relaxed),
            on_success: Box::new(on_success),
            on_failure: Box::new(on_failure),
        };
        let id = waiter.id;

        let started = match self.inner.in_flight.lock().entry(key.clone()) {
            Entry::Occupied(mut pending) => {
                pending.get_mut().push(waiter);
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(vec![waiter]);
                true
            }
        };

        if started {
            let inner = Arc::clone(&self.inner);
            let request = request.clone();
            let key = key.clone();
            self.inner.runtime.spawn(async move {
                inner.run(key, request).await;
            });
        } else {
            tracing::debug!(
                "Joined pending {} download for {:?}",
                key.kind.as_str(),
                request.name()
            );
        }

        FetchHandle {
            key,
            waiter: id,
            started,
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl Inner {
    async fn run(self: Arc<Self>, key: NaturalKey, request: ArtworkRequest) {
        let mut entry = InFlightEntry {
            inner: &*self,
            key: &key,
            finished: false,
        };
        let result = fetch_first(&self.providers, self.transport.as_ref(), &request).await;

        match result {
            Ok(bytes) => {
                let bytes: Arc<[u8]> = bytes.into();

                // Deliver first, but keep the entry until the index is
                // updated so nobody starts a second download meanwhile.
                for waiter in self.take_waiters(&key, false) {
                    let bytes = Arc::clone(&bytes);
                    notify(&request, move |request| (waiter.on_success)(request, bytes));
                }
                self.persist(&request, Some(Arc::clone(&bytes))).await;
                for waiter in entry.finish() {
                    let bytes = Arc::clone(&bytes);
                    notify(&request, move |request| (waiter.on_success)(request, bytes));
                }
            }
            Err(error) => {
                tracing::debug!(
                    "No {} artwork for {:?}: {}",
                    key.kind.as_str(),
                    request.name(),
                    error
                );
                self.persist(&request, None).await;
                for waiter in entry.finish() {
                    let error = error.clone();
                    notify(&request, move |request| (waiter.on_failure)(request, error));
                }
            }
        }
    }

    fn take_waiters(&self, key: &NaturalKey, finish: bool) -> Vec<Waiter> {
        let mut in_flight = self.in_flight.lock();
        if finish {
            in_flight.remove(key).unwrap_or_default()
        } else {
            in_flight.get_mut(key).map(std::mem::take).unwrap_or_default()
        }
    }

    async fn persist(&self, request: &ArtworkRequest, bytes: Option<Arc<[u8]>>) {
        let index = Arc::clone(&self.index);
        let request = request.clone();

        let result =
            tokio::task::spawn_blocking(move || index.record(&request, bytes.as_deref())).await;

        match result {
            Ok(Ok(outcome)) => tracing::debug!("Recorded artwork: {:?}", outcome),
            Ok(Err(e)) => tracing::warn!("Could not record artwork: {}", e),
            Err(e) => tracing::error!("Artwork record task failed: {}", e),
        }
    }
}

/// Run one caller's callback. A panic stays with that caller so the
/// remaining waiters are still notified.
fn notify(request: &ArtworkRequest, callback: impl FnOnce(&ArtworkRequest)) {
    if panic::catch_unwind(AssertUnwindSafe(|| callback(request))).is_err() {
        tracing::error!("Artwork callback for {:?} panicked", request.name());
    }
}

/// Removes a download's in-flight entry when the download task ends, even
/// if it unwinds, so later requests for the same key start a new download.
struct InFlightEntry<'a> {
    inner: &'a Inner,
    key: &'a NaturalKey,
    finished: bool,
}

impl InFlightEntry<'_> {
    fn finish(&mut self) -> Vec<Waiter> {
        self.finished = true;
        self.inner.take_waiters(self.key, true)
    }
}

impl Drop for InFlightEntry<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let abandoned = self.inner.in_flight.lock().remove(self.key);
        if let Some(waiters) = abandoned {
            tracing::warn!(
                "{} download ended abnormally, dropping {} waiters",
                self.key.kind.as_str(),
                waiters.len()
            );
        }
    }
}

#[cfg(test)]
mod tests;
