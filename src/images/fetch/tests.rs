use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{oneshot, Semaphore};

use super::*;
use crate::images::providers::CoverArtArchiveProvider;
use crate::images::types::ArtworkLookup;
use crate::test_utils::*;

type Outcome = Result<Arc<[u8]>, FetchError>;

fn coordinator(index: Arc<ArtworkIndex>, transport: Arc<MockTransport>) -> FetchCoordinator {
    FetchCoordinator::new(
        index,
        transport,
        vec![Arc::new(CoverArtArchiveProvider::new())],
        Handle::current(),
    )
}

/// Callbacks that forward whichever fires into a oneshot channel.
fn channel_callbacks() -> (SuccessCallback, FailureCallback, oneshot::Receiver<Outcome>) {
    let (tx, rx) = oneshot::channel();
    let tx = Arc::new(Mutex::new(Some(tx)));
    let tx_failure = Arc::clone(&tx);

    let on_success: SuccessCallback = Box::new(move |_, bytes| {
        if let Some(tx) = tx.lock().take() {
            let _ = tx.send(Ok(bytes));
        }
    });
    let on_failure: FailureCallback = Box::new(move |_, error| {
        if let Some(tx) = tx_failure.lock().take() {
            let _ = tx.send(Err(error));
        }
    });

    (on_success, on_failure, rx)
}

fn legend(mbid: &str) -> ArtworkRequest {
    ArtworkRequest::album(&test_album_with_mbid(mbid, "Legend", "Bob Marley"))
}

#[tokio::test]
async fn test_concurrent_requests_share_one_download() {
    let (index, _pool, _dir) = setup_test_index();
    let index = Arc::new(index);
    let gate = Arc::new(Semaphore::new(0));
    let transport = Arc::new(
        MockTransport::new()
            .with_response(
                &CoverArtArchiveProvider::release_cover_url("m-1"),
                JPEG_BYTES.to_vec(),
            )
            .with_gate(Arc::clone(&gate)),
    );
    let coordinator = coordinator(Arc::clone(&index), Arc::clone(&transport));
    let request = legend("m-1");

    let (s1, f1, rx1) = channel_callbacks();
    let (s2, f2, rx2) = channel_callbacks();
    let first = coordinator.request(&request, s1, f1);
    let second = coordinator.request(&request, s2, f2);

    assert!(first.started());
    assert!(!second.started());
    assert_eq!(coordinator.in_flight(), 1);

    gate.add_permits(1);
    let a = rx1.await.unwrap().unwrap();
    let b = rx2.await.unwrap().unwrap();

    assert_eq!(&*a, JPEG_BYTES);
    assert!(Arc::ptr_eq(&a, &b));

    wait_until(|| coordinator.in_flight() == 0).await;
    assert_eq!(transport.call_count(), 1);
    assert!(matches!(index.lookup(&request), ArtworkLookup::Found(_)));
}

#[tokio::test]
async fn test_requests_from_many_threads_start_one_download() {
    let (index, _pool, _dir) = setup_test_index();
    let gate = Arc::new(Semaphore::new(0));
    let transport = Arc::new(
        MockTransport::new()
            .with_response(
                &CoverArtArchiveProvider::release_cover_url("m-1"),
                JPEG_BYTES.to_vec(),
            )
            .with_gate(Arc::clone(&gate)),
    );
    let coordinator = coordinator(Arc::new(index), Arc::clone(&transport));

    let receivers: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let coordinator = coordinator.clone();
                scope.spawn(move || {
                    let (on_success, on_failure, rx) = channel_callbacks();
                    let handle = coordinator.request(&legend("m-1"), on_success, on_failure);
                    (handle.started(), rx)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(receivers.iter().filter(|(started, _)| *started).count(), 1);

    gate.add_permits(1);
    for (_, rx) in receivers {
        assert!(rx.await.unwrap().is_ok());
    }
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn test_failed_download_is_recorded_as_missing() {
    let (index, _pool, _dir) = setup_test_index();
    let index = Arc::new(index);
    let transport = Arc::new(MockTransport::new());
    let coordinator = coordinator(Arc::clone(&index), Arc::clone(&transport));
    let request = ArtworkRequest::album(&test_album_with_mbid("m-404", "", ""));

    let (on_success, on_failure, rx) = channel_callbacks();
    coordinator.request(&request, on_success, on_failure);

    assert_eq!(rx.await.unwrap().unwrap_err(), FetchError::NotFound);
    assert_eq!(index.lookup(&request), ArtworkLookup::NotFound);
    assert_eq!(coordinator.in_flight(), 0);
}

#[tokio::test]
async fn test_transport_error_is_recorded_as_missing() {
    let (index, _pool, _dir) = setup_test_index();
    let index = Arc::new(index);
    let transport = Arc::new(MockTransport::new().with_error(
        &CoverArtArchiveProvider::release_cover_url("m-1"),
        FetchError::Transport("connection reset".to_string()),
    ));
    let coordinator = coordinator(Arc::clone(&index), transport);
    let request = ArtworkRequest::album(&test_album_with_mbid("m-1", "", ""));

    let (on_success, on_failure, rx) = channel_callbacks();
    coordinator.request(&request, on_success, on_failure);

    assert!(matches!(rx.await.unwrap(), Err(FetchError::Transport(_))));
    assert_eq!(index.lookup(&request), ArtworkLookup::NotFound);
}

#[tokio::test]
async fn test_detached_waiter_is_not_called() {
    let (index, _pool, _dir) = setup_test_index();
    let index = Arc::new(index);
    let gate = Arc::new(Semaphore::new(0));
    let transport = Arc::new(
        MockTransport::new()
            .with_response(
                &CoverArtArchiveProvider::release_cover_url("m-1"),
                JPEG_BYTES.to_vec(),
            )
            .with_gate(Arc::clone(&gate)),
    );
    let coordinator = coordinator(Arc::clone(&index), transport);
    let request = legend("m-1");

    let (s1, f1, rx1) = channel_callbacks();
    let (s2, f2, rx2) = channel_callbacks();
    let first = coordinator.request(&request, s1, f1);
    let second = coordinator.request(&request, s2, f2);

    assert!(first.detach());
    assert!(!first.detach());
    // The detached callbacks were dropped without running
    assert!(rx1.await.is_err());

    gate.add_permits(1);
    assert!(rx2.await.unwrap().is_ok());

    wait_until(|| coordinator.in_flight() == 0).await;
    assert!(!second.detach());
    assert!(matches!(index.lookup(&request), ArtworkLookup::Found(_)));
}

#[tokio::test]
async fn test_download_completes_after_every_waiter_left() {
    let (index, _pool, _dir) = setup_test_index();
    let index = Arc::new(index);
    let transport = Arc::new(MockTransport::new().with_response(
        &CoverArtArchiveProvider::release_cover_url("m-1"),
        JPEG_BYTES.to_vec(),
    ));
    let coordinator = coordinator(Arc::clone(&index), transport);
    let request = legend("m-1");

    let (on_success, on_failure, _rx) = channel_callbacks();
    let handle = coordinator.request(&request, on_success, on_failure);
    handle.detach();

    wait_until(|| coordinator.in_flight() == 0).await;
    assert!(matches!(index.lookup(&request), ArtworkLookup::Found(_)));
}

#[tokio::test]
async fn test_distinct_albums_download_separately() {
    let (index, _pool, _dir) = setup_test_index();
    let transport = Arc::new(
        MockTransport::new()
            .with_response(
                &CoverArtArchiveProvider::release_cover_url("m-1"),
                JPEG_BYTES.to_vec(),
            )
            .with_response(
                &CoverArtArchiveProvider::release_cover_url("m-2"),
                JPEG_BYTES.to_vec(),
            ),
    );
    let coordinator = coordinator(Arc::new(index), Arc::clone(&transport));

    let (s1, f1, rx1) = channel_callbacks();
    let (s2, f2, rx2) = channel_callbacks();
    assert!(coordinator.request(&legend("m-1"), s1, f1).started());
    assert!(coordinator.request(&legend("m-2"), s2, f2).started());

    assert!(rx1.await.unwrap().is_ok());
    assert!(rx2.await.unwrap().is_ok());
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test]
async fn test_request_without_identity_fails_without_download() {
    let (index, _pool, _dir) = setup_test_index();
    let transport = Arc::new(MockTransport::new());
    let coordinator = coordinator(Arc::new(index), Arc::clone(&transport));
    let request = ArtworkRequest::artist(&test_artist(" ", &[]));

    let (on_success, on_failure, rx) = channel_callbacks();
    let handle = coordinator.request(&request, on_success, on_failure);

    assert!(!handle.started());
    assert_eq!(rx.await.unwrap().unwrap_err(), FetchError::NoProvider);
    assert_eq!(transport.call_count(), 0);
    assert_eq!(coordinator.in_flight(), 0);
}

#[tokio::test]
async fn test_unsupported_request_is_recorded_as_missing() {
    let (index, _pool, _dir) = setup_test_index();
    let index = Arc::new(index);
    let transport = Arc::new(MockTransport::new());
    let coordinator = coordinator(Arc::clone(&index), Arc::clone(&transport));
    // Cover Art Archive has no artist images
    let request = ArtworkRequest::artist(&test_artist("Queen", &[]));

    let (on_success, on_failure, rx) = channel_callbacks();
    coordinator.request(&request, on_success, on_failure);

    assert_eq!(rx.await.unwrap().unwrap_err(), FetchError::NoProvider);
    assert_eq!(index.lookup(&request), ArtworkLookup::NotFound);
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn test_panicking_callback_does_not_block_later_requests() {
    let (index, _pool, _dir) = setup_test_index();
    let index = Arc::new(index);
    let gate = Arc::new(Semaphore::new(0));
    let transport = Arc::new(
        MockTransport::new()
            .with_response(
                &CoverArtArchiveProvider::release_cover_url("m-1"),
                JPEG_BYTES.to_vec(),
            )
            .with_gate(Arc::clone(&gate)),
    );
    let coordinator = coordinator(Arc::clone(&index), Arc::clone(&transport));
    let request = legend("m-1");

    coordinator.request(&request, |_, _| panic!("row was recycled"), |_, _| {});
    let (on_success, on_failure, rx) = channel_callbacks();
    coordinator.request(&request, on_success, on_failure);

    gate.add_permits(1);
    assert!(rx.await.unwrap().is_ok());

    wait_until(|| coordinator.in_flight() == 0).await;
    assert!(matches!(index.lookup(&request), ArtworkLookup::Found(_)));

    let (on_success, on_failure, rx) = channel_callbacks();
    let again = coordinator.request(&request, on_success, on_failure);
    assert!(again.started());
    assert!(rx.await.unwrap().is_ok());
}

struct PanickingTransport;

#[async_trait::async_trait]
impl HttpTransport for PanickingTransport {
    async fn get(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
        panic!("transport bug")
    }
}

#[tokio::test]
async fn test_aborted_download_releases_its_key() {
    let (index, _pool, _dir) = setup_test_index();
    let coordinator = FetchCoordinator::new(
        Arc::new(index),
        Arc::new(PanickingTransport),
        vec![Arc::new(CoverArtArchiveProvider::new())],
        Handle::current(),
    );
    let request = legend("m-1");

    let (on_success, on_failure, rx) = channel_callbacks();
    assert!(coordinator.request(&request, on_success, on_failure).started());

    // The waiter is dropped with the task instead of being left attached
    assert!(rx.await.is_err());
    assert_eq!(coordinator.in_flight(), 0);

    let (on_success, on_failure, _rx) = channel_callbacks();
    assert!(coordinator.request(&request, on_success, on_failure).started());
}
