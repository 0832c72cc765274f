//! Integration tests for the download queue
//!
//! HTTP transfers go through a mockito server; concurrency and cancellation
//! use a gated in-process fetcher so the tests control when bytes flow.

use async_trait::async_trait;
use audiocine_core::config::NetworkConfig;
use audiocine_core::content::ContentRef;
use audiocine_core::download::{DownloadQueue, DownloadWorker, DurationProbe, StorageLayout};
use audiocine_core::error::{AudiocineError, Result};
use audiocine_core::net::{HttpMediaFetcher, MediaBody, MediaFetcher};
use audiocine_core::storage::{Database, DownloadRequest, DownloadStatus, DownloadStore};
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Semaphore;

struct FixedProbe(i64);

#[async_trait]
impl DurationProbe for FixedProbe {
    async fn duration_ms(&self, _file: &Path) -> Result<i64> {
        Ok(self.0)
    }
}

/// Holds every transfer at `open` until the test adds permits
struct GatedFetcher {
    gate: Semaphore,
    opened: AtomicUsize,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl GatedFetcher {
    fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            opened: AtomicUsize::new(0),
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// Counts a transfer as active until its body stream is dropped
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MediaFetcher for GatedFetcher {
    async fn open(&self, _url: &str) -> Result<MediaBody> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let guard = ActiveGuard(Arc::clone(&self.active));

        self.gate
            .acquire()
            .await
            .map_err(|_| AudiocineError::internal("gate closed"))?
            .forget();

        let body = stream::iter(vec![Ok(Bytes::from_static(b"audio bytes"))]).map(move |chunk| {
            let _held = &guard;
            chunk
        });
        Ok(MediaBody {
            content_length: Some(11),
            stream: body.boxed(),
        })
    }
}

struct Harness {
    _dir: TempDir,
    db: Database,
    store: DownloadStore,
    layout_root: std::path::PathBuf,
}

impl Harness {
    async fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let db = Database::new(dir.path().join("audiocine.db"))
            .await
            .expect("database");
        let store = DownloadStore::new(db.pool().clone());
        let layout_root = dir.path().join("downloads");
        Self {
            _dir: dir,
            db,
            store,
            layout_root,
        }
    }

    fn queue(&self, fetcher: Arc<dyn MediaFetcher>, max_concurrent: usize) -> DownloadQueue {
        let worker = DownloadWorker::new(
            self.store.clone(),
            fetcher,
            Arc::new(FixedProbe(90_000)),
            StorageLayout::new(&self.layout_root),
            Duration::from_secs(5),
        );
        DownloadQueue::new(self.store.clone(), worker, max_concurrent)
    }
}

fn http_fetcher() -> Arc<dyn MediaFetcher> {
    Arc::new(HttpMediaFetcher::from_config(&NetworkConfig::default()).expect("http client"))
}

fn part_request(part: i32, url: &str) -> DownloadRequest {
    DownloadRequest::new(ContentRef::movie_part("film-1", part), "Long Film", url)
}

async fn wait_until<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !check().await {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn status_of(store: &DownloadStore, content: &ContentRef) -> Option<DownloadStatus> {
    store.get(content).await.expect("query").map(|r| r.status)
}

#[tokio::test]
async fn test_http_download_completes() {
    let harness = Harness::new().await;
    let mut server = mockito::Server::new_async().await;
    let body = vec![7u8; 4096];
    let mock = server
        .mock("GET", "/media/film_1.mp3")
        .with_status(200)
        .with_header("content-type", "audio/mpeg")
        .with_body(body.clone())
        .create_async()
        .await;

    let queue = harness.queue(http_fetcher(), 3);
    let request = part_request(0, &format!("{}/media/film_1.mp3", server.url()));
    let content = request.content.clone();

    let queued = queue.enqueue(request).await.expect("enqueue");
    assert!(matches!(queued.status, DownloadStatus::Queued | DownloadStatus::Downloading));

    wait_until("completion", || async {
        status_of(&harness.store, &content).await == Some(DownloadStatus::Complete)
    })
    .await;
    mock.assert_async().await;

    let record = harness.store.get(&content).await.unwrap().unwrap();
    let path = record.file_path.clone().expect("file path");
    assert!(path.ends_with("Long Film - Part 1.mp3"));
    assert!(path.contains("Movies"));
    assert_eq!(tokio::fs::read(&path).await.unwrap(), body);
    assert_eq!(record.duration_ms, 90_000);
    assert!(record.downloaded_at.is_some());
    assert!(record.error_message.is_none());

    wait_until("slot release", || async { queue.active_count() == 0 }).await;
}

#[tokio::test]
async fn test_http_error_marks_failed() {
    let harness = Harness::new().await;
    let mut server = mockito::Server::new_async().await;
    let _m = server.mock("GET", "/gone.mp3").with_status(404).create_async().await;

    let queue = harness.queue(http_fetcher(), 3);
    let request = part_request(0, &format!("{}/gone.mp3", server.url()));
    let content = request.content.clone();
    queue.enqueue(request).await.unwrap();

    wait_until("failure", || async {
        status_of(&harness.store, &content).await == Some(DownloadStatus::Failed)
    })
    .await;

    let record = harness.store.get(&content).await.unwrap().unwrap();
    assert!(record.error_message.is_some());
    assert!(record.file_path.is_none());

    // Manual retry resets the row
    wait_until("slot release", || async { queue.active_count() == 0 }).await;
    let retried = queue
        .enqueue(part_request(0, &format!("{}/gone.mp3", server.url())))
        .await
        .unwrap();
    assert!(retried.error_message.is_none());
}

#[tokio::test]
async fn test_delete_with_missing_file_succeeds() {
    let harness = Harness::new().await;
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("GET", "/doc.mp3")
        .with_status(200)
        .with_body("documentary")
        .create_async()
        .await;

    let queue = harness.queue(http_fetcher(), 3);
    let request = part_request(0, &format!("{}/doc.mp3", server.url()));
    let content = request.content.clone();
    queue.enqueue(request).await.unwrap();
    wait_until("completion", || async {
        status_of(&harness.store, &content).await == Some(DownloadStatus::Complete)
    })
    .await;

    wait_until("slot release", || async { queue.active_count() == 0 }).await;

    let path = harness.store.get(&content).await.unwrap().unwrap().file_path.unwrap();
    tokio::fs::remove_file(&path).await.unwrap();

    queue.delete(&content).await.expect("delete with missing file");
    assert_eq!(status_of(&harness.store, &content).await, None);

    // Deleting again is a no-op
    queue.delete(&content).await.expect("second delete");
}

#[tokio::test]
async fn test_never_more_than_three_transfers() {
    let harness = Harness::new().await;
    let fetcher = Arc::new(GatedFetcher::new());
    let queue = harness.queue(fetcher.clone(), 3);

    for part in 0..8 {
        queue
            .enqueue(part_request(part, "https://cdn.example.com/film.mp3"))
            .await
            .unwrap();
    }

    wait_until("three transfers to open", || async { fetcher.opened.load(Ordering::SeqCst) == 3 }).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(fetcher.opened.load(Ordering::SeqCst), 3);
    assert_eq!(queue.active_count(), 3);
    assert_eq!(queue.pending_count().await, 5);
    assert_eq!(harness.store.count_by_status(DownloadStatus::Downloading).await.unwrap(), 3);
    assert_eq!(harness.store.count_by_status(DownloadStatus::Queued).await.unwrap(), 5);

    // Release transfers one at a time and watch the ceiling
    for released in 1..=8 {
        fetcher.gate.add_permits(1);
        wait_until("a slot to turn over", || async {
            harness.store.count_by_status(DownloadStatus::Complete).await.unwrap() == released
        })
        .await;
        let downloading = harness.store.count_by_status(DownloadStatus::Downloading).await.unwrap();
        assert!(downloading <= 3, "{} downloads running at once", downloading);
    }

    wait_until("queue to drain", || async { queue.active_count() == 0 }).await;
    assert_eq!(fetcher.peak.load(Ordering::SeqCst), 3);
    assert_eq!(queue.pending_count().await, 0);

    let groups = queue.list_groups().await.unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].completed_count(), 8);
}

#[tokio::test]
async fn test_cancel_queued_and_running() {
    let harness = Harness::new().await;
    let fetcher = Arc::new(GatedFetcher::new());
    let queue = harness.queue(fetcher.clone(), 1);

    let running = part_request(0, "https://cdn.example.com/a.mp3");
    let waiting = part_request(1, "https://cdn.example.com/b.mp3");
    queue.enqueue(running.clone()).await.unwrap();
    queue.enqueue(waiting.clone()).await.unwrap();

    wait_until("first transfer", || async { fetcher.opened.load(Ordering::SeqCst) == 1 }).await;

    assert!(queue.cancel(&waiting.content).await.unwrap());
    let record = harness.store.get(&waiting.content).await.unwrap().unwrap();
    assert_eq!(record.status, DownloadStatus::Failed);
    assert_eq!(record.error_message.as_deref(), Some("Download cancelled"));

    assert!(queue.cancel(&running.content).await.unwrap());
    wait_until("running download to stop", || async {
        status_of(&harness.store, &running.content).await == Some(DownloadStatus::Failed)
    })
    .await;
    wait_until("slot release", || async { queue.active_count() == 0 }).await;

    // The cancelled waiting request never started
    assert_eq!(fetcher.opened.load(Ordering::SeqCst), 1);
    assert!(!queue.cancel(&running.content).await.unwrap());
}

#[tokio::test]
async fn test_enqueue_right_after_cancel_runs_again() {
    let harness = Harness::new().await;
    let fetcher = Arc::new(GatedFetcher::new());
    let queue = harness.queue(fetcher.clone(), 1);

    let request = part_request(0, "https://cdn.example.com/a.mp3");
    queue.enqueue(request.clone()).await.unwrap();
    wait_until("first transfer", || async { fetcher.opened.load(Ordering::SeqCst) == 1 }).await;

    // Retry before the cancelled transfer has released its slot
    assert!(queue.cancel(&request.content).await.unwrap());
    let record = queue.enqueue(request.clone()).await.unwrap();
    assert_eq!(record.status, DownloadStatus::Queued);
    assert_eq!(record.error_message, None);

    wait_until("second transfer", || async { fetcher.opened.load(Ordering::SeqCst) == 2 }).await;
    fetcher.gate.add_permits(1);
    wait_until("retry completes", || async {
        status_of(&harness.store, &request.content).await == Some(DownloadStatus::Complete)
    })
    .await;
    wait_until("slot release", || async { queue.active_count() == 0 }).await;

    assert_eq!(queue.pending_count().await, 0);
    assert_eq!(fetcher.opened.load(Ordering::SeqCst), 2);
    let record = harness.store.get(&request.content).await.unwrap().unwrap();
    assert_eq!(record.error_message, None);
}

#[tokio::test]
async fn test_cancel_drops_retry_waiting_on_cancelled_transfer() {
    let harness = Harness::new().await;
    let fetcher = Arc::new(GatedFetcher::new());
    let queue = harness.queue(fetcher.clone(), 1);

    let request = part_request(0, "https://cdn.example.com/a.mp3");
    queue.enqueue(request.clone()).await.unwrap();
    wait_until("first transfer", || async { fetcher.opened.load(Ordering::SeqCst) == 1 }).await;

    assert!(queue.cancel(&request.content).await.unwrap());
    queue.enqueue(request.clone()).await.unwrap();
    assert!(queue.cancel(&request.content).await.unwrap());

    wait_until("slot release", || async { queue.active_count() == 0 }).await;
    assert_eq!(queue.pending_count().await, 0);
    let record = harness.store.get(&request.content).await.unwrap().unwrap();
    assert_eq!(record.status, DownloadStatus::Failed);
    assert_eq!(record.error_message.as_deref(), Some("Download cancelled"));
}

#[tokio::test]
async fn test_delete_while_running_removes_unrecorded_file() {
    let harness = Harness::new().await;
    let fetcher = Arc::new(GatedFetcher::new());
    let queue = harness.queue(fetcher.clone(), 1);

    let request = part_request(0, "https://cdn.example.com/a.mp3");
    queue.enqueue(request.clone()).await.unwrap();
    wait_until("transfer", || async { fetcher.opened.load(Ordering::SeqCst) == 1 }).await;

    // The file is already in place but the row does not point at it yet
    let final_path = harness.layout_root.join("Movies").join("Long Film - Part 1.mp3");
    std::fs::create_dir_all(final_path.parent().unwrap()).unwrap();
    std::fs::write(&final_path, b"audio bytes").unwrap();
    assert_eq!(harness.store.get(&request.content).await.unwrap().unwrap().file_path, None);

    queue.delete(&request.content).await.unwrap();
    assert!(!final_path.exists());
    assert!(harness.store.get(&request.content).await.unwrap().is_none());

    wait_until("slot release", || async { queue.active_count() == 0 }).await;
    assert!(harness.store.get(&request.content).await.unwrap().is_none());
    assert!(!final_path.exists());
}

#[tokio::test]
async fn test_resume_pending_after_restart() {
    let harness = Harness::new().await;

    // Rows left behind by a process that died mid-transfer
    let interrupted = part_request(0, "https://cdn.example.com/a.mp3");
    let never_started = part_request(1, "https://cdn.example.com/b.mp3");
    harness.store.upsert_queued(&interrupted).await.unwrap();
    harness.store.mark_downloading(&interrupted.content).await.unwrap();
    harness.store.upsert_queued(&never_started).await.unwrap();

    let fetcher = Arc::new(GatedFetcher::new());
    fetcher.gate.add_permits(2);
    let queue = harness.queue(fetcher.clone(), 3);

    assert_eq!(queue.resume_pending().await.unwrap(), 2);
    wait_until("both complete", || async {
        harness.store.count_by_status(DownloadStatus::Complete).await.unwrap() == 2
    })
    .await;

    // Nothing left to pick up
    assert_eq!(queue.resume_pending().await.unwrap(), 0);
    harness.db.close().await.unwrap();
}

#[tokio::test]
async fn test_rejects_non_http_url() {
    let harness = Harness::new().await;
    let queue = harness.queue(http_fetcher(), 3);
    let err = queue
        .enqueue(part_request(0, "file:///etc/passwd"))
        .await
        .unwrap_err();
    assert!(matches!(err, AudiocineError::InvalidDownloadUrl(_)));
    assert_eq!(harness.store.list_all().await.unwrap().len(), 0);
}
