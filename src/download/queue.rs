// Audiocine - Audio description cinema for mobile
// Copyright (C) 2025 Audiocine contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Bounded-concurrency download queue
//!
//! # Architecture
//! ```text
//! enqueue ──► DownloadTasks row (QUEUED) ──► pending FIFO ──► process_queue
//!                                                               │
//!              ┌────────────── on_download_finished ◄── worker task (≤ max)
//!              └──► process_queue
//! ```
//!
//! The durable rows are the ground truth; the FIFO only orders work for the
//! current process. Check-count / pop / dispatch happens while holding the
//! `pending` lock, so concurrent callers can never push the number of running
//! workers past `max_concurrent`.

use crate::config::CoreConfig;
use crate::content::{ContentRef, UnitKey};
use crate::download::groups::{group_tasks, DownloadGroup};
use crate::download::layout::StorageLayout;
use crate::download::probe::FfprobeDurationProbe;
use crate::download::worker::{partial_path_for, remove_file_if_exists, DownloadWorker, TransferOutcome, CANCELLED_MESSAGE};
use crate::error::{AudiocineError, Result};
use crate::net::HttpMediaFetcher;
use crate::storage::{Database, DownloadRecord, DownloadRequest, DownloadStatus, DownloadStore};
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::{FutureExt, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

struct QueueInner {
    store: DownloadStore,
    worker: DownloadWorker,
    max_concurrent: usize,
    pending: Mutex<VecDeque<DownloadRequest>>,
    active: AtomicUsize,
    in_flight: Mutex<HashMap<UnitKey, CancellationToken>>,
    /// Re-enqueued while a cancelled transfer of the same unit winds down
    retries: Mutex<HashMap<UnitKey, DownloadRequest>>,
}

#[derive(Clone)]
pub struct DownloadQueue {
    inner: Arc<QueueInner>,
}

impl DownloadQueue {
    pub fn new(store: DownloadStore, worker: DownloadWorker, max_concurrent: usize) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                store,
                worker,
                max_concurrent: max_concurrent.max(1),
                pending: Mutex::new(VecDeque::new()),
                active: AtomicUsize::new(0),
                in_flight: Mutex::new(HashMap::new()),
                retries: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// HTTP fetcher, ffprobe and the configured storage root
    pub fn from_config(config: &CoreConfig, db: &Database) -> Result<Self> {
        let store = DownloadStore::new(db.pool().clone());
        let worker = DownloadWorker::new(
            store.clone(),
            Arc::new(HttpMediaFetcher::from_config(&config.network)?),
            Arc::new(FfprobeDurationProbe::default()),
            StorageLayout::new(&config.storage.download_root),
            config.network.read_timeout(),
        )
        .with_partial_cleanup(config.downloads.remove_partial_files);

        Ok(Self::new(store, worker, config.downloads.max_concurrent_downloads))
    }

    pub fn store(&self) -> &DownloadStore {
        &self.inner.store
    }

    /// Persist a QUEUED row and schedule the transfer
    ///
    /// Calling it again for a unit that is already waiting or running returns
    /// the existing row. A unit in a terminal state is reset and queued again.
    /// A unit whose transfer was cancelled but has not stopped yet is queued
    /// again as soon as that transfer releases its slot.
    pub async fn enqueue(&self, request: DownloadRequest) -> Result<DownloadRecord> {
        validate_url(&request.url)?;
        let content = request.content.clone();
        let key = content.unit_key();

        let record = {
            let mut pending = self.inner.pending.lock().await;

            let waiting = pending.iter().any(|r| r.content.same_unit(&content));
            let token = self.inner.in_flight.lock().await.get(&key).cloned();

            if let Some(token) = token.as_ref().filter(|t| t.is_cancelled()) {
                debug_assert!(!waiting, "unit both running and waiting");
                let record = self.inner.store.upsert_queued(&request).await?;
                self.inner.retries.lock().await.insert(key, request);
                info!(content = %content, "Retry queued behind cancelled transfer");
                return Ok(record);
            }

            let running = token.is_some();
            if waiting || running {
                if let Some(existing) = self.inner.store.get(&content).await? {
                    debug!(content = %content, "Download already tracked");
                    return Ok(existing);
                }
            }

            let record = self.inner.store.upsert_queued(&request).await?;
            if !waiting {
                pending.push_back(request);
            }
            record
        };

        self.process_queue().await;
        Ok(record)
    }

    /// Start workers while below the concurrency limit
    pub fn process_queue(&self) -> BoxFuture<'static, ()> {
        let queue = self.clone();
        async move { queue.dispatch_pending().await }.boxed()
    }

    async fn dispatch_pending(&self) {
        let mut pending = self.inner.pending.lock().await;

        while self.inner.active.load(Ordering::SeqCst) < self.inner.max_concurrent {
            let Some(request) = pending.pop_front() else { break };

            self.inner.active.fetch_add(1, Ordering::SeqCst);
            let token = CancellationToken::new();
            self.inner
                .in_flight
                .lock()
                .await
                .insert(request.content.unit_key(), token.clone());

            debug!(
                content = %request.content,
                active = self.inner.active.load(Ordering::SeqCst),
                "Dispatching download"
            );

            let queue = self.clone();
            tokio::spawn(async move {
                let key = request.content.unit_key();
                let run = AssertUnwindSafe(queue.inner.worker.run(&request, token)).catch_unwind();
                match run.await {
                    Ok(TransferOutcome::Completed(_)) | Ok(TransferOutcome::Cancelled) => {}
                    Ok(TransferOutcome::Failed(message)) => {
                        debug!(content = %request.content, reason = %message, "Worker reported failure");
                    }
                    Err(_) => {
                        error!(content = %request.content, "Download worker panicked");
                        if let Err(e) = queue
                            .inner
                            .store
                            .mark_failed(&request.content, "Internal error during download")
                            .await
                        {
                            warn!(error = %e, "Could not record panicked download");
                        }
                    }
                }

                queue.release_unit(key).await;
                queue.on_download_finished().await;
            });
        }
    }

    /// Forget a finished transfer; a retry waiting on it joins the FIFO
    async fn release_unit(&self, key: UnitKey) {
        let mut pending = self.inner.pending.lock().await;
        self.inner.in_flight.lock().await.remove(&key);

        let Some(retry) = self.inner.retries.lock().await.remove(&key) else {
            return;
        };
        // The cancelled worker has written its terminal state by now
        match self.inner.store.upsert_queued(&retry).await {
            Ok(_) => {
                debug!(content = %retry.content, "Cancelled transfer released, retry queued");
                pending.push_back(retry);
            }
            Err(e) => warn!(content = %retry.content, error = %e, "Could not queue retry"),
        }
    }

    /// Release a worker slot and pick up the next request
    pub(crate) async fn on_download_finished(&self) {
        let previous = self.inner.active.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(previous > 0, "active download count underflow");
        self.process_queue().await;
    }

    /// Stop a waiting or running download; the row ends up FAILED
    ///
    /// Returns false if the unit was neither waiting nor running.
    pub async fn cancel(&self, content: &ContentRef) -> Result<bool> {
        let deferred = self.inner.retries.lock().await.remove(&content.unit_key()).is_some();
        if self.remove_pending(content).await || deferred {
            self.inner.store.mark_failed(content, CANCELLED_MESSAGE).await?;
            info!(content = %content, "Queued download cancelled");
            return Ok(true);
        }

        match self.inner.in_flight.lock().await.get(&content.unit_key()) {
            Some(token) => {
                token.cancel();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Delete one task and its file
    ///
    /// A file that is already gone is not an error. Other file errors are
    /// logged and the row is removed anyway.
    pub async fn delete(&self, content: &ContentRef) -> Result<()> {
        self.stop_quietly(content).await;

        if let Some(record) = self.inner.store.get(content).await? {
            self.remove_files(&record).await;
            self.inner.store.delete(content).await?;
            info!(content = %content, "Download deleted");
        }
        Ok(())
    }

    /// Delete every file first, then every row
    pub async fn delete_all(&self) -> Result<u64> {
        self.inner.pending.lock().await.clear();
        self.inner.retries.lock().await.clear();
        for token in self.inner.in_flight.lock().await.values() {
            token.cancel();
        }

        let records = self.inner.store.list_all().await?;
        for record in &records {
            self.remove_files(record).await;
        }

        let removed = self.inner.store.delete_all().await?;
        info!(count = removed, "All downloads deleted");
        Ok(removed)
    }

    /// Re-queue rows left QUEUED or DOWNLOADING by an earlier process
    ///
    /// Returns how many requests were added to the in-memory queue.
    pub async fn resume_pending(&self) -> Result<usize> {
        if self.active_count() == 0 {
            self.inner.store.requeue_interrupted().await?;
        }

        let queued = self.inner.store.list_by_status(DownloadStatus::Queued).await?;
        let mut added = 0;
        {
            let mut pending = self.inner.pending.lock().await;
            let in_flight = self.inner.in_flight.lock().await;
            for record in queued {
                let known = pending.iter().any(|r| r.content.same_unit(&record.content))
                    || in_flight.contains_key(&record.content.unit_key());
                if !known {
                    pending.push_back(DownloadRequest::from_record(&record));
                    added += 1;
                }
            }
        }

        if added > 0 {
            info!(count = added, "Resuming pending downloads");
        }
        self.process_queue().await;
        Ok(added)
    }

    pub fn active_count(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    pub async fn pending_count(&self) -> usize {
        self.inner.pending.lock().await.len()
    }

    pub fn max_concurrent(&self) -> usize {
        self.inner.max_concurrent
    }

    pub async fn list_groups(&self) -> Result<Vec<DownloadGroup>> {
        Ok(group_tasks(self.inner.store.list_all().await?))
    }

    /// Live grouped view for the downloads screen
    pub fn subscribe_groups(&self) -> BoxStream<'static, Result<Vec<DownloadGroup>>> {
        self.inner
            .store
            .stream_all()
            .map(|records| records.map(group_tasks))
            .boxed()
    }

    async fn remove_pending(&self, content: &ContentRef) -> bool {
        let mut pending = self.inner.pending.lock().await;
        let before = pending.len();
        pending.retain(|r| !r.content.same_unit(content));
        pending.len() != before
    }

    async fn stop_quietly(&self, content: &ContentRef) {
        self.remove_pending(content).await;
        self.inner.retries.lock().await.remove(&content.unit_key());
        if let Some(token) = self.inner.in_flight.lock().await.get(&content.unit_key()) {
            token.cancel();
        }
    }

    /// The recorded file, plus the layout paths a running transfer may have
    /// written before the row knew about them
    async fn remove_files(&self, record: &DownloadRecord) {
        let layout = self.inner.worker.layout();
        let expected = layout.file_path_for(&DownloadRequest::from_record(record));
        let partial = partial_path_for(layout, record);
        let mut candidates: Vec<&Path> = record.file_path.as_deref().map(Path::new).into_iter().collect();
        for path in [expected.as_path(), partial.as_path()] {
            if !candidates.contains(&path) {
                candidates.push(path);
            }
        }

        for path in candidates {
            match remove_file_if_exists(path).await {
                Ok(true) => debug!(path = %path.display(), "Removed download file"),
                Ok(false) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Could not remove download file"),
            }
        }
    }
}

fn validate_url(url: &str) -> Result<()> {
    let parsed = url::Url::parse(url)
        .map_err(|e| AudiocineError::InvalidDownloadUrl(format!("{}: {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(AudiocineError::InvalidDownloadUrl(format!(
            "unsupported scheme '{}' in {}",
            other, url
        ))),
    }
}
