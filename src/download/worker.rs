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


//! Single-download transfer
//!
//! A worker run always ends with the row in a terminal state (COMPLETE or
//! FAILED) unless the row was deleted underneath it. It never returns an
//! error; the outcome is reported to the queue instead.

use crate::download::layout::StorageLayout;
use crate::download::probe::DurationProbe;
use crate::error::{AudiocineError, Result};
use crate::net::MediaFetcher;
use crate::storage::{DownloadRecord, DownloadRequest, DownloadStore};
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Message stored on rows stopped by the user
pub const CANCELLED_MESSAGE: &str = "Download cancelled";

#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    Completed(DownloadRecord),
    /// User-facing message that was written to the row
    Failed(String),
    Cancelled,
}

#[derive(Clone)]
pub struct DownloadWorker {
    store: DownloadStore,
    fetcher: Arc<dyn MediaFetcher>,
    probe: Arc<dyn DurationProbe>,
    layout: StorageLayout,
    read_timeout: Duration,
    remove_partial_files: bool,
}

impl DownloadWorker {
    pub fn new(
        store: DownloadStore,
        fetcher: Arc<dyn MediaFetcher>,
        probe: Arc<dyn DurationProbe>,
        layout: StorageLayout,
        read_timeout: Duration,
    ) -> Self {
        Self {
            store,
            fetcher,
            probe,
            layout,
            read_timeout,
            remove_partial_files: true,
        }
    }

    pub fn with_partial_cleanup(mut self, remove_partial_files: bool) -> Self {
        self.remove_partial_files = remove_partial_files;
        self
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Transfer one request to disk and record the result
    pub async fn run(&self, request: &DownloadRequest, cancel: CancellationToken) -> TransferOutcome {
        let content = &request.content;

        if let Err(e) = self.store.mark_downloading(content).await {
            warn!(content = %content, error = %e, "Could not mark download as started");
            return TransferOutcome::Failed(e.user_message());
        }

        let final_path = self.layout.file_path_for(request);
        let partial_path = StorageLayout::partial_path(&final_path);
        info!(content = %content, path = %final_path.display(), "Download started");

        let transfer = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AudiocineError::Cancelled),
            result = self.transfer(&request.url, &partial_path, &final_path) => result,
        };

        match transfer {
            Ok(bytes) => self.complete(request, &final_path, bytes).await,
            Err(AudiocineError::Cancelled) => {
                self.discard_partial(&partial_path).await;
                self.record_failure(request, CANCELLED_MESSAGE).await;
                info!(content = %content, "Download cancelled");
                TransferOutcome::Cancelled
            }
            Err(e) => {
                self.discard_partial(&partial_path).await;
                let message = e.user_message();
                error!(content = %content, error = %e, retryable = e.is_retryable(), "Download failed");
                self.record_failure(request, &message).await;
                TransferOutcome::Failed(message)
            }
        }
    }

    /// Stream the body into `partial_path`, then move it into place
    async fn transfer(&self, url: &str, partial_path: &Path, final_path: &Path) -> Result<u64> {
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut body = self.fetcher.open(url).await?;
        let mut file = fs::File::create(partial_path).await?;
        let mut written: u64 = 0;

        loop {
            let next = tokio::time::timeout(self.read_timeout, body.stream.next())
                .await
                .map_err(|_| AudiocineError::Timeout(self.read_timeout.as_secs()))?;

            let Some(chunk) = next else { break };
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        drop(file);

        if let Some(expected) = body.content_length {
            if expected != written {
                return Err(AudiocineError::FileSizeMismatch {
                    expected,
                    actual: written,
                });
            }
        }

        fs::rename(partial_path, final_path).await?;
        debug!(path = %final_path.display(), bytes = written, "Transfer finished");
        Ok(written)
    }

    async fn complete(&self, request: &DownloadRequest, final_path: &Path, bytes: u64) -> TransferOutcome {
        let content = &request.content;
        let size_mb = bytes_to_mb(bytes);

        let duration_ms = match self.probe.duration_ms(final_path).await {
            Ok(ms) => ms,
            Err(e) => {
                warn!(content = %content, error = %e, "Could not read media duration");
                0
            }
        };

        let path_str = final_path.to_string_lossy().to_string();
        let recorded = match self
            .store
            .mark_complete(content, &path_str, size_mb, duration_ms)
            .await
        {
            Ok(()) => self.store.get(content).await,
            Err(e) => Err(e),
        };

        match recorded {
            Ok(Some(record)) => TransferOutcome::Completed(record),
            Ok(None) => {
                self.discard_orphan(final_path).await;
                TransferOutcome::Failed(AudiocineError::not_found(content.to_string()).user_message())
            }
            Err(e) if e.is_not_found() => {
                info!(content = %content, "Download deleted while finishing");
                self.discard_orphan(final_path).await;
                TransferOutcome::Failed(e.user_message())
            }
            Err(e) => {
                error!(content = %content, error = %e, "Could not record finished download");
                TransferOutcome::Failed(e.user_message())
            }
        }
    }

    async fn record_failure(&self, request: &DownloadRequest, message: &str) {
        if let Err(e) = self.store.mark_failed(&request.content, message).await {
            // The row is gone when the task was deleted while running
            debug!(content = %request.content, error = %e, "Could not record download failure");
        }
    }

    /// The row is gone, so nothing would ever point at this file again
    async fn discard_orphan(&self, final_path: &Path) {
        if let Err(e) = remove_file_if_exists(final_path).await {
            warn!(path = %final_path.display(), error = %e, "Could not remove orphaned download");
        }
    }

    async fn discard_partial(&self, partial_path: &Path) {
        if !self.remove_partial_files {
            return;
        }
        if let Err(e) = remove_file_if_exists(partial_path).await {
            warn!(path = %partial_path.display(), error = %e, "Could not remove partial file");
        }
    }
}

/// Remove a file; a file that is already gone counts as removed
pub async fn remove_file_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Bytes to megabytes, two decimals
pub fn bytes_to_mb(bytes: u64) -> f64 {
    ((bytes as f64 / BYTES_PER_MB) * 100.0).round() / 100.0
}

/// Partial file location for a stored record
pub fn partial_path_for(layout: &StorageLayout, record: &DownloadRecord) -> PathBuf {
    StorageLayout::partial_path(&layout.file_path_for(&DownloadRequest::from_record(record)))
}
