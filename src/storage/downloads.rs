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


//! Durable download task records
//!
//! Status flow: `queued -> downloading -> complete | failed`. Re-enqueueing
//! a key that already exists puts it back to `queued` and clears the old
//! result, which is how the user retries a failed download.

use crate::content::ContentRef;
use crate::error::{AudiocineError, Result};
use crate::storage::models::{DownloadRecord, DownloadRequest, DownloadStatus};
use chrono::Utc;
use futures_util::stream::{self, BoxStream, StreamExt};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

const SELECT_COLUMNS: &str = "content_id, content_type, part_index, episode_index, title, series_title, \
     source_url, status, file_path, downloaded_at, total_size_mb, duration_ms, error_message, created_at";

#[derive(Debug, Clone)]
pub struct DownloadStore {
    pool: SqlitePool,
    revision: Arc<watch::Sender<u64>>,
}

impl DownloadStore {
    pub fn new(pool: SqlitePool) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            pool,
            revision: Arc::new(revision),
        }
    }

    /// Insert a QUEUED row, or reset an existing one back to QUEUED
    pub async fn upsert_queued(&self, request: &DownloadRequest) -> Result<DownloadRecord> {
        let now = Utc::now().to_rfc3339();
        let content = &request.content;

        sqlx::query(
            r#"
            INSERT INTO DownloadTasks (
                content_id, content_type, part_index, episode_index, title, series_title,
                source_url, status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(content_id, part_index, episode_index) DO UPDATE SET
                content_type = excluded.content_type,
                title = excluded.title,
                series_title = excluded.series_title,
                source_url = excluded.source_url,
                status = excluded.status,
                file_path = NULL,
                downloaded_at = NULL,
                total_size_mb = 0,
                duration_ms = 0,
                error_message = NULL,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&content.content_id)
        .bind(content.content_type.as_str())
        .bind(content.part_index)
        .bind(content.episode_index)
        .bind(&request.title)
        .bind(&request.series_title)
        .bind(&request.url)
        .bind(DownloadStatus::Queued.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        info!(content = %content, title = %request.title, "Download queued");
        self.bump();
        self.require(content).await
    }

    pub async fn mark_downloading(&self, content: &ContentRef) -> Result<()> {
        self.update_status(content, DownloadStatus::Downloading, None).await
    }

    pub async fn mark_complete(
        &self,
        content: &ContentRef,
        file_path: &str,
        total_size_mb: f64,
        duration_ms: i64,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            UPDATE DownloadTasks SET
                status = ?, file_path = ?, downloaded_at = ?, total_size_mb = ?,
                duration_ms = ?, error_message = NULL, updated_at = ?
            WHERE content_id = ? AND part_index = ? AND episode_index = ?
            "#,
        )
        .bind(DownloadStatus::Complete.as_str())
        .bind(file_path)
        .bind(&now)
        .bind(total_size_mb)
        .bind(duration_ms)
        .bind(&now)
        .bind(&content.content_id)
        .bind(content.part_index)
        .bind(content.episode_index)
        .execute(&self.pool)
        .await?;

        Self::ensure_updated(result.rows_affected(), content)?;
        info!(content = %content, file_path, total_size_mb, "Download complete");
        self.bump();
        Ok(())
    }

    pub async fn mark_failed(&self, content: &ContentRef, error_message: &str) -> Result<()> {
        self.update_status(content, DownloadStatus::Failed, Some(error_message)).await
    }

    async fn update_status(&self, content: &ContentRef, status: DownloadStatus, error_message: Option<&str>) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE DownloadTasks SET status = ?, error_message = ?, updated_at = ?
            WHERE content_id = ? AND part_index = ? AND episode_index = ?
            "#,
        )
        .bind(status.as_str())
        .bind(error_message)
        .bind(Utc::now().to_rfc3339())
        .bind(&content.content_id)
        .bind(content.part_index)
        .bind(content.episode_index)
        .execute(&self.pool)
        .await?;

        Self::ensure_updated(result.rows_affected(), content)?;
        debug!(content = %content, status = status.as_str(), "Download status changed");
        self.bump();
        Ok(())
    }

    pub async fn get(&self, content: &ContentRef) -> Result<Option<DownloadRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM DownloadTasks WHERE content_id = ? AND part_index = ? AND episode_index = ?",
            SELECT_COLUMNS
        ))
        .bind(&content.content_id)
        .bind(content.part_index)
        .bind(content.episode_index)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(DownloadRecord::from_row).transpose()
    }

    async fn require(&self, content: &ContentRef) -> Result<DownloadRecord> {
        self.get(content)
            .await?
            .ok_or_else(|| AudiocineError::not_found(format!("download {}", content)))
    }

    /// All tasks in creation order
    pub async fn list_all(&self) -> Result<Vec<DownloadRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM DownloadTasks ORDER BY created_at ASC, content_id, part_index, episode_index",
            SELECT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(DownloadRecord::from_row).collect()
    }

    pub async fn list_by_status(&self, status: DownloadStatus) -> Result<Vec<DownloadRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM DownloadTasks WHERE status = ? ORDER BY created_at ASC, content_id, part_index, episode_index",
            SELECT_COLUMNS
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(DownloadRecord::from_row).collect()
    }

    pub async fn count_by_status(&self, status: DownloadStatus) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM DownloadTasks WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Returns whether a row was removed
    pub async fn delete(&self, content: &ContentRef) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM DownloadTasks WHERE content_id = ? AND part_index = ? AND episode_index = ?",
        )
        .bind(&content.content_id)
        .bind(content.part_index)
        .bind(content.episode_index)
        .execute(&self.pool)
        .await?;

        let removed = result.rows_affected() > 0;
        if removed {
            self.bump();
        }
        Ok(removed)
    }

    pub async fn delete_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM DownloadTasks").execute(&self.pool).await?;
        self.bump();
        Ok(result.rows_affected())
    }

    /// Put rows interrupted mid-transfer back to QUEUED
    ///
    /// Only meaningful at startup, before any worker runs.
    pub async fn requeue_interrupted(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE DownloadTasks SET status = ?, updated_at = ? WHERE status = ?",
        )
        .bind(DownloadStatus::Queued.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(DownloadStatus::Downloading.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            info!(count = result.rows_affected(), "Re-queued interrupted downloads");
            self.bump();
        }
        Ok(result.rows_affected())
    }

    /// Live feed of all tasks; yields immediately and after every change
    pub fn stream_all(&self) -> BoxStream<'static, Result<Vec<DownloadRecord>>> {
        let store = self.clone();
        let mut changes = self.revision.subscribe();
        changes.mark_changed();

        stream::unfold((store, changes), |(store, mut changes)| async move {
            changes.changed().await.ok()?;
            let snapshot = store.list_all().await;
            Some((snapshot, (store, changes)))
        })
        .boxed()
    }

    fn ensure_updated(rows_affected: u64, content: &ContentRef) -> Result<()> {
        if rows_affected == 0 {
            return Err(AudiocineError::not_found(format!("download {}", content)));
        }
        Ok(())
    }

    fn bump(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}
