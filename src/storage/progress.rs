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


//! Progress Store
//!
//! One row per playable unit, keyed by (content_id, part_index, episode_index).
//! Every write is an upsert on that key, so a retried save is harmless and
//! concurrent saves resolve last-writer-wins.

use crate::content::{ContentRef, ContentType};
use crate::error::Result;
use crate::storage::models::PlaybackProgress;
use futures_util::stream::{self, BoxStream, StreamExt};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

const UPSERT_SQL: &str = r#"
    INSERT INTO PlaybackProgress (
        content_id, content_type, part_index, episode_index,
        current_position_ms, total_duration_ms, last_played_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(content_id, part_index, episode_index) DO UPDATE SET
        content_type = excluded.content_type,
        current_position_ms = excluded.current_position_ms,
        total_duration_ms = excluded.total_duration_ms,
        last_played_at = excluded.last_played_at
"#;

const SELECT_COLUMNS: &str = "content_id, content_type, part_index, episode_index, \
     current_position_ms, total_duration_ms, last_played_at";

#[derive(Debug, Clone)]
pub struct ProgressStore {
    pool: SqlitePool,
    /// Bumped after every mutation; drives [`ProgressStore::stream_all`]
    revision: Arc<watch::Sender<u64>>,
}

impl ProgressStore {
    pub fn new(pool: SqlitePool) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            pool,
            revision: Arc::new(revision),
        }
    }

    /// Upsert the progress of one unit
    ///
    /// The row key comes from `reference`; the identity embedded in `progress`
    /// is ignored so callers can pass an explicitly captured ref.
    pub async fn save(&self, progress: &PlaybackProgress, reference: &ContentRef) -> Result<()> {
        match reference.content_type {
            ContentType::Series => self.save_series(progress, reference).await,
            ContentType::Movie | ContentType::Documentary | ContentType::ShortFilm => {
                self.upsert(progress, reference).await
            }
        }
    }

    /// Series entry point
    ///
    /// Each episode owns its own row, so upserting on the composite key
    /// already leaves other seasons untouched.
    pub async fn save_series(&self, progress: &PlaybackProgress, reference: &ContentRef) -> Result<()> {
        self.upsert(progress, reference).await
    }

    async fn upsert(&self, progress: &PlaybackProgress, reference: &ContentRef) -> Result<()> {
        sqlx::query(UPSERT_SQL)
            .bind(&reference.content_id)
            .bind(reference.content_type.as_str())
            .bind(reference.part_index)
            .bind(reference.episode_index)
            .bind(progress.current_position_ms.max(0))
            .bind(progress.total_duration_ms)
            .bind(progress.last_played_timestamp)
            .execute(&self.pool)
            .await?;

        debug!(
            content_id = %reference.content_id,
            part = reference.part_index,
            episode = reference.episode_index,
            position_ms = progress.current_position_ms,
            "Saved playback progress"
        );
        self.bump();
        Ok(())
    }

    pub async fn get(&self, reference: &ContentRef) -> Result<Option<PlaybackProgress>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM PlaybackProgress WHERE content_id = ? AND part_index = ? AND episode_index = ?",
            SELECT_COLUMNS
        ))
        .bind(&reference.content_id)
        .bind(reference.part_index)
        .bind(reference.episode_index)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(PlaybackProgress::from_row).transpose()
    }

    /// All units of a content item, most recently played first
    pub async fn get_all_for_content(&self, content_id: &str) -> Result<Vec<PlaybackProgress>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM PlaybackProgress WHERE content_id = ? ORDER BY last_played_at DESC",
            SELECT_COLUMNS
        ))
        .bind(content_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(PlaybackProgress::from_row).collect()
    }

    /// Unit with the maximum last-played timestamp
    pub async fn latest_for_content(&self, content_id: &str) -> Result<Option<PlaybackProgress>> {
        Ok(self.get_all_for_content(content_id).await?.into_iter().next())
    }

    pub async fn delete_one(&self, reference: &ContentRef) -> Result<()> {
        let result = sqlx::query(
            "DELETE FROM PlaybackProgress WHERE content_id = ? AND part_index = ? AND episode_index = ?",
        )
        .bind(&reference.content_id)
        .bind(reference.part_index)
        .bind(reference.episode_index)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            self.bump();
        }
        Ok(())
    }

    pub async fn delete_all_for_content(&self, content_id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM PlaybackProgress WHERE content_id = ?")
            .bind(content_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            self.bump();
        }
        Ok(())
    }

    pub async fn delete_all(&self) -> Result<()> {
        sqlx::query("DELETE FROM PlaybackProgress")
            .execute(&self.pool)
            .await?;
        self.bump();
        Ok(())
    }

    /// Full history, most recent first
    pub async fn list_all(&self) -> Result<Vec<PlaybackProgress>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM PlaybackProgress ORDER BY last_played_at DESC, content_id ASC",
            SELECT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(PlaybackProgress::from_row).collect()
    }

    /// Live history feed
    ///
    /// Yields the current list right away and again after every mutation.
    /// Intermediate states may be skipped when writes come faster than the
    /// consumer reads.
    pub fn stream_all(&self) -> BoxStream<'static, Result<Vec<PlaybackProgress>>> {
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

    fn bump(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}
