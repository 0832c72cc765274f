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


//! Persisted entities
//!
//! Rows are mapped by hand with `row.try_get`, the same way for every table,
//! so the JSON sent over the bridge never depends on SQLite column types.

use crate::content::{ContentRef, ContentType};
use crate::error::{AudiocineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row};

/// Saved position of one playable unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackProgress {
    #[serde(flatten)]
    pub content: ContentRef,
    pub current_position_ms: i64,
    pub total_duration_ms: i64,
    /// Unix epoch milliseconds
    pub last_played_timestamp: i64,
}

impl PlaybackProgress {
    /// Stamped with the current time; negative positions clamp to 0
    pub fn new(content: ContentRef, current_position_ms: i64, total_duration_ms: i64) -> Self {
        Self {
            content,
            current_position_ms: current_position_ms.max(0),
            total_duration_ms,
            last_played_timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn with_timestamp(mut self, last_played_timestamp: i64) -> Self {
        self.last_played_timestamp = last_played_timestamp;
        self
    }

    pub fn is_finished(&self) -> bool {
        self.current_position_ms >= self.total_duration_ms
    }

    pub fn remaining_ms(&self) -> i64 {
        (self.total_duration_ms - self.current_position_ms).max(0)
    }

    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            content: content_ref_from_row(row)?,
            current_position_ms: row.try_get("current_position_ms")?,
            total_duration_ms: row.try_get("total_duration_ms")?,
            last_played_timestamp: row.try_get("last_played_at")?,
        })
    }
}

/// Download task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DownloadStatus {
    Queued,
    Downloading,
    Complete,
    Failed,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Queued => "queued",
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::Complete => "complete",
            DownloadStatus::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(DownloadStatus::Queued),
            "downloading" => Ok(DownloadStatus::Downloading),
            "complete" => Ok(DownloadStatus::Complete),
            "failed" => Ok(DownloadStatus::Failed),
            _ => Err(AudiocineError::invalid_entity(
                "DownloadStatus",
                format!("unknown status '{}'", s),
            )),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadStatus::Complete | DownloadStatus::Failed)
    }
}

/// Durable download task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRecord {
    #[serde(flatten)]
    pub content: ContentRef,
    pub title: String,
    /// Series name, used for the grouping folder and the UI group header
    pub series_title: Option<String>,
    pub source_url: String,
    pub status: DownloadStatus,
    pub file_path: Option<String>,
    pub downloaded_at: Option<DateTime<Utc>>,
    pub total_size_mb: f64,
    pub duration_ms: i64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DownloadRecord {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        let status: String = row.try_get("status")?;

        Ok(Self {
            content: content_ref_from_row(row)?,
            title: row.try_get("title")?,
            series_title: row.try_get("series_title")?,
            source_url: row.try_get("source_url")?,
            status: DownloadStatus::from_str(&status)?,
            file_path: row.try_get("file_path")?,
            downloaded_at: parse_optional_timestamp(row.try_get("downloaded_at")?)?,
            total_size_mb: row.try_get("total_size_mb")?,
            duration_ms: row.try_get("duration_ms")?,
            error_message: row.try_get("error_message")?,
            created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
        })
    }
}

/// What the UI asks to download
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRequest {
    #[serde(flatten)]
    pub content: ContentRef,
    pub title: String,
    #[serde(default)]
    pub series_title: Option<String>,
    pub url: String,
}

impl DownloadRequest {
    pub fn new(content: ContentRef, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            content,
            title: title.into(),
            series_title: None,
            url: url.into(),
        }
    }

    pub fn with_series_title(mut self, series_title: impl Into<String>) -> Self {
        self.series_title = Some(series_title.into());
        self
    }

    /// Rebuild the request a stored row was created from
    pub fn from_record(record: &DownloadRecord) -> Self {
        Self {
            content: record.content.clone(),
            title: record.title.clone(),
            series_title: record.series_title.clone(),
            url: record.source_url.clone(),
        }
    }
}

fn content_ref_from_row(row: &SqliteRow) -> Result<ContentRef> {
    let type_code: String = row.try_get("content_type")?;
    let content_type = ContentType::from_str(&type_code).ok_or_else(|| {
        AudiocineError::invalid_entity("ContentRef", format!("unknown content type '{}'", type_code))
    })?;

    Ok(ContentRef::new(
        row.try_get::<String, _>("content_id")?,
        content_type,
        row.try_get("part_index")?,
        row.try_get("episode_index")?,
    ))
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AudiocineError::invalid_entity("timestamp", format!("'{}': {}", value, e)))
}

fn parse_optional_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_timestamp).transpose()
}
