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


//! Database storage and models
//!
//! All durable state lives in one SQLite file accessed through sqlx.
//!
//! # Database Schema
//! - PlaybackProgress: resumable position per playable unit
//! - DownloadTasks: offline download status per playable unit
//! - Preferences: autoplay and equalizer settings
//!
//! # Usage Example
//! ```no_run
//! use audiocine_core::content::ContentRef;
//! use audiocine_core::storage::{Database, PlaybackProgress, ProgressStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new("./audiocine.db").await?;
//! let progress = ProgressStore::new(db.pool().clone());
//!
//! let part = ContentRef::movie_part("movie-42", 1);
//! progress
//!     .save(&PlaybackProgress::new(part.clone(), 95_000, 2_700_000), &part)
//!     .await?;
//! let saved = progress.get(&part).await?;
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod downloads;
pub mod migrations;
pub mod models;
pub mod preferences;
pub mod progress;

pub use database::Database;
pub use downloads::DownloadStore;
pub use models::{DownloadRecord, DownloadRequest, DownloadStatus, PlaybackProgress};
pub use preferences::{MemoryPreferences, Preferences, SqlitePreferences};
pub use progress::ProgressStore;
