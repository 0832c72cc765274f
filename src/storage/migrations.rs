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


//! Database migrations
//!
//! sqlx's compile-time migrations need a database at build time, which the
//! Android cross-compile does not have, so migrations are plain SQL executed at
//! runtime and recorded in `_migrations`.

use crate::error::Result;
use sqlx::{Executor, SqlitePool};

/// Run all database migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    create_migrations_table(pool).await?;

    run_migration(pool, 1, "playback_schema", create_playback_schema(pool)).await?;
    run_migration(pool, 2, "preferences", create_preferences_table(pool)).await?;

    Ok(())
}

async fn create_migrations_table(pool: &SqlitePool) -> Result<()> {
    pool.execute(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .await?;

    Ok(())
}

/// Run a single migration if it hasn't been applied yet
async fn run_migration(
    pool: &SqlitePool,
    id: i32,
    name: &str,
    migration_fn: impl std::future::Future<Output = Result<()>>,
) -> Result<()> {
    let applied: Option<i32> = sqlx::query_scalar("SELECT id FROM _migrations WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    if applied.is_some() {
        return Ok(());
    }

    migration_fn.await?;

    sqlx::query("INSERT INTO _migrations (id, name) VALUES (?, ?)")
        .bind(id)
        .bind(name)
        .execute(pool)
        .await?;

    tracing::info!(id, name, "Applied database migration");
    Ok(())
}

/// Progress and download tables
///
/// Both are keyed by (content_id, part_index, episode_index); -1 stands for
/// "not applicable" so the key never contains NULL.
async fn create_playback_schema(pool: &SqlitePool) -> Result<()> {
    pool.execute(
        r#"
-- ============================================================================
-- PLAYBACK PROGRESS
-- ============================================================================

CREATE TABLE IF NOT EXISTS PlaybackProgress (
    content_id TEXT NOT NULL,
    content_type TEXT NOT NULL,
    part_index INTEGER NOT NULL DEFAULT -1,
    episode_index INTEGER NOT NULL DEFAULT -1,
    current_position_ms INTEGER NOT NULL DEFAULT 0 CHECK (current_position_ms >= 0),
    total_duration_ms INTEGER NOT NULL DEFAULT 0,
    last_played_at INTEGER NOT NULL,             -- unix epoch milliseconds
    PRIMARY KEY (content_id, part_index, episode_index)
);

CREATE INDEX IF NOT EXISTS IX_PlaybackProgress_last_played
    ON PlaybackProgress(last_played_at DESC);

-- ============================================================================
-- DOWNLOADS
-- ============================================================================

CREATE TABLE IF NOT EXISTS DownloadTasks (
    content_id TEXT NOT NULL,
    content_type TEXT NOT NULL,
    part_index INTEGER NOT NULL DEFAULT -1,
    episode_index INTEGER NOT NULL DEFAULT -1,
    title TEXT NOT NULL,
    series_title TEXT,
    source_url TEXT NOT NULL,
    status TEXT NOT NULL,                        -- queued, downloading, complete, failed
    file_path TEXT,
    downloaded_at TEXT,                          -- RFC 3339
    total_size_mb REAL NOT NULL DEFAULT 0,
    duration_ms INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (content_id, part_index, episode_index)
);

CREATE INDEX IF NOT EXISTS IX_DownloadTasks_status
    ON DownloadTasks(status, created_at);
        "#,
    )
    .await?;

    Ok(())
}

async fn create_preferences_table(pool: &SqlitePool) -> Result<()> {
    pool.execute(
        r#"
CREATE TABLE IF NOT EXISTS Preferences (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
        "#,
    )
    .await?;

    Ok(())
}
