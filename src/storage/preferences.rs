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


//! User preferences read by the playback core
//!
//! The settings screen owns these values; the core only reads autoplay and
//! equalizer state. On Android the host may back this with its own store,
//! otherwise [`SqlitePreferences`] keeps them next to the progress tables.

use crate::error::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::HashMap;
use tokio::sync::RwLock;

pub mod keys {
    pub const AUTOPLAY_ENABLED: &str = "autoplay_enabled";
    pub const EQUALIZER_ENABLED: &str = "equalizer_enabled";

    /// Gain of one equalizer band, in millibels
    pub fn band_level(band: u16) -> String {
        format!("equalizer_band_{}", band)
    }
}

/// String key/value store with typed helpers
#[async_trait]
pub trait Preferences: Send + Sync {
    async fn get_value(&self, key: &str) -> Result<Option<String>>;

    async fn set_value(&self, key: &str, value: &str) -> Result<()>;

    async fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        Ok(match self.get_value(key).await? {
            Some(value) => matches!(value.as_str(), "true" | "1"),
            None => default,
        })
    }

    async fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.set_value(key, if value { "true" } else { "false" }).await
    }

    /// Unparseable values read as the default
    async fn get_i32(&self, key: &str, default: i32) -> Result<i32> {
        Ok(self
            .get_value(key)
            .await?
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(default))
    }

    async fn set_i32(&self, key: &str, value: i32) -> Result<()> {
        self.set_value(key, &value.to_string()).await
    }

    /// Autoplay defaults to on
    async fn autoplay_enabled(&self) -> Result<bool> {
        self.get_bool(keys::AUTOPLAY_ENABLED, true).await
    }
}

#[derive(Debug, Clone)]
pub struct SqlitePreferences {
    pool: SqlitePool,
}

impl SqlitePreferences {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Preferences for SqlitePreferences {
    async fn get_value(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM Preferences WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set_value(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO Preferences (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Non-persistent store for tests and hosts that push settings in
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Preferences for MemoryPreferences {
    async fn get_value(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set_value(&self, key: &str, value: &str) -> Result<()> {
        self.values.write().await.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    #[tokio::test]
    async fn test_sqlite_preferences() {
        let db = Database::new_in_memory().await.expect("Failed to create database");
        let prefs = SqlitePreferences::new(db.pool().clone());

        assert!(prefs.autoplay_enabled().await.expect("read"));
        prefs.set_bool(keys::AUTOPLAY_ENABLED, false).await.expect("write");
        assert!(!prefs.autoplay_enabled().await.expect("read"));

        prefs.set_i32(&keys::band_level(2), -300).await.expect("write");
        prefs.set_i32(&keys::band_level(2), 450).await.expect("overwrite");
        assert_eq!(prefs.get_i32(&keys::band_level(2), 0).await.expect("read"), 450);
        assert_eq!(prefs.get_i32(&keys::band_level(3), 7).await.expect("read"), 7);
    }

    #[tokio::test]
    async fn test_memory_preferences_bad_int_uses_default() {
        let prefs = MemoryPreferences::new();
        prefs.set_value("x", "not a number").await.expect("write");
        assert_eq!(prefs.get_i32("x", 5).await.expect("read"), 5);
        assert!(!prefs.get_bool(keys::EQUALIZER_ENABLED, false).await.expect("read"));
    }
}
