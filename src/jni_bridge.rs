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


//! JNI bridge for Android
//!
//! Exposes the download queue and the progress store to the Kotlin side.
//! The media session itself is driven from Kotlin through the player seam
//! and is not part of this surface.
//!
//! # Architecture
//! Kotlin (ExpoRustBridgeModule) → JNI → Rust
//!
//! # Response Format
//! Every function takes one JSON string and returns one:
//! ```json
//! { "success": true, "data": { ... } }
//! ```
//! or on error:
//! ```json
//! { "success": false, "error": "Informative message" }
//! ```
//! Panics are caught and reported the same way.

use crate::config::CoreConfig;
use crate::content::{ContentRef, ContentType, NO_INDEX};
use crate::download::DownloadQueue;
use crate::error::{AudiocineError, Result};
use crate::storage::{Database, DownloadRequest, ProgressStore};
use jni::objects::{JClass, JString};
use jni::sys::jstring;
use jni::JNIEnv;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Services opened for one database file
struct CoreServices {
    queue: DownloadQueue,
    progress: ProgressStore,
}

lazy_static::lazy_static! {
    static ref RUNTIME: tokio::runtime::Runtime =
        tokio::runtime::Runtime::new().expect("Failed to create Tokio runtime");

    // db_path -> services
    static ref CORES: Mutex<HashMap<String, Arc<CoreServices>>> = Mutex::new(HashMap::new());
}

async fn get_core(db_path: &str) -> Result<Arc<CoreServices>> {
    CORES
        .lock()
        .await
        .get(db_path)
        .cloned()
        .ok_or_else(|| AudiocineError::InvalidState(format!("Core not initialised for {}", db_path)))
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn jstring_to_string(env: &mut JNIEnv, jstr: JString) -> Result<String> {
    env.get_string(&jstr)
        .map(|s| s.into())
        .map_err(|e| AudiocineError::JniError(format!("JNI string conversion failed: {}", e)))
}

fn success_response<T: Serialize>(data: T) -> String {
    serde_json::json!({
        "success": true,
        "data": data
    })
    .to_string()
}

fn error_response(error: &str) -> String {
    serde_json::json!({
        "success": false,
        "error": error
    })
    .to_string()
}

/// Error envelope for a core error; `retryable` tells the UI to offer a retry
fn core_error_response(error: &AudiocineError) -> String {
    serde_json::json!({
        "success": false,
        "error": error.user_message(),
        "retryable": error.is_retryable()
    })
    .to_string()
}

fn catch_panic<F>(f: F) -> String
where
    F: FnOnce() -> String,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(panic_err) => {
            let panic_msg = if let Some(s) = panic_err.downcast_ref::<String>() {
                s.clone()
            } else if let Some(s) = panic_err.downcast_ref::<&str>() {
                s.to_string()
            } else {
                "Unknown panic occurred".to_string()
            };
            error_response(&format!("Rust panic: {}", panic_msg))
        }
    }
}

fn to_jstring(env: &mut JNIEnv, response: String) -> jstring {
    env.new_string(response)
        .map(|s| s.into_raw())
        .unwrap_or(std::ptr::null_mut())
}

/// Parse the JSON params, run `handler` on the runtime, wrap the result
fn handle_json<P, T, F, Fut>(env: &mut JNIEnv, params_json: JString, handler: F) -> jstring
where
    P: DeserializeOwned,
    T: Serialize,
    F: FnOnce(P) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let params_str = match jstring_to_string(env, params_json) {
        Ok(s) => s,
        Err(e) => return to_jstring(env, error_response(&e.user_message())),
    };

    let response = catch_panic(move || {
        let params: P = match serde_json::from_str(&params_str) {
            Ok(params) => params,
            Err(e) => return error_response(&format!("Invalid JSON: {}", e)),
        };
        match RUNTIME.block_on(handler(params)) {
            Ok(data) => success_response(data),
            Err(e) => core_error_response(&e),
        }
    });

    to_jstring(env, response)
}

#[derive(Deserialize)]
struct DbParams {
    db_path: String,
}

#[derive(Deserialize)]
struct UnitParams {
    db_path: String,
    content_id: String,
    content_type: ContentType,
    #[serde(default = "no_index")]
    part_index: i32,
    #[serde(default = "no_index")]
    episode_index: i32,
}

impl UnitParams {
    fn content_ref(&self) -> ContentRef {
        ContentRef::new(&self.content_id, self.content_type, self.part_index, self.episode_index)
    }
}

fn no_index() -> i32 {
    NO_INDEX
}

// ============================================================================
// CORE LIFECYCLE
// ============================================================================

#[no_mangle]
pub extern "C" fn Java_expo_modules_rustbridge_ExpoRustBridgeModule_nativeCoreVersion(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    to_jstring(&mut env, success_response(crate::core_version()))
}

/// Open the database and the download queue
///
/// # Arguments (JSON string)
/// ```json
/// { "db_path": "/data/.../audiocine.db", "download_root": "/storage/.../Audiocine",
///   "config_toml": "[downloads]\nmax_concurrent_downloads = 3" }
/// ```
/// Only `db_path` is required. Pending downloads left by a previous process
/// are picked up unless `downloads.resume_pending_on_start` is false.
#[no_mangle]
pub extern "C" fn Java_expo_modules_rustbridge_ExpoRustBridgeModule_nativeInitCore(
    mut env: JNIEnv,
    _class: JClass,
    params_json: JString,
) -> jstring {
    #[derive(Deserialize)]
    struct Params {
        db_path: String,
        download_root: Option<String>,
        config_toml: Option<String>,
    }

    handle_json(&mut env, params_json, |params: Params| async move {
        let mut config = match params.config_toml.as_deref() {
            Some(toml) => CoreConfig::from_toml_str(toml)?,
            None => CoreConfig::default(),
        };
        config.storage.database_path = PathBuf::from(&params.db_path);
        if let Some(root) = params.download_root {
            config.storage.download_root = PathBuf::from(root);
        }
        config.validate()?;

        let mut cores = CORES.lock().await;
        if cores.contains_key(&params.db_path) {
            return Ok(serde_json::json!({ "version": crate::core_version(), "resumed": 0 }));
        }

        let db = Database::new(&config.storage.database_path).await?;
        let queue = DownloadQueue::from_config(&config, &db)?;
        let progress = ProgressStore::new(db.pool().clone());

        let resumed = if config.downloads.resume_pending_on_start {
            queue.resume_pending().await?
        } else {
            0
        };

        info!(db_path = %params.db_path, resumed, "Core initialised");
        cores.insert(params.db_path, Arc::new(CoreServices { queue, progress }));

        Ok(serde_json::json!({ "version": crate::core_version(), "resumed": resumed }))
    })
}

// ============================================================================
// DOWNLOADS
// ============================================================================

/// # Arguments (JSON string)
/// ```json
/// { "db_path": "...", "request": { "content_id": "s-1", "content_type": "series",
///   "part_index": 0, "episode_index": 2, "title": "Pilot",
///   "series_title": "The Show", "url": "https://..." } }
/// ```
#[no_mangle]
pub extern "C" fn Java_expo_modules_rustbridge_ExpoRustBridgeModule_nativeEnqueueDownload(
    mut env: JNIEnv,
    _class: JClass,
    params_json: JString,
) -> jstring {
    #[derive(Deserialize)]
    struct Params {
        db_path: String,
        request: DownloadRequest,
    }

    handle_json(&mut env, params_json, |params: Params| async move {
        let core = get_core(&params.db_path).await?;
        core.queue.enqueue(params.request).await
    })
}

/// Downloads grouped per content item, series with nested episodes
#[no_mangle]
pub extern "C" fn Java_expo_modules_rustbridge_ExpoRustBridgeModule_nativeListDownloadGroups(
    mut env: JNIEnv,
    _class: JClass,
    params_json: JString,
) -> jstring {
    handle_json(&mut env, params_json, |params: DbParams| async move {
        let core = get_core(&params.db_path).await?;
        let groups = core.queue.list_groups().await?;
        Ok(groups
            .into_iter()
            .map(|group| {
                serde_json::json!({
                    "status": group.status(),
                    "total_size_mb": group.total_size_mb(),
                    "completed": group.completed_count(),
                    "group": group,
                })
            })
            .collect::<Vec<_>>())
    })
}

#[no_mangle]
pub extern "C" fn Java_expo_modules_rustbridge_ExpoRustBridgeModule_nativeCancelDownload(
    mut env: JNIEnv,
    _class: JClass,
    params_json: JString,
) -> jstring {
    handle_json(&mut env, params_json, |params: UnitParams| async move {
        let core = get_core(&params.db_path).await?;
        let cancelled = core.queue.cancel(&params.content_ref()).await?;
        Ok(serde_json::json!({ "cancelled": cancelled }))
    })
}

/// Delete one task and its file; a file that is already gone is fine
#[no_mangle]
pub extern "C" fn Java_expo_modules_rustbridge_ExpoRustBridgeModule_nativeDeleteDownload(
    mut env: JNIEnv,
    _class: JClass,
    params_json: JString,
) -> jstring {
    handle_json(&mut env, params_json, |params: UnitParams| async move {
        let core = get_core(&params.db_path).await?;
        core.queue.delete(&params.content_ref()).await?;
        Ok(serde_json::json!({ "deleted": true }))
    })
}

#[no_mangle]
pub extern "C" fn Java_expo_modules_rustbridge_ExpoRustBridgeModule_nativeDeleteAllDownloads(
    mut env: JNIEnv,
    _class: JClass,
    params_json: JString,
) -> jstring {
    handle_json(&mut env, params_json, |params: DbParams| async move {
        let core = get_core(&params.db_path).await?;
        let deleted = core.queue.delete_all().await?;
        Ok(serde_json::json!({ "deleted": deleted }))
    })
}

// ============================================================================
// PLAYBACK PROGRESS
// ============================================================================

/// Saved position of one unit; `data` is null when there is none
#[no_mangle]
pub extern "C" fn Java_expo_modules_rustbridge_ExpoRustBridgeModule_nativeGetPlaybackProgress(
    mut env: JNIEnv,
    _class: JClass,
    params_json: JString,
) -> jstring {
    handle_json(&mut env, params_json, |params: UnitParams| async move {
        let core = get_core(&params.db_path).await?;
        core.progress.get(&params.content_ref()).await
    })
}

/// Continue-watching list, most recent first
#[no_mangle]
pub extern "C" fn Java_expo_modules_rustbridge_ExpoRustBridgeModule_nativeListPlaybackHistory(
    mut env: JNIEnv,
    _class: JClass,
    params_json: JString,
) -> jstring {
    handle_json(&mut env, params_json, |params: DbParams| async move {
        let core = get_core(&params.db_path).await?;
        core.progress.list_all().await
    })
}

#[no_mangle]
pub extern "C" fn Java_expo_modules_rustbridge_ExpoRustBridgeModule_nativeClearPlaybackProgress(
    mut env: JNIEnv,
    _class: JClass,
    params_json: JString,
) -> jstring {
    #[derive(Deserialize)]
    struct Params {
        db_path: String,
        content_id: String,
    }

    handle_json(&mut env, params_json, |params: Params| async move {
        let core = get_core(&params.db_path).await?;
        core.progress.delete_all_for_content(&params.content_id).await?;
        Ok(serde_json::json!({ "cleared": params.content_id }))
    })
}

#[no_mangle]
pub extern "C" fn Java_expo_modules_rustbridge_ExpoRustBridgeModule_nativeClearAllPlaybackProgress(
    mut env: JNIEnv,
    _class: JClass,
    params_json: JString,
) -> jstring {
    handle_json(&mut env, params_json, |params: DbParams| async move {
        let core = get_core(&params.db_path).await?;
        core.progress.delete_all().await?;
        Ok(serde_json::json!({ "cleared": true }))
    })
}
