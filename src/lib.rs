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


//! Audiocine core
//!
//! Playback progress, offline downloads and the background media session of
//! the Audiocine audio-description client.
//!
//! - [`storage`]: SQLite database, progress store, download records, preferences
//! - [`download`]: bounded-concurrency queue and transfer worker
//! - [`playback`]: playlist, resume/auto-advance, media session engine
//! - [`sync`]: broadcast bus between the session and the UI surfaces

uniffi::setup_scaffolding!();

// JNI bridge for Android
#[cfg(target_os = "android")]
mod jni_bridge;

pub mod config;
pub mod content;
pub mod download;
pub mod error;
pub mod logging;
pub mod net;
pub mod playback;
pub mod storage;
pub mod sync;

pub use config::CoreConfig;
pub use error::{AudiocineError, Result};

/// Version string reported to the host app
#[uniffi::export]
pub fn core_version() -> String {
    format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}
