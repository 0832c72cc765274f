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


//! Offline downloads
//!
//! - [`queue::DownloadQueue`] accepts requests and keeps at most
//!   `max_concurrent_downloads` transfers running
//! - [`worker::DownloadWorker`] performs one transfer and records the result
//! - [`layout::StorageLayout`] decides where files land on disk
//! - [`groups`] shapes the task list for the downloads screen

pub mod groups;
pub mod layout;
pub mod probe;
pub mod queue;
pub mod worker;

pub use groups::{group_tasks, DownloadGroup};
pub use layout::{sanitize_component, StorageLayout};
pub use probe::{DurationProbe, FfprobeDurationProbe};
pub use queue::DownloadQueue;
pub use worker::{DownloadWorker, TransferOutcome};
