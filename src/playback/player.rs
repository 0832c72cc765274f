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


//! Platform player seam
//!
//! The Android side wraps its media player in this trait. The session
//! engine is the only owner of the instance, which keeps every call on the
//! session task.

use crate::error::Result;
use crate::playback::playlist::MediaPlaylistItem;
use serde::{Deserialize, Serialize};

/// Player readiness, as reported by the platform player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    Idle,
    Buffering,
    Ready,
    Ended,
}

/// Why the player moved to another playlist item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    /// Previous item played to its end
    Auto,
    /// Explicit seek to another item
    Seek,
    Repeat,
    PlaylistChanged,
}

/// Callbacks from the platform player, delivered to the session in order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlayerEvent {
    StateChanged { state: PlayerState },
    IsPlayingChanged { is_playing: bool },
    MediaItemTransition { index: usize, reason: TransitionReason },
    Error { message: String },
}

pub trait Player: Send + Sync {
    /// Replace the playlist and select `start_index`
    fn set_media_items(&mut self, items: Vec<MediaPlaylistItem>, start_index: usize) -> Result<()>;

    fn prepare(&mut self) -> Result<()>;

    fn play(&mut self);

    fn pause(&mut self);

    fn is_playing(&self) -> bool;

    /// Seek within the current item
    fn seek_to(&mut self, position_ms: i64);

    /// Jump to another playlist item
    fn seek_to_item(&mut self, index: usize, position_ms: i64) -> Result<()>;

    fn current_index(&self) -> Option<usize>;

    fn media_item_at(&self, index: usize) -> Option<MediaPlaylistItem>;

    fn media_item_count(&self) -> usize;

    fn position_ms(&self) -> i64;

    /// Zero or negative while unknown
    fn duration_ms(&self) -> i64;

    fn state(&self) -> PlayerState;

    /// Platform audio session id, once the audio sink exists
    fn audio_session_id(&self) -> Option<i32>;

    fn stop(&mut self);

    fn clear_media_items(&mut self);

    fn release(&mut self);

    fn current_item(&self) -> Option<MediaPlaylistItem> {
        self.current_index().and_then(|index| self.media_item_at(index))
    }

    fn has_next(&self) -> bool {
        self.current_index()
            .map(|index| index + 1 < self.media_item_count())
            .unwrap_or(false)
    }
}
