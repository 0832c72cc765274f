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


//! Cross-surface sync bus
//!
//! The media session and the UI surfaces (full player, mini-player,
//! notification) talk only through this bus. Delivery is fire-and-forget:
//!
//! - a message reaches only the receivers subscribed when it was sent
//! - a receiver that falls more than the channel capacity behind loses the
//!   oldest messages (`RecvError::Lagged`)
//! - nobody listening is not an error
//!
//! A surface that attaches late sends `RequestPlaybackState` or
//! `RequestMiniPlayerState`; the session answers by re-broadcasting its
//! current state. Surfaces change playback only through command actions.

use crate::content::{ContentRef, ContentType};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncAction {
    // session -> surfaces
    ShowMiniPlayer,
    HideMiniPlayer,
    UpdatePlayPauseButton,
    UpdateMiniPlayerMetadata,
    PlaybackError,
    /// Next unit starts in a few seconds
    AutoAdvanceSoon,

    // surfaces -> session
    RequestPlaybackState,
    RequestMiniPlayerState,
    SaveProgressNow,
    SeekToPrevious,
    SeekToNext,
    PlayPauseToggle,
    Stop,
}

impl SyncAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncAction::ShowMiniPlayer => "SHOW_MINI_PLAYER",
            SyncAction::HideMiniPlayer => "HIDE_MINI_PLAYER",
            SyncAction::UpdatePlayPauseButton => "UPDATE_PLAY_PAUSE_BUTTON",
            SyncAction::UpdateMiniPlayerMetadata => "UPDATE_MINI_PLAYER_METADATA",
            SyncAction::PlaybackError => "PLAYBACK_ERROR",
            SyncAction::AutoAdvanceSoon => "AUTO_ADVANCE_SOON",
            SyncAction::RequestPlaybackState => "REQUEST_PLAYBACK_STATE",
            SyncAction::RequestMiniPlayerState => "REQUEST_MINI_PLAYER_STATE",
            SyncAction::SaveProgressNow => "SAVE_PROGRESS_NOW",
            SyncAction::SeekToPrevious => "SEEK_TO_PREVIOUS",
            SyncAction::SeekToNext => "SEEK_TO_NEXT",
            SyncAction::PlayPauseToggle => "PLAY_PAUSE_TOGGLE",
            SyncAction::Stop => "STOP",
        }
    }

    /// Sent by a surface for the session to interpret
    pub fn is_command(&self) -> bool {
        matches!(
            self,
            SyncAction::RequestPlaybackState
                | SyncAction::RequestMiniPlayerState
                | SyncAction::SaveProgressNow
                | SyncAction::SeekToPrevious
                | SyncAction::SeekToNext
                | SyncAction::PlayPauseToggle
                | SyncAction::Stop
        )
    }
}

/// Small payload carried by every message; unused fields stay `None`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_type: Option<ContentType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_index: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_index: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_playing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SyncPayload {
    pub fn for_content(content: &ContentRef) -> Self {
        Self {
            item_id: Some(content.content_id.clone()),
            item_type: Some(content.content_type),
            part_index: Some(content.part_index),
            episode_index: Some(content.episode_index),
            ..Self::default()
        }
    }

    pub fn with_titles(mut self, title: impl Into<String>, subtitle: Option<String>) -> Self {
        self.title = Some(title.into());
        self.subtitle = subtitle;
        self
    }

    pub fn with_playing(mut self, is_playing: bool) -> Self {
        self.is_playing = Some(is_playing);
        self
    }

    pub fn with_position(mut self, position_ms: i64, duration_ms: i64) -> Self {
        self.position_ms = Some(position_ms);
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Identity carried by the payload, if complete
    pub fn content_ref(&self) -> Option<ContentRef> {
        Some(ContentRef::new(
            self.item_id.clone()?,
            self.item_type?,
            self.part_index.unwrap_or(crate::content::NO_INDEX),
            self.episode_index.unwrap_or(crate::content::NO_INDEX),
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMessage {
    pub action: SyncAction,
    #[serde(default)]
    pub payload: SyncPayload,
}

impl SyncMessage {
    pub fn new(action: SyncAction, payload: SyncPayload) -> Self {
        Self { action, payload }
    }

    pub fn bare(action: SyncAction) -> Self {
        Self::new(action, SyncPayload::default())
    }
}

/// Broadcast channel shared by the session and all surfaces
#[derive(Debug, Clone)]
pub struct SyncBus {
    sender: broadcast::Sender<SyncMessage>,
}

impl Default for SyncBus {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl SyncBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns the number of receivers the message was handed to
    pub fn publish(&self, message: SyncMessage) -> usize {
        trace!(action = message.action.as_str(), "Sync bus publish");
        self.sender.send(message).unwrap_or(0)
    }

    pub fn send(&self, action: SyncAction, payload: SyncPayload) -> usize {
        self.publish(SyncMessage::new(action, payload))
    }

    /// Receives every message published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<SyncMessage> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
