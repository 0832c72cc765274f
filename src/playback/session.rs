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


//! Media session engine
//!
//! Owns the single player instance and everything that hangs off it: the
//! playlist, the current unit identity, periodic progress saves, the
//! equalizer and auto-advance. UI surfaces never see the player; they get
//! state from the [`SyncBus`] and send commands back through it or through
//! the session handle.
//!
//! State machine:
//! ```text
//! Idle ─► Buffering ─► Ready ⇄ Playing / Paused ─► Ended
//!   ▲                                                │
//!   └──────────── stop (playlist cleared) ◄──────────┘
//! any ─► Released (destroy, terminal)
//! ```

use crate::config::PlaybackConfig;
use crate::content::{CatalogItem, ContentRef};
use crate::error::{AudiocineError, Result};
use crate::net::Credentials;
use crate::playback::equalizer::{EqualizerController, EqualizerFactory};
use crate::playback::player::{Player, PlayerEvent, PlayerState, TransitionReason};
use crate::playback::playlist::{build_authorized_playlist, resolve_start_index};
use crate::playback::resume::{AutoAdvanceDecision, ResumeController, ResumePoint};
use crate::playback::ticker::{ProgressTicker, Tick};
use crate::storage::{PlaybackProgress, Preferences, ProgressStore};
use crate::sync::{SyncAction, SyncBus, SyncMessage, SyncPayload};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Buffering,
    Ready,
    Playing,
    Paused,
    Ended,
    Released,
}

impl SessionState {
    /// A playlist is loaded and not finished
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionState::Buffering | SessionState::Ready | SessionState::Playing | SessionState::Paused
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipDirection {
    Previous,
    Next,
}

/// Identity and position of a unit, captured by the caller before a skip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSnapshot {
    pub content: ContentRef,
    pub position_ms: i64,
    pub duration_ms: i64,
}

/// Read-only view of the session for handles and surfaces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub content: Option<ContentRef>,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub is_playing: bool,
    pub position_ms: i64,
    pub duration_ms: i64,
    pub current_index: Option<usize>,
    pub item_count: usize,
    pub last_error: Option<String>,
}

pub struct MediaSessionEngine {
    player: Box<dyn Player>,
    progress: ProgressStore,
    preferences: Arc<dyn Preferences>,
    bus: SyncBus,
    equalizer: EqualizerController,
    config: PlaybackConfig,
    credentials: Option<Credentials>,
    ticker: ProgressTicker,
    tick_sink: mpsc::Sender<Tick>,
    resume: ResumeController,
    state: SessionState,
    current_item: Option<CatalogItem>,
    current_ref: Option<ContentRef>,
    autoplay_enabled: bool,
    last_error: Option<String>,
    /// Latest position read from the player for the current unit; cleared
    /// once the engine has saved a snapshot itself
    last_seen: Option<UnitSnapshot>,
}

impl MediaSessionEngine {
    pub fn new(
        player: Box<dyn Player>,
        progress: ProgressStore,
        preferences: Arc<dyn Preferences>,
        bus: SyncBus,
        config: PlaybackConfig,
        tick_sink: mpsc::Sender<Tick>,
    ) -> Self {
        Self {
            player,
            progress,
            preferences,
            bus,
            equalizer: EqualizerController::default(),
            resume: ResumeController::from_config(&config),
            config,
            credentials: None,
            ticker: ProgressTicker::new(),
            tick_sink,
            state: SessionState::Idle,
            current_item: None,
            current_ref: None,
            autoplay_enabled: true,
            last_error: None,
            last_seen: None,
        }
    }

    pub fn with_equalizer_factory(mut self, factory: Arc<dyn EqualizerFactory>) -> Self {
        self.equalizer = EqualizerController::new(Some(factory));
        self
    }

    /// Basic auth for streamed media
    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn current_ref(&self) -> Option<&ContentRef> {
        self.current_ref.as_ref()
    }

    pub fn bus(&self) -> &SyncBus {
        &self.bus
    }

    // -----------------------------------------------------------------------
    // Starting playback
    // -----------------------------------------------------------------------

    /// Load `item` and start at the requested unit
    ///
    /// The start position is the saved progress of that exact unit, or 0.
    pub async fn start_playback(&mut self, item: CatalogItem, part_index: i32, episode_index: i32) -> Result<()> {
        self.ensure_alive()?;

        // Whatever was playing keeps its position
        self.flush_progress().await;

        let items = build_authorized_playlist(&item, self.credentials.as_ref());
        if items.is_empty() {
            let err = AudiocineError::EmptyPlaylist(item.id().to_string());
            self.surface_error(&err.user_message());
            return Err(err);
        }

        let start_index = resolve_start_index(&items, item.content_type(), part_index, episode_index);
        let reference = items[start_index].content_ref()?;
        let start_position = self.saved_position(&reference).await;

        self.player.set_media_items(items, start_index)?;
        self.player.prepare()?;
        self.player.play();

        info!(
            content_id = %reference.content_id,
            part = reference.part_index,
            episode = reference.episode_index,
            start_position,
            "Starting playback"
        );

        self.current_item = Some(item);
        self.current_ref = Some(reference);
        self.resume.reset();
        self.last_seen = None;
        self.autoplay_enabled = self.read_autoplay().await;
        self.last_error = None;
        self.state = SessionState::Buffering;

        if let Err(e) = self
            .equalizer
            .attach(self.player.audio_session_id(), self.preferences.as_ref())
            .await
        {
            warn!(error = %e, "Could not attach equalizer");
        }

        self.ticker.start(
            self.config.save_interval(),
            self.config.poll_interval(),
            self.tick_sink.clone(),
        );

        if start_position > 0 {
            let delay = self.config.initial_seek_delay();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.player.seek_to(start_position);
        }

        self.broadcast_state();
        Ok(())
    }

    /// Open `item` at its most recently played unfinished unit
    pub async fn resume_playback(&mut self, item: CatalogItem) -> Result<ResumePoint> {
        let history = self.progress.get_all_for_content(item.id()).await?;
        let point = ResumeController::resume_point(item.content_type(), &history);
        self.start_playback(item, point.part_index, point.episode_index).await?;
        Ok(point)
    }

    // -----------------------------------------------------------------------
    // Player callbacks
    // -----------------------------------------------------------------------

    pub async fn handle_player_event(&mut self, event: PlayerEvent) -> Result<()> {
        if self.state == SessionState::Released {
            return Ok(());
        }
        match event {
            PlayerEvent::StateChanged { state } => self.on_player_state(state).await,
            PlayerEvent::IsPlayingChanged { is_playing } => {
                if self.state.is_active() {
                    self.state = if is_playing { SessionState::Playing } else { SessionState::Paused };
                    self.publish_play_pause();
                }
                Ok(())
            }
            PlayerEvent::MediaItemTransition { index, reason } => self.on_media_item_transition(index, reason).await,
            PlayerEvent::Error { message } => {
                self.on_player_error(&message).await;
                Ok(())
            }
        }
    }

    async fn on_player_state(&mut self, state: PlayerState) -> Result<()> {
        match state {
            PlayerState::Idle => {}
            PlayerState::Buffering => {
                if self.state.is_active() {
                    self.state = SessionState::Buffering;
                }
            }
            PlayerState::Ready => {
                if self.current_ref.is_some() {
                    self.state = if self.player.is_playing() {
                        SessionState::Playing
                    } else {
                        SessionState::Ready
                    };
                }
            }
            PlayerState::Ended => self.on_playback_ended().await?,
        }
        Ok(())
    }

    /// The player moved to another playlist item
    ///
    /// When the previous unit played through to its end its progress is
    /// cleared. A seek the engine did not issue (a notification button, say)
    /// saves the last position read for the previous unit. The new unit
    /// seeks to its own saved position.
    pub async fn on_media_item_transition(&mut self, index: usize, reason: TransitionReason) -> Result<()> {
        let Some(item) = self.player.media_item_at(index) else {
            warn!(index, "Transition to an unknown playlist index");
            return Ok(());
        };
        let reference = item.content_ref()?;

        let previous = self.current_ref.replace(reference.clone());
        let last_seen = self.last_seen.take();
        self.resume.reset();

        if let Some(previous) = previous.filter(|p| !p.same_unit(&reference)) {
            if reason == TransitionReason::Auto {
                if let Err(e) = self.progress.delete_one(&previous).await {
                    warn!(content = %previous, error = %e, "Could not clear finished unit progress");
                }
            } else if let Some(seen) = last_seen.filter(|seen| seen.content.same_unit(&previous)) {
                if let Err(e) = self.save_snapshot(&seen).await {
                    warn!(content = %previous, error = %e, "Could not save outgoing unit progress");
                }
            }
        }

        let saved = self.saved_position(&reference).await;
        if saved > 0 {
            self.player.seek_to(saved);
        }

        debug!(
            content_id = %reference.content_id,
            part = reference.part_index,
            episode = reference.episode_index,
            ?reason,
            saved,
            "Media item transition"
        );
        self.publish_metadata();
        Ok(())
    }

    /// Natural end of the last unit
    pub async fn on_playback_ended(&mut self) -> Result<()> {
        self.ticker.stop();
        self.state = SessionState::Ended;

        if let Some(reference) = self.current_ref.clone() {
            self.progress.delete_one(&reference).await?;
            info!(content = %reference, "Playback finished, progress cleared");
        }
        self.publish_play_pause();
        Ok(())
    }

    async fn on_player_error(&mut self, message: &str) {
        error!(reason = %message, content = ?self.current_ref, "Playback error");
        self.flush_progress().await;
        self.player.pause();
        if self.state.is_active() {
            self.state = SessionState::Paused;
        }
        let message = AudiocineError::playback_error(message, self.current_ref.as_ref().map(|c| c.to_string()))
            .user_message();
        self.surface_error(&message);
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    /// Persist the current position; skipped while the duration is unknown
    pub async fn on_periodic_tick(&mut self) -> Result<()> {
        if !self.state.is_active() {
            return Ok(());
        }
        let Some(reference) = self.current_ref.clone() else {
            return Ok(());
        };
        if !self.player_on_unit(&reference) {
            return Ok(());
        }
        let duration_ms = self.player.duration_ms();
        if duration_ms <= 0 {
            return Ok(());
        }
        let position_ms = self.player.position_ms();
        self.save_progress(&reference, position_ms, duration_ms).await?;
        self.last_seen = Some(UnitSnapshot {
            content: reference,
            position_ms,
            duration_ms,
        });
        Ok(())
    }

    /// Drive the auto-advance window
    pub async fn on_position_poll(&mut self) -> Result<()> {
        if self.state != SessionState::Playing {
            return Ok(());
        }
        let (Some(item), Some(reference)) = (self.current_item.as_ref(), self.current_ref.clone()) else {
            return Ok(());
        };
        if !self.player_on_unit(&reference) {
            return Ok(());
        }

        let eligible = ResumeController::supports_auto_advance(item);
        let position_ms = self.player.position_ms();
        let duration_ms = self.player.duration_ms();
        self.last_seen = Some(UnitSnapshot {
            content: reference.clone(),
            position_ms,
            duration_ms,
        });
        let decision = self.resume.evaluate(
            position_ms,
            duration_ms,
            self.autoplay_enabled,
            eligible,
            self.player.has_next(),
        );

        match decision {
            AutoAdvanceDecision::None => Ok(()),
            AutoAdvanceDecision::ShowNotice { remaining_ms } => {
                let payload = SyncPayload::for_content(&reference)
                    .with_position(position_ms, duration_ms)
                    .with_message(format!("Next starts in {} s", (remaining_ms + 999) / 1000));
                self.bus.send(SyncAction::AutoAdvanceSoon, payload);
                Ok(())
            }
            AutoAdvanceDecision::Advance => self.advance_to_next().await,
        }
    }

    pub async fn handle_tick(&mut self, tick: Tick) -> Result<()> {
        match tick {
            Tick::SaveProgress => self.on_periodic_tick().await,
            Tick::PollPosition => self.on_position_poll().await,
        }
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Save the current unit, then move to the next playlist item
    pub async fn advance_to_next(&mut self) -> Result<()> {
        let Some(index) = self.player.current_index() else {
            return Ok(());
        };
        if !self.player.has_next() {
            return Ok(());
        }
        if let Some(snapshot) = self.capture_snapshot() {
            self.save_snapshot(&snapshot).await?;
        }
        self.last_seen = None;
        info!(from = index, to = index + 1, "Auto-advancing");
        self.player.seek_to_item(index + 1, 0)
    }

    /// Manual previous/next
    ///
    /// `snapshot` is the identity and position the caller saw before asking;
    /// it is saved as-is so a concurrent transition cannot attribute the
    /// position to the wrong unit. Returns false when there is nothing in
    /// that direction.
    pub async fn skip_to_adjacent(&mut self, direction: SkipDirection, snapshot: Option<UnitSnapshot>) -> Result<bool> {
        let multiple_units = self
            .current_item
            .as_ref()
            .map(ResumeController::has_multiple_units)
            .unwrap_or(false);
        if !multiple_units {
            return Ok(false);
        }

        let Some(index) = self.player.current_index() else {
            return Ok(false);
        };
        let target = match direction {
            SkipDirection::Previous => index.checked_sub(1),
            SkipDirection::Next => Some(index + 1).filter(|next| *next < self.player.media_item_count()),
        };
        let Some(target) = target else {
            return Ok(false);
        };

        if let Some(snapshot) = snapshot.or_else(|| self.capture_snapshot()) {
            self.save_snapshot(&snapshot).await?;
        }
        self.last_seen = None;

        debug!(?direction, from = index, to = target, "Skipping to adjacent unit");
        self.player.seek_to_item(target, 0)?;
        Ok(true)
    }

    pub async fn toggle_play_pause(&mut self) -> Result<()> {
        self.ensure_alive()?;
        if self.current_ref.is_none() {
            return Ok(());
        }

        if self.player.is_playing() {
            self.player.pause();
            self.state = SessionState::Paused;
            self.flush_progress().await;
        } else {
            if self.state == SessionState::Ended {
                if let Some(index) = self.player.current_index() {
                    self.player.seek_to_item(index, 0)?;
                }
                self.ticker.start(
                    self.config.save_interval(),
                    self.config.poll_interval(),
                    self.tick_sink.clone(),
                );
            }
            self.player.play();
            self.state = SessionState::Playing;
        }
        self.publish_play_pause();
        Ok(())
    }

    /// Flush, stop, clear the playlist and hide the mini-player
    pub async fn stop(&mut self) {
        if self.state == SessionState::Released {
            return;
        }
        self.flush_progress().await;
        self.ticker.stop();
        self.player.stop();
        self.player.clear_media_items();

        if let Some(reference) = self.current_ref.take() {
            info!(content = %reference, "Playback stopped");
        }
        self.current_item = None;
        self.resume.reset();
        self.last_seen = None;
        self.state = SessionState::Idle;
        self.bus.publish(SyncMessage::bare(SyncAction::HideMiniPlayer));
    }

    /// The app was swiped away from recent tasks
    pub async fn on_task_removed(&mut self) {
        info!("Task removed, stopping playback");
        self.stop().await;
    }

    /// Flush and release everything; the engine is unusable afterwards
    pub async fn on_destroy(&mut self) {
        if self.state == SessionState::Released {
            return;
        }
        self.flush_progress().await;
        self.ticker.stop();
        self.equalizer.release();
        self.player.release();
        self.current_item = None;
        self.current_ref = None;
        self.state = SessionState::Released;
        self.bus.publish(SyncMessage::bare(SyncAction::HideMiniPlayer));
        info!("Media session released");
    }

    // -----------------------------------------------------------------------
    // Sync bus
    // -----------------------------------------------------------------------

    /// Interpret a command sent by a UI surface
    pub async fn handle_sync_message(&mut self, message: SyncMessage) -> Result<()> {
        if self.state == SessionState::Released {
            return Ok(());
        }
        let payload = message.payload;
        match message.action {
            SyncAction::RequestPlaybackState | SyncAction::RequestMiniPlayerState => {
                self.broadcast_state();
                Ok(())
            }
            SyncAction::SaveProgressNow => match payload_snapshot(&payload) {
                Some(snapshot) => self.save_snapshot(&snapshot).await,
                None => self.on_periodic_tick().await,
            },
            SyncAction::SeekToPrevious => self
                .skip_to_adjacent(SkipDirection::Previous, payload_snapshot(&payload))
                .await
                .map(|_| ()),
            SyncAction::SeekToNext => self
                .skip_to_adjacent(SkipDirection::Next, payload_snapshot(&payload))
                .await
                .map(|_| ()),
            SyncAction::PlayPauseToggle => self.toggle_play_pause().await,
            SyncAction::Stop => {
                self.stop().await;
                Ok(())
            }
            other => {
                debug!(action = other.as_str(), "Ignoring non-command sync message");
                Ok(())
            }
        }
    }

    /// Publish everything a freshly attached surface needs
    pub fn broadcast_state(&self) {
        if !self.state.is_active() && self.state != SessionState::Ended {
            self.bus.publish(SyncMessage::bare(SyncAction::HideMiniPlayer));
            return;
        }
        let Some(payload) = self.state_payload() else {
            self.bus.publish(SyncMessage::bare(SyncAction::HideMiniPlayer));
            return;
        };
        self.bus.send(SyncAction::ShowMiniPlayer, payload.clone());
        self.bus.send(SyncAction::UpdateMiniPlayerMetadata, payload.clone());
        self.bus.send(SyncAction::UpdatePlayPauseButton, payload);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let current = self.player.current_item();
        SessionSnapshot {
            state: self.state,
            content: self.current_ref.clone(),
            title: current.as_ref().map(|item| item.title.clone()),
            subtitle: current.and_then(|item| item.subtitle),
            is_playing: self.player.is_playing(),
            position_ms: self.player.position_ms(),
            duration_ms: self.player.duration_ms(),
            current_index: self.player.current_index(),
            item_count: self.player.media_item_count(),
            last_error: self.last_error.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// False between a seek to another item and its transition event
    fn player_on_unit(&self, reference: &ContentRef) -> bool {
        self.player
            .current_item()
            .and_then(|item| item.content_ref().ok())
            .map_or(false, |playing| playing.same_unit(reference))
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.state == SessionState::Released {
            return Err(AudiocineError::SessionReleased);
        }
        Ok(())
    }

    /// Saved position for the unit, or 0 when missing or finished
    async fn saved_position(&self, reference: &ContentRef) -> i64 {
        match self.progress.get(reference).await {
            Ok(Some(progress)) if !progress.is_finished() => progress.current_position_ms,
            Ok(_) => 0,
            Err(e) => {
                warn!(content = %reference, error = %e, "Could not read saved progress");
                0
            }
        }
    }

    async fn read_autoplay(&self) -> bool {
        self.preferences.autoplay_enabled().await.unwrap_or_else(|e| {
            warn!(error = %e, "Could not read autoplay preference");
            true
        })
    }

    fn capture_snapshot(&self) -> Option<UnitSnapshot> {
        Some(UnitSnapshot {
            content: self.current_ref.clone()?,
            position_ms: self.player.position_ms(),
            duration_ms: self.player.duration_ms(),
        })
    }

    async fn save_snapshot(&self, snapshot: &UnitSnapshot) -> Result<()> {
        if snapshot.duration_ms <= 0 {
            return Ok(());
        }
        self.save_progress(&snapshot.content, snapshot.position_ms, snapshot.duration_ms)
            .await
    }

    async fn save_progress(&self, reference: &ContentRef, position_ms: i64, duration_ms: i64) -> Result<()> {
        let progress = PlaybackProgress::new(reference.clone(), position_ms, duration_ms);
        self.progress.save(&progress, reference).await?;
        debug!(
            content_id = %reference.content_id,
            part = reference.part_index,
            episode = reference.episode_index,
            position_ms,
            "Progress saved"
        );
        Ok(())
    }

    /// Best-effort save used on stop, pause and teardown
    async fn flush_progress(&mut self) {
        if let Err(e) = self.on_periodic_tick().await {
            warn!(error = %e, "Could not flush playback progress");
        }
    }

    fn surface_error(&mut self, message: &str) {
        self.last_error = Some(message.to_string());
        let payload = match &self.current_ref {
            Some(reference) => SyncPayload::for_content(reference),
            None => SyncPayload::default(),
        };
        self.bus.send(SyncAction::PlaybackError, payload.with_message(message));
    }

    fn state_payload(&self) -> Option<SyncPayload> {
        let reference = self.current_ref.as_ref()?;
        let current = self.player.current_item();
        let title = current
            .as_ref()
            .map(|item| item.title.clone())
            .or_else(|| self.current_item.as_ref().map(|item| item.title().to_string()))
            .unwrap_or_default();
        let subtitle = current.and_then(|item| item.subtitle);

        Some(
            SyncPayload::for_content(reference)
                .with_titles(title, subtitle)
                .with_playing(self.player.is_playing())
                .with_position(self.player.position_ms(), self.player.duration_ms()),
        )
    }

    fn publish_play_pause(&self) {
        let payload = match &self.current_ref {
            Some(reference) => SyncPayload::for_content(reference),
            None => SyncPayload::default(),
        };
        self.bus.send(
            SyncAction::UpdatePlayPauseButton,
            payload.with_playing(self.player.is_playing()),
        );
    }

    fn publish_metadata(&self) {
        if let Some(payload) = self.state_payload() {
            self.bus.send(SyncAction::UpdateMiniPlayerMetadata, payload);
        }
    }
}

fn payload_snapshot(payload: &SyncPayload) -> Option<UnitSnapshot> {
    Some(UnitSnapshot {
        content: payload.content_ref()?,
        position_ms: payload.position_ms?,
        duration_ms: payload.duration_ms?,
    })
}

