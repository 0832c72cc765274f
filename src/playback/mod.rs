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


//! Playback: player seam, playlist, resume logic and the media session

pub mod equalizer;
pub mod player;
pub mod playlist;
pub mod resume;
pub mod service;
pub mod session;
pub mod ticker;

pub use equalizer::{Equalizer, EqualizerController, EqualizerFactory};
pub use player::{Player, PlayerEvent, PlayerState, TransitionReason};
pub use playlist::{build_authorized_playlist, build_playlist, resolve_start_index, MediaPlaylistItem};
pub use resume::{AutoAdvanceDecision, ResumeController, ResumePoint};
pub use service::{SessionCommand, SessionHandle, SessionService};
pub use session::{MediaSessionEngine, SessionSnapshot, SessionState, SkipDirection, UnitSnapshot};
pub use ticker::{tick_channel, ProgressTicker, Tick};
