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


//! Where playback resumes, and when it moves on by itself

use crate::config::PlaybackConfig;
use crate::content::{CatalogItem, ContentType, NO_INDEX};
use crate::storage::PlaybackProgress;
use tracing::debug;

/// Unit and position to open a content item at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumePoint {
    pub part_index: i32,
    pub episode_index: i32,
    pub position_ms: i64,
    /// False when starting over from the first unit
    pub is_resume: bool,
}

impl ResumePoint {
    pub fn start_over(content_type: ContentType) -> Self {
        let (part_index, episode_index) = match content_type {
            ContentType::Movie => (0, NO_INDEX),
            ContentType::Series => (0, 0),
            ContentType::Documentary | ContentType::ShortFilm => (NO_INDEX, NO_INDEX),
        };
        Self {
            part_index,
            episode_index,
            position_ms: 0,
            is_resume: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoAdvanceDecision {
    None,
    /// Show the one-time "advancing soon" notice
    ShowNotice { remaining_ms: i64 },
    Advance,
}

/// Resume lookup plus the per-unit auto-advance state
#[derive(Debug, Clone)]
pub struct ResumeController {
    notice_threshold_ms: i64,
    trigger_threshold_ms: i64,
    notice_shown: bool,
    triggered: bool,
}

impl ResumeController {
    pub fn new(notice_threshold_ms: i64, trigger_threshold_ms: i64) -> Self {
        Self {
            notice_threshold_ms,
            trigger_threshold_ms,
            notice_shown: false,
            triggered: false,
        }
    }

    pub fn from_config(config: &PlaybackConfig) -> Self {
        Self::new(config.auto_advance_notice_ms, config.auto_advance_trigger_ms)
    }

    /// Most recently played unit of a content item, unless it was finished
    pub fn resume_point(content_type: ContentType, progress: &[PlaybackProgress]) -> ResumePoint {
        match progress.iter().max_by_key(|p| p.last_played_timestamp) {
            Some(latest) if !latest.is_finished() => ResumePoint {
                part_index: latest.content.part_index,
                episode_index: latest.content.episode_index,
                position_ms: latest.current_position_ms,
                is_resume: true,
            },
            _ => ResumePoint::start_over(content_type),
        }
    }

    /// Multi-part movies and every series
    pub fn supports_auto_advance(item: &CatalogItem) -> bool {
        match item {
            CatalogItem::Movie(movie) => movie.parts.len() > 1,
            CatalogItem::Series(_) => true,
            CatalogItem::Documentary(_) | CatalogItem::ShortFilm(_) => false,
        }
    }

    pub fn has_multiple_units(item: &CatalogItem) -> bool {
        item.unit_count() > 1
    }

    pub fn has_triggered(&self) -> bool {
        self.triggered
    }

    /// Forget the notice and trigger flags; called for every new unit
    pub fn reset(&mut self) {
        self.notice_shown = false;
        self.triggered = false;
    }

    /// Check the remaining time of the current unit
    ///
    /// The notice is returned once when `0 < remaining <= notice threshold`;
    /// after it was shown, `Advance` is returned once when
    /// `0 < remaining <= trigger threshold`. Nothing fires again until
    /// [`ResumeController::reset`].
    pub fn evaluate(
        &mut self,
        position_ms: i64,
        duration_ms: i64,
        autoplay_enabled: bool,
        eligible: bool,
        has_next: bool,
    ) -> AutoAdvanceDecision {
        if !autoplay_enabled || !eligible || !has_next || self.triggered || duration_ms <= 0 {
            return AutoAdvanceDecision::None;
        }

        let remaining_ms = duration_ms - position_ms;
        if remaining_ms <= 0 {
            return AutoAdvanceDecision::None;
        }

        if !self.notice_shown {
            if remaining_ms <= self.notice_threshold_ms {
                self.notice_shown = true;
                debug!(remaining_ms, "Auto-advance notice");
                return AutoAdvanceDecision::ShowNotice { remaining_ms };
            }
            return AutoAdvanceDecision::None;
        }

        if remaining_ms <= self.trigger_threshold_ms {
            self.triggered = true;
            return AutoAdvanceDecision::Advance;
        }

        AutoAdvanceDecision::None
    }
}
