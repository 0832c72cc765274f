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


//! Repeating timers for progress saves and position polling

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::trace;

pub const TICK_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    SaveProgress,
    PollPosition,
}

pub fn tick_channel() -> (mpsc::Sender<Tick>, mpsc::Receiver<Tick>) {
    mpsc::channel(TICK_CHANNEL_CAPACITY)
}

/// Cancellable background task emitting [`Tick`]s
///
/// Only one timer task runs at a time; `start` replaces a running one.
#[derive(Debug, Default)]
pub struct ProgressTicker {
    task: Option<(CancellationToken, JoinHandle<()>)>,
}

impl ProgressTicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map(|(_, handle)| !handle.is_finished()).unwrap_or(false)
    }

    pub fn start(&mut self, save_every: Duration, poll_every: Duration, sink: mpsc::Sender<Tick>) {
        self.stop();

        let token = CancellationToken::new();
        let child = token.clone();
        let handle = tokio::spawn(async move {
            let now = Instant::now();
            let mut save = interval_at(now + save_every, save_every);
            let mut poll = interval_at(now + poll_every, poll_every);
            save.set_missed_tick_behavior(MissedTickBehavior::Delay);
            poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                let tick = tokio::select! {
                    _ = child.cancelled() => break,
                    _ = save.tick() => Tick::SaveProgress,
                    _ = poll.tick() => Tick::PollPosition,
                };
                trace!(?tick, "Session tick");
                // Receiver gone: the session ended
                if sink.send(tick).await.is_err() {
                    break;
                }
            }
        });

        self.task = Some((token, handle));
    }

    pub fn stop(&mut self) {
        if let Some((token, _handle)) = self.task.take() {
            token.cancel();
        }
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        self.stop();
    }
}
