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


//! Session actor
//!
//! The engine lives on one task. Commands from handles, player callbacks,
//! timer ticks and Sync Bus commands are all serialized through its loop,
//! so the player is only ever touched from that task.

use crate::content::CatalogItem;
use crate::error::{AudiocineError, Result};
use crate::playback::player::PlayerEvent;
use crate::playback::resume::ResumePoint;
use crate::playback::session::{MediaSessionEngine, SessionSnapshot, SkipDirection, UnitSnapshot};
use crate::playback::ticker::Tick;
use crate::sync::SyncBus;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const COMMAND_CHANNEL_CAPACITY: usize = 32;

pub enum SessionCommand {
    StartPlayback {
        item: CatalogItem,
        part_index: i32,
        episode_index: i32,
        reply: oneshot::Sender<Result<()>>,
    },
    ResumePlayback {
        item: CatalogItem,
        reply: oneshot::Sender<Result<ResumePoint>>,
    },
    PlayerEvent(PlayerEvent),
    TogglePlayPause {
        reply: oneshot::Sender<Result<()>>,
    },
    Skip {
        direction: SkipDirection,
        snapshot: Option<UnitSnapshot>,
        reply: oneshot::Sender<Result<bool>>,
    },
    SaveProgressNow,
    Stop {
        reply: oneshot::Sender<()>,
    },
    TaskRemoved {
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable command handle to the running session
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    async fn send(&self, command: SessionCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| AudiocineError::ChannelClosed("session command channel".to_string()))
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> SessionCommand) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.send(build(reply)).await?;
        response
            .await
            .map_err(|_| AudiocineError::ChannelClosed("session reply dropped".to_string()))
    }

    pub async fn start_playback(&self, item: CatalogItem, part_index: i32, episode_index: i32) -> Result<()> {
        self.request(|reply| SessionCommand::StartPlayback {
            item,
            part_index,
            episode_index,
            reply,
        })
        .await?
    }

    pub async fn resume_playback(&self, item: CatalogItem) -> Result<ResumePoint> {
        self.request(|reply| SessionCommand::ResumePlayback { item, reply })
            .await?
    }

    /// Forward a platform player callback
    pub async fn notify_player_event(&self, event: PlayerEvent) -> Result<()> {
        self.send(SessionCommand::PlayerEvent(event)).await
    }

    pub async fn toggle_play_pause(&self) -> Result<()> {
        self.request(|reply| SessionCommand::TogglePlayPause { reply }).await?
    }

    pub async fn skip(&self, direction: SkipDirection, snapshot: Option<UnitSnapshot>) -> Result<bool> {
        self.request(|reply| SessionCommand::Skip {
            direction,
            snapshot,
            reply,
        })
        .await?
    }

    pub async fn save_progress_now(&self) -> Result<()> {
        self.send(SessionCommand::SaveProgressNow).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.request(|reply| SessionCommand::Stop { reply }).await
    }

    pub async fn task_removed(&self) -> Result<()> {
        self.request(|reply| SessionCommand::TaskRemoved { reply }).await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        self.request(|reply| SessionCommand::Snapshot { reply }).await
    }

    /// Destroy the session and wait for the flush
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| SessionCommand::Shutdown { reply }).await
    }
}

pub struct SessionService;

impl SessionService {
    /// Move the engine onto its own task
    ///
    /// `ticks` is the receiving end of the channel the engine's ticker
    /// writes to. The loop ends after `shutdown` or when every handle is
    /// dropped; both release the engine.
    pub fn spawn(
        mut engine: MediaSessionEngine,
        mut ticks: mpsc::Receiver<Tick>,
        bus: &SyncBus,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (commands, mut inbox) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let mut bus_messages = bus.subscribe();

        let task = tokio::spawn(async move {
            let mut bus_open = true;
            info!("Media session started");

            loop {
                tokio::select! {
                    command = inbox.recv() => match command {
                        Some(SessionCommand::Shutdown { reply }) => {
                            engine.on_destroy().await;
                            let _ = reply.send(());
                            break;
                        }
                        Some(command) => apply(&mut engine, command).await,
                        None => {
                            debug!("All session handles dropped");
                            engine.on_destroy().await;
                            break;
                        }
                    },
                    Some(tick) = ticks.recv() => {
                        if let Err(e) = engine.handle_tick(tick).await {
                            warn!(?tick, error = %e, "Session tick failed");
                        }
                    }
                    message = bus_messages.recv(), if bus_open => match message {
                        Ok(message) if message.action.is_command() => {
                            let action = message.action;
                            if let Err(e) = engine.handle_sync_message(message).await {
                                warn!(action = action.as_str(), error = %e, "Sync command failed");
                            }
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Session fell behind on the sync bus");
                        }
                        Err(RecvError::Closed) => bus_open = false,
                    },
                }
            }
        });

        (SessionHandle { commands }, task)
    }
}

async fn apply(engine: &mut MediaSessionEngine, command: SessionCommand) {
    match command {
        SessionCommand::StartPlayback {
            item,
            part_index,
            episode_index,
            reply,
        } => {
            let _ = reply.send(engine.start_playback(item, part_index, episode_index).await);
        }
        SessionCommand::ResumePlayback { item, reply } => {
            let _ = reply.send(engine.resume_playback(item).await);
        }
        SessionCommand::PlayerEvent(event) => {
            if let Err(e) = engine.handle_player_event(event).await {
                warn!(error = %e, "Player event handling failed");
            }
        }
        SessionCommand::TogglePlayPause { reply } => {
            let _ = reply.send(engine.toggle_play_pause().await);
        }
        SessionCommand::Skip {
            direction,
            snapshot,
            reply,
        } => {
            let _ = reply.send(engine.skip_to_adjacent(direction, snapshot).await);
        }
        SessionCommand::SaveProgressNow => {
            if let Err(e) = engine.on_periodic_tick().await {
                warn!(error = %e, "Could not save progress");
            }
        }
        SessionCommand::Stop { reply } => {
            engine.stop().await;
            let _ = reply.send(());
        }
        SessionCommand::TaskRemoved { reply } => {
            engine.on_task_removed().await;
            let _ = reply.send(());
        }
        SessionCommand::Snapshot { reply } => {
            let _ = reply.send(engine.snapshot());
        }
        // Handled by the loop
        SessionCommand::Shutdown { reply } => {
            let _ = reply.send(());
        }
    }
}
