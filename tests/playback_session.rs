//! Media session behaviour against a scripted player
//!
//! `FakePlayer` records every call and lets the test move the playhead; the
//! platform callbacks are delivered by hand through `handle_player_event`.

use audiocine_core::config::PlaybackConfig;
use audiocine_core::content::{CatalogItem, ContentRef, Episode, MediaLink, Movie, Series};
use audiocine_core::error::{AudiocineError, Result};
use audiocine_core::playback::{
    build_playlist, tick_channel, MediaPlaylistItem, MediaSessionEngine, Player, PlayerEvent, PlayerState,
    SessionService, SessionState, SkipDirection, Tick, TransitionReason, UnitSnapshot,
};
use audiocine_core::storage::preferences::keys;
use audiocine_core::storage::{Database, MemoryPreferences, PlaybackProgress, Preferences, ProgressStore};
use audiocine_core::sync::{SyncAction, SyncBus, SyncMessage};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::mpsc;

#[derive(Default)]
struct FakeState {
    items: Vec<MediaPlaylistItem>,
    index: Option<usize>,
    position_ms: i64,
    duration_ms: i64,
    playing: bool,
    seeks: Vec<i64>,
    item_seeks: Vec<usize>,
    stopped: bool,
    released: bool,
}

#[derive(Clone, Default)]
struct FakePlayer(Arc<Mutex<FakeState>>);

impl FakePlayer {
    fn set_playhead(&self, position_ms: i64, duration_ms: i64) {
        let mut state = self.0.lock().unwrap();
        state.position_ms = position_ms;
        state.duration_ms = duration_ms;
    }

    fn item_seeks(&self) -> Vec<usize> {
        self.0.lock().unwrap().item_seeks.clone()
    }

    fn seeks(&self) -> Vec<i64> {
        self.0.lock().unwrap().seeks.clone()
    }
}

impl Player for FakePlayer {
    fn set_media_items(&mut self, items: Vec<MediaPlaylistItem>, start_index: usize) -> Result<()> {
        let mut state = self.0.lock().unwrap();
        state.items = items;
        state.index = Some(start_index);
        state.position_ms = 0;
        Ok(())
    }

    fn prepare(&mut self) -> Result<()> {
        Ok(())
    }

    fn play(&mut self) {
        self.0.lock().unwrap().playing = true;
    }

    fn pause(&mut self) {
        self.0.lock().unwrap().playing = false;
    }

    fn is_playing(&self) -> bool {
        self.0.lock().unwrap().playing
    }

    fn seek_to(&mut self, position_ms: i64) {
        let mut state = self.0.lock().unwrap();
        state.position_ms = position_ms;
        state.seeks.push(position_ms);
    }

    fn seek_to_item(&mut self, index: usize, position_ms: i64) -> Result<()> {
        let mut state = self.0.lock().unwrap();
        state.index = Some(index);
        state.position_ms = position_ms;
        state.item_seeks.push(index);
        Ok(())
    }

    fn current_index(&self) -> Option<usize> {
        self.0.lock().unwrap().index
    }

    fn media_item_at(&self, index: usize) -> Option<MediaPlaylistItem> {
        self.0.lock().unwrap().items.get(index).cloned()
    }

    fn media_item_count(&self) -> usize {
        self.0.lock().unwrap().items.len()
    }

    fn position_ms(&self) -> i64 {
        self.0.lock().unwrap().position_ms
    }

    fn duration_ms(&self) -> i64 {
        self.0.lock().unwrap().duration_ms
    }

    fn state(&self) -> PlayerState {
        PlayerState::Ready
    }

    fn audio_session_id(&self) -> Option<i32> {
        Some(7)
    }

    fn stop(&mut self) {
        let mut state = self.0.lock().unwrap();
        state.playing = false;
        state.stopped = true;
    }

    fn clear_media_items(&mut self) {
        let mut state = self.0.lock().unwrap();
        state.items.clear();
        state.index = None;
    }

    fn release(&mut self) {
        self.0.lock().unwrap().released = true;
    }
}

struct Fixture {
    _db: Database,
    progress: ProgressStore,
    preferences: Arc<MemoryPreferences>,
    bus: SyncBus,
    player: FakePlayer,
    ticks: mpsc::Receiver<Tick>,
    engine: MediaSessionEngine,
}

async fn fixture() -> Fixture {
    let db = Database::new_in_memory().await.expect("database");
    let progress = ProgressStore::new(db.pool().clone());
    let preferences = Arc::new(MemoryPreferences::new());
    let bus = SyncBus::default();
    let player = FakePlayer::default();
    let config = PlaybackConfig {
        initial_seek_delay_ms: 0,
        ..PlaybackConfig::default()
    };
    let (sink, ticks) = tick_channel();
    let engine = MediaSessionEngine::new(
        Box::new(player.clone()),
        progress.clone(),
        preferences.clone(),
        bus.clone(),
        config,
        sink,
    );
    Fixture {
        _db: db,
        progress,
        preferences,
        bus,
        player,
        ticks,
        engine,
    }
}

fn movie(parts: usize) -> CatalogItem {
    CatalogItem::Movie(Movie {
        id: "film-1".to_string(),
        title: "Long Film".to_string(),
        parts: (0..parts)
            .map(|i| MediaLink::new(format!("https://cdn.example.com/film_{}.mp3", i)))
            .collect(),
    })
}

fn series() -> CatalogItem {
    let episode = |title: &str| Episode {
        title: title.to_string(),
        url: format!("https://cdn.example.com/{}.mp3", title),
    };
    let mut seasons = BTreeMap::new();
    seasons.insert("1".to_string(), vec![episode("s1e1"), episode("s1e2")]);
    seasons.insert("2".to_string(), vec![episode("s2e1")]);
    CatalogItem::Series(Series {
        id: "show-1".to_string(),
        title: "The Show".to_string(),
        seasons,
    })
}

async fn next_action(rx: &mut broadcast::Receiver<SyncMessage>, action: SyncAction) -> SyncMessage {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for sync message")
            .expect("bus closed");
        if message.action == action {
            return message;
        }
    }
}

#[tokio::test]
async fn test_start_resumes_at_saved_position() {
    let mut f = fixture().await;
    let part = ContentRef::movie_part("film-1", 1);
    f.progress
        .save(&PlaybackProgress::new(part.clone(), 42_000, 100_000), &part)
        .await
        .unwrap();

    f.engine.start_playback(movie(3), 1, -1).await.unwrap();

    assert_eq!(f.player.0.lock().unwrap().index, Some(1));
    assert_eq!(f.player.seeks(), vec![42_000]);
    assert_eq!(f.engine.current_ref(), Some(&part));
    assert_eq!(f.engine.state(), SessionState::Buffering);
}

#[tokio::test]
async fn test_finished_unit_starts_from_zero() {
    let mut f = fixture().await;
    let part = ContentRef::movie_part("film-1", 0);
    f.progress
        .save(&PlaybackProgress::new(part.clone(), 100_000, 100_000), &part)
        .await
        .unwrap();

    f.engine.start_playback(movie(2), 0, -1).await.unwrap();
    assert!(f.player.seeks().is_empty());
}

#[tokio::test]
async fn test_resume_playback_uses_latest_unit() {
    let mut f = fixture().await;
    let older = ContentRef::episode("show-1", 0, 0);
    let newer = ContentRef::episode("show-1", 1, 0);
    f.progress
        .save(&PlaybackProgress::new(older.clone(), 5_000, 60_000).with_timestamp(1_000), &older)
        .await
        .unwrap();
    f.progress
        .save(&PlaybackProgress::new(newer.clone(), 20_000, 60_000).with_timestamp(2_000), &newer)
        .await
        .unwrap();

    let point = f.engine.resume_playback(series()).await.unwrap();
    assert!(point.is_resume);
    assert_eq!((point.part_index, point.episode_index), (1, 0));
    assert_eq!(f.player.0.lock().unwrap().index, Some(2));
    assert_eq!(f.player.seeks(), vec![20_000]);
}

#[tokio::test]
async fn test_periodic_tick_waits_for_duration() {
    let mut f = fixture().await;
    f.engine.start_playback(movie(1), 0, -1).await.unwrap();
    let part = ContentRef::movie_part("film-1", 0);

    f.player.set_playhead(3_000, 0);
    f.engine.on_periodic_tick().await.unwrap();
    assert!(f.progress.get(&part).await.unwrap().is_none());

    f.player.set_playhead(4_000, 90_000);
    f.engine.on_periodic_tick().await.unwrap();
    let saved = f.progress.get(&part).await.unwrap().unwrap();
    assert_eq!(saved.current_position_ms, 4_000);
    assert_eq!(saved.total_duration_ms, 90_000);
}

#[tokio::test]
async fn test_natural_end_clears_progress() {
    let mut f = fixture().await;
    f.engine.start_playback(movie(1), 0, -1).await.unwrap();
    let part = ContentRef::movie_part("film-1", 0);

    f.player.set_playhead(30_000, 60_000);
    f.engine.on_periodic_tick().await.unwrap();
    assert!(f.progress.get(&part).await.unwrap().is_some());

    f.engine
        .handle_player_event(PlayerEvent::StateChanged { state: PlayerState::Ended })
        .await
        .unwrap();

    assert_eq!(f.engine.state(), SessionState::Ended);
    assert!(f.progress.get(&part).await.unwrap().is_none());

    // A tick after the end does not bring the record back
    f.engine.on_periodic_tick().await.unwrap();
    assert!(f.progress.get(&part).await.unwrap().is_none());
}

#[tokio::test]
async fn test_auto_advance_fires_once_per_unit() {
    let mut f = fixture().await;
    let mut ui = f.bus.subscribe();
    f.engine.start_playback(movie(3), 0, -1).await.unwrap();
    f.engine
        .handle_player_event(PlayerEvent::IsPlayingChanged { is_playing: true })
        .await
        .unwrap();

    f.player.set_playhead(100_000, 120_000);
    f.engine.on_position_poll().await.unwrap();
    assert!(f.player.item_seeks().is_empty());

    f.player.set_playhead(111_000, 120_000);
    f.engine.on_position_poll().await.unwrap();
    let notice = next_action(&mut ui, SyncAction::AutoAdvanceSoon).await;
    assert_eq!(notice.payload.part_index, Some(0));

    f.player.set_playhead(119_500, 120_000);
    f.engine.on_position_poll().await.unwrap();
    assert_eq!(f.player.item_seeks(), vec![1]);

    // Progress of the unit being left was saved first
    let left = f.progress.get(&ContentRef::movie_part("film-1", 0)).await.unwrap().unwrap();
    assert_eq!(left.current_position_ms, 119_500);

    // More polls inside the window before the transition arrives
    for _ in 0..3 {
        f.player.set_playhead(119_800, 120_000);
        f.engine.on_position_poll().await.unwrap();
    }
    assert_eq!(f.player.item_seeks(), vec![1]);

    // New unit, new chance
    f.engine
        .handle_player_event(PlayerEvent::MediaItemTransition {
            index: 1,
            reason: TransitionReason::Seek,
        })
        .await
        .unwrap();
    f.player.set_playhead(112_000, 120_000);
    f.engine.on_position_poll().await.unwrap();
    f.player.set_playhead(119_600, 120_000);
    f.engine.on_position_poll().await.unwrap();
    assert_eq!(f.player.item_seeks(), vec![1, 2]);
}

#[tokio::test]
async fn test_autoplay_disabled_never_advances() {
    let mut f = fixture().await;
    f.preferences.set_bool(keys::AUTOPLAY_ENABLED, false).await.unwrap();
    f.engine.start_playback(movie(2), 0, -1).await.unwrap();
    f.engine
        .handle_player_event(PlayerEvent::IsPlayingChanged { is_playing: true })
        .await
        .unwrap();

    for position in [111_000, 119_500, 119_900] {
        f.player.set_playhead(position, 120_000);
        f.engine.on_position_poll().await.unwrap();
    }
    assert!(f.player.item_seeks().is_empty());
}

#[tokio::test]
async fn test_transition_round_trips_identity() {
    let mut f = fixture().await;
    f.engine.start_playback(series(), 0, 0).await.unwrap();

    let expected = [
        ContentRef::episode("show-1", 0, 0),
        ContentRef::episode("show-1", 0, 1),
        ContentRef::episode("show-1", 1, 0),
    ];
    for (index, reference) in expected.iter().enumerate() {
        f.engine
            .handle_player_event(PlayerEvent::MediaItemTransition {
                index,
                reason: TransitionReason::Seek,
            })
            .await
            .unwrap();
        assert_eq!(f.engine.current_ref(), Some(reference));
    }

    let subtitles: Vec<_> = build_playlist(&series())
        .into_iter()
        .map(|item| item.subtitle.unwrap_or_default())
        .collect();
    assert_eq!(subtitles, vec!["T1:E1", "T1:E2", "T2:E1"]);
}

#[tokio::test]
async fn test_auto_transition_clears_finished_unit_and_seeks_next() {
    let mut f = fixture().await;
    let first = ContentRef::episode("show-1", 0, 0);
    let second = ContentRef::episode("show-1", 0, 1);
    f.progress
        .save(&PlaybackProgress::new(second.clone(), 7_000, 60_000), &second)
        .await
        .unwrap();

    f.engine.start_playback(series(), 0, 0).await.unwrap();
    f.player.set_playhead(58_000, 60_000);
    f.engine.on_periodic_tick().await.unwrap();
    assert!(f.progress.get(&first).await.unwrap().is_some());

    f.player.0.lock().unwrap().index = Some(1);
    f.engine
        .handle_player_event(PlayerEvent::MediaItemTransition {
            index: 1,
            reason: TransitionReason::Auto,
        })
        .await
        .unwrap();

    assert!(f.progress.get(&first).await.unwrap().is_none());
    assert_eq!(f.player.seeks().last(), Some(&7_000));
}

#[tokio::test]
async fn test_outside_seek_saves_outgoing_unit() {
    let mut f = fixture().await;
    f.engine.start_playback(series(), 0, 0).await.unwrap();
    f.engine
        .handle_player_event(PlayerEvent::IsPlayingChanged { is_playing: true })
        .await
        .unwrap();

    f.player.set_playhead(20_000, 60_000);
    f.engine.on_position_poll().await.unwrap();

    // A notification button moves the player without going through the engine
    f.player.seek_to_item(1, 0).unwrap();
    f.engine
        .handle_player_event(PlayerEvent::MediaItemTransition {
            index: 1,
            reason: TransitionReason::Seek,
        })
        .await
        .unwrap();

    let saved = f
        .progress
        .get(&ContentRef::episode("show-1", 0, 0))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(saved.current_position_ms, 20_000);
    assert!(f
        .progress
        .get(&ContentRef::episode("show-1", 0, 1))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_polls_between_skip_and_transition_keep_caller_position() {
    let mut f = fixture().await;
    f.engine.start_playback(series(), 0, 0).await.unwrap();
    f.engine
        .handle_player_event(PlayerEvent::IsPlayingChanged { is_playing: true })
        .await
        .unwrap();
    f.player.set_playhead(30_000, 60_000);
    f.engine.on_position_poll().await.unwrap();

    let seen = UnitSnapshot {
        content: ContentRef::episode("show-1", 0, 0),
        position_ms: 33_000,
        duration_ms: 60_000,
    };
    assert!(f
        .engine
        .skip_to_adjacent(SkipDirection::Next, Some(seen.clone()))
        .await
        .unwrap());

    // The player already sits on the next item; the transition is late
    f.player.set_playhead(400, 60_000);
    f.engine.on_position_poll().await.unwrap();
    f.engine.on_periodic_tick().await.unwrap();
    f.engine
        .handle_player_event(PlayerEvent::MediaItemTransition {
            index: 1,
            reason: TransitionReason::Seek,
        })
        .await
        .unwrap();

    let saved = f.progress.get(&seen.content).await.unwrap().unwrap();
    assert_eq!(saved.current_position_ms, 33_000);
    assert!(f
        .progress
        .get(&ContentRef::episode("show-1", 0, 1))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_manual_skip_saves_caller_identity() {
    let mut f = fixture().await;
    f.engine.start_playback(series(), 0, 1).await.unwrap();

    // The player already reports a different position than the caller saw
    f.player.set_playhead(1_000, 60_000);
    let seen = UnitSnapshot {
        content: ContentRef::episode("show-1", 0, 1),
        position_ms: 33_000,
        duration_ms: 60_000,
    };
    assert!(f
        .engine
        .skip_to_adjacent(SkipDirection::Next, Some(seen.clone()))
        .await
        .unwrap());

    assert_eq!(f.player.item_seeks(), vec![2]);
    let saved = f.progress.get(&seen.content).await.unwrap().unwrap();
    assert_eq!(saved.current_position_ms, 33_000);
    assert!(f
        .progress
        .get(&ContentRef::episode("show-1", 1, 0))
        .await
        .unwrap()
        .is_none());

    // Nothing after the last episode
    assert!(!f.engine.skip_to_adjacent(SkipDirection::Next, None).await.unwrap());
    assert!(f.engine.skip_to_adjacent(SkipDirection::Previous, None).await.unwrap());
    assert_eq!(f.player.item_seeks(), vec![2, 1]);
}

#[tokio::test]
async fn test_single_unit_has_no_skip() {
    let mut f = fixture().await;
    f.engine.start_playback(movie(1), 0, -1).await.unwrap();
    assert!(!f.engine.skip_to_adjacent(SkipDirection::Next, None).await.unwrap());
    assert!(f.player.item_seeks().is_empty());
}

#[tokio::test]
async fn test_player_error_is_surfaced() {
    let mut f = fixture().await;
    let mut ui = f.bus.subscribe();
    f.engine.start_playback(movie(1), 0, -1).await.unwrap();

    f.engine
        .handle_player_event(PlayerEvent::Error {
            message: "decoder failure".to_string(),
        })
        .await
        .unwrap();

    let message = next_action(&mut ui, SyncAction::PlaybackError).await;
    assert!(message.payload.message.unwrap().contains("decoder failure"));
    assert_eq!(message.payload.item_id.as_deref(), Some("film-1"));
    assert!(f.engine.snapshot().last_error.is_some());
    assert!(!f.player.is_playing());
}

#[tokio::test]
async fn test_task_removed_flushes_then_stops() {
    let mut f = fixture().await;
    let mut ui = f.bus.subscribe();
    f.engine.start_playback(movie(2), 1, -1).await.unwrap();
    f.player.set_playhead(12_000, 60_000);

    f.engine.on_task_removed().await;

    let saved = f
        .progress
        .get(&ContentRef::movie_part("film-1", 1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(saved.current_position_ms, 12_000);
    assert_eq!(f.engine.state(), SessionState::Idle);
    assert!(f.player.0.lock().unwrap().stopped);
    assert_eq!(f.player.media_item_count(), 0);
    next_action(&mut ui, SyncAction::HideMiniPlayer).await;
}

#[tokio::test]
async fn test_service_answers_state_requests_and_commands() {
    let f = fixture().await;
    let Fixture {
        _db,
        progress,
        bus,
        player,
        ticks,
        engine,
        ..
    } = f;

    let (handle, task) = SessionService::spawn(engine, ticks, &bus);

    handle.start_playback(movie(2), 0, -1).await.unwrap();
    handle
        .notify_player_event(PlayerEvent::IsPlayingChanged { is_playing: true })
        .await
        .unwrap();
    let mut surface = bus.subscribe();

    // A surface attaching late asks for the current state
    bus.publish(SyncMessage::bare(SyncAction::RequestMiniPlayerState));
    let shown = next_action(&mut surface, SyncAction::ShowMiniPlayer).await;
    assert_eq!(shown.payload.item_id.as_deref(), Some("film-1"));
    assert_eq!(shown.payload.title.as_deref(), Some("Long Film"));
    let metadata = next_action(&mut surface, SyncAction::UpdateMiniPlayerMetadata).await;
    assert_eq!(metadata.payload.subtitle.as_deref(), Some("Part 1"));
    let button = next_action(&mut surface, SyncAction::UpdatePlayPauseButton).await;
    assert_eq!(button.payload.is_playing, Some(true));

    // Play/pause from the notification
    bus.publish(SyncMessage::bare(SyncAction::PlayPauseToggle));
    let button = next_action(&mut surface, SyncAction::UpdatePlayPauseButton).await;
    assert_eq!(button.payload.is_playing, Some(false));
    assert_eq!(handle.snapshot().await.unwrap().state, SessionState::Paused);

    // Stop from the mini-player
    player.set_playhead(9_000, 60_000);
    bus.publish(SyncMessage::bare(SyncAction::Stop));
    next_action(&mut surface, SyncAction::HideMiniPlayer).await;
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Idle);
    assert_eq!(snapshot.content, None);

    handle.shutdown().await.unwrap();
    task.await.unwrap();
    assert!(player.0.lock().unwrap().released);
    assert!(matches!(
        handle.snapshot().await,
        Err(AudiocineError::ChannelClosed(_))
    ));

    // Stop flushed the position of the paused unit
    let saved = progress
        .get(&ContentRef::movie_part("film-1", 0))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(saved.current_position_ms, 9_000);
}
