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


//! Single equalizer bound to the player's audio session

use crate::error::Result;
use crate::storage::preferences::{keys, Preferences};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub trait Equalizer: Send + Sync {
    fn band_count(&self) -> u16;

    fn set_enabled(&mut self, enabled: bool) -> Result<()>;

    /// Gain in millibels
    fn set_band_level(&mut self, band: u16, level_mb: i16) -> Result<()>;

    fn release(&mut self);
}

pub trait EqualizerFactory: Send + Sync {
    fn create(&self, audio_session_id: i32) -> Result<Box<dyn Equalizer>>;
}

/// Owns at most one equalizer for the process
///
/// Created lazily for the first valid audio session id and kept until
/// [`EqualizerController::release`].
#[derive(Default)]
pub struct EqualizerController {
    factory: Option<Arc<dyn EqualizerFactory>>,
    instance: Option<Box<dyn Equalizer>>,
    session_id: Option<i32>,
}

impl EqualizerController {
    pub fn new(factory: Option<Arc<dyn EqualizerFactory>>) -> Self {
        Self {
            factory,
            instance: None,
            session_id: None,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.instance.is_some()
    }

    pub fn session_id(&self) -> Option<i32> {
        self.session_id
    }

    /// Create the equalizer if there is none yet, restoring saved settings
    ///
    /// Returns true when a new instance was created.
    pub async fn attach(&mut self, audio_session_id: Option<i32>, preferences: &dyn Preferences) -> Result<bool> {
        if self.instance.is_some() {
            return Ok(false);
        }
        let (Some(factory), Some(session_id)) = (self.factory.as_ref(), audio_session_id.filter(|id| *id > 0)) else {
            return Ok(false);
        };

        let mut equalizer = factory.create(session_id)?;
        let enabled = match restore_settings(equalizer.as_mut(), preferences).await {
            Ok(enabled) => enabled,
            Err(e) => {
                warn!(session_id, error = %e, "Equalizer setup failed, releasing");
                equalizer.release();
                return Err(e);
            }
        };

        info!(session_id, enabled, "Equalizer attached");
        self.instance = Some(equalizer);
        self.session_id = Some(session_id);
        Ok(true)
    }

    pub fn release(&mut self) {
        if let Some(mut equalizer) = self.instance.take() {
            equalizer.release();
            debug!(session_id = ?self.session_id, "Equalizer released");
        }
        self.session_id = None;
    }
}

/// Apply the saved enabled flag and band levels, returning the flag
async fn restore_settings(equalizer: &mut dyn Equalizer, preferences: &dyn Preferences) -> Result<bool> {
    let enabled = preferences.get_bool(keys::EQUALIZER_ENABLED, false).await?;
    equalizer.set_enabled(enabled)?;

    for band in 0..equalizer.band_count() {
        let Some(raw) = preferences.get_value(&keys::band_level(band)).await? else {
            continue;
        };
        match raw.trim().parse::<i16>() {
            Ok(level) => equalizer.set_band_level(band, level)?,
            Err(_) => warn!(band, value = %raw, "Ignoring invalid equalizer band level"),
        }
    }
    Ok(enabled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AudiocineError;
    use crate::storage::MemoryPreferences;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorded {
        created: Vec<i32>,
        enabled: Option<bool>,
        levels: Vec<(u16, i16)>,
        released: bool,
        reject_band: Option<u16>,
    }

    struct FakeEqualizer(Arc<Mutex<Recorded>>);

    impl Equalizer for FakeEqualizer {
        fn band_count(&self) -> u16 {
            3
        }

        fn set_enabled(&mut self, enabled: bool) -> Result<()> {
            self.0.lock().unwrap().enabled = Some(enabled);
            Ok(())
        }

        fn set_band_level(&mut self, band: u16, level_mb: i16) -> Result<()> {
            let mut recorded = self.0.lock().unwrap();
            if recorded.reject_band == Some(band) {
                return Err(AudiocineError::internal("band level rejected"));
            }
            recorded.levels.push((band, level_mb));
            Ok(())
        }

        fn release(&mut self) {
            self.0.lock().unwrap().released = true;
        }
    }

    struct FakeFactory(Arc<Mutex<Recorded>>);

    impl EqualizerFactory for FakeFactory {
        fn create(&self, audio_session_id: i32) -> Result<Box<dyn Equalizer>> {
            self.0.lock().unwrap().created.push(audio_session_id);
            Ok(Box::new(FakeEqualizer(Arc::clone(&self.0))))
        }
    }

    #[tokio::test]
    async fn test_lazy_single_instance_with_restored_settings() {
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let mut controller = EqualizerController::new(Some(Arc::new(FakeFactory(Arc::clone(&recorded)))));

        let prefs = MemoryPreferences::new();
        prefs.set_bool(keys::EQUALIZER_ENABLED, true).await.unwrap();
        prefs.set_i32(&keys::band_level(0), -200).await.unwrap();
        prefs.set_i32(&keys::band_level(2), 300).await.unwrap();

        // No session yet
        assert!(!controller.attach(None, &prefs).await.unwrap());
        assert!(!controller.attach(Some(0), &prefs).await.unwrap());

        assert!(controller.attach(Some(17), &prefs).await.unwrap());
        assert!(!controller.attach(Some(42), &prefs).await.unwrap());

        {
            let recorded = recorded.lock().unwrap();
            assert_eq!(recorded.created, vec![17]);
            assert_eq!(recorded.enabled, Some(true));
            assert_eq!(recorded.levels, vec![(0, -200), (2, 300)]);
        }

        controller.release();
        assert!(recorded.lock().unwrap().released);
        assert!(!controller.is_attached());
    }

    #[tokio::test]
    async fn test_without_factory_is_noop() {
        let mut controller = EqualizerController::default();
        let prefs = MemoryPreferences::new();
        assert!(!controller.attach(Some(5), &prefs).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_setup_releases_new_instance() {
        let recorded = Arc::new(Mutex::new(Recorded {
            reject_band: Some(1),
            ..Default::default()
        }));
        let mut controller = EqualizerController::new(Some(Arc::new(FakeFactory(Arc::clone(&recorded)))));

        let prefs = MemoryPreferences::new();
        prefs.set_i32(&keys::band_level(0), 100).await.unwrap();
        prefs.set_i32(&keys::band_level(1), 250).await.unwrap();

        assert!(controller.attach(Some(9), &prefs).await.is_err());
        assert!(recorded.lock().unwrap().released);
        assert!(!controller.is_attached());
        assert_eq!(controller.session_id(), None);

        // A later session can still attach once the device accepts the levels
        recorded.lock().unwrap().reject_band = None;
        recorded.lock().unwrap().released = false;
        assert!(controller.attach(Some(9), &prefs).await.unwrap());
        assert_eq!(recorded.lock().unwrap().created, vec![9, 9]);
    }
}
