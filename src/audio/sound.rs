//! Fully decoded one-shot sounds

use std::path::Path;

use crate::audio::device::AudioDevice;
use crate::error::Result;
use crate::sound::mixer::{BufferId, Mixer, MixerError, SourceId, SourceState};
use crate::sound::{rres, Wave};

/// A loaded sound: one mixer buffer bound to one mixer source
///
/// The default value is the invalid handle returned when loading fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Sound {
    source: SourceId,
    buffer: BufferId,
}

impl Sound {
    pub fn source(&self) -> SourceId {
        self.source
    }

    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    pub fn is_null(&self) -> bool {
        self.source.is_null()
    }

    /// Stop and delete the source and buffer
    pub(crate) fn release(self, mixer: &mut Mixer) {
        let result = mixer
            .source_stop(self.source)
            .and_then(|()| mixer.delete_sources(&[self.source]))
            .and_then(|()| mixer.delete_buffers(&[self.buffer]));
        if let Err(e) = result {
            log::debug!("Failed to release sound {}: {}", self.source, e);
        }
    }
}

impl AudioDevice {
    /// Decode a whole `ogg` or `wav` file into a new sound
    pub fn load_sound(&mut self, path: impl AsRef<Path>) -> Sound {
        let path = path.as_ref();
        self.try_load_sound(path).unwrap_or_else(|e| {
            log::warn!("Failed to load sound '{}': {}", path.display(), e);
            Sound::default()
        })
    }

    pub fn try_load_sound(&mut self, path: impl AsRef<Path>) -> Result<Sound> {
        self.shared_mixer()?;
        let wave = Wave::load(path.as_ref())?;
        self.try_load_sound_from_wave(&wave)
    }

    /// Upload a copy of `wave` into a new sound
    pub fn load_sound_from_wave(&mut self, wave: &Wave) -> Sound {
        self.try_load_sound_from_wave(wave).unwrap_or_else(|e| {
            log::warn!("Failed to load sound from wave: {}", e);
            Sound::default()
        })
    }

    pub fn try_load_sound_from_wave(&mut self, wave: &Wave) -> Result<Sound> {
        let shared = self.shared_mixer()?;
        let mut mixer = shared.lock();

        let buffer = mixer.gen_buffer();
        if let Err(e) = mixer.buffer_data(buffer, wave.layout(), &wave.data, wave.sample_rate) {
            let _ = mixer.delete_buffers(&[buffer]);
            return Err(e.into());
        }

        let source = mixer.gen_source();
        if let Err(e) = mixer.set_source_buffer(source, Some(buffer)) {
            let _ = mixer.delete_sources(&[source]);
            let _ = mixer.delete_buffers(&[buffer]);
            return Err(e.into());
        }

        let sound = Sound { source, buffer };
        self.sounds.push(sound);
        log::debug!(
            "Loaded sound {}: {} frames at {} Hz",
            source,
            wave.frame_count(),
            wave.sample_rate
        );
        Ok(sound)
    }

    /// Load sound resource `res_id` from an rRES file
    pub fn load_sound_from_res(&mut self, rres_path: impl AsRef<Path>, res_id: u16) -> Sound {
        let path = rres_path.as_ref();
        self.try_load_sound_from_res(path, res_id).unwrap_or_else(|e| {
            log::warn!(
                "Failed to load sound resource {} from '{}': {}",
                res_id,
                path.display(),
                e
            );
            Sound::default()
        })
    }

    pub fn try_load_sound_from_res(
        &mut self,
        rres_path: impl AsRef<Path>,
        res_id: u16,
    ) -> Result<Sound> {
        self.shared_mixer()?;
        let wave = rres::load_wave(rres_path.as_ref(), res_id)?;
        self.try_load_sound_from_wave(&wave)
    }

    /// Stop and free `sound`; the handle goes stale
    pub fn unload_sound(&mut self, sound: Sound) {
        let Some(pos) = self.sounds.iter().position(|s| *s == sound) else {
            return;
        };
        self.sounds.swap_remove(pos);
        if let Ok(shared) = self.shared_mixer() {
            sound.release(&mut shared.lock());
        }
    }

    fn with_sound(
        &mut self,
        sound: Sound,
        what: &str,
        op: impl FnOnce(&mut Mixer, SourceId) -> std::result::Result<(), MixerError>,
    ) {
        let Ok(shared) = self.shared_mixer() else {
            return;
        };
        let mut mixer = shared.lock();
        if let Err(e) = op(&mut mixer, sound.source) {
            log::log!(failure_level(e), "{} failed for sound {}: {}", what, sound.source, e);
        }
    }

    /// Play from the start, or resume a paused sound
    pub fn play_sound(&mut self, sound: Sound) {
        self.with_sound(sound, "play", |m, src| m.source_play(src));
    }

    pub fn pause_sound(&mut self, sound: Sound) {
        self.with_sound(sound, "pause", |m, src| m.source_pause(src));
    }

    pub fn stop_sound(&mut self, sound: Sound) {
        self.with_sound(sound, "stop", |m, src| m.source_stop(src));
    }

    pub fn is_sound_playing(&self, sound: Sound) -> bool {
        match self.shared_mixer() {
            Ok(shared) => shared.lock().source_state(sound.source) == Some(SourceState::Playing),
            Err(_) => false,
        }
    }

    /// Volume multiplier, 1.0 is unmodified
    pub fn set_sound_volume(&mut self, sound: Sound, volume: f32) {
        self.with_sound(sound, "set volume", |m, src| m.set_source_gain(src, volume));
    }

    /// Pitch multiplier, 1.0 is unmodified
    pub fn set_sound_pitch(&mut self, sound: Sound, pitch: f32) {
        self.with_sound(sound, "set pitch", |m, src| m.set_source_pitch(src, pitch));
    }

    pub fn set_sound_looping(&mut self, sound: Sound, looping: bool) {
        self.with_sound(sound, "set looping", |m, src| m.set_source_looping(src, looping));
    }

    /// Number of loaded sounds
    pub fn sound_count(&self) -> usize {
        self.sounds.len()
    }
}

/// Stale and null handles are routine, anything else is worth a warning
fn failure_level(e: MixerError) -> log::Level {
    match e {
        MixerError::InvalidName => log::Level::Debug,
        _ => log::Level::Warn,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AudioConfig;
    use crate::error::AudioError;

    fn device() -> AudioDevice {
        let mut device = AudioDevice::new(AudioConfig {
            frequency: 8000,
            ..AudioConfig::headless()
        });
        device.init();
        device
    }

    fn tone(frames: usize) -> Wave {
        let data = (0..frames)
            .flat_map(|i| (((i % 16) as i16 - 8) * 1000).to_le_bytes())
            .collect();
        Wave::new(data, 8000, 16, 1)
    }

    #[test]
    fn test_stale_handle_failures_log_quietly() {
        assert_eq!(failure_level(MixerError::InvalidName), log::Level::Debug);
        assert_eq!(failure_level(MixerError::InvalidValue), log::Level::Warn);

        let mut dev = device();
        let sound = dev.load_sound_from_wave(&tone(64));
        dev.unload_sound(sound);
        let shared = dev.shared_mixer().unwrap();
        let mut mixer = shared.lock();
        assert_eq!(mixer.source_play(sound.source), Err(MixerError::InvalidName));
    }

    #[test]
    fn test_load_from_wave_not_playing() {
        let mut dev = device();
        let sound = dev.load_sound_from_wave(&tone(64));
        assert!(!sound.is_null());
        assert!(!dev.is_sound_playing(sound));
        assert_eq!(dev.sound_count(), 1);
    }

    #[test]
    fn test_play_until_consumed() {
        let mut dev = device();
        let sound = dev.load_sound_from_wave(&tone(64));
        dev.play_sound(sound);
        assert!(dev.is_sound_playing(sound));

        let mut out = vec![0.0f32; 32 * 2];
        dev.render(&mut out);
        assert!(dev.is_sound_playing(sound));
        dev.render(&mut out);
        assert!(!dev.is_sound_playing(sound));
    }

    #[test]
    fn test_pause_resume_stop() {
        let mut dev = device();
        let sound = dev.load_sound_from_wave(&tone(64));

        dev.pause_sound(sound);
        dev.stop_sound(sound);
        assert!(!dev.is_sound_playing(sound));

        dev.play_sound(sound);
        dev.pause_sound(sound);
        assert!(!dev.is_sound_playing(sound));
        dev.play_sound(sound);
        assert!(dev.is_sound_playing(sound));
        dev.stop_sound(sound);
        assert!(!dev.is_sound_playing(sound));
    }

    #[test]
    fn test_bad_wave_gives_null_sound() {
        let mut dev = device();
        let odd = Wave::new(vec![0; 3], 8000, 16, 1);
        assert!(dev.load_sound_from_wave(&odd).is_null());
        assert!(matches!(
            dev.try_load_sound_from_wave(&Wave::new(vec![0; 4], 8000, 24, 1)),
            Err(AudioError::Mixer(MixerError::InvalidValue))
        ));
        assert_eq!(dev.sound_count(), 0);
        assert_eq!(dev.mixer_objects(), (0, 0));
    }

    #[test]
    fn test_not_ready_device() {
        let mut dev = AudioDevice::new(AudioConfig::headless());
        assert!(matches!(
            dev.try_load_sound_from_wave(&tone(8)),
            Err(AudioError::NotReady)
        ));
        assert!(dev.load_sound("missing.wav").is_null());
    }

    #[test]
    fn test_unload_reuses_slot() {
        let mut dev = device();
        let first = dev.load_sound_from_wave(&tone(16));
        dev.unload_sound(first);
        assert_eq!(dev.sound_count(), 0);
        assert_eq!(dev.mixer_objects(), (0, 0));

        let second = dev.load_sound_from_wave(&tone(16));
        assert_eq!(second.source().index(), first.source().index());
        assert_ne!(second.source().generation(), first.source().generation());

        // Stale handle is ignored
        dev.unload_sound(first);
        dev.play_sound(first);
        assert_eq!(dev.sound_count(), 1);
        assert!(!dev.is_sound_playing(second));
    }

    #[test]
    fn test_volume_and_pitch() {
        let mut dev = device();
        let sound = dev.load_sound_from_wave(&tone(16));
        dev.set_sound_volume(sound, 0.5);
        dev.set_sound_pitch(sound, 2.0);
        dev.set_sound_pitch(sound, f32::NAN);

        let shared = dev.shared_mixer().unwrap();
        let mixer = shared.lock();
        assert_eq!(mixer.source_gain(sound.source()), Some(0.5));
        assert_eq!(mixer.source_pitch(sound.source()), Some(2.0));
    }
}
