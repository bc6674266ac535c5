//! Device lifecycle

use std::sync::Arc;

use parking_lot::Mutex;

use crate::audio::context::ContextRegistry;
use crate::audio::music::MusicRegistry;
use crate::audio::sound::Sound;
use crate::config::AudioConfig;
use crate::error::{AudioError, Result};
use crate::sound::mixer::Mixer;
use crate::sound::AudioOutput;

/// The audio device and everything playing through it
///
/// A device starts out not ready. [`AudioDevice::init`] creates the mixer
/// (kept for the life of the device) and opens the configured output
/// driver. [`AudioDevice::close`] releases every sound, context and music
/// stream; handles issued before a close never resolve again.
pub struct AudioDevice {
    pub(crate) config: AudioConfig,
    ready: bool,
    mixer: Option<Arc<Mutex<Mixer>>>,
    output: Option<AudioOutput>,
    pub(crate) contexts: ContextRegistry,
    pub(crate) sounds: Vec<Sound>,
    pub(crate) music: MusicRegistry,
}

impl std::fmt::Debug for AudioDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioDevice")
            .field("ready", &self.ready)
            .field("driver", &self.config.driver)
            .field("frequency", &self.config.frequency)
            .field("sounds", &self.sounds.len())
            .field("music_streams", &self.music.active_count())
            .finish()
    }
}

impl AudioDevice {
    pub fn new(config: AudioConfig) -> Self {
        let music = MusicRegistry::new(config.max_music_streams);
        Self {
            config,
            ready: false,
            mixer: None,
            output: None,
            contexts: ContextRegistry::new(),
            sounds: Vec::new(),
            music,
        }
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// Open the output driver; failures are logged and leave the device
    /// not ready
    pub fn init(&mut self) {
        if let Err(e) = self.try_init() {
            log::warn!("Audio device initialization failed: {}", e);
        }
    }

    /// Open the output driver. Does nothing when already ready.
    pub fn try_init(&mut self) -> Result<()> {
        if self.ready {
            return Ok(());
        }
        self.config
            .validate()
            .map_err(|e| AudioError::Config(format!("{:#}", e)))?;

        let mixer = match &self.mixer {
            Some(mixer) => Arc::clone(mixer),
            None => {
                let mixer = Arc::new(Mutex::new(Mixer::new(
                    self.config.frequency,
                    self.config.quality,
                )?));
                self.mixer = Some(Arc::clone(&mixer));
                mixer
            }
        };
        mixer.lock().set_master_gain(self.config.master_volume)?;

        let output = AudioOutput::open(
            self.config.driver,
            self.config.device_name.as_deref(),
            Arc::clone(&mixer),
        )?;

        log::info!(
            "Audio device ready: {:?} driver, {} Hz, {:?} quality",
            self.config.driver,
            self.config.frequency,
            self.config.quality
        );
        self.output = Some(output);
        self.ready = true;
        Ok(())
    }

    /// Release everything and close the output driver
    ///
    /// Safe to call repeatedly and before [`AudioDevice::init`].
    pub fn close(&mut self) {
        if let Some(shared) = self.mixer.clone() {
            let mut mixer = shared.lock();
            self.music.clear();
            self.contexts.close_all(&mut mixer);
            for sound in std::mem::take(&mut self.sounds) {
                sound.release(&mut mixer);
            }
            mixer.reset();
        }

        // The mixer lock must be free here; the audio thread may be mid-block
        if let Some(mut output) = self.output.take() {
            output.close();
        }

        if self.ready {
            log::info!("Audio device closed");
        }
        self.ready = false;
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Mixer output rate in Hz
    pub fn frequency(&self) -> u32 {
        match &self.mixer {
            Some(mixer) => mixer.lock().frequency(),
            None => self.config.frequency,
        }
    }

    /// Mix interleaved stereo frames into `out` when the null driver is
    /// active
    ///
    /// Returns the number of frames rendered: 0 when not ready or when a
    /// real output driver is pulling from the mixer.
    pub fn render(&self, out: &mut [f32]) -> usize {
        let pulled_by_driver = self.output.as_ref().map_or(true, |o| !o.is_null());
        if !self.ready || pulled_by_driver {
            return 0;
        }
        match &self.mixer {
            Some(mixer) => mixer.lock().mix(out),
            None => 0,
        }
    }

    /// Live mixer objects as `(sources, buffers)`
    pub fn mixer_objects(&self) -> (usize, usize) {
        match &self.mixer {
            Some(mixer) => {
                let mixer = mixer.lock();
                (mixer.source_count(), mixer.buffer_count())
            }
            None => (0, 0),
        }
    }

    /// The shared mixer, or `NotReady`
    pub(crate) fn shared_mixer(&self) -> Result<Arc<Mutex<Mixer>>> {
        if !self.ready {
            return Err(AudioError::NotReady);
        }
        self.mixer.clone().ok_or(AudioError::NotReady)
    }
}

impl Drop for AudioDevice {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sound::OutputDriver;

    fn headless() -> AudioDevice {
        AudioDevice::new(AudioConfig::headless())
    }

    #[test]
    fn test_new_device_not_ready() {
        let device = headless();
        assert!(!device.is_ready());
        assert_eq!(device.frequency(), 44100);
        assert_eq!(device.mixer_objects(), (0, 0));
    }

    #[test]
    fn test_init_is_idempotent() {
        let mut device = headless();
        device.init();
        assert!(device.is_ready());
        device.init();
        assert!(device.is_ready());
        assert_eq!(device.config().driver, OutputDriver::Null);
    }

    #[test]
    fn test_close_before_init_and_twice() {
        let mut device = headless();
        device.close();
        assert!(!device.is_ready());

        device.init();
        device.close();
        device.close();
        assert!(!device.is_ready());

        device.init();
        assert!(device.is_ready());
    }

    #[test]
    fn test_invalid_config_leaves_device_not_ready() {
        let mut device = AudioDevice::new(AudioConfig {
            frequency: 0,
            ..AudioConfig::headless()
        });
        assert!(matches!(device.try_init(), Err(AudioError::Config(_))));
        device.init();
        assert!(!device.is_ready());
    }

    #[test]
    fn test_render_requires_ready() {
        let mut device = headless();
        let mut out = [1.0f32; 64];
        assert_eq!(device.render(&mut out), 0);

        device.init();
        assert_eq!(device.render(&mut out), 32);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_shared_mixer_not_ready() {
        let device = headless();
        assert!(matches!(device.shared_mixer(), Err(AudioError::NotReady)));
    }
}
