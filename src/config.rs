use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::propfile::parse_propfile;
use crate::sound::mixer::MixerQuality;
use crate::sound::OutputDriver;

/// Number of fixed mix channels a context or music stream can bind to
pub const MIX_CHANNELS: usize = 4;

pub const DEFAULT_FREQUENCY: u32 = 44100;
pub const DEFAULT_MUSIC_STREAMS: usize = 2;
pub const DEFAULT_STREAM_BUFFERS: usize = 2;
pub const DEFAULT_STREAM_BUFFER_FRAMES: usize = 4096;

/// Audio device settings, from defaults, a config file or the command line
#[derive(Debug, Clone, PartialEq)]
pub struct AudioConfig {
    pub driver: OutputDriver,
    /// Output device name; `None` picks the system default
    pub device_name: Option<String>,
    /// Mixer output rate in Hz
    pub frequency: u32,
    pub quality: MixerQuality,
    /// Master gain, 0.0-1.0
    pub master_volume: f32,
    /// Concurrent music streams (at most [`MIX_CHANNELS`])
    pub max_music_streams: usize,
    /// Buffers in each context's streaming ring
    pub stream_buffers: usize,
    /// Frames per streaming buffer
    pub stream_buffer_frames: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            driver: OutputDriver::default(),
            device_name: None,
            frequency: DEFAULT_FREQUENCY,
            quality: MixerQuality::default(),
            master_volume: 1.0,
            max_music_streams: DEFAULT_MUSIC_STREAMS,
            stream_buffers: DEFAULT_STREAM_BUFFERS,
            stream_buffer_frames: DEFAULT_STREAM_BUFFER_FRAMES,
        }
    }
}

impl AudioConfig {
    /// Defaults with the null driver, for headless use
    pub fn headless() -> Self {
        Self {
            driver: OutputDriver::Null,
            ..Self::default()
        }
    }

    /// Check ranges that the device relies on
    pub fn validate(&self) -> Result<()> {
        if self.frequency == 0 {
            bail!("frequency must be positive");
        }
        if !(0.0..=1.0).contains(&self.master_volume) {
            bail!("master volume {} out of range (0.0 to 1.0)", self.master_volume);
        }
        if self.max_music_streams > MIX_CHANNELS {
            bail!(
                "at most {} music streams are supported, got {}",
                MIX_CHANNELS,
                self.max_music_streams
            );
        }
        if self.stream_buffers == 0 || self.stream_buffer_frames == 0 {
            bail!("stream buffer count and size must be positive");
        }
        Ok(())
    }

    /// Apply one `key = value` setting
    pub fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key.to_ascii_lowercase().as_str() {
            "driver" => self.driver = parse_driver(value)?,
            "device" => {
                self.device_name = Some(value.to_string()).filter(|v| !v.is_empty());
            }
            "frequency" => self.frequency = parse_number(value).context("Invalid frequency")?,
            "quality" => self.quality = parse_quality(value)?,
            "volume" => {
                let vol: i32 = parse_number(value).context("Invalid volume")?;
                self.master_volume = parse_volume(vol);
            }
            "music_streams" => {
                self.max_music_streams = parse_number(value).context("Invalid music_streams")?
            }
            "stream_buffers" => {
                self.stream_buffers = parse_number(value).context("Invalid stream_buffers")?
            }
            "stream_buffer_frames" => {
                self.stream_buffer_frames =
                    parse_number(value).context("Invalid stream_buffer_frames")?
            }
            other => log::warn!("ignoring unknown config key '{}'", other),
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(s: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    Ok(s.trim().parse::<T>()?)
}

/// Parse config text on top of the defaults
pub fn parse_config(data: &str) -> Result<AudioConfig> {
    let mut config = AudioConfig::default();
    let mut first_error = None;

    parse_propfile(data, &mut |line, key, value| {
        if first_error.is_some() {
            return;
        }
        if let Err(e) = config.apply(key, value) {
            first_error = Some(e.context(format!("line {}: bad value for '{}'", line, key)));
        }
    });

    if let Some(e) = first_error {
        return Err(e);
    }
    config.validate()?;
    Ok(config)
}

/// Load an audio configuration file
pub fn load_config(path: &Path) -> Result<AudioConfig> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    parse_config(&data).with_context(|| format!("Invalid config file {}", path.display()))
}

/// Parse a volume value (0-100) to a float (0.0-1.0)
pub fn parse_volume(vol: i32) -> f32 {
    if vol < 0 {
        return 0.0;
    }
    if vol > 100 {
        return 1.0;
    }
    vol as f32 / 100.0
}

/// Parse a mixer quality name (low, medium, high) or level (0-2)
pub fn parse_quality(s: &str) -> Result<MixerQuality> {
    match s.trim().to_ascii_lowercase().as_str() {
        "low" | "0" => Ok(MixerQuality::Low),
        "medium" | "1" => Ok(MixerQuality::Medium),
        "high" | "2" => Ok(MixerQuality::High),
        other => bail!("Unknown quality '{}' (expected low, medium or high)", other),
    }
}

/// Parse an output driver name (rodio, null)
pub fn parse_driver(s: &str) -> Result<OutputDriver> {
    s.parse::<OutputDriver>().map_err(anyhow::Error::msg)
}
