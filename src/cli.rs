use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use crate::config::{load_config, parse_driver, parse_quality, parse_volume, AudioConfig};
use crate::logging::LogLevel;

/// soundstage - play sounds, music streams and test tones
#[derive(Parser, Debug, Default)]
#[command(name = "soundstage")]
#[command(version)]
#[command(about = "Play audio files through the soundstage mixer", long_about = None)]
pub struct Cli {
    /// Audio files to play (ogg, wav)
    #[arg(value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Audio configuration file (key = value)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output driver (rodio, null)
    #[arg(long, value_name = "DRIVER")]
    pub driver: Option<String>,

    /// Output device name
    #[arg(long, value_name = "NAME")]
    pub device: Option<String>,

    /// Mixer frequency in Hz
    #[arg(short, long, value_name = "HZ")]
    pub frequency: Option<u32>,

    /// Resampling quality (low, medium, high)
    #[arg(short, long, value_name = "QUALITY")]
    pub quality: Option<String>,

    /// Master volume (0-100)
    #[arg(short, long, value_name = "VOLUME")]
    pub volume: Option<String>,

    /// Stream files as music instead of loading them fully
    #[arg(short, long)]
    pub music: bool,

    /// Play a sine tone of this frequency through a raw context
    #[arg(short, long, value_name = "HZ")]
    pub tone: Option<f32>,

    /// How long to play, in seconds
    #[arg(short, long, value_name = "SECONDS", default_value_t = 5.0)]
    pub seconds: f32,

    /// Log verbosity (0-6 or nothing, user, error, warning, info, debug, all)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Also append log output to this file
    #[arg(short, long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,
}

impl Cli {
    /// Config file (or defaults) with command line overrides applied
    pub fn audio_config(&self) -> Result<AudioConfig> {
        let config = match &self.config {
            Some(path) => load_config(path)?,
            None => AudioConfig::default(),
        };
        self.merge_into_config(config)
    }

    /// Merge CLI arguments into an audio configuration
    pub fn merge_into_config(&self, mut config: AudioConfig) -> Result<AudioConfig> {
        if let Some(ref driver) = self.driver {
            config.driver = parse_driver(driver).context("Invalid output driver")?;
        }

        if let Some(ref device) = self.device {
            config.device_name = Some(device.clone());
        }

        if let Some(frequency) = self.frequency {
            config.frequency = frequency;
        }

        if let Some(ref quality) = self.quality {
            config.quality = parse_quality(quality)?;
        }

        if let Some(ref vol) = self.volume {
            let int_vol: i32 = vol.parse().context("Invalid volume")?;
            config.master_volume = parse_volume(int_vol);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn log_level(&self) -> Result<LogLevel> {
        match &self.log_level {
            Some(level) => level.parse::<LogLevel>().map_err(anyhow::Error::msg),
            None => Ok(LogLevel::default()),
        }
    }
}
