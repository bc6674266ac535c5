// soundstage library
// Audio device, mix channel contexts, sounds and music streams

pub mod audio;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod propfile;
pub mod sound;

pub use audio::{AudioContext, AudioDevice, PcmData, Sound};
pub use cli::Cli;
pub use config::{AudioConfig, MIX_CHANNELS};
pub use error::{AudioError, Result};
pub use logging::LogLevel;
pub use sound::Wave;
