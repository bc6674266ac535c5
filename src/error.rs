//! Error type for the audio device

use crate::sound::mixer::MixerError;
use crate::sound::{DecodeError, OutputError, RresError};

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("audio device is not ready")]
    NotReady,
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("mix channel {0} out of range")]
    InvalidChannel(u8),
    #[error("unsupported stream format: {0}")]
    UnsupportedFormat(String),
    #[error("all {0} music stream slots are in use")]
    NoFreeStream(usize),
    #[error("no free mix channel")]
    NoFreeChannel,
    #[error("mixer: {0}")]
    Mixer(#[from] MixerError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Resource(#[from] RresError),
    #[error(transparent)]
    Output(#[from] OutputError),
}

pub type Result<T> = std::result::Result<T, AudioError>;
