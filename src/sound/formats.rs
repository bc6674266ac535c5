//! Audio format definitions for sound decoders

use crate::sound::mixer::PcmLayout;

/// Audio sample format produced by a decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioFormat {
    /// 8-bit unsigned mono (1 byte per frame)
    Mono8,
    /// 16-bit signed mono (2 bytes per frame)
    Mono16,
    /// 8-bit unsigned stereo (2 bytes per frame)
    Stereo8,
    /// 16-bit signed stereo (4 bytes per frame)
    #[default]
    Stereo16,
}

impl AudioFormat {
    /// Pick a format from a channel count and sample width
    pub fn from_parts(channels: u16, bits: u16) -> Option<Self> {
        match (channels, bits) {
            (1, 8) => Some(AudioFormat::Mono8),
            (1, 16) => Some(AudioFormat::Mono16),
            (2, 8) => Some(AudioFormat::Stereo8),
            (2, 16) => Some(AudioFormat::Stereo16),
            _ => None,
        }
    }

    /// Returns the number of bytes per frame
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            AudioFormat::Mono8 => 1,
            AudioFormat::Stereo8 => 2,
            AudioFormat::Mono16 => 2,
            AudioFormat::Stereo16 => 4,
        }
    }

    /// Returns the number of channels
    pub fn channels(&self) -> usize {
        match self {
            AudioFormat::Mono8 | AudioFormat::Mono16 => 1,
            AudioFormat::Stereo8 | AudioFormat::Stereo16 => 2,
        }
    }

    /// Returns the sample width in bits
    pub fn bits(&self) -> u16 {
        if self.is_16bit() {
            16
        } else {
            8
        }
    }

    /// Returns true if this is a 16-bit format
    pub fn is_16bit(&self) -> bool {
        matches!(self, AudioFormat::Mono16 | AudioFormat::Stereo16)
    }

    /// Returns true if this is a stereo format
    pub fn is_stereo(&self) -> bool {
        matches!(self, AudioFormat::Stereo8 | AudioFormat::Stereo16)
    }

    /// Byte layout for uploading decoded data into a mixer buffer
    pub fn layout(&self) -> PcmLayout {
        PcmLayout::new(self.bits(), self.channels() as u16)
    }
}
