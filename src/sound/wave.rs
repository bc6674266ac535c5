//! Fully decoded PCM held in memory

use std::path::Path;

use super::decoder::{open_decoder, DecodeError, DecodeResult, SoundDecoder};
use super::formats::AudioFormat;
use super::wav::write_wav;
use crate::sound::mixer::PcmLayout;

/// Bytes requested from a decoder per read while loading a whole file
const DECODE_CHUNK: usize = 64 * 1024;

/// Caller-owned PCM samples
///
/// `data` is 8-bit unsigned, 16-bit signed little-endian or 32-bit float
/// little-endian, interleaved when stereo.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Wave {
    pub data: Vec<u8>,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub channels: u16,
}

impl Wave {
    pub fn new(data: Vec<u8>, sample_rate: u32, bits_per_sample: u16, channels: u16) -> Self {
        Self {
            data,
            sample_rate,
            bits_per_sample,
            channels,
        }
    }

    /// Decode a whole audio file
    pub fn load(path: &Path) -> DecodeResult<Self> {
        let mut decoder = open_decoder(path)?;
        let wave = Self::from_decoder(decoder.as_mut());
        decoder.close();
        wave
    }

    /// Drain `decoder` from its current position to the end
    pub fn from_decoder(decoder: &mut dyn SoundDecoder) -> DecodeResult<Self> {
        let format = decoder.format();
        let mut data = Vec::new();
        let mut chunk = vec![0u8; DECODE_CHUNK];

        loop {
            match decoder.decode(&mut chunk) {
                Ok(0) | Err(DecodeError::EndOfFile) => break,
                Ok(n) => data.extend_from_slice(&chunk[..n]),
                Err(e) => return Err(e),
            }
        }

        if data.is_empty() {
            return Err(DecodeError::InvalidData(format!(
                "{} decoder produced no samples",
                decoder.name()
            )));
        }

        Ok(Self::new(
            data,
            decoder.frequency(),
            format.bits(),
            format.channels() as u16,
        ))
    }

    pub fn layout(&self) -> PcmLayout {
        PcmLayout::new(self.bits_per_sample, self.channels)
    }

    /// Number of whole frames held
    pub fn frame_count(&self) -> usize {
        let frame = self.layout().frame_size();
        if frame == 0 {
            0
        } else {
            self.data.len() / frame
        }
    }

    /// Duration in seconds
    pub fn duration(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f32 / self.sample_rate as f32
    }

    /// Serialize as a RIFF WAVE file (8 and 16 bit only)
    pub fn to_wav_bytes(&self) -> DecodeResult<Vec<u8>> {
        let format = AudioFormat::from_parts(self.channels, self.bits_per_sample).ok_or_else(|| {
            DecodeError::UnsupportedFormat(format!(
                "{} bit {} channel WAV export",
                self.bits_per_sample, self.channels
            ))
        })?;
        Ok(write_wav(format, self.sample_rate, &self.data))
    }

    /// Write the wave to `path` as a RIFF WAVE file
    pub fn export(&self, path: &Path) -> DecodeResult<()> {
        std::fs::write(path, self.to_wav_bytes()?)?;
        Ok(())
    }
}
