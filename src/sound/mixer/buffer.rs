// buffer.rs - Audio buffer management

//! Audio buffer management for the mixer.
//!
//! Buffers hold audio data that can be queued to sources for playback.
//! Incoming PCM is converted once, on upload, to interleaved `f32` so the
//! mixing loop never has to care about the original sample width.

use crate::sound::mixer::mix::Mixer;
use crate::sound::mixer::types::*;

/// Buffer properties readable through [`Mixer::get_buffer_i`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferProp {
    Frequency,
    Bits,
    Channels,
    Size,
}

/// Layout of PCM bytes handed to [`Mixer::buffer_data`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmLayout {
    /// 8 (unsigned), 16 (signed LE) or 32 (float LE)
    pub bits: u16,
    pub channels: u16,
}

impl PcmLayout {
    pub fn new(bits: u16, channels: u16) -> Self {
        Self { bits, channels }
    }

    /// Size of one frame in bytes
    pub fn frame_size(&self) -> usize {
        (self.bits as usize / 8) * self.channels as usize
    }

    fn validate(&self) -> Result<(), MixerError> {
        if !matches!(self.bits, 8 | 16 | 32) || !matches!(self.channels, 1 | 2) {
            return Err(MixerError::InvalidValue);
        }
        Ok(())
    }
}

/// Audio buffer containing PCM data
#[derive(Debug, Default)]
pub struct MixerBuffer {
    /// Interleaved samples in [-1.0, 1.0]
    samples: Vec<f32>,
    channels: u16,
    frequency: u32,
    /// Width of the uploaded data, kept for property queries
    org_bits: u16,
    org_size: usize,
    /// Number of source queue slots referring to this buffer
    pub(crate) attached: u32,
}

impl MixerBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    /// Number of frames held (0 for a buffer that was never filled)
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached > 0
    }
}

/// Convert little-endian PCM bytes to `f32` samples.
///
/// The byte count must be a whole number of samples.
pub fn convert_pcm(data: &[u8], bits: u16) -> Result<Vec<f32>, MixerError> {
    let samples = match bits {
        8 => data
            .iter()
            .map(|&b| (b as i16 - 128) as f32 / 128.0)
            .collect(),
        16 => {
            if data.len() % 2 != 0 {
                return Err(MixerError::InvalidValue);
            }
            data.chunks_exact(2)
                .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / 32768.0)
                .collect()
        }
        32 => {
            if data.len() % 4 != 0 {
                return Err(MixerError::InvalidValue);
            }
            data.chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect()
        }
        _ => return Err(MixerError::InvalidValue),
    };
    Ok(samples)
}

impl Mixer {
    /// Generate new buffer objects
    pub fn gen_buffers(&mut self, n: usize) -> Vec<BufferId> {
        (0..n)
            .map(|_| self.gen_buffer())
            .collect()
    }

    /// Generate one buffer object
    pub fn gen_buffer(&mut self) -> BufferId {
        let (index, generation) = self.buffers.insert(MixerBuffer::new());
        BufferId::new(index, generation)
    }

    /// Delete buffer objects
    ///
    /// All buffers are validated before any is removed. A buffer still
    /// queued on a source cannot be deleted.
    pub fn delete_buffers(&mut self, ids: &[BufferId]) -> Result<(), MixerError> {
        for id in ids {
            match self.buffers.get(id.index(), id.generation()) {
                None => return self.fail(MixerError::InvalidName),
                Some(buf) if buf.is_attached() => {
                    return self.fail(MixerError::InvalidOperation)
                }
                Some(_) => {}
            }
        }

        for id in ids {
            self.buffers.remove(id.index(), id.generation());
        }
        Ok(())
    }

    /// Check if a handle names a live buffer
    pub fn is_buffer(&self, id: BufferId) -> bool {
        self.buffers.get(id.index(), id.generation()).is_some()
    }

    pub fn buffer(&self, id: BufferId) -> Option<&MixerBuffer> {
        self.buffers.get(id.index(), id.generation())
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Load PCM bytes into a buffer, converting to the internal format
    pub fn buffer_data(
        &mut self,
        id: BufferId,
        layout: PcmLayout,
        data: &[u8],
        freq: u32,
    ) -> Result<(), MixerError> {
        if let Err(e) = layout.validate() {
            return self.fail(e);
        }
        if data.is_empty() || data.len() % layout.frame_size() != 0 {
            return self.fail(MixerError::InvalidValue);
        }

        let samples = match convert_pcm(data, layout.bits) {
            Ok(samples) => samples,
            Err(e) => return self.fail(e),
        };
        self.store_samples(id, samples, layout, data.len(), freq)
    }

    /// Load already-decoded interleaved float samples into a buffer
    pub fn buffer_samples(
        &mut self,
        id: BufferId,
        channels: u16,
        samples: &[f32],
        freq: u32,
    ) -> Result<(), MixerError> {
        let layout = PcmLayout::new(32, channels);
        if let Err(e) = layout.validate() {
            return self.fail(e);
        }
        if samples.is_empty() || samples.len() % channels as usize != 0 {
            return self.fail(MixerError::InvalidValue);
        }
        let size = samples.len() * 4;
        self.store_samples(id, samples.to_vec(), layout, size, freq)
    }

    fn store_samples(
        &mut self,
        id: BufferId,
        samples: Vec<f32>,
        layout: PcmLayout,
        org_size: usize,
        freq: u32,
    ) -> Result<(), MixerError> {
        if freq == 0 {
            return self.fail(MixerError::InvalidValue);
        }

        let buf = match self.buffers.get_mut(id.index(), id.generation()) {
            Some(buf) => buf,
            None => return self.fail(MixerError::InvalidName),
        };
        if buf.is_attached() {
            return self.fail(MixerError::InvalidOperation);
        }

        buf.samples = samples;
        buf.channels = layout.channels;
        buf.frequency = freq;
        buf.org_bits = layout.bits;
        buf.org_size = org_size;
        Ok(())
    }

    /// Get a buffer property
    pub fn get_buffer_i(&mut self, id: BufferId, prop: BufferProp) -> Result<i32, MixerError> {
        let buf = match self.buffers.get(id.index(), id.generation()) {
            Some(buf) => buf,
            None => return self.fail(MixerError::InvalidName),
        };

        Ok(match prop {
            BufferProp::Frequency => buf.frequency as i32,
            BufferProp::Bits => buf.org_bits as i32,
            BufferProp::Channels => buf.channels as i32,
            BufferProp::Size => buf.org_size as i32,
        })
    }
}
