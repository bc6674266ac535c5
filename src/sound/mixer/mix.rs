// mix.rs - Main mixing logic

//! Main audio mixing logic for the mixer.
//!
//! [`Mixer`] owns the buffer and source pools and combines every playing
//! source into one interleaved stereo `f32` stream. It is a plain value:
//! callers that share it with an output thread wrap it in a lock.

use crate::sound::mixer::buffer::MixerBuffer;
use crate::sound::mixer::resample::resample;
use crate::sound::mixer::source::MixerSource;
use crate::sound::mixer::types::*;

/// Number of interleaved channels produced by [`Mixer::mix`]
pub const OUTPUT_CHANNELS: usize = 2;

/// Mixer state structure
pub struct Mixer {
    pub(crate) last_error: MixerError,
    frequency: u32,
    quality: MixerQuality,
    master_gain: f32,
    pub(crate) buffers: Pool<MixerBuffer>,
    pub(crate) sources: Pool<MixerSource>,
}

impl std::fmt::Debug for Mixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mixer")
            .field("frequency", &self.frequency)
            .field("quality", &self.quality)
            .field("master_gain", &self.master_gain)
            .field("buffers", &self.buffers.len())
            .field("sources", &self.sources.len())
            .finish()
    }
}

impl Mixer {
    /// Create a mixer producing stereo output at `frequency` Hz
    pub fn new(frequency: u32, quality: MixerQuality) -> Result<Self, MixerError> {
        if frequency == 0 {
            return Err(MixerError::InvalidValue);
        }
        Ok(Mixer {
            last_error: MixerError::NoError,
            frequency,
            quality,
            master_gain: 1.0,
            buffers: Pool::new(),
            sources: Pool::new(),
        })
    }

    /// Record `error` as the sticky last error and return it
    pub(crate) fn fail<T>(&mut self, error: MixerError) -> Result<T, MixerError> {
        self.last_error = error;
        Err(error)
    }

    /// Get and clear the last error
    pub fn get_error(&mut self) -> MixerError {
        std::mem::replace(&mut self.last_error, MixerError::NoError)
    }

    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    pub fn quality(&self) -> MixerQuality {
        self.quality
    }

    pub fn set_quality(&mut self, quality: MixerQuality) {
        self.quality = quality;
    }

    pub fn master_gain(&self) -> f32 {
        self.master_gain
    }

    pub fn set_master_gain(&mut self, gain: f32) -> Result<(), MixerError> {
        if !gain.is_finite() || !(0.0..=MAX_GAIN).contains(&gain) {
            return self.fail(MixerError::InvalidValue);
        }
        self.master_gain = gain;
        Ok(())
    }

    /// Delete every source and buffer. Outstanding handles become stale.
    pub fn reset(&mut self) {
        self.sources.clear();
        self.buffers.clear();
        self.last_error = MixerError::NoError;
    }

    /// Number of sources currently playing
    pub fn playing_sources(&self) -> usize {
        self.sources
            .handles()
            .into_iter()
            .filter(|&(i, g)| {
                self.sources
                    .get(i, g)
                    .is_some_and(|s| s.state == SourceState::Playing)
            })
            .count()
    }

    /// Mix all playing sources into `out` (interleaved stereo)
    ///
    /// Returns the number of frames written. A trailing partial frame in
    /// `out` is zeroed and not counted.
    pub fn mix(&mut self, out: &mut [f32]) -> usize {
        out.fill(0.0);
        let frames = out.len() / OUTPUT_CHANNELS;

        let mixer_freq = self.frequency as f64;
        let quality = self.quality;
        let buffers = &self.buffers;
        for (_, _, src) in self.sources.iter_mut() {
            if src.state == SourceState::Playing {
                mix_source(src, buffers, mixer_freq, quality, &mut out[..frames * OUTPUT_CHANNELS]);
            }
        }

        let master = self.master_gain;
        for sample in out.iter_mut() {
            *sample = (*sample * master).clamp(-1.0, 1.0);
        }
        frames
    }

    /// Advance sources by `frames` output frames without producing audio
    pub fn mix_fake(&mut self, frames: usize) {
        let mut scratch = vec![0.0f32; frames * OUTPUT_CHANNELS];
        self.mix(&mut scratch);
    }
}

/// Mix one playing source into the output block
fn mix_source(
    src: &mut MixerSource,
    buffers: &Pool<MixerBuffer>,
    mixer_freq: f64,
    quality: MixerQuality,
    out: &mut [f32],
) {
    for frame in out.chunks_exact_mut(OUTPUT_CHANNELS) {
        if src.state != SourceState::Playing {
            break;
        }

        let buf_id = match src.queue.get(src.current) {
            Some(id) => *id,
            None => {
                // No buffer queued - stop playback
                src.state = SourceState::Stopped;
                break;
            }
        };

        let buf = match buffers.get(buf_id.index(), buf_id.generation()) {
            Some(buf) if buf.frames() > 0 => buf,
            _ => {
                src.advance(0);
                continue;
            }
        };

        let samples = buf.samples();
        let channels = buf.channels() as usize;
        let (left, right) = if channels == 1 {
            let s = resample(quality, samples, 1, src.position, 0);
            (s, s)
        } else {
            (
                resample(quality, samples, 2, src.position, 0),
                resample(quality, samples, 2, src.position, 1),
            )
        };

        frame[0] += left * src.gain;
        frame[1] += right * src.gain;

        let step = buf.frequency() as f64 / mixer_freq * src.pitch as f64;
        src.position += step;

        // One step may cross several short buffers
        let mut buf_frames = buf.frames();
        while buf_frames > 0
            && src.position >= buf_frames as f64
            && src.state == SourceState::Playing
        {
            src.position -= buf_frames as f64;
            src.advance(buf_frames);
            buf_frames = src
                .queue
                .get(src.current)
                .and_then(|id| buffers.get(id.index(), id.generation()))
                .map_or(0, MixerBuffer::frames);
        }
        if src.state != SourceState::Playing {
            src.position = 0.0;
        }
    }
}
