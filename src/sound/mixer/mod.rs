// mod.rs - Audio mixer module

//! OpenAL-like audio mixing engine.
//!
//! Buffers hold PCM, sources queue buffers and carry gain, pitch, looping
//! and playback state, and [`Mixer::mix`] resamples every playing source
//! into one stereo `f32` stream.
//!
//! # Architecture
//!
//! - `types` - Core types, error codes and handle pools
//! - `buffer` - Audio buffer management
//! - `source` - Audio source management
//! - `resample` - Resampling algorithms
//! - `mix` - Main mixing logic
//!
//! # Example
//!
//! ```rust
//! use soundstage::sound::mixer::{Mixer, MixerQuality};
//!
//! let mut mixer = Mixer::new(44100, MixerQuality::Medium).unwrap();
//! let buf = mixer.gen_buffers(1)[0];
//! mixer.buffer_samples(buf, 1, &[0.5; 64], 22050).unwrap();
//!
//! let src = mixer.gen_sources(1)[0];
//! mixer.set_source_buffer(src, Some(buf)).unwrap();
//! mixer.source_play(src).unwrap();
//!
//! let mut out = [0.0f32; 256];
//! assert_eq!(mixer.mix(&mut out), 128);
//! ```

pub mod buffer;
pub mod mix;
pub mod resample;
pub mod source;
pub mod types;

// Re-export common types for convenience
pub use types::{BufferId, MixerError, MixerQuality, SourceId, SourceState, MAX_GAIN, MIN_PITCH};

pub use buffer::{convert_pcm, BufferProp, MixerBuffer, PcmLayout};
pub use mix::{Mixer, OUTPUT_CHANNELS};
pub use source::MixerSource;
