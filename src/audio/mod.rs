//! Audio device façade
//!
//! [`AudioDevice`] owns the mixer, the output driver and three registries:
//!
//! - raw PCM contexts, one per fixed mix channel ([`AudioContext`])
//! - fully decoded sounds ([`Sound`])
//! - index-addressed music streams refilled by
//!   [`AudioDevice::update_music_stream`]
//!
//! Every method is safe to call on a device that is not ready; those that
//! return handles give the invalid handle, the rest do nothing.
//!
//! ```no_run
//! use soundstage::{AudioConfig, AudioDevice};
//!
//! let mut device = AudioDevice::new(AudioConfig::default());
//! device.init();
//! let sound = device.load_sound("click.wav");
//! device.play_sound(sound);
//! ```

mod context;
mod device;
mod music;
mod sound;

pub use context::{AudioContext, PcmData};
pub use device::AudioDevice;
pub use sound::Sound;
