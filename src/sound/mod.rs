//! Sound decoding, mixing and output
//!
//! # Architecture
//!
//! - `SoundDecoder` trait defines the decoder interface
//! - `AudioFormat` specifies the decoder output format
//! - Individual decoder implementations (Ogg, Wav)
//! - `wave` holds fully decoded PCM, `rres` reads packed resource files
//! - `mixer` is the OpenAL-like source/buffer engine
//! - `output` drives the mixer from a rodio stream or leaves it to the caller

pub mod decoder;
pub mod formats;
pub mod mixer;
pub mod ogg;
pub mod output;
pub mod rres;
pub mod wav;
pub mod wave;

pub use decoder::{decoder_for_path, open_decoder, DecodeError, DecodeResult, SoundDecoder};
pub use formats::AudioFormat;
pub use ogg::OggDecoder;
pub use output::{AudioOutput, OutputDriver, OutputError};
pub use rres::RresError;
pub use wav::WavDecoder;
pub use wave::Wave;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        let _format = AudioFormat::default();
        let _decoder = WavDecoder::new();
        let _driver = OutputDriver::default();
    }
}
