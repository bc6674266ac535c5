//! Sound decoder trait definition
//!
//! Defines the `SoundDecoder` trait that all audio decoders implement, and
//! the extension based lookup used to pick a decoder for a file.

use std::path::Path;

use super::formats::AudioFormat;
use super::ogg::OggDecoder;
use super::wav::WavDecoder;

/// Error type for decoder operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// File not found
    #[error("File not found: {0}")]
    NotFound(String),
    /// Invalid or corrupted audio data
    #[error("Invalid audio data: {0}")]
    InvalidData(String),
    /// Unsupported audio format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    /// I/O error
    #[error("I/O error: {0}")]
    IoError(String),
    /// Decoder not initialized
    #[error("Decoder not initialized")]
    NotInitialized,
    /// End of file reached
    #[error("End of file")]
    EndOfFile,
    /// Seek failed
    #[error("Seek failed: {0}")]
    SeekFailed(String),
    /// Generic decoder error
    #[error("Decoder error: {0}")]
    DecoderError(String),
}

impl From<std::io::Error> for DecodeError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => DecodeError::NotFound(e.to_string()),
            _ => DecodeError::IoError(e.to_string()),
        }
    }
}

/// Result type for decoder operations
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Sound decoder trait
///
/// Decoders produce little-endian PCM in their reported [`AudioFormat`].
pub trait SoundDecoder: Send {
    /// Returns the decoder name (e.g., "Ogg Vorbis", "WAV")
    fn name(&self) -> &'static str;

    /// Open an audio file for decoding
    fn open(&mut self, path: &Path) -> DecodeResult<()>;

    /// Open an audio file from raw bytes
    ///
    /// `name` is only used for logging.
    fn open_from_bytes(&mut self, data: &[u8], name: &str) -> DecodeResult<()>;

    /// Close the currently open audio file
    fn close(&mut self);

    /// Decode audio data into the provided buffer
    ///
    /// Returns the number of bytes written, always a whole number of
    /// frames. `Err(DecodeError::EndOfFile)` once the stream is exhausted.
    fn decode(&mut self, buf: &mut [u8]) -> DecodeResult<usize>;

    /// Seek to a PCM frame position, returning the position reached
    fn seek(&mut self, pcm_pos: u32) -> DecodeResult<u32>;

    /// Returns the sample frequency in Hz
    fn frequency(&self) -> u32;

    /// Returns the audio format
    fn format(&self) -> AudioFormat;

    /// Returns the total length in seconds
    fn length(&self) -> f32;
}

/// Create a decoder for `path` based on its extension (case-insensitive)
pub fn decoder_for_path(path: &Path) -> DecodeResult<Box<dyn SoundDecoder>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "ogg" => Ok(Box::new(OggDecoder::new())),
        "wav" => Ok(Box::new(WavDecoder::new())),
        _ => Err(DecodeError::UnsupportedFormat(format!(
            "no decoder for '{}'",
            path.display()
        ))),
    }
}

/// Pick a decoder for `path` and open the file with it
pub fn open_decoder(path: &Path) -> DecodeResult<Box<dyn SoundDecoder>> {
    let mut decoder = decoder_for_path(path)?;
    decoder.open(path)?;
    log::debug!(
        "{} decoder opened '{}': {} Hz {:?}, {:.2}s",
        decoder.name(),
        path.display(),
        decoder.frequency(),
        decoder.format(),
        decoder.length()
    );
    Ok(decoder)
}
