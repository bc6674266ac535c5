//! WAV decoder implementation
//!
//! Decodes WAV (RIFF WAVE) audio files. Supports:
//! - 8-bit and 16-bit PCM
//! - Mono and stereo
//! - Any sample rate
//!
//! Also provides [`write_wav`] for producing minimal PCM WAVE files.

use std::io::{Cursor, Read, Seek, SeekFrom};

use super::decoder::{DecodeError, DecodeResult, SoundDecoder};
use super::formats::AudioFormat;

// WAV format constants (little-endian IDs)
const RIFF_ID: u32 = 0x46464952; // "RIFF"
const WAVE_ID: u32 = 0x45564157; // "WAVE"
const FMT_ID: u32 = 0x20746d66; // "fmt "
const DATA_ID: u32 = 0x61746164; // "data"

const WAVE_FORMAT_PCM: u16 = 1;

/// WAV format chunk
#[derive(Debug, Default, Clone, Copy)]
struct WavFormatHeader {
    format: u16,
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
}

impl WavFormatHeader {
    fn frame_size(&self) -> usize {
        (self.bits_per_sample as usize / 8) * self.channels as usize
    }
}

/// WAV chunk header
#[derive(Debug, Default)]
struct WavChunkHeader {
    id: u32,
    size: u32,
}

/// WAV decoder
pub struct WavDecoder {
    /// Sample frequency in Hz
    frequency: u32,
    /// Audio format (mono/stereo, 8/16 bit)
    format: AudioFormat,
    /// Total length in seconds
    length: f32,
    /// Audio data buffer
    data: Vec<u8>,
    /// Current read position in data
    data_pos: usize,
    fmt_header: WavFormatHeader,
}

impl WavDecoder {
    /// Create a new WAV decoder
    pub fn new() -> Self {
        Self {
            frequency: 22050,
            format: AudioFormat::Stereo16,
            length: 0.0,
            data: Vec::new(),
            data_pos: 0,
            fmt_header: WavFormatHeader::default(),
        }
    }

    fn read_le_u16(cursor: &mut Cursor<&[u8]>) -> DecodeResult<u16> {
        let mut buf = [0u8; 2];
        cursor
            .read_exact(&mut buf)
            .map_err(|e| DecodeError::InvalidData(format!("Failed to read u16: {}", e)))?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_le_u32(cursor: &mut Cursor<&[u8]>) -> DecodeResult<u32> {
        let mut buf = [0u8; 4];
        cursor
            .read_exact(&mut buf)
            .map_err(|e| DecodeError::InvalidData(format!("Failed to read u32: {}", e)))?;
        Ok(u32::from_le_bytes(buf))
    }

    fn parse_file_header(cursor: &mut Cursor<&[u8]>) -> DecodeResult<()> {
        let id = Self::read_le_u32(cursor)?;
        let _size = Self::read_le_u32(cursor)?;
        let format = Self::read_le_u32(cursor)?;

        if id != RIFF_ID {
            return Err(DecodeError::InvalidData("Not a RIFF file".to_string()));
        }
        if format != WAVE_ID {
            return Err(DecodeError::InvalidData("Not a WAVE file".to_string()));
        }
        Ok(())
    }

    fn parse_chunk_header(cursor: &mut Cursor<&[u8]>) -> DecodeResult<WavChunkHeader> {
        let id = Self::read_le_u32(cursor)?;
        let size = Self::read_le_u32(cursor)?;
        Ok(WavChunkHeader { id, size })
    }

    fn skip(cursor: &mut Cursor<&[u8]>, bytes: u64) -> DecodeResult<()> {
        cursor
            .seek(SeekFrom::Current(bytes as i64))
            .map_err(|e| DecodeError::InvalidData(format!("Failed to skip chunk: {}", e)))?;
        Ok(())
    }

    fn parse_format_header(
        cursor: &mut Cursor<&[u8]>,
        size: u32,
    ) -> DecodeResult<WavFormatHeader> {
        if size < 16 {
            return Err(DecodeError::InvalidData(
                "Format chunk too small".to_string(),
            ));
        }

        let format = Self::read_le_u16(cursor)?;
        let channels = Self::read_le_u16(cursor)?;
        let sample_rate = Self::read_le_u32(cursor)?;
        let _byte_rate = Self::read_le_u32(cursor)?;
        let _block_align = Self::read_le_u16(cursor)?;
        let bits_per_sample = Self::read_le_u16(cursor)?;

        // Extra format bytes, plus the pad byte of odd-sized chunks
        Self::skip(cursor, (size - 16) as u64 + (size & 1) as u64)?;

        if format != WAVE_FORMAT_PCM {
            return Err(DecodeError::UnsupportedFormat(format!(
                "WAV format {} (only PCM supported)",
                format
            )));
        }
        if channels != 1 && channels != 2 {
            return Err(DecodeError::UnsupportedFormat(format!(
                "{} channels",
                channels
            )));
        }
        if bits_per_sample != 8 && bits_per_sample != 16 {
            return Err(DecodeError::UnsupportedFormat(format!(
                "{} bits per sample",
                bits_per_sample
            )));
        }
        if sample_rate == 0 {
            return Err(DecodeError::InvalidData("Zero sample rate".to_string()));
        }

        Ok(WavFormatHeader {
            format,
            channels,
            sample_rate,
            bits_per_sample,
        })
    }
}

impl Default for WavDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SoundDecoder for WavDecoder {
    fn name(&self) -> &'static str {
        "Wave"
    }

    fn open(&mut self, path: &std::path::Path) -> DecodeResult<()> {
        let data = std::fs::read(path)
            .map_err(|e| DecodeError::NotFound(format!("{}: {}", path.display(), e)))?;

        self.open_from_bytes(&data, &path.to_string_lossy())
    }

    fn open_from_bytes(&mut self, data: &[u8], name: &str) -> DecodeResult<()> {
        let mut cursor = Cursor::new(data);
        Self::parse_file_header(&mut cursor)?;

        let mut fmt_header = None;
        let mut data_range = None;

        while (cursor.position() as usize) + 8 <= data.len() {
            let chunk = Self::parse_chunk_header(&mut cursor)?;

            match chunk.id {
                FMT_ID => {
                    fmt_header = Some(Self::parse_format_header(&mut cursor, chunk.size)?);
                }
                DATA_ID => {
                    let start = cursor.position() as usize;
                    let end = (start + chunk.size as usize).min(data.len());
                    data_range = Some(start..end);
                    break;
                }
                _ => {
                    log::debug!("Skipping WAV chunk {:08x} in '{}'", chunk.id, name);
                    Self::skip(&mut cursor, chunk.size as u64 + (chunk.size & 1) as u64)?;
                }
            }
        }

        let fmt_header =
            fmt_header.ok_or_else(|| DecodeError::InvalidData("No format chunk found".to_string()))?;
        let data_range = data_range
            .filter(|r| !r.is_empty())
            .ok_or_else(|| DecodeError::InvalidData("No data chunk found".to_string()))?;

        // Drop a trailing partial frame
        let frame_size = fmt_header.frame_size();
        let len = data_range.len() - data_range.len() % frame_size;
        self.data = data[data_range.start..data_range.start + len].to_vec();
        self.data_pos = 0;

        self.fmt_header = fmt_header;
        self.frequency = fmt_header.sample_rate;
        self.format = AudioFormat::from_parts(fmt_header.channels, fmt_header.bits_per_sample)
            .unwrap_or_default();
        self.length = (self.data.len() / frame_size) as f32 / self.frequency as f32;

        Ok(())
    }

    fn close(&mut self) {
        self.data.clear();
        self.data_pos = 0;
    }

    fn decode(&mut self, buf: &mut [u8]) -> DecodeResult<usize> {
        if self.data.is_empty() {
            return Err(DecodeError::NotInitialized);
        }
        if self.data_pos >= self.data.len() {
            return Err(DecodeError::EndOfFile);
        }

        let frame_size = self.fmt_header.frame_size();
        let available = self.data.len() - self.data_pos;
        let to_copy = (buf.len() - buf.len() % frame_size).min(available);

        buf[..to_copy].copy_from_slice(&self.data[self.data_pos..self.data_pos + to_copy]);
        self.data_pos += to_copy;
        Ok(to_copy)
    }

    fn seek(&mut self, pcm_pos: u32) -> DecodeResult<u32> {
        if self.data.is_empty() {
            return Err(DecodeError::NotInitialized);
        }

        let bytes_per_frame = self.fmt_header.frame_size();
        let byte_pos = pcm_pos as usize * bytes_per_frame;

        if byte_pos >= self.data.len() {
            self.data_pos = self.data.len();
            return Ok((self.data.len() / bytes_per_frame) as u32);
        }

        self.data_pos = byte_pos;
        Ok(pcm_pos)
    }

    fn frequency(&self) -> u32 {
        self.frequency
    }

    fn format(&self) -> AudioFormat {
        self.format
    }

    fn length(&self) -> f32 {
        self.length
    }
}

/// Build a minimal PCM RIFF WAVE file around `data`
pub fn write_wav(format: AudioFormat, sample_rate: u32, data: &[u8]) -> Vec<u8> {
    let channels = format.channels() as u16;
    let bits = format.bits();
    let block_align = format.bytes_per_sample() as u16;
    let byte_rate = sample_rate * block_align as u32;
    let pad = data.len() & 1;

    let mut out = Vec::with_capacity(44 + data.len() + pad);
    out.extend_from_slice(&RIFF_ID.to_le_bytes());
    out.extend_from_slice(&((36 + data.len() + pad) as u32).to_le_bytes());
    out.extend_from_slice(&WAVE_ID.to_le_bytes());

    out.extend_from_slice(&FMT_ID.to_le_bytes());
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&WAVE_FORMAT_PCM.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&bits.to_le_bytes());

    out.extend_from_slice(&DATA_ID.to_le_bytes());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
    if pad == 1 {
        out.push(0);
    }
    out
}
