//! Ogg Vorbis decoder implementation
//!
//! Uses the `lewton` crate for pure Rust Ogg Vorbis decoding.

use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use lewton::inside_ogg::OggStreamReader;

use super::decoder::{DecodeError, DecodeResult, SoundDecoder};
use super::formats::AudioFormat;

/// Calculate the duration of an Ogg Vorbis stream by finding the last granule
/// position. The reader is left rewound to the start.
fn calculate_ogg_duration<R: Read + Seek>(data: &mut R, sample_rate: u32) -> f32 {
    let file_size = match data.seek(SeekFrom::End(0)) {
        Ok(pos) => pos,
        Err(_) => return 0.0,
    };

    // Search backwards for "OggS" page marker in the last 64KB
    let search_size = std::cmp::min(65536, file_size) as usize;
    let search_start = file_size - search_size as u64;

    if data.seek(SeekFrom::Start(search_start)).is_err() {
        return 0.0;
    }

    let mut buffer = vec![0u8; search_size];
    if data.read_exact(&mut buffer).is_err() {
        return 0.0;
    }
    let _ = data.seek(SeekFrom::Start(0));

    let last_granule = (0..buffer.len().saturating_sub(13))
        .rev()
        .filter(|&i| buffer[i..].starts_with(b"OggS"))
        .map(|i| {
            // Granule position is at offset 6-13 (8 bytes, little-endian)
            let mut granule = [0u8; 8];
            granule.copy_from_slice(&buffer[i + 6..i + 14]);
            u64::from_le_bytes(granule)
        })
        // -1 means no packet finishes on that page
        .find(|&granule| granule != u64::MAX);

    match last_granule {
        Some(granule) if sample_rate > 0 => granule as f32 / sample_rate as f32,
        _ => 0.0,
    }
}

/// Where the stream came from, kept so seeking can reopen it
enum OggOrigin {
    File(PathBuf),
    Bytes(Vec<u8>),
}

enum OggReader {
    File(OggStreamReader<BufReader<File>>),
    Bytes(OggStreamReader<Cursor<Vec<u8>>>),
}

impl OggReader {
    fn open(origin: &OggOrigin) -> DecodeResult<Self> {
        match origin {
            OggOrigin::File(path) => {
                let file = File::open(path)
                    .map_err(|e| DecodeError::NotFound(format!("{}: {}", path.display(), e)))?;
                OggStreamReader::new(BufReader::new(file))
                    .map(OggReader::File)
                    .map_err(|e| {
                        DecodeError::InvalidData(format!("Failed to open Ogg stream: {:?}", e))
                    })
            }
            OggOrigin::Bytes(data) => OggStreamReader::new(Cursor::new(data.clone()))
                .map(OggReader::Bytes)
                .map_err(|e| {
                    DecodeError::InvalidData(format!(
                        "Failed to open Ogg stream from bytes: {:?}",
                        e
                    ))
                }),
        }
    }

    fn sample_rate(&self) -> u32 {
        match self {
            OggReader::File(r) => r.ident_hdr.audio_sample_rate,
            OggReader::Bytes(r) => r.ident_hdr.audio_sample_rate,
        }
    }

    fn channels(&self) -> u8 {
        match self {
            OggReader::File(r) => r.ident_hdr.audio_channels,
            OggReader::Bytes(r) => r.ident_hdr.audio_channels,
        }
    }

    fn read_packet(&mut self) -> DecodeResult<Option<Vec<i16>>> {
        let packet = match self {
            OggReader::File(r) => r.read_dec_packet_itl(),
            OggReader::Bytes(r) => r.read_dec_packet_itl(),
        };
        packet.map_err(|e| DecodeError::DecoderError(format!("Ogg decode error: {:?}", e)))
    }
}

/// Ogg Vorbis decoder using lewton
pub struct OggDecoder {
    /// Sample frequency in Hz
    frequency: u32,
    /// Audio format (always 16 bit)
    format: AudioFormat,
    /// Total length in seconds
    length: f32,
    origin: Option<OggOrigin>,
    reader: Option<OggReader>,
    /// Decoded sample buffer (interleaved i16 samples)
    sample_buffer: Vec<i16>,
    /// Current position in sample buffer
    buffer_pos: usize,
    /// Current PCM frame position
    current_pcm: u64,
}

impl OggDecoder {
    /// Create a new Ogg Vorbis decoder
    pub fn new() -> Self {
        Self {
            frequency: 44100,
            format: AudioFormat::Stereo16,
            length: 0.0,
            origin: None,
            reader: None,
            sample_buffer: Vec::new(),
            buffer_pos: 0,
            current_pcm: 0,
        }
    }

    fn open_origin(&mut self, origin: OggOrigin) -> DecodeResult<()> {
        let reader = OggReader::open(&origin)?;
        let channels = reader.channels();
        self.format = match channels {
            1 => AudioFormat::Mono16,
            2 => AudioFormat::Stereo16,
            n => {
                return Err(DecodeError::UnsupportedFormat(format!(
                    "{} channel Ogg streams are not supported",
                    n
                )))
            }
        };
        self.frequency = reader.sample_rate();

        self.length = match &origin {
            OggOrigin::File(path) => match File::open(path) {
                Ok(mut file) => calculate_ogg_duration(&mut file, self.frequency),
                Err(_) => 0.0,
            },
            OggOrigin::Bytes(data) => {
                calculate_ogg_duration(&mut Cursor::new(data.as_slice()), self.frequency)
            }
        };

        self.sample_buffer.clear();
        self.buffer_pos = 0;
        self.current_pcm = 0;
        self.reader = Some(reader);
        self.origin = Some(origin);
        Ok(())
    }

    /// Decode the next packet and fill the sample buffer
    fn decode_next_packet(&mut self) -> DecodeResult<bool> {
        let reader = self.reader.as_mut().ok_or(DecodeError::NotInitialized)?;
        match reader.read_packet()? {
            Some(samples) => {
                self.sample_buffer = samples;
                self.buffer_pos = 0;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn rewind(&mut self) -> DecodeResult<()> {
        let origin = self.origin.as_ref().ok_or(DecodeError::NotInitialized)?;
        let reader = OggReader::open(origin)
            .map_err(|e| DecodeError::SeekFailed(format!("Failed to rewind: {}", e)))?;
        self.reader = Some(reader);
        self.sample_buffer.clear();
        self.buffer_pos = 0;
        self.current_pcm = 0;
        Ok(())
    }
}

impl Default for OggDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SoundDecoder for OggDecoder {
    fn name(&self) -> &'static str {
        "Ogg Vorbis"
    }

    fn open(&mut self, path: &Path) -> DecodeResult<()> {
        self.open_origin(OggOrigin::File(path.to_path_buf()))
    }

    fn open_from_bytes(&mut self, data: &[u8], name: &str) -> DecodeResult<()> {
        self.open_origin(OggOrigin::Bytes(data.to_vec()))?;
        log::debug!("Ogg stream '{}' opened from memory", name);
        Ok(())
    }

    fn close(&mut self) {
        self.reader = None;
        self.origin = None;
        self.sample_buffer.clear();
        self.buffer_pos = 0;
        self.current_pcm = 0;
    }

    fn decode(&mut self, buf: &mut [u8]) -> DecodeResult<usize> {
        if self.reader.is_none() {
            return Err(DecodeError::NotInitialized);
        }

        let channels = self.format.channels();
        let frame_bytes = self.format.bytes_per_sample();
        let limit = buf.len() - buf.len() % frame_bytes;
        let mut bytes_written = 0;

        while bytes_written < limit {
            if self.buffer_pos >= self.sample_buffer.len() {
                if !self.decode_next_packet()? {
                    if bytes_written == 0 {
                        return Err(DecodeError::EndOfFile);
                    }
                    break;
                }
                continue;
            }

            let samples_available = self.sample_buffer.len() - self.buffer_pos;
            let samples_to_copy = samples_available.min((limit - bytes_written) / 2);

            let src = &self.sample_buffer[self.buffer_pos..self.buffer_pos + samples_to_copy];
            let dst = &mut buf[bytes_written..bytes_written + samples_to_copy * 2];
            for (out, sample) in dst.chunks_exact_mut(2).zip(src) {
                out.copy_from_slice(&sample.to_le_bytes());
            }

            self.buffer_pos += samples_to_copy;
            bytes_written += samples_to_copy * 2;
            self.current_pcm += (samples_to_copy / channels) as u64;
        }

        Ok(bytes_written)
    }

    fn seek(&mut self, pcm_pos: u32) -> DecodeResult<u32> {
        // lewton has no sample-accurate seeking: rewind, then decode and discard
        let target_pcm = pcm_pos as u64;
        if target_pcm <= self.current_pcm {
            self.rewind()?;
            if target_pcm == 0 {
                return Ok(0);
            }
        }

        let channels = self.format.channels() as u64;
        while self.current_pcm < target_pcm {
            let buffered_frames = (self.sample_buffer.len() - self.buffer_pos) as u64 / channels;
            if buffered_frames == 0 {
                match self.decode_next_packet() {
                    Ok(true) => continue,
                    Ok(false) => break,
                    Err(e) => {
                        return Err(DecodeError::SeekFailed(format!(
                            "Seek failed during skip: {}",
                            e
                        )))
                    }
                }
            }

            let skip = buffered_frames.min(target_pcm - self.current_pcm);
            self.buffer_pos += (skip * channels) as usize;
            self.current_pcm += skip;
        }

        Ok(self.current_pcm as u32)
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

#[cfg(test)]
mod tests {
    use super::*;

    fn ogg_page(granule: u64) -> Vec<u8> {
        let mut page = b"OggS".to_vec();
        page.extend_from_slice(&[0, 0]);
        page.extend_from_slice(&granule.to_le_bytes());
        page.extend_from_slice(&[0u8; 13]);
        page
    }

    /// Silent Vorbis fixtures: 8000 Hz, 4096 frames, 256-sample blocks
    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests/data")
            .join(name)
    }

    fn decode_all(decoder: &mut OggDecoder) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 1000];
        loop {
            match decoder.decode(&mut buf) {
                Ok(n) => out.extend_from_slice(&buf[..n]),
                Err(DecodeError::EndOfFile) => break,
                Err(e) => panic!("decode failed: {}", e),
            }
        }
        out
    }

    #[test]
    fn test_decode_mono_file() {
        let mut decoder = OggDecoder::new();
        decoder.open(&fixture("silence_mono.ogg")).unwrap();
        assert_eq!(decoder.frequency(), 8000);
        assert_eq!(decoder.format(), AudioFormat::Mono16);
        assert!((decoder.length() - 0.512).abs() < 1e-6);

        let pcm = decode_all(&mut decoder);
        assert_eq!(pcm.len(), 4096 * 2);
        assert!(pcm.iter().all(|&b| b == 0));
        assert!(matches!(decoder.decode(&mut [0u8; 64]), Err(DecodeError::EndOfFile)));
    }

    #[test]
    fn test_decode_stereo_from_bytes() {
        let bytes = std::fs::read(fixture("silence_stereo.ogg")).unwrap();
        let mut decoder = OggDecoder::new();
        decoder.open_from_bytes(&bytes, "silence").unwrap();
        assert_eq!(decoder.format(), AudioFormat::Stereo16);
        assert!((decoder.length() - 0.512).abs() < 1e-6);
        assert_eq!(decode_all(&mut decoder).len(), 4096 * 4);
    }

    #[test]
    fn test_seek_rewinds_and_skips() {
        let mut decoder = OggDecoder::new();
        decoder.open(&fixture("silence_mono.ogg")).unwrap();
        decode_all(&mut decoder);

        assert_eq!(decoder.seek(0).unwrap(), 0);
        assert_eq!(decode_all(&mut decoder).len(), 4096 * 2);

        assert_eq!(decoder.seek(1000).unwrap(), 1000);
        assert_eq!(decode_all(&mut decoder).len(), (4096 - 1000) * 2);

        // Past the end stops at the last frame
        assert_eq!(decoder.seek(5000).unwrap(), 4096);
    }

    #[test]
    fn test_ogg_decoder_new() {
        let decoder = OggDecoder::new();
        assert_eq!(decoder.name(), "Ogg Vorbis");
        assert_eq!(decoder.frequency(), 44100);
        assert_eq!(decoder.format(), AudioFormat::Stereo16);
        assert_eq!(decoder.length(), 0.0);
    }

    #[test]
    fn test_ogg_decoder_decode_not_opened() {
        let mut decoder = OggDecoder::new();
        let mut buf = [0u8; 1024];
        let result = decoder.decode(&mut buf);
        assert!(matches!(result, Err(DecodeError::NotInitialized)));
    }

    #[test]
    fn test_ogg_decoder_open_nonexistent() {
        let mut decoder = OggDecoder::new();
        let result = decoder.open(Path::new("/nonexistent/file.ogg"));
        assert!(matches!(result, Err(DecodeError::NotFound(_))));
    }

    #[test]
    fn test_ogg_decoder_open_garbage() {
        let mut decoder = OggDecoder::new();
        let result = decoder.open_from_bytes(b"definitely not vorbis", "garbage");
        assert!(matches!(result, Err(DecodeError::InvalidData(_))));
    }

    #[test]
    fn test_ogg_decoder_seek_not_opened() {
        let mut decoder = OggDecoder::new();
        assert!(matches!(decoder.seek(0), Err(DecodeError::NotInitialized)));
    }

    #[test]
    fn test_ogg_decoder_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<OggDecoder>();
    }

    #[test]
    fn test_duration_uses_last_granule() {
        let mut data = ogg_page(0);
        data.extend(ogg_page(22050));
        data.extend(ogg_page(88200));
        let mut cursor = Cursor::new(data);
        assert_eq!(calculate_ogg_duration(&mut cursor, 44100), 2.0);
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn test_duration_skips_unfinished_pages() {
        let mut data = ogg_page(44100);
        data.extend(ogg_page(u64::MAX));
        let mut cursor = Cursor::new(data);
        assert_eq!(calculate_ogg_duration(&mut cursor, 44100), 1.0);
    }

    #[test]
    fn test_duration_without_pages() {
        let mut cursor = Cursor::new(vec![0u8; 64]);
        assert_eq!(calculate_ogg_duration(&mut cursor, 44100), 0.0);
        let mut cursor = Cursor::new(ogg_page(1000));
        assert_eq!(calculate_ogg_duration(&mut cursor, 0), 0.0);
    }
}
