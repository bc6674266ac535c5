//! Incrementally decoded music streams
//!
//! A music stream owns a decoder and a 16-bit context on the lowest free
//! mix channel. [`AudioDevice::update_music_stream`] tops up every
//! stream's context from its decoder; nothing decodes in the background.

use std::path::Path;

use crate::audio::context::{AudioContext, ContextRegistry, PcmData, StreamFormat};
use crate::audio::device::AudioDevice;
use crate::error::{AudioError, Result};
use crate::sound::mixer::{Mixer, MixerError};
use crate::sound::{open_decoder, DecodeError, SoundDecoder};

pub(crate) struct MusicStream {
    decoder: Box<dyn SoundDecoder>,
    context: AudioContext,
    name: String,
    looping: bool,
    paused: bool,
    /// Decoder reached its end and will not be rewound
    at_end: bool,
    /// Seeked back to the start without decoding anything since
    rewound: bool,
    /// Decoded samples the context has not accepted yet
    pending: Vec<i16>,
    scratch: Vec<u8>,
    bits: u16,
    sample_rate: u32,
    length: f32,
}

fn to_i16(bytes: &[u8], bits: u16) -> Vec<i16> {
    if bits == 8 {
        bytes.iter().map(|&b| (b as i16 - 128) << 8).collect()
    } else {
        bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect()
    }
}

impl MusicStream {
    fn new(decoder: Box<dyn SoundDecoder>, context: AudioContext, name: String, chunk_frames: usize) -> Self {
        let format = decoder.format();
        Self {
            context,
            name,
            looping: true,
            paused: false,
            at_end: false,
            rewound: false,
            pending: Vec::new(),
            scratch: vec![0; chunk_frames.max(1) * format.bytes_per_sample()],
            bits: format.bits(),
            sample_rate: decoder.frequency(),
            length: decoder.length(),
            decoder,
        }
    }

    fn decode_chunk(&mut self) {
        match self.decoder.decode(&mut self.scratch) {
            Ok(n) if n > 0 => {
                self.pending = to_i16(&self.scratch[..n], self.bits);
                self.rewound = false;
            }
            Ok(_) | Err(DecodeError::EndOfFile) => {
                if !self.looping || self.rewound {
                    self.at_end = true;
                    return;
                }
                match self.decoder.seek(0) {
                    Ok(_) => {
                        log::debug!("Music stream '{}' looping", self.name);
                        self.rewound = true;
                    }
                    Err(e) => {
                        log::warn!("Music stream '{}' cannot loop: {}", self.name, e);
                        self.at_end = true;
                    }
                }
            }
            Err(e) => {
                log::warn!("Music stream '{}' decode error: {}", self.name, e);
                self.at_end = true;
            }
        }
    }

    /// Decode and push until the context is full or the decoder is done
    fn refill(&mut self, mixer: &mut Mixer, contexts: &mut ContextRegistry) {
        loop {
            if self.pending.is_empty() {
                if self.at_end {
                    return;
                }
                self.decode_chunk();
                continue;
            }

            let offered = self.pending.len();
            let accepted =
                contexts.update(mixer, self.context, Some(PcmData::I16(&self.pending)), offered);
            self.pending.drain(..accepted);
            if accepted < offered {
                return;
            }
        }
    }

    fn time_played(&self, contexts: &ContextRegistry, mixer: &Mixer) -> f32 {
        let frames = contexts.frames_played(mixer, self.context);
        let secs = frames as f64 / self.sample_rate.max(1) as f64;
        let length = self.length as f64;
        let secs = if length <= 0.0 {
            secs
        } else if self.looping {
            secs % length
        } else {
            secs.min(length)
        };
        secs as f32
    }
}

/// Index-addressed music stream slots
pub(crate) struct MusicRegistry {
    streams: Vec<Option<MusicStream>>,
}

impl MusicRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            streams: (0..capacity).map(|_| None).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.streams.len()
    }

    pub fn clear(&mut self) {
        for stream in self.streams.iter_mut() {
            *stream = None;
        }
    }

    pub fn active_count(&self) -> usize {
        self.streams.iter().filter(|s| s.is_some()).count()
    }

    fn get(&self, index: usize) -> Option<&MusicStream> {
        self.streams.get(index)?.as_ref()
    }

    fn get_mut(&mut self, index: usize) -> Option<&mut MusicStream> {
        self.streams.get_mut(index)?.as_mut()
    }

    fn lowest_free(&self) -> Option<usize> {
        self.streams.iter().position(Option::is_none)
    }

    fn lowest_active(&self) -> Option<usize> {
        self.streams.iter().position(Option::is_some)
    }

    /// Drop the stream bound to mix `channel`, returning its index
    pub fn release_channel(&mut self, channel: u8) -> Option<usize> {
        let index = self
            .streams
            .iter()
            .position(|s| s.as_ref().is_some_and(|s| s.context.channel() == channel))?;
        self.streams[index] = None;
        Some(index)
    }
}

impl AudioDevice {
    /// Start streaming `path` on a free index and mix channel
    ///
    /// Returns `None` (after logging) when the file cannot be opened or
    /// every stream slot or mix channel is taken.
    pub fn play_music_stream(&mut self, path: impl AsRef<Path>) -> Option<usize> {
        let path = path.as_ref();
        match self.try_play_music_stream(path) {
            Ok(index) => Some(index),
            Err(e) => {
                log::warn!("Failed to play music stream '{}': {}", path.display(), e);
                None
            }
        }
    }

    pub fn try_play_music_stream(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let shared = self.shared_mixer()?;
        let index = self
            .music
            .lowest_free()
            .ok_or(AudioError::NoFreeStream(self.music.capacity()))?;
        let channel = self
            .contexts
            .lowest_free_channel()
            .ok_or(AudioError::NoFreeChannel)?;

        let decoder = open_decoder(path)?;
        let format = StreamFormat {
            sample_rate: decoder.frequency(),
            channels: decoder.format().channels() as u16,
            floating_point: false,
        };

        let mut mixer = shared.lock();
        let context = self.contexts.open(
            &mut mixer,
            channel,
            format,
            self.config.stream_buffers,
            self.config.stream_buffer_frames,
        )?;

        let name = path.display().to_string();
        let mut stream = MusicStream::new(decoder, context, name, self.config.stream_buffer_frames);
        stream.refill(&mut mixer, &mut self.contexts);
        if stream.at_end && self.contexts.is_idle(&mut mixer, context) {
            self.contexts.close(&mut mixer, context);
            return Err(DecodeError::InvalidData(format!("'{}' holds no audio", path.display())).into());
        }

        log::info!(
            "Music stream {} playing '{}' on mix channel {} ({} Hz, {:.1}s)",
            index,
            stream.name,
            channel,
            stream.sample_rate,
            stream.length
        );
        self.music.streams[index] = Some(stream);
        Ok(index)
    }

    /// Refill every playing stream from its decoder
    ///
    /// Call regularly from the main loop. Non-looping streams whose audio
    /// has fully played are removed; so are streams whose mix channel was
    /// taken over.
    pub fn update_music_stream(&mut self) {
        let Ok(shared) = self.shared_mixer() else {
            return;
        };
        let mut mixer = shared.lock();

        for index in 0..self.music.streams.len() {
            let Some(stream) = self.music.streams[index].as_mut() else {
                continue;
            };
            if !self.contexts.is_active(stream.context) {
                log::info!("Music stream {} lost its mix channel", index);
                self.music.streams[index] = None;
                continue;
            }
            if stream.paused {
                continue;
            }

            stream.refill(&mut mixer, &mut self.contexts);
            if stream.at_end && stream.pending.is_empty() && self.contexts.is_idle(&mut mixer, stream.context) {
                log::info!("Music stream {} finished", index);
                self.contexts.close(&mut mixer, stream.context);
                self.music.streams[index] = None;
            }
        }
    }

    /// Stop and remove stream `index`; unknown indices are ignored
    pub fn stop_music_stream(&mut self, index: usize) {
        let Ok(shared) = self.shared_mixer() else {
            return;
        };
        let Some(stream) = self.music.streams.get_mut(index).and_then(Option::take) else {
            return;
        };
        self.contexts.close(&mut shared.lock(), stream.context);
        log::debug!("Music stream {} stopped", index);
    }

    pub fn pause_music_stream(&mut self, index: usize) {
        let Ok(shared) = self.shared_mixer() else {
            return;
        };
        let Some(stream) = self.music.get_mut(index) else {
            return;
        };
        stream.paused = true;
        let mut mixer = shared.lock();
        if let Err(e) = self.contexts.pause(&mut mixer, stream.context) {
            log::warn!("Failed to pause music stream {}: {}", index, e);
        }
    }

    /// Continue a paused stream; does nothing otherwise
    pub fn resume_music_stream(&mut self, index: usize) {
        let Ok(shared) = self.shared_mixer() else {
            return;
        };
        let Some(stream) = self.music.get_mut(index).filter(|s| s.paused) else {
            return;
        };
        stream.paused = false;
        let mut mixer = shared.lock();
        if let Err(e) = self.contexts.resume(&mut mixer, stream.context) {
            log::warn!("Failed to resume music stream {}: {}", index, e);
        }
    }

    /// Stream `index` exists and is not paused
    pub fn is_music_playing(&self, index: usize) -> bool {
        self.is_ready() && self.music.get(index).is_some_and(|s| !s.paused)
    }

    fn with_music_source(
        &mut self,
        index: usize,
        what: &str,
        op: impl FnOnce(&mut Mixer, crate::sound::mixer::SourceId) -> std::result::Result<(), MixerError>,
    ) {
        let Ok(shared) = self.shared_mixer() else {
            return;
        };
        let Some(source) = self
            .music
            .get(index)
            .and_then(|s| self.contexts.source_of(s.context))
        else {
            return;
        };
        let mut mixer = shared.lock();
        if let Err(e) = op(&mut mixer, source) {
            log::warn!("{} failed for music stream {}: {}", what, index, e);
        }
    }

    /// Volume multiplier, 1.0 is unmodified
    pub fn set_music_volume(&mut self, index: usize, volume: f32) {
        self.with_music_source(index, "set volume", |m, src| m.set_source_gain(src, volume));
    }

    /// Pitch multiplier, 1.0 is unmodified
    pub fn set_music_pitch(&mut self, index: usize, pitch: f32) {
        self.with_music_source(index, "set pitch", |m, src| m.set_source_pitch(src, pitch));
    }

    /// Streams loop by default
    pub fn set_music_looping(&mut self, index: usize, looping: bool) {
        if let Some(stream) = self.music.get_mut(index) {
            stream.looping = looping;
            if looping && stream.at_end {
                stream.at_end = false;
                stream.rewound = false;
            }
        }
    }

    /// Length in seconds of the active stream with the lowest index
    pub fn music_time_length(&self) -> f32 {
        self.music
            .lowest_active()
            .map_or(0.0, |index| self.music_time_length_of(index))
    }

    /// Seconds played of the active stream with the lowest index
    pub fn music_time_played(&self) -> f32 {
        self.music
            .lowest_active()
            .map_or(0.0, |index| self.music_time_played_of(index))
    }

    pub fn music_time_length_of(&self, index: usize) -> f32 {
        if !self.is_ready() {
            return 0.0;
        }
        self.music.get(index).map_or(0.0, |s| s.length)
    }

    /// Seconds of stream `index` the mixer has played, wrapped by the track
    /// length when looping
    pub fn music_time_played_of(&self, index: usize) -> f32 {
        let Ok(shared) = self.shared_mixer() else {
            return 0.0;
        };
        let mixer = shared.lock();
        self.music
            .get(index)
            .map_or(0.0, |s| s.time_played(&self.contexts, &mixer))
    }

    /// Streams currently playing or paused
    pub fn music_stream_count(&self) -> usize {
        if !self.is_ready() {
            return 0;
        }
        self.music.active_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AudioConfig;
    use crate::sound::wav::write_wav;
    use crate::sound::AudioFormat;

    struct Fixture {
        _dir: tempfile::TempDir,
        path: std::path::PathBuf,
    }

    /// A mono 16-bit WAV of `frames` frames at 8000 Hz
    fn wav_file(frames: usize) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.wav");
        let pcm: Vec<u8> = (0..frames).flat_map(|i| (i as i16).to_le_bytes()).collect();
        std::fs::write(&path, write_wav(AudioFormat::Mono16, 8000, &pcm)).unwrap();
        Fixture { _dir: dir, path }
    }

    fn device() -> AudioDevice {
        let mut device = AudioDevice::new(AudioConfig {
            frequency: 8000,
            stream_buffers: 2,
            stream_buffer_frames: 256,
            ..AudioConfig::headless()
        });
        device.init();
        device
    }

    fn render(device: &AudioDevice, frames: usize) {
        let mut out = vec![0.0f32; frames * 2];
        device.render(&mut out);
    }

    #[test]
    fn test_to_i16() {
        assert_eq!(to_i16(&[0x00, 0x80, 0xff, 0x7f], 16), vec![i16::MIN, i16::MAX]);
        assert_eq!(to_i16(&[128, 0, 255], 8), vec![0, -32768, 32512]);
    }

    #[test]
    fn test_play_takes_lowest_index_and_channel() {
        let track = wav_file(4000);
        let mut dev = device();

        assert_eq!(dev.play_music_stream(&track.path), Some(0));
        assert_eq!(dev.play_music_stream(&track.path), Some(1));
        assert_eq!(dev.play_music_stream(&track.path), None);
        assert_eq!(dev.music_stream_count(), 2);
        assert!(dev.context_on_channel(0).is_some());
        assert!(dev.context_on_channel(1).is_some());
        assert!(dev.context_on_channel(2).is_none());

        dev.stop_music_stream(0);
        assert_eq!(dev.music_stream_count(), 1);
        assert!(!dev.is_music_playing(0));
        assert!(dev.context_on_channel(0).is_none());
        assert_eq!(dev.play_music_stream(&track.path), Some(0));
    }

    #[test]
    fn test_missing_file() {
        let mut dev = device();
        assert!(dev.play_music_stream("nope.ogg").is_none());
        assert!(matches!(
            dev.try_play_music_stream("nope.mp3"),
            Err(AudioError::Decode(DecodeError::UnsupportedFormat(_)))
        ));
        assert_eq!(dev.music_stream_count(), 0);
        assert_eq!(dev.mixer_objects(), (0, 0));
    }

    #[test]
    fn test_pause_and_resume() {
        let track = wav_file(4000);
        let mut dev = device();
        let index = dev.play_music_stream(&track.path).unwrap();
        assert!(dev.is_music_playing(index));

        dev.pause_music_stream(index);
        assert!(!dev.is_music_playing(index));
        assert_eq!(dev.music_stream_count(), 1);

        render(&dev, 512);
        assert_eq!(dev.music_time_played(), 0.0);

        dev.resume_music_stream(index);
        assert!(dev.is_music_playing(index));

        // Resume on a playing stream and unknown indices are ignored
        dev.resume_music_stream(index);
        dev.resume_music_stream(7);
        dev.pause_music_stream(7);
        assert!(dev.is_music_playing(index));
    }

    #[test]
    fn test_time_played_follows_mixer() {
        let track = wav_file(4000);
        let mut dev = device();
        dev.play_music_stream(&track.path).unwrap();
        assert!((dev.music_time_length() - 0.5).abs() < 1e-6);

        for _ in 0..4 {
            render(&dev, 200);
            dev.update_music_stream();
        }
        assert!((dev.music_time_played() - 0.1).abs() < 1e-6);
        assert_eq!(dev.music_time_played_of(3), 0.0);
    }

    #[test]
    fn test_looping_stream_keeps_playing() {
        let track = wav_file(600);
        let mut dev = device();
        let index = dev.play_music_stream(&track.path).unwrap();

        for _ in 0..20 {
            render(&dev, 128);
            dev.update_music_stream();
        }
        assert!(dev.is_music_playing(index));
        let played = dev.music_time_played();
        assert!((0.0..0.075).contains(&played), "played {}", played);
    }

    #[test]
    fn test_non_looping_stream_finishes() {
        let track = wav_file(600);
        let mut dev = device();
        let index = dev.play_music_stream(&track.path).unwrap();
        dev.set_music_looping(index, false);

        for _ in 0..20 {
            render(&dev, 128);
            dev.update_music_stream();
        }
        assert!(!dev.is_music_playing(index));
        assert_eq!(dev.music_stream_count(), 0);
        assert!(dev.context_on_channel(0).is_none());
        assert_eq!(dev.mixer_objects(), (0, 0));
    }

    #[test]
    fn test_raw_context_takes_music_channel() {
        let track = wav_file(4000);
        let mut dev = device();
        let index = dev.play_music_stream(&track.path).unwrap();

        let ctx = dev.init_context(8000, 0, 1, false);
        assert!(!ctx.is_null());
        assert!(!dev.is_music_playing(index));
        assert_eq!(dev.music_stream_count(), 0);

        dev.update_music_stream();
        assert!(dev.is_context_active(ctx));
    }

    #[test]
    fn test_volume_and_pitch() {
        let track = wav_file(4000);
        let mut dev = device();
        let index = dev.play_music_stream(&track.path).unwrap();
        dev.set_music_volume(index, 0.25);
        dev.set_music_pitch(index, 1.5);
        dev.set_music_volume(9, 0.25);

        let ctx = dev.context_on_channel(0).unwrap();
        let source = dev.contexts.source_of(ctx).unwrap();
        let shared = dev.shared_mixer().unwrap();
        let mixer = shared.lock();
        assert_eq!(mixer.source_gain(source), Some(0.25));
        assert_eq!(mixer.source_pitch(source), Some(1.5));
    }

    #[test]
    fn test_close_removes_streams() {
        let track = wav_file(4000);
        let mut dev = device();
        dev.play_music_stream(&track.path).unwrap();
        dev.close();
        assert_eq!(dev.music_stream_count(), 0);

        dev.init();
        assert_eq!(dev.music_stream_count(), 0);
        assert_eq!(dev.music_time_length(), 0.0);
        assert_eq!(dev.mixer_objects(), (0, 0));
    }
}
