//! Raw PCM streaming contexts
//!
//! Each of the [`MIX_CHANNELS`] fixed mix channels holds at most one
//! context. A context owns one mixer source and a ring of streaming
//! buffers. Samples pushed with [`AudioDevice::update_context`] fill free
//! ring buffers and are queued on the source; buffers the mixer has
//! finished are reclaimed on the next update. Silence goes through
//! transient buffers that are deleted once played; only a ring's worth of
//! them is queued at a time and the rest is owed until buffers come back.

use crate::audio::device::AudioDevice;
use crate::config::MIX_CHANNELS;
use crate::error::{AudioError, Result};
use crate::sound::mixer::{BufferId, Mixer, MixerError, PcmLayout, SourceId, SourceState};

/// Handle to a context bound to one mix channel
///
/// The default value is the invalid handle. A handle goes stale when its
/// context is closed or its channel is taken over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AudioContext {
    channel: u8,
    generation: u32,
}

impl AudioContext {
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// True for the invalid handle returned on failure
    pub fn is_null(&self) -> bool {
        self.generation == 0
    }
}

/// Interleaved samples fed to a context
#[derive(Debug, Clone, Copy)]
pub enum PcmData<'a> {
    I16(&'a [i16]),
    F32(&'a [f32]),
}

impl PcmData<'_> {
    pub fn len(&self) -> usize {
        match self {
            PcmData::I16(s) => s.len(),
            PcmData::F32(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_float(&self) -> bool {
        matches!(self, PcmData::F32(_))
    }
}

/// Sample format of a context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub floating_point: bool,
}

impl StreamFormat {
    pub fn check(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(AudioError::UnsupportedFormat("sample rate 0".to_string()));
        }
        if !(1..=2).contains(&self.channels) {
            return Err(AudioError::UnsupportedFormat(format!(
                "{} channels",
                self.channels
            )));
        }
        Ok(())
    }
}

fn check_channel(channel: u8) -> Result<usize> {
    let index = channel as usize;
    if index >= MIX_CHANNELS {
        return Err(AudioError::InvalidChannel(channel));
    }
    Ok(index)
}

struct ContextSlot {
    generation: u32,
    format: StreamFormat,
    source: SourceId,
    /// Every ring buffer, queued or not
    ring: Vec<BufferId>,
    /// Ring buffers ready to be refilled
    free: Vec<BufferId>,
    buffer_frames: usize,
    /// Transient silence buffers currently queued
    silence_queued: usize,
    /// Silence samples accepted but not queued yet
    silence_owed: usize,
}

impl ContextSlot {
    /// Take back buffers the mixer finished with
    fn reclaim(&mut self, mixer: &mut Mixer) {
        let processed = mixer.buffers_processed(self.source);
        if processed == 0 {
            return;
        }
        let done = match mixer.unqueue_buffers(self.source, processed) {
            Ok(done) => done,
            Err(e) => {
                log::warn!("Failed to unqueue context buffers: {}", e);
                return;
            }
        };
        for id in done {
            if self.ring.contains(&id) {
                self.free.push(id);
                continue;
            }
            self.silence_queued = self.silence_queued.saturating_sub(1);
            if let Err(e) = mixer.delete_buffers(&[id]) {
                log::debug!("Failed to delete silence buffer {}: {}", id, e);
            }
        }
    }

    /// Restart a source that ran dry while there is audio queued
    fn kick(&self, mixer: &mut Mixer) {
        let dry = matches!(
            mixer.source_state(self.source),
            Some(SourceState::Initial | SourceState::Stopped)
        );
        if dry && mixer.buffers_queued(self.source) > 0 {
            if let Err(e) = mixer.source_play(self.source) {
                log::warn!("Failed to restart context source: {}", e);
            }
        }
    }

    fn queue_pcm(&mut self, mixer: &mut Mixer, pcm: PcmData, count: usize) -> usize {
        if pcm.is_float() != self.format.floating_point {
            log::debug!(
                "Sample type does not match context on mix channel; nothing accepted"
            );
            return 0;
        }
        if self.silence_owed > 0 {
            return 0;
        }

        let channels = self.format.channels as usize;
        let mut limit = count.min(pcm.len());
        limit -= limit % channels;
        let per_buffer = self.buffer_frames * channels;

        let mut accepted = 0;
        while accepted < limit {
            let Some(buf) = self.free.pop() else {
                break;
            };
            let end = (accepted + per_buffer).min(limit);
            let filled = match pcm {
                PcmData::I16(samples) => {
                    let bytes: Vec<u8> = samples[accepted..end]
                        .iter()
                        .flat_map(|s| s.to_le_bytes())
                        .collect();
                    let layout = PcmLayout::new(16, self.format.channels);
                    mixer.buffer_data(buf, layout, &bytes, self.format.sample_rate)
                }
                PcmData::F32(samples) => mixer.buffer_samples(
                    buf,
                    self.format.channels,
                    &samples[accepted..end],
                    self.format.sample_rate,
                ),
            };

            if let Err(e) = filled.and_then(|()| mixer.queue_buffers(self.source, &[buf])) {
                log::warn!("Failed to queue context buffer: {}", e);
                self.free.push(buf);
                break;
            }
            accepted = end;
        }
        accepted
    }

    fn queue_silence(&mut self, mixer: &mut Mixer, count: usize) -> usize {
        self.silence_owed = self.silence_owed.saturating_add(count);
        self.pay_silence(mixer);
        count
    }

    /// Queue owed silence, at most one ring's worth of buffers at a time
    fn pay_silence(&mut self, mixer: &mut Mixer) {
        let channels = self.format.channels as usize;
        let per_buffer = self.buffer_frames * channels;
        let mut zeros = Vec::new();

        while self.silence_owed > 0 && self.silence_queued < self.ring.len() {
            let chunk = self.silence_owed.min(per_buffer);
            zeros.clear();
            zeros.resize(chunk.div_ceil(channels) * channels, 0.0f32);

            let buf = mixer.gen_buffer();
            let queued = mixer
                .buffer_samples(buf, self.format.channels, &zeros, self.format.sample_rate)
                .and_then(|()| mixer.queue_buffers(self.source, &[buf]));
            if let Err(e) = queued {
                log::warn!("Failed to queue silence: {}", e);
                let _ = mixer.delete_buffers(&[buf]);
                self.silence_owed = 0;
                break;
            }
            self.silence_queued += 1;
            self.silence_owed -= chunk;
        }
    }

    /// Stop the source and delete it with every buffer it used
    fn release(self, mixer: &mut Mixer) {
        let queued: Vec<BufferId> = mixer
            .source(self.source)
            .map(|src| src.queue.iter().copied().collect())
            .unwrap_or_default();

        let result = mixer
            .source_stop(self.source)
            .and_then(|()| mixer.delete_sources(&[self.source]));
        if let Err(e) = result {
            log::debug!("Failed to delete context source: {}", e);
        }

        for id in self.ring.iter().chain(queued.iter()) {
            if mixer.is_buffer(*id) {
                let _ = mixer.delete_buffers(&[*id]);
            }
        }
    }
}

/// Per-channel context bookkeeping
pub(crate) struct ContextRegistry {
    slots: [Option<ContextSlot>; MIX_CHANNELS],
    last_generation: u32,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self {
            slots: Default::default(),
            last_generation: 0,
        }
    }

    fn slot(&self, ctx: AudioContext) -> Option<&ContextSlot> {
        self.slots
            .get(ctx.channel as usize)?
            .as_ref()
            .filter(|slot| ctx.generation != 0 && slot.generation == ctx.generation)
    }

    fn slot_mut(&mut self, ctx: AudioContext) -> Option<&mut ContextSlot> {
        self.slots
            .get_mut(ctx.channel as usize)?
            .as_mut()
            .filter(|slot| ctx.generation != 0 && slot.generation == ctx.generation)
    }

    /// Bind a new context to `channel`, releasing whatever held it
    pub fn open(
        &mut self,
        mixer: &mut Mixer,
        channel: u8,
        format: StreamFormat,
        ring_len: usize,
        buffer_frames: usize,
    ) -> Result<AudioContext> {
        let index = check_channel(channel)?;
        format.check()?;

        if let Some(old) = self.slots[index].take() {
            log::info!("Mix channel {} taken over by a new context", channel);
            old.release(mixer);
        }

        let source = mixer.gen_source();
        let ring = mixer.gen_buffers(ring_len.max(1));
        self.last_generation = self.last_generation.wrapping_add(1).max(1);

        self.slots[index] = Some(ContextSlot {
            generation: self.last_generation,
            format,
            source,
            free: ring.iter().rev().copied().collect(),
            ring,
            buffer_frames: buffer_frames.max(1),
            silence_queued: 0,
            silence_owed: 0,
        });

        Ok(AudioContext {
            channel,
            generation: self.last_generation,
        })
    }

    /// Release `ctx`; stale handles are ignored
    pub fn close(&mut self, mixer: &mut Mixer, ctx: AudioContext) -> bool {
        if self.slot(ctx).is_none() {
            return false;
        }
        match self.slots[ctx.channel as usize].take() {
            Some(slot) => {
                slot.release(mixer);
                true
            }
            None => false,
        }
    }

    pub fn close_all(&mut self, mixer: &mut Mixer) {
        for slot in self.slots.iter_mut() {
            if let Some(slot) = slot.take() {
                slot.release(mixer);
            }
        }
    }

    /// Push samples (or silence with `None`) into `ctx`
    pub fn update(
        &mut self,
        mixer: &mut Mixer,
        ctx: AudioContext,
        data: Option<PcmData>,
        count: usize,
    ) -> usize {
        let Some(slot) = self.slot_mut(ctx) else {
            return 0;
        };
        slot.reclaim(mixer);
        slot.pay_silence(mixer);
        let accepted = match data {
            Some(pcm) => slot.queue_pcm(mixer, pcm, count),
            None => slot.queue_silence(mixer, count),
        };
        slot.kick(mixer);
        accepted
    }

    pub fn is_active(&self, ctx: AudioContext) -> bool {
        self.slot(ctx).is_some()
    }

    pub fn on_channel(&self, channel: u8) -> Option<AudioContext> {
        let slot = self.slots.get(channel as usize)?.as_ref()?;
        Some(AudioContext {
            channel,
            generation: slot.generation,
        })
    }

    pub fn lowest_free_channel(&self) -> Option<u8> {
        self.slots
            .iter()
            .position(Option::is_none)
            .map(|index| index as u8)
    }

    pub fn source_of(&self, ctx: AudioContext) -> Option<SourceId> {
        self.slot(ctx).map(|slot| slot.source)
    }

    /// True once everything queued on `ctx` has been played
    pub fn is_idle(&mut self, mixer: &mut Mixer, ctx: AudioContext) -> bool {
        let Some(slot) = self.slot_mut(ctx) else {
            return true;
        };
        slot.reclaim(mixer);
        let stopped = !matches!(
            mixer.source_state(slot.source),
            Some(SourceState::Playing | SourceState::Paused)
        );
        stopped && slot.silence_owed == 0 && mixer.buffers_queued(slot.source) == 0
    }

    pub fn pause(&self, mixer: &mut Mixer, ctx: AudioContext) -> std::result::Result<(), MixerError> {
        match self.slot(ctx) {
            Some(slot) => mixer.source_pause(slot.source),
            None => Ok(()),
        }
    }

    /// Continue a paused context, or restart it if it ran dry meanwhile
    pub fn resume(&mut self, mixer: &mut Mixer, ctx: AudioContext) -> std::result::Result<(), MixerError> {
        let Some(slot) = self.slot_mut(ctx) else {
            return Ok(());
        };
        if mixer.source_state(slot.source) == Some(SourceState::Paused) {
            return mixer.source_play(slot.source);
        }
        slot.reclaim(mixer);
        slot.pay_silence(mixer);
        slot.kick(mixer);
        Ok(())
    }

    /// Frames the mixer consumed from `ctx` since it was opened
    pub fn frames_played(&self, mixer: &Mixer, ctx: AudioContext) -> u64 {
        self.slot(ctx)
            .map_or(0, |slot| mixer.source_frames_consumed(slot.source))
    }
}

impl AudioDevice {
    /// Bind a new context to `mix_channel`, returning the invalid handle on
    /// failure
    pub fn init_context(
        &mut self,
        sample_rate: u32,
        mix_channel: u8,
        channels: u16,
        floating_point: bool,
    ) -> AudioContext {
        match self.try_init_context(sample_rate, mix_channel, channels, floating_point) {
            Ok(ctx) => ctx,
            Err(e) => {
                log::warn!("Failed to create audio context on mix channel {}: {}", mix_channel, e);
                AudioContext::default()
            }
        }
    }

    /// Bind a new context to `mix_channel`
    ///
    /// Whatever held the channel before (a context or a music stream) is
    /// stopped and its handle goes stale.
    pub fn try_init_context(
        &mut self,
        sample_rate: u32,
        mix_channel: u8,
        channels: u16,
        floating_point: bool,
    ) -> Result<AudioContext> {
        let shared = self.shared_mixer()?;
        check_channel(mix_channel)?;
        let format = StreamFormat {
            sample_rate,
            channels,
            floating_point,
        };
        format.check()?;

        let mut mixer = shared.lock();
        if let Some(index) = self.music.release_channel(mix_channel) {
            log::info!("Music stream {} lost mix channel {}", index, mix_channel);
        }
        let ctx = self.contexts.open(
            &mut mixer,
            mix_channel,
            format,
            self.config.stream_buffers,
            self.config.stream_buffer_frames,
        )?;
        log::debug!(
            "Audio context on mix channel {}: {} Hz, {} channel(s), {}",
            mix_channel,
            sample_rate,
            channels,
            if floating_point { "f32" } else { "i16" }
        );
        Ok(ctx)
    }

    /// Close `ctx`; closing a stale handle does nothing
    pub fn close_context(&mut self, ctx: AudioContext) {
        let Ok(shared) = self.shared_mixer() else {
            return;
        };
        let mut mixer = shared.lock();
        if self.contexts.close(&mut mixer, ctx) {
            log::debug!("Audio context on mix channel {} closed", ctx.channel);
        }
    }

    /// Feed samples to `ctx`
    ///
    /// With `Some(data)` up to `number_elements` samples are taken, limited
    /// by free buffer space; the return value is the number accepted. With
    /// `None`, `number_elements` samples of silence are queued and
    /// `number_elements` is returned. A stale handle accepts nothing.
    pub fn update_context(
        &mut self,
        ctx: AudioContext,
        data: Option<PcmData>,
        number_elements: usize,
    ) -> usize {
        let Ok(shared) = self.shared_mixer() else {
            return 0;
        };
        let mut mixer = shared.lock();
        self.contexts.update(&mut mixer, ctx, data, number_elements)
    }

    pub fn is_context_active(&self, ctx: AudioContext) -> bool {
        self.is_ready() && self.contexts.is_active(ctx)
    }

    /// The live context bound to `channel`, if any
    pub fn context_on_channel(&self, channel: u8) -> Option<AudioContext> {
        if !self.is_ready() {
            return None;
        }
        self.contexts.on_channel(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sound::mixer::{MixerQuality, OUTPUT_CHANNELS};

    fn mixer() -> Mixer {
        Mixer::new(8000, MixerQuality::Low).unwrap()
    }

    fn mono16(rate: u32) -> StreamFormat {
        StreamFormat {
            sample_rate: rate,
            channels: 1,
            floating_point: false,
        }
    }

    #[test]
    fn test_open_rejects_bad_input() {
        let mut m = mixer();
        let mut reg = ContextRegistry::new();
        assert!(matches!(
            reg.open(&mut m, 4, mono16(8000), 2, 16),
            Err(AudioError::InvalidChannel(4))
        ));
        assert!(reg.open(&mut m, 0, mono16(0), 2, 16).is_err());
        let three = StreamFormat {
            channels: 3,
            ..mono16(8000)
        };
        assert!(reg.open(&mut m, 0, three, 2, 16).is_err());
        assert_eq!(m.source_count(), 0);
    }

    #[test]
    fn test_backpressure_limited_by_ring() {
        let mut m = mixer();
        let mut reg = ContextRegistry::new();
        let ctx = reg.open(&mut m, 0, mono16(8000), 2, 16).unwrap();

        let samples = [100i16; 100];
        let accepted = reg.update(&mut m, ctx, Some(PcmData::I16(&samples)), 100);
        assert_eq!(accepted, 32);
        assert_eq!(reg.update(&mut m, ctx, Some(PcmData::I16(&samples)), 100), 0);

        // Source was started by the update
        let src = reg.source_of(ctx).unwrap();
        assert_eq!(m.source_state(src), Some(SourceState::Playing));

        // Play one buffer, which frees one ring slot
        let mut out = vec![0.0; 16 * OUTPUT_CHANNELS];
        m.mix(&mut out);
        assert_eq!(reg.update(&mut m, ctx, Some(PcmData::I16(&samples)), 100), 16);
    }

    #[test]
    fn test_stereo_accepts_whole_frames() {
        let mut m = mixer();
        let mut reg = ContextRegistry::new();
        let format = StreamFormat {
            channels: 2,
            ..mono16(8000)
        };
        let ctx = reg.open(&mut m, 1, format, 2, 16).unwrap();
        let samples = [0i16; 7];
        assert_eq!(reg.update(&mut m, ctx, Some(PcmData::I16(&samples)), 7), 6);
    }

    #[test]
    fn test_mismatched_sample_type_accepts_nothing() {
        let mut m = mixer();
        let mut reg = ContextRegistry::new();
        let ctx = reg.open(&mut m, 0, mono16(8000), 2, 16).unwrap();
        let floats = [0.0f32; 8];
        assert_eq!(reg.update(&mut m, ctx, Some(PcmData::F32(&floats)), 8), 0);
    }

    #[test]
    fn test_silence_is_never_partial() {
        let mut m = mixer();
        let mut reg = ContextRegistry::new();
        let ctx = reg.open(&mut m, 0, mono16(8000), 2, 16).unwrap();

        for _ in 0..10 {
            assert_eq!(reg.update(&mut m, ctx, None, 1000), 1000);
        }
        assert_eq!(reg.update(&mut m, ctx, None, 0), 0);
    }

    #[test]
    fn test_huge_silence_stays_bounded() {
        let mut m = mixer();
        let mut reg = ContextRegistry::new();
        let format = StreamFormat {
            channels: 2,
            ..mono16(8000)
        };
        let ctx = reg.open(&mut m, 0, format, 2, 16).unwrap();

        assert_eq!(reg.update(&mut m, ctx, None, usize::MAX), usize::MAX);
        assert_eq!(reg.update(&mut m, ctx, None, 345_600_000), 345_600_000);
        // Two ring buffers plus at most two transient ones
        assert_eq!(m.buffer_count(), 4);

        // Data waits behind the owed silence
        let samples = [1i16; 32];
        assert_eq!(reg.update(&mut m, ctx, Some(PcmData::I16(&samples)), 32), 0);

        m.mix_fake(40);
        reg.update(&mut m, ctx, None, 0);
        assert_eq!(m.buffer_count(), 4);
        assert!(!reg.is_idle(&mut m, ctx));
    }

    #[test]
    fn test_owed_silence_plays_before_data() {
        let mut m = mixer();
        let mut reg = ContextRegistry::new();
        let ctx = reg.open(&mut m, 0, mono16(8000), 2, 16).unwrap();

        // 80 frames of silence, only 32 fit at once
        assert_eq!(reg.update(&mut m, ctx, None, 80), 80);
        let samples = [1i16; 16];
        assert_eq!(reg.update(&mut m, ctx, Some(PcmData::I16(&samples)), 16), 0);

        for _ in 0..3 {
            m.mix_fake(16);
            reg.update(&mut m, ctx, None, 0);
        }
        // The last 16 frames of silence are queued now, nothing owed
        assert_eq!(reg.update(&mut m, ctx, Some(PcmData::I16(&samples)), 16), 16);
    }

    #[test]
    fn test_silence_buffers_deleted_after_play() {
        let mut m = mixer();
        let mut reg = ContextRegistry::new();
        let ctx = reg.open(&mut m, 0, mono16(8000), 2, 16).unwrap();
        let baseline = m.buffer_count();

        reg.update(&mut m, ctx, None, 8);
        assert_eq!(m.buffer_count(), baseline + 1);

        let mut out = vec![0.0; 8 * OUTPUT_CHANNELS];
        m.mix(&mut out);
        assert!(reg.is_idle(&mut m, ctx));
        assert_eq!(m.buffer_count(), baseline);
    }

    #[test]
    fn test_rebinding_channel_invalidates_previous() {
        let mut m = mixer();
        let mut reg = ContextRegistry::new();
        let first = reg.open(&mut m, 2, mono16(8000), 2, 16).unwrap();
        let second = reg.open(&mut m, 2, mono16(8000), 2, 16).unwrap();

        assert_ne!(first, second);
        assert!(!reg.is_active(first));
        assert!(reg.is_active(second));
        assert_eq!(reg.update(&mut m, first, None, 10), 0);

        // Closing the stale handle leaves the new owner alone
        assert!(!reg.close(&mut m, first));
        assert!(reg.is_active(second));
        assert_eq!(m.source_count(), 1);
        assert_eq!(m.buffer_count(), 2);
    }

    #[test]
    fn test_close_releases_everything() {
        let mut m = mixer();
        let mut reg = ContextRegistry::new();
        let ctx = reg.open(&mut m, 3, mono16(8000), 3, 16).unwrap();
        reg.update(&mut m, ctx, None, 40);
        let samples = [1i16; 16];
        reg.update(&mut m, ctx, Some(PcmData::I16(&samples)), 16);

        assert!(reg.close(&mut m, ctx));
        assert!(!reg.close(&mut m, ctx));
        assert_eq!(m.source_count(), 0);
        assert_eq!(m.buffer_count(), 0);
        assert_eq!(reg.lowest_free_channel(), Some(0));
    }

    #[test]
    fn test_lowest_free_channel() {
        let mut m = mixer();
        let mut reg = ContextRegistry::new();
        reg.open(&mut m, 0, mono16(8000), 1, 16).unwrap();
        reg.open(&mut m, 2, mono16(8000), 1, 16).unwrap();
        assert_eq!(reg.lowest_free_channel(), Some(1));
        reg.open(&mut m, 1, mono16(8000), 1, 16).unwrap();
        reg.open(&mut m, 3, mono16(8000), 1, 16).unwrap();
        assert_eq!(reg.lowest_free_channel(), None);
    }

    #[test]
    fn test_pause_and_resume() {
        let mut m = mixer();
        let mut reg = ContextRegistry::new();
        let ctx = reg.open(&mut m, 0, mono16(8000), 2, 16).unwrap();
        let samples = [1i16; 32];
        reg.update(&mut m, ctx, Some(PcmData::I16(&samples)), 32);
        let src = reg.source_of(ctx).unwrap();

        reg.pause(&mut m, ctx).unwrap();
        assert_eq!(m.source_state(src), Some(SourceState::Paused));
        assert!(!reg.is_idle(&mut m, ctx));

        reg.resume(&mut m, ctx).unwrap();
        assert_eq!(m.source_state(src), Some(SourceState::Playing));
    }

    #[test]
    fn test_frames_played_counts_consumed_frames() {
        let mut m = mixer();
        let mut reg = ContextRegistry::new();
        let ctx = reg.open(&mut m, 0, mono16(8000), 2, 16).unwrap();
        let samples = [1i16; 32];
        reg.update(&mut m, ctx, Some(PcmData::I16(&samples)), 32);

        m.mix_fake(20);
        assert_eq!(reg.frames_played(&m, ctx), 20);
        assert_eq!(reg.frames_played(&m, AudioContext::default()), 0);
    }

    #[test]
    fn test_default_handle_is_null() {
        let ctx = AudioContext::default();
        assert!(ctx.is_null());
        assert!(!ContextRegistry::new().is_active(ctx));
    }
}
