// source.rs - Audio source management

//! Audio source management for the mixer.
//!
//! Sources represent playback instances that can have buffers queued to them.
//! They support playing, pausing, stopping, and gain/pitch control.

use std::collections::VecDeque;

use crate::sound::mixer::mix::Mixer;
use crate::sound::mixer::types::*;

/// Audio source for playback
#[derive(Debug)]
pub struct MixerSource {
    pub(crate) state: SourceState,
    pub(crate) looping: bool,
    pub(crate) gain: f32,
    pub(crate) pitch: f32,
    /// Buffers in play order
    pub(crate) queue: VecDeque<BufferId>,
    /// Index into `queue` of the buffer being played
    pub(crate) current: usize,
    /// Number of buffers at the front of the queue that finished playing
    pub(crate) processed: usize,
    /// Fractional frame position inside the current buffer
    pub(crate) position: f64,
    /// Frames consumed since the source was created or last rewound
    pub(crate) frames_consumed: u64,
}

impl MixerSource {
    pub fn new() -> Self {
        MixerSource {
            state: SourceState::Initial,
            looping: false,
            gain: 1.0,
            pitch: 1.0,
            queue: VecDeque::new(),
            current: 0,
            processed: 0,
            position: 0.0,
            frames_consumed: 0,
        }
    }

    pub fn state(&self) -> SourceState {
        self.state
    }

    fn restart(&mut self) {
        self.current = 0;
        self.processed = 0;
        self.position = 0.0;
    }

    /// Move on to the next queued buffer after `frames` were consumed
    pub(crate) fn advance(&mut self, frames: usize) {
        self.frames_consumed += frames as u64;
        self.current += 1;

        if self.looping {
            if self.current >= self.queue.len() {
                self.current = 0;
            }
        } else {
            self.processed = self.current;
            if self.current >= self.queue.len() {
                self.state = SourceState::Stopped;
            }
        }
    }
}

impl Default for MixerSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Mixer {
    fn source_mut(&mut self, id: SourceId) -> Result<&mut MixerSource, MixerError> {
        match self.sources.get_mut(id.index(), id.generation()) {
            Some(src) => Ok(src),
            None => {
                self.last_error = MixerError::InvalidName;
                Err(MixerError::InvalidName)
            }
        }
    }

    fn source_ref(&self, id: SourceId) -> Option<&MixerSource> {
        self.sources.get(id.index(), id.generation())
    }

    fn detach_all(&mut self, id: SourceId) {
        let queue = match self.sources.get_mut(id.index(), id.generation()) {
            Some(src) => std::mem::take(&mut src.queue),
            None => return,
        };
        for buf_id in queue {
            if let Some(buf) = self.buffers.get_mut(buf_id.index(), buf_id.generation()) {
                buf.attached = buf.attached.saturating_sub(1);
            }
        }
    }

    /// Generate new source objects
    pub fn gen_sources(&mut self, n: usize) -> Vec<SourceId> {
        (0..n)
            .map(|_| self.gen_source())
            .collect()
    }

    /// Generate one source object
    pub fn gen_source(&mut self) -> SourceId {
        let (index, generation) = self.sources.insert(MixerSource::new());
        SourceId::new(index, generation)
    }

    /// Delete source objects, releasing every buffer they hold
    pub fn delete_sources(&mut self, ids: &[SourceId]) -> Result<(), MixerError> {
        if ids.iter().any(|id| self.source_ref(*id).is_none()) {
            return self.fail(MixerError::InvalidName);
        }

        for id in ids {
            self.detach_all(*id);
            self.sources.remove(id.index(), id.generation());
        }
        Ok(())
    }

    /// Check if a handle names a live source
    pub fn is_source(&self, id: SourceId) -> bool {
        self.source_ref(id).is_some()
    }

    pub fn source(&self, id: SourceId) -> Option<&MixerSource> {
        self.source_ref(id)
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Start playback on a source
    ///
    /// A playing source is rewound to its first buffer, a paused one resumes
    /// where it left off.
    pub fn source_play(&mut self, id: SourceId) -> Result<(), MixerError> {
        let src = self.source_mut(id)?;
        match src.state {
            SourceState::Paused => {}
            SourceState::Playing | SourceState::Stopped | SourceState::Initial => src.restart(),
        }

        src.state = if src.queue.is_empty() {
            SourceState::Stopped
        } else {
            SourceState::Playing
        };
        Ok(())
    }

    /// Pause playback on a source (ignored unless it is playing)
    pub fn source_pause(&mut self, id: SourceId) -> Result<(), MixerError> {
        let src = self.source_mut(id)?;
        if src.state == SourceState::Playing {
            src.state = SourceState::Paused;
        }
        Ok(())
    }

    /// Stop playback on a source, marking every queued buffer processed
    pub fn source_stop(&mut self, id: SourceId) -> Result<(), MixerError> {
        let src = self.source_mut(id)?;
        if src.state != SourceState::Initial {
            src.state = SourceState::Stopped;
            src.processed = src.queue.len();
            src.current = src.queue.len();
            src.position = 0.0;
        }
        Ok(())
    }

    /// Rewind a source to the beginning
    pub fn source_rewind(&mut self, id: SourceId) -> Result<(), MixerError> {
        let src = self.source_mut(id)?;
        src.restart();
        src.frames_consumed = 0;
        src.state = SourceState::Initial;
        Ok(())
    }

    pub fn source_state(&self, id: SourceId) -> Option<SourceState> {
        self.source_ref(id).map(|src| src.state)
    }

    pub fn set_source_gain(&mut self, id: SourceId, gain: f32) -> Result<(), MixerError> {
        if !gain.is_finite() || !(0.0..=MAX_GAIN).contains(&gain) {
            return self.fail(MixerError::InvalidValue);
        }
        self.source_mut(id)?.gain = gain;
        Ok(())
    }

    pub fn source_gain(&self, id: SourceId) -> Option<f32> {
        self.source_ref(id).map(|src| src.gain)
    }

    pub fn set_source_pitch(&mut self, id: SourceId, pitch: f32) -> Result<(), MixerError> {
        if !pitch.is_finite() || pitch <= 0.0 {
            return self.fail(MixerError::InvalidValue);
        }
        self.source_mut(id)?.pitch = pitch.max(MIN_PITCH);
        Ok(())
    }

    pub fn source_pitch(&self, id: SourceId) -> Option<f32> {
        self.source_ref(id).map(|src| src.pitch)
    }

    pub fn set_source_looping(&mut self, id: SourceId, looping: bool) -> Result<(), MixerError> {
        self.source_mut(id)?.looping = looping;
        Ok(())
    }

    pub fn source_looping(&self, id: SourceId) -> Option<bool> {
        self.source_ref(id).map(|src| src.looping)
    }

    /// Attach a single static buffer, or detach everything with `None`
    pub fn set_source_buffer(
        &mut self,
        id: SourceId,
        buffer: Option<BufferId>,
    ) -> Result<(), MixerError> {
        let state = self.source_mut(id)?.state;
        if matches!(state, SourceState::Playing | SourceState::Paused) {
            return self.fail(MixerError::InvalidOperation);
        }
        if let Some(buf_id) = buffer {
            if !self.is_buffer(buf_id) {
                return self.fail(MixerError::InvalidName);
            }
        }

        self.detach_all(id);
        let src = self.source_mut(id)?;
        src.restart();
        src.state = SourceState::Initial;
        if let Some(buf_id) = buffer {
            src.queue.push_back(buf_id);
            if let Some(buf) = self.buffers.get_mut(buf_id.index(), buf_id.generation()) {
                buf.attached += 1;
            }
        }
        Ok(())
    }

    /// Append buffers to the end of a source's queue
    ///
    /// Queued buffers must be filled and match the channel count of
    /// buffers already on the queue.
    pub fn queue_buffers(&mut self, id: SourceId, ids: &[BufferId]) -> Result<(), MixerError> {
        let channels = {
            let src = self.source_mut(id)?;
            src.queue.front().copied()
        }
        .and_then(|first| self.buffer(first).map(|b| b.channels()));

        for buf_id in ids {
            match self.buffer(*buf_id) {
                None => return self.fail(MixerError::InvalidName),
                Some(buf) if buf.frames() == 0 => return self.fail(MixerError::InvalidValue),
                Some(buf) if channels.is_some_and(|c| c != buf.channels()) => {
                    return self.fail(MixerError::InvalidOperation)
                }
                Some(_) => {}
            }
        }

        for buf_id in ids {
            if let Some(buf) = self.buffers.get_mut(buf_id.index(), buf_id.generation()) {
                buf.attached += 1;
            }
        }
        self.source_mut(id)?.queue.extend(ids.iter().copied());
        Ok(())
    }

    /// Remove up to `n` processed buffers from the front of the queue
    pub fn unqueue_buffers(&mut self, id: SourceId, n: usize) -> Result<Vec<BufferId>, MixerError> {
        let src = self.source_mut(id)?;
        if n > src.processed {
            return self.fail(MixerError::InvalidValue);
        }

        let removed: Vec<BufferId> = src.queue.drain(..n).collect();
        src.processed -= n;
        src.current = src.current.saturating_sub(n);

        for buf_id in &removed {
            if let Some(buf) = self.buffers.get_mut(buf_id.index(), buf_id.generation()) {
                buf.attached = buf.attached.saturating_sub(1);
            }
        }
        Ok(removed)
    }

    pub fn buffers_queued(&self, id: SourceId) -> usize {
        self.source_ref(id).map_or(0, |src| src.queue.len())
    }

    pub fn buffers_processed(&self, id: SourceId) -> usize {
        self.source_ref(id).map_or(0, |src| src.processed)
    }

    /// Total input frames consumed since creation or the last rewind
    pub fn source_frames_consumed(&self, id: SourceId) -> u64 {
        self.source_ref(id)
            .map_or(0, |src| src.frames_consumed + src.position as u64)
    }
}
