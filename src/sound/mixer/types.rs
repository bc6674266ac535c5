// types.rs - Core types and enums for the audio mixer

//! Core types and enumerations for the OpenAL-like audio mixer.
//!
//! This module defines the error codes, playback states and quality levels
//! used throughout the mixer, plus the generation-checked handles that name
//! buffers and sources.

use std::fmt;

/// Maximum gain accepted by the mixer before it is treated as a typo
pub const MAX_GAIN: f32 = 64.0;

/// Smallest pitch multiplier the mixer will step with
pub const MIN_PITCH: f32 = 1.0 / 64.0;

/// Mixer error codes (compatible with OpenAL error codes)
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MixerError {
    #[error("no error")]
    NoError = 0,
    #[error("invalid object name")]
    InvalidName = 0xA001,
    #[error("invalid enum")]
    InvalidEnum = 0xA002,
    #[error("invalid value")]
    InvalidValue = 0xA003,
    #[error("invalid operation")]
    InvalidOperation = 0xA004,
    #[error("out of memory")]
    OutOfMemory = 0xA005,
    #[error("driver failure")]
    DriverFailure = 0xA101,
}

impl MixerError {
    /// Convert from raw u32 error code
    pub fn from_u32(code: u32) -> Self {
        match code {
            0 => MixerError::NoError,
            0xA001 => MixerError::InvalidName,
            0xA002 => MixerError::InvalidEnum,
            0xA003 => MixerError::InvalidValue,
            0xA004 => MixerError::InvalidOperation,
            0xA005 => MixerError::OutOfMemory,
            _ => MixerError::DriverFailure,
        }
    }

    /// Convert to raw u32 error code
    pub fn to_u32(self) -> u32 {
        self as u32
    }
}

/// Source playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceState {
    #[default]
    Initial,
    Playing,
    Paused,
    Stopped,
}

/// Mixer quality level (selects the resampling algorithm)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MixerQuality {
    /// Nearest neighbour
    Low,
    /// Linear interpolation
    #[default]
    Medium,
    /// Cubic interpolation
    High,
}

macro_rules! slot_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name {
            index: u32,
            generation: u32,
        }

        impl $name {
            pub(crate) fn new(index: u32, generation: u32) -> Self {
                Self { index, generation }
            }

            /// Slot number inside the owning pool
            pub fn index(&self) -> u32 {
                self.index
            }

            /// Generation of the slot when this handle was issued
            pub fn generation(&self) -> u32 {
                self.generation
            }

            /// True for the zeroed sentinel handle, which is never issued
            pub fn is_null(&self) -> bool {
                self.generation == 0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", self.index, self.generation)
            }
        }
    };
}

slot_id!(
    /// Handle to a mixer buffer
    BufferId
);

slot_id!(
    /// Handle to a mixer source
    SourceId
);

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot storage with generation checks.
///
/// Removing an entry bumps the slot generation so that handles issued for
/// the old occupant no longer resolve. Free slots are reused lowest-first.
pub(crate) struct Pool<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

impl<T> Pool<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub fn insert(&mut self, value: T) -> (u32, u32) {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return (index, slot.generation);
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 1,
            value: Some(value),
        });
        (index, 1)
    }

    pub fn get(&self, index: u32, generation: u32) -> Option<&T> {
        self.slots
            .get(index as usize)
            .filter(|slot| slot.generation == generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, index: u32, generation: u32) -> Option<&mut T> {
        self.slots
            .get_mut(index as usize)
            .filter(|slot| slot.generation == generation)
            .and_then(|slot| slot.value.as_mut())
    }

    pub fn remove(&mut self, index: u32, generation: u32) -> Option<T> {
        let slot = self
            .slots
            .get_mut(index as usize)
            .filter(|slot| slot.generation == generation)?;
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1).max(1);

        self.free.push(index);
        // Keep lowest index on top so reuse is deterministic
        self.free.sort_unstable_by(|a, b| b.cmp(a));
        Some(value)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u32, u32, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, slot)| {
            let generation = slot.generation;
            slot.value.as_mut().map(|v| (i as u32, generation, v))
        })
    }

    pub fn handles(&self) -> Vec<(u32, u32)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.value.is_some())
            .map(|(i, slot)| (i as u32, slot.generation))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.value.is_some()).count()
    }

    /// Remove every entry, invalidating all outstanding handles
    pub fn clear(&mut self) {
        for (index, generation) in self.handles() {
            self.remove(index, generation);
        }
    }
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(MixerError::InvalidName.to_u32(), 0xA001);
        assert_eq!(MixerError::from_u32(0xA002), MixerError::InvalidEnum);
        assert_eq!(MixerError::from_u32(0x1234), MixerError::DriverFailure);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(MixerError::InvalidValue.to_string(), "invalid value");
    }

    #[test]
    fn test_null_handles() {
        assert!(BufferId::default().is_null());
        assert!(SourceId::default().is_null());
        assert!(!SourceId::new(0, 1).is_null());
        assert_eq!(BufferId::new(3, 2).to_string(), "3#2");
    }

    #[test]
    fn test_pool_reuses_slot_with_new_generation() {
        let mut pool = Pool::new();
        let (i0, g0) = pool.insert("a");
        let (i1, _) = pool.insert("b");
        assert_eq!((i0, g0), (0, 1));
        assert_eq!(i1, 1);

        assert_eq!(pool.remove(i0, g0), Some("a"));
        assert!(pool.get(i0, g0).is_none());

        let (i2, g2) = pool.insert("c");
        assert_eq!(i2, 0);
        assert_eq!(g2, 2);
        assert_eq!(pool.get(i2, g2), Some(&"c"));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_pool_stale_remove_is_rejected() {
        let mut pool = Pool::new();
        let (i, g) = pool.insert(1);
        pool.remove(i, g);
        assert_eq!(pool.remove(i, g), None);
    }

    #[test]
    fn test_pool_clear() {
        let mut pool = Pool::new();
        let a = pool.insert(1);
        let b = pool.insert(2);
        pool.clear();
        assert_eq!(pool.len(), 0);
        assert!(pool.get(a.0, a.1).is_none());
        assert!(pool.get(b.0, b.1).is_none());
    }
}
