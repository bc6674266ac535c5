// resample.rs - Audio resampling algorithms

//! Audio resampling algorithms for the mixer.
//!
//! Provides different quality levels of resampling:
//! - Nearest: picks the frame at or before the read position (low quality)
//! - Linear: interpolates between adjacent frames (medium quality)
//! - Cubic: cubic spline through four neighbouring frames (high quality)
//!
//! All functions read one channel of an interleaved `f32` buffer at a
//! fractional frame position. Reads past either end clamp to the edge frame.

use crate::sound::mixer::types::MixerQuality;

/// Fetch one channel of a frame, clamping the frame index to the buffer
#[inline]
pub fn frame_sample(samples: &[f32], channels: usize, frame: isize, channel: usize) -> f32 {
    let frames = samples.len() / channels;
    if frames == 0 {
        return 0.0;
    }
    let frame = frame.clamp(0, frames as isize - 1) as usize;
    samples[frame * channels + channel]
}

/// Resample using nearest neighbor
pub fn resample_nearest(samples: &[f32], channels: usize, pos: f64, channel: usize) -> f32 {
    frame_sample(samples, channels, pos.floor() as isize, channel)
}

/// Resample using linear interpolation
pub fn resample_linear(samples: &[f32], channels: usize, pos: f64, channel: usize) -> f32 {
    let base = pos.floor();
    let t = (pos - base) as f32;
    let i = base as isize;

    let s0 = frame_sample(samples, channels, i, channel);
    let s1 = frame_sample(samples, channels, i + 1, channel);
    s0 + t * (s1 - s0)
}

/// Resample using cubic interpolation
pub fn resample_cubic(samples: &[f32], channels: usize, pos: f64, channel: usize) -> f32 {
    let base = pos.floor();
    let t = (pos - base) as f32;
    let i = base as isize;

    // s0 = previous, s1 = current, s2 = next, s3 = next+1
    let s0 = frame_sample(samples, channels, i - 1, channel);
    let s1 = frame_sample(samples, channels, i, channel);
    let s2 = frame_sample(samples, channels, i + 1, channel);
    let s3 = frame_sample(samples, channels, i + 2, channel);

    let t2 = t * t;
    let a = (3.0 * (s1 - s2) - s0 + s3) * 0.5;
    let b = 2.0 * s2 + s0 - ((5.0 * s1 + s3) * 0.5);
    let c = (s2 - s0) * 0.5;

    a * t2 * t + b * t2 + c * t + s1
}

/// Pick the resampler for a quality level
pub fn resample(
    quality: MixerQuality,
    samples: &[f32],
    channels: usize,
    pos: f64,
    channel: usize,
) -> f32 {
    match quality {
        MixerQuality::Low => resample_nearest(samples, channels, pos, channel),
        MixerQuality::Medium => resample_linear(samples, channels, pos, channel),
        MixerQuality::High => resample_cubic(samples, channels, pos, channel),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_sample_clamps() {
        let data = [1.0, 2.0, 3.0];
        assert_eq!(frame_sample(&data, 1, -1, 0), 1.0);
        assert_eq!(frame_sample(&data, 1, 5, 0), 3.0);
        assert_eq!(frame_sample(&[], 1, 0, 0), 0.0);
    }

    #[test]
    fn test_frame_sample_stereo() {
        let data = [0.1, 0.2, 0.3, 0.4];
        assert_eq!(frame_sample(&data, 2, 1, 0), 0.3);
        assert_eq!(frame_sample(&data, 2, 1, 1), 0.4);
    }

    #[test]
    fn test_resample_nearest() {
        let data = [10.0, 20.0, 30.0, 40.0, 50.0];
        assert_eq!(resample_nearest(&data, 1, 0.0, 0), 10.0);
        assert_eq!(resample_nearest(&data, 1, 1.9, 0), 20.0);
    }

    #[test]
    fn test_resample_linear() {
        let data = [0.0, 10.0, 20.0, 30.0, 40.0];
        assert!((resample_linear(&data, 1, 0.5, 0) - 5.0).abs() < 0.01);
        assert!((resample_linear(&data, 1, 2.25, 0) - 22.5).abs() < 0.01);
    }

    #[test]
    fn test_resample_linear_at_end() {
        let data = [10.0, 20.0, 30.0];
        assert_eq!(resample_linear(&data, 1, 2.5, 0), 30.0);
    }

    #[test]
    fn test_resample_cubic() {
        let data = [0.0, 10.0, 20.0, 30.0, 40.0, 50.0];
        let sample = resample_cubic(&data, 1, 1.25, 0);
        // On a straight line the spline stays between its neighbours
        assert!((10.0..=20.0).contains(&sample));
        assert!((sample - 12.5).abs() < 0.01);
    }

    #[test]
    fn test_resample_cubic_hits_knots() {
        let data = [0.0, 1.0, -1.0, 0.5];
        assert_eq!(resample_cubic(&data, 1, 1.0, 0), 1.0);
        assert_eq!(resample_cubic(&data, 1, 2.0, 0), -1.0);
    }

    #[test]
    fn test_resample_dispatch() {
        let data = [0.0, 1.0];
        assert_eq!(resample(MixerQuality::Low, &data, 1, 0.5, 0), 0.0);
        assert_eq!(resample(MixerQuality::Medium, &data, 1, 0.5, 0), 0.5);
    }
}
