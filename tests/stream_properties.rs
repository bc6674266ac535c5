//! Property tests for contexts and music streams

use std::collections::BTreeSet;

use proptest::prelude::*;

use soundstage::sound::wav::write_wav;
use soundstage::sound::AudioFormat;
use soundstage::{AudioConfig, AudioContext, AudioDevice, PcmData, MIX_CHANNELS};

const RATE: u32 = 8000;

fn device() -> AudioDevice {
    let mut device = AudioDevice::new(AudioConfig {
        frequency: RATE,
        stream_buffers: 2,
        stream_buffer_frames: 64,
        ..AudioConfig::headless()
    });
    device.init();
    device
}

fn render(device: &AudioDevice, frames: usize) {
    let mut out = vec![0.0f32; frames * 2];
    device.render(&mut out);
}

#[derive(Debug, Clone)]
enum ChannelOp {
    Init { channel: u8, stereo: bool },
    Close { pick: usize },
    Render { frames: usize },
}

fn channel_op() -> impl Strategy<Value = ChannelOp> {
    prop_oneof![
        (0u8..=MIX_CHANNELS as u8, any::<bool>())
            .prop_map(|(channel, stereo)| ChannelOp::Init { channel, stereo }),
        any::<usize>().prop_map(|pick| ChannelOp::Close { pick }),
        (0usize..300).prop_map(|frames| ChannelOp::Render { frames }),
    ]
}

#[derive(Debug, Clone)]
enum MusicOp {
    Play,
    Stop(usize),
    Pause(usize),
    Resume(usize),
    Tick,
}

fn music_op() -> impl Strategy<Value = MusicOp> {
    prop_oneof![
        Just(MusicOp::Play),
        (0usize..4).prop_map(MusicOp::Stop),
        (0usize..4).prop_map(MusicOp::Pause),
        (0usize..4).prop_map(MusicOp::Resume),
        Just(MusicOp::Tick),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn silence_never_backpressures(
        stereo in any::<bool>(),
        steps in prop::collection::vec((0usize..5000, 0usize..500), 1..20),
    ) {
        let mut dev = device();
        let ctx = dev.init_context(RATE, 2, if stereo { 2 } else { 1 }, false);
        prop_assert!(!ctx.is_null());

        for (count, frames) in steps {
            prop_assert_eq!(dev.update_context(ctx, None, count), count);
            render(&dev, frames);
        }
    }

    #[test]
    fn data_acceptance_is_bounded(
        stereo in any::<bool>(),
        steps in prop::collection::vec((0usize..400, 0usize..400, 0usize..200), 1..20),
    ) {
        let mut dev = device();
        let channels = if stereo { 2 } else { 1 };
        let ctx = dev.init_context(RATE, 0, channels, true);

        for (len, count, frames) in steps {
            let samples = vec![0.1f32; len];
            let accepted = dev.update_context(ctx, Some(PcmData::F32(&samples)), count);
            prop_assert!(accepted <= count.min(len));
            prop_assert_eq!(accepted % channels as usize, 0);
            render(&dev, frames);
        }
    }

    #[test]
    fn at_most_one_live_context_per_channel(
        ops in prop::collection::vec(channel_op(), 1..40),
    ) {
        let mut dev = device();
        let mut issued: Vec<AudioContext> = Vec::new();

        for op in ops {
            match op {
                ChannelOp::Init { channel, stereo } => {
                    let ctx = dev.init_context(RATE, channel, if stereo { 2 } else { 1 }, false);
                    prop_assert_eq!(ctx.is_null(), channel as usize >= MIX_CHANNELS);
                    if !ctx.is_null() {
                        issued.push(ctx);
                    }
                }
                ChannelOp::Close { pick } => {
                    if !issued.is_empty() {
                        dev.close_context(issued[pick % issued.len()]);
                    }
                }
                ChannelOp::Render { frames } => render(&dev, frames),
            }

            for channel in 0..MIX_CHANNELS as u8 {
                let live: Vec<_> = issued
                    .iter()
                    .filter(|c| c.channel() == channel && dev.is_context_active(**c))
                    .collect();
                prop_assert!(live.len() <= 1);
                prop_assert_eq!(live.first().copied().copied(), dev.context_on_channel(channel));
            }
        }
    }

    #[test]
    fn music_count_matches_active_indices(
        ops in prop::collection::vec(music_op(), 1..30),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loop.wav");
        let pcm: Vec<u8> = (0..1000i16).flat_map(|i| i.to_le_bytes()).collect();
        std::fs::write(&path, write_wav(AudioFormat::Mono16, RATE, &pcm)).unwrap();

        let mut dev = device();
        let mut active = BTreeSet::new();

        for op in ops {
            match op {
                MusicOp::Play => {
                    if let Some(index) = dev.play_music_stream(&path) {
                        prop_assert!(active.insert(index));
                    } else {
                        prop_assert_eq!(active.len(), dev.config().max_music_streams);
                    }
                }
                MusicOp::Stop(index) => {
                    dev.stop_music_stream(index);
                    active.remove(&index);
                }
                MusicOp::Pause(index) => dev.pause_music_stream(index),
                MusicOp::Resume(index) => dev.resume_music_stream(index),
                MusicOp::Tick => {
                    render(&dev, 100);
                    dev.update_music_stream();
                }
            }

            prop_assert_eq!(dev.music_stream_count(), active.len());
            for index in 0..4 {
                if dev.is_music_playing(index) {
                    prop_assert!(active.contains(&index));
                }
            }
        }
    }
}
