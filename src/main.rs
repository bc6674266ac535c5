use std::f64::consts::TAU;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;

use soundstage::sound::output::list_devices;
use soundstage::{logging, AudioContext, AudioDevice, Cli, PcmData, Sound, MIX_CHANNELS};

const TICK: Duration = Duration::from_millis(10);
const TONE_BLOCK: usize = 512;
const TONE_GAIN: f64 = 0.25;

/// Sine generator feeding a raw context on the last mix channel
struct Tone {
    ctx: AudioContext,
    hz: f64,
    rate: u32,
    frame: u64,
}

impl Tone {
    fn start(device: &mut AudioDevice, hz: f32) -> Result<Self> {
        let rate = device.frequency();
        let ctx = device
            .try_init_context(rate, (MIX_CHANNELS - 1) as u8, 1, true)
            .context("Failed to open tone context")?;
        log::info!("Playing {} Hz tone on mix channel {}", hz, ctx.channel());
        Ok(Self {
            ctx,
            hz: hz as f64,
            rate,
            frame: 0,
        })
    }

    fn feed(&mut self, device: &mut AudioDevice) {
        loop {
            let block: Vec<f32> = (0..TONE_BLOCK as u64)
                .map(|i| {
                    let cycles = (self.frame + i) as f64 * self.hz / self.rate as f64;
                    (cycles.fract() * TAU).sin() * TONE_GAIN
                })
                .map(|s| s as f32)
                .collect();
            let accepted = device.update_context(self.ctx, Some(PcmData::F32(&block)), block.len());
            self.frame += accepted as u64;
            if accepted < block.len() {
                break;
            }
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init_logging(cli.log_level()?, cli.log_file.as_deref())
        .context("Failed to open log file")?;

    if cli.list_devices {
        for name in list_devices() {
            println!("{}", name);
        }
        return Ok(());
    }

    let config = cli.audio_config()?;
    log::info!("soundstage starting");
    log::debug!("Configuration: {:?}", config);

    let mut device = AudioDevice::new(config);
    device.try_init().context("Failed to open audio device")?;

    let mut sounds: Vec<Sound> = Vec::new();
    for file in &cli.files {
        if cli.music {
            if let Some(index) = device.play_music_stream(file) {
                log::info!("Streaming {} as music stream {}", file.display(), index);
            }
        } else {
            let sound = device.load_sound(file);
            if !sound.is_null() {
                device.play_sound(sound);
                sounds.push(sound);
            }
        }
    }

    let mut tone = match cli.tone {
        Some(hz) => Some(Tone::start(&mut device, hz)?),
        None => None,
    };

    let frames_per_tick = (device.frequency() as u128 * TICK.as_millis() / 1000) as usize;
    let mut scratch = vec![0.0f32; frames_per_tick * 2];
    let deadline = Duration::from_secs_f32(cli.seconds.max(0.0));
    let start = Instant::now();

    while start.elapsed() < deadline {
        device.update_music_stream();
        if let Some(tone) = tone.as_mut() {
            tone.feed(&mut device);
        }
        // No-op unless the null driver is active
        device.render(&mut scratch);

        let busy = tone.is_some()
            || device.music_stream_count() > 0
            || sounds.iter().any(|s| device.is_sound_playing(*s));
        if !busy {
            log::info!("Nothing left to play");
            break;
        }
        thread::sleep(TICK);
    }

    device.close();
    log::info!("soundstage finished after {:.1}s", start.elapsed().as_secs_f32());
    Ok(())
}
