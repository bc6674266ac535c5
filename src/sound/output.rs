//! Audio output drivers
//!
//! The rodio driver runs an audio thread that owns the output stream and
//! plays a [`rodio::Source`] pulling blocks of frames from the shared
//! [`Mixer`]. The null driver opens nothing; callers render mixer output
//! themselves.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait};
use parking_lot::Mutex;
use rodio::{OutputStream, Source};

use crate::sound::mixer::{Mixer, OUTPUT_CHANNELS};

/// Frames mixed per lock of the mixer on the audio thread
const BLOCK_FRAMES: usize = 512;

/// Which backend drives the mixer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputDriver {
    /// System audio through rodio/cpal
    #[default]
    Rodio,
    /// No device; output is pulled with `render`
    Null,
}

impl FromStr for OutputDriver {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rodio" | "default" | "system" => Ok(OutputDriver::Rodio),
            "null" | "none" => Ok(OutputDriver::Null),
            other => Err(format!("unknown output driver '{}'", other)),
        }
    }
}

/// Errors opening an output driver
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OutputError {
    #[error("no output device available")]
    NoDevice,
    #[error("failed to open output stream: {0}")]
    Stream(String),
    #[error("audio thread failed: {0}")]
    Thread(String),
}

/// Rodio source pulling mixed frames
struct MixerStream {
    mixer: Arc<Mutex<Mixer>>,
    stop: Arc<AtomicBool>,
    block: Vec<f32>,
    pos: usize,
    sample_rate: u32,
}

impl MixerStream {
    fn new(mixer: Arc<Mutex<Mixer>>, stop: Arc<AtomicBool>) -> Self {
        let sample_rate = mixer.lock().frequency();
        Self {
            mixer,
            stop,
            block: vec![0.0; BLOCK_FRAMES * OUTPUT_CHANNELS],
            pos: BLOCK_FRAMES * OUTPUT_CHANNELS,
            sample_rate,
        }
    }
}

impl Iterator for MixerStream {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.pos >= self.block.len() {
            if self.stop.load(Ordering::Acquire) {
                return None;
            }
            self.mixer.lock().mix(&mut self.block);
            self.pos = 0;
        }
        let sample = self.block[self.pos];
        self.pos += 1;
        Some(sample)
    }
}

impl Source for MixerStream {
    fn current_frame_len(&self) -> Option<usize> {
        Some(self.block.len() - self.pos).filter(|&n| n > 0)
    }

    fn channels(&self) -> u16 {
        OUTPUT_CHANNELS as u16
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

/// Pick the cpal device named `name`, falling back to the default device
fn find_device(name: Option<&str>) -> Result<cpal::Device, OutputError> {
    let host = cpal::default_host();

    if let Some(name) = name {
        match host.output_devices() {
            Ok(mut devices) => {
                if let Some(dev) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
                    log::info!("Found requested audio device: {}", name);
                    return Ok(dev);
                }
                log::warn!(
                    "Requested device '{}' not found, falling back to default device",
                    name
                );
            }
            Err(e) => log::warn!("Failed to enumerate devices: {}", e),
        }
    }

    let dev = host.default_output_device().ok_or(OutputError::NoDevice)?;
    log::info!(
        "Using audio device: {}",
        dev.name().unwrap_or_else(|_| "Unknown".to_string())
    );
    Ok(dev)
}

/// Names of the output devices cpal can see
pub fn list_devices() -> Vec<String> {
    match cpal::default_host().output_devices() {
        Ok(devices) => devices.filter_map(|d| d.name().ok()).collect(),
        Err(e) => {
            log::warn!("Failed to enumerate devices: {}", e);
            Vec::new()
        }
    }
}

fn audio_thread_main(
    device_name: Option<String>,
    mixer: Arc<Mutex<Mixer>>,
    stop: Arc<AtomicBool>,
    ready: Sender<Result<(), OutputError>>,
    shutdown: Receiver<()>,
) {
    log::debug!("audio thread starting");

    let opened = find_device(device_name.as_deref()).and_then(|dev| {
        OutputStream::try_from_device(&dev).map_err(|e| OutputError::Stream(e.to_string()))
    });

    let (_stream, handle) = match opened {
        Ok(s) => s,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    if let Err(e) = handle.play_raw(MixerStream::new(mixer, Arc::clone(&stop))) {
        let _ = ready.send(Err(OutputError::Stream(e.to_string())));
        return;
    }
    let _ = ready.send(Ok(()));
    log::debug!("audio thread ready");

    // Keep the stream alive until told to stop (or the sender is dropped)
    let _ = shutdown.recv();
    stop.store(true, Ordering::Release);
    log::debug!("audio thread exiting");
}

/// An open output driver
pub struct AudioOutput {
    driver: OutputDriver,
    thread: Option<JoinHandle<()>>,
    shutdown: Option<Sender<()>>,
    stop: Arc<AtomicBool>,
}

impl AudioOutput {
    /// Open `driver`, feeding it from `mixer`
    pub fn open(
        driver: OutputDriver,
        device_name: Option<&str>,
        mixer: Arc<Mutex<Mixer>>,
    ) -> Result<Self, OutputError> {
        let stop = Arc::new(AtomicBool::new(false));
        if driver == OutputDriver::Null {
            log::info!("Null audio driver opened");
            return Ok(Self {
                driver,
                thread: None,
                shutdown: None,
                stop,
            });
        }

        let (ready_tx, ready_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel();
        let device_name = device_name.map(str::to_string);
        let thread_stop = Arc::clone(&stop);

        let thread = thread::Builder::new()
            .name("soundstage-audio".to_string())
            .spawn(move || audio_thread_main(device_name, mixer, thread_stop, ready_tx, shutdown_rx))
            .map_err(|e| OutputError::Thread(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                driver,
                thread: Some(thread),
                shutdown: Some(shutdown_tx),
                stop,
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(OutputError::Thread("audio thread exited during startup".to_string()))
            }
        }
    }

    pub fn driver(&self) -> OutputDriver {
        self.driver
    }

    pub fn is_null(&self) -> bool {
        self.driver == OutputDriver::Null
    }

    /// Stop the audio thread, if any
    pub fn close(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("audio thread panicked");
            }
        }
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.close();
    }
}
