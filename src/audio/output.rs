//! Audio output sink (virtual microphone)
//!
//! # Contract
//!
//! - `open(sample_rate, channels, i16, block_size) -> sink`
//! - `write(chunk)` blocks while the device is behind
//! - `close()` stops playback and joins the device thread
//!
//! cpal streams are callback driven and not `Send`, so the stream lives on a
//! dedicated thread for its whole life. `write` hands chunks to that callback
//! through a small bounded channel; a full channel is what makes `write`
//! block.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, StreamConfig};
use crossbeam_channel::{Receiver, Sender};

use super::device::resolve_output_device;
use crate::config::AudioConfig;
use crate::errors::RelayError;
use crate::types::AudioChunk;

/// Chunks accepted by the device thread before `write` blocks
const CHUNKS_IN_FLIGHT: usize = 4;

/// Blocking PCM sink
pub trait AudioSink: Send + Sync {
    /// Write one chunk, blocking until the device accepts it
    fn write(&self, chunk: AudioChunk) -> Result<(), RelayError>;

    /// Device name for status output
    fn name(&self) -> &str;

    /// Stop playback; later writes fail
    fn close(&self) {}
}

/// cpal-backed audio output
pub struct CpalAudioOutput {
    name: String,
    matched_hint: bool,
    samples_tx: Mutex<Option<Sender<Vec<i16>>>>,
    shutdown_tx: Sender<()>,
    stream_failed: Arc<AtomicBool>,
    thread: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl CpalAudioOutput {
    /// Open the output device selected by `config.device_hint`
    pub fn open(config: &AudioConfig) -> Result<Self, RelayError> {
        let (samples_tx, samples_rx) = crossbeam_channel::bounded::<Vec<i16>>(CHUNKS_IN_FLIGHT);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(String, bool), RelayError>>(1);
        let stream_failed = Arc::new(AtomicBool::new(false));

        let config = config.clone();
        let failed = stream_failed.clone();
        let thread = std::thread::Builder::new()
            .name("relaycam-audio-out".to_string())
            .spawn(move || {
                let opened = open_stream(&config, samples_rx, failed);
                match opened {
                    Ok((stream, name, matched)) => {
                        let _ = ready_tx.send(Ok((name, matched)));
                        // Park until close; dropping the stream stops the callback
                        let _ = shutdown_rx.recv();
                        drop(stream);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| RelayError::DeviceError(format!("audio thread spawn failed: {}", e)))?;

        let (name, matched_hint) = match ready_rx.recv() {
            Ok(Ok(opened)) => opened,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(RelayError::DeviceError(
                    "audio thread exited before opening the device".to_string(),
                ));
            }
        };

        Ok(Self {
            name,
            matched_hint,
            samples_tx: Mutex::new(Some(samples_tx)),
            shutdown_tx,
            stream_failed,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Whether the configured device hint was found (otherwise the default output is used)
    pub fn matched_hint(&self) -> bool {
        self.matched_hint
    }
}

impl AudioSink for CpalAudioOutput {
    fn write(&self, chunk: AudioChunk) -> Result<(), RelayError> {
        if self.stream_failed.swap(false, Ordering::Relaxed) {
            return Err(RelayError::DeviceError(format!(
                "audio output '{}' reported a stream error",
                self.name
            )));
        }

        let tx = self
            .samples_tx
            .lock()
            .map_err(|_| RelayError::DeviceError("audio output lock poisoned".to_string()))?
            .clone()
            .ok_or_else(|| RelayError::DeviceError("audio output is closed".to_string()))?;

        tx.send(chunk.samples)
            .map_err(|_| RelayError::DeviceError("audio output thread is gone".to_string()))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn close(&self) {
        if let Ok(mut tx) = self.samples_tx.lock() {
            tx.take();
        }
        let _ = self.shutdown_tx.try_send(());
        if let Ok(mut thread) = self.thread.lock() {
            if let Some(handle) = thread.take() {
                let _ = handle.join();
                log::info!("Audio output '{}' closed", self.name);
            }
        }
    }
}

impl Drop for CpalAudioOutput {
    fn drop(&mut self) {
        self.close();
    }
}

fn open_stream(
    config: &AudioConfig,
    samples_rx: Receiver<Vec<i16>>,
    failed: Arc<AtomicBool>,
) -> Result<(cpal::Stream, String, bool), RelayError> {
    let (device, matched) = resolve_output_device(&config.device_hint)?;
    let name = device.name().unwrap_or_else(|_| "unknown".to_string());

    let sample_format = device
        .default_output_config()
        .map_err(|e| RelayError::DeviceError(format!("No supported output config: {}", e)))?
        .sample_format();

    let fixed = StreamConfig {
        channels: config.channels,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Fixed(config.block_size),
    };

    let stream = match build_for_format(&device, &fixed, sample_format, &samples_rx, &failed) {
        Ok(stream) => stream,
        Err(e) => {
            log::debug!(
                "Fixed block size {} rejected ({}), retrying with device default",
                config.block_size,
                e
            );
            let default_block = StreamConfig {
                buffer_size: cpal::BufferSize::Default,
                ..fixed
            };
            build_for_format(&device, &default_block, sample_format, &samples_rx, &failed)?
        }
    };

    stream
        .play()
        .map_err(|e| RelayError::DeviceError(format!("Failed to start output stream: {}", e)))?;

    log::info!(
        "Audio output '{}' open: {} Hz, {} ch, block {}",
        name,
        config.sample_rate,
        config.channels,
        config.block_size
    );
    Ok((stream, name, matched))
}

fn build_for_format(
    device: &cpal::Device,
    config: &StreamConfig,
    format: SampleFormat,
    samples_rx: &Receiver<Vec<i16>>,
    failed: &Arc<AtomicBool>,
) -> Result<cpal::Stream, RelayError> {
    let rx = samples_rx.clone();
    let failed = failed.clone();
    match format {
        SampleFormat::I16 => build_stream::<i16>(device, config, rx, failed),
        SampleFormat::U16 => build_stream::<u16>(device, config, rx, failed),
        SampleFormat::F32 => build_stream::<f32>(device, config, rx, failed),
        other => Err(RelayError::DeviceError(format!(
            "Unsupported output sample format: {:?}",
            other
        ))),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    samples_rx: Receiver<Vec<i16>>,
    failed: Arc<AtomicBool>,
) -> Result<cpal::Stream, RelayError>
where
    T: SizedSample + FromSample<i16> + Send + 'static,
{
    let mut pending: VecDeque<i16> = VecDeque::new();
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                fill_from_queue(data, &mut pending, &samples_rx);
            },
            move |err| {
                log::error!("Audio output error: {}", err);
                failed.store(true, Ordering::Relaxed);
            },
            None,
        )
        .map_err(|e| RelayError::DeviceError(format!("Failed to build output stream: {}", e)))
}

/// Fill a device buffer from queued chunks, padding with silence on underrun
fn fill_from_queue<T>(data: &mut [T], pending: &mut VecDeque<i16>, samples_rx: &Receiver<Vec<i16>>)
where
    T: Sample + FromSample<i16>,
{
    for slot in data.iter_mut() {
        if pending.is_empty() {
            if let Ok(chunk) = samples_rx.try_recv() {
                pending.extend(chunk);
            }
        }
        *slot = T::from_sample(pending.pop_front().unwrap_or(0));
    }
}
