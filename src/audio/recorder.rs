//! Audio recorder using CPAL for capture and hound for WAV writing
//!
//! The AudioRecorder captures audio from the default input device and writes
//! it to a WAV file. The CPAL stream is owned by a dedicated audio thread
//! (streams are not `Send`); the `RecordingHandle` talks to that thread over
//! a channel, so the handle itself can be stored in async state. The device
//! is acquired when a session starts and released exactly once, whether the
//! session is stopped normally or the handle is dropped on an error path.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, SyncSender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig};
use hound::{WavSpec, WavWriter};

/// Errors that can occur during audio recording.
#[derive(Debug, Clone)]
pub enum AudioError {
    NoInputDevice,
    NoSupportedConfig,
    StreamCreationFailed(String),
    FileCreationFailed(String),
    WriteFailed(String),
    ControlFailed(String),
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioError::NoInputDevice => write!(f, "No audio input device found"),
            AudioError::NoSupportedConfig => write!(f, "No supported audio configuration"),
            AudioError::StreamCreationFailed(e) => {
                write!(f, "Failed to create audio stream: {}", e)
            }
            AudioError::FileCreationFailed(e) => write!(f, "Failed to create WAV file: {}", e),
            AudioError::WriteFailed(e) => write!(f, "Failed to write audio data: {}", e),
            AudioError::ControlFailed(e) => write!(f, "Audio thread unreachable: {}", e),
        }
    }
}

impl std::error::Error for AudioError {}

type WavWriterHandle = Arc<Mutex<Option<WavWriter<BufWriter<File>>>>>;

enum Command {
    Pause,
    Resume,
    Stop(SyncSender<Result<(), AudioError>>),
}

/// Handle to an active recording, safe to keep in async state.
///
/// `stop()` finalizes the WAV file. If the handle is dropped without a stop
/// (session abandoned on an error path), the audio thread notices the closed
/// channel, releases the device and finalizes the file anyway.
pub struct RecordingHandle {
    cmd_tx: Sender<Command>,
    wav_path: PathBuf,
}

impl RecordingHandle {
    /// Suspend sample writing. The stream keeps running so resume is
    /// gapless, but nothing reaches the WAV file while paused.
    pub fn pause(&self) -> Result<(), AudioError> {
        self.cmd_tx
            .send(Command::Pause)
            .map_err(|e| AudioError::ControlFailed(e.to_string()))
    }

    pub fn resume(&self) -> Result<(), AudioError> {
        self.cmd_tx
            .send(Command::Resume)
            .map_err(|e| AudioError::ControlFailed(e.to_string()))
    }

    /// Stop recording and finalize the WAV file.
    /// Returns the path to the completed WAV file.
    pub fn stop(self) -> Result<PathBuf, AudioError> {
        let (reply_tx, reply_rx) = std::sync::mpsc::sync_channel(1);
        self.cmd_tx
            .send(Command::Stop(reply_tx))
            .map_err(|e| AudioError::ControlFailed(e.to_string()))?;

        match reply_rx.recv_timeout(Duration::from_secs(10)) {
            Ok(Ok(())) => {
                log::info!("Recording stopped, WAV finalized: {:?}", self.wav_path);
                Ok(self.wav_path)
            }
            Ok(Err(e)) => Err(e),
            Err(e) => Err(AudioError::ControlFailed(e.to_string())),
        }
    }
}

/// Audio recorder that captures from the default input device.
pub struct AudioRecorder {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
}

impl AudioRecorder {
    /// Create a new AudioRecorder using the default input device.
    pub fn new() -> Result<Self, AudioError> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or(AudioError::NoInputDevice)?;

        log::info!("Using audio input device: {:?}", device.name());

        let supported_config = device
            .default_input_config()
            .map_err(|_| AudioError::NoSupportedConfig)?;

        log::info!(
            "Audio config: {} Hz, {} channels, {:?}",
            supported_config.sample_rate().0,
            supported_config.channels(),
            supported_config.sample_format()
        );

        let sample_format = supported_config.sample_format();
        let config: StreamConfig = supported_config.into();

        Ok(Self {
            device,
            config,
            sample_format,
        })
    }

    /// Start recording into `wav_path`.
    /// Blocks until the device stream is up (or fails), then returns a
    /// handle that must be used to control and stop the recording.
    pub fn start(&self, wav_path: PathBuf) -> Result<RecordingHandle, AudioError> {
        let spec = WavSpec {
            channels: self.config.channels,
            sample_rate: self.config.sample_rate.0,
            bits_per_sample: 16, // Always write as 16-bit
            sample_format: hound::SampleFormat::Int,
        };

        let writer = WavWriter::create(&wav_path, spec)
            .map_err(|e| AudioError::FileCreationFailed(e.to_string()))?;
        let writer: WavWriterHandle = Arc::new(Mutex::new(Some(writer)));

        let capturing = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel::<Result<(), AudioError>>(1);
        let (cmd_tx, cmd_rx) = std::sync::mpsc::channel::<Command>();

        let device = self.device.clone();
        let config = self.config.clone();
        let sample_format = self.sample_format;
        let thread_writer = writer.clone();
        let thread_capturing = capturing.clone();
        let path_for_thread = wav_path.clone();

        std::thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || {
                audio_thread(
                    device,
                    config,
                    sample_format,
                    thread_writer,
                    thread_capturing,
                    ready_tx,
                    cmd_rx,
                    path_for_thread,
                )
            })
            .map_err(|e| AudioError::StreamCreationFailed(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                log::info!("Recording started: {:?}", wav_path);
                Ok(RecordingHandle { cmd_tx, wav_path })
            }
            Ok(Err(e)) => Err(e),
            Err(e) => Err(AudioError::StreamCreationFailed(e.to_string())),
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn audio_thread(
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    writer: WavWriterHandle,
    capturing: Arc<AtomicBool>,
    ready_tx: SyncSender<Result<(), AudioError>>,
    cmd_rx: Receiver<Command>,
    wav_path: PathBuf,
) {
    let stream = match build_stream(
        &device,
        &config,
        sample_format,
        writer.clone(),
        capturing.clone(),
    ) {
        Ok(stream) => stream,
        Err(e) => {
            // Drop the half-written container so no orphan file lingers.
            let _ = writer.lock().map(|mut w| w.take());
            let _ = std::fs::remove_file(&wav_path);
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = writer.lock().map(|mut w| w.take());
        let _ = std::fs::remove_file(&wav_path);
        let _ = ready_tx.send(Err(AudioError::StreamCreationFailed(format!(
            "Failed to start stream: {}",
            e
        ))));
        return;
    }

    let _ = ready_tx.send(Ok(()));

    // Control loop: the stream lives exactly as long as this thread.
    let stop_reply = loop {
        match cmd_rx.recv() {
            Ok(Command::Pause) => capturing.store(false, Ordering::SeqCst),
            Ok(Command::Resume) => capturing.store(true, Ordering::SeqCst),
            Ok(Command::Stop(reply)) => break Some(reply),
            // Handle dropped without stop: treat as abandonment.
            Err(_) => break None,
        }
    };

    capturing.store(false, Ordering::SeqCst);
    drop(stream); // releases the input device

    let result = finalize_writer(&writer);
    match stop_reply {
        Some(reply) => {
            let _ = reply.send(result);
        }
        None => {
            if let Err(e) = result {
                log::warn!("Abandoned recording, finalize failed: {}", e);
            } else {
                log::debug!("Abandoned recording finalized: {:?}", wav_path);
            }
        }
    }
}

fn finalize_writer(writer: &WavWriterHandle) -> Result<(), AudioError> {
    let mut guard = writer
        .lock()
        .map_err(|e| AudioError::WriteFailed(e.to_string()))?;
    if let Some(writer) = guard.take() {
        writer
            .finalize()
            .map_err(|e| AudioError::WriteFailed(e.to_string()))?;
    }
    Ok(())
}

fn build_stream(
    device: &Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    writer: WavWriterHandle,
    capturing: Arc<AtomicBool>,
) -> Result<cpal::Stream, AudioError> {
    let err_fn = |err| log::error!("Audio stream error: {}", err);

    match sample_format {
        SampleFormat::I16 => build_stream_typed::<i16>(device, config, writer, capturing, err_fn),
        SampleFormat::U16 => build_stream_typed::<u16>(device, config, writer, capturing, err_fn),
        SampleFormat::F32 => build_stream_typed::<f32>(device, config, writer, capturing, err_fn),
        _ => Err(AudioError::NoSupportedConfig),
    }
}

fn build_stream_typed<T>(
    device: &Device,
    config: &StreamConfig,
    writer: WavWriterHandle,
    capturing: Arc<AtomicBool>,
    err_fn: impl FnMut(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, AudioError>
where
    T: cpal::Sample<Float = f32> + cpal::SizedSample + Send + 'static,
{
    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if !capturing.load(Ordering::SeqCst) {
                    return;
                }

                let Ok(mut guard) = writer.lock() else {
                    return;
                };
                if let Some(ref mut w) = *guard {
                    for &sample in data {
                        // Convert to i16 for WAV
                        let sample_i16 = sample_to_i16(sample);
                        if w.write_sample(sample_i16).is_err() {
                            log::error!("Failed to write sample");
                            break;
                        }
                    }
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| AudioError::StreamCreationFailed(e.to_string()))?;

    Ok(stream)
}

/// Convert any sample type to i16 for WAV writing.
fn sample_to_i16<T: cpal::Sample<Float = f32>>(sample: T) -> i16 {
    let f32_sample: f32 = sample.to_float_sample();
    // Clamp and convert to i16
    let clamped = f32_sample.clamp(-1.0, 1.0);
    (clamped * i16::MAX as f32) as i16
}
