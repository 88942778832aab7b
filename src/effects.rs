//! Effect runner for the capture state machine
//!
//! Executes the effects produced by `capture::reduce`: device start/stop,
//! pause gating, the one-second tick, and persisting the finished session
//! through the recording store. Completion events flow back into the state
//! loop via the provided channel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tauri::{AppHandle, Emitter};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::audio::{AudioRecorder, RecordingHandle};
use crate::capture::{Effect, Event};
use crate::pipeline::TranscriptionQueue;
use crate::settings::AppSettings;
use crate::store::{Recording, RecordingStore, TranscriptState};

/// Trait for running effects asynchronously.
/// Completion events are sent back via the provided channel.
pub trait EffectRunner: Send + Sync + 'static {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>);
}

/// Real effect runner: CPAL capture, WAV persistence through the store,
/// frontend notifications.
pub struct AudioEffectRunner {
    recorder: Arc<Mutex<Option<AudioRecorder>>>,
    active: Arc<Mutex<HashMap<Uuid, RecordingHandle>>>,
    store: Arc<RecordingStore>,
    queue: TranscriptionQueue,
    settings: Arc<Mutex<AppSettings>>,
    app: AppHandle,
}

impl AudioEffectRunner {
    /// Returns Ok even if no audio device is available: errors surface at
    /// record time, when they can be shown to the user.
    pub fn new(
        store: Arc<RecordingStore>,
        queue: TranscriptionQueue,
        settings: Arc<Mutex<AppSettings>>,
        app: AppHandle,
    ) -> Arc<Self> {
        let recorder = match AudioRecorder::new() {
            Ok(r) => {
                log::info!("AudioRecorder initialized successfully");
                Some(r)
            }
            Err(e) => {
                log::warn!("AudioRecorder init failed (will retry on record): {}", e);
                None
            }
        };

        Arc::new(Self {
            recorder: Arc::new(Mutex::new(recorder)),
            active: Arc::new(Mutex::new(HashMap::new())),
            store,
            queue,
            settings,
            app,
        })
    }
}

impl EffectRunner for AudioEffectRunner {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>) {
        match effect {
            Effect::StartAudio { id } => {
                let recorder = self.recorder.clone();
                let active = self.active.clone();
                let store = self.store.clone();

                tokio::spawn(async move {
                    let wav_path = store.audio_path_for(id);

                    // Device bring-up blocks briefly on the audio thread
                    // handshake; keep it off the async threads.
                    let start_result = tokio::task::spawn_blocking(move || {
                        let mut guard = recorder.lock().unwrap();
                        if guard.is_none() {
                            match AudioRecorder::new() {
                                Ok(r) => *guard = Some(r),
                                Err(e) => {
                                    log::error!("Failed to initialize audio recorder: {}", e);
                                    return Err(e.to_string());
                                }
                            }
                        }
                        match guard.as_ref() {
                            Some(rec) => rec
                                .start(wav_path.clone())
                                .map(|handle| (handle, wav_path))
                                .map_err(|e| e.to_string()),
                            None => Err("Audio recorder unavailable".to_string()),
                        }
                    })
                    .await;

                    match start_result {
                        Ok(Ok((handle, wav_path))) => {
                            log::info!("Audio recording started: {:?}", wav_path);
                            active.lock().unwrap().insert(id, handle);
                            let _ = tx.send(Event::AudioStartOk { id, wav_path }).await;
                        }
                        Ok(Err(err)) => {
                            log::error!("Failed to start audio recording: {}", err);
                            let _ = tx.send(Event::AudioStartFail { id, err }).await;
                        }
                        Err(e) => {
                            let _ = tx
                                .send(Event::AudioStartFail {
                                    id,
                                    err: e.to_string(),
                                })
                                .await;
                        }
                    }
                });
            }

            Effect::PauseAudio { id } => {
                let active = self.active.clone();
                tokio::spawn(async move {
                    match active.lock().unwrap().get(&id).map(|h| h.pause()) {
                        Some(Ok(())) => log::info!("Recording paused: {}", id),
                        Some(Err(e)) => log::warn!("Pause failed for {}: {}", id, e),
                        None => log::warn!("PauseAudio: no active handle for id={}", id),
                    }
                });
            }

            Effect::ResumeAudio { id } => {
                let active = self.active.clone();
                tokio::spawn(async move {
                    match active.lock().unwrap().get(&id).map(|h| h.resume()) {
                        Some(Ok(())) => log::info!("Recording resumed: {}", id),
                        Some(Err(e)) => log::warn!("Resume failed for {}: {}", id, e),
                        None => log::warn!("ResumeAudio: no active handle for id={}", id),
                    }
                });
            }

            Effect::StopAudio { id } => {
                let active = self.active.clone();
                tokio::spawn(async move {
                    let handle = active.lock().unwrap().remove(&id);
                    let Some(handle) = handle else {
                        log::warn!("StopAudio: no active handle for id={}", id);
                        let _ = tx.send(Event::AudioStopOk { id }).await;
                        return;
                    };

                    let stop_result = tokio::task::spawn_blocking(move || handle.stop()).await;
                    match stop_result {
                        Ok(Ok(path)) => {
                            log::info!("Audio recording stopped: {:?}", path);
                            let _ = tx.send(Event::AudioStopOk { id }).await;
                        }
                        Ok(Err(e)) => {
                            log::error!("Failed to stop audio recording: {}", e);
                            let _ = tx
                                .send(Event::AudioStopFail {
                                    id,
                                    err: e.to_string(),
                                })
                                .await;
                        }
                        Err(e) => {
                            let _ = tx
                                .send(Event::AudioStopFail {
                                    id,
                                    err: e.to_string(),
                                })
                                .await;
                        }
                    }
                });
            }

            Effect::SaveRecording {
                id,
                name,
                wav_path,
                duration_secs,
            } => {
                let store = self.store.clone();
                let queue = self.queue.clone();
                let settings = self.settings.clone();
                let app = self.app.clone();

                tokio::spawn(async move {
                    let recording = Recording {
                        id: id.to_string(),
                        name,
                        audio_path: wav_path,
                        mime_type: "audio/wav".to_string(),
                        duration_secs,
                        created_at: Utc::now(),
                        uploaded: false,
                        transcript: TranscriptState::Pending,
                        compiled_form: None,
                    };

                    let save_result = tokio::task::spawn_blocking({
                        let store = store.clone();
                        let recording = recording.clone();
                        move || store.save(&recording)
                    })
                    .await;

                    match save_result {
                        Ok(Ok(())) => {
                            log::info!(
                                "Recording saved: {} ({}s) as {}",
                                recording.name,
                                recording.duration_secs,
                                recording.id
                            );
                            let _ = app.emit("recording-saved", &recording);

                            let auto_transcribe = settings.lock().unwrap().auto_transcribe;
                            if auto_transcribe {
                                queue.enqueue(&recording.id);
                            }
                        }
                        Ok(Err(e)) => {
                            log::error!("Failed to persist recording {}: {}", recording.id, e);
                            let _ = app.emit("capture-error", e.to_string());
                        }
                        Err(e) => {
                            log::error!("Persist task failed for {}: {}", recording.id, e);
                            let _ = app.emit("capture-error", e.to_string());
                        }
                    }
                });
            }

            Effect::StartTick { id } => {
                let active = self.active.clone();
                tokio::spawn(async move {
                    // One tick per second while the session holds the
                    // device; the reducer decides whether a tick counts.
                    let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
                    interval.tick().await; // first tick fires immediately; skip it
                    loop {
                        interval.tick().await;
                        let is_active = active.lock().unwrap().contains_key(&id);
                        if !is_active {
                            log::debug!("Tick stopping - session {} no longer active", id);
                            break;
                        }
                        if tx.send(Event::Tick { id }).await.is_err() {
                            log::debug!("Tick stopping - channel closed");
                            break;
                        }
                    }
                });
            }

            Effect::NotifyError { message } => {
                log::error!("Capture error: {}", message);
                let _ = self.app.emit("capture-error", message);
            }

            Effect::EmitUi => {
                // Handled in the state loop, not here.
                unreachable!("EmitUi should be handled in the capture loop");
            }
        }
    }
}
