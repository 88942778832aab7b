mod audio;
pub mod capture;
pub mod config;
mod effects;
pub mod pipeline;
pub mod remote;
pub mod session;
pub mod settings;
pub mod store;

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tauri::{AppHandle, Emitter, Manager};
use tokio::sync::mpsc;

use capture::{reduce, Effect, Event, State};
use effects::{AudioEffectRunner, EffectRunner};
use pipeline::{PipelineEvent, TranscriptionQueue};
use remote::backend::{Backend, MockBackend, RemoteBackend};
use remote::types::{FormBundle, User};
use session::{SessionData, SessionStore};
use settings::AppSettings;
use store::{Recording, RecordingStore};

/// Capture state sent to the frontend via Tauri events.
/// Tagged union format: { "status": "idle" } or
/// { "status": "recording", "name": "...", "elapsedSecs": 5 }
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum UiState {
    Idle,
    Arming,
    Recording {
        name: String,
        #[serde(rename = "elapsedSecs")]
        elapsed_secs: u64,
    },
    Paused {
        name: String,
        #[serde(rename = "elapsedSecs")]
        elapsed_secs: u64,
    },
    Saving,
}

/// Convert internal capture State to UiState for the frontend.
fn state_to_ui(state: &State) -> UiState {
    match state {
        State::Idle => UiState::Idle,
        State::Arming { .. } => UiState::Arming,
        State::Recording { session, .. } => UiState::Recording {
            name: session.name.clone(),
            elapsed_secs: session.elapsed_secs,
        },
        State::Paused { session, .. } => UiState::Paused {
            name: session.name.clone(),
            elapsed_secs: session.elapsed_secs,
        },
        State::Stopping { .. } => UiState::Saving,
    }
}

fn publish_capture_state(app: &AppHandle, snapshot: &Mutex<UiState>, state: &State) {
    let ui_state = state_to_ui(state);
    *snapshot.lock().unwrap() = ui_state.clone();
    if let Err(e) = app.emit("recorder-state", &ui_state) {
        log::warn!("Failed to emit capture state to UI: {:?}", e);
    }
}

/// Services owned by the application root and injected into commands.
pub struct AppServices {
    store: Arc<RecordingStore>,
    session_store: Arc<SessionStore>,
    backend: Arc<dyn Backend>,
    queue: TranscriptionQueue,
    settings: Arc<Mutex<AppSettings>>,
    capture_tx: mpsc::Sender<Event>,
    capture_state: Arc<Mutex<UiState>>,
}

impl AppServices {
    fn capture_snapshot(&self) -> UiState {
        self.capture_state.lock().unwrap().clone()
    }

    async fn dispatch(&self, event: Event) -> Result<(), String> {
        self.capture_tx
            .send(event)
            .await
            .map_err(|e| e.to_string())
    }
}

/// Run the capture state loop: reduce events, publish state, hand the
/// remaining effects to the runner.
async fn run_capture_loop(
    app: AppHandle,
    mut rx: mpsc::Receiver<Event>,
    tx: mpsc::Sender<Event>,
    effect_runner: Arc<dyn EffectRunner>,
    snapshot: Arc<Mutex<UiState>>,
    settings: Arc<Mutex<AppSettings>>,
) {
    let mut state = State::default();

    publish_capture_state(&app, &snapshot, &state);
    log::info!("Capture loop started");

    while let Some(event) = rx.recv().await {
        log::debug!("Capture event: {:?}", event);

        let old_discriminant = std::mem::discriminant(&state);
        let (next, effects) = reduce(&state, event);
        let new_discriminant = std::mem::discriminant(&next);

        if old_discriminant != new_discriminant {
            log::info!("Capture transition: {:?} -> {:?}", state, next);
        }

        state = next;

        // Runaway-session guard: force a stop once the limit is reached.
        if let State::Recording { session, .. } = &state {
            let max_secs = settings.lock().unwrap().max_recording_secs;
            if session.elapsed_secs >= max_secs {
                log::warn!(
                    "Recording {} auto-stopped after {}s (max duration reached)",
                    session.recording_id,
                    session.elapsed_secs
                );
                let _ = tx.try_send(Event::StopRequested);
            }
        }

        for effect in effects {
            match effect {
                Effect::EmitUi => publish_capture_state(&app, &snapshot, &state),
                other => effect_runner.spawn(other, tx.clone()),
            }
        }
    }

    log::info!("Capture loop ended");
}

// ============================================================================
// Capture commands
// ============================================================================

#[tauri::command]
async fn start_recording(
    name: String,
    services: tauri::State<'_, AppServices>,
) -> Result<(), String> {
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err("Recording name must not be empty".to_string());
    }
    if !matches!(services.capture_snapshot(), UiState::Idle) {
        return Err("A recording is already in progress".to_string());
    }
    services.dispatch(Event::StartRequested { name }).await
}

#[tauri::command]
async fn pause_recording(services: tauri::State<'_, AppServices>) -> Result<(), String> {
    if !matches!(services.capture_snapshot(), UiState::Recording { .. }) {
        return Err("No active recording to pause".to_string());
    }
    services.dispatch(Event::PauseRequested).await
}

#[tauri::command]
async fn resume_recording(services: tauri::State<'_, AppServices>) -> Result<(), String> {
    if !matches!(services.capture_snapshot(), UiState::Paused { .. }) {
        return Err("No paused recording to resume".to_string());
    }
    services.dispatch(Event::ResumeRequested).await
}

#[tauri::command]
async fn stop_recording(services: tauri::State<'_, AppServices>) -> Result<(), String> {
    if !matches!(
        services.capture_snapshot(),
        UiState::Recording { .. } | UiState::Paused { .. }
    ) {
        return Err("No active recording to stop".to_string());
    }
    services.dispatch(Event::StopRequested).await
}

// ============================================================================
// Store commands
// ============================================================================

#[tauri::command]
fn list_recordings(services: tauri::State<'_, AppServices>) -> Result<Vec<Recording>, String> {
    services.store.get_all().map_err(|e| {
        log::error!("Failed to list recordings: {}", e);
        e.to_string()
    })
}

#[tauri::command]
fn get_recording(
    id: String,
    services: tauri::State<'_, AppServices>,
) -> Result<Option<Recording>, String> {
    services.store.get(&id).map_err(|e| e.to_string())
}

#[tauri::command]
fn delete_recording(id: String, services: tauri::State<'_, AppServices>) -> Result<(), String> {
    services.store.delete(&id).map_err(|e| {
        log::error!("Failed to delete recording {}: {}", id, e);
        e.to_string()
    })
}

// ============================================================================
// Lifecycle commands
// ============================================================================

#[tauri::command]
async fn update_transcription(
    id: String,
    text: String,
    app: AppHandle,
    services: tauri::State<'_, AppServices>,
) -> Result<Recording, String> {
    let recording = pipeline::update_transcription(&services.store, &id, text)
        .map_err(|e| e.to_string())?;
    let _ = app.emit("recording-updated", &id);
    Ok(recording)
}

#[tauri::command]
async fn retry_transcription(
    id: String,
    app: AppHandle,
    services: tauri::State<'_, AppServices>,
) -> Result<(), String> {
    pipeline::retry_transcription(&services.store, &services.queue, &id)
        .map_err(|e| e.to_string())?;
    let _ = app.emit("recording-updated", &id);
    Ok(())
}

#[tauri::command]
async fn process_recording(
    id: String,
    form: FormBundle,
    app: AppHandle,
    services: tauri::State<'_, AppServices>,
) -> Result<Recording, String> {
    let session = services.session_store.load();
    let recording = pipeline::process_recording(
        &services.store,
        services.backend.as_ref(),
        session.as_ref(),
        &id,
        form,
    )
    .await
    .map_err(|e| e.to_string())?;
    let _ = app.emit("recording-updated", &id);
    Ok(recording)
}

// ============================================================================
// Session commands
// ============================================================================

#[tauri::command]
async fn login(
    email: String,
    password: String,
    services: tauri::State<'_, AppServices>,
) -> Result<User, String> {
    let auth_session = services
        .backend
        .login(&email, &password)
        .await
        .map_err(|e| e.to_string())?;
    let session: SessionData = auth_session.into();
    services.session_store.save(&session)?;

    // MAUI account provisioning is best effort and must not delay or fail
    // the login; outcomes are logged.
    let backend = services.backend.clone();
    let user_email = session.user.email.clone();
    let token = session.token.clone();
    tokio::spawn(async move {
        backend.provision(&user_email, &token).await;
    });

    Ok(session.user)
}

#[tauri::command]
fn logout(services: tauri::State<'_, AppServices>) -> Result<(), String> {
    services.session_store.clear()
}

#[tauri::command]
fn session_status(services: tauri::State<'_, AppServices>) -> Result<Option<User>, String> {
    Ok(services.session_store.load().map(|session| session.user))
}

#[tauri::command]
async fn validate_session(
    services: tauri::State<'_, AppServices>,
) -> Result<Option<User>, String> {
    let Some(session) = services.session_store.load() else {
        return Ok(None);
    };

    match services.backend.validate(&session.token).await {
        Ok(user) => {
            let refreshed = SessionData {
                token: session.token,
                user: user.clone(),
            };
            if let Err(e) = services.session_store.save(&refreshed) {
                log::warn!("Could not refresh stored session: {}", e);
            }
            Ok(Some(user))
        }
        Err(remote::AuthError::Rejected { .. }) => {
            // The token is dead; drop the session so the UI shows login.
            let _ = services.session_store.clear();
            Ok(None)
        }
        Err(e) => Err(e.to_string()),
    }
}

// ============================================================================
// Settings commands
// ============================================================================

#[tauri::command]
fn get_settings(services: tauri::State<'_, AppServices>) -> Result<AppSettings, String> {
    Ok(services.settings.lock().unwrap().clone())
}

#[tauri::command]
fn save_settings(
    settings: AppSettings,
    app: AppHandle,
    services: tauri::State<'_, AppServices>,
) -> Result<(), String> {
    settings::save_settings(&app, &settings)?;
    *services.settings.lock().unwrap() = settings;
    Ok(())
}

// ============================================================================
// Application entry point
// ============================================================================

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    tauri::Builder::default()
        .setup(|app| {
            // Set up logging in debug mode
            if cfg!(debug_assertions) {
                app.handle().plugin(
                    tauri_plugin_log::Builder::default()
                        .level(log::LevelFilter::Debug)
                        .build(),
                )?;
            }

            let config = config::get();
            let store = Arc::new(RecordingStore::open_default()?);
            let session_store = Arc::new(SessionStore::open_default());

            // Backend selection happens exactly once, here.
            let backend: Arc<dyn Backend> = if config.use_mock_backend() {
                log::info!("Using mock backend (remote services not configured)");
                Arc::new(MockBackend::new())
            } else {
                Arc::new(RemoteBackend::new(config, session_store.clone()))
            };

            let settings = Arc::new(Mutex::new(settings::load_settings(app.handle())));

            // Transcription queue + worker.
            let (pipeline_tx, mut pipeline_rx) = mpsc::unbounded_channel();
            let (queue, worker) = pipeline::transcription_queue(
                store.clone(),
                backend.clone(),
                settings.clone(),
                pipeline_tx,
            );
            tauri::async_runtime::spawn(worker.run());

            // Forward pipeline announcements to the frontend.
            let app_handle = app.handle().clone();
            tauri::async_runtime::spawn(async move {
                while let Some(event) = pipeline_rx.recv().await {
                    match event {
                        PipelineEvent::RecordingUpdated { id } => {
                            let _ = app_handle.emit("recording-updated", &id);
                        }
                    }
                }
            });

            // Capture event loop.
            let (capture_tx, capture_rx) = mpsc::channel::<Event>(32);
            let capture_state = Arc::new(Mutex::new(UiState::Idle));
            let effect_runner = AudioEffectRunner::new(
                store.clone(),
                queue.clone(),
                settings.clone(),
                app.handle().clone(),
            );
            let app_handle = app.handle().clone();
            tauri::async_runtime::spawn(run_capture_loop(
                app_handle,
                capture_rx,
                capture_tx.clone(),
                effect_runner,
                capture_state.clone(),
                settings.clone(),
            ));

            // Recordings left without a transcript by a previous run are
            // picked up now.
            if settings.lock().unwrap().auto_transcribe {
                match queue.enqueue_pending(&store) {
                    Ok(0) => {}
                    Ok(count) => log::info!("Queued {} recordings for transcription", count),
                    Err(e) => log::warn!("Could not scan store for pending recordings: {}", e),
                }
            }

            app.manage(AppServices {
                store,
                session_store,
                backend,
                queue,
                settings,
                capture_tx,
                capture_state,
            });

            log::info!("FieldVoice started");
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            start_recording,
            pause_recording,
            resume_recording,
            stop_recording,
            list_recordings,
            get_recording,
            delete_recording,
            update_transcription,
            retry_transcription,
            process_recording,
            login,
            logout,
            session_status,
            validate_session,
            get_settings,
            save_settings,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
