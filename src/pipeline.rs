//! Recording lifecycle orchestrator
//!
//! Computes each recording's presentation state and drives the
//! transcribe -> compile pipeline. Transcription runs through an explicit
//! queue keyed by recording id: a single worker drains ids in FIFO order,
//! and a pending set guarantees at most one in-flight transcription per
//! record, so completion order is deterministic and duplicate triggers
//! collapse.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::remote::backend::Backend;
use crate::remote::maui::MauiError;
use crate::remote::types::{FormBundle, FormCompilationRequest};
use crate::session::SessionData;
use crate::settings::AppSettings;
use crate::store::{Recording, RecordingStore, StoreError, TranscriptState};

/// Presentation state of a recording, derived from the record; never
/// stored separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingState {
    NeedsTranscription,
    Transcribing,
    Transcribed,
    TranscriptionFailed,
    Processed,
}

impl ProcessingState {
    pub fn of(recording: &Recording) -> Self {
        if recording.uploaded && recording.compiled_form.is_some() {
            return ProcessingState::Processed;
        }
        match &recording.transcript {
            TranscriptState::Pending => ProcessingState::NeedsTranscription,
            TranscriptState::Transcribing => ProcessingState::Transcribing,
            TranscriptState::Transcribed { .. } => ProcessingState::Transcribed,
            TranscriptState::Failed { .. } => ProcessingState::TranscriptionFailed,
        }
    }
}

#[derive(Debug)]
pub enum PipelineError {
    NotFound,
    /// The record is already processed; its transcription is frozen.
    AlreadyUploaded,
    /// Form compilation needs a non-empty transcription.
    EmptyTranscription,
    NotAuthenticated,
    InvalidState(&'static str),
    Store(StoreError),
    Remote(MauiError),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::NotFound => write!(f, "Recording not found"),
            PipelineError::AlreadyUploaded => {
                write!(f, "Recording was already processed and can no longer change")
            }
            PipelineError::EmptyTranscription => {
                write!(f, "Recording has no transcription to process")
            }
            PipelineError::NotAuthenticated => write!(f, "Not logged in"),
            PipelineError::InvalidState(msg) => write!(f, "{}", msg),
            PipelineError::Store(e) => write!(f, "{}", e),
            PipelineError::Remote(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<StoreError> for PipelineError {
    fn from(e: StoreError) -> Self {
        PipelineError::Store(e)
    }
}

impl From<MauiError> for PipelineError {
    fn from(e: MauiError) -> Self {
        PipelineError::Remote(e)
    }
}

/// Announcements for views (and tests) that a record changed on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    RecordingUpdated { id: String },
}

type PendingSet = Arc<Mutex<HashSet<String>>>;

/// Enqueue side of the transcription queue. Cheap to clone.
#[derive(Clone)]
pub struct TranscriptionQueue {
    tx: mpsc::UnboundedSender<String>,
    pending: PendingSet,
}

impl TranscriptionQueue {
    /// Queue a recording for transcription. Returns false when the record
    /// is already queued or in flight.
    pub fn enqueue(&self, id: &str) -> bool {
        let mut pending = self.pending.lock().unwrap();
        if !pending.insert(id.to_string()) {
            return false;
        }
        if self.tx.send(id.to_string()).is_err() {
            pending.remove(id);
            return false;
        }
        true
    }

    /// Queue every stored record that still needs transcription. Called on
    /// startup and whenever a fresh recording lands.
    pub fn enqueue_pending(&self, store: &RecordingStore) -> Result<usize, StoreError> {
        let mut queued = 0;
        for recording in store.get_all()? {
            if ProcessingState::of(&recording) == ProcessingState::NeedsTranscription
                && self.enqueue(&recording.id)
            {
                queued += 1;
            }
        }
        Ok(queued)
    }
}

/// Worker side of the queue; run it on the async runtime.
pub struct TranscriptionWorker {
    store: Arc<RecordingStore>,
    backend: Arc<dyn Backend>,
    settings: Arc<Mutex<AppSettings>>,
    events: mpsc::UnboundedSender<PipelineEvent>,
    rx: mpsc::UnboundedReceiver<String>,
    pending: PendingSet,
}

/// Build the queue/worker pair. The worker future must be spawned by the
/// caller so composition controls which runtime it lands on.
pub fn transcription_queue(
    store: Arc<RecordingStore>,
    backend: Arc<dyn Backend>,
    settings: Arc<Mutex<AppSettings>>,
    events: mpsc::UnboundedSender<PipelineEvent>,
) -> (TranscriptionQueue, TranscriptionWorker) {
    let (tx, rx) = mpsc::unbounded_channel();
    let pending: PendingSet = Arc::new(Mutex::new(HashSet::new()));
    let queue = TranscriptionQueue {
        tx,
        pending: pending.clone(),
    };
    let worker = TranscriptionWorker {
        store,
        backend,
        settings,
        events,
        rx,
        pending,
    };
    (queue, worker)
}

impl TranscriptionWorker {
    pub async fn run(mut self) {
        log::info!("Transcription worker started");
        while let Some(id) = self.rx.recv().await {
            self.transcribe_one(&id).await;
            self.pending.lock().unwrap().remove(&id);
        }
        log::info!("Transcription worker ended");
    }

    async fn transcribe_one(&self, id: &str) {
        let recording = match self.store.get(id) {
            Ok(Some(recording)) => recording,
            Ok(None) => {
                log::debug!("Skipping transcription: {} was deleted while queued", id);
                return;
            }
            Err(e) => {
                log::error!("Could not load {} for transcription: {}", id, e);
                return;
            }
        };

        if ProcessingState::of(&recording) != ProcessingState::NeedsTranscription {
            log::debug!("Skipping transcription: {} no longer needs it", id);
            return;
        }

        let mut recording = recording;
        recording.transcript = TranscriptState::Transcribing;
        if let Err(e) = self.store.save(&recording) {
            log::error!("Could not mark {} as transcribing: {}", id, e);
            return;
        }
        self.notify(id);

        let language = self.settings.lock().unwrap().language.clone();
        let result = self
            .backend
            .transcribe(&recording.audio_path, &language)
            .await;

        // Reload before writing back: the user may have renamed or deleted
        // the record while the upload was in flight.
        let mut recording = match self.store.get(id) {
            Ok(Some(recording)) => recording,
            Ok(None) => {
                log::debug!("Dropping transcript: {} was deleted mid-flight", id);
                return;
            }
            Err(e) => {
                log::error!("Could not reload {} after transcription: {}", id, e);
                return;
            }
        };

        match result {
            Ok(response) => {
                log::info!(
                    "Transcribed {} ({} chars, language={:?})",
                    id,
                    response.text.len(),
                    response.language
                );
                recording.transcript = TranscriptState::Transcribed {
                    text: response.text,
                };
            }
            Err(e) => {
                log::error!("Transcription of {} failed: {}", id, e);
                recording.transcript = TranscriptState::Failed {
                    error: e.to_string(),
                };
            }
        }

        if let Err(e) = self.store.save(&recording) {
            log::error!("Could not persist transcription result for {}: {}", id, e);
            return;
        }
        self.notify(id);
    }

    fn notify(&self, id: &str) {
        let _ = self.events.send(PipelineEvent::RecordingUpdated { id: id.to_string() });
    }
}

/// Clear a failed transcription and queue the record again. Legal only in
/// the failed state.
pub fn retry_transcription(
    store: &RecordingStore,
    queue: &TranscriptionQueue,
    id: &str,
) -> Result<(), PipelineError> {
    let mut recording = store.get(id)?.ok_or(PipelineError::NotFound)?;
    match recording.transcript {
        TranscriptState::Failed { .. } => {
            recording.transcript = TranscriptState::Pending;
            store.save(&recording)?;
            queue.enqueue(id);
            Ok(())
        }
        _ => Err(PipelineError::InvalidState(
            "Only failed transcriptions can be retried",
        )),
    }
}

/// Overwrite the transcription text. Rejected once the record has been
/// processed, and meaningless before a transcription exists.
pub fn update_transcription(
    store: &RecordingStore,
    id: &str,
    text: String,
) -> Result<Recording, PipelineError> {
    let mut recording = store.get(id)?.ok_or(PipelineError::NotFound)?;
    if recording.uploaded {
        return Err(PipelineError::AlreadyUploaded);
    }
    match recording.transcript {
        TranscriptState::Transcribed { .. } => {
            recording.transcript = TranscriptState::Transcribed { text };
            store.save(&recording)?;
            Ok(recording)
        }
        _ => Err(PipelineError::InvalidState(
            "Recording has no transcription to edit",
        )),
    }
}

/// Submit the transcription for form compilation. On success the compiled
/// form is stored and `uploaded` flips to true, permanently. On failure the
/// record is left untouched; the error is for the caller to display.
pub async fn process_recording(
    store: &RecordingStore,
    backend: &dyn Backend,
    session: Option<&SessionData>,
    id: &str,
    bundle: FormBundle,
) -> Result<Recording, PipelineError> {
    if session.is_none() {
        return Err(PipelineError::NotAuthenticated);
    }

    let mut recording = store.get(id)?.ok_or(PipelineError::NotFound)?;
    if recording.uploaded {
        return Err(PipelineError::AlreadyUploaded);
    }

    let text = recording
        .transcript_text()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .ok_or(PipelineError::EmptyTranscription)?
        .to_string();

    let request = FormCompilationRequest::new(bundle, text);
    let compiled = backend.compile_form(&request).await?;

    recording.compiled_form = Some(compiled);
    recording.uploaded = true;
    store.save(&recording)?;
    log::info!("Processed {}: compiled form stored", id);
    Ok(recording)
}
