//! End-to-end lifecycle test against the mock backend
//!
//! Mirrors the happy path: capture produces a record, the worker picks it
//! up and transcribes it, the user processes it, and the record freezes.
//! Runs entirely offline; the mock backend stands in for the remote
//! services exactly as it does in development composition.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::sync::mpsc;

use fieldvoice_lib::pipeline::{
    self, transcription_queue, PipelineError, ProcessingState,
};
use fieldvoice_lib::remote::backend::{Backend, MockBackend};
use fieldvoice_lib::remote::types::{FormBundle, User};
use fieldvoice_lib::session::SessionData;
use fieldvoice_lib::settings::AppSettings;
use fieldvoice_lib::store::{Recording, RecordingStore, TranscriptState};

fn form_bundle() -> FormBundle {
    FormBundle {
        form_schema: json!({"nodes": []}),
        form_schema_name: "site_visit".to_string(),
        form_schema_example_data: json!({}),
        form_schema_choices: json!([]),
    }
}

fn session() -> SessionData {
    SessionData {
        token: "mock-jwt-token-1-0".to_string(),
        user: User {
            id: "1".to_string(),
            email: "demo@example.com".to_string(),
            name: "Demo User".to_string(),
        },
    }
}

async fn wait_for_state(
    store: &RecordingStore,
    id: &str,
    expected: ProcessingState,
) -> Recording {
    for _ in 0..200 {
        if let Some(recording) = store.get(id).unwrap() {
            if ProcessingState::of(&recording) == expected {
                return recording;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("recording {} never reached {:?}", id, expected);
}

#[tokio::test]
async fn capture_to_processed_full_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(RecordingStore::new(dir.path().to_path_buf()).unwrap());
    let backend: Arc<dyn Backend> = Arc::new(MockBackend::without_delay());
    let settings = Arc::new(Mutex::new(AppSettings::default()));
    let (events_tx, _events_rx) = mpsc::unbounded_channel();

    let (queue, worker) = transcription_queue(
        store.clone(),
        backend.clone(),
        settings,
        events_tx,
    );
    tokio::spawn(worker.run());

    // A 5-second recording named "Test", as the capture layer would save it.
    let id = uuid::Uuid::new_v4();
    let audio_path = store.audio_path_for(id);
    std::fs::write(&audio_path, b"RIFF....WAVEfmt ").unwrap();
    let recording = Recording {
        id: id.to_string(),
        name: "Test".to_string(),
        audio_path,
        mime_type: "audio/wav".to_string(),
        duration_secs: 5,
        created_at: Utc::now(),
        uploaded: false,
        transcript: TranscriptState::Pending,
        compiled_form: None,
    };
    store.save(&recording).unwrap();

    let listed = store.get_all().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].duration_secs, 5);
    assert!(!listed[0].uploaded);

    // On load, everything pending is queued automatically.
    assert_eq!(queue.enqueue_pending(&store).unwrap(), 1);

    let transcribed =
        wait_for_state(&store, &recording.id, ProcessingState::Transcribed).await;
    let text = transcribed.transcript_text().expect("transcript text");
    assert!(!text.trim().is_empty());

    // Process: compiled form lands on the record and uploaded flips.
    let processed = pipeline::process_recording(
        &store,
        backend.as_ref(),
        Some(&session()),
        &recording.id,
        form_bundle(),
    )
    .await
    .unwrap();
    assert!(processed.uploaded);
    let compiled = processed.compiled_form.as_ref().expect("compiled form");
    assert!(compiled.is_array());
    assert_eq!(ProcessingState::of(&processed), ProcessingState::Processed);

    // The record is frozen: no edits, no second processing.
    let edit = pipeline::update_transcription(&store, &recording.id, "nope".to_string());
    assert!(matches!(edit, Err(PipelineError::AlreadyUploaded)));
    let again = pipeline::process_recording(
        &store,
        backend.as_ref(),
        Some(&session()),
        &recording.id,
        form_bundle(),
    )
    .await;
    assert!(matches!(again, Err(PipelineError::AlreadyUploaded)));
}

#[tokio::test]
async fn transcription_survives_missing_audio_with_a_stored_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(RecordingStore::new(dir.path().to_path_buf()).unwrap());
    let backend: Arc<dyn Backend> = Arc::new(MockBackend::without_delay());
    let settings = Arc::new(Mutex::new(AppSettings::default()));
    let (events_tx, _events_rx) = mpsc::unbounded_channel();

    let (queue, worker) = transcription_queue(
        store.clone(),
        backend.clone(),
        settings,
        events_tx,
    );
    tokio::spawn(worker.run());

    // Audio file deliberately absent: the mock backend fails to read it.
    let recording = Recording {
        id: "no-audio".to_string(),
        name: "Broken".to_string(),
        audio_path: dir.path().join("missing.wav"),
        mime_type: "audio/wav".to_string(),
        duration_secs: 3,
        created_at: Utc::now(),
        uploaded: false,
        transcript: TranscriptState::Pending,
        compiled_form: None,
    };
    store.save(&recording).unwrap();
    queue.enqueue(&recording.id);

    let failed =
        wait_for_state(&store, &recording.id, ProcessingState::TranscriptionFailed).await;
    match &failed.transcript {
        TranscriptState::Failed { error } => assert!(!error.is_empty()),
        other => panic!("expected Failed, got {:?}", other),
    }

    // The failed record cannot be processed.
    let result = pipeline::process_recording(
        &store,
        backend.as_ref(),
        Some(&session()),
        &recording.id,
        form_bundle(),
    )
    .await;
    assert!(matches!(result, Err(PipelineError::EmptyTranscription)));
}
