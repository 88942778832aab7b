//! Local recording store
//!
//! Durable, keyed storage of recordings across app restarts. Each recording
//! is one `<id>.json` record in the store directory with its WAV payload at
//! `<id>.wav` beside it. Records are full-overwrite on save; callers merge
//! fields before writing back.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Errors from the storage layer. No internal retries; callers decide what
/// to surface.
#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Serde(serde_json::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "Storage I/O error: {}", e),
            StoreError::Serde(e) => write!(f, "Storage serialization error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(e) => Some(e),
            StoreError::Serde(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serde(e)
    }
}

/// What happened to a recording's transcript. One tagged value per record,
/// so "error and text both set" cannot be represented.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum TranscriptState {
    Pending,
    Transcribing,
    Transcribed { text: String },
    Failed { error: String },
}

impl Default for TranscriptState {
    fn default() -> Self {
        TranscriptState::Pending
    }
}

/// A captured audio clip plus its processing metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recording {
    pub id: String,
    pub name: String,
    /// WAV payload owned by the store, kept beside the record.
    pub audio_path: PathBuf,
    pub mime_type: String,
    /// Whole seconds spent capturing, paused time excluded.
    pub duration_secs: u64,
    pub created_at: DateTime<Utc>,
    /// false -> true only, flipped when the compiled form is accepted.
    pub uploaded: bool,
    #[serde(default)]
    pub transcript: TranscriptState,
    #[serde(default)]
    pub compiled_form: Option<Value>,
}

impl Recording {
    /// The transcript text, if transcription has succeeded.
    pub fn transcript_text(&self) -> Option<&str> {
        match &self.transcript {
            TranscriptState::Transcribed { text } => Some(text),
            _ => None,
        }
    }
}

pub struct RecordingStore {
    root: PathBuf,
}

impl RecordingStore {
    pub fn new(root: PathBuf) -> Result<Self, StoreError> {
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Store rooted at `<data_dir>/fieldvoice/recordings`.
    pub fn open_default() -> Result<Self, StoreError> {
        let root = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fieldvoice")
            .join("recordings");
        Self::new(root)
    }

    /// Where the WAV payload for `id` lives. The capture layer writes the
    /// finished audio here directly, so saving a record never copies bytes.
    pub fn audio_path_for(&self, id: Uuid) -> PathBuf {
        self.root.join(format!("{}.wav", id))
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{}.json", id))
    }

    /// Insert or fully overwrite the record at its id.
    pub fn save(&self, recording: &Recording) -> Result<(), StoreError> {
        let path = self.record_path(&recording.id);
        let contents = serde_json::to_string_pretty(recording)?;
        write_atomically(&path, &contents)?;
        Ok(())
    }

    /// Same as `save`; callers pass a full record, merged beforehand.
    pub fn update(&self, recording: &Recording) -> Result<(), StoreError> {
        self.save(recording)
    }

    /// `None` when the id is unknown; parse failures propagate.
    pub fn get(&self, id: &str) -> Result<Option<Recording>, StoreError> {
        match fs::read_to_string(self.record_path(id)) {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Every stored record, most recent first. Ties on the timestamp fall
    /// back to id order so the result is stable across calls.
    pub fn get_all(&self) -> Result<Vec<Recording>, StoreError> {
        let mut recordings = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().map(|ext| ext == "json").unwrap_or(false) {
                match read_record(&path) {
                    Ok(recording) => recordings.push(recording),
                    Err(e) => {
                        // One unreadable record must not take the whole
                        // list down with it.
                        log::warn!("Skipping unreadable record {:?}: {}", path, e);
                    }
                }
            }
        }
        recordings.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(recordings)
    }

    /// Remove the record and its audio. Unknown ids are a no-op.
    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        remove_if_present(&self.record_path(id))?;
        remove_if_present(&self.root.join(format!("{}.wav", id)))?;
        Ok(())
    }
}

fn read_record(path: &Path) -> Result<Recording, StoreError> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

fn remove_if_present(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Write to a temp file in the same directory, then rename. Prevents a
/// partial record if the app dies mid-write.
fn write_atomically(path: &Path, contents: &str) -> Result<(), StoreError> {
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)?;

    // On Unix, rename atomically replaces the destination. On Windows it
    // fails if the destination exists, so remove it first.
    if cfg!(windows) {
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }

    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_recording(id: &str, name: &str, created_at: DateTime<Utc>) -> Recording {
        Recording {
            id: id.to_string(),
            name: name.to_string(),
            audio_path: PathBuf::from(format!("/tmp/{}.wav", id)),
            mime_type: "audio/wav".to_string(),
            duration_secs: 5,
            created_at,
            uploaded: false,
            transcript: TranscriptState::Pending,
            compiled_form: None,
        }
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn save_then_get_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordingStore::new(dir.path().to_path_buf()).unwrap();

        let rec = test_recording("a", "First note", ts(0));
        store.save(&rec).unwrap();

        let loaded = store.get("a").unwrap().expect("record should exist");
        assert_eq!(loaded.name, "First note");
        assert_eq!(loaded.duration_secs, 5);
        assert!(!loaded.uploaded);
        assert_eq!(loaded.transcript, TranscriptState::Pending);
    }

    #[test]
    fn get_unknown_id_is_none_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordingStore::new(dir.path().to_path_buf()).unwrap();
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn save_overwrites_existing_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordingStore::new(dir.path().to_path_buf()).unwrap();

        let mut rec = test_recording("a", "Before", ts(0));
        store.save(&rec).unwrap();
        rec.name = "After".to_string();
        rec.transcript = TranscriptState::Transcribed {
            text: "hello".to_string(),
        };
        store.update(&rec).unwrap();

        let loaded = store.get("a").unwrap().unwrap();
        assert_eq!(loaded.name, "After");
        assert_eq!(loaded.transcript_text(), Some("hello"));
        assert_eq!(store.get_all().unwrap().len(), 1);
    }

    #[test]
    fn get_all_orders_by_created_at_descending() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordingStore::new(dir.path().to_path_buf()).unwrap();

        // Inserted out of order on purpose.
        store.save(&test_recording("mid", "mid", ts(50))).unwrap();
        store.save(&test_recording("new", "new", ts(100))).unwrap();
        store.save(&test_recording("old", "old", ts(0))).unwrap();

        let all = store.get_all().unwrap();
        let ids: Vec<&str> = all.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    #[test]
    fn get_all_breaks_timestamp_ties_stably() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordingStore::new(dir.path().to_path_buf()).unwrap();

        store.save(&test_recording("b", "b", ts(0))).unwrap();
        store.save(&test_recording("a", "a", ts(0))).unwrap();

        let first: Vec<String> = store.get_all().unwrap().iter().map(|r| r.id.clone()).collect();
        let second: Vec<String> = store.get_all().unwrap().iter().map(|r| r.id.clone()).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn delete_missing_id_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordingStore::new(dir.path().to_path_buf()).unwrap();

        store.save(&test_recording("a", "a", ts(0))).unwrap();
        store.delete("does-not-exist").unwrap();
        assert_eq!(store.get_all().unwrap().len(), 1);

        store.delete("a").unwrap();
        store.delete("a").unwrap();
        assert!(store.get_all().unwrap().is_empty());
    }

    #[test]
    fn delete_removes_audio_payload_too() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordingStore::new(dir.path().to_path_buf()).unwrap();

        let id = Uuid::new_v4();
        let audio = store.audio_path_for(id);
        fs::write(&audio, b"RIFF").unwrap();

        let mut rec = test_recording(&id.to_string(), "with audio", ts(0));
        rec.audio_path = audio.clone();
        store.save(&rec).unwrap();

        store.delete(&id.to_string()).unwrap();
        assert!(!audio.exists());
    }

    #[test]
    fn transcript_state_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordingStore::new(dir.path().to_path_buf()).unwrap();

        let mut rec = test_recording("a", "a", ts(0));
        rec.transcript = TranscriptState::Failed {
            error: "Transcription failed: 502".to_string(),
        };
        store.save(&rec).unwrap();

        let loaded = store.get("a").unwrap().unwrap();
        assert_eq!(
            loaded.transcript,
            TranscriptState::Failed {
                error: "Transcription failed: 502".to_string()
            }
        );
        assert!(loaded.transcript_text().is_none());
    }

    #[test]
    fn corrupt_record_does_not_break_the_listing() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordingStore::new(dir.path().to_path_buf()).unwrap();

        store.save(&test_recording("ok", "ok", ts(0))).unwrap();
        fs::write(dir.path().join("broken.json"), "{not json").unwrap();

        let all = store.get_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "ok");
    }
}
