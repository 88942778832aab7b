//! Capture session state machine
//!
//! All capture transitions go through `reduce()`, which returns the next
//! state and a list of effects to execute. Device I/O happens in the effect
//! runner, so the machine can be driven and tested without a microphone.

use std::path::PathBuf;
use uuid::Uuid;

/// Ephemeral data for one capture session. Never persisted; a recording
/// record is only built once the session stops cleanly.
#[derive(Debug, Clone)]
pub struct CaptureSession {
    pub recording_id: Uuid,
    /// User-chosen name for the eventual recording.
    pub name: String,
    /// Whole seconds spent capturing. Ticks received while paused do not
    /// count, so this always matches the audio actually written.
    pub elapsed_secs: u64,
}

/// Authoritative capture state; all transitions go through the reducer.
#[derive(Debug, Clone)]
pub enum State {
    Idle,
    /// Waiting for the audio device to come up.
    Arming { session: CaptureSession },
    Recording { session: CaptureSession, wav_path: PathBuf },
    Paused { session: CaptureSession, wav_path: PathBuf },
    /// Waiting for the WAV file to be finalized.
    Stopping { session: CaptureSession, wav_path: PathBuf },
}

impl Default for State {
    fn default() -> Self {
        State::Idle
    }
}

/// Events that can trigger capture transitions, sent from the command
/// surface, the audio service and the tick task.
#[derive(Debug, Clone)]
pub enum Event {
    /// User asked to start a capture. The name is validated (non-blank)
    /// at the command boundary before this is dispatched.
    StartRequested { name: String },
    PauseRequested,
    ResumeRequested,
    StopRequested,
    /// One-second heartbeat while a session is active (includes id to
    /// prevent stale ticks).
    Tick { id: Uuid },

    // Audio events
    AudioStartOk { id: Uuid, wav_path: PathBuf },
    AudioStartFail { id: Uuid, err: String },
    AudioStopOk { id: Uuid },
    AudioStopFail { id: Uuid, err: String },
}

/// Effects to be executed after a transition. The effect runner handles
/// these asynchronously.
#[derive(Debug, Clone)]
pub enum Effect {
    StartAudio { id: Uuid },
    PauseAudio { id: Uuid },
    ResumeAudio { id: Uuid },
    StopAudio { id: Uuid },
    /// Persist the finished session as a recording and announce it so
    /// dependent views refresh.
    SaveRecording {
        id: Uuid,
        name: String,
        wav_path: PathBuf,
        duration_secs: u64,
    },
    /// Start sending `Tick` events once per second while the session lives.
    StartTick { id: Uuid },
    /// Surface a capture failure to the frontend. The session is already
    /// torn down when this fires; nothing was persisted.
    NotifyError { message: String },
    /// Signal to emit capture state to the frontend.
    EmitUi,
}

/// Reducer function: (state, event) -> (next_state, effects)
///
/// Key rules:
/// - Never mutate state directly
/// - Ignore events with stale recording ids
/// - A start request while a session is active leaves it untouched
pub fn reduce(state: &State, event: Event) -> (State, Vec<Effect>) {
    use Effect::*;
    use Event::*;
    use State::*;

    let current_id: Option<Uuid> = match state {
        Idle => None,
        Arming { session }
        | Recording { session, .. }
        | Paused { session, .. }
        | Stopping { session, .. } => Some(session.recording_id),
    };
    let is_stale = |eid: Uuid| current_id != Some(eid);

    match (state, event) {
        // -----------------
        // Idle
        // -----------------
        (Idle, StartRequested { name }) => {
            let session = CaptureSession {
                recording_id: Uuid::new_v4(),
                name,
                elapsed_secs: 0,
            };
            let id = session.recording_id;
            (Arming { session }, vec![StartAudio { id }, EmitUi])
        }
        // Single active session: a concurrent start changes nothing.
        (_, StartRequested { .. }) => (state.clone(), vec![]),

        // -----------------
        // Arming
        // -----------------
        (Arming { session }, AudioStartOk { id, wav_path }) if session.recording_id == id => (
            Recording {
                session: session.clone(),
                wav_path,
            },
            vec![StartTick { id }, EmitUi],
        ),
        // Microphone missing or denied: abort, nothing persisted.
        (Arming { session }, AudioStartFail { id, err }) if session.recording_id == id => {
            (Idle, vec![NotifyError { message: err }, EmitUi])
        }

        // -----------------
        // Recording <-> Paused
        // -----------------
        (Recording { session, wav_path }, PauseRequested) => (
            Paused {
                session: session.clone(),
                wav_path: wav_path.clone(),
            },
            vec![
                PauseAudio {
                    id: session.recording_id,
                },
                EmitUi,
            ],
        ),
        (Paused { session, wav_path }, ResumeRequested) => (
            Recording {
                session: session.clone(),
                wav_path: wav_path.clone(),
            },
            vec![
                ResumeAudio {
                    id: session.recording_id,
                },
                EmitUi,
            ],
        ),

        (Recording { session, wav_path }, Tick { id }) if session.recording_id == id => {
            let mut session = session.clone();
            session.elapsed_secs += 1;
            (
                Recording {
                    session,
                    wav_path: wav_path.clone(),
                },
                vec![EmitUi],
            )
        }
        // The counter freezes while paused.
        (Paused { .. }, Tick { .. }) => (state.clone(), vec![]),

        // -----------------
        // Stopping
        // -----------------
        (Recording { session, wav_path }, StopRequested)
        | (Paused { session, wav_path }, StopRequested) => (
            Stopping {
                session: session.clone(),
                wav_path: wav_path.clone(),
            },
            vec![
                StopAudio {
                    id: session.recording_id,
                },
                EmitUi,
            ],
        ),

        (Stopping { session, wav_path }, AudioStopOk { id }) if session.recording_id == id => (
            Idle,
            vec![
                SaveRecording {
                    id: session.recording_id,
                    name: session.name.clone(),
                    wav_path: wav_path.clone(),
                    duration_secs: session.elapsed_secs,
                },
                EmitUi,
            ],
        ),
        (Stopping { session, .. }, AudioStopFail { id, err }) if session.recording_id == id => {
            (Idle, vec![NotifyError { message: err }, EmitUi])
        }

        // -----------------
        // Stale device/tick events (drop silently)
        // -----------------
        (_, AudioStartOk { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, AudioStartFail { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, AudioStopOk { id }) if is_stale(id) => (state.clone(), vec![]),
        (_, AudioStopFail { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, Tick { id }) if is_stale(id) => (state.clone(), vec![]),

        // -----------------
        // Unhandled: no transition
        // -----------------
        _ => (state.clone(), vec![]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(name: &str) -> (State, Uuid) {
        let (state, effects) = reduce(
            &State::Idle,
            Event::StartRequested {
                name: name.to_string(),
            },
        );
        let id = match &state {
            State::Arming { session } => session.recording_id,
            other => panic!("expected Arming, got {:?}", other),
        };
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::StartAudio { .. })));
        (state, id)
    }

    fn drive(state: State, events: Vec<Event>) -> (State, Vec<Effect>) {
        let mut state = state;
        let mut all_effects = Vec::new();
        for event in events {
            let (next, effects) = reduce(&state, event);
            state = next;
            all_effects.extend(effects);
        }
        (state, all_effects)
    }

    #[test]
    fn idle_start_arms_and_requests_audio() {
        let (state, _) = start("Test");
        assert!(matches!(state, State::Arming { .. }));
    }

    #[test]
    fn start_while_active_leaves_session_untouched() {
        let (state, id) = start("First");
        let (state, _) = reduce(
            &state,
            Event::AudioStartOk {
                id,
                wav_path: PathBuf::from("/tmp/first.wav"),
            },
        );
        let (state, _) = reduce(&state, Event::Tick { id });

        let (next, effects) = reduce(
            &state,
            Event::StartRequested {
                name: "Second".to_string(),
            },
        );
        assert!(effects.is_empty());
        match next {
            State::Recording { session, .. } => {
                assert_eq!(session.recording_id, id);
                assert_eq!(session.name, "First");
                assert_eq!(session.elapsed_secs, 1);
            }
            other => panic!("expected Recording, got {:?}", other),
        }
    }

    #[test]
    fn audio_start_ok_moves_to_recording_and_starts_ticks() {
        let (state, id) = start("Test");
        let (next, effects) = reduce(
            &state,
            Event::AudioStartOk {
                id,
                wav_path: PathBuf::from("/tmp/test.wav"),
            },
        );
        assert!(matches!(next, State::Recording { .. }));
        assert!(effects.iter().any(|e| matches!(e, Effect::StartTick { .. })));
    }

    #[test]
    fn audio_start_fail_aborts_without_saving() {
        let (state, id) = start("Test");
        let (next, effects) = reduce(
            &state,
            Event::AudioStartFail {
                id,
                err: "No audio input device found".to_string(),
            },
        );
        assert!(matches!(next, State::Idle));
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::NotifyError { .. })));
        assert!(!effects
            .iter()
            .any(|e| matches!(e, Effect::SaveRecording { .. })));
    }

    #[test]
    fn paused_seconds_are_excluded_from_duration() {
        let (state, id) = start("Test");
        let wav = PathBuf::from("/tmp/test.wav");
        let (state, effects) = drive(
            state,
            vec![
                Event::AudioStartOk {
                    id,
                    wav_path: wav.clone(),
                },
                Event::Tick { id },
                Event::Tick { id },
                Event::Tick { id },
                Event::PauseRequested,
                // Ticks still arrive while paused; they must not count.
                Event::Tick { id },
                Event::Tick { id },
                Event::ResumeRequested,
                Event::Tick { id },
                Event::Tick { id },
                Event::StopRequested,
                Event::AudioStopOk { id },
            ],
        );
        assert!(matches!(state, State::Idle));

        let save = effects
            .iter()
            .find_map(|e| match e {
                Effect::SaveRecording {
                    name,
                    duration_secs,
                    wav_path,
                    ..
                } => Some((name.clone(), *duration_secs, wav_path.clone())),
                _ => None,
            })
            .expect("stop should emit exactly one save effect");
        assert_eq!(save, ("Test".to_string(), 5, wav));

        let save_count = effects
            .iter()
            .filter(|e| matches!(e, Effect::SaveRecording { .. }))
            .count();
        assert_eq!(save_count, 1);
    }

    #[test]
    fn pause_is_only_legal_while_recording() {
        let (next, effects) = reduce(&State::Idle, Event::PauseRequested);
        assert!(matches!(next, State::Idle));
        assert!(effects.is_empty());

        let (state, id) = start("Test");
        let (state, _) = reduce(
            &state,
            Event::AudioStartOk {
                id,
                wav_path: PathBuf::from("/tmp/test.wav"),
            },
        );
        let (paused, _) = reduce(&state, Event::PauseRequested);
        let (still_paused, effects) = reduce(&paused, Event::PauseRequested);
        assert!(matches!(still_paused, State::Paused { .. }));
        assert!(effects.is_empty());
    }

    #[test]
    fn resume_is_only_legal_while_paused() {
        let (state, id) = start("Test");
        let (recording, _) = reduce(
            &state,
            Event::AudioStartOk {
                id,
                wav_path: PathBuf::from("/tmp/test.wav"),
            },
        );
        let (next, effects) = reduce(&recording, Event::ResumeRequested);
        assert!(matches!(next, State::Recording { .. }));
        assert!(effects.is_empty());
    }

    #[test]
    fn stop_from_paused_finalizes_and_saves() {
        let (state, id) = start("Test");
        let (state, effects) = drive(
            state,
            vec![
                Event::AudioStartOk {
                    id,
                    wav_path: PathBuf::from("/tmp/test.wav"),
                },
                Event::Tick { id },
                Event::PauseRequested,
                Event::StopRequested,
                Event::AudioStopOk { id },
            ],
        );
        assert!(matches!(state, State::Idle));
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::SaveRecording { duration_secs: 1, .. })));
    }

    #[test]
    fn stop_failure_reports_and_resets_without_saving() {
        let (state, id) = start("Test");
        let (state, effects) = drive(
            state,
            vec![
                Event::AudioStartOk {
                    id,
                    wav_path: PathBuf::from("/tmp/test.wav"),
                },
                Event::StopRequested,
                Event::AudioStopFail {
                    id,
                    err: "disk full".to_string(),
                },
            ],
        );
        assert!(matches!(state, State::Idle));
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::NotifyError { .. })));
        assert!(!effects
            .iter()
            .any(|e| matches!(e, Effect::SaveRecording { .. })));
    }

    #[test]
    fn stale_events_are_ignored() {
        let (state, id) = start("Test");
        let (recording, _) = reduce(
            &state,
            Event::AudioStartOk {
                id,
                wav_path: PathBuf::from("/tmp/test.wav"),
            },
        );

        let stale = Uuid::new_v4();
        let (next, effects) = reduce(&recording, Event::Tick { id: stale });
        assert!(effects.is_empty());
        match next {
            State::Recording { session, .. } => assert_eq!(session.elapsed_secs, 0),
            other => panic!("expected Recording, got {:?}", other),
        }

        let (next, effects) = reduce(&recording, Event::AudioStopOk { id: stale });
        assert!(matches!(next, State::Recording { .. }));
        assert!(effects.is_empty());
    }
}
