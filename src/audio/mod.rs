//! Audio capture module
//!
//! Microphone input capture and WAV file writing. Uses CPAL for audio
//! capture and hound for WAV encoding.

pub mod recorder;

pub use recorder::{AudioError, AudioRecorder, RecordingHandle};
