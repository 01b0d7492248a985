//! Capture-to-subtitle pipeline stages: gating, queueing, transcription.

pub mod gate;
pub mod queue;
pub mod worker;

pub use gate::{GateConfig, Utterance, VoiceActivityGate};
pub use queue::{PushOutcome, UtteranceQueue};
pub use worker::TranscriptionWorker;
