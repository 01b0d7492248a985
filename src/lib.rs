//! livesub - live speech-to-subtitle pipeline
//!
//! Turns a raw PCM frame stream into an ordered subtitle timeline and a live
//! event broadcast. Frames pass through an energy-based voice activity gate
//! that groups them into utterances, a bounded queue that sheds load when the
//! transcription engine falls behind, and a worker that rebases engine output
//! onto the session time base. A session controller owns the lifecycle;
//! exports render the timeline as SRT, WebVTT, JSON, or plain text.
//!
//! Device capture and the actual speech model live behind the
//! [`audio::FrameSource`] and [`stt::SpeechEngine`] traits, so the whole
//! pipeline runs deterministically in tests with scripted sources and a mock
//! engine.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

pub mod audio;
pub mod config;
pub mod defaults;
pub mod error;
pub mod hub;
pub mod pipeline;
pub mod session;
pub mod stt;
pub mod timeline;

pub use audio::{Frame, FrameSource, FrameSourceProvider, ScriptedFrameSource};
pub use config::{Config, DropPolicy};
pub use error::{LivesubError, Result};
pub use hub::{Event, LiveBroadcastHub, StatusKind, Subscription};
pub use pipeline::{GateConfig, Utterance, VoiceActivityGate};
pub use session::{SessionController, SessionState, SessionStatus, StartOptions};
pub use stt::{EnginePhrase, MockEngine, SpeechEngine};
pub use timeline::{ExportDocument, ExportFormat, Segment, SubtitleTimeline};
