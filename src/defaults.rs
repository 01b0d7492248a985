//! Default configuration constants for livesub.
//!
//! Shared constants used across the configuration types to keep the audio,
//! segmentation, and broadcast settings consistent.

/// Default audio sample rate in Hz.
///
/// 16kHz is the standard for speech recognition and provides a good balance
/// between quality and computational cost for voice applications.
pub const SAMPLE_RATE: u32 = 16000;

/// Default channel count. Speech models expect mono input.
pub const CHANNELS: u16 = 1;

/// Default Voice Activity Detection (VAD) threshold.
///
/// RMS-based threshold (0.0 to 1.0) above which a frame counts as speech.
/// 0.02 is tuned for typical microphone input levels.
pub const VAD_THRESHOLD: f32 = 0.02;

/// Silence duration in milliseconds before an open utterance is closed.
///
/// The "hangover": brief pauses shorter than this stay inside one utterance
/// so natural speech is not split mid-sentence.
pub const HANGOVER_MS: u32 = 800;

/// Pre-roll buffer duration in milliseconds.
///
/// Silence frames kept while idle and prepended when speech starts, so soft
/// onsets (plosives, fricatives) that precede the energy threshold crossing
/// are not clipped.
pub const PRE_ROLL_MS: u32 = 300;

/// Trailing pad in milliseconds kept after the last speech frame.
///
/// Ensures word endings are not clipped when the utterance closes.
pub const POST_PAD_MS: u32 = 150;

/// Minimum utterance duration in milliseconds.
///
/// Anything shorter is a noise spike and is discarded before it can reach
/// the transcription stage.
pub const MIN_UTTERANCE_MS: u32 = 300;

/// Maximum utterance duration in milliseconds.
///
/// Continuous speech is force-flushed at this bound so memory stays bounded
/// and long monologues surface as periodic subtitle lines.
pub const MAX_UTTERANCE_MS: u32 = 30_000;

/// Capacity of the utterance queue between capture and the worker.
///
/// Deliberately small: live transcription favors recency over completeness,
/// so under load the queue evicts rather than letting latency grow.
pub const QUEUE_CAPACITY: usize = 3;

/// Capacity of each viewer subscription's outbound event queue.
pub const SUBSCRIPTION_QUEUE_CAPACITY: usize = 64;

/// Upper bound in milliseconds on a publish attempt to one subscription.
///
/// A subscription that cannot accept an event within this window is dropped.
pub const PUBLISH_TIMEOUT_MS: u64 = 25;

/// Number of most-recent segments served by the live timeline view.
pub const LIVE_VIEW_CAP: usize = 1000;

/// Default Whisper model size requested at session start.
pub const DEFAULT_MODEL: &str = "base";

/// Language value that triggers automatic language detection.
pub const AUTO_LANGUAGE: &str = "auto";
