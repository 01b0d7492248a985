//! Audio capture types: PCM frames, frame sources, and speech classification.

pub mod frame;
pub mod source;
pub mod vad;

pub use frame::Frame;
pub use source::{
    ChannelFrameSource, FrameFeeder, FrameSource, FrameSourceProvider, ScriptedFrameSource,
    UnavailableProvider,
};
pub use vad::{EnergyClassifier, SpeechClassifier, calculate_rms};
