//! Voice activity gate that groups frames into utterances.
//!
//! Consumes frames in arrival order and emits an [`Utterance`] when:
//! - sustained silence (the hangover) follows detected speech, or
//! - an open utterance reaches the maximum duration (periodic flush of
//!   continuous speech).
//!
//! A pre-roll of recently buffered silence is prepended when speech starts so
//! leading phonemes are not clipped, and a short trailing pad is kept after
//! the last speech frame. Utterances shorter than the minimum duration are
//! discarded. All timing derives from frame timestamps, never the wall clock.

use crate::audio::frame::Frame;
use crate::audio::vad::{EnergyClassifier, SpeechClassifier};
use crate::defaults;
use crate::error::{LivesubError, Result};
use std::collections::VecDeque;
use std::time::Duration;

/// Configuration for the voice activity gate.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Expected sample rate; frames that disagree are rejected.
    pub sample_rate: u32,
    /// Expected channel count; frames that disagree are rejected.
    pub channels: u16,
    /// Pre-roll kept before speech onset (milliseconds).
    pub pre_roll_ms: u32,
    /// Sustained silence that closes an utterance (milliseconds).
    pub hangover_ms: u32,
    /// Trailing silence kept after the last speech frame (milliseconds).
    pub post_pad_ms: u32,
    /// Utterances shorter than this are discarded (milliseconds).
    pub min_utterance_ms: u32,
    /// Open utterances are force-flushed at this bound (milliseconds).
    pub max_utterance_ms: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            channels: defaults::CHANNELS,
            pre_roll_ms: defaults::PRE_ROLL_MS,
            hangover_ms: defaults::HANGOVER_MS,
            post_pad_ms: defaults::POST_PAD_MS,
            min_utterance_ms: defaults::MIN_UTTERANCE_MS,
            max_utterance_ms: defaults::MAX_UTTERANCE_MS,
        }
    }
}

/// A contiguous span of detected speech awaiting transcription.
#[derive(Debug, Clone)]
pub struct Utterance {
    frames: Vec<Frame>,
    start: Duration,
    end: Duration,
}

impl Utterance {
    pub(crate) fn from_frames(frames: Vec<Frame>) -> Option<Self> {
        let first = frames.first()?;
        let last = frames.last()?;
        let start = first.timestamp;
        let end = last.end();
        Some(Self { frames, start, end })
    }

    /// Offset of the first sample from session start.
    pub fn start(&self) -> Duration {
        self.start
    }

    /// Offset just past the last sample.
    pub fn end(&self) -> Duration {
        self.end
    }

    /// Total duration including pre-roll and trailing pad.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Concatenates all frame samples into one buffer for the engine.
    pub fn samples(&self) -> Vec<i16> {
        let total: usize = self.frames.iter().map(|f| f.samples.len()).sum();
        let mut samples = Vec::with_capacity(total);
        for frame in &self.frames {
            samples.extend_from_slice(&frame.samples);
        }
        samples
    }

    /// Number of frames in this utterance.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

/// Gate state while classifying the incoming frame stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    /// No speech detected; buffering pre-roll.
    Idle,
    /// Speech detected; an utterance is open and accumulating.
    Speaking,
    /// Silence after speech; waiting out the hangover.
    Hangover,
}

/// Voice activity gate. See the module docs for the segmentation rules.
pub struct VoiceActivityGate {
    config: GateConfig,
    classifier: Box<dyn SpeechClassifier>,
    state: GateState,
    pre_roll: VecDeque<Frame>,
    open: Vec<Frame>,
    /// Accumulated silence while in hangover.
    silence_run: Duration,
    /// Start timestamp of the first speech frame in the open utterance.
    speech_start: Duration,
    /// End timestamp of the last speech frame in the open utterance.
    speech_end: Duration,
}

impl VoiceActivityGate {
    /// Creates a gate with the default energy classifier.
    pub fn new(config: GateConfig) -> Self {
        Self::with_classifier(config, Box::new(EnergyClassifier::default()))
    }

    /// Creates a gate with a custom speech classifier.
    pub fn with_classifier(config: GateConfig, classifier: Box<dyn SpeechClassifier>) -> Self {
        Self {
            config,
            classifier,
            state: GateState::Idle,
            pre_roll: VecDeque::new(),
            open: Vec::new(),
            silence_run: Duration::ZERO,
            speech_start: Duration::ZERO,
            speech_end: Duration::ZERO,
        }
    }

    /// Returns true if an utterance is currently open.
    pub fn is_open(&self) -> bool {
        !self.open.is_empty()
    }

    /// Feeds one frame. Returns a closed utterance when one completes.
    pub fn feed(&mut self, frame: Frame) -> Result<Option<Utterance>> {
        self.validate(&frame)?;
        if frame.samples.is_empty() {
            return Ok(None);
        }

        let is_speech = self.classifier.is_speech(&frame.samples);

        // Periodic flush: never let the open utterance grow past the bound.
        let mut flushed = None;
        if self.state != GateState::Idle {
            let open_duration = self.open_duration() + frame.duration();
            if open_duration > self.max_duration() {
                flushed = self.take_open();
                self.silence_run = Duration::ZERO;
            }
        }

        match self.state {
            GateState::Idle => {
                if is_speech {
                    self.open_utterance(frame);
                } else {
                    self.push_pre_roll(frame);
                }
            }
            GateState::Speaking | GateState::Hangover => {
                // A force-flush just emptied the open buffer; the new
                // utterance starts at this frame.
                if self.open.is_empty() {
                    self.speech_start = frame.timestamp;
                    if !is_speech {
                        self.speech_end = frame.timestamp;
                    }
                }
                if is_speech {
                    self.speech_end = frame.end();
                    self.silence_run = Duration::ZERO;
                    self.open.push(frame);
                    self.state = GateState::Speaking;
                } else {
                    self.silence_run += frame.duration();
                    self.open.push(frame);
                    self.state = GateState::Hangover;

                    if self.silence_run >= self.hangover() {
                        let closed = self.close_with_trim();
                        return Ok(flushed.or(closed));
                    }
                }
            }
        }

        Ok(flushed)
    }

    /// Closes and returns any open utterance, e.g. at session stop.
    ///
    /// The minimum-duration filter still applies: a blip that happened to be
    /// open at shutdown is not worth an engine call.
    pub fn flush(&mut self) -> Option<Utterance> {
        if self.open.is_empty() {
            self.reset_idle();
            return None;
        }
        if self.state == GateState::Hangover {
            self.close_with_trim()
        } else {
            let utterance = self.take_open();
            self.reset_idle();
            utterance
        }
    }

    /// Resets the gate to idle, dropping all buffered state.
    pub fn reset(&mut self) {
        self.open.clear();
        self.pre_roll.clear();
        self.reset_idle();
    }

    fn validate(&self, frame: &Frame) -> Result<()> {
        if frame.sample_rate != self.config.sample_rate || frame.channels != self.config.channels {
            return Err(LivesubError::InvalidFrame {
                expected: format!("{}Hz/{}ch", self.config.sample_rate, self.config.channels),
                actual: format!("{}Hz/{}ch", frame.sample_rate, frame.channels),
            });
        }
        Ok(())
    }

    fn open_utterance(&mut self, frame: Frame) {
        self.trim_pre_roll_front();
        self.open = self.pre_roll.drain(..).collect();
        self.speech_start = frame.timestamp;
        self.speech_end = frame.end();
        self.open.push(frame);
        self.silence_run = Duration::ZERO;
        self.state = GateState::Speaking;
    }

    /// Buffers an idle silence frame, keeping roughly `pre_roll_ms` around.
    fn push_pre_roll(&mut self, frame: Frame) {
        self.pre_roll.push_back(frame);
        while !self.pre_roll.is_empty() {
            let without_front: Duration =
                self.pre_roll.iter().skip(1).map(|f| f.duration()).sum();
            if without_front >= self.pre_roll_target() {
                self.pre_roll.pop_front();
            } else {
                break;
            }
        }
    }

    /// Truncates the oldest pre-roll frame so the buffer holds at most the
    /// configured pre-roll duration, at sample granularity.
    fn trim_pre_roll_front(&mut self) {
        let total: Duration = self.pre_roll.iter().map(|f| f.duration()).sum();
        let target = self.pre_roll_target();
        if total <= target {
            return;
        }
        // `push_pre_roll` keeps the buffer minus its front below the target,
        // so the excess always falls within the front frame.
        let excess = total - target;
        let cut = self.samples_for(excess);
        if let Some(front) = self.pre_roll.front_mut() {
            let cut = cut.min(front.samples.len());
            front.samples.drain(..cut);
            front.timestamp += excess;
        }
    }

    /// Closes the open utterance, keeping only `post_pad_ms` of the trailing
    /// silence. Trimmed-off frames seed the pre-roll for the next utterance.
    fn close_with_trim(&mut self) -> Option<Utterance> {
        let cutoff = self.speech_end + self.post_pad();
        let mut kept = Vec::new();
        let mut trimmed = VecDeque::new();

        for frame in std::mem::take(&mut self.open) {
            if frame.end() <= cutoff {
                kept.push(frame);
            } else if frame.timestamp < cutoff {
                // Straddles the cutoff: split at sample granularity.
                let keep_duration = cutoff - frame.timestamp;
                let keep_samples = self.samples_for(keep_duration).min(frame.samples.len());
                let mut head = frame.clone();
                head.samples.truncate(keep_samples);
                let mut tail = frame;
                tail.samples.drain(..keep_samples);
                tail.timestamp = cutoff;
                kept.push(head);
                trimmed.push_back(tail);
            } else {
                trimmed.push_back(frame);
            }
        }

        self.pre_roll = trimmed;
        let passes_min = self.speech_span() >= self.min_duration();
        self.reset_idle();

        let utterance = Utterance::from_frames(kept)?;
        if !passes_min {
            return None;
        }
        Some(utterance)
    }

    /// Takes the open frames as an utterance without trailing trim.
    fn take_open(&mut self) -> Option<Utterance> {
        let frames = std::mem::take(&mut self.open);
        let passes_min = self.speech_span() >= self.min_duration();
        let utterance = Utterance::from_frames(frames)?;
        if !passes_min {
            return None;
        }
        Some(utterance)
    }

    /// Duration of detected speech in the open utterance, excluding pre-roll
    /// and trailing silence. The minimum-duration filter applies to this span
    /// so padding cannot rescue a blip.
    fn speech_span(&self) -> Duration {
        self.speech_end.saturating_sub(self.speech_start)
    }

    fn reset_idle(&mut self) {
        self.state = GateState::Idle;
        self.silence_run = Duration::ZERO;
    }

    fn open_duration(&self) -> Duration {
        match (self.open.first(), self.open.last()) {
            (Some(first), Some(last)) => last.end() - first.timestamp,
            _ => Duration::ZERO,
        }
    }

    fn samples_for(&self, duration: Duration) -> usize {
        let per_channel = duration.as_nanos() * self.config.sample_rate as u128 / 1_000_000_000;
        (per_channel as usize) * self.config.channels as usize
    }

    fn pre_roll_target(&self) -> Duration {
        Duration::from_millis(self.config.pre_roll_ms as u64)
    }

    fn hangover(&self) -> Duration {
        Duration::from_millis(self.config.hangover_ms as u64)
    }

    fn post_pad(&self) -> Duration {
        Duration::from_millis(self.config.post_pad_ms as u64)
    }

    fn min_duration(&self) -> Duration {
        Duration::from_millis(self.config.min_utterance_ms as u64)
    }

    fn max_duration(&self) -> Duration {
        Duration::from_millis(self.config.max_utterance_ms as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 16000;

    fn test_config() -> GateConfig {
        GateConfig {
            sample_rate: RATE,
            channels: 1,
            pre_roll_ms: 300,
            hangover_ms: 600,
            post_pad_ms: 150,
            min_utterance_ms: 300,
            max_utterance_ms: 30_000,
        }
    }

    fn frame_at(ms: u64, duration_ms: u64, amplitude: i16) -> Frame {
        let samples = vec![amplitude; (duration_ms * RATE as u64 / 1000) as usize];
        Frame::new(samples, RATE, 1, Duration::from_millis(ms))
    }

    fn speech(ms: u64, duration_ms: u64) -> Frame {
        frame_at(ms, duration_ms, 3000) // RMS ~0.09, above 0.02 threshold
    }

    fn silence(ms: u64, duration_ms: u64) -> Frame {
        frame_at(ms, duration_ms, 0)
    }

    /// Feeds a contiguous schedule of (is_speech, duration_ms) blocks.
    fn run_schedule(gate: &mut VoiceActivityGate, blocks: &[(bool, u64)]) -> Vec<Utterance> {
        let mut out = Vec::new();
        let mut t = 0;
        for &(is_speech, duration_ms) in blocks {
            let frame = if is_speech {
                speech(t, duration_ms)
            } else {
                silence(t, duration_ms)
            };
            if let Some(utterance) = gate.feed(frame).unwrap() {
                out.push(utterance);
            }
            t += duration_ms;
        }
        out
    }

    #[test]
    fn test_gate_stays_idle_on_silence() {
        let mut gate = VoiceActivityGate::new(test_config());
        let produced = run_schedule(&mut gate, &[(false, 100); 20]);
        assert!(produced.is_empty());
        assert!(!gate.is_open());
    }

    #[test]
    fn test_single_utterance_silence_speech_silence() {
        let mut gate = VoiceActivityGate::new(test_config());

        // 300ms silence, 1200ms speech, 900ms silence (above the hangover)
        let produced = run_schedule(
            &mut gate,
            &[
                (false, 100),
                (false, 100),
                (false, 100),
                (true, 400),
                (true, 400),
                (true, 400),
                (false, 300),
                (false, 300),
                (false, 300),
            ],
        );

        assert_eq!(produced.len(), 1);
        let utterance = &produced[0];

        // 300ms pre-roll + 1200ms speech + 150ms pad
        assert_eq!(utterance.start(), Duration::ZERO);
        assert_eq!(utterance.end(), Duration::from_millis(1650));
        assert_eq!(utterance.duration(), Duration::from_millis(1650));
    }

    #[test]
    fn test_pre_roll_is_bounded() {
        let mut gate = VoiceActivityGate::new(test_config());

        // Long silence then speech: only ~300ms of pre-roll should be kept.
        let produced = run_schedule(
            &mut gate,
            &[
                (false, 1000),
                (false, 1000),
                (true, 500),
                (false, 400),
                (false, 400),
            ],
        );

        assert_eq!(produced.len(), 1);
        let utterance = &produced[0];
        // Speech spans [2000, 2500); pre-roll reaches back 300ms.
        assert_eq!(utterance.start(), Duration::from_millis(1700));
        assert_eq!(utterance.end(), Duration::from_millis(2650));
    }

    #[test]
    fn test_brief_pause_does_not_split_utterance() {
        let mut gate = VoiceActivityGate::new(test_config());

        // 400ms pause (below 600ms hangover) inside continuous speech
        let produced = run_schedule(
            &mut gate,
            &[
                (true, 500),
                (false, 200),
                (false, 200),
                (true, 500),
                (false, 700),
            ],
        );

        assert_eq!(produced.len(), 1);
        // Single utterance covering both speech runs plus the 150ms pad.
        assert_eq!(produced[0].start(), Duration::ZERO);
        assert_eq!(produced[0].end(), Duration::from_millis(1550));
    }

    #[test]
    fn test_short_blip_is_discarded() {
        let mut gate = VoiceActivityGate::new(test_config());

        // 100ms of speech, below the 300ms minimum (pre-roll empty here)
        let produced = run_schedule(&mut gate, &[(true, 100), (false, 700)]);
        assert!(produced.is_empty());
        assert!(!gate.is_open());
    }

    #[test]
    fn test_min_duration_invariant() {
        let mut gate = VoiceActivityGate::new(test_config());
        let min = Duration::from_millis(300);

        let produced = run_schedule(
            &mut gate,
            &[
                (true, 50),
                (false, 700),
                (true, 1000),
                (false, 700),
                (true, 20),
                (false, 700),
            ],
        );

        for utterance in &produced {
            assert!(utterance.duration() >= min);
        }
        assert_eq!(produced.len(), 1);
    }

    #[test]
    fn test_max_duration_forces_periodic_flush() {
        let config = GateConfig {
            max_utterance_ms: 2000,
            ..test_config()
        };
        let mut gate = VoiceActivityGate::new(config);

        // 5s of continuous speech in 500ms frames
        let produced = run_schedule(&mut gate, &[(true, 500); 10]);

        // Two full 2s flushes; the remaining 1s is still open.
        assert_eq!(produced.len(), 2);
        for utterance in &produced {
            assert_eq!(utterance.duration(), Duration::from_millis(2000));
        }
        assert!(gate.is_open());

        // The tail closes on flush.
        let tail = gate.flush().unwrap();
        assert_eq!(tail.duration(), Duration::from_millis(1000));
    }

    #[test]
    fn test_max_duration_invariant() {
        let config = GateConfig {
            max_utterance_ms: 1500,
            ..test_config()
        };
        let max = Duration::from_millis(1500);
        let mut gate = VoiceActivityGate::new(config);

        let produced = run_schedule(&mut gate, &[(true, 250); 24]);
        for utterance in &produced {
            assert!(utterance.duration() <= max);
        }
    }

    #[test]
    fn test_flush_returns_open_utterance() {
        let mut gate = VoiceActivityGate::new(test_config());

        run_schedule(&mut gate, &[(true, 500), (true, 500)]);
        assert!(gate.is_open());

        let utterance = gate.flush().unwrap();
        assert_eq!(utterance.duration(), Duration::from_millis(1000));
        assert!(!gate.is_open());
    }

    #[test]
    fn test_flush_discards_short_open_blip() {
        let mut gate = VoiceActivityGate::new(test_config());

        run_schedule(&mut gate, &[(true, 100)]);
        assert!(gate.is_open());
        assert!(gate.flush().is_none());
    }

    #[test]
    fn test_flush_when_idle_returns_none() {
        let mut gate = VoiceActivityGate::new(test_config());
        assert!(gate.flush().is_none());
    }

    #[test]
    fn test_invalid_sample_rate_rejected_state_unaffected() {
        let mut gate = VoiceActivityGate::new(test_config());

        run_schedule(&mut gate, &[(true, 500)]);
        assert!(gate.is_open());

        let bad = Frame::new(vec![3000i16; 4410], 44100, 1, Duration::from_millis(500));
        let err = gate.feed(bad).unwrap_err();
        assert!(matches!(err, LivesubError::InvalidFrame { .. }));

        // Gate state untouched: the open utterance is still accumulating and
        // closes normally once the hangover elapses.
        assert!(gate.is_open());
        let closed = gate.feed(silence(500, 700)).unwrap().unwrap();
        assert_eq!(closed.start(), Duration::ZERO);
        assert_eq!(closed.end(), Duration::from_millis(650));
    }

    #[test]
    fn test_invalid_channel_count_rejected() {
        let mut gate = VoiceActivityGate::new(test_config());
        let bad = Frame::new(vec![0i16; 320], RATE, 2, Duration::ZERO);
        assert!(gate.feed(bad).is_err());
    }

    #[test]
    fn test_empty_frame_is_ignored() {
        let mut gate = VoiceActivityGate::new(test_config());
        let empty = Frame::new(vec![], RATE, 1, Duration::ZERO);
        assert!(gate.feed(empty).unwrap().is_none());
        assert!(!gate.is_open());
    }

    #[test]
    fn test_only_one_utterance_open_at_a_time() {
        let config = GateConfig {
            max_utterance_ms: 1000,
            ..test_config()
        };
        let mut gate = VoiceActivityGate::new(config);

        // Force-flush mid-speech must leave exactly one (new) open utterance.
        let produced = run_schedule(&mut gate, &[(true, 400); 5]);
        assert!(!produced.is_empty());
        assert!(gate.is_open());
    }

    #[test]
    fn test_utterance_samples_concatenation() {
        let mut gate = VoiceActivityGate::new(test_config());
        let produced = run_schedule(&mut gate, &[(true, 500), (true, 500), (false, 700)]);

        assert_eq!(produced.len(), 1);
        let utterance = &produced[0];
        let expected = utterance.duration().as_millis() as usize * RATE as usize / 1000;
        assert_eq!(utterance.samples().len(), expected);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut gate = VoiceActivityGate::new(test_config());
        run_schedule(&mut gate, &[(false, 100), (true, 500)]);
        assert!(gate.is_open());

        gate.reset();
        assert!(!gate.is_open());
        assert!(gate.flush().is_none());
    }
}
