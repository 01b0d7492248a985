//! PCM frame type that flows from a frame source into the gate.

use std::time::Duration;

/// A fixed-duration block of raw PCM samples.
///
/// The timestamp is an offset from session start, assigned by the producer.
/// Frames are immutable once produced; all segmentation timing derives from
/// frame timestamps and sample counts, never from the wall clock.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Audio samples as 16-bit PCM, interleaved if multi-channel.
    pub samples: Vec<i16>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of channels.
    pub channels: u16,
    /// Capture offset from session start.
    pub timestamp: Duration,
}

impl Frame {
    /// Creates a new frame.
    pub fn new(samples: Vec<i16>, sample_rate: u32, channels: u16, timestamp: Duration) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
            timestamp,
        }
    }

    /// Returns the duration covered by this frame's samples.
    pub fn duration(&self) -> Duration {
        let frames = self.samples.len() as u64 / self.channels.max(1) as u64;
        Duration::from_nanos(frames * 1_000_000_000 / self.sample_rate.max(1) as u64)
    }

    /// Returns the timestamp just past the last sample.
    pub fn end(&self) -> Duration {
        self.timestamp + self.duration()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_creation() {
        let samples = vec![100i16, 200, 300];
        let frame = Frame::new(samples.clone(), 16000, 1, Duration::from_millis(40));

        assert_eq!(frame.samples, samples);
        assert_eq!(frame.sample_rate, 16000);
        assert_eq!(frame.channels, 1);
        assert_eq!(frame.timestamp, Duration::from_millis(40));
    }

    #[test]
    fn test_frame_duration_mono() {
        let frame = Frame::new(vec![0i16; 16000], 16000, 1, Duration::ZERO);
        assert_eq!(frame.duration(), Duration::from_secs(1));

        let frame = Frame::new(vec![0i16; 1600], 16000, 1, Duration::ZERO);
        assert_eq!(frame.duration(), Duration::from_millis(100));
    }

    #[test]
    fn test_frame_duration_stereo_counts_interleaved_pairs() {
        let frame = Frame::new(vec![0i16; 32000], 16000, 2, Duration::ZERO);
        assert_eq!(frame.duration(), Duration::from_secs(1));
    }

    #[test]
    fn test_frame_end() {
        let frame = Frame::new(vec![0i16; 1600], 16000, 1, Duration::from_millis(500));
        assert_eq!(frame.end(), Duration::from_millis(600));
    }
}
