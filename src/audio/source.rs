//! Frame source abstraction.
//!
//! Device capture is an external collaborator: the core only requires a
//! supplier of fixed-size PCM frames at a declared sample rate. This module
//! defines the trait the session controller consumes, a channel-backed source
//! for bridging real capture callbacks in, and a scripted source for tests.

use crate::audio::frame::Frame;
use crate::error::{LivesubError, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use std::collections::VecDeque;
use std::time::Duration;

/// Trait for audio frame suppliers.
///
/// Implementations wrap a device or stream and yield frames in capture order.
pub trait FrameSource: Send {
    /// Sample rate of the frames this source yields.
    fn sample_rate(&self) -> u32;

    /// Channel count of the frames this source yields.
    fn channels(&self) -> u16;

    /// Returns the next frame, or `None` if no frame is currently available.
    ///
    /// Must not block longer than roughly one frame duration; the capture
    /// loop polls this continuously and must stay responsive to shutdown.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Trait for acquiring a frame source for a requested device.
///
/// The session controller calls this during `start()`. Failure maps to
/// `DeviceUnavailable` and leaves the session idle.
pub trait FrameSourceProvider: Send + Sync {
    fn open(&self, device_id: Option<&str>) -> Result<Box<dyn FrameSource>>;
}

impl<F> FrameSourceProvider for F
where
    F: Fn(Option<&str>) -> Result<Box<dyn FrameSource>> + Send + Sync,
{
    fn open(&self, device_id: Option<&str>) -> Result<Box<dyn FrameSource>> {
        self(device_id)
    }
}

/// Frame source fed through a bounded channel.
///
/// The glue layer that owns the OS capture callback pushes frames through the
/// [`FrameFeeder`]; the pipeline pulls them out of this source. Timestamps are
/// assigned by the feeder from the running sample count, so they are
/// monotonic and independent of delivery jitter.
pub struct ChannelFrameSource {
    rx: Receiver<Frame>,
    sample_rate: u32,
    channels: u16,
    poll_timeout: Duration,
}

/// Producer half paired with a [`ChannelFrameSource`].
pub struct FrameFeeder {
    tx: Sender<Frame>,
    sample_rate: u32,
    channels: u16,
    samples_sent: u64,
}

impl ChannelFrameSource {
    /// Creates a channel-backed source and its feeder.
    pub fn new(sample_rate: u32, channels: u16, capacity: usize) -> (FrameFeeder, Self) {
        let (tx, rx) = bounded(capacity);
        (
            FrameFeeder {
                tx,
                sample_rate,
                channels,
                samples_sent: 0,
            },
            Self {
                rx,
                sample_rate,
                channels,
                poll_timeout: Duration::from_millis(20),
            },
        )
    }
}

impl FrameFeeder {
    /// Pushes raw samples as a frame with the next running timestamp.
    ///
    /// Returns `false` if the source side has been dropped.
    pub fn push(&mut self, samples: Vec<i16>) -> bool {
        let frames = self.samples_sent / self.channels.max(1) as u64;
        let timestamp = Duration::from_nanos(frames * 1_000_000_000 / self.sample_rate as u64);
        self.samples_sent += samples.len() as u64;

        let frame = Frame::new(samples, self.sample_rate, self.channels, timestamp);
        self.tx.send(frame).is_ok()
    }
}

impl FrameSource for ChannelFrameSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match self.rx.recv_timeout(self.poll_timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Ok(None),
        }
    }
}

/// Scripted frame source for tests.
///
/// Yields a pre-built sequence of frames, then `None` forever. Timestamps are
/// assigned from the running sample count at construction time.
pub struct ScriptedFrameSource {
    frames: VecDeque<Frame>,
    sample_rate: u32,
    channels: u16,
}

impl ScriptedFrameSource {
    /// Creates a scripted source from blocks of samples.
    pub fn new(sample_rate: u32, channels: u16, blocks: Vec<Vec<i16>>) -> Self {
        let mut frames = VecDeque::with_capacity(blocks.len());
        let mut samples_seen: u64 = 0;
        for samples in blocks {
            let position = samples_seen / channels.max(1) as u64;
            let timestamp =
                Duration::from_nanos(position * 1_000_000_000 / sample_rate.max(1) as u64);
            samples_seen += samples.len() as u64;
            frames.push_back(Frame::new(samples, sample_rate, channels, timestamp));
        }
        Self {
            frames,
            sample_rate,
            channels,
        }
    }

    /// Returns how many frames remain unread.
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for ScriptedFrameSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        Ok(self.frames.pop_front())
    }
}

/// Provider that always fails, for exercising the `DeviceUnavailable` path.
pub struct UnavailableProvider;

impl FrameSourceProvider for UnavailableProvider {
    fn open(&self, device_id: Option<&str>) -> Result<Box<dyn FrameSource>> {
        Err(LivesubError::DeviceUnavailable {
            device: device_id.unwrap_or("default").to_string(),
        })
    }
}
