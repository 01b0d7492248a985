//! Bounded hand-off queue between the capture thread and the worker.
//!
//! When the transcription engine falls behind, the queue sheds load instead of
//! blocking capture. The default policy evicts the oldest pending utterance so
//! subtitles stay close to live playback.

use crate::config::DropPolicy;
use crate::pipeline::gate::Utterance;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

/// What happened to an utterance pushed into a full queue.
#[derive(Debug)]
pub enum PushOutcome {
    /// The utterance was enqueued without shedding anything.
    Queued,
    /// The queue was full; the oldest pending utterance was evicted to make
    /// room for the new one.
    DroppedOldest(Utterance),
    /// The queue was full; the incoming utterance was discarded.
    DroppedNewest(Utterance),
}

impl PushOutcome {
    /// Returns the shed utterance, if any.
    pub fn dropped(&self) -> Option<&Utterance> {
        match self {
            PushOutcome::Queued => None,
            PushOutcome::DroppedOldest(utterance) | PushOutcome::DroppedNewest(utterance) => {
                Some(utterance)
            }
        }
    }
}

/// Producer half of the utterance queue. Owned by the capture thread; dropping
/// it disconnects the channel, which lets the worker drain and exit.
pub struct UtteranceQueue {
    tx: Sender<Utterance>,
    policy: DropPolicy,
}

impl UtteranceQueue {
    /// Creates a bounded queue with the given capacity and drop policy.
    pub fn new(capacity: usize, policy: DropPolicy) -> (Self, Receiver<Utterance>) {
        let (tx, rx) = bounded(capacity.max(1));
        (Self { tx, policy }, rx)
    }

    /// Pushes an utterance, shedding per the configured policy when full.
    ///
    /// Never blocks. The eviction retry can race a concurrent consumer; losing
    /// that race only means a slot freed up, so the push still lands.
    pub fn push(&self, utterance: Utterance, rx: &Receiver<Utterance>) -> PushOutcome {
        match self.tx.try_send(utterance) {
            Ok(()) => PushOutcome::Queued,
            Err(TrySendError::Disconnected(utterance)) => PushOutcome::DroppedNewest(utterance),
            Err(TrySendError::Full(utterance)) => match self.policy {
                DropPolicy::DropNewest => PushOutcome::DroppedNewest(utterance),
                DropPolicy::DropOldest => {
                    let evicted = rx.try_recv().ok();
                    match self.tx.try_send(utterance) {
                        Ok(()) => match evicted {
                            Some(old) => PushOutcome::DroppedOldest(old),
                            None => PushOutcome::Queued,
                        },
                        Err(TrySendError::Full(utterance))
                        | Err(TrySendError::Disconnected(utterance)) => {
                            PushOutcome::DroppedNewest(utterance)
                        }
                    }
                }
            },
        }
    }
}
