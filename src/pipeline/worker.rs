//! Transcription worker thread.
//!
//! Single consumer of the utterance queue. Each utterance is transcribed,
//! rebased from utterance-relative phrase times onto the session time base,
//! appended to the timeline, and broadcast. The worker exits when the
//! producer side of the queue is dropped and all pending work is drained,
//! which is exactly the stop-path quiescence the controller relies on.

use crate::hub::{Event, LiveBroadcastHub, StatusKind};
use crate::pipeline::gate::Utterance;
use crate::stt::SpeechEngine;
use crate::timeline::SubtitleTimeline;
use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Consumes utterances and turns them into timeline segments.
pub struct TranscriptionWorker {
    engine: Arc<dyn SpeechEngine>,
    timeline: Arc<SubtitleTimeline>,
    hub: Arc<LiveBroadcastHub>,
    language_hint: Option<String>,
}

impl TranscriptionWorker {
    pub fn new(
        engine: Arc<dyn SpeechEngine>,
        timeline: Arc<SubtitleTimeline>,
        hub: Arc<LiveBroadcastHub>,
        language_hint: Option<String>,
    ) -> Self {
        Self {
            engine,
            timeline,
            hub,
            language_hint,
        }
    }

    /// Spawns the worker thread over the given queue receiver.
    pub fn spawn(self, rx: Receiver<Utterance>) -> JoinHandle<()> {
        thread::spawn(move || self.run(rx))
    }

    fn run(self, rx: Receiver<Utterance>) {
        while let Ok(utterance) = rx.recv() {
            self.process(&utterance);
        }
    }

    /// Transcribes one utterance, retrying once on engine failure.
    ///
    /// A second failure is reported as a status event and the utterance is
    /// abandoned; the stream must keep flowing for later utterances.
    fn process(&self, utterance: &Utterance) {
        let samples = utterance.samples();
        let hint = self.language_hint.as_deref();

        let phrases = match self.engine.transcribe(&samples, hint) {
            Ok(phrases) => phrases,
            Err(_) => match self.engine.transcribe(&samples, hint) {
                Ok(phrases) => phrases,
                Err(err) => {
                    self.hub
                        .publish(&Event::status(StatusKind::EngineError, err.to_string()));
                    return;
                }
            },
        };

        let base = utterance.start().as_secs_f64();
        for phrase in phrases {
            let text = phrase.text.trim();
            if text.is_empty() {
                continue;
            }
            let segment = self.timeline.append(
                base + phrase.start,
                base + phrase.end,
                text.to_string(),
                phrase.confidence,
                phrase.language.clone(),
            );
            self.hub.publish(&Event::Transcription { segment });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::frame::Frame;
    use crate::stt::{EnginePhrase, MockEngine};
    use crossbeam_channel::bounded;
    use std::time::Duration;

    fn utterance_at(secs: u64, duration_secs: u64) -> Utterance {
        let samples = vec![3000i16; (duration_secs * 16000) as usize];
        let frame = Frame::new(samples, 16000, 1, Duration::from_secs(secs));
        Utterance::from_frames(vec![frame]).unwrap()
    }

    struct Fixture {
        timeline: Arc<SubtitleTimeline>,
        hub: Arc<LiveBroadcastHub>,
    }

    fn run_worker(engine: MockEngine, utterances: Vec<Utterance>) -> Fixture {
        let timeline = Arc::new(SubtitleTimeline::new(100));
        let hub = Arc::new(LiveBroadcastHub::new());

        let worker = TranscriptionWorker::new(
            Arc::new(engine),
            Arc::clone(&timeline),
            Arc::clone(&hub),
            None,
        );

        let (tx, rx) = bounded(utterances.len().max(1));
        for utterance in utterances {
            tx.send(utterance).unwrap();
        }
        drop(tx);

        // Drained-then-exit: join returns once all queued work is done.
        worker.spawn(rx).join().unwrap();
        Fixture { timeline, hub }
    }

    #[test]
    fn test_phrases_are_rebased_onto_session_time() {
        let engine = MockEngine::new().with_result(vec![
            EnginePhrase::new("first", 0.5, 1.5).with_confidence(0.9),
            EnginePhrase::new("second", 1.5, 2.0).with_confidence(0.8),
        ]);

        let fixture = run_worker(engine, vec![utterance_at(10, 2)]);

        let segments = fixture.timeline.list(None);
        assert_eq!(segments.len(), 2);
        assert!((segments[0].start_time - 10.5).abs() < 1e-9);
        assert!((segments[0].end_time - 11.5).abs() < 1e-9);
        assert!((segments[1].start_time - 11.5).abs() < 1e-9);
        assert!((segments[1].end_time - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_segments_broadcast_as_transcription_events() {
        let sub_timeline = Arc::new(SubtitleTimeline::new(100));
        let hub = Arc::new(LiveBroadcastHub::new());
        let sub = hub.subscribe();

        let worker = TranscriptionWorker::new(
            Arc::new(MockEngine::new().with_text("live")),
            Arc::clone(&sub_timeline),
            Arc::clone(&hub),
            None,
        );

        let (tx, rx) = bounded(1);
        tx.send(utterance_at(0, 1)).unwrap();
        drop(tx);
        worker.spawn(rx).join().unwrap();

        match sub.recv_timeout(Duration::from_secs(1)).unwrap() {
            Event::Transcription { segment } => assert_eq!(segment.text, "live"),
            other => panic!("expected Transcription, got {:?}", other),
        }
    }

    #[test]
    fn test_single_failure_retries_and_succeeds() {
        let engine = MockEngine::new().with_text("recovered").with_failures(1);
        let fixture = run_worker(engine, vec![utterance_at(0, 1)]);

        let segments = fixture.timeline.list(None);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "recovered");
    }

    #[test]
    fn test_double_failure_reports_and_stream_continues() {
        let timeline = Arc::new(SubtitleTimeline::new(100));
        let hub = Arc::new(LiveBroadcastHub::new());
        let sub = hub.subscribe();

        // Two failures burn both attempts for the first utterance; the
        // second utterance transcribes normally.
        let engine = MockEngine::new().with_text("after error").with_failures(2);
        let worker = TranscriptionWorker::new(
            Arc::new(engine),
            Arc::clone(&timeline),
            Arc::clone(&hub),
            None,
        );

        let (tx, rx) = bounded(2);
        tx.send(utterance_at(0, 1)).unwrap();
        tx.send(utterance_at(2, 1)).unwrap();
        drop(tx);
        worker.spawn(rx).join().unwrap();

        match sub.recv_timeout(Duration::from_secs(1)).unwrap() {
            Event::Status { kind, .. } => assert_eq!(kind, StatusKind::EngineError),
            other => panic!("expected Status, got {:?}", other),
        }
        match sub.recv_timeout(Duration::from_secs(1)).unwrap() {
            Event::Transcription { segment } => assert_eq!(segment.text, "after error"),
            other => panic!("expected Transcription, got {:?}", other),
        }

        let segments = timeline.list(None);
        assert_eq!(segments.len(), 1);
        assert!((segments[0].start_time - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_and_whitespace_phrases_are_skipped() {
        let engine = MockEngine::new().with_result(vec![
            EnginePhrase::new("   ", 0.0, 0.5),
            EnginePhrase::new("kept", 0.5, 1.0),
            EnginePhrase::new("", 1.0, 1.5),
        ]);

        let fixture = run_worker(engine, vec![utterance_at(0, 2)]);
        let segments = fixture.timeline.list(None);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "kept");
    }

    #[test]
    fn test_empty_engine_result_appends_nothing() {
        let fixture = run_worker(MockEngine::new(), vec![utterance_at(0, 1)]);
        assert!(fixture.timeline.is_empty());
        assert_eq!(fixture.hub.subscriber_count(), 0);
    }
}
