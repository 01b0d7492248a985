//! Session lifecycle orchestration.
//!
//! One controller owns the whole capture-to-broadcast pipeline. `start` wires
//! a frame source through the gate into the bounded utterance queue and
//! spawns the capture and worker threads; `stop` tears them down in order so
//! every utterance captured before the stop is transcribed and broadcast
//! before `stop` returns.

use crate::audio::source::FrameSourceProvider;
use crate::audio::vad::EnergyClassifier;
use crate::config::Config;
use crate::error::{LivesubError, Result};
use crate::hub::{Event, LiveBroadcastHub, StatusKind};
use crate::pipeline::gate::{GateConfig, VoiceActivityGate};
use crate::pipeline::queue::{PushOutcome, UtteranceQueue};
use crate::pipeline::worker::TranscriptionWorker;
use crate::stt::SpeechEngine;
use crate::timeline::{ExportDocument, ExportFormat, SubtitleTimeline};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Lifecycle state of the recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Starting,
    Recording,
    Stopping,
}

/// Snapshot of the controller for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub model: String,
    pub language: Option<String>,
    pub device: Option<String>,
    /// Unix seconds when the current session started, if recording.
    pub started_at: Option<u64>,
    pub segment_count: usize,
    pub subscriber_count: usize,
}

/// Per-start overrides of the configured defaults.
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Language hint for the engine; `None` keeps the configured value.
    pub language: Option<String>,
    /// Capture device id; `None` keeps the configured value.
    pub device: Option<String>,
}

struct ActiveSession {
    running: Arc<AtomicBool>,
    capture: JoinHandle<()>,
    worker: JoinHandle<()>,
    started_at: u64,
    language: Option<String>,
    device: Option<String>,
}

/// Owns the pipeline and mediates all lifecycle transitions.
///
/// Shared behind an `Arc`; every method takes `&self`.
pub struct SessionController {
    config: Config,
    engine: Arc<dyn SpeechEngine>,
    provider: Arc<dyn FrameSourceProvider>,
    timeline: Arc<SubtitleTimeline>,
    hub: Arc<LiveBroadcastHub>,
    state: Arc<Mutex<SessionState>>,
    active: Mutex<Option<ActiveSession>>,
}

impl SessionController {
    pub fn new(
        config: Config,
        engine: Arc<dyn SpeechEngine>,
        provider: Arc<dyn FrameSourceProvider>,
    ) -> Self {
        let timeline = Arc::new(SubtitleTimeline::new(config.timeline.live_view_cap));
        Self {
            config,
            engine,
            provider,
            timeline,
            hub: Arc::new(LiveBroadcastHub::new()),
            state: Arc::new(Mutex::new(SessionState::Idle)),
            active: Mutex::new(None),
        }
    }

    /// Shared subtitle store, for read paths that bypass the controller.
    pub fn timeline(&self) -> &Arc<SubtitleTimeline> {
        &self.timeline
    }

    /// Broadcast hub for subscribing live clients.
    pub fn hub(&self) -> &Arc<LiveBroadcastHub> {
        &self.hub
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.lock_state()
    }

    /// Starts a recording session.
    ///
    /// Fails with `AlreadyRecording` unless the controller is idle, and with
    /// `DeviceUnavailable` if the frame source cannot be opened; the failed
    /// start leaves the controller idle and a later retry is fine.
    pub fn start(&self) -> Result<()> {
        self.start_with(StartOptions::default())
    }

    /// Starts a session with per-call overrides of language and device.
    pub fn start_with(&self, options: StartOptions) -> Result<()> {
        {
            let mut state = self.lock_state();
            if *state != SessionState::Idle {
                return Err(LivesubError::AlreadyRecording);
            }
            *state = SessionState::Starting;
        }

        let device = options
            .device
            .clone()
            .or_else(|| self.config.audio.device.clone());
        let source = match self.provider.open(device.as_deref()) {
            Ok(source) => source,
            Err(err) => {
                *self.lock_state() = SessionState::Idle;
                return Err(err);
            }
        };

        let started_at = unix_now();
        self.timeline
            .reset_for_session(&format!("session_{started_at}"));
        self.hub.publish(&Event::Clear);

        let running = Arc::new(AtomicBool::new(true));
        let (queue, queue_rx) = UtteranceQueue::new(
            self.config.pipeline.queue_capacity,
            self.config.pipeline.drop_policy,
        );

        let gate = VoiceActivityGate::with_classifier(
            GateConfig {
                sample_rate: source.sample_rate(),
                channels: source.channels(),
                pre_roll_ms: self.config.audio.pre_roll_ms,
                hangover_ms: self.config.audio.hangover_ms,
                post_pad_ms: self.config.audio.post_pad_ms,
                min_utterance_ms: self.config.audio.min_utterance_ms,
                max_utterance_ms: self.config.audio.max_utterance_ms,
            },
            Box::new(EnergyClassifier::new(self.config.audio.vad_threshold)),
        );

        let capture = CaptureLoop {
            source,
            gate,
            queue,
            queue_rx: queue_rx.clone(),
            hub: Arc::clone(&self.hub),
            running: Arc::clone(&running),
            state: Arc::clone(&self.state),
        };
        let capture_handle = thread::spawn(move || capture.run());

        let language = normalize_language(
            options
                .language
                .unwrap_or_else(|| self.config.stt.language.clone()),
        );
        let worker = TranscriptionWorker::new(
            Arc::clone(&self.engine),
            Arc::clone(&self.timeline),
            Arc::clone(&self.hub),
            language.clone(),
        );
        let worker_handle = worker.spawn(queue_rx);

        *self.lock_active() = Some(ActiveSession {
            running,
            capture: capture_handle,
            worker: worker_handle,
            started_at,
            language,
            device,
        });
        *self.lock_state() = SessionState::Recording;
        self.hub
            .publish(&Event::status(StatusKind::Recording, "recording started"));
        Ok(())
    }

    /// Stops the session, flushing everything captured so far.
    ///
    /// Joins the capture thread (which flushes any open utterance into the
    /// queue and drops the producer side), then the worker (which drains the
    /// queue before exiting). When this returns, the timeline holds every
    /// segment from the session and no pipeline thread is left running.
    pub fn stop(&self) -> Result<()> {
        {
            let mut state = self.lock_state();
            if *state != SessionState::Recording {
                return Err(LivesubError::NotRecording);
            }
            *state = SessionState::Stopping;
        }

        let Some(active) = self.lock_active().take() else {
            // State said recording but no threads exist; recover to idle.
            *self.lock_state() = SessionState::Idle;
            return Err(LivesubError::NotRecording);
        };

        active.running.store(false, Ordering::SeqCst);
        let _ = active.capture.join();
        let _ = active.worker.join();

        *self.lock_state() = SessionState::Idle;
        self.hub
            .publish(&Event::status(StatusKind::Stopped, "recording stopped"));
        Ok(())
    }

    /// Clears the timeline and tells clients to drop displayed subtitles.
    pub fn clear(&self) {
        self.timeline.clear();
        self.hub.publish(&Event::Clear);
    }

    /// Renders the full timeline in the requested format.
    ///
    /// Available in every state; an empty timeline exports a valid empty
    /// document.
    pub fn export(&self, format: ExportFormat) -> Result<ExportDocument> {
        self.timeline.export(format)
    }

    /// Snapshot of state, configuration, and counters.
    ///
    /// Never blocks on the pipeline; callable in any state.
    pub fn status(&self) -> SessionStatus {
        let state = self.state();
        // The active slot can outlive its session when the capture source
        // dies and the loop drops the controller back to idle itself, so the
        // snapshot only trusts it while a session is actually live.
        let live = matches!(state, SessionState::Recording | SessionState::Stopping);
        let active = self.lock_active();
        let (started_at, language, device) = match active.as_ref() {
            Some(session) if live => (
                Some(session.started_at),
                session.language.clone(),
                session.device.clone(),
            ),
            _ => (
                None,
                normalize_language(self.config.stt.language.clone()),
                self.config.audio.device.clone(),
            ),
        };
        drop(active);
        SessionStatus {
            state,
            model: self.engine.model_name(),
            language,
            device,
            started_at,
            segment_count: self.timeline.len(),
            subscriber_count: self.hub.subscriber_count(),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<ActiveSession>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Capture thread body: frame source through the gate into the queue.
struct CaptureLoop {
    source: Box<dyn crate::audio::source::FrameSource>,
    gate: VoiceActivityGate,
    queue: UtteranceQueue,
    queue_rx: crossbeam_channel::Receiver<crate::pipeline::gate::Utterance>,
    hub: Arc<LiveBroadcastHub>,
    running: Arc<AtomicBool>,
    state: Arc<Mutex<SessionState>>,
}

impl CaptureLoop {
    fn run(mut self) {
        while self.running.load(Ordering::SeqCst) {
            match self.source.next_frame() {
                Ok(Some(frame)) => match self.gate.feed(frame) {
                    Ok(Some(utterance)) => self.enqueue(utterance),
                    Ok(None) => {}
                    // Malformed frame: report it and keep the stream going.
                    Err(err) => {
                        self.hub
                            .publish(&Event::status(StatusKind::InvalidFrame, err.to_string()));
                    }
                },
                Ok(None) => thread::sleep(Duration::from_millis(5)),
                Err(_) => {
                    // The source died mid-session; flush what we have and
                    // put the controller back to idle ourselves.
                    self.running.store(false, Ordering::SeqCst);
                    if let Some(utterance) = self.gate.flush() {
                        self.enqueue(utterance);
                    }
                    self.settle_to_idle();
                    self.hub
                        .publish(&Event::status(StatusKind::Stopped, "capture source failed"));
                    return;
                }
            }
        }

        // Clean shutdown: close the open utterance so nothing spoken before
        // the stop is lost. Dropping `self.queue` afterwards disconnects the
        // channel and lets the worker drain and exit.
        if let Some(utterance) = self.gate.flush() {
            self.enqueue(utterance);
        }
    }

    /// Takes the state back to idle after a source failure.
    ///
    /// `start()` may still be mid-transition when the source dies on its
    /// first poll; wait for the state to leave `Starting` so the idle write
    /// is not overwritten by the starter's `Recording` assignment.
    fn settle_to_idle(&self) {
        loop {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state == SessionState::Starting {
                drop(state);
                thread::sleep(Duration::from_millis(1));
                continue;
            }
            *state = SessionState::Idle;
            return;
        }
    }

    fn enqueue(&self, utterance: crate::pipeline::gate::Utterance) {
        let outcome = self.queue.push(utterance, &self.queue_rx);
        if let PushOutcome::DroppedOldest(_) | PushOutcome::DroppedNewest(_) = outcome {
            self.hub.publish(&Event::status(
                StatusKind::BackpressureDrop,
                "transcription backlog full, dropped an utterance",
            ));
        }
    }
}

/// Maps the "auto" sentinel and empty strings to no hint at all.
fn normalize_language(language: String) -> Option<String> {
    if language.is_empty() || language == crate::defaults::AUTO_LANGUAGE {
        None
    } else {
        Some(language)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
