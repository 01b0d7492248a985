//! Transcription engine trait and a scriptable mock.
//!
//! The engine is the one genuinely slow collaborator in the pipeline, so the
//! trait keeps its surface minimal: a blocking call from utterance samples to
//! timed phrases. Phrase times are relative to the start of the submitted
//! utterance; the worker rebases them onto the session time base.

use crate::error::{LivesubError, Result};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// One phrase recognized within an utterance.
///
/// `start` and `end` are seconds from the beginning of the utterance's
/// samples, not from session start.
#[derive(Debug, Clone, PartialEq)]
pub struct EnginePhrase {
    pub text: String,
    pub start: f64,
    pub end: f64,
    pub confidence: f32,
    pub language: Option<String>,
}

impl EnginePhrase {
    pub fn new(text: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            text: text.into(),
            start,
            end,
            confidence: 1.0,
            language: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// Trait for transcription engines.
pub trait SpeechEngine: Send + Sync {
    /// Transcribes one utterance's samples into timed phrases.
    ///
    /// `language_hint` is a BCP-47-ish code, or `None` for auto-detection.
    /// An empty result is valid: the engine heard nothing worth emitting.
    fn transcribe(
        &self,
        samples: &[i16],
        language_hint: Option<&str>,
    ) -> Result<Vec<EnginePhrase>>;

    /// Name of the loaded model, for status reporting.
    fn model_name(&self) -> String;

    /// Returns true once the engine can accept work.
    fn is_ready(&self) -> bool;
}

/// Mock engine for testing pipeline plumbing without a model.
///
/// Scripted results are returned in order, cycling once exhausted. Failures
/// can be scripted up front to exercise the worker's retry path.
pub struct MockEngine {
    scripted: Mutex<Vec<Vec<EnginePhrase>>>,
    call_index: AtomicUsize,
    failures_remaining: AtomicU32,
    fail_always: bool,
    model_name: String,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            scripted: Mutex::new(Vec::new()),
            call_index: AtomicUsize::new(0),
            failures_remaining: AtomicU32::new(0),
            fail_always: false,
            model_name: "mock".to_string(),
        }
    }

    /// Scripts the phrases returned by one successful call.
    pub fn with_result(self, phrases: Vec<EnginePhrase>) -> Self {
        if let Ok(mut scripted) = self.scripted.lock() {
            scripted.push(phrases);
        }
        self
    }

    /// Scripts a single phrase spanning the whole call.
    pub fn with_text(self, text: &str) -> Self {
        let phrase = EnginePhrase::new(text, 0.0, 1.0);
        self.with_result(vec![phrase])
    }

    /// The first `count` calls fail before scripted results resume.
    pub fn with_failures(mut self, count: u32) -> Self {
        self.failures_remaining = AtomicU32::new(count);
        self
    }

    /// Every call fails.
    pub fn with_permanent_failure(mut self) -> Self {
        self.fail_always = true;
        self
    }

    pub fn with_model_name(mut self, name: &str) -> Self {
        self.model_name = name.to_string();
        self
    }

    /// Number of transcribe calls made so far.
    pub fn calls(&self) -> usize {
        self.call_index.load(Ordering::SeqCst)
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechEngine for MockEngine {
    fn transcribe(
        &self,
        _samples: &[i16],
        language_hint: Option<&str>,
    ) -> Result<Vec<EnginePhrase>> {
        let index = self.call_index.fetch_add(1, Ordering::SeqCst);

        if self.fail_always {
            return Err(LivesubError::Transcription {
                message: "mock engine failure".to_string(),
            });
        }

        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
            return Err(LivesubError::Transcription {
                message: format!("mock engine failure ({remaining} remaining)"),
            });
        }

        let scripted = self
            .scripted
            .lock()
            .map_err(|_| LivesubError::Other("mock engine lock poisoned".to_string()))?;
        if scripted.is_empty() {
            return Ok(Vec::new());
        }

        let mut phrases = scripted[index % scripted.len()].clone();
        if let Some(hint) = language_hint {
            for phrase in &mut phrases {
                phrase.language.get_or_insert_with(|| hint.to_string());
            }
        }
        Ok(phrases)
    }

    fn model_name(&self) -> String {
        self.model_name.clone()
    }

    fn is_ready(&self) -> bool {
        true
    }
}
