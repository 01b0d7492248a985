//! Ordered subtitle timeline.
//!
//! Segments are appended by the transcription worker and read concurrently by
//! broadcast clients and exporters. The retention cap bounds only the live
//! `recent` view; the full segment list is kept for export until `clear`.

pub mod export;

pub use export::{ExportDocument, ExportFormat};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// One finalized subtitle segment on the session time base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Monotonically increasing id, starting at 1 for each session.
    pub id: u64,
    /// Seconds from session start.
    pub start_time: f64,
    /// Seconds from session start.
    pub end_time: f64,
    pub text: String,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Per-language slice of the stored segments.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LanguageStats {
    pub segment_count: usize,
    pub duration_secs: f64,
}

/// Aggregate statistics over the stored segments.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineStats {
    pub segment_count: usize,
    pub total_duration_secs: f64,
    /// Mean segment confidence; 0.0 when the timeline is empty.
    pub average_confidence: f32,
    pub word_count: usize,
    /// Tallies keyed by the stored language; segments without one are
    /// grouped under "unknown".
    pub languages: HashMap<String, LanguageStats>,
    pub session_label: String,
}

#[derive(Debug)]
struct TimelineInner {
    segments: Vec<Segment>,
    next_id: u64,
    session_label: String,
}

/// Thread-safe subtitle store.
#[derive(Debug)]
pub struct SubtitleTimeline {
    inner: RwLock<TimelineInner>,
    live_view_cap: usize,
}

impl SubtitleTimeline {
    /// Creates an empty timeline. `live_view_cap` bounds the `recent` view.
    pub fn new(live_view_cap: usize) -> Self {
        Self {
            inner: RwLock::new(TimelineInner {
                segments: Vec::new(),
                next_id: 1,
                session_label: "session".to_string(),
            }),
            live_view_cap: live_view_cap.max(1),
        }
    }

    /// Appends a segment, assigning its id. Returns the stored segment.
    ///
    /// Segments normally arrive in start-time order; a late arrival is
    /// inserted at its sorted position so readers always see an ordered list.
    pub fn append(
        &self,
        start_time: f64,
        end_time: f64,
        text: String,
        confidence: f32,
        language: Option<String>,
    ) -> Segment {
        let mut inner = self.write();
        let segment = Segment {
            id: inner.next_id,
            start_time,
            end_time,
            text,
            confidence,
            language,
        };
        inner.next_id += 1;

        let position = inner
            .segments
            .partition_point(|existing| existing.start_time <= segment.start_time);
        inner.segments.insert(position, segment.clone());
        segment
    }

    /// Returns all segments, or only those with id greater than `since_id`.
    pub fn list(&self, since_id: Option<u64>) -> Vec<Segment> {
        let inner = self.read();
        match since_id {
            None => inner.segments.clone(),
            Some(since) => inner
                .segments
                .iter()
                .filter(|segment| segment.id > since)
                .cloned()
                .collect(),
        }
    }

    /// Returns the most recent segments by start time, oldest first.
    ///
    /// Capped at the configured live view size regardless of `limit`.
    pub fn recent(&self, limit: usize) -> Vec<Segment> {
        let inner = self.read();
        let take = limit.min(self.live_view_cap).min(inner.segments.len());
        inner.segments[inner.segments.len() - take..].to_vec()
    }

    /// Case-insensitive substring search over segment text.
    pub fn search(&self, query: &str) -> Vec<Segment> {
        let needle = query.to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let inner = self.read();
        inner
            .segments
            .iter()
            .filter(|segment| segment.text.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }

    /// Returns aggregate statistics over the stored segments.
    pub fn stats(&self) -> TimelineStats {
        let inner = self.read();
        let mut total_duration_secs = 0.0;
        let mut confidence_sum = 0.0f64;
        let mut word_count = 0;
        let mut languages: HashMap<String, LanguageStats> = HashMap::new();

        for segment in &inner.segments {
            let duration = (segment.end_time - segment.start_time).max(0.0);
            total_duration_secs += duration;
            confidence_sum += segment.confidence as f64;
            word_count += segment.text.split_whitespace().count();

            let key = segment.language.as_deref().unwrap_or("unknown");
            let entry = languages.entry(key.to_string()).or_default();
            entry.segment_count += 1;
            entry.duration_secs += duration;
        }

        let average_confidence = if inner.segments.is_empty() {
            0.0
        } else {
            (confidence_sum / inner.segments.len() as f64) as f32
        };

        TimelineStats {
            segment_count: inner.segments.len(),
            total_duration_secs,
            average_confidence,
            word_count,
            languages,
            session_label: inner.session_label.clone(),
        }
    }

    /// Renders the full retained segment set in the given format.
    ///
    /// Ignores the live view cap: exports are complete by contract.
    pub fn export(&self, format: ExportFormat) -> crate::error::Result<ExportDocument> {
        let inner = self.read();
        export::export(&inner.segments, format, &inner.session_label)
    }

    /// Number of stored segments.
    pub fn len(&self) -> usize {
        self.read().segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Label used in export filenames.
    pub fn session_label(&self) -> String {
        self.read().session_label.clone()
    }

    /// Removes all segments and resets id assignment.
    pub fn clear(&self) {
        let mut inner = self.write();
        inner.segments.clear();
        inner.next_id = 1;
    }

    /// Clears the timeline and tags it with a new session label.
    pub fn reset_for_session(&self, label: &str) {
        let mut inner = self.write();
        inner.segments.clear();
        inner.next_id = 1;
        inner.session_label = label.to_string();
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, TimelineInner> {
        // Propagating poison here would turn one panicked writer into a
        // crashed reader fleet; the data is still consistent enough to serve.
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, TimelineInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(timeline: &SubtitleTimeline, texts: &[&str]) {
        for (i, text) in texts.iter().enumerate() {
            let start = i as f64 * 2.0;
            timeline.append(start, start + 1.5, text.to_string(), 0.9, None);
        }
    }

    #[test]
    fn test_append_assigns_sequential_ids_from_one() {
        let timeline = SubtitleTimeline::new(100);
        seed(&timeline, &["a", "b", "c"]);

        let segments = timeline.list(None);
        let ids: Vec<u64> = segments.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_late_segment_is_inserted_in_order() {
        let timeline = SubtitleTimeline::new(100);
        timeline.append(0.0, 1.0, "first".to_string(), 0.9, None);
        timeline.append(4.0, 5.0, "third".to_string(), 0.9, None);
        timeline.append(2.0, 3.0, "second".to_string(), 0.9, None);

        let texts: Vec<String> = timeline.list(None).into_iter().map(|s| s.text).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_list_since_id() {
        let timeline = SubtitleTimeline::new(100);
        seed(&timeline, &["a", "b", "c", "d"]);

        let newer = timeline.list(Some(2));
        assert_eq!(newer.len(), 2);
        assert_eq!(newer[0].text, "c");
        assert_eq!(newer[1].text, "d");
    }

    #[test]
    fn test_recent_returns_tail_oldest_first() {
        let timeline = SubtitleTimeline::new(100);
        seed(&timeline, &["a", "b", "c", "d", "e"]);

        let recent = timeline.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].text, "d");
        assert_eq!(recent[1].text, "e");
    }

    #[test]
    fn test_recent_is_capped_by_live_view() {
        let timeline = SubtitleTimeline::new(3);
        seed(&timeline, &["a", "b", "c", "d", "e"]);

        assert_eq!(timeline.recent(100).len(), 3);
        // The full store is untouched by the cap.
        assert_eq!(timeline.len(), 5);
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let timeline = SubtitleTimeline::new(100);
        seed(&timeline, &["Hello world", "goodbye", "HELLO again"]);

        let hits = timeline.search("hello");
        assert_eq!(hits.len(), 2);
        assert!(timeline.search("").is_empty());
        assert!(timeline.search("missing").is_empty());
    }

    #[test]
    fn test_stats() {
        let timeline = SubtitleTimeline::new(100);
        timeline.append(0.0, 1.0, "one two three".to_string(), 0.8, Some("en".to_string()));
        timeline.append(2.0, 4.0, "vier".to_string(), 0.6, Some("de".to_string()));
        timeline.append(5.0, 6.0, "five".to_string(), 1.0, None);

        let stats = timeline.stats();
        assert_eq!(stats.segment_count, 3);
        assert_eq!(stats.word_count, 5);
        assert!((stats.total_duration_secs - 4.0).abs() < 1e-9);
        assert!((stats.average_confidence - 0.8).abs() < 1e-6);

        assert_eq!(stats.languages.len(), 3);
        let en = &stats.languages["en"];
        assert_eq!(en.segment_count, 1);
        assert!((en.duration_secs - 1.0).abs() < 1e-9);
        let de = &stats.languages["de"];
        assert!((de.duration_secs - 2.0).abs() < 1e-9);
        // Segments without a language land in the "unknown" bucket.
        assert_eq!(stats.languages["unknown"].segment_count, 1);
    }

    #[test]
    fn test_stats_on_empty_timeline() {
        let stats = SubtitleTimeline::new(100).stats();
        assert_eq!(stats.segment_count, 0);
        assert_eq!(stats.average_confidence, 0.0);
        assert!(stats.languages.is_empty());
    }

    #[test]
    fn test_export_ignores_live_view_cap() {
        let timeline = SubtitleTimeline::new(2);
        seed(&timeline, &["a", "b", "c"]);

        assert_eq!(timeline.recent(10).len(), 2);
        let doc = timeline.export(ExportFormat::Txt).unwrap();
        assert_eq!(String::from_utf8(doc.bytes).unwrap(), "a\nb\nc\n");
    }

    #[test]
    fn test_clear_resets_ids() {
        let timeline = SubtitleTimeline::new(100);
        seed(&timeline, &["a", "b"]);

        timeline.clear();
        assert!(timeline.is_empty());

        let segment = timeline.append(0.0, 1.0, "fresh".to_string(), 0.9, None);
        assert_eq!(segment.id, 1);
    }

    #[test]
    fn test_reset_for_session_sets_label() {
        let timeline = SubtitleTimeline::new(100);
        seed(&timeline, &["a"]);

        timeline.reset_for_session("20260825_120000");
        assert!(timeline.is_empty());
        assert_eq!(timeline.session_label(), "20260825_120000");
    }

    #[test]
    fn test_segment_json_round_trip() {
        let timeline = SubtitleTimeline::new(100);
        let segment = timeline.append(1.25, 3.5, "round trip".to_string(), 0.87, None);

        let json = serde_json::to_string(&segment).unwrap();
        let back: Segment = serde_json::from_str(&json).unwrap();
        assert_eq!(back, segment);
        // Absent language is omitted entirely, not serialized as null.
        assert!(!json.contains("language"));
    }
}
