//! Subtitle export in SRT, WebVTT, JSON, and plain-text formats.

use crate::error::{LivesubError, Result};
use crate::timeline::Segment;
use std::fmt::Write as _;
use std::str::FromStr;

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Srt,
    Vtt,
    Json,
    Txt,
}

impl ExportFormat {
    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Srt => "srt",
            ExportFormat::Vtt => "vtt",
            ExportFormat::Json => "json",
            ExportFormat::Txt => "txt",
        }
    }

    /// MIME type for download responses.
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Srt | ExportFormat::Txt => "text/plain; charset=utf-8",
            ExportFormat::Vtt => "text/vtt; charset=utf-8",
            ExportFormat::Json => "application/json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = LivesubError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "srt" => Ok(ExportFormat::Srt),
            "vtt" | "webvtt" => Ok(ExportFormat::Vtt),
            "json" => Ok(ExportFormat::Json),
            "txt" | "text" => Ok(ExportFormat::Txt),
            other => Err(LivesubError::UnsupportedFormat {
                format: other.to_string(),
            }),
        }
    }
}

/// A rendered export ready to hand to a download or file write.
#[derive(Debug, Clone)]
pub struct ExportDocument {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Renders segments in the given format.
///
/// An empty segment list renders a valid empty document (`[]` for JSON, a
/// bare header for VTT).
pub fn export(segments: &[Segment], format: ExportFormat, session_label: &str) -> Result<ExportDocument> {
    let body = match format {
        ExportFormat::Srt => render_srt(segments),
        ExportFormat::Vtt => render_vtt(segments),
        ExportFormat::Json => serde_json::to_string_pretty(segments)?,
        ExportFormat::Txt => render_txt(segments),
    };
    Ok(ExportDocument {
        filename: format!("subtitles_{}.{}", session_label, format.extension()),
        content_type: format.content_type(),
        bytes: body.into_bytes(),
    })
}

fn render_srt(segments: &[Segment]) -> String {
    let mut out = String::new();
    for (index, segment) in segments.iter().enumerate() {
        let _ = writeln!(out, "{}", index + 1);
        let _ = writeln!(
            out,
            "{} --> {}",
            format_timestamp(segment.start_time, ','),
            format_timestamp(segment.end_time, ',')
        );
        let _ = writeln!(out, "{}", segment.text);
        out.push('\n');
    }
    out
}

fn render_vtt(segments: &[Segment]) -> String {
    let mut out = String::from("WEBVTT\n\n");
    for segment in segments {
        let _ = writeln!(
            out,
            "{} --> {}",
            format_timestamp(segment.start_time, '.'),
            format_timestamp(segment.end_time, '.')
        );
        let _ = writeln!(out, "{}", segment.text);
        out.push('\n');
    }
    out
}

fn render_txt(segments: &[Segment]) -> String {
    let mut out = String::new();
    for segment in segments {
        let _ = writeln!(out, "{}", segment.text);
    }
    out
}

/// Formats seconds as `HH:MM:SS<sep>mmm`.
///
/// SRT uses a comma before the milliseconds, WebVTT a dot.
fn format_timestamp(seconds: f64, millis_sep: char) -> String {
    let clamped = seconds.max(0.0);
    let total_millis = (clamped * 1000.0).round() as u64;
    let hours = total_millis / 3_600_000;
    let minutes = (total_millis % 3_600_000) / 60_000;
    let secs = (total_millis % 60_000) / 1000;
    let millis = total_millis % 1000;
    format!("{hours:02}:{minutes:02}:{secs:02}{millis_sep}{millis:03}")
}
