//! Clip entity and filename sanitization

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a clip.
///
/// A clip is `Recording` from creation until the encoder reports `done`,
/// `Ready` once compressed frames are authoritative, and `Failed` only if
/// both the streaming encode and the single-shot fallback gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipStatus {
    Recording,
    Ready,
    Failed,
}

impl fmt::Display for ClipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Recording => "recording",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// A recorded clip.
///
/// Created at capture start with `Recording` status and zero size. The
/// capture controller advances `duration_seconds`; the encode pipeline sets
/// `status`, `size_bytes`, `digest` and `filename` on completion. After
/// `Ready` the record is only renamed or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clip {
    pub id: String,
    pub title: String,
    pub status: ClipStatus,
    pub size_bytes: u64,
    pub duration_seconds: u64,
    pub sample_rate: u32,
    pub channel_count: u16,
    /// MD5 hex digest over the emitted compressed bytes; empty until finalized.
    pub digest: String,
    pub filename: String,
    pub created_at_ms: u64,
}

impl Clip {
    /// Create a new clip in the `Recording` state.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        sample_rate: u32,
        channel_count: u16,
        created_at_ms: u64,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            status: ClipStatus::Recording,
            size_bytes: 0,
            duration_seconds: 0,
            sample_rate,
            channel_count,
            digest: String::new(),
            filename: String::new(),
            created_at_ms,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == ClipStatus::Ready
    }
}

/// Build a safe download filename from a clip title.
///
/// Lowercases, replaces whitespace runs with `_`, strips everything outside
/// `[a-z0-9-_]`, and appends a `YYYYMMDD-HHMM` stamp and the `.ogg`
/// extension: `my_clip__20250301-1437.ogg`.
pub fn sanitize_filename(title: &str, now: chrono::DateTime<chrono::Local>) -> String {
    let base = if title.trim().is_empty() { "clip" } else { title };
    let mut slug = String::with_capacity(base.len());
    let mut last_was_space = false;
    for c in base.to_lowercase().chars() {
        if c.is_whitespace() {
            if !last_was_space {
                slug.push('_');
            }
            last_was_space = true;
        } else if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            slug.push(c);
            last_was_space = false;
        } else {
            last_was_space = false;
        }
    }
    if slug.is_empty() {
        slug.push_str("clip");
    }
    format!("{}__{}.ogg", slug, now.format("%Y%m%d-%H%M"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn stamp() -> chrono::DateTime<chrono::Local> {
        chrono::Local.with_ymd_and_hms(2025, 3, 1, 14, 37, 0).unwrap()
    }

    #[test]
    fn new_clip_is_recording_and_empty() {
        let clip = Clip::new("id-1", "Morning notes", 48000, 1, 0);
        assert_eq!(clip.status, ClipStatus::Recording);
        assert_eq!(clip.size_bytes, 0);
        assert!(clip.digest.is_empty());
        assert!(!clip.is_ready());
    }

    #[test]
    fn sanitize_slugs_and_stamps() {
        let name = sanitize_filename("My Story: Part 2!", stamp());
        assert_eq!(name, "my_story_part_2__20250301-1437.ogg");
    }

    #[test]
    fn sanitize_collapses_whitespace() {
        let name = sanitize_filename("a   b", stamp());
        assert_eq!(name, "a_b__20250301-1437.ogg");
    }

    #[test]
    fn sanitize_empty_title_falls_back() {
        let name = sanitize_filename("  ", stamp());
        assert!(name.starts_with("clip__"));
    }

    #[test]
    fn status_display() {
        assert_eq!(ClipStatus::Recording.to_string(), "recording");
        assert_eq!(ClipStatus::Ready.to_string(), "ready");
    }
}
