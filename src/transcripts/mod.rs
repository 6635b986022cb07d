// Transcripts: import boundary and context ranking
//
// Transcripts are produced elsewhere. This module accepts them in the
// collaborator's JSON shape and keeps them read-only afterwards.

pub mod keywords;
pub mod ranker;

use std::path::Path;

use rusqlite::Connection;
use serde::Deserialize;

use crate::db::schema::{self, ArtifactStatus, NewSegment, Transcript};
use crate::error::{PipelineError, Result};

pub use ranker::{build_context, RankOptions, RankedExcerpt, TranscriptContextRanker};

#[derive(Debug, Clone, Deserialize)]
pub struct ImportedSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// `{language, status?, segments: [{start, end, text, confidence?}]}`
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptImport {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub status: Option<ArtifactStatus>,
    pub segments: Vec<ImportedSegment>,
}

pub fn load_transcript_file(path: &Path) -> Result<TranscriptImport> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Store a transcript for a video. Segments are ordered by start time;
/// status defaults to `completed`.
pub fn import_transcript(conn: &Connection, video_id: i64, import: &TranscriptImport) -> Result<i64> {
    let video = schema::get_video(conn, video_id)?.ok_or(PipelineError::VideoNotFound(video_id))?;

    let mut segments: Vec<NewSegment> = Vec::with_capacity(import.segments.len());
    for (i, seg) in import.segments.iter().enumerate() {
        if !seg.start.is_finite() || !seg.end.is_finite() || seg.start < 0.0 || seg.start > seg.end {
            return Err(PipelineError::InvalidInput(format!(
                "Segment {} has an invalid range {}-{}",
                i, seg.start, seg.end
            )));
        }
        if let Some(duration) = video.duration_seconds {
            if seg.start > duration {
                return Err(PipelineError::InvalidInput(format!(
                    "Segment {} starts at {} past the video end {}",
                    i, seg.start, duration
                )));
            }
        }
        segments.push(NewSegment {
            start_time: seg.start,
            end_time: seg.end,
            text: seg.text.clone(),
            confidence: seg.confidence,
        });
    }
    segments.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));

    let status = import.status.unwrap_or(ArtifactStatus::Completed);
    let id = schema::insert_transcript(conn, video_id, status, import.language.as_deref(), &segments)?;
    log::info!(
        "Imported transcript {} for video {} ({} segments, {})",
        id,
        video_id,
        segments.len(),
        status
    );
    Ok(id)
}

pub fn list_transcripts(conn: &Connection, video_id: Option<i64>) -> Result<Vec<Transcript>> {
    schema::list_transcripts(conn, video_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::db::schema::{get_completed_segments_for_video, insert_video, NewVideo};

    fn video(conn: &Connection) -> i64 {
        insert_video(
            conn,
            &NewVideo { title: "t".into(), filename: "t.mp4".into(), duration_seconds: Some(100.0), ..Default::default() },
        )
        .unwrap()
    }

    #[test]
    fn test_import_orders_segments_and_defaults_status() {
        let conn = open_in_memory().unwrap();
        let video_id = video(&conn);
        let import: TranscriptImport = serde_json::from_str(
            r#"{"language": "en", "segments": [
                {"start": 5.0, "end": 9.0, "text": "second"},
                {"start": 0.0, "end": 4.5, "text": "first", "confidence": 0.8}
            ]}"#,
        )
        .unwrap();

        import_transcript(&conn, video_id, &import).unwrap();
        let transcripts = list_transcripts(&conn, Some(video_id)).unwrap();
        assert_eq!(transcripts[0].status, ArtifactStatus::Completed);
        assert_eq!(transcripts[0].full_text, "first second");

        let segments = get_completed_segments_for_video(&conn, video_id).unwrap();
        assert_eq!(segments[0].text, "first");
        assert_eq!(segments[0].segment_index, 0);
        assert_eq!(segments[0].confidence, Some(0.8));
    }

    #[test]
    fn test_import_rejects_bad_segments() {
        let conn = open_in_memory().unwrap();
        let video_id = video(&conn);
        let import: TranscriptImport =
            serde_json::from_str(r#"{"segments": [{"start": 8.0, "end": 2.0, "text": "x"}]}"#).unwrap();
        assert!(matches!(import_transcript(&conn, video_id, &import), Err(PipelineError::InvalidInput(_))));
        assert!(matches!(import_transcript(&conn, 42, &import), Err(PipelineError::VideoNotFound(42))));
        assert!(list_transcripts(&conn, None).unwrap().is_empty());
    }
}
