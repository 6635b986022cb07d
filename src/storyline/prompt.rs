// Corpus gathering and prompt text

use std::fmt::Write as _;

use rusqlite::Connection;
use serde::Serialize;

use crate::constants::*;
use crate::db::schema;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorpusSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorpusEntry {
    pub video_id: i64,
    pub title: String,
    pub filename: String,
    pub duration_seconds: Option<f64>,
    pub segments: Vec<CorpusSegment>,
}

/// Every video with a completed transcript, ordered by video id. Only the
/// newest completed transcript of a video is used.
pub fn load_corpus(conn: &Connection) -> Result<Vec<CorpusEntry>> {
    let mut video_ids: Vec<i64> = schema::list_completed_transcripts(conn)?
        .into_iter()
        .map(|t| t.video_id)
        .collect();
    video_ids.dedup();

    let mut corpus = Vec::with_capacity(video_ids.len());
    for video_id in video_ids {
        let Some(video) = schema::get_video(conn, video_id)? else {
            continue;
        };
        let segments = schema::get_completed_segments_for_video(conn, video_id)?
            .into_iter()
            .map(|s| CorpusSegment { start: s.start_time, end: s.end_time, text: s.text })
            .collect::<Vec<_>>();
        if segments.is_empty() {
            continue;
        }
        corpus.push(CorpusEntry {
            video_id,
            title: video.title,
            filename: video.filename,
            duration_seconds: video.duration_seconds,
            segments,
        });
    }
    Ok(corpus)
}

pub fn build_prompt(corpus: &[CorpusEntry]) -> String {
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "You are editing a personal video archive into short stories. Below are \
         timestamped transcripts of {} videos.",
        corpus.len()
    );
    prompt.push('\n');

    for entry in corpus {
        let _ = writeln!(
            prompt,
            "=== video_id: {} | title: {} | duration: {:.1}s ===",
            entry.video_id,
            entry.title,
            entry.duration_seconds.unwrap_or(0.0)
        );
        for seg in &entry.segments {
            let _ = writeln!(prompt, "[{:.1}-{:.1}] {}", seg.start, seg.end, seg.text);
        }
        prompt.push('\n');
    }

    let _ = write!(
        prompt,
        "Propose exactly {count} distinct storylines. Each storyline should run about \
         {target} seconds in total (between {min} and {max} seconds) and may combine \
         clips from several videos. Clip boundaries must use the timestamps shown above \
         and the video_id of the transcript they come from.\n\n\
         Respond with JSON only, in this shape:\n\
         {{\"storylines\": [{{\"id\": 1, \"title\": \"...\", \"hook\": \"...\", \
         \"why_compelling\": \"...\", \"estimated_duration\": 60, \"clips\": [{{\"video_id\": 1, \
         \"video_title\": \"...\", \"start_time\": 0.0, \"end_time\": 12.5, \"text\": \"...\"}}]}}]}}\n",
        count = STORYLINE_COUNT,
        target = STORYLINE_TARGET_SECS,
        min = STORYLINE_MIN_SECS,
        max = STORYLINE_MAX_SECS,
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::db::schema::{insert_transcript, insert_video, ArtifactStatus, NewSegment, NewVideo};

    fn seg(start: f64, end: f64, text: &str) -> NewSegment {
        NewSegment { start_time: start, end_time: end, text: text.into(), confidence: None }
    }

    #[test]
    fn test_corpus_uses_newest_completed_transcript() {
        let conn = open_in_memory().unwrap();
        let a = insert_video(&conn, &NewVideo { title: "Lake".into(), filename: "lake.mp4".into(), duration_seconds: Some(30.0), ..Default::default() }).unwrap();
        let b = insert_video(&conn, &NewVideo { title: "Attic".into(), filename: "attic.mp4".into(), ..Default::default() }).unwrap();

        insert_transcript(&conn, a, ArtifactStatus::Completed, None, &[seg(0.0, 2.0, "old words")]).unwrap();
        insert_transcript(&conn, a, ArtifactStatus::Completed, None, &[seg(0.0, 3.0, "new words")]).unwrap();
        insert_transcript(&conn, b, ArtifactStatus::Processing, None, &[seg(0.0, 1.0, "pending")]).unwrap();

        let corpus = load_corpus(&conn).unwrap();
        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus[0].segments, vec![CorpusSegment { start: 0.0, end: 3.0, text: "new words".into() }]);

        let prompt = build_prompt(&corpus);
        assert!(prompt.contains("video_id: 1 | title: Lake"));
        assert!(prompt.contains("[0.0-3.0] new words"));
        assert!(prompt.contains("exactly 5 distinct storylines"));
        assert!(!prompt.contains("pending"));
    }
}
