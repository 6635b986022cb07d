// Database schema types and query helpers

use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

// ----- Status -----

/// Lifecycle status shared by clips, compiled videos and transcripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl ArtifactStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactStatus::Pending => "pending",
            ArtifactStatus::Processing => "processing",
            ArtifactStatus::Completed => "completed",
            ArtifactStatus::Error => "error",
        }
    }
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactStatus {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ArtifactStatus::Pending),
            "processing" => Ok(ArtifactStatus::Processing),
            "completed" => Ok(ArtifactStatus::Completed),
            "error" => Ok(ArtifactStatus::Error),
            other => Err(PipelineError::InvalidInput(format!("Unknown status: {}", other))),
        }
    }
}

impl ToSql for ArtifactStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ArtifactStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        s.parse().map_err(|e: PipelineError| FromSqlError::Other(Box::new(e)))
    }
}

// ----- Video -----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    pub id: i64,
    pub title: String,
    pub filename: String,
    pub storage_key: Option<String>,
    pub duration_seconds: Option<f64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub event_year: Option<i32>,
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewVideo {
    pub title: String,
    pub filename: String,
    pub storage_key: Option<String>,
    pub duration_seconds: Option<f64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub event_year: Option<i32>,
}

const VIDEO_COLUMNS: &str =
    "id, title, filename, storage_key, duration_seconds, width, height, event_year, status, created_at";

fn map_video(row: &Row<'_>) -> rusqlite::Result<Video> {
    Ok(Video {
        id: row.get(0)?,
        title: row.get(1)?,
        filename: row.get(2)?,
        storage_key: row.get(3)?,
        duration_seconds: row.get(4)?,
        width: row.get(5)?,
        height: row.get(6)?,
        event_year: row.get(7)?,
        status: row.get(8)?,
        created_at: row.get(9)?,
    })
}

pub fn insert_video(conn: &Connection, video: &NewVideo) -> Result<i64> {
    conn.execute(
        "INSERT INTO videos (title, filename, storage_key, duration_seconds, width, height, event_year)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            video.title,
            video.filename,
            video.storage_key,
            video.duration_seconds,
            video.width,
            video.height,
            video.event_year,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_video(conn: &Connection, id: i64) -> Result<Option<Video>> {
    let result = conn
        .query_row(
            &format!("SELECT {} FROM videos WHERE id = ?1", VIDEO_COLUMNS),
            params![id],
            map_video,
        )
        .optional()?;
    Ok(result)
}

pub fn list_videos(conn: &Connection, limit: i64) -> Result<Vec<Video>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM videos ORDER BY id ASC LIMIT ?1",
        VIDEO_COLUMNS
    ))?;
    let videos = stmt
        .query_map(params![limit], map_video)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(videos)
}

pub fn update_video_status(conn: &Connection, id: i64, status: &str) -> Result<()> {
    conn.execute(
        "UPDATE videos SET status = ?1 WHERE id = ?2",
        params![status, id],
    )?;
    Ok(())
}

// ----- Transcripts -----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub id: i64,
    pub video_id: i64,
    pub status: ArtifactStatus,
    pub language: Option<String>,
    pub full_text: String,
    pub word_count: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: i64,
    pub transcript_id: i64,
    pub segment_index: i64,
    pub start_time: f64,
    pub end_time: f64,
    pub text: String,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct NewSegment {
    pub start_time: f64,
    pub end_time: f64,
    pub text: String,
    pub confidence: Option<f64>,
}

fn map_transcript(row: &Row<'_>) -> rusqlite::Result<Transcript> {
    Ok(Transcript {
        id: row.get(0)?,
        video_id: row.get(1)?,
        status: row.get(2)?,
        language: row.get(3)?,
        full_text: row.get(4)?,
        word_count: row.get(5)?,
        created_at: row.get(6)?,
    })
}

pub(crate) fn map_segment(row: &Row<'_>) -> rusqlite::Result<Segment> {
    Ok(Segment {
        id: row.get(0)?,
        transcript_id: row.get(1)?,
        segment_index: row.get(2)?,
        start_time: row.get(3)?,
        end_time: row.get(4)?,
        text: row.get(5)?,
        confidence: row.get(6)?,
    })
}

/// Insert a transcript with its ordered segments in one transaction.
/// Full text and word count are derived from the segments.
pub fn insert_transcript(
    conn: &Connection,
    video_id: i64,
    status: ArtifactStatus,
    language: Option<&str>,
    segments: &[NewSegment],
) -> Result<i64> {
    let full_text = segments
        .iter()
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    let word_count = full_text.split_whitespace().count() as i64;

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO transcripts (video_id, status, language, full_text, word_count)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![video_id, status, language, full_text, word_count],
    )?;
    let transcript_id = tx.last_insert_rowid();

    {
        let mut stmt = tx.prepare(
            "INSERT INTO transcript_segments (transcript_id, segment_index, start_time, end_time, text, confidence)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for (i, seg) in segments.iter().enumerate() {
            stmt.execute(params![
                transcript_id,
                i as i64,
                seg.start_time,
                seg.end_time,
                seg.text.trim(),
                seg.confidence,
            ])?;
        }
    }

    tx.commit()?;
    Ok(transcript_id)
}

pub fn list_transcripts(conn: &Connection, video_id: Option<i64>) -> Result<Vec<Transcript>> {
    let mut stmt = conn.prepare(
        "SELECT id, video_id, status, language, full_text, word_count, created_at
         FROM transcripts
         WHERE (?1 IS NULL OR video_id = ?1)
         ORDER BY video_id ASC, id ASC",
    )?;
    let transcripts = stmt
        .query_map(params![video_id], map_transcript)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(transcripts)
}

/// Completed transcripts only, ordered by video.
pub fn list_completed_transcripts(conn: &Connection) -> Result<Vec<Transcript>> {
    let mut stmt = conn.prepare(
        "SELECT id, video_id, status, language, full_text, word_count, created_at
         FROM transcripts
         WHERE status = 'completed'
         ORDER BY video_id ASC, id ASC",
    )?;
    let transcripts = stmt
        .query_map([], map_transcript)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(transcripts)
}

pub fn get_transcript_segments(conn: &Connection, transcript_id: i64) -> Result<Vec<Segment>> {
    let mut stmt = conn.prepare(
        "SELECT id, transcript_id, segment_index, start_time, end_time, text, confidence
         FROM transcript_segments
         WHERE transcript_id = ?1
         ORDER BY start_time ASC, segment_index ASC",
    )?;
    let segments = stmt
        .query_map(params![transcript_id], map_segment)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(segments)
}

/// Segments of the video's newest completed transcript.
pub fn get_completed_segments_for_video(conn: &Connection, video_id: i64) -> Result<Vec<Segment>> {
    let transcript_id: Option<i64> = conn
        .query_row(
            "SELECT id FROM transcripts
             WHERE video_id = ?1 AND status = 'completed'
             ORDER BY id DESC LIMIT 1",
            params![video_id],
            |row| row.get(0),
        )
        .optional()?;

    match transcript_id {
        Some(id) => get_transcript_segments(conn, id),
        None => Ok(Vec::new()),
    }
}

// ----- Clips -----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clip {
    pub id: i64,
    pub video_id: i64,
    pub name: String,
    pub notes: Option<String>,
    pub start_time: f64,
    pub end_time: f64,
    pub status: ArtifactStatus,
    pub storage_key: Option<String>,
    pub file_size_bytes: Option<i64>,
    pub error_message: Option<String>,
    pub created_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Clip {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

#[derive(Debug, Clone)]
pub struct NewClip<'a> {
    pub video_id: i64,
    pub name: &'a str,
    pub notes: Option<&'a str>,
    pub start_time: f64,
    pub end_time: f64,
    pub created_by: Option<&'a str>,
}

const CLIP_COLUMNS: &str = "c.id, c.video_id, c.name, c.notes, c.start_time, c.end_time, c.status,
     c.storage_key, c.file_size_bytes, c.error_message, c.created_by, c.created_at, c.updated_at";

fn map_clip(row: &Row<'_>) -> rusqlite::Result<Clip> {
    Ok(Clip {
        id: row.get(0)?,
        video_id: row.get(1)?,
        name: row.get(2)?,
        notes: row.get(3)?,
        start_time: row.get(4)?,
        end_time: row.get(5)?,
        status: row.get(6)?,
        storage_key: row.get(7)?,
        file_size_bytes: row.get(8)?,
        error_message: row.get(9)?,
        created_by: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

/// Insert a clip row in `processing` state. Runs in its own transaction.
pub fn insert_processing_clip(conn: &Connection, clip: &NewClip<'_>) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO clips (video_id, name, notes, start_time, end_time, status, created_by)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            clip.video_id,
            clip.name,
            clip.notes,
            clip.start_time,
            clip.end_time,
            ArtifactStatus::Processing,
            clip.created_by,
        ],
    )?;
    let id = tx.last_insert_rowid();
    tx.commit()?;
    Ok(id)
}

pub fn get_clip(conn: &Connection, id: i64) -> Result<Option<Clip>> {
    let result = conn
        .query_row(
            &format!("SELECT {} FROM clips c WHERE c.id = ?1", CLIP_COLUMNS),
            params![id],
            map_clip,
        )
        .optional()?;
    Ok(result)
}

pub fn list_clips(
    conn: &Connection,
    video_id: Option<i64>,
    status: Option<ArtifactStatus>,
    limit: i64,
) -> Result<Vec<Clip>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM clips c
         WHERE (?1 IS NULL OR c.video_id = ?1)
           AND (?2 IS NULL OR c.status = ?2)
         ORDER BY c.id ASC
         LIMIT ?3",
        CLIP_COLUMNS
    ))?;
    let clips = stmt
        .query_map(params![video_id, status, limit], map_clip)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(clips)
}

pub fn mark_clip_completed(conn: &Connection, id: i64, storage_key: &str, file_size: i64) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE clips
         SET status = ?1, storage_key = ?2, file_size_bytes = ?3, error_message = NULL,
             updated_at = datetime('now')
         WHERE id = ?4",
        params![ArtifactStatus::Completed, storage_key, file_size, id],
    )?;
    tx.commit()?;
    Ok(())
}

pub fn mark_clip_error(conn: &Connection, id: i64, message: &str) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE clips SET status = ?1, error_message = ?2, updated_at = datetime('now') WHERE id = ?3",
        params![ArtifactStatus::Error, message, id],
    )?;
    tx.commit()?;
    Ok(())
}

/// Whether a non-failed clip of the video already uses `name` (and so its key).
pub fn clip_name_in_use(conn: &Connection, video_id: i64, name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM clips WHERE video_id = ?1 AND name = ?2 AND status != 'error'",
        params![video_id, name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Number of compiled videos that reference the clip.
pub fn count_clip_references(conn: &Connection, clip_id: i64) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT compiled_video_id) FROM compiled_video_clips WHERE clip_id = ?1",
        params![clip_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn delete_clip_row(conn: &Connection, id: i64) -> Result<bool> {
    let rows = conn.execute("DELETE FROM clips WHERE id = ?1", params![id])?;
    Ok(rows > 0)
}

// ----- Compiled Videos -----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledVideo {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: ArtifactStatus,
    pub storage_key: Option<String>,
    pub local_path: Option<String>,
    pub total_duration_seconds: f64,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub file_size_bytes: Option<i64>,
    pub normalized: bool,
    pub error_message: Option<String>,
    pub created_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewCompiledVideo<'a> {
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub total_duration_seconds: f64,
    pub normalized: bool,
    pub created_by: Option<&'a str>,
}

/// Transition applied before a clip in a compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    Cut,
    Fade,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Cut => "cut",
            Transition::Fade => "fade",
        }
    }
}

const COMPILED_COLUMNS: &str = "id, title, description, status, storage_key, local_path,
     total_duration_seconds, width, height, file_size_bytes, normalized, error_message,
     created_by, created_at, updated_at";

fn map_compiled(row: &Row<'_>) -> rusqlite::Result<CompiledVideo> {
    Ok(CompiledVideo {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        status: row.get(3)?,
        storage_key: row.get(4)?,
        local_path: row.get(5)?,
        total_duration_seconds: row.get(6)?,
        width: row.get(7)?,
        height: row.get(8)?,
        file_size_bytes: row.get(9)?,
        normalized: row.get::<_, i32>(10)? != 0,
        error_message: row.get(11)?,
        created_by: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

/// Insert a compiled video in `processing` state plus one junction row per
/// clip, all in one transaction. `sequence_order` is the index in `clip_ids`.
pub fn insert_processing_compiled_video(
    conn: &Connection,
    video: &NewCompiledVideo<'_>,
    clip_ids: &[i64],
    transition: Transition,
) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO compiled_videos (title, description, status, total_duration_seconds, normalized, created_by)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            video.title,
            video.description,
            ArtifactStatus::Processing,
            video.total_duration_seconds,
            video.normalized as i32,
            video.created_by,
        ],
    )?;
    let id = tx.last_insert_rowid();

    {
        let mut stmt = tx.prepare(
            "INSERT INTO compiled_video_clips (compiled_video_id, clip_id, sequence_order, transition_type)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (order, clip_id) in clip_ids.iter().enumerate() {
            stmt.execute(params![id, clip_id, order as i64, transition.as_str()])?;
        }
    }

    tx.commit()?;
    Ok(id)
}

/// Insert an already-finished compiled video whose artifact stays local.
pub fn insert_local_compiled_video(
    conn: &Connection,
    video: &NewCompiledVideo<'_>,
    local_path: &str,
    width: Option<i64>,
    height: Option<i64>,
    file_size: i64,
) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO compiled_videos
         (title, description, status, local_path, total_duration_seconds, width, height,
          file_size_bytes, normalized, created_by)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            video.title,
            video.description,
            ArtifactStatus::Completed,
            local_path,
            video.total_duration_seconds,
            width,
            height,
            file_size,
            video.normalized as i32,
            video.created_by,
        ],
    )?;
    let id = tx.last_insert_rowid();
    tx.commit()?;
    Ok(id)
}

pub fn mark_compiled_completed(
    conn: &Connection,
    id: i64,
    storage_key: &str,
    width: Option<i64>,
    height: Option<i64>,
    file_size: i64,
) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE compiled_videos
         SET status = ?1, storage_key = ?2, width = ?3, height = ?4, file_size_bytes = ?5,
             error_message = NULL, updated_at = datetime('now')
         WHERE id = ?6",
        params![ArtifactStatus::Completed, storage_key, width, height, file_size, id],
    )?;
    tx.commit()?;
    Ok(())
}

pub fn mark_compiled_error(conn: &Connection, id: i64, message: &str) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE compiled_videos SET status = ?1, error_message = ?2, updated_at = datetime('now')
         WHERE id = ?3",
        params![ArtifactStatus::Error, message, id],
    )?;
    tx.commit()?;
    Ok(())
}

pub fn get_compiled_video(conn: &Connection, id: i64) -> Result<Option<CompiledVideo>> {
    let result = conn
        .query_row(
            &format!("SELECT {} FROM compiled_videos WHERE id = ?1", COMPILED_COLUMNS),
            params![id],
            map_compiled,
        )
        .optional()?;
    Ok(result)
}

pub fn list_compiled_videos(conn: &Connection, limit: i64) -> Result<Vec<CompiledVideo>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM compiled_videos ORDER BY id DESC LIMIT ?1",
        COMPILED_COLUMNS
    ))?;
    let videos = stmt
        .query_map(params![limit], map_compiled)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(videos)
}

/// Clips of a compiled video ordered by `sequence_order`.
pub fn get_compiled_clips_in_order(conn: &Connection, compiled_video_id: i64) -> Result<Vec<Clip>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM compiled_video_clips cvc
         JOIN clips c ON c.id = cvc.clip_id
         WHERE cvc.compiled_video_id = ?1
         ORDER BY cvc.sequence_order ASC",
        CLIP_COLUMNS
    ))?;
    let clips = stmt
        .query_map(params![compiled_video_id], map_clip)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(clips)
}

pub fn count_compiled_clip_rows(conn: &Connection, compiled_video_id: i64) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM compiled_video_clips WHERE compiled_video_id = ?1",
        params![compiled_video_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Compiled videos other than `exclude_id` whose artifact lives at `storage_key`.
pub fn count_compiled_with_key(conn: &Connection, storage_key: &str, exclude_id: Option<i64>) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM compiled_videos WHERE storage_key = ?1 AND id IS NOT ?2",
        params![storage_key, exclude_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Compiled videos other than `exclude_id` whose artifact lives at `local_path`.
pub fn count_compiled_with_local_path(conn: &Connection, local_path: &str, exclude_id: Option<i64>) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM compiled_videos WHERE local_path = ?1 AND id IS NOT ?2",
        params![local_path, exclude_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Delete a compiled video and its junction rows in one transaction.
pub fn delete_compiled_video_row(conn: &Connection, id: i64) -> Result<bool> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM compiled_video_clips WHERE compiled_video_id = ?1",
        params![id],
    )?;
    let rows = tx.execute("DELETE FROM compiled_videos WHERE id = ?1", params![id])?;
    tx.commit()?;
    Ok(rows > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    fn seed_video(conn: &Connection) -> i64 {
        insert_video(
            conn,
            &NewVideo {
                title: "Interview".to_string(),
                filename: "interview.mp4".to_string(),
                storage_key: Some("videos/abc/interview.mp4".to_string()),
                duration_seconds: Some(120.0),
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn test_status_round_trip() {
        for s in [
            ArtifactStatus::Pending,
            ArtifactStatus::Processing,
            ArtifactStatus::Completed,
            ArtifactStatus::Error,
        ] {
            assert_eq!(s.as_str().parse::<ArtifactStatus>().unwrap(), s);
        }
        assert!("done".parse::<ArtifactStatus>().is_err());
    }

    #[test]
    fn test_transcript_derives_full_text() {
        let conn = open_in_memory().unwrap();
        let video_id = seed_video(&conn);
        let segments = vec![
            NewSegment { start_time: 0.0, end_time: 2.0, text: " Hello there ".into(), confidence: Some(0.9) },
            NewSegment { start_time: 2.0, end_time: 4.0, text: "general story".into(), confidence: None },
        ];
        insert_transcript(&conn, video_id, ArtifactStatus::Completed, Some("en"), &segments).unwrap();

        let transcripts = list_completed_transcripts(&conn).unwrap();
        assert_eq!(transcripts.len(), 1);
        assert_eq!(transcripts[0].full_text, "Hello there general story");
        assert_eq!(transcripts[0].word_count, 4);

        let segs = get_completed_segments_for_video(&conn, video_id).unwrap();
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].text, "Hello there");
    }

    #[test]
    fn test_clip_lifecycle_updates() {
        let conn = open_in_memory().unwrap();
        let video_id = seed_video(&conn);
        let id = insert_processing_clip(
            &conn,
            &NewClip { video_id, name: "intro", notes: None, start_time: 1.0, end_time: 5.0, created_by: None },
        )
        .unwrap();

        let clip = get_clip(&conn, id).unwrap().unwrap();
        assert_eq!(clip.status, ArtifactStatus::Processing);
        assert!(clip.storage_key.is_none());

        mark_clip_completed(&conn, id, "clips/1/intro.mp4", 42).unwrap();
        let clip = get_clip(&conn, id).unwrap().unwrap();
        assert_eq!(clip.status, ArtifactStatus::Completed);
        assert_eq!(clip.file_size_bytes, Some(42));

        let completed = list_clips(&conn, Some(video_id), Some(ArtifactStatus::Completed), 10).unwrap();
        assert_eq!(completed.len(), 1);
    }

    #[test]
    fn test_duplicate_sequence_order_rejected() {
        let conn = open_in_memory().unwrap();
        let video_id = seed_video(&conn);
        let clip = insert_processing_clip(
            &conn,
            &NewClip { video_id, name: "a", notes: None, start_time: 0.0, end_time: 1.0, created_by: None },
        )
        .unwrap();
        let id = insert_processing_compiled_video(
            &conn,
            &NewCompiledVideo { title: "t", description: None, total_duration_seconds: 1.0, normalized: true, created_by: None },
            &[clip],
            Transition::Cut,
        )
        .unwrap();

        let dup = conn.execute(
            "INSERT INTO compiled_video_clips (compiled_video_id, clip_id, sequence_order) VALUES (?1, ?2, 0)",
            params![id, clip],
        );
        assert!(dup.is_err());
    }

    #[test]
    fn test_count_compiled_with_key_excludes_self() {
        let conn = open_in_memory().unwrap();
        let new = NewCompiledVideo { title: "t", description: None, total_duration_seconds: 1.0, normalized: true, created_by: None };
        let first = insert_processing_compiled_video(&conn, &new, &[], Transition::Cut).unwrap();
        let second = insert_processing_compiled_video(&conn, &new, &[], Transition::Cut).unwrap();
        mark_compiled_completed(&conn, first, "compiled/t.mp4", None, None, 10).unwrap();
        assert_eq!(count_compiled_with_key(&conn, "compiled/t.mp4", None).unwrap(), 1);
        assert_eq!(count_compiled_with_key(&conn, "compiled/t.mp4", Some(first)).unwrap(), 0);

        mark_compiled_completed(&conn, second, "compiled/t.mp4", None, None, 10).unwrap();
        assert_eq!(count_compiled_with_key(&conn, "compiled/t.mp4", Some(first)).unwrap(), 1);

        let local = insert_local_compiled_video(&conn, &new, "/out/t.mp4", None, None, 10).unwrap();
        assert_eq!(count_compiled_with_local_path(&conn, "/out/t.mp4", None).unwrap(), 1);
        assert_eq!(count_compiled_with_local_path(&conn, "/out/t.mp4", Some(local)).unwrap(), 0);
    }
}
