// Database migrations
// Migrations are forward-only. Never edit or delete a migration after it ships.

use rusqlite::Connection;

use crate::error::{PipelineError, Result};

/// All migrations in order. Each migration is a SQL string.
const MIGRATIONS: &[&str] = &[
    // Migration 1: Catalog
    r#"
    -- Source videos
    CREATE TABLE videos (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        filename TEXT NOT NULL,
        storage_key TEXT,
        duration_seconds REAL,
        width INTEGER,
        height INTEGER,
        event_year INTEGER,
        status TEXT NOT NULL DEFAULT 'ready' CHECK (status IN ('pending', 'ready', 'error')),
        metadata TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    -- Transcripts (written by the transcription collaborator)
    CREATE TABLE transcripts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        video_id INTEGER NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
        status TEXT NOT NULL DEFAULT 'pending'
            CHECK (status IN ('pending', 'processing', 'completed', 'error')),
        language TEXT,
        full_text TEXT NOT NULL DEFAULT '',
        word_count INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE transcript_segments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        transcript_id INTEGER NOT NULL REFERENCES transcripts(id) ON DELETE CASCADE,
        segment_index INTEGER NOT NULL,
        start_time REAL NOT NULL,
        end_time REAL NOT NULL,
        text TEXT NOT NULL,
        confidence REAL,
        UNIQUE(transcript_id, segment_index)
    );

    -- Clips cut from a source video
    CREATE TABLE clips (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        video_id INTEGER NOT NULL REFERENCES videos(id),
        name TEXT NOT NULL,
        notes TEXT,
        start_time REAL NOT NULL,
        end_time REAL NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending'
            CHECK (status IN ('pending', 'processing', 'completed', 'error')),
        storage_key TEXT,
        file_size_bytes INTEGER,
        error_message TEXT,
        created_by TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now')),
        CHECK (start_time < end_time)
    );

    -- Compiled videos assembled from ordered clips
    CREATE TABLE compiled_videos (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        description TEXT,
        status TEXT NOT NULL DEFAULT 'pending'
            CHECK (status IN ('pending', 'processing', 'completed', 'error')),
        storage_key TEXT,
        local_path TEXT,
        total_duration_seconds REAL NOT NULL DEFAULT 0,
        width INTEGER,
        height INTEGER,
        file_size_bytes INTEGER,
        normalized INTEGER NOT NULL DEFAULT 1,
        error_message TEXT,
        created_by TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE compiled_video_clips (
        compiled_video_id INTEGER NOT NULL REFERENCES compiled_videos(id) ON DELETE CASCADE,
        clip_id INTEGER NOT NULL REFERENCES clips(id),
        sequence_order INTEGER NOT NULL CHECK (sequence_order >= 0),
        transition_type TEXT NOT NULL DEFAULT 'cut' CHECK (transition_type IN ('cut', 'fade')),
        PRIMARY KEY (compiled_video_id, sequence_order)
    );

    CREATE INDEX idx_transcripts_video ON transcripts(video_id);
    CREATE INDEX idx_transcripts_status ON transcripts(status);
    CREATE INDEX idx_segments_transcript ON transcript_segments(transcript_id, start_time);
    CREATE INDEX idx_clips_video ON clips(video_id);
    CREATE INDEX idx_clips_status ON clips(status);
    CREATE INDEX idx_compiled_clips_clip ON compiled_video_clips(clip_id);
    "#,
    // Migration 2: Processing jobs
    r#"
    CREATE TABLE processing_jobs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        job_type TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending'
            CHECK (status IN ('pending', 'running', 'completed', 'failed')),
        progress INTEGER NOT NULL DEFAULT 0,
        message TEXT,
        target_id TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE INDEX idx_processing_jobs_status ON processing_jobs(status);
    "#,
];

/// Get current schema version from database
fn get_schema_version(conn: &Connection) -> Result<u32> {
    let version: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version)
}

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    let target_version = MIGRATIONS.len() as u32;

    if current_version > target_version {
        return Err(PipelineError::Config(format!(
            "Database schema version {} is newer than this build supports (max {})",
            current_version, target_version
        )));
    }

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let migration_version = (i + 1) as u32;
        if migration_version <= current_version {
            continue;
        }

        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration)?;
        tx.execute_batch(&format!("PRAGMA user_version = {}", migration_version))?;
        tx.commit()?;

        log::info!("Applied migration {}", migration_version);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_refuses_newer_schema() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA user_version = 99").unwrap();
        assert!(run_migrations(&conn).is_err());
    }

    #[test]
    fn test_clip_range_check_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn.execute("INSERT INTO videos (title, filename) VALUES ('v', 'v.mp4')", [])
            .unwrap();
        let result = conn.execute(
            "INSERT INTO clips (video_id, name, start_time, end_time) VALUES (1, 'bad', 30.0, 20.0)",
            [],
        );
        assert!(result.is_err());
    }
}
