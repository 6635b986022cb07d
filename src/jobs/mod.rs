// Processing job tracker
//
// A job row records one long-running pipeline run (storyline generation,
// storyline rendering). Runs are synchronous, so a job moves
// pending -> running -> completed | failed within a single call.

use std::fmt;

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

pub const JOB_STORYLINE_GENERATE: &str = "storyline_generate";
pub const JOB_STORYLINE_RENDER: &str = "storyline_render";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingJob {
    pub id: i64,
    pub job_type: String,
    pub status: JobStatus,
    pub progress: i64,
    pub message: Option<String>,
    pub target_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

fn map_job(row: &Row<'_>) -> rusqlite::Result<ProcessingJob> {
    let status: String = row.get(2)?;
    Ok(ProcessingJob {
        id: row.get(0)?,
        job_type: row.get(1)?,
        status: JobStatus::parse(&status).unwrap_or(JobStatus::Failed),
        progress: row.get(3)?,
        message: row.get(4)?,
        target_id: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

const JOB_COLUMNS: &str = "id, job_type, status, progress, message, target_id, created_at, updated_at";

/// Insert a job already in `running` state.
pub fn start_job(conn: &Connection, job_type: &str, target_id: Option<&str>) -> Result<i64> {
    conn.execute(
        "INSERT INTO processing_jobs (job_type, status, target_id) VALUES (?1, ?2, ?3)",
        params![job_type, JobStatus::Running.as_str(), target_id],
    )?;
    let id = conn.last_insert_rowid();
    log::info!("Started {} job {}", job_type, id);
    Ok(id)
}

/// Update progress (clamped to 0..=100) and the status message.
pub fn update_progress(conn: &Connection, job_id: i64, progress: i64, message: &str) -> Result<()> {
    conn.execute(
        "UPDATE processing_jobs SET progress = ?1, message = ?2, updated_at = datetime('now') WHERE id = ?3",
        params![progress.clamp(0, 100), message, job_id],
    )?;
    Ok(())
}

pub fn complete_job(conn: &Connection, job_id: i64, message: Option<&str>) -> Result<()> {
    conn.execute(
        "UPDATE processing_jobs
         SET status = ?1, progress = 100, message = COALESCE(?2, message), updated_at = datetime('now')
         WHERE id = ?3",
        params![JobStatus::Completed.as_str(), message, job_id],
    )?;
    Ok(())
}

pub fn fail_job(conn: &Connection, job_id: i64, error: &str) -> Result<()> {
    conn.execute(
        "UPDATE processing_jobs SET status = ?1, message = ?2, updated_at = datetime('now') WHERE id = ?3",
        params![JobStatus::Failed.as_str(), error, job_id],
    )?;
    log::warn!("Job {} failed: {}", job_id, error);
    Ok(())
}

/// Record the outcome of `result` on the job, passing the result through.
/// A failure to write the job row is logged, not returned, so it can never
/// mask the pipeline's own error.
pub fn finish_job<T>(conn: &Connection, job_id: i64, result: Result<T>) -> Result<T> {
    let write = match &result {
        Ok(_) => complete_job(conn, job_id, None),
        Err(e) => fail_job(conn, job_id, &e.to_string()),
    };
    if let Err(e) = write {
        log::warn!("Failed to record outcome of job {}: {}", job_id, e);
    }
    result
}

pub fn get_job(conn: &Connection, job_id: i64) -> Result<Option<ProcessingJob>> {
    let job = conn
        .query_row(
            &format!("SELECT {} FROM processing_jobs WHERE id = ?1", JOB_COLUMNS),
            params![job_id],
            map_job,
        )
        .optional()?;
    Ok(job)
}

/// Newest first.
pub fn list_jobs(conn: &Connection, status: Option<JobStatus>, limit: i64) -> Result<Vec<ProcessingJob>> {
    if limit <= 0 {
        return Err(PipelineError::InvalidInput("limit must be positive".to_string()));
    }
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM processing_jobs
         WHERE (?1 IS NULL OR status = ?1)
         ORDER BY id DESC LIMIT ?2",
        JOB_COLUMNS
    ))?;
    let jobs = stmt
        .query_map(params![status.map(|s| s.as_str()), limit], map_job)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    #[test]
    fn test_job_lifecycle() {
        let conn = open_in_memory().unwrap();
        let id = start_job(&conn, JOB_STORYLINE_RENDER, Some("s1")).unwrap();
        update_progress(&conn, id, 150, "extracting").unwrap();

        let job = get_job(&conn, id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.progress, 100);
        assert_eq!(job.message.as_deref(), Some("extracting"));

        complete_job(&conn, id, Some("done")).unwrap();
        let job = get_job(&conn, id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.target_id.as_deref(), Some("s1"));
    }

    #[test]
    fn test_finish_job_records_failure() {
        let conn = open_in_memory().unwrap();
        let id = start_job(&conn, JOB_STORYLINE_GENERATE, None).unwrap();
        let result: Result<()> = finish_job(&conn, id, Err(PipelineError::Generation("timeout".into())));
        assert!(result.is_err());

        let failed = list_jobs(&conn, Some(JobStatus::Failed), 10).unwrap();
        assert_eq!(failed.len(), 1);
        assert!(failed[0].message.as_deref().unwrap().contains("timeout"));
        assert!(list_jobs(&conn, Some(JobStatus::Running), 10).unwrap().is_empty());
    }
}
