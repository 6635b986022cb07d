// Clipsmith Error Types

use thiserror::Error;

use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid range: start {start:.3}s must be before end {end:.3}s")]
    InvalidRange { start: f64, end: f64 },

    #[error("Clip end {end:.3}s exceeds video duration {duration:.3}s")]
    DurationExceeded { end: f64, duration: f64 },

    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("Clip {clip_id} is not ready (status: {status})")]
    ClipNotReady { clip_id: i64, status: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("FFprobe error: {0}")]
    Probe(String),

    #[error("FFmpeg error: {0}")]
    Transcode(String),

    #[error("Could not parse storyline response: {0}")]
    GenerationParse(String),

    #[error("Storyline generation failed: {0}")]
    Generation(String),

    #[error("Reconciliation failed: {0}")]
    Reconciliation(String),

    #[error("Video not found: {0}")]
    VideoNotFound(i64),

    #[error("Clip not found: {0}")]
    ClipNotFound(i64),

    #[error("Compiled video not found: {0}")]
    CompiledVideoNotFound(i64),

    #[error("Storyline not found: {0}")]
    StorylineNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
