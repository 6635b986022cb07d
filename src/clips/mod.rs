// Clip extraction
//
// A clip is a `[start, end)` range of a catalogued video, cut into its own
// artifact. The catalog row is written as `processing` before any external
// work and finalized only after the upload is confirmed.


use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::ARTIFACT_EXTENSION;
use crate::context::PipelineContext;
use crate::db::schema::{self, ArtifactStatus, Clip, NewClip, Video};
use crate::error::{PipelineError, Result};
use crate::naming::validate_clip_name;
use crate::storage::{delete_and_log, StorageError};

/// One entry of a batch request file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipRequest {
    pub start_time: f64,
    pub end_time: f64,
    pub clip_name: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Per-item result of a batch.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BatchItemOutcome {
    Created { index: usize, clip_id: i64 },
    /// Failed a precondition; no row was written.
    Rejected { index: usize, clip_name: String, error: String },
    /// Row written, pipeline failed; the row is in `error`.
    Failed { index: usize, clip_id: i64, error: String },
}

impl BatchItemOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, BatchItemOutcome::Created { .. })
    }
}

/// Read a batch file: a JSON array of [`ClipRequest`].
pub fn load_batch_file(path: &Path) -> Result<Vec<ClipRequest>> {
    let raw = std::fs::read_to_string(path)?;
    let requests: Vec<ClipRequest> = serde_json::from_str(&raw)?;
    Ok(requests)
}

/// Storage key of a clip artifact.
pub fn clip_key(clips_prefix: &str, video_id: i64, name: &str) -> String {
    format!("{}/{}/{}.{}", clips_prefix, video_id, name, ARTIFACT_EXTENSION)
}

pub struct ClipExtractionService<'a> {
    ctx: &'a PipelineContext,
}

impl<'a> ClipExtractionService<'a> {
    pub fn new(ctx: &'a PipelineContext) -> Self {
        Self { ctx }
    }

    pub fn create_clip(
        &self,
        video_id: i64,
        start: f64,
        end: f64,
        name: &str,
        notes: Option<&str>,
        created_by: Option<&str>,
    ) -> Result<i64> {
        let video = self.require_video(video_id)?;
        validate_request(&video, start, end, name)?;
        self.ensure_name_free(video_id, name)?;
        let source_key = source_key(&video)?;

        let clip_id = schema::insert_processing_clip(
            &self.ctx.conn,
            &NewClip { video_id, name, notes, start_time: start, end_time: end, created_by },
        )?;
        log::info!(
            "Clip {} created for video {} ({:.3}-{:.3}), processing",
            clip_id, video_id, start, end
        );

        let result = self.ctx.scratch_dir(&format!("clip-{}-", clip_id)).and_then(|scratch| {
            let source = self.download_source(source_key, &video, scratch.path())?;
            self.cut_and_upload(&source, scratch.path(), clip_id, video_id, start, end, name)
        });

        self.finalize(clip_id, result)
    }

    /// Cut many ranges from one video, downloading the source once.
    pub fn create_clips_batch(
        &self,
        video_id: i64,
        requests: &[ClipRequest],
        created_by: Option<&str>,
    ) -> Result<Vec<BatchItemOutcome>> {
        let video = self.require_video(video_id)?;
        let source_key = source_key(&video)?;

        let mut outcomes: Vec<Option<BatchItemOutcome>> = vec![None; requests.len()];
        let mut accepted: Vec<(usize, i64)> = Vec::new();
        let mut seen_names: HashSet<&str> = HashSet::new();

        for (index, req) in requests.iter().enumerate() {
            let checked = validate_request(&video, req.start_time, req.end_time, &req.clip_name)
                .and_then(|_| self.ensure_name_free(video_id, &req.clip_name))
                .and_then(|_| {
                    if seen_names.insert(req.clip_name.as_str()) {
                        Ok(())
                    } else {
                        Err(PipelineError::InvalidInput(format!(
                            "Duplicate clip name in batch: '{}'",
                            req.clip_name
                        )))
                    }
                });
            if let Err(e) = checked {
                log::warn!("Batch item {} rejected: {}", index, e);
                outcomes[index] = Some(BatchItemOutcome::Rejected {
                    index,
                    clip_name: req.clip_name.clone(),
                    error: e.to_string(),
                });
                continue;
            }

            let inserted = schema::insert_processing_clip(
                &self.ctx.conn,
                &NewClip {
                    video_id,
                    name: &req.clip_name,
                    notes: req.notes.as_deref(),
                    start_time: req.start_time,
                    end_time: req.end_time,
                    created_by,
                },
            );
            match inserted {
                Ok(clip_id) => accepted.push((index, clip_id)),
                Err(e) => {
                    self.abandon(&accepted, &e.to_string());
                    return Err(e);
                }
            }
        }

        if !accepted.is_empty() {
            log::info!("Batch for video {}: {} clips processing", video_id, accepted.len());
            self.run_batch(&video, source_key, requests, &accepted, &mut outcomes)?;
        }

        Ok(outcomes.into_iter().flatten().collect())
    }

    fn run_batch(
        &self,
        video: &Video,
        source_key: &str,
        requests: &[ClipRequest],
        accepted: &[(usize, i64)],
        outcomes: &mut [Option<BatchItemOutcome>],
    ) -> Result<()> {
        let first_id = accepted[0].1;
        let prepared = self
            .ctx
            .scratch_dir(&format!("clip-{}-", first_id))
            .and_then(|scratch| {
                let source = self.download_source(source_key, video, scratch.path())?;
                Ok((scratch, source))
            });

        let (scratch, source) = match prepared {
            Ok(p) => p,
            Err(e) => {
                let message = e.to_string();
                log::warn!("Batch source unavailable for video {}: {}", video.id, message);
                for &(index, clip_id) in accepted {
                    schema::mark_clip_error(&self.ctx.conn, clip_id, &message)?;
                    outcomes[index] = Some(BatchItemOutcome::Failed { index, clip_id, error: message.clone() });
                }
                return Ok(());
            }
        };

        for (pos, &(index, clip_id)) in accepted.iter().enumerate() {
            let req = &requests[index];
            let result = self.cut_and_upload(
                &source,
                scratch.path(),
                clip_id,
                video.id,
                req.start_time,
                req.end_time,
                &req.clip_name,
            );
            outcomes[index] = Some(match self.finalize(clip_id, result) {
                Ok(_) => BatchItemOutcome::Created { index, clip_id },
                Err(PipelineError::Database(e)) => {
                    self.abandon(&accepted[pos..], &e.to_string());
                    return Err(PipelineError::Database(e));
                }
                Err(e) => BatchItemOutcome::Failed { index, clip_id, error: e.to_string() },
            });
        }

        Ok(())
    }

    /// Best-effort error marking for batch rows that will not be finalized.
    fn abandon(&self, pending: &[(usize, i64)], message: &str) {
        for &(_, clip_id) in pending {
            if let Err(e) = schema::mark_clip_error(&self.ctx.conn, clip_id, message) {
                log::warn!("Clip {} left in processing: {}", clip_id, e);
            }
        }
    }

    /// Delete a clip. Clips used by a compiled video are kept.
    pub fn delete_clip(&self, clip_id: i64, delete_from_storage: bool) -> Result<()> {
        let clip = self.get_clip(clip_id)?;

        let references = schema::count_clip_references(&self.ctx.conn, clip_id)?;
        if references > 0 {
            return Err(PipelineError::InvalidInput(format!(
                "Clip {} is used by {} compiled video(s)",
                clip_id, references
            )));
        }

        if delete_from_storage {
            if let Some(key) = clip.storage_key.as_deref() {
                delete_and_log(self.ctx.store.as_ref(), key);
            }
        }

        schema::delete_clip_row(&self.ctx.conn, clip_id)?;
        log::info!("Deleted clip {}", clip_id);
        Ok(())
    }

    pub fn get_clip(&self, clip_id: i64) -> Result<Clip> {
        schema::get_clip(&self.ctx.conn, clip_id)?.ok_or(PipelineError::ClipNotFound(clip_id))
    }

    pub fn list_clips(
        &self,
        video_id: Option<i64>,
        status: Option<ArtifactStatus>,
        limit: i64,
    ) -> Result<Vec<Clip>> {
        schema::list_clips(&self.ctx.conn, video_id, status, limit)
    }

    /// Time-limited download URL for a completed clip.
    pub fn presign_clip(&self, clip_id: i64, expires_in: Option<Duration>) -> Result<String> {
        let clip = self.get_clip(clip_id)?;
        let key = match (clip.status, clip.storage_key.as_deref()) {
            (ArtifactStatus::Completed, Some(key)) => key,
            _ => {
                return Err(PipelineError::ClipNotReady {
                    clip_id,
                    status: clip.status.to_string(),
                })
            }
        };
        let expires = expires_in
            .unwrap_or_else(|| Duration::from_secs(self.ctx.config.storage.presign_expiry_secs));
        Ok(self.ctx.store.presign(key, expires)?)
    }

    // ----- Pipeline steps -----

    fn require_video(&self, video_id: i64) -> Result<Video> {
        schema::get_video(&self.ctx.conn, video_id)?.ok_or(PipelineError::VideoNotFound(video_id))
    }

    fn ensure_name_free(&self, video_id: i64, name: &str) -> Result<()> {
        if schema::clip_name_in_use(&self.ctx.conn, video_id, name)? {
            return Err(PipelineError::InvalidInput(format!(
                "Video {} already has a clip named '{}'",
                video_id, name
            )));
        }
        Ok(())
    }

    fn download_source(&self, key: &str, video: &Video, dir: &Path) -> Result<PathBuf> {
        let ext = Path::new(&video.filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or(ARTIFACT_EXTENSION);
        let local = dir.join(format!("source.{}", ext));
        self.ctx.store.download(key, &local)?;
        log::info!("Downloaded source of video {} ({})", video.id, key);
        Ok(local)
    }

    #[allow(clippy::too_many_arguments)]
    fn cut_and_upload(
        &self,
        source: &Path,
        dir: &Path,
        clip_id: i64,
        video_id: i64,
        start: f64,
        end: f64,
        name: &str,
    ) -> Result<(String, i64)> {
        let output = dir.join(format!("clip-{}.{}", clip_id, ARTIFACT_EXTENSION));
        let mode = self.ctx.transcoder.cut_with_fallback(source, &output, start, end)?;
        log::info!("Clip {} cut ({})", clip_id, mode.as_str());

        let key = clip_key(&self.ctx.config.storage.clips_prefix, video_id, name);
        self.ctx.store.upload(&output, &key)?;
        let size = verified_size(self.ctx.store.as_ref(), &key)?;

        // The local cut is not needed past this point
        let _ = std::fs::remove_file(&output);
        Ok((key, size))
    }

    /// Write the outcome of a clip run to its row.
    fn finalize(&self, clip_id: i64, result: Result<(String, i64)>) -> Result<i64> {
        match result {
            Ok((key, size)) => {
                schema::mark_clip_completed(&self.ctx.conn, clip_id, &key, size)?;
                log::info!("Clip {} completed: {} ({} bytes)", clip_id, key, size);
                Ok(clip_id)
            }
            Err(e) => {
                log::warn!("Clip {} failed: {}", clip_id, e);
                schema::mark_clip_error(&self.ctx.conn, clip_id, &e.to_string())?;
                Err(e)
            }
        }
    }
}

/// Size of a stored object, failing unless it exists and is non-empty.
pub(crate) fn verified_size(store: &dyn crate::storage::MediaStore, key: &str) -> Result<i64> {
    match store.object_size(key)? {
        Some(size) if size > 0 => Ok(size as i64),
        Some(_) => Err(StorageError::upload_failed(format!("{} is empty after upload", key)).into()),
        None => Err(StorageError::upload_failed(format!("{} missing after upload", key)).into()),
    }
}

fn source_key(video: &Video) -> Result<&str> {
    video
        .storage_key
        .as_deref()
        .ok_or_else(|| PipelineError::SourceNotFound(format!("video {} has no stored source", video.id)))
}

/// Preconditions shared by single and batch creation.
fn validate_request(video: &Video, start: f64, end: f64, name: &str) -> Result<()> {
    validate_clip_name(name)?;
    if !start.is_finite() || !end.is_finite() || start < 0.0 || start >= end {
        return Err(PipelineError::InvalidRange { start, end });
    }
    if let Some(duration) = video.duration_seconds {
        if end > duration {
            return Err(PipelineError::DurationExceeded { end, duration });
        }
    }
    Ok(())
}
