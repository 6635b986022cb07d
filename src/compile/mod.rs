// Video compilation
//
// Joins completed clips, in caller order, into one artifact.


use std::collections::HashSet;
use std::path::PathBuf;

use crate::clips::verified_size;
use crate::constants::ARTIFACT_EXTENSION;
use crate::context::PipelineContext;
use crate::db::schema::{self, ArtifactStatus, Clip, CompiledVideo, NewCompiledVideo, Transition};
use crate::error::{PipelineError, Result};
use crate::naming::sanitize_title;
use crate::storage::delete_and_log;

/// Storage key of a compiled artifact.
pub fn compiled_key(compiled_prefix: &str, title: &str) -> String {
    format!("{}/{}.{}", compiled_prefix, sanitize_title(title), ARTIFACT_EXTENSION)
}

/// Resolution and size of a finished compilation.
struct Rendered {
    key: String,
    width: Option<i64>,
    height: Option<i64>,
    size: i64,
}

pub struct CompilationService<'a> {
    ctx: &'a PipelineContext,
}

impl<'a> CompilationService<'a> {
    pub fn new(ctx: &'a PipelineContext) -> Self {
        Self { ctx }
    }

    pub fn compile(
        &self,
        title: &str,
        clip_ids: &[i64],
        description: Option<&str>,
        created_by: Option<&str>,
        normalize: bool,
    ) -> Result<i64> {
        let clips = self.check_clips(title, clip_ids)?;
        let total_duration: f64 = clips.iter().map(Clip::duration).sum();

        let compiled_id = schema::insert_processing_compiled_video(
            &self.ctx.conn,
            &NewCompiledVideo {
                title,
                description,
                total_duration_seconds: total_duration,
                normalized: normalize,
                created_by,
            },
            clip_ids,
            Transition::Cut,
        )?;
        log::info!(
            "Compiled video {} created from {} clips ({:.1}s), processing",
            compiled_id,
            clips.len(),
            total_duration
        );

        match self.render(compiled_id, title, &clips, normalize) {
            Ok(out) => {
                schema::mark_compiled_completed(
                    &self.ctx.conn,
                    compiled_id,
                    &out.key,
                    out.width,
                    out.height,
                    out.size,
                )?;
                log::info!("Compiled video {} completed: {} ({} bytes)", compiled_id, out.key, out.size);
                Ok(compiled_id)
            }
            Err(e) => {
                log::warn!("Compiled video {} failed: {}", compiled_id, e);
                schema::mark_compiled_error(&self.ctx.conn, compiled_id, &e.to_string())?;
                Err(e)
            }
        }
    }

    /// Preconditions, checked once before anything is written.
    fn check_clips(&self, title: &str, clip_ids: &[i64]) -> Result<Vec<Clip>> {
        if title.trim().is_empty() {
            return Err(PipelineError::InvalidInput("Title must not be empty".to_string()));
        }
        if clip_ids.is_empty() {
            return Err(PipelineError::InvalidInput("At least one clip is required".to_string()));
        }

        let mut seen = HashSet::new();
        if let Some(dup) = clip_ids.iter().find(|id| !seen.insert(**id)) {
            return Err(PipelineError::InvalidInput(format!("Clip {} listed more than once", dup)));
        }

        let mut clips = Vec::with_capacity(clip_ids.len());
        for &clip_id in clip_ids {
            match schema::get_clip(&self.ctx.conn, clip_id)? {
                Some(clip) if clip.status == ArtifactStatus::Completed && clip.storage_key.is_some() => {
                    clips.push(clip)
                }
                Some(clip) => {
                    return Err(PipelineError::ClipNotReady { clip_id, status: clip.status.to_string() })
                }
                None => {
                    return Err(PipelineError::ClipNotReady { clip_id, status: "missing".to_string() })
                }
            }
        }

        let key = compiled_key(&self.ctx.config.storage.compiled_prefix, title);
        if schema::count_compiled_with_key(&self.ctx.conn, &key, None)? > 0 {
            return Err(PipelineError::InvalidInput(format!(
                "Title '{}' maps to {}, which another compiled video already uses",
                title, key
            )));
        }
        Ok(clips)
    }

    fn render(&self, compiled_id: i64, title: &str, clips: &[Clip], normalize: bool) -> Result<Rendered> {
        let scratch = self.ctx.scratch_dir(&format!("compile-{}-", compiled_id))?;

        let mut inputs: Vec<PathBuf> = Vec::with_capacity(clips.len());
        for (i, clip) in clips.iter().enumerate() {
            let key = clip
                .storage_key
                .as_deref()
                .ok_or_else(|| PipelineError::SourceNotFound(format!("clip {} has no storage key", clip.id)))?;
            let local = scratch.path().join(format!("{:03}.{}", i, ARTIFACT_EXTENSION));
            self.ctx.store.download(key, &local)?;
            inputs.push(local);
        }
        log::info!("Compiled video {}: downloaded {} clips", compiled_id, inputs.len());

        let output = scratch.path().join(format!("compiled-{}.{}", compiled_id, ARTIFACT_EXTENSION));
        self.ctx.transcoder.concatenate(&inputs, &output, normalize)?;
        let info = self.ctx.transcoder.probe(&output)?;

        let key = compiled_key(&self.ctx.config.storage.compiled_prefix, title);
        self.ctx.store.upload(&output, &key)?;
        let size = verified_size(self.ctx.store.as_ref(), &key)?;

        Ok(Rendered {
            key,
            width: info.width.map(i64::from),
            height: info.height.map(i64::from),
            size,
        })
    }

    /// Clips of a compilation in playback order.
    pub fn get_clips_in_order(&self, compiled_id: i64) -> Result<Vec<Clip>> {
        self.get_compiled_video(compiled_id)?;
        schema::get_compiled_clips_in_order(&self.ctx.conn, compiled_id)
    }

    pub fn get_compiled_video(&self, compiled_id: i64) -> Result<CompiledVideo> {
        schema::get_compiled_video(&self.ctx.conn, compiled_id)?
            .ok_or(PipelineError::CompiledVideoNotFound(compiled_id))
    }

    pub fn list_compiled_videos(&self, limit: i64) -> Result<Vec<CompiledVideo>> {
        schema::list_compiled_videos(&self.ctx.conn, limit)
    }

    pub fn delete_compiled_video(&self, compiled_id: i64, delete_from_storage: bool) -> Result<()> {
        let video = self.get_compiled_video(compiled_id)?;

        if delete_from_storage {
            if let Some(key) = video.storage_key.as_deref() {
                if schema::count_compiled_with_key(&self.ctx.conn, key, Some(compiled_id))? > 0 {
                    log::info!("Keeping {}: still referenced by another compiled video", key);
                } else {
                    delete_and_log(self.ctx.store.as_ref(), key);
                }
            }
            if let Some(path) = video.local_path.as_deref() {
                if schema::count_compiled_with_local_path(&self.ctx.conn, path, Some(compiled_id))? > 0 {
                    log::info!("Keeping {}: still referenced by another compiled video", path);
                } else if let Err(e) = std::fs::remove_file(path) {
                    log::warn!("Failed to delete {} (ignored): {}", path, e);
                }
            }
        }

        schema::delete_compiled_video_row(&self.ctx.conn, compiled_id)?;
        log::info!("Deleted compiled video {}", compiled_id);
        Ok(())
    }
}
