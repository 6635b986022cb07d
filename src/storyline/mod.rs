// Storyline assembly
//
// generate: corpus -> prompt -> generator -> parse -> reconcile -> cache.
// create_video: reconcile again -> locate local sources -> extract each clip
// with loudness normalization -> concatenate -> catalog row (local only).

pub mod ai;
pub mod cache;
pub mod parse;
pub mod prompt;
pub mod reconcile;
pub mod types;

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::constants::{ARTIFACT_EXTENSION, VIDEO_EXTENSIONS};
use crate::context::PipelineContext;
use crate::db::schema::{self, NewCompiledVideo};
use crate::error::{PipelineError, Result};
use crate::jobs::{self, JOB_STORYLINE_GENERATE, JOB_STORYLINE_RENDER};
use crate::media::file_size;
use crate::naming::sanitize_title;

pub use ai::{GeminiGenerator, StorylineGenerator};
pub use cache::StorylineCache;
pub use reconcile::{GroundTruth, ReconcileMode};
pub use types::{ClipSpec, Storyline, StorylineBatch};

pub const STORYLINE_CREATED_BY: &str = "storyline";

pub struct StorylineAssembler<'a> {
    ctx: &'a PipelineContext,
    generator: Option<&'a dyn StorylineGenerator>,
    cache: StorylineCache,
}

impl<'a> StorylineAssembler<'a> {
    /// Without a generator only cached batches can be read and rendered.
    pub fn new(ctx: &'a PipelineContext) -> Self {
        let cache = StorylineCache::new(ctx.config.storylines_dir());
        Self { ctx, generator: None, cache }
    }

    pub fn with_generator(mut self, generator: &'a dyn StorylineGenerator) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Return the cached batch for the current corpus, or ask the generator
    /// for a new one when there is none or `force_refresh` is set.
    pub fn generate(&self, force_refresh: bool) -> Result<StorylineBatch> {
        let generator = self
            .generator
            .ok_or_else(|| PipelineError::Config("No storyline generator configured".to_string()))?;
        let corpus = prompt::load_corpus(&self.ctx.conn)?;
        if corpus.is_empty() {
            return Err(PipelineError::InvalidInput(
                "No completed transcripts to build storylines from".to_string(),
            ));
        }
        let key = cache::cache_key(&corpus, generator.model_name())?;

        if !force_refresh {
            if let Some(batch) = self.cache.load(&key)? {
                log::info!("Using cached storylines {}", key);
                return Ok(batch);
            }
        }

        let job_id = jobs::start_job(&self.ctx.conn, JOB_STORYLINE_GENERATE, Some(key.as_str()))?;
        let result = self.run_generate(generator, &corpus, key);
        jobs::finish_job(&self.ctx.conn, job_id, result)
    }

    fn run_generate(
        &self,
        generator: &dyn StorylineGenerator,
        corpus: &[prompt::CorpusEntry],
        key: String,
    ) -> Result<StorylineBatch> {
        let text = generator.complete(&prompt::build_prompt(corpus))?;
        let proposed = parse::parse_response(&text)?;
        let proposed_count = proposed.len();

        let storylines = GroundTruth::new(corpus).reconcile_all(proposed);
        log::info!("Kept {} of {} proposed storylines", storylines.len(), proposed_count);

        let batch = StorylineBatch {
            storylines,
            cache_key: key,
            model: generator.model_name().to_string(),
            generated_at: chrono::Utc::now().to_rfc3339(),
        };
        self.cache.store(&batch)?;
        Ok(batch)
    }

    pub fn latest(&self) -> Result<Option<StorylineBatch>> {
        self.cache.latest()
    }

    /// Storylines of the most recent batch.
    pub fn list(&self) -> Result<Vec<Storyline>> {
        Ok(self.latest()?.map(|b| b.storylines).unwrap_or_default())
    }

    pub fn preview(&self, storyline_id: &str) -> Result<Storyline> {
        self.latest()?
            .and_then(|b| b.find(storyline_id).cloned())
            .ok_or_else(|| PipelineError::StorylineNotFound(storyline_id.to_string()))
    }

    /// Render a storyline of the latest batch to `{output_dir}/{name}.mp4`.
    pub fn create_video(&self, storyline_id: &str, output_name: Option<&str>) -> Result<PathBuf> {
        let storyline = self.preview(storyline_id)?;
        let job_id = jobs::start_job(&self.ctx.conn, JOB_STORYLINE_RENDER, Some(storyline_id))?;
        let result = self.render(job_id, &storyline, output_name);
        jobs::finish_job(&self.ctx.conn, job_id, result)
    }

    fn render(&self, job_id: i64, storyline: &Storyline, output_name: Option<&str>) -> Result<PathBuf> {
        let corpus = prompt::load_corpus(&self.ctx.conn)?;
        let reconciled = GroundTruth::new(&corpus)
            .reconcile(storyline, ReconcileMode::Strict)?
            .ok_or_else(|| PipelineError::Reconciliation(format!("storyline '{}' is empty", storyline.id)))?;

        // Every source must be found before anything is extracted
        let mut sources = Vec::with_capacity(reconciled.clips.len());
        for clip in &reconciled.clips {
            let video = schema::get_video(&self.ctx.conn, clip.video_id)?
                .ok_or(PipelineError::VideoNotFound(clip.video_id))?;
            let path = self.locate_source(video.id, &video.filename).ok_or_else(|| {
                PipelineError::SourceNotFound(format!("video {} ({})", video.id, video.filename))
            })?;
            sources.push(path);
        }

        let scratch = self
            .ctx
            .scratch_dir(&format!("storyline-{}-", uuid::Uuid::new_v4()))?;
        let mut parts = Vec::with_capacity(sources.len());
        for (i, (clip, source)) in reconciled.clips.iter().zip(&sources).enumerate() {
            let part = scratch.path().join(format!("{:03}.{}", i, ARTIFACT_EXTENSION));
            log::debug!(
                "Extracting {}/{} from video {} ({:.2}-{:.2})",
                i + 1,
                sources.len(),
                clip.video_id,
                clip.start_time,
                clip.end_time
            );
            self.ctx
                .transcoder
                .extract_normalized_audio(source, &part, clip.start_time, clip.end_time)?;
            parts.push(part);
            jobs::update_progress(
                &self.ctx.conn,
                job_id,
                ((i + 1) * 90 / sources.len()) as i64,
                &format!("extracted {}/{}", i + 1, sources.len()),
            )?;
        }

        let name = sanitize_title(output_name.unwrap_or(&storyline.title));
        std::fs::create_dir_all(&self.ctx.config.output_dir)?;
        let output = self
            .ctx
            .config
            .output_dir
            .join(format!("{}.{}", name, ARTIFACT_EXTENSION));
        self.ctx.transcoder.concatenate(&parts, &output, true)?;

        let compiled_id = match self.catalog_render(&reconciled, &output) {
            Ok(id) => id,
            Err(e) => {
                if let Err(rm) = std::fs::remove_file(&output) {
                    log::warn!("Failed to remove {} (ignored): {}", output.display(), rm);
                }
                return Err(e);
            }
        };

        log::info!(
            "Storyline '{}' rendered to {} (compiled video {})",
            storyline.id,
            output.display(),
            compiled_id
        );
        Ok(output)
    }

    /// Verify a freshly concatenated file and record it as a local compiled video.
    fn catalog_render(&self, reconciled: &Storyline, output: &Path) -> Result<i64> {
        let size = file_size(output);
        if size == 0 {
            return Err(PipelineError::Transcode(format!("{} is empty", output.display())));
        }
        let info = self.ctx.transcoder.probe(output)?;

        let description = format!("{}\n\n{}", reconciled.hook, reconciled.why_compelling);
        let local_path = output.to_string_lossy().to_string();
        schema::insert_local_compiled_video(
            &self.ctx.conn,
            &NewCompiledVideo {
                title: &reconciled.title,
                description: Some(&description),
                total_duration_seconds: reconciled.total_duration(),
                normalized: true,
                created_by: Some(STORYLINE_CREATED_BY),
            },
            &local_path,
            info.width.map(i64::from),
            info.height.map(i64::from),
            size as i64,
        )
    }

    /// Cached sources first, then the configured source directories.
    fn locate_source(&self, video_id: i64, filename: &str) -> Option<PathBuf> {
        let mut roots = vec![self.ctx.config.cached_sources_dir()];
        roots.extend(self.ctx.config.source_dirs.iter().cloned());
        roots
            .iter()
            .filter(|r| r.is_dir())
            .find_map(|root| find_source_in(root, video_id, filename))
    }
}

fn find_source_in(root: &Path, video_id: i64, filename: &str) -> Option<PathBuf> {
    let id = video_id.to_string();
    WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .find(|path| {
            let is_video = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| VIDEO_EXTENSIONS.contains(&e.to_lowercase().as_str()))
                .unwrap_or(false);
            if !is_video {
                return false;
            }
            let stem_matches = path.file_stem().and_then(|s| s.to_str()) == Some(id.as_str());
            let name_matches = path.file_name().and_then(|n| n.to_str()) == Some(filename);
            stem_matches || name_matches
        })
}
