// Pipeline context
//
// Every service borrows one of these. Nothing in the library reaches for
// global state: the catalog, the store, the transcoder and the
// configuration all travel together here.

use std::path::Path;

use rusqlite::Connection;
use tempfile::TempDir;

use crate::config::PipelineConfig;
use crate::db;
use crate::error::Result;
use crate::media::{FfmpegTranscoder, Transcoder};
use crate::storage::{self, MediaStore};

pub struct PipelineContext {
    pub conn: Connection,
    pub store: Box<dyn MediaStore>,
    pub transcoder: Box<dyn Transcoder>,
    pub config: PipelineConfig,
}

impl PipelineContext {
    pub fn new(
        conn: Connection,
        store: Box<dyn MediaStore>,
        transcoder: Box<dyn Transcoder>,
        config: PipelineConfig,
    ) -> Self {
        Self { conn, store, transcoder, config }
    }

    /// Open the configured catalog, store and ffmpeg transcoder.
    pub fn open(config: PipelineConfig) -> Result<Self> {
        let db_path = config.db_path();
        Self::open_with_db(config, &db_path)
    }

    pub fn open_with_db(config: PipelineConfig, db_path: &Path) -> Result<Self> {
        config.ensure_dirs()?;
        let conn = db::open_db(db_path)?;
        let store = storage::connect(&config.storage)?;
        let transcoder = Box::new(FfmpegTranscoder::new(config.encoding.clone()));
        log::debug!("Opened catalog {} (bucket {})", db_path.display(), store.bucket());
        Ok(Self::new(conn, store, transcoder, config))
    }

    /// Private scratch directory under the work dir. Removed when dropped.
    pub fn scratch_dir(&self, prefix: &str) -> Result<TempDir> {
        std::fs::create_dir_all(&self.config.work_dir)?;
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(&self.config.work_dir)?;
        Ok(dir)
    }
}

#[cfg(test)]
pub mod test_support {
    //! Fakes shared by the service tests.
    //!
    //! `FakeTranscoder` treats "media" files as small JSON descriptors so that
    //! cuts and concatenations can be checked without ffmpeg.

    use std::cell::{Cell, RefCell};
    use std::path::{Path, PathBuf};
    use std::rc::Rc;
    use std::time::Duration;

    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    use super::PipelineContext;
    use crate::config::PipelineConfig;
    use crate::db::{self, schema};
    use crate::error::{PipelineError, Result};
    use crate::media::ffmpeg::target_dimensions;
    use crate::media::{CutMode, ProbeInfo, Transcoder};
    use crate::storage::{LocalMediaStore, MediaStore, StorageError, StorageResult};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct FakeMedia {
        pub duration: f64,
        pub width: u32,
        pub height: u32,
        #[serde(default)]
        pub loudnorm: bool,
    }

    pub fn write_fake_media(path: &Path, duration: f64, width: u32, height: u32) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let media = FakeMedia { duration, width, height, loudnorm: false };
        std::fs::write(path, serde_json::to_vec(&media).unwrap()).unwrap();
    }

    pub fn read_fake_media(path: &Path) -> FakeMedia {
        serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
    }

    #[derive(Default)]
    pub struct TranscoderFaults {
        pub fail_stream_copy: Cell<bool>,
        pub fail_reencode: Cell<bool>,
        pub fail_concat: Cell<bool>,
        pub fail_extract: Cell<bool>,
        /// Calls in order, e.g. `cut:stream_copy`, `concat:normalize=true:3`.
        pub calls: RefCell<Vec<String>>,
    }

    impl TranscoderFaults {
        pub fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    pub struct FakeTranscoder {
        faults: Rc<TranscoderFaults>,
    }

    impl FakeTranscoder {
        pub fn new(faults: Rc<TranscoderFaults>) -> Self {
            Self { faults }
        }

        fn load(path: &Path) -> Result<FakeMedia> {
            let bytes = std::fs::read(path)
                .map_err(|e| PipelineError::Transcode(format!("{}: {}", path.display(), e)))?;
            serde_json::from_slice(&bytes)
                .map_err(|e| PipelineError::Probe(format!("{}: {}", path.display(), e)))
        }

        fn write(path: &Path, media: &FakeMedia) -> Result<()> {
            std::fs::write(path, serde_json::to_vec(media)?)?;
            Ok(())
        }

        fn check_range(media: &FakeMedia, start: f64, end: f64) -> Result<()> {
            if start < 0.0 || start >= end || end > media.duration + 1e-6 {
                return Err(PipelineError::Transcode(format!(
                    "range {}-{} outside 0-{}",
                    start, end, media.duration
                )));
            }
            Ok(())
        }
    }

    impl Transcoder for FakeTranscoder {
        fn probe(&self, path: &Path) -> Result<ProbeInfo> {
            let media = Self::load(path)?;
            Ok(ProbeInfo {
                duration_seconds: media.duration,
                width: Some(media.width),
                height: Some(media.height),
                has_audio: true,
            })
        }

        fn cut(&self, input: &Path, output: &Path, start: f64, end: f64, mode: CutMode) -> Result<()> {
            self.faults.calls.borrow_mut().push(format!("cut:{}", mode.as_str()));
            let failing = match mode {
                CutMode::StreamCopy => self.faults.fail_stream_copy.get(),
                CutMode::ReEncode => self.faults.fail_reencode.get(),
            };
            if failing {
                return Err(PipelineError::Transcode(format!("injected {} failure", mode.as_str())));
            }
            let source = Self::load(input)?;
            Self::check_range(&source, start, end)?;
            Self::write(output, &FakeMedia { duration: end - start, ..source })
        }

        fn concatenate(&self, inputs: &[PathBuf], output: &Path, normalize: bool) -> Result<()> {
            self.faults
                .calls
                .borrow_mut()
                .push(format!("concat:normalize={}:{}", normalize, inputs.len()));
            if self.faults.fail_concat.get() {
                return Err(PipelineError::Transcode("injected concat failure".to_string()));
            }
            if inputs.is_empty() {
                return Err(PipelineError::InvalidInput("Nothing to concatenate".to_string()));
            }
            let parts = inputs.iter().map(|p| Self::load(p)).collect::<Result<Vec<_>>>()?;
            let first = &parts[0];
            let (width, height) = if normalize {
                target_dimensions(&ProbeInfo {
                    duration_seconds: first.duration,
                    width: Some(first.width),
                    height: Some(first.height),
                    has_audio: true,
                })
            } else {
                (first.width, first.height)
            };
            let media = FakeMedia {
                duration: parts.iter().map(|p| p.duration).sum(),
                width,
                height,
                loudnorm: parts.iter().all(|p| p.loudnorm),
            };
            Self::write(output, &media)
        }

        fn extract_normalized_audio(&self, input: &Path, output: &Path, start: f64, end: f64) -> Result<()> {
            self.faults.calls.borrow_mut().push("extract".to_string());
            if self.faults.fail_extract.get() {
                return Err(PipelineError::Transcode("injected extract failure".to_string()));
            }
            let source = Self::load(input)?;
            Self::check_range(&source, start, end)?;
            Self::write(output, &FakeMedia { duration: end - start, loudnorm: true, ..source })
        }
    }

    #[derive(Default)]
    pub struct StoreFaults {
        pub fail_upload: Cell<bool>,
        pub fail_download: Cell<bool>,
        pub fail_delete: Cell<bool>,
        pub deletes: RefCell<Vec<String>>,
    }

    /// Local store with switchable failures.
    pub struct FaultyStore {
        inner: LocalMediaStore,
        faults: Rc<StoreFaults>,
    }

    impl FaultyStore {
        pub fn new(inner: LocalMediaStore, faults: Rc<StoreFaults>) -> Self {
            Self { inner, faults }
        }
    }

    impl MediaStore for FaultyStore {
        fn bucket(&self) -> &str {
            self.inner.bucket()
        }

        fn upload(&self, local: &Path, key: &str) -> StorageResult<()> {
            if self.faults.fail_upload.get() {
                return Err(StorageError::upload_failed("injected upload failure"));
            }
            self.inner.upload(local, key)
        }

        fn download(&self, key: &str, local: &Path) -> StorageResult<()> {
            if self.faults.fail_download.get() {
                return Err(StorageError::download_failed("injected download failure"));
            }
            self.inner.download(key, local)
        }

        fn delete(&self, key: &str) -> StorageResult<()> {
            self.faults.deletes.borrow_mut().push(key.to_string());
            if self.faults.fail_delete.get() {
                return Err(StorageError::delete_failed("injected delete failure"));
            }
            self.inner.delete(key)
        }

        fn object_size(&self, key: &str) -> StorageResult<Option<u64>> {
            self.inner.object_size(key)
        }

        fn presign(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
            self.inner.presign(key, expires_in)
        }
    }

    /// A context over an in-memory catalog, a temp-dir store and the fakes.
    pub struct Harness {
        pub ctx: PipelineContext,
        pub media: Rc<TranscoderFaults>,
        pub storage: Rc<StoreFaults>,
        pub root: TempDir,
    }

    impl Harness {
        pub fn new() -> Self {
            let root = TempDir::new().unwrap();
            let config = PipelineConfig::rooted_at(root.path());
            config.ensure_dirs().unwrap();

            let media = Rc::new(TranscoderFaults::default());
            let storage = Rc::new(StoreFaults::default());
            let store = LocalMediaStore::new(&root.path().join("store"), &config.storage.bucket).unwrap();

            let ctx = PipelineContext::new(
                db::open_in_memory().unwrap(),
                Box::new(FaultyStore::new(store, Rc::clone(&storage))),
                Box::new(FakeTranscoder::new(Rc::clone(&media))),
                config,
            );
            Self { ctx, media, storage, root }
        }

        /// Upload a fake 1280x720 source video and catalog it.
        pub fn add_video(&self, title: &str, duration: f64) -> i64 {
            self.add_video_sized(title, duration, 1280, 720)
        }

        pub fn add_video_sized(&self, title: &str, duration: f64, width: u32, height: u32) -> i64 {
            let filename = format!("{}.mp4", title.to_lowercase().replace(' ', "_"));
            let local = self.root.path().join("incoming").join(&filename);
            write_fake_media(&local, duration, width, height);

            let key = format!("{}/{}/{}", self.ctx.config.storage.videos_prefix, uuid::Uuid::new_v4(), filename);
            self.ctx.store.upload(&local, &key).unwrap();

            schema::insert_video(
                &self.ctx.conn,
                &schema::NewVideo {
                    title: title.to_string(),
                    filename,
                    storage_key: Some(key),
                    duration_seconds: Some(duration),
                    width: Some(i64::from(width)),
                    height: Some(i64::from(height)),
                    event_year: None,
                },
            )
            .unwrap()
        }

        /// Entries left in the work dir; every service must leave it empty.
        pub fn work_dir_entries(&self) -> usize {
            std::fs::read_dir(&self.ctx.config.work_dir)
                .map(|rd| rd.count())
                .unwrap_or(0)
        }
    }
}
