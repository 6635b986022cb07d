// Pipeline configuration
//
// Loaded from JSON (explicit path, else the per-user config dir), then
// environment overrides are applied and the result is validated.

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{PipelineError, Result};

/// Object storage backend selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageBackend {
    /// Buckets are directories under `root`.
    Local { root: PathBuf },
    /// S3-compatible endpoint (AWS, R2, MinIO). Credentials are read from
    /// the named environment variables at connect time.
    S3 {
        endpoint: String,
        #[serde(default = "default_region")]
        region: String,
        #[serde(default = "default_access_key_env")]
        access_key_env: String,
        #[serde(default = "default_secret_key_env")]
        secret_key_env: String,
    },
}

fn default_region() -> String {
    "auto".to_string()
}

fn default_access_key_env() -> String {
    "CLIPSMITH_S3_ACCESS_KEY_ID".to_string()
}

fn default_secret_key_env() -> String {
    "CLIPSMITH_S3_SECRET_ACCESS_KEY".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub bucket: String,
    pub videos_prefix: String,
    pub clips_prefix: String,
    pub compiled_prefix: String,
    pub presign_expiry_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    pub video_codec: String,
    pub audio_codec: String,
    pub frame_rate: u32,
    pub loudness_integrated: f64,
    pub loudness_true_peak: f64,
    pub loudness_range: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Holds the catalog database and, by default, the local bucket root.
    pub data_dir: PathBuf,
    /// Parent of every per-call temporary directory.
    pub work_dir: PathBuf,
    /// Storyline cache and locally cached sources.
    pub cache_dir: PathBuf,
    /// Where storyline videos are written.
    pub output_dir: PathBuf,
    /// Extra directories searched for storyline source videos.
    pub source_dirs: Vec<PathBuf>,
    pub storage: StorageConfig,
    pub encoding: EncodingConfig,
    pub ai: AiConfig,
}

fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", APP_NAME)
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".").join(format!(".{}", APP_NAME)))
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local { root: default_data_dir().join("store") },
            bucket: DEFAULT_BUCKET.to_string(),
            videos_prefix: DEFAULT_VIDEOS_PREFIX.to_string(),
            clips_prefix: DEFAULT_CLIPS_PREFIX.to_string(),
            compiled_prefix: DEFAULT_COMPILED_PREFIX.to_string(),
            presign_expiry_secs: DEFAULT_PRESIGN_EXPIRY_SECS,
        }
    }
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            video_codec: DEFAULT_VIDEO_CODEC.to_string(),
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            frame_rate: DEFAULT_FRAME_RATE,
            loudness_integrated: LOUDNORM_INTEGRATED_LUFS,
            loudness_true_peak: LOUDNORM_TRUE_PEAK_DBTP,
            loudness_range: LOUDNORM_RANGE_LU,
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_AI_ENDPOINT.to_string(),
            model: DEFAULT_AI_MODEL.to_string(),
            api_key_env: DEFAULT_AI_KEY_ENV.to_string(),
            timeout_secs: AI_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::rooted_at(&default_data_dir())
    }
}

impl PipelineConfig {
    /// Build a default configuration with every directory under `root`.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            data_dir: root.to_path_buf(),
            work_dir: root.join("work"),
            cache_dir: root.join("cache"),
            output_dir: root.join("output"),
            source_dirs: Vec::new(),
            storage: StorageConfig {
                backend: StorageBackend::Local { root: root.join("store") },
                ..StorageConfig::default()
            },
            encoding: EncodingConfig::default(),
            ai: AiConfig::default(),
        }
    }

    /// Default config file location (`<config dir>/clipsmith/config.json`).
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", APP_NAME)
            .map(|d| d.config_dir().join(CONFIG_FILENAME))
    }

    /// Load from an explicit path, else the default path if it exists,
    /// else defaults. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => match Self::default_path() {
                Some(p) if p.exists() => Self::from_file(&p)?,
                _ => Self::default(),
            },
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            PipelineError::Config(format!("Invalid config {}: {}", path.display(), e))
        })
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("CLIPSMITH_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = env::var("CLIPSMITH_WORK_DIR") {
            self.work_dir = PathBuf::from(v);
        }
        if let Ok(v) = env::var("CLIPSMITH_BUCKET") {
            self.storage.bucket = v;
        }
        if let Some(v) = env::var_os("CLIPSMITH_SOURCE_DIRS") {
            self.source_dirs = env::split_paths(&v).collect();
        }
    }

    pub fn validate(&self) -> Result<()> {
        let enc = &self.encoding;
        if !SUPPORTED_VIDEO_CODECS.contains(&enc.video_codec.as_str()) {
            return Err(PipelineError::Config(format!(
                "Unsupported video codec '{}' (supported: {})",
                enc.video_codec,
                SUPPORTED_VIDEO_CODECS.join(", ")
            )));
        }
        if !SUPPORTED_AUDIO_CODECS.contains(&enc.audio_codec.as_str()) {
            return Err(PipelineError::Config(format!(
                "Unsupported audio codec '{}' (supported: {})",
                enc.audio_codec,
                SUPPORTED_AUDIO_CODECS.join(", ")
            )));
        }
        if enc.frame_rate == 0 {
            return Err(PipelineError::Config("frame_rate must be positive".to_string()));
        }

        let st = &self.storage;
        for (name, value) in [
            ("bucket", &st.bucket),
            ("videos_prefix", &st.videos_prefix),
            ("clips_prefix", &st.clips_prefix),
            ("compiled_prefix", &st.compiled_prefix),
        ] {
            if value.trim().is_empty() {
                return Err(PipelineError::Config(format!("storage.{} must not be empty", name)));
            }
        }

        Ok(())
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILENAME)
    }

    pub fn storylines_dir(&self) -> PathBuf {
        self.cache_dir.join(STORYLINES_FOLDER)
    }

    pub fn cached_sources_dir(&self) -> PathBuf {
        self.cache_dir.join(SOURCES_FOLDER)
    }

    /// Create every directory the pipeline writes into.
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.work_dir)?;
        std::fs::create_dir_all(self.storylines_dir())?;
        std::fs::create_dir_all(self.cached_sources_dir())?;
        std::fs::create_dir_all(&self.output_dir)?;
        if let StorageBackend::Local { root } = &self.storage.backend {
            std::fs::create_dir_all(root.join(&self.storage.bucket))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = PipelineConfig::rooted_at(tmp.path());
        config.validate().unwrap();
        assert_eq!(config.storage.clips_prefix, "clips");
        assert_eq!(config.db_path(), tmp.path().join(DB_FILENAME));
    }

    #[test]
    fn test_unsupported_codec_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = PipelineConfig::rooted_at(tmp.path());
        config.encoding.video_codec = "prores_ks".to_string();
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "work_dir": "/tmp/clipsmith-work",
                "storage": { "backend": { "kind": "s3", "endpoint": "http://localhost:9000" }, "bucket": "media" },
                "encoding": { "frame_rate": 25 }
            }"#,
        )
        .unwrap();

        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.work_dir, PathBuf::from("/tmp/clipsmith-work"));
        assert_eq!(config.encoding.frame_rate, 25);
        assert_eq!(config.encoding.video_codec, DEFAULT_VIDEO_CODEC);
        assert_eq!(config.storage.compiled_prefix, DEFAULT_COMPILED_PREFIX);
        match config.storage.backend {
            StorageBackend::S3 { ref region, ref access_key_env, .. } => {
                assert_eq!(region, "auto");
                assert_eq!(access_key_env, "CLIPSMITH_S3_ACCESS_KEY_ID");
            }
            _ => panic!("expected s3 backend"),
        }
    }

    #[test]
    fn test_create_dirs() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = PipelineConfig::rooted_at(tmp.path());
        config.ensure_dirs().unwrap();
        assert!(config.work_dir.is_dir());
        assert!(config.storylines_dir().is_dir());
        assert!(tmp.path().join("store").join(DEFAULT_BUCKET).is_dir());
    }
}
