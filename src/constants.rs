// Clipsmith Constants
// Defaults for configuration live in config.rs; the values here are fixed by the pipeline.

pub const APP_NAME: &str = "clipsmith";

// Paths
pub const DB_FILENAME: &str = "clipsmith.db";
pub const STORYLINES_FOLDER: &str = "storylines";
pub const SOURCES_FOLDER: &str = "sources";
pub const LATEST_STORYLINES_FILE: &str = "latest.json";
pub const CONFIG_FILENAME: &str = "config.json";

// Storage key prefixes (defaults)
pub const DEFAULT_BUCKET: &str = "media";
pub const DEFAULT_VIDEOS_PREFIX: &str = "videos";
pub const DEFAULT_CLIPS_PREFIX: &str = "clips";
pub const DEFAULT_COMPILED_PREFIX: &str = "compiled";
pub const ARTIFACT_EXTENSION: &str = "mp4";
pub const ARTIFACT_CONTENT_TYPE: &str = "video/mp4";

// Encoding
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
pub const SUPPORTED_VIDEO_CODECS: [&str; 4] = ["libx264", "libx265", "libvpx-vp9", "libaom-av1"];
pub const SUPPORTED_AUDIO_CODECS: [&str; 2] = ["aac", "libopus"];
pub const DEFAULT_FRAME_RATE: u32 = 30;
pub const ENCODE_PRESET: &str = "medium";
pub const ENCODE_CRF: u32 = 23;
pub const AUDIO_BITRATE: &str = "192k";
pub const AUDIO_SAMPLE_RATE: u32 = 48_000;

// Loudness normalization targets (EBU R128 style, tuned for web delivery)
pub const LOUDNORM_INTEGRATED_LUFS: f64 = -16.0;
pub const LOUDNORM_TRUE_PEAK_DBTP: f64 = -1.5;
pub const LOUDNORM_RANGE_LU: f64 = 11.0;

// Presigned URLs
pub const DEFAULT_PRESIGN_EXPIRY_SECS: u64 = 3600;

// ----- Transcript context ranking -----

pub const RANKER_MIN_KEYWORD_LEN: usize = 3;
pub const RANKER_MAX_KEYWORDS: usize = 15;
pub const RANKER_MATCHES_PER_KEYWORD: i64 = 100;
pub const RANKER_CONTEXT_WINDOW_SECS: f64 = 15.0;
pub const RANKER_RECENCY_YEAR: i32 = 2020;
pub const RANKER_FALLBACK_MIN_TEXT_LEN: i64 = 40;
pub const RANKER_FALLBACK_POOL: i64 = 500;
pub const RANKER_DEFAULT_LIMIT: usize = 20;
pub const RANKER_RECENCY_WORDS: [&str; 3] = ["recent", "latest", "newest"];

/// Rarity weight bands: (max matches, weight). Checked in order.
pub const RANKER_WEIGHT_BANDS: [(i64, u32); 3] = [(5, 10), (20, 5), (50, 2)];
pub const RANKER_COMMON_WEIGHT: u32 = 1;

pub const RANKER_STOP_WORDS: [&str; 64] = [
    "the", "and", "for", "with", "that", "this", "from", "about", "what", "when",
    "where", "which", "who", "whom", "how", "why", "are", "was", "were", "been",
    "have", "has", "had", "you", "your", "our", "their", "they", "them", "there",
    "here", "into", "over", "some", "any", "all", "can", "will", "would", "could",
    "should", "just", "like", "more", "most", "very", "also", "than", "then", "but",
    "not", "out", "get", "got", "video", "videos", "clip", "clips", "show", "find",
    "tell", "recent", "latest", "newest",
];

// ----- Storylines -----

pub const STORYLINE_COUNT: usize = 5;
pub const STORYLINE_TARGET_SECS: u32 = 60;
pub const STORYLINE_MIN_SECS: u32 = 45;
pub const STORYLINE_MAX_SECS: u32 = 75;
/// Bump when the prompt text changes so cached batches are not reused.
pub const STORYLINE_PROMPT_VERSION: u32 = 1;

// AI collaborator
pub const DEFAULT_AI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_AI_MODEL: &str = "gemini-1.5-pro";
pub const DEFAULT_AI_KEY_ENV: &str = "GEMINI_API_KEY";
pub const AI_REQUEST_TIMEOUT_SECS: u64 = 300;

// Video extensions recognized when searching local source directories
pub const VIDEO_EXTENSIONS: [&str; 10] = [
    "mp4", "mov", "mkv", "m4v", "webm", "avi", "mts", "m2ts", "ts", "mpg",
];
