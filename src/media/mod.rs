// Media transcoding: cut, concatenate, normalize, probe
//
// Everything external-process related sits behind the Transcoder trait so
// the services can be exercised without ffmpeg installed.

pub mod ffmpeg;
pub mod probe;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use ffmpeg::FfmpegTranscoder;

/// How a cut is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CutMode {
    /// Copy packets without decoding; fast, keyframe-aligned.
    StreamCopy,
    /// Decode and encode with the configured codecs; frame-accurate.
    ReEncode,
}

impl CutMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CutMode::StreamCopy => "stream_copy",
            CutMode::ReEncode => "re_encode",
        }
    }
}

/// Stream facts needed by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeInfo {
    pub duration_seconds: f64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub has_audio: bool,
}

pub trait Transcoder {
    fn probe(&self, path: &Path) -> Result<ProbeInfo>;

    /// Cut `[start, end)` of `input` into `output`.
    fn cut(&self, input: &Path, output: &Path, start: f64, end: f64, mode: CutMode) -> Result<()>;

    /// Stream copy first; when that fails, re-encode. Returns the mode that
    /// produced the output.
    fn cut_with_fallback(&self, input: &Path, output: &Path, start: f64, end: f64) -> Result<CutMode> {
        match self.cut(input, output, start, end, CutMode::StreamCopy) {
            Ok(()) => Ok(CutMode::StreamCopy),
            Err(e) => {
                log::warn!("Stream copy failed for {}, re-encoding: {}", output.display(), e);
                self.cut(input, output, start, end, CutMode::ReEncode)?;
                Ok(CutMode::ReEncode)
            }
        }
    }

    /// Join `inputs` in order. With `normalize`, every input is conformed to
    /// the first input's resolution at a fixed frame rate.
    fn concatenate(&self, inputs: &[PathBuf], output: &Path, normalize: bool) -> Result<()>;

    /// Cut `[start, end)` and re-encode with loudness normalization.
    fn extract_normalized_audio(&self, input: &Path, output: &Path, start: f64, end: f64) -> Result<()>;
}

/// Local file size, zero when missing.
pub fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}
