// FFmpeg-backed Transcoder
//
// Every run writes to `<output>.tmp.mp4` and is renamed into place only on
// success, so a failed run never leaves a partial file under the final name.

use std::path::{Path, PathBuf};
use std::process::Command;

use super::{file_size, probe, CutMode, ProbeInfo, Transcoder};
use crate::config::EncodingConfig;
use crate::constants::{AUDIO_BITRATE, AUDIO_SAMPLE_RATE, ENCODE_CRF, ENCODE_PRESET};
use crate::error::{PipelineError, Result};

/// Target used when the first input of a normalized concat has no video
/// dimensions.
const FALLBACK_DIMENSIONS: (u32, u32) = (1920, 1080);

#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    encoding: EncodingConfig,
}

impl FfmpegTranscoder {
    pub fn new(encoding: EncodingConfig) -> Self {
        Self { encoding }
    }

    /// Run ffmpeg with `args` followed by the temp output path, then move
    /// the result to `output`.
    fn run(&self, args: Vec<String>, output: &Path) -> Result<()> {
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = output.with_extension("tmp.mp4");

        let mut full_args = args;
        full_args.push(path_str(&tmp_path)?);
        log::debug!("ffmpeg {}", full_args.join(" "));

        let result = Command::new(crate::tools::ffmpeg_path())
            .args(&full_args)
            .output()
            .map_err(|e| PipelineError::Transcode(format!("Failed to run ffmpeg: {}", e)))?;

        if !result.status.success() {
            let _ = std::fs::remove_file(&tmp_path);
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(PipelineError::Transcode(format!(
                "ffmpeg exited with {} for {}: {}",
                result.status,
                output.display(),
                last_lines(&stderr, 5)
            )));
        }

        if file_size(&tmp_path) == 0 {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(PipelineError::Transcode(format!(
                "ffmpeg produced an empty file for {}",
                output.display()
            )));
        }

        std::fs::rename(&tmp_path, output).map_err(|e| {
            let _ = std::fs::remove_file(&tmp_path);
            PipelineError::Io(e)
        })?;
        Ok(())
    }
}

impl Transcoder for FfmpegTranscoder {
    fn probe(&self, path: &Path) -> Result<ProbeInfo> {
        probe::probe(path)
    }

    fn cut(&self, input: &Path, output: &Path, start: f64, end: f64, mode: CutMode) -> Result<()> {
        let args = cut_args(input, start, end, mode, &self.encoding)?;
        self.run(args, output)
    }

    fn concatenate(&self, inputs: &[PathBuf], output: &Path, normalize: bool) -> Result<()> {
        if inputs.is_empty() {
            return Err(PipelineError::InvalidInput("Nothing to concatenate".to_string()));
        }

        let list_path = output.with_extension("concat.txt");
        std::fs::write(&list_path, concat_list(inputs)?)?;

        let args = if normalize {
            let first = self.probe(&inputs[0]);
            let (width, height) = match first {
                Ok(info) => target_dimensions(&info),
                Err(e) => {
                    let _ = std::fs::remove_file(&list_path);
                    return Err(e);
                }
            };
            concat_normalized_args(&list_path, width, height, &self.encoding)
        } else {
            concat_copy_args(&list_path)
        };

        let result = args.and_then(|a| self.run(a, output));
        let _ = std::fs::remove_file(&list_path);
        result
    }

    fn extract_normalized_audio(&self, input: &Path, output: &Path, start: f64, end: f64) -> Result<()> {
        let args = normalized_extract_args(input, start, end, &self.encoding)?;
        self.run(args, output)
    }
}

// ----- Argument builders -----

fn cut_args(input: &Path, start: f64, end: f64, mode: CutMode, enc: &EncodingConfig) -> Result<Vec<String>> {
    if !(start.is_finite() && end.is_finite()) || start < 0.0 || start >= end {
        return Err(PipelineError::InvalidRange { start, end });
    }

    let mut args: Vec<String> = vec![
        "-y".into(),
        "-ss".into(), format!("{:.3}", start),
        "-i".into(), path_str(input)?,
        "-t".into(), format!("{:.3}", end - start),
    ];

    match mode {
        CutMode::StreamCopy => args.extend_from_slice(&["-c".into(), "copy".into()]),
        CutMode::ReEncode => args.extend(encoding_args(enc)),
    }

    args.extend_from_slice(&["-avoid_negative_ts".into(), "make_zero".into()]);
    args.extend_from_slice(&["-movflags".into(), "+faststart".into()]);
    Ok(args)
}

fn concat_copy_args(list_path: &Path) -> Result<Vec<String>> {
    let mut args = concat_input_args(list_path)?;
    args.extend_from_slice(&["-c".into(), "copy".into(), "-movflags".into(), "+faststart".into()]);
    Ok(args)
}

fn concat_normalized_args(list_path: &Path, width: u32, height: u32, enc: &EncodingConfig) -> Result<Vec<String>> {
    let mut args = concat_input_args(list_path)?;
    args.extend_from_slice(&["-vf".into(), normalize_filter(width, height, enc.frame_rate)]);
    args.extend_from_slice(&["-af".into(), audio_conform_filter()]);
    args.extend(encoding_args(enc));
    args.extend_from_slice(&[
        "-ar".into(), AUDIO_SAMPLE_RATE.to_string(),
        "-ac".into(), "2".into(),
        "-movflags".into(), "+faststart".into(),
    ]);
    Ok(args)
}

fn concat_input_args(list_path: &Path) -> Result<Vec<String>> {
    Ok(vec![
        "-y".into(),
        "-f".into(), "concat".into(),
        "-safe".into(), "0".into(),
        "-i".into(), path_str(list_path)?,
    ])
}

fn normalized_extract_args(input: &Path, start: f64, end: f64, enc: &EncodingConfig) -> Result<Vec<String>> {
    if !(start.is_finite() && end.is_finite()) || start < 0.0 || start >= end {
        return Err(PipelineError::InvalidRange { start, end });
    }

    let mut args: Vec<String> = vec![
        "-y".into(),
        "-ss".into(), format!("{:.3}", start),
        "-i".into(), path_str(input)?,
        "-t".into(), format!("{:.3}", end - start),
        "-af".into(), loudnorm_filter(enc),
    ];
    args.extend(encoding_args(enc));
    args.extend_from_slice(&[
        "-ar".into(), AUDIO_SAMPLE_RATE.to_string(),
        "-ac".into(), "2".into(),
        "-avoid_negative_ts".into(), "make_zero".into(),
        "-movflags".into(), "+faststart".into(),
    ]);
    Ok(args)
}

/// Video and audio encoder settings for re-encoding paths.
fn encoding_args(enc: &EncodingConfig) -> Vec<String> {
    let mut args: Vec<String> = vec!["-c:v".into(), enc.video_codec.clone()];
    // x264/x265 are the only configured encoders with a preset option
    if enc.video_codec == "libx264" || enc.video_codec == "libx265" {
        args.extend_from_slice(&["-preset".into(), ENCODE_PRESET.into()]);
    }
    args.extend_from_slice(&[
        "-crf".into(), ENCODE_CRF.to_string(),
        "-pix_fmt".into(), "yuv420p".into(),
        "-c:a".into(), enc.audio_codec.clone(),
        "-b:a".into(), AUDIO_BITRATE.into(),
    ]);
    args
}

/// Concat demuxer list. Single quotes are closed, escaped and reopened.
pub fn concat_list(inputs: &[PathBuf]) -> Result<String> {
    let mut list = String::new();
    for input in inputs {
        let escaped = path_str(input)?.replace('\'', "'\\''");
        list.push_str(&format!("file '{}'\n", escaped));
    }
    Ok(list)
}

/// Letterbox into `width`x`height` at a fixed frame rate with square pixels.
pub fn normalize_filter(width: u32, height: u32, frame_rate: u32) -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,fps={fps},setsar=1",
        w = width,
        h = height,
        fps = frame_rate,
    )
}

/// Conform audio to 48kHz stereo
fn audio_conform_filter() -> String {
    format!("aresample={},aformat=channel_layouts=stereo", AUDIO_SAMPLE_RATE)
}

pub fn loudnorm_filter(enc: &EncodingConfig) -> String {
    format!(
        "loudnorm=I={}:TP={}:LRA={}",
        enc.loudness_integrated, enc.loudness_true_peak, enc.loudness_range
    )
}

/// Even target dimensions from the first input (yuv420p needs both even).
pub fn target_dimensions(info: &ProbeInfo) -> (u32, u32) {
    match (info.width, info.height) {
        (Some(w), Some(h)) if w >= 2 && h >= 2 => (w - w % 2, h - h % 2),
        _ => FALLBACK_DIMENSIONS,
    }
}

fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let skip = lines.len().saturating_sub(n);
    lines[skip..].join(" | ")
}

/// Convert a Path to a String, failing on non-UTF8
fn path_str(path: &Path) -> Result<String> {
    path.to_str()
        .map(|s| s.to_string())
        .ok_or_else(|| PipelineError::InvalidInput(format!("Path is not valid UTF-8: {}", path.display())))
}
