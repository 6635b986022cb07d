// FFprobe wrapper

use std::path::Path;
use std::process::Command;

use serde::Deserialize;

use super::ProbeInfo;
use crate::error::{PipelineError, Result};

#[derive(Debug, Deserialize)]
struct FFprobeOutput {
    streams: Option<Vec<FFprobeStream>>,
    format: Option<FFprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FFprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FFprobeFormat {
    duration: Option<String>,
}

/// Run ffprobe on a file.
pub fn probe(path: &Path) -> Result<ProbeInfo> {
    let output = Command::new(crate::tools::ffprobe_path())
        .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path)
        .output()
        .map_err(|e| PipelineError::Probe(format!("Failed to run ffprobe: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PipelineError::Probe(format!(
            "ffprobe failed on {}: {}",
            path.display(),
            stderr.trim()
        )));
    }

    parse_probe_output(&output.stdout)
}

/// Parse `-print_format json` output. Format duration wins over stream
/// duration; the first video stream supplies the resolution.
pub fn parse_probe_output(stdout: &[u8]) -> Result<ProbeInfo> {
    let parsed: FFprobeOutput = serde_json::from_slice(stdout)
        .map_err(|e| PipelineError::Probe(format!("Failed to parse ffprobe output: {}", e)))?;

    let mut width = None;
    let mut height = None;
    let mut has_audio = false;
    let mut stream_duration = None;

    for stream in parsed.streams.iter().flatten() {
        match stream.codec_type.as_deref() {
            Some("video") if width.is_none() => {
                width = stream.width;
                height = stream.height;
                stream_duration = parse_seconds(stream.duration.as_deref());
            }
            Some("audio") => has_audio = true,
            _ => {}
        }
    }

    let duration_seconds = parsed
        .format
        .as_ref()
        .and_then(|f| parse_seconds(f.duration.as_deref()))
        .or(stream_duration)
        .ok_or_else(|| PipelineError::Probe("No duration reported".to_string()))?;

    Ok(ProbeInfo { duration_seconds, width, height, has_audio })
}

fn parse_seconds(value: Option<&str>) -> Option<f64> {
    value?.parse::<f64>().ok().filter(|s| s.is_finite() && *s >= 0.0)
}

/// Check if ffprobe is available
pub fn is_available() -> bool {
    crate::tools::is_tool_available("ffprobe")
}
