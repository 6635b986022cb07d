// Naming rules for storage keys and output files

use crate::error::{PipelineError, Result};

/// Map a title to `[A-Za-z0-9_-]`, replacing everything else with `_`.
/// An empty title becomes `untitled`.
pub fn sanitize_title(title: &str) -> String {
    let sanitized: String = title
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    if sanitized.is_empty() {
        "untitled".to_string()
    } else {
        sanitized
    }
}

/// A clip name becomes one storage key segment, so it must be non-empty
/// and free of path separators.
pub fn validate_clip_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::InvalidInput("Clip name must not be empty".to_string()));
    }
    if trimmed != name {
        return Err(PipelineError::InvalidInput(format!(
            "Clip name has leading or trailing whitespace: '{}'",
            name
        )));
    }
    if name == "." || name == ".." || name.contains('/') || name.contains('\\') || name.contains('\0') {
        return Err(PipelineError::InvalidInput(format!("Clip name is not key-safe: '{}'", name)));
    }
    Ok(())
}
