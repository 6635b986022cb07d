// Generator response parsing

use serde::Deserialize;

use super::types::Storyline;
use crate::error::{PipelineError, Result};

#[derive(Deserialize)]
struct StorylineResponse {
    storylines: Vec<Storyline>,
}

/// Strip a Markdown code fence (```json ... ```) around the payload, and any
/// prose before the first `{` or after the last `}`.
pub fn strip_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        // Drop the fence line, including an optional language tag
        text = match rest.find('\n') {
            Some(nl) => &rest[nl + 1..],
            None => rest.trim_start_matches("json"),
        };
        text = text.trim_end();
        if let Some(inner) = text.strip_suffix("```") {
            text = inner;
        }
    }

    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text.trim(),
    }
}

pub fn parse_response(raw: &str) -> Result<Vec<Storyline>> {
    let body = strip_fences(raw);
    let parsed: StorylineResponse = serde_json::from_str(body)
        .map_err(|e| PipelineError::GenerationParse(format!("{} (response starts: {:.80})", e, body)))?;
    Ok(parsed.storylines)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{"storylines": [{"id": 1, "title": "T", "clips": [{"video_id": 4, "start_time": 0, "end_time": 3}]}]}"#;

    #[test]
    fn test_plain_and_fenced_json() {
        assert_eq!(parse_response(BODY).unwrap().len(), 1);

        let fenced = format!("```json\n{}\n```", BODY);
        assert_eq!(parse_response(&fenced).unwrap()[0].clips[0].video_id, 4);

        let bare_fence = format!("```\n{}\n```\n", BODY);
        assert_eq!(parse_response(&bare_fence).unwrap()[0].id, "1");

        let chatty = format!("Here you go:\n{}\nEnjoy!", BODY);
        assert!(parse_response(&chatty).is_ok());
    }

    #[test]
    fn test_garbage_is_parse_error() {
        assert!(matches!(parse_response("I cannot help"), Err(PipelineError::GenerationParse(_))));
        assert!(matches!(parse_response(r#"{"stories": []}"#), Err(PipelineError::GenerationParse(_))));
    }
}
