// AI text generation adapter

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::AiConfig;
use crate::error::{PipelineError, Result};

/// Turns a prompt into raw model text. The assembler parses the reply.
pub trait StorylineGenerator {
    fn model_name(&self) -> &str;
    fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

pub struct GeminiGenerator {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiGenerator {
    /// Reads the API key from the environment variable named in `config`.
    pub fn from_config(config: &AiConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            PipelineError::Config(format!("{} is not set", config.api_key_env))
        })?;
        Self::new(config, api_key)
    }

    pub fn new(config: &AiConfig, api_key: String) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::Generation(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

impl StorylineGenerator for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn complete(&self, prompt: &str) -> Result<String> {
        let request = GeminiRequest {
            contents: vec![Content { parts: vec![Part { text: prompt }] }],
            generation_config: GenerationConfig { response_mime_type: "application/json" },
        };

        log::info!("Requesting storylines from {} ({} prompt chars)", self.model, prompt.len());
        let response = self
            .client
            .post(self.url())
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .map_err(|e| PipelineError::Generation(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(PipelineError::Generation(format!("API error {}: {}", status, body)));
        }

        let parsed: GeminiResponse = response
            .json()
            .map_err(|e| PipelineError::Generation(format!("unreadable response: {}", e)))?;
        first_text(parsed)
    }
}

fn first_text(response: GeminiResponse) -> Result<String> {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content.parts.into_iter().next())
        .map(|p| p.text)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| PipelineError::Generation("response had no candidates".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let request = GeminiRequest {
            contents: vec![Content { parts: vec![Part { text: "hi" }] }],
            generation_config: GenerationConfig { response_mime_type: "application/json" },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(json["generationConfig"]["responseMimeType"], "application/json");
    }

    #[test]
    fn test_first_candidate_text() {
        let response: GeminiResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "{\"storylines\": []}"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(first_text(response).unwrap(), r#"{"storylines": []}"#);

        let empty: GeminiResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert!(matches!(first_text(empty), Err(PipelineError::Generation(_))));
    }

    #[test]
    fn test_url_and_missing_key() {
        let config = AiConfig {
            endpoint: "https://example.test/v1beta/".into(),
            api_key_env: "CLIPSMITH_TEST_UNSET_KEY".into(),
            ..AiConfig::default()
        };
        let gen = GeminiGenerator::new(&config, "k".into()).unwrap();
        assert_eq!(gen.url(), format!("https://example.test/v1beta/models/{}:generateContent", config.model));
        assert!(matches!(GeminiGenerator::from_config(&config), Err(PipelineError::Config(_))));
    }
}
