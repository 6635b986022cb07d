//! Storyline plan types.
//!
//! These mirror the JSON contract of the generator. Ids arrive as numbers
//! or strings depending on the model's mood, so both are accepted.

use serde::{Deserialize, Deserializer, Serialize};

/// One proposed cut: a time range of a catalogued video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipSpec {
    #[serde(deserialize_with = "int_id")]
    pub video_id: i64,
    #[serde(default)]
    pub video_title: String,
    pub start_time: f64,
    pub end_time: f64,
    #[serde(default)]
    pub text: String,
}

impl ClipSpec {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Storyline {
    #[serde(deserialize_with = "string_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub hook: String,
    #[serde(default)]
    pub why_compelling: String,
    #[serde(default)]
    pub estimated_duration: f64,
    pub clips: Vec<ClipSpec>,
}

impl Storyline {
    pub fn total_duration(&self) -> f64 {
        self.clips.iter().map(ClipSpec::duration).sum()
    }
}

/// A generated set of storylines plus where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorylineBatch {
    pub storylines: Vec<Storyline>,
    #[serde(default)]
    pub cache_key: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub generated_at: String,
}

impl StorylineBatch {
    pub fn find(&self, storyline_id: &str) -> Option<&Storyline> {
        self.storylines.iter().find(|s| s.id == storyline_id)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Int(i64),
    Float(f64),
    Str(String),
}

fn int_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match RawId::deserialize(deserializer)? {
        RawId::Int(n) => Ok(n),
        RawId::Float(f) if f.fract() == 0.0 && f.is_finite() => Ok(f as i64),
        RawId::Float(f) => Err(serde::de::Error::custom(format!("non-integer id {}", f))),
        RawId::Str(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid id '{}'", s))),
    }
}

fn string_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Int(n) => n.to_string(),
        RawId::Float(f) if f.fract() == 0.0 && f.is_finite() => (f as i64).to_string(),
        RawId::Float(f) => f.to_string(),
        RawId::Str(s) => s.trim().to_string(),
    })
}
