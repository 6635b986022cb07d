// Content-addressed storyline cache
//
// Batches live at `<storylines dir>/<key>.json`, with the newest one
// mirrored to `latest.json`. Writes go through a temp file and a rename.

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::prompt::CorpusEntry;
use super::types::StorylineBatch;
use crate::constants::*;
use crate::error::Result;

#[derive(Serialize)]
struct KeyParams<'a> {
    count: usize,
    target_secs: u32,
    min_secs: u32,
    max_secs: u32,
    prompt_version: u32,
    model: &'a str,
}

/// BLAKE3 over the serialized corpus plus every prompt parameter.
pub fn cache_key(corpus: &[CorpusEntry], model: &str) -> Result<String> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&serde_json::to_vec(corpus)?);
    hasher.update(&serde_json::to_vec(&KeyParams {
        count: STORYLINE_COUNT,
        target_secs: STORYLINE_TARGET_SECS,
        min_secs: STORYLINE_MIN_SECS,
        max_secs: STORYLINE_MAX_SECS,
        prompt_version: STORYLINE_PROMPT_VERSION,
        model,
    })?);
    Ok(hasher.finalize().to_hex().to_string())
}

pub struct StorylineCache {
    dir: PathBuf,
}

impl StorylineCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    pub fn load(&self, key: &str) -> Result<Option<StorylineBatch>> {
        read_batch(&self.entry_path(key))
    }

    pub fn latest(&self) -> Result<Option<StorylineBatch>> {
        read_batch(&self.dir.join(LATEST_STORYLINES_FILE))
    }

    pub fn store(&self, batch: &StorylineBatch) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_vec_pretty(batch)?;
        let path = self.entry_path(&batch.cache_key);
        write_atomic(&path, &json)?;
        write_atomic(&self.dir.join(LATEST_STORYLINES_FILE), &json)?;
        log::debug!("Cached {} storylines at {}", batch.storylines.len(), path.display());
        Ok(path)
    }
}

fn read_batch(path: &Path) -> Result<Option<StorylineBatch>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read(path)?;
    Ok(Some(serde_json::from_slice(&raw)?))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storyline::prompt::CorpusSegment;

    fn corpus(text: &str) -> Vec<CorpusEntry> {
        vec![CorpusEntry {
            video_id: 1,
            title: "Lake".into(),
            filename: "lake.mp4".into(),
            duration_seconds: Some(10.0),
            segments: vec![CorpusSegment { start: 0.0, end: 4.0, text: text.into() }],
        }]
    }

    #[test]
    fn test_key_tracks_corpus_and_model() {
        let a = cache_key(&corpus("hello"), "m1").unwrap();
        assert_eq!(a, cache_key(&corpus("hello"), "m1").unwrap());
        assert_ne!(a, cache_key(&corpus("hello!"), "m1").unwrap());
        assert_ne!(a, cache_key(&corpus("hello"), "m2").unwrap());
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_store_and_load() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cache = StorylineCache::new(tmp.path().join("storylines"));
        assert!(cache.latest().unwrap().is_none());
        assert!(cache.load("abc").unwrap().is_none());

        let batch = StorylineBatch {
            storylines: Vec::new(),
            cache_key: "abc".into(),
            model: "m".into(),
            generated_at: "now".into(),
        };
        cache.store(&batch).unwrap();

        assert_eq!(cache.load("abc").unwrap(), Some(batch.clone()));
        assert_eq!(cache.latest().unwrap(), Some(batch));
        let leftovers = std::fs::read_dir(tmp.path().join("storylines"))
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }
}
