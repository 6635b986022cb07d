// Source video registration

use std::path::Path;

use crate::context::PipelineContext;
use crate::db::schema::{self, NewVideo, Video};
use crate::error::{PipelineError, Result};

/// Storage key for an uploaded source.
pub fn source_key(videos_prefix: &str, filename: &str) -> String {
    format!("{}/{}/{}", videos_prefix, uuid::Uuid::new_v4(), filename)
}

/// Probe a local file, upload it as a source and catalog it as `ready`.
pub fn register_video(
    ctx: &PipelineContext,
    path: &Path,
    title: Option<&str>,
    event_year: Option<i32>,
) -> Result<i64> {
    if !path.is_file() {
        return Err(PipelineError::SourceNotFound(path.display().to_string()));
    }
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| PipelineError::InvalidInput(format!("Unusable file name: {}", path.display())))?
        .to_string();
    let title = match title {
        Some(t) if !t.trim().is_empty() => t.trim().to_string(),
        _ => path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(filename.as_str())
            .to_string(),
    };

    let info = ctx.transcoder.probe(path)?;
    let key = source_key(&ctx.config.storage.videos_prefix, &filename);
    ctx.store.upload(path, &key)?;

    let id = schema::insert_video(
        &ctx.conn,
        &NewVideo {
            title,
            filename,
            storage_key: Some(key.clone()),
            duration_seconds: Some(info.duration_seconds),
            width: info.width.map(i64::from),
            height: info.height.map(i64::from),
            event_year,
        },
    )?;
    log::info!("Registered video {} ({:.1}s) at {}", id, info.duration_seconds, key);
    Ok(id)
}

pub fn get_video(ctx: &PipelineContext, video_id: i64) -> Result<Video> {
    schema::get_video(&ctx.conn, video_id)?.ok_or(PipelineError::VideoNotFound(video_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::{write_fake_media, Harness};

    #[test]
    fn test_register_probes_and_uploads() {
        let h = Harness::new();
        let local = h.root.path().join("Beach Day.mp4");
        write_fake_media(&local, 42.0, 1920, 1080);

        let id = register_video(&h.ctx, &local, None, Some(2021)).unwrap();
        let video = get_video(&h.ctx, id).unwrap();
        assert_eq!(video.title, "Beach Day");
        assert_eq!(video.filename, "Beach Day.mp4");
        assert_eq!(video.duration_seconds, Some(42.0));
        assert_eq!(video.event_year, Some(2021));

        let key = video.storage_key.unwrap();
        assert!(key.starts_with("videos/") && key.ends_with("/Beach Day.mp4"));
        assert!(h.ctx.store.exists(&key).unwrap());
    }

    #[test]
    fn test_register_missing_file() {
        let h = Harness::new();
        let result = register_video(&h.ctx, &h.root.path().join("nope.mp4"), None, None);
        assert!(matches!(result, Err(PipelineError::SourceNotFound(_))));
    }
}
