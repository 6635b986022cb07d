// Ground-truth snapping for proposed clips
//
// A proposed range is clamped to the video, then widened or narrowed to the
// transcript segments it overlaps. Times, text and title all come from the
// catalog afterwards; nothing proposed by the generator survives unchecked.

use std::collections::HashMap;

use super::prompt::CorpusEntry;
use super::types::{ClipSpec, Storyline};
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMode {
    /// Drop clips that cannot be reconciled, then empty storylines.
    Lenient,
    /// Fail on the first clip that cannot be reconciled.
    Strict,
}

pub struct GroundTruth<'a> {
    videos: HashMap<i64, &'a CorpusEntry>,
}

impl<'a> GroundTruth<'a> {
    pub fn new(corpus: &'a [CorpusEntry]) -> Self {
        Self { videos: corpus.iter().map(|e| (e.video_id, e)).collect() }
    }

    pub fn snap(&self, clip: &ClipSpec) -> Result<ClipSpec> {
        let entry = self.videos.get(&clip.video_id).ok_or_else(|| {
            PipelineError::Reconciliation(format!("video {} has no completed transcript", clip.video_id))
        })?;
        if !clip.start_time.is_finite() || !clip.end_time.is_finite() {
            return Err(PipelineError::Reconciliation(format!(
                "non-finite range for video {}",
                clip.video_id
            )));
        }

        let limit = entry.duration_seconds.unwrap_or(f64::INFINITY);
        let start = clip.start_time.max(0.0);
        let end = clip.end_time.min(limit);
        if start >= end {
            return Err(PipelineError::Reconciliation(format!(
                "range {:.2}-{:.2} is empty within video {} ({:.2}s)",
                clip.start_time, clip.end_time, clip.video_id, limit
            )));
        }

        // Segments are ordered by start, so the overlapping ones are contiguous
        let run: Vec<_> = entry
            .segments
            .iter()
            .filter(|s| s.end > start && s.start < end)
            .collect();
        let (Some(first), Some(last)) = (run.first(), run.last()) else {
            return Err(PipelineError::Reconciliation(format!(
                "no transcript segments overlap {:.2}-{:.2} in video {}",
                start, end, clip.video_id
            )));
        };

        let snapped_start = first.start.max(0.0);
        let snapped_end = last.end.min(limit);
        if snapped_start >= snapped_end {
            return Err(PipelineError::Reconciliation(format!(
                "snapped range {:.2}-{:.2} is empty in video {}",
                snapped_start, snapped_end, clip.video_id
            )));
        }

        Ok(ClipSpec {
            video_id: entry.video_id,
            video_title: entry.title.clone(),
            start_time: snapped_start,
            end_time: snapped_end,
            text: run
                .iter()
                .map(|s| s.text.trim())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
        })
    }

    /// Snap every clip of a storyline. `Ok(None)` means nothing survived.
    pub fn reconcile(&self, storyline: &Storyline, mode: ReconcileMode) -> Result<Option<Storyline>> {
        let mut clips = Vec::with_capacity(storyline.clips.len());
        for (i, clip) in storyline.clips.iter().enumerate() {
            match self.snap(clip) {
                Ok(snapped) => clips.push(snapped),
                Err(e) if mode == ReconcileMode::Lenient => {
                    log::warn!("Dropping clip {} of storyline '{}': {}", i, storyline.id, e);
                }
                Err(e) => return Err(e),
            }
        }
        if clips.is_empty() {
            if mode == ReconcileMode::Strict {
                return Err(PipelineError::Reconciliation(format!(
                    "storyline '{}' has no clips",
                    storyline.id
                )));
            }
            log::warn!("Dropping storyline '{}': no clips survived reconciliation", storyline.id);
            return Ok(None);
        }

        let mut reconciled = Storyline { clips, ..storyline.clone() };
        reconciled.estimated_duration = reconciled.total_duration();
        Ok(Some(reconciled))
    }

    pub fn reconcile_all(&self, storylines: Vec<Storyline>) -> Vec<Storyline> {
        storylines
            .iter()
            .filter_map(|s| self.reconcile(s, ReconcileMode::Lenient).ok().flatten())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storyline::prompt::CorpusSegment;

    fn corpus() -> Vec<CorpusEntry> {
        let seg = |start: f64, end: f64, text: &str| CorpusSegment { start, end, text: text.into() };
        vec![CorpusEntry {
            video_id: 7,
            title: "Birthday".into(),
            filename: "birthday.mp4".into(),
            duration_seconds: Some(30.0),
            segments: vec![
                seg(0.0, 4.0, "Happy birthday"),
                seg(4.0, 9.5, "Make a wish"),
                seg(10.0, 16.0, "Blow the candles"),
                seg(20.0, 31.0, "Cake time"),
            ],
        }]
    }

    fn spec(video_id: i64, start: f64, end: f64) -> ClipSpec {
        ClipSpec { video_id, video_title: "made up".into(), start_time: start, end_time: end, text: "made up".into() }
    }

    #[test]
    fn test_snaps_to_overlapping_segments() {
        let corpus = corpus();
        let truth = GroundTruth::new(&corpus);

        let clip = truth.snap(&spec(7, 5.0, 11.0)).unwrap();
        assert_eq!((clip.start_time, clip.end_time), (4.0, 16.0));
        assert_eq!(clip.text, "Make a wish Blow the candles");
        assert_eq!(clip.video_title, "Birthday");

        // Touching a boundary is not overlap
        let clip = truth.snap(&spec(7, 4.0, 9.0)).unwrap();
        assert_eq!((clip.start_time, clip.end_time), (4.0, 9.5));
    }

    #[test]
    fn test_clamps_to_duration() {
        let corpus = corpus();
        let truth = GroundTruth::new(&corpus);

        let clip = truth.snap(&spec(7, -3.0, 2.0)).unwrap();
        assert_eq!(clip.start_time, 0.0);

        // Last segment overruns the video, end is clamped again
        let clip = truth.snap(&spec(7, 25.0, 99.0)).unwrap();
        assert_eq!((clip.start_time, clip.end_time), (20.0, 30.0));
    }

    #[test]
    fn test_unreconcilable_clips() {
        let corpus = corpus();
        let truth = GroundTruth::new(&corpus);
        assert!(matches!(truth.snap(&spec(8, 0.0, 5.0)), Err(PipelineError::Reconciliation(_))));
        assert!(matches!(truth.snap(&spec(7, 17.0, 19.0)), Err(PipelineError::Reconciliation(_))));
        assert!(matches!(truth.snap(&spec(7, 40.0, 50.0)), Err(PipelineError::Reconciliation(_))));
    }

    #[test]
    fn test_lenient_drops_and_strict_fails() {
        let corpus = corpus();
        let truth = GroundTruth::new(&corpus);
        let storyline = Storyline {
            id: "1".into(),
            title: "Party".into(),
            hook: String::new(),
            why_compelling: String::new(),
            estimated_duration: 60.0,
            clips: vec![spec(7, 1.0, 3.0), spec(99, 0.0, 5.0)],
        };

        let kept = truth.reconcile(&storyline, ReconcileMode::Lenient).unwrap().unwrap();
        assert_eq!(kept.clips.len(), 1);
        assert_eq!(kept.estimated_duration, 4.0);
        assert!(truth.reconcile(&storyline, ReconcileMode::Strict).is_err());

        let hopeless = Storyline { clips: vec![spec(99, 0.0, 5.0)], ..storyline.clone() };
        assert_eq!(truth.reconcile_all(vec![hopeless, storyline]).len(), 1);
    }
}
