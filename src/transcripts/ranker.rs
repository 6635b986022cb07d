// Transcript context ranking
//
// Scores transcript segments against a free-text query by keyword rarity:
// a keyword that appears in a handful of segments says far more about what
// the user wants than one that appears everywhere. The excerpts produced
// here are the only material the storyline generator ever sees.

use std::collections::{BTreeSet, HashMap, HashSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rusqlite::{params, Connection};
use serde::Serialize;

use super::keywords::{extract_keywords, year_floor};
use crate::constants::{
    RANKER_COMMON_WEIGHT, RANKER_CONTEXT_WINDOW_SECS, RANKER_DEFAULT_LIMIT, RANKER_FALLBACK_MIN_TEXT_LEN,
    RANKER_FALLBACK_POOL, RANKER_MATCHES_PER_KEYWORD, RANKER_WEIGHT_BANDS,
};
use crate::error::Result;

#[derive(Debug, Clone, Copy)]
pub struct RankOptions {
    pub limit: usize,
    /// Seed for the fallback sample; `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for RankOptions {
    fn default() -> Self {
        Self { limit: RANKER_DEFAULT_LIMIT, seed: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedExcerpt {
    pub video_id: i64,
    pub video_title: String,
    pub transcript_id: i64,
    /// The segment the keywords matched.
    pub segment_id: i64,
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub score: u32,
    pub matched_keywords: Vec<String>,
}

/// A segment of a completed transcript, with what the ranker needs to know
/// about its video.
#[derive(Debug, Clone)]
struct CorpusSegment {
    video_id: i64,
    video_title: String,
    transcript_id: i64,
    segment_id: i64,
    start: f64,
    end: f64,
    text: String,
    lowered: String,
}

/// Rarity weight for a keyword with `matches` hits; zero means skip.
pub fn rarity_weight(matches: usize) -> u32 {
    if matches == 0 {
        return 0;
    }
    RANKER_WEIGHT_BANDS
        .iter()
        .find(|(max, _)| matches as i64 <= *max)
        .map(|(_, weight)| *weight)
        .unwrap_or(RANKER_COMMON_WEIGHT)
}

pub struct TranscriptContextRanker<'a> {
    conn: &'a Connection,
}

impl<'a> TranscriptContextRanker<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn rank(&self, query: &str, options: RankOptions) -> Result<Vec<RankedExcerpt>> {
        let keywords = extract_keywords(query);
        let floor = year_floor(query);
        let corpus = self.load_corpus(floor)?;
        log::debug!(
            "Ranking {} segments for keywords {:?} (year floor {:?})",
            corpus.len(),
            keywords,
            floor
        );

        let by_transcript = index_by_transcript(&corpus);

        // segment index -> (score, keywords)
        let mut aggregate: HashMap<usize, (u32, BTreeSet<String>)> = HashMap::new();
        for keyword in &keywords {
            let matches: Vec<usize> = corpus
                .iter()
                .enumerate()
                .filter(|(_, seg)| seg.lowered.contains(keyword.as_str()))
                .map(|(i, _)| i)
                .collect();
            let weight = rarity_weight(matches.len());
            if weight == 0 {
                continue;
            }
            log::debug!("Keyword '{}': {} matches, weight {}", keyword, matches.len(), weight);

            for idx in matches.into_iter().take(RANKER_MATCHES_PER_KEYWORD as usize) {
                let entry = aggregate.entry(idx).or_insert_with(|| (0, BTreeSet::new()));
                entry.0 += weight;
                entry.1.insert(keyword.clone());
            }
        }

        let mut excerpts: Vec<RankedExcerpt> = aggregate
            .into_iter()
            .map(|(idx, (score, matched))| {
                expand(&corpus, &by_transcript, idx, score, matched.into_iter().collect())
            })
            .collect();

        if excerpts.is_empty() {
            log::info!("No keyword matches for '{}', sampling fallback context", query);
            excerpts = fallback_sample(&corpus, options);
        } else {
            excerpts.sort_by(|a, b| {
                b.score
                    .cmp(&a.score)
                    .then(a.video_id.cmp(&b.video_id))
                    .then(a.start.total_cmp(&b.start))
                    .then(a.segment_id.cmp(&b.segment_id))
            });
        }

        let mut seen = HashSet::new();
        excerpts.retain(|e| seen.insert((e.video_id, e.start.to_bits(), e.end.to_bits())));
        excerpts.truncate(options.limit);
        Ok(excerpts)
    }

    /// Segments of completed transcripts whose video is not known to
    /// predate `floor`.
    fn load_corpus(&self, floor: Option<i32>) -> Result<Vec<CorpusSegment>> {
        let mut stmt = self.conn.prepare(
            "SELECT v.id, v.title, t.id, s.id, s.start_time, s.end_time, s.text
             FROM transcript_segments s
             JOIN transcripts t ON t.id = s.transcript_id
             JOIN videos v ON v.id = t.video_id
             WHERE t.status = 'completed'
               AND t.id = (SELECT MAX(t2.id) FROM transcripts t2
                           WHERE t2.video_id = t.video_id AND t2.status = 'completed')
               AND (?1 IS NULL OR v.event_year IS NULL OR v.event_year >= ?1)
             ORDER BY v.id ASC, t.id ASC, s.start_time ASC, s.segment_index ASC",
        )?;
        let rows = stmt
            .query_map(params![floor], |row| {
                let text: String = row.get(6)?;
                Ok(CorpusSegment {
                    video_id: row.get(0)?,
                    video_title: row.get(1)?,
                    transcript_id: row.get(2)?,
                    segment_id: row.get(3)?,
                    start: row.get(4)?,
                    end: row.get(5)?,
                    lowered: text.to_lowercase(),
                    text,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

/// Corpus indices per transcript, already in chronological order.
fn index_by_transcript(corpus: &[CorpusSegment]) -> HashMap<i64, Vec<usize>> {
    let mut map: HashMap<i64, Vec<usize>> = HashMap::new();
    for (i, seg) in corpus.iter().enumerate() {
        map.entry(seg.transcript_id).or_default().push(i);
    }
    map
}

/// Widen a matched segment to every segment of its transcript overlapping
/// the context window around it.
fn expand(
    corpus: &[CorpusSegment],
    by_transcript: &HashMap<i64, Vec<usize>>,
    idx: usize,
    score: u32,
    matched_keywords: Vec<String>,
) -> RankedExcerpt {
    let seg = &corpus[idx];
    let window_start = seg.start - RANKER_CONTEXT_WINDOW_SECS;
    let window_end = seg.end + RANKER_CONTEXT_WINDOW_SECS;

    let neighbours: Vec<&CorpusSegment> = by_transcript
        .get(&seg.transcript_id)
        .map(|ids| {
            ids.iter()
                .map(|&i| &corpus[i])
                .filter(|s| s.end >= window_start && s.start <= window_end)
                .collect()
        })
        .unwrap_or_default();

    let start = neighbours.iter().map(|s| s.start).fold(seg.start, f64::min);
    let end = neighbours.iter().map(|s| s.end).fold(seg.end, f64::max);
    let text = neighbours
        .iter()
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    RankedExcerpt {
        video_id: seg.video_id,
        video_title: seg.video_title.clone(),
        transcript_id: seg.transcript_id,
        segment_id: seg.segment_id,
        start,
        end,
        text,
        score,
        matched_keywords,
    }
}

/// Unscored sample of long-enough segments, for queries nothing matched.
fn fallback_sample(corpus: &[CorpusSegment], options: RankOptions) -> Vec<RankedExcerpt> {
    let mut pool: Vec<&CorpusSegment> = corpus
        .iter()
        .filter(|s| s.text.trim().chars().count() as i64 >= RANKER_FALLBACK_MIN_TEXT_LEN)
        .take(RANKER_FALLBACK_POOL as usize)
        .collect();

    let mut rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    pool.shuffle(&mut rng);

    pool.into_iter()
        .take(options.limit)
        .map(|s| RankedExcerpt {
            video_id: s.video_id,
            video_title: s.video_title.clone(),
            transcript_id: s.transcript_id,
            segment_id: s.segment_id,
            start: s.start,
            end: s.end,
            text: s.text.trim().to_string(),
            score: 0,
            matched_keywords: Vec::new(),
        })
        .collect()
}

fn format_timestamp(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// Render excerpts as prompt context, one block per excerpt.
pub fn build_context(excerpts: &[RankedExcerpt]) -> String {
    excerpts
        .iter()
        .map(|e| {
            format!(
                "[{} @ {}-{}] {}",
                e.video_title,
                format_timestamp(e.start),
                format_timestamp(e.end),
                e.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::db::schema::{insert_transcript, insert_video, ArtifactStatus, NewSegment, NewVideo};

    fn add_video(conn: &Connection, title: &str, event_year: Option<i32>) -> i64 {
        insert_video(
            conn,
            &NewVideo {
                title: title.to_string(),
                filename: format!("{}.mp4", title),
                duration_seconds: Some(3600.0),
                event_year,
                ..Default::default()
            },
        )
        .unwrap()
    }

    /// Segments 60s apart so context windows never overlap.
    fn add_transcript(conn: &Connection, video_id: i64, texts: &[String]) {
        let segments: Vec<NewSegment> = texts
            .iter()
            .enumerate()
            .map(|(i, text)| NewSegment {
                start_time: i as f64 * 60.0,
                end_time: i as f64 * 60.0 + 5.0,
                text: text.clone(),
                confidence: None,
            })
            .collect();
        insert_transcript(conn, video_id, ArtifactStatus::Completed, Some("en"), &segments).unwrap();
    }

    fn texts(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{} number {}", prefix, i)).collect()
    }

    #[test]
    fn test_rarity_weights() {
        assert_eq!(rarity_weight(0), 0);
        assert_eq!(rarity_weight(1), 10);
        assert_eq!(rarity_weight(5), 10);
        assert_eq!(rarity_weight(6), 5);
        assert_eq!(rarity_weight(20), 5);
        assert_eq!(rarity_weight(50), 2);
        assert_eq!(rarity_weight(51), 1);
        assert_eq!(rarity_weight(300), 1);
    }

    #[test]
    fn test_rare_keyword_outranks_common_keyword() {
        let conn = open_in_memory().unwrap();
        let video = add_video(&conn, "farm", None);
        let mut all = texts("we saw the tractor", 200);
        all.extend(texts("a tiny hedgehog appeared", 3));
        add_transcript(&conn, video, &all);

        let ranker = TranscriptContextRanker::new(&conn);
        let results = ranker.rank("tractor hedgehog", RankOptions { limit: 10, seed: Some(1) }).unwrap();

        assert_eq!(results.len(), 10);
        for top in &results[..3] {
            assert_eq!(top.score, 10);
            assert_eq!(top.matched_keywords, vec!["hedgehog"]);
        }
        assert_eq!(results[3].score, 1);
    }

    #[test]
    fn test_caterpillar_1998_scenario() {
        let conn = open_in_memory().unwrap();
        let old = add_video(&conn, "old", Some(1995));
        let undated = add_video(&conn, "undated", None);
        let newer = add_video(&conn, "newer", Some(2001));

        // 300 matches of "garden" spread over eligible and ineligible videos
        add_transcript(&conn, old, &texts("garden caterpillar in the garden", 100));
        add_transcript(&conn, undated, &{
            let mut t = texts("caterpillar garden crawling", 2);
            t.extend(texts("the garden path", 150));
            t
        });
        add_transcript(&conn, newer, &{
            let mut t = texts("garden party", 48);
            t.extend(texts("a caterpillar sat here", 2));
            t
        });

        let ranker = TranscriptContextRanker::new(&conn);
        let results = ranker
            .rank("caterpillar garden 1998", RankOptions { limit: 20, seed: Some(7) })
            .unwrap();

        // The 1995 video is excluded; the undated one never is
        assert!(results.iter().all(|r| r.video_id != old));
        assert!(results.iter().any(|r| r.video_id == undated));

        // 4 caterpillar hits (weight 10, plus garden weight 1 where both occur)
        // sit above everything matching only "garden"
        let caterpillar: Vec<_> = results
            .iter()
            .take_while(|r| r.matched_keywords.iter().any(|k| k == "caterpillar"))
            .collect();
        assert_eq!(caterpillar.len(), 4);
        assert!(results[4..].iter().all(|r| r.score == 1));
        assert_eq!(results[0].video_id, undated);
        assert_eq!(results[0].score, 11);
    }

    #[test]
    fn test_expansion_joins_neighbouring_segments() {
        let conn = open_in_memory().unwrap();
        let video = add_video(&conn, "talk", None);
        let segments = vec![
            NewSegment { start_time: 0.0, end_time: 10.0, text: "before".into(), confidence: None },
            NewSegment { start_time: 10.0, end_time: 20.0, text: "the unicorn".into(), confidence: None },
            NewSegment { start_time: 30.0, end_time: 34.0, text: "after".into(), confidence: None },
            NewSegment { start_time: 80.0, end_time: 90.0, text: "far away".into(), confidence: None },
        ];
        insert_transcript(&conn, video, ArtifactStatus::Completed, None, &segments).unwrap();

        let results = TranscriptContextRanker::new(&conn)
            .rank("unicorn", RankOptions::default())
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "before the unicorn after");
        assert_eq!((results[0].start, results[0].end), (0.0, 34.0));
    }

    #[test]
    fn test_incomplete_transcripts_are_ignored() {
        let conn = open_in_memory().unwrap();
        let video = add_video(&conn, "draft", None);
        let segments = vec![NewSegment { start_time: 0.0, end_time: 1.0, text: "secret zebra".into(), confidence: None }];
        insert_transcript(&conn, video, ArtifactStatus::Processing, None, &segments).unwrap();

        let results = TranscriptContextRanker::new(&conn).rank("zebra", RankOptions::default()).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_only_newest_completed_transcript_is_searched() {
        let conn = open_in_memory().unwrap();
        let video = add_video(&conn, "retake", None);
        add_transcript(&conn, video, &["first pass zebra".to_string()]);
        add_transcript(&conn, video, &["second pass zebra".to_string()]);
        let segments = vec![NewSegment { start_time: 0.0, end_time: 1.0, text: "draft zebra".into(), confidence: None }];
        insert_transcript(&conn, video, ArtifactStatus::Processing, None, &segments).unwrap();

        let results = TranscriptContextRanker::new(&conn).rank("zebra", RankOptions::default()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "second pass zebra");
    }

    #[test]
    fn test_fallback_sample_is_seeded_and_bounded() {
        let conn = open_in_memory().unwrap();
        let video = add_video(&conn, "misc", None);
        let mut all = texts("this sentence is comfortably longer than forty characters", 30);
        all.push("too short".to_string());
        add_transcript(&conn, video, &all);

        let ranker = TranscriptContextRanker::new(&conn);
        let options = RankOptions { limit: 5, seed: Some(42) };
        let first = ranker.rank("nothing matches xylophone", options).unwrap();
        let second = ranker.rank("nothing matches xylophone", options).unwrap();

        assert_eq!(first.len(), 5);
        assert_eq!(first, second);
        assert!(first.iter().all(|e| e.score == 0 && e.matched_keywords.is_empty()));
        assert!(first.iter().all(|e| e.text.len() >= 40));
    }

    #[test]
    fn test_build_context_format() {
        let excerpt = RankedExcerpt {
            video_id: 1,
            video_title: "Beach Day".into(),
            transcript_id: 1,
            segment_id: 1,
            start: 65.0,
            end: 130.4,
            text: "waves".into(),
            score: 10,
            matched_keywords: vec!["waves".into()],
        };
        assert_eq!(build_context(&[excerpt.clone(), excerpt]), "[Beach Day @ 01:05-02:10] waves\n\n[Beach Day @ 01:05-02:10] waves");
    }
}
