// Query keyword extraction

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::constants::{
    RANKER_MAX_KEYWORDS, RANKER_MIN_KEYWORD_LEN, RANKER_RECENCY_WORDS, RANKER_RECENCY_YEAR,
    RANKER_STOP_WORDS,
};

/// 1900-2099 as a standalone token.
static YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").unwrap());

fn is_year(word: &str) -> bool {
    word.len() == 4 && YEAR.is_match(word)
}

/// Distinct lowercase keywords in query order, capped.
pub fn extract_keywords(query: &str) -> Vec<String> {
    let lowered = query.to_lowercase();
    let mut seen = HashSet::new();
    let mut keywords = Vec::new();

    for word in lowered.split(|c: char| !c.is_alphanumeric()) {
        if word.chars().count() < RANKER_MIN_KEYWORD_LEN
            || RANKER_STOP_WORDS.contains(&word)
            || is_year(word)
        {
            continue;
        }
        if seen.insert(word) {
            keywords.push(word.to_string());
            if keywords.len() == RANKER_MAX_KEYWORDS {
                break;
            }
        }
    }
    keywords
}

/// Earliest event year a query asks for: the smallest literal year, else a
/// fixed floor when the query asks for recent material.
pub fn year_floor(query: &str) -> Option<i32> {
    let literal = YEAR
        .find_iter(query)
        .filter_map(|m| m.as_str().parse::<i32>().ok())
        .min();
    if literal.is_some() {
        return literal;
    }

    let lowered = query.to_lowercase();
    let recent = lowered
        .split(|c: char| !c.is_alphanumeric())
        .any(|w| RANKER_RECENCY_WORDS.contains(&w));
    recent.then_some(RANKER_RECENCY_YEAR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords_drop_short_stop_and_year_tokens() {
        assert_eq!(
            extract_keywords("Show me the Caterpillar videos from 1998, caterpillar!"),
            vec!["caterpillar"]
        );
        assert_eq!(extract_keywords("go to NYC at 5 pm"), vec!["nyc"]);
    }

    #[test]
    fn test_keywords_preserve_order_and_cap() {
        let query = (0..20).map(|i| format!("word{:02}", i)).collect::<Vec<_>>().join(" ");
        let keywords = extract_keywords(&query);
        assert_eq!(keywords.len(), RANKER_MAX_KEYWORDS);
        assert_eq!(keywords[0], "word00");
        assert_eq!(keywords[14], "word14");
    }

    #[test]
    fn test_year_floor() {
        assert_eq!(year_floor("caterpillar 1998"), Some(1998));
        assert_eq!(year_floor("between 2005 and 2001"), Some(2001));
        assert_eq!(year_floor("the latest trip"), Some(RANKER_RECENCY_YEAR));
        assert_eq!(year_floor("recent stuff from 1999"), Some(1999));
        assert_eq!(year_floor("room 12345 and 3000"), None);
        assert_eq!(year_floor("birthday party"), None);
    }
}
