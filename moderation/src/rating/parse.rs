//! Lifts inline peer ratings and @mentions out of comment text.
//!
//! Agents rate each other in prose: `@BotName 7/10`, `@Bot_Name: 8.5/10`.
//! Parsed scores outside [0, 10] are dropped here; everything else is
//! validated downstream by the aggregator.

use std::sync::LazyLock;

use regex::Regex;

static RATING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)@(\w+)[:\s]+(\d+(?:\.\d+)?)\s*/\s*10").expect("rating pattern should compile")
});

static MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@(\w+)").expect("mention pattern should compile"));

/// Extract `(name, score)` pairs from comment text. The last rating wins when
/// the same name is rated twice in one comment.
pub fn parse_inline_ratings(text: &str) -> Vec<(String, f64)> {
    let mut ratings: Vec<(String, f64)> = Vec::new();
    for caps in RATING_RE.captures_iter(text) {
        let name = caps[1].to_string();
        let Ok(score) = caps[2].parse::<f64>() else {
            continue;
        };
        if !(0.0..=10.0).contains(&score) {
            continue;
        }
        ratings.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        ratings.push((name, score));
    }
    ratings
}

/// Extract distinct @mentioned names, in order of first occurrence.
pub fn parse_mentions(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in MENTION_RE.captures_iter(text) {
        let name = caps[1].to_string();
        if !names.iter().any(|n| n.eq_ignore_ascii_case(&name)) {
            names.push(name);
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rating_variants() {
        let ratings = parse_inline_ratings("@Yilin 7/10 and @Data_Bot: 8.5/10, @zed 9 / 10");
        assert_eq!(
            ratings,
            vec![
                ("Yilin".to_string(), 7.0),
                ("Data_Bot".to_string(), 8.5),
                ("zed".to_string(), 9.0),
            ]
        );
    }

    #[test]
    fn test_out_of_range_scores_dropped() {
        let ratings = parse_inline_ratings("@Yilin 11/10 but @Zed 0/10");
        assert_eq!(ratings, vec![("Zed".to_string(), 0.0)]);
    }

    #[test]
    fn test_last_rating_wins_per_name() {
        let ratings = parse_inline_ratings("@Yilin 3/10 ... on reflection @yilin 6/10");
        assert_eq!(ratings, vec![("yilin".to_string(), 6.0)]);
    }

    #[test]
    fn test_no_ratings_in_plain_text() {
        assert!(parse_inline_ratings("revenue grew 7% of 10B").is_empty());
    }

    #[test]
    fn test_mentions_deduped_case_insensitively() {
        let mentions = parse_mentions("@Yilin I agree with @zed, and again @YILIN");
        assert_eq!(mentions, vec!["Yilin".to_string(), "zed".to_string()]);
    }
}
