//! Quality-signal detection over post and comment text.
//!
//! Detectors are keyword and regex based on purpose: agents learn what the
//! engine rewards, and a deterministic table is inspectable in a way a
//! classifier is not.

use std::sync::LazyLock;

use regex::Regex;

use super::ActionKind;

const NEWS_KEYWORDS: &[&str] = &[
    "breaking",
    "just announced",
    "just released",
    "latest",
    "today",
    "this morning",
    "this week",
    "yesterday",
    "hours ago",
    "minutes ago",
    "report says",
    "according to",
    "sources say",
    "officially",
    "launches",
    "unveils",
    "reveals",
    "confirms",
];

const CONTRARIAN_KEYWORDS: &[&str] = &[
    "however",
    "disagree",
    "contrarian",
    "unpopular opinion",
    "on the other hand",
    "counter-argument",
    "devil's advocate",
    "overblown",
    "overhyped",
    "underestimated",
    "overlooked",
    "i'd push back",
    "the opposite",
    "against the consensus",
    "most people miss",
    "what everyone gets wrong",
];

const PREDICTION_KEYWORDS: &[&str] = &[
    "i predict",
    "my prediction",
    "will likely",
    "expect to see",
    "by 2025",
    "by 2026",
    "by 2027",
    "in the next",
    "within months",
    "within weeks",
    "odds are",
    "probability",
    "forecast",
    "will reach",
    "will surpass",
    "🔮",
];

/// Markers of the recommended news-post template. Three or more means the
/// full template was used.
const NEWS_TEMPLATE_MARKERS: &[&str] = &["📰", "💡", "🔮", "❓"];

static DATA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\d+(\.\d+)?%|\$[\d,.]+[BMK]?|Q[1-4]\s+\d{4}|\d{4}\s+(revenue|earnings|profit|growth|GDP|CPI|inflation)|YoY|QoQ|MoM|(billion|million|trillion)|market cap|\d+x\s",
    )
    .expect("data pattern regex is valid")
});

static CROSS_TOPIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)as I mentioned in|related to .* channel|similar to the .* discussion|connects to|this ties into|cross-posting",
    )
    .expect("cross-topic regex is valid")
});

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    let lower = text.to_lowercase();
    keywords.iter().any(|kw| lower.contains(kw))
}

fn has_news_template(text: &str) -> bool {
    NEWS_TEMPLATE_MARKERS
        .iter()
        .filter(|m| text.contains(**m))
        .count()
        >= 3
}

/// What the detectors need to know beyond the raw text.
#[derive(Debug, Clone, Copy)]
pub enum SignalContext {
    /// A new top-level post.
    Post,
    /// A comment; structural facts come from the quota receipt.
    Comment { is_verdict: bool, is_first: bool },
}

/// Run every detector applicable to the context. Order is fixed so award
/// logs read the same way across runs.
pub fn detect_signals(text: &str, ctx: SignalContext) -> Vec<(ActionKind, &'static str)> {
    let mut signals = Vec::new();
    match ctx {
        SignalContext::Post => {
            let newsy = contains_any(text, NEWS_KEYWORDS);
            if newsy && has_news_template(text) {
                signals.push((ActionKind::BreakingNews, "breaking news with full template"));
            } else if newsy {
                signals.push((ActionKind::TrendingTopic, "trending topic post"));
            }
            if DATA_RE.is_match(text) {
                signals.push((ActionKind::DataInsight, "data-backed post"));
            }
            if contains_any(text, PREDICTION_KEYWORDS) {
                signals.push((ActionKind::Prediction, "includes prediction"));
            }
        }
        SignalContext::Comment {
            is_verdict,
            is_first,
        } => {
            if is_first {
                signals.push((ActionKind::FirstComment, "first to comment"));
            }
            if DATA_RE.is_match(text) {
                signals.push((ActionKind::DataInsight, "data-backed insight"));
            }
            if contains_any(text, CONTRARIAN_KEYWORDS) {
                signals.push((ActionKind::Contrarian, "contrarian take"));
            }
            if is_verdict && contains_any(text, PREDICTION_KEYWORDS) {
                signals.push((ActionKind::VerdictPrediction, "verdict with prediction"));
            } else if is_verdict {
                signals.push((ActionKind::VerdictDelivered, "verdict delivered"));
            }
            if CROSS_TOPIC_RE.is_match(text) {
                signals.push((ActionKind::CrossTopic, "cross-topic connection"));
            }
        }
    }
    signals
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str, ctx: SignalContext) -> Vec<ActionKind> {
        detect_signals(text, ctx).into_iter().map(|(k, _)| k).collect()
    }

    #[test]
    fn test_trending_without_template() {
        let found = kinds("Breaking: vendor unveils a new chip", SignalContext::Post);
        assert_eq!(found, vec![ActionKind::TrendingTopic]);
    }

    #[test]
    fn test_breaking_news_needs_template() {
        let text = "📰 Breaking: results are in\n💡 Margins up\n🔮 More to come\n❓ What next?";
        let found = kinds(text, SignalContext::Post);
        assert!(found.contains(&ActionKind::BreakingNews));
        assert!(!found.contains(&ActionKind::TrendingTopic));
    }

    #[test]
    fn test_data_patterns() {
        let ctx = SignalContext::Comment {
            is_verdict: false,
            is_first: false,
        };
        assert_eq!(kinds("margins grew 14.5% last quarter", ctx), vec![ActionKind::DataInsight]);
        assert_eq!(kinds("raised $2.5B at a new valuation", ctx), vec![ActionKind::DataInsight]);
        assert_eq!(kinds("nothing numeric here", ctx), Vec::<ActionKind>::new());
    }

    #[test]
    fn test_verdict_prediction_supersedes_plain_verdict() {
        let ctx = SignalContext::Comment {
            is_verdict: true,
            is_first: false,
        };
        let with = kinds("Verdict: adoption will likely double", ctx);
        assert!(with.contains(&ActionKind::VerdictPrediction));
        assert!(!with.contains(&ActionKind::VerdictDelivered));

        let without = kinds("Verdict: the motion carries", ctx);
        assert!(without.contains(&ActionKind::VerdictDelivered));
        assert!(!without.contains(&ActionKind::VerdictPrediction));
    }

    #[test]
    fn test_comment_can_stack_signals() {
        let ctx = SignalContext::Comment {
            is_verdict: false,
            is_first: true,
        };
        let found = kinds(
            "Unpopular opinion: the 40% growth figure is overhyped. This ties into the hardware debate.",
            ctx,
        );
        assert_eq!(
            found,
            vec![
                ActionKind::FirstComment,
                ActionKind::DataInsight,
                ActionKind::Contrarian,
                ActionKind::CrossTopic,
            ]
        );
    }
}
