use std::collections::BTreeSet;

/// Similarity collaborator for the state engine. Implementations map a
/// message and the session's anchor topic set to a score in [0, 100]; the
/// engine only consumes the score.
pub trait TopicScorer: Send + Sync {
    fn score(&self, message: &str, anchors: &BTreeSet<String>) -> f64;
}

/// Default scorer: share of the message's distinct content tokens that appear
/// in the anchor set. Tokens shorter than four characters are treated as
/// filler and ignored.
pub struct TokenOverlapScorer;

const MIN_TOKEN_LEN: usize = 4;

fn content_tokens(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|t| t.len() >= MIN_TOKEN_LEN)
        .collect()
}

impl TopicScorer for TokenOverlapScorer {
    fn score(&self, message: &str, anchors: &BTreeSet<String>) -> f64 {
        // No anchors means nothing to drift from.
        if anchors.is_empty() {
            return 100.0;
        }
        let tokens = content_tokens(message);
        if tokens.is_empty() {
            return 0.0;
        }
        let matched = tokens.iter().filter(|t| anchors.contains(*t)).count();
        #[allow(clippy::cast_precision_loss)]
        let score = 100.0 * matched as f64 / tokens.len() as f64;
        score.clamp(0.0, 100.0)
    }
}
