use crate::conversation::{ConversationState, ConversationTurn};
use crate::error::ComposeError;
use crate::persona::{ResponseStyle, StyleProfile};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{SystemTime, UNIX_EPOCH};

/// Seed for real-time invocations: non-repeating across calls, so no two
/// live prompts are identical even for the same profile and state.
pub fn realtime_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos() & u128::from(u64::MAX)).unwrap_or_default())
        .unwrap_or_default()
}

const STYLE_CONCISE: &[&str] = &[
    "Answer briefly and get to the point.",
    "Keep the reply short; no filler.",
    "Respond in as few sentences as the answer allows.",
];
const STYLE_DETAILED: &[&str] = &[
    "Give a thorough answer with the relevant background.",
    "Explain fully, covering the edge cases worth knowing.",
    "Walk through the answer step by step.",
];
const STYLE_WITTY: &[&str] = &[
    "Keep the reply light and witty where it fits.",
    "A dry aside is welcome, but never at the cost of the answer.",
    "Answer with some humor in the margins.",
];
const STYLE_TECHNICAL: &[&str] = &[
    "Be precise and technical; cite concrete mechanisms.",
    "Use exact terminology and skip the analogies.",
    "Answer like an engineer reviewing a design doc.",
];

const TONE_NEUTRAL: &[&str] = &[
    "Keep a friendly, even tone.",
    "Stay warm and matter-of-fact.",
];
const TONE_REDIRECT: &[&str] = &[
    "The user keeps drifting off topic; gently steer them back.",
    "Nudge the conversation back toward the session's topic without scolding.",
];
const TONE_SHARP: &[&str] = &[
    "Patience has run out: be terse and a little sharp.",
    "Reply curtly; the patience for pleasantries is gone.",
];
const TONE_CORRECTIVE: &[&str] = &[
    "Strict mode: respond with a firm, corrective tone and restate the topic.",
    "Correct the drift plainly and restate what this session is about. No sarcasm.",
];

/// Builds the generation request from persona, tone state, and a seed.
///
/// Byte-identical output for identical (profile, state, message, seed);
/// guaranteed-distinct output for distinct seeds (the seed is woven in as a
/// variation token, and also drives phrase and wording selection).
pub struct PromptComposer;

impl PromptComposer {
    pub fn compose(
        profile: &StyleProfile,
        state: &ConversationState,
        user_message: &str,
        seed: u64,
    ) -> Result<String, ComposeError> {
        Self::compose_with_history(profile, state, &[], user_message, seed)
    }

    /// Compose with prior exchanges embedded, so the reply can refer back to
    /// earlier turns in the session.
    pub fn compose_with_history(
        profile: &StyleProfile,
        state: &ConversationState,
        history: &[ConversationTurn],
        user_message: &str,
        seed: u64,
    ) -> Result<String, ComposeError> {
        if profile.common_phrases.is_empty() {
            return Err(ComposeError::MissingField("common_phrases"));
        }
        if !profile.avg_sentence_length.is_finite() || profile.avg_sentence_length < 0.0 {
            return Err(ComposeError::MissingField("avg_sentence_length"));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let style = pick(&mut rng, style_pool(profile.response_style));
        let phrase = pick(&mut rng, &profile.common_phrases);
        let tone = pick(&mut rng, tone_pool(state));

        let mut prompt = String::new();
        prompt.push_str("You are Geist, a personal assistant that mirrors the user's voice.\n");
        prompt.push_str(style);
        prompt.push('\n');
        if profile.avg_sentence_length > 0.0 {
            prompt.push_str(&format!(
                "Aim for sentences around {:.0} words, like the user writes.\n",
                profile.avg_sentence_length
            ));
        }
        prompt.push_str(&format!(
            "Work the phrase \"{phrase}\" in naturally where it fits.\n"
        ));
        prompt.push_str(tone);
        prompt.push('\n');
        // Injective in the seed, so two different seeds can never collide
        // even when every pool pick happens to agree.
        prompt.push_str(&format!(
            "Variation token (ignore, never echo): {seed:016x}\n"
        ));
        if !history.is_empty() {
            prompt.push_str("\nRecent conversation:\n");
            for turn in history {
                prompt.push_str(&format!("User: {}\n", turn.user_text));
                prompt.push_str(&format!("Geist: {}\n", turn.assistant_text));
            }
        }
        prompt.push_str(&format!("\nUser: {user_message}"));
        Ok(prompt)
    }
}

fn style_pool(style: ResponseStyle) -> &'static [&'static str] {
    match style {
        ResponseStyle::Concise => STYLE_CONCISE,
        ResponseStyle::Detailed => STYLE_DETAILED,
        ResponseStyle::Witty => STYLE_WITTY,
        ResponseStyle::Technical => STYLE_TECHNICAL,
    }
}

fn tone_pool(state: &ConversationState) -> &'static [&'static str] {
    if state.corrective {
        TONE_CORRECTIVE
    } else if state.snark >= 0.5 {
        TONE_SHARP
    } else if state.consecutive_off_topic >= 2 {
        TONE_REDIRECT
    } else {
        TONE_NEUTRAL
    }
}

fn pick<'a, S: AsRef<str> + 'a>(rng: &mut StdRng, pool: &'a [S]) -> &'a str {
    pool[rng.random_range(0..pool.len())].as_ref()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> StyleProfile {
        StyleProfile {
            avg_sentence_length: 12.0,
            response_style: ResponseStyle::Witty,
            common_phrases: vec![
                "to be fair".into(),
                "in a nutshell".into(),
                "at the end of the day".into(),
            ],
            common_words: ["rust", "coffee"].into_iter().map(String::from).collect(),
        }
    }

    #[test]
    fn identical_inputs_are_byte_identical() {
        let state = ConversationState::new("s1", false);
        let a = PromptComposer::compose(&profile(), &state, "hello", 42).unwrap();
        let b = PromptComposer::compose(&profile(), &state, "hello", 42).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_seeds_always_differ() {
        let state = ConversationState::new("s1", false);
        let p = profile();
        let mut seen = std::collections::HashSet::new();
        for seed in 0..64 {
            let prompt = PromptComposer::compose(&p, &state, "hello", seed).unwrap();
            assert!(seen.insert(prompt), "seed {seed} collided");
        }
    }

    #[test]
    fn embeds_a_profile_phrase() {
        let state = ConversationState::new("s1", false);
        let p = profile();
        let prompt = PromptComposer::compose(&p, &state, "hello", 7).unwrap();
        assert!(p.common_phrases.iter().any(|ph| prompt.contains(ph.as_str())));
    }

    #[test]
    fn high_snark_turns_the_tone_sharp() {
        let mut state = ConversationState::new("s1", false);
        state.snark = 0.75;
        let prompt = PromptComposer::compose(&profile(), &state, "hello", 7).unwrap();
        assert!(TONE_SHARP.iter().any(|t| prompt.contains(t)));
    }

    #[test]
    fn off_topic_streak_redirects() {
        let mut state = ConversationState::new("s1", false);
        state.consecutive_off_topic = 2;
        let prompt = PromptComposer::compose(&profile(), &state, "hello", 7).unwrap();
        assert!(TONE_REDIRECT.iter().any(|t| prompt.contains(t)));
    }

    #[test]
    fn corrective_flag_wins_over_snark() {
        let mut state = ConversationState::new("s1", true);
        state.corrective = true;
        state.snark = 0.0;
        let prompt = PromptComposer::compose(&profile(), &state, "hello", 7).unwrap();
        assert!(TONE_CORRECTIVE.iter().any(|t| prompt.contains(t)));
        assert!(!TONE_SHARP.iter().any(|t| prompt.contains(t)));
    }

    #[test]
    fn empty_phrase_list_is_a_composition_error() {
        let state = ConversationState::new("s1", false);
        let p = StyleProfile {
            common_phrases: Vec::new(),
            ..profile()
        };
        let err = PromptComposer::compose(&p, &state, "hello", 7).unwrap_err();
        assert!(matches!(err, ComposeError::MissingField("common_phrases")));
    }

    #[test]
    fn negative_sentence_length_is_a_composition_error() {
        let state = ConversationState::new("s1", false);
        let p = StyleProfile {
            avg_sentence_length: -1.0,
            ..profile()
        };
        assert!(PromptComposer::compose(&p, &state, "hello", 7).is_err());
    }

    #[test]
    fn history_turns_are_embedded_in_order() {
        let state = ConversationState::new("s1", false);
        let turn = |seq, user: &str, assistant: &str| ConversationTurn {
            session_id: "s1".into(),
            seq,
            user_text: user.into(),
            assistant_text: assistant.into(),
            created_at: chrono::Utc::now(),
            state: state.clone(),
        };
        let history = vec![
            turn(1, "what is a lifetime?", "a borrow's validity region"),
            turn(2, "and a region?", "the span the borrow covers"),
        ];

        let prompt = PromptComposer::compose_with_history(
            &profile(),
            &state,
            &history,
            "give an example",
            7,
        )
        .unwrap();

        let first = prompt.find("what is a lifetime?").unwrap();
        let second = prompt.find("and a region?").unwrap();
        assert!(first < second);
        assert!(prompt.contains("a borrow's validity region"));
        assert!(prompt.ends_with("User: give an example"));
    }

    #[test]
    fn empty_history_matches_plain_compose() {
        let state = ConversationState::new("s1", false);
        let plain = PromptComposer::compose(&profile(), &state, "hello", 42).unwrap();
        let with = PromptComposer::compose_with_history(&profile(), &state, &[], "hello", 42)
            .unwrap();
        assert_eq!(plain, with);
    }

    #[test]
    fn user_message_is_embedded() {
        let state = ConversationState::new("s1", false);
        let prompt =
            PromptComposer::compose(&profile(), &state, "what is a lifetime?", 7).unwrap();
        assert!(prompt.ends_with("User: what is a lifetime?"));
    }
}
