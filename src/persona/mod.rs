mod store;

pub use store::StyleProfileStore;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use strum::{Display, EnumString};

/// Overall register the user prefers their replies in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResponseStyle {
    #[default]
    Concise,
    Detailed,
    Witty,
    Technical,
}

/// Persona descriptor extracted offline from the user's chat history.
///
/// Immutable once loaded for a session; the extraction pipeline that produces
/// the JSON file is an external collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StyleProfile {
    /// Average sentence length of the user's own messages, in words.
    #[serde(default)]
    pub avg_sentence_length: f64,
    #[serde(default)]
    pub response_style: ResponseStyle,
    /// Ordered by extraction frequency, most common first.
    #[serde(default)]
    pub common_phrases: Vec<String>,
    #[serde(default)]
    pub common_words: BTreeSet<String>,
}

impl StyleProfile {
    /// Usable stand-in for when no profile has been extracted yet. Unlike
    /// [`StyleProfile::default`], this one carries enough material for prompt
    /// composition to succeed.
    pub fn neutral() -> Self {
        Self {
            avg_sentence_length: 0.0,
            response_style: ResponseStyle::Concise,
            common_phrases: vec![
                "sounds good".into(),
                "fair enough".into(),
                "let's see".into(),
            ],
            common_words: BTreeSet::new(),
        }
    }
}
