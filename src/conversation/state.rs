use super::topic::TopicScorer;
use crate::config::ToneConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Per-session tone state. Exclusively owned by one session and mutated only
/// by [`ConversationStateEngine`]; concurrent turns for the same session must
/// be serialized by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub session_id: String,
    /// Remaining tolerance for topic drift. 1.0 = fresh, 0.0 = depleted.
    pub patience: f64,
    /// Escalating sharpness of tone; relaxes again as on-topic messages
    /// restore patience. Stays 0.0 under strict enforcement.
    pub snark: f64,
    /// Last computed topic similarity, in [0, 100].
    pub topic_match_score: f64,
    /// Suppresses snark escalation in favor of corrective responses.
    pub strict_enforcement: bool,
    pub consecutive_off_topic: u32,
    /// Set instead of snark when a strict session's patience bottoms out;
    /// cleared once recovery lifts patience off the floor.
    pub corrective: bool,
}

impl ConversationState {
    pub fn new(session_id: impl Into<String>, strict_enforcement: bool) -> Self {
        Self {
            session_id: session_id.into(),
            patience: 1.0,
            snark: 0.0,
            topic_match_score: 100.0,
            strict_enforcement,
            consecutive_off_topic: 0,
            corrective: false,
        }
    }

    /// Restore initial values, keeping the session id and enforcement mode.
    pub fn reset(&mut self) {
        let strict = self.strict_enforcement;
        *self = Self::new(std::mem::take(&mut self.session_id), strict);
    }
}

/// The tone state machine: Neutral → Impatient → Depleted-Snarky or
/// Depleted-Strict, driven by topic drift. There is no terminal state; a
/// session persists until externally torn down.
pub struct ConversationStateEngine {
    tuning: ToneConfig,
    scorer: Box<dyn TopicScorer>,
}

impl ConversationStateEngine {
    pub fn new(tuning: ToneConfig, scorer: Box<dyn TopicScorer>) -> Self {
        Self { tuning, scorer }
    }

    /// Score `message` against the session's anchor topics and fold the
    /// result into `state`. Pure given (state, message, score): no side
    /// effects beyond the session's own state.
    pub fn update_state<'a>(
        &self,
        state: &'a mut ConversationState,
        anchors: &BTreeSet<String>,
        message: &str,
    ) -> &'a ConversationState {
        let score = self.scorer.score(message, anchors).clamp(0.0, 100.0);
        self.apply_score(state, score);
        state
    }

    /// Fold an already-computed topic score into the state. Exposed so the
    /// scoring collaborator can be swapped out in tests.
    pub fn apply_score(&self, state: &mut ConversationState, score: f64) {
        let score = score.clamp(0.0, 100.0);
        state.topic_match_score = score;

        if score < self.tuning.relevance_cutoff {
            state.consecutive_off_topic += 1;
        } else {
            state.consecutive_off_topic = 0;
            state.patience = (state.patience + self.tuning.recovery).min(1.0);
            // Depleted tone is keyed on current patience, not history: once
            // the session earns some back, snark relaxes at the same rate and
            // the corrective flag lifts.
            state.snark = (state.snark - self.tuning.recovery).max(0.0);
            if state.patience > 0.0 {
                state.corrective = false;
            }
        }

        if state.consecutive_off_topic >= self.tuning.repeat_threshold {
            state.patience = (state.patience - self.tuning.decay_rate).max(0.0);
            state.consecutive_off_topic = 0;

            if state.patience <= 0.0 {
                if state.strict_enforcement {
                    // Strict mode overrides snark unconditionally.
                    state.snark = 0.0;
                    state.corrective = true;
                } else {
                    state.snark = (state.snark + self.tuning.snark_increment).min(1.0);
                }
            }
        }
    }
}
