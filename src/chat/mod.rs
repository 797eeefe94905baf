use crate::config::Config;
use crate::conversation::{
    ConversationState, ConversationStateEngine, ConversationTurn, StateSeries, TokenOverlapScorer,
    TurnStore,
};
use crate::error::{GeistError, Result};
use crate::llm::LlmGateway;
use crate::persona::StyleProfile;
use crate::prompt::{PromptComposer, realtime_seed};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

const FALLBACK_REPLY: &str =
    "Sorry, I'm having trouble reaching my language model right now. Give me a moment and try again.";

/// One completed exchange, as handed back to the caller.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub turn: ConversationTurn,
    /// False when the backend failed and the apology fallback was used.
    pub generated: bool,
}

/// Ties the pieces together: scores each incoming message, composes a
/// persona-conditioned prompt, calls the gateway, and records the turn.
///
/// Sessions are created on first use. A backend failure never loses the turn;
/// the exchange is recorded with a fallback reply and the tone state still
/// advances, since drift is a property of the user's message, not the reply.
pub struct ChatAssistant {
    engine: ConversationStateEngine,
    gateway: Arc<LlmGateway>,
    turns: Arc<TurnStore>,
    profile: StyleProfile,
    anchors: BTreeSet<String>,
    model: String,
    max_tokens: u32,
    history_limit: usize,
    sessions: Mutex<HashMap<String, Arc<tokio::sync::Mutex<ConversationState>>>>,
}

impl ChatAssistant {
    pub fn new(
        config: &Config,
        gateway: Arc<LlmGateway>,
        turns: Arc<TurnStore>,
        profile: StyleProfile,
    ) -> Self {
        // Anchor set: configured seed topics plus the persona's common words,
        // so a session is on-topic for whatever its owner habitually talks
        // about.
        let mut anchors: BTreeSet<String> = config
            .chat
            .anchor_topics
            .iter()
            .map(|t| t.to_lowercase())
            .collect();
        anchors.extend(profile.common_words.iter().map(|w| w.to_lowercase()));

        Self {
            engine: ConversationStateEngine::new(config.tone.clone(), Box::new(TokenOverlapScorer)),
            gateway,
            turns,
            profile,
            anchors,
            model: config.llm.chat_model().to_string(),
            max_tokens: config.llm.max_tokens,
            history_limit: config.chat.history_limit,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn session(&self, session_id: &str, strict: bool) -> Arc<tokio::sync::Mutex<ConversationState>> {
        let mut sessions = self.sessions.lock().expect("session map poisoned");
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(session_id, strict, "New chat session");
                Arc::new(tokio::sync::Mutex::new(ConversationState::new(
                    session_id, strict,
                )))
            })
            .clone()
    }

    /// Handle one user message end to end. `strict` only matters for a
    /// session's first message; an existing session keeps its enforcement
    /// mode.
    pub async fn chat(&self, session_id: &str, message: &str, strict: bool) -> Result<ChatReply> {
        self.chat_seeded(session_id, message, strict, realtime_seed())
            .await
    }

    /// Like [`ChatAssistant::chat`] with an explicit prompt seed, for
    /// reproducible runs.
    pub async fn chat_seeded(
        &self,
        session_id: &str,
        message: &str,
        strict: bool,
        seed: u64,
    ) -> Result<ChatReply> {
        let session = self.session(session_id, strict);
        let mut state = session.lock().await;

        self.engine.update_state(&mut state, &self.anchors, message);
        // Prior exchanges ride along so the reply can refer back to them.
        let recent = self.turns.turns(session_id, Some(self.history_limit))?;
        let prompt =
            PromptComposer::compose_with_history(&self.profile, &state, &recent, message, seed)?;

        let (reply, generated) = match self
            .gateway
            .generate(&prompt, &self.model, self.max_tokens)
            .await
        {
            Ok(text) => (text, true),
            Err(e) => {
                tracing::warn!(session_id, error = %e, "Generation failed, using fallback reply");
                (FALLBACK_REPLY.to_string(), false)
            }
        };

        let turn = self
            .turns
            .append_turn(message, &reply, &state)
            .map_err(GeistError::from)?;
        Ok(ChatReply { turn, generated })
    }

    pub fn history(&self, session_id: &str) -> Result<Vec<ConversationTurn>> {
        Ok(self.turns.turns(session_id, Some(self.history_limit))?)
    }

    /// History with an explicit cap, for callers that page themselves.
    pub fn turns(&self, session_id: &str, limit: Option<usize>) -> Result<Vec<ConversationTurn>> {
        Ok(self.turns.turns(session_id, limit)?)
    }

    pub fn state_series(&self, session_id: &str) -> Result<StateSeries> {
        Ok(self.turns.state_series(session_id)?)
    }

    /// Snapshot of a live session's tone state, if the session exists.
    pub async fn session_state(&self, session_id: &str) -> Option<ConversationState> {
        let session = {
            let sessions = self.sessions.lock().expect("session map poisoned");
            sessions.get(session_id).cloned()
        }?;
        let state = session.lock().await;
        Some(state.clone())
    }

    pub fn profile(&self) -> &StyleProfile {
        &self.profile
    }

    pub fn anchors(&self) -> &BTreeSet<String> {
        &self.anchors
    }
}
