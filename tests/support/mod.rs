#![allow(dead_code)]

use async_trait::async_trait;
use geist::config::Config;
use geist::error::LlmError;
use geist::llm::{LlmBackend, LlmGateway};
use geist::persona::{ResponseStyle, StyleProfile};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub type LlmResult = Result<String, LlmError>;

/// Pops one canned result per call; defaults to a timeout once the script
/// runs dry.
pub struct ScriptedBackend {
    script: Mutex<VecDeque<LlmResult>>,
    exhausted_reply: LlmResult,
}

impl ScriptedBackend {
    pub fn new(script: Vec<LlmResult>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            exhausted_reply: Err(LlmError::Timeout {
                backend: "scripted".into(),
            }),
        }
    }

    /// A backend that answers every call with the same text.
    pub fn always(reply: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            exhausted_reply: Ok(reply.to_string()),
        }
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn generate(&self, _prompt: &str, _model: &str, _max_tokens: u32) -> LlmResult {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| clone_result(&self.exhausted_reply))
    }
}

fn clone_result(result: &LlmResult) -> LlmResult {
    match result {
        Ok(text) => Ok(text.clone()),
        Err(LlmError::Timeout { backend }) => Err(LlmError::Timeout {
            backend: backend.clone(),
        }),
        Err(other) => Err(LlmError::Request {
            backend: "scripted".into(),
            message: other.to_string(),
        }),
    }
}

/// A backend that never answers, for cancellation tests.
pub struct HangingBackend;

#[async_trait]
impl LlmBackend for HangingBackend {
    fn name(&self) -> &'static str {
        "hanging"
    }

    async fn generate(&self, _prompt: &str, _model: &str, _max_tokens: u32) -> LlmResult {
        std::future::pending().await
    }
}

pub fn fast_gateway(backend: Box<dyn LlmBackend>) -> Arc<LlmGateway> {
    let mut config = Config::default();
    config.reliability.max_retries = 1;
    config.reliability.base_backoff_ms = 1;
    Arc::new(LlmGateway::new(backend, &config.reliability))
}

pub fn test_profile() -> StyleProfile {
    StyleProfile {
        avg_sentence_length: 11.0,
        response_style: ResponseStyle::Concise,
        common_phrases: vec!["to be fair".into(), "in a nutshell".into()],
        common_words: ["rust", "compiler"].into_iter().map(String::from).collect(),
    }
}
