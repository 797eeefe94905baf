use super::traits::LlmBackend;
use crate::error::LlmError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Local model backend speaking the Ollama chat API.
pub struct LocalModelBackend {
    base_url: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
    options: Options,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct Options {
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

const NAME: &str = "local";

impl LocalModelBackend {
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: super::build_http_client(timeout_secs),
        }
    }
}

#[async_trait]
impl LlmBackend for LocalModelBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn generate(
        &self,
        prompt: &str,
        model: &str,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: model.to_string(),
            messages: vec![Message {
                role: "user",
                content: prompt.to_string(),
            }],
            stream: false,
            options: Options {
                num_predict: max_tokens,
            },
        };
        let url = format!("{}/api/chat", self.base_url);

        let response = self.client.post(&url).json(&request).send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout {
                    backend: NAME.into(),
                }
            } else {
                LlmError::Request {
                    backend: NAME.into(),
                    message: format!("{e}. Is Ollama running? (ollama serve)"),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Request {
                backend: NAME.into(),
                message: format!("HTTP {status}: {body}"),
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| LlmError::InvalidResponse {
            backend: NAME.into(),
            message: e.to_string(),
        })?;

        if parsed.message.content.trim().is_empty() {
            return Err(LlmError::InvalidResponse {
                backend: NAME.into(),
                message: "empty completion".into(),
            });
        }
        Ok(parsed.message.content)
    }
}
