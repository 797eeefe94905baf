use super::traits::LlmBackend;
use crate::error::LlmError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

/// OpenAI-compatible hosted API backend (`/v1/chat/completions`).
pub struct HostedApiBackend {
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

const NAME: &str = "hosted";

impl HostedApiBackend {
    pub fn new(base_url: &str, api_key: Option<String>, timeout_secs: u64) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client: super::build_http_client(timeout_secs),
        }
    }

    fn classify_status(status: StatusCode, body: String) -> LlmError {
        match status.as_u16() {
            401 | 403 => LlmError::Auth {
                backend: NAME.into(),
            },
            429 => LlmError::RateLimited {
                backend: NAME.into(),
            },
            408 => LlmError::Timeout {
                backend: NAME.into(),
            },
            code if (500..600).contains(&code) => LlmError::Request {
                backend: NAME.into(),
                message: format!("HTTP {code}: {body}"),
            },
            code => LlmError::InvalidResponse {
                backend: NAME.into(),
                message: format!("HTTP {code}: {body}"),
            },
        }
    }
}

#[async_trait]
impl LlmBackend for HostedApiBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn generate(
        &self,
        prompt: &str,
        model: &str,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(LlmError::Auth {
                backend: NAME.into(),
            });
        };

        let request = ChatRequest {
            model: model.to_string(),
            messages: vec![Message {
                role: "user",
                content: prompt.to_string(),
            }],
            max_tokens,
        };
        let url = format!("{}/v1/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        backend: NAME.into(),
                    }
                } else {
                    LlmError::Request {
                        backend: NAME.into(),
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, body));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| LlmError::InvalidResponse {
            backend: NAME.into(),
            message: e.to_string(),
        })?;

        let content = parsed
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(LlmError::InvalidResponse {
                backend: NAME.into(),
                message: "empty completion".into(),
            });
        }
        Ok(content.to_string())
    }
}
