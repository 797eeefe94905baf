use super::traits::LlmBackend;
use crate::config::{Config, ReliabilityConfig};
use crate::error::LlmError;
use std::time::Duration;

const MAX_BACKOFF_MS: u64 = 10_000;

/// Retry/backoff wrapper over a single backend variant.
///
/// Transient failures (timeout, rate-limit, 5xx) are retried with exponential
/// backoff up to `max_retries`; auth failures and malformed responses fail
/// immediately. Exhausted retries surface as [`LlmError::Unavailable`]. Both
/// backend variants get identical semantics because the policy lives here,
/// not in the variants.
pub struct LlmGateway {
    backend: Box<dyn LlmBackend>,
    max_retries: u32,
    base_backoff_ms: u64,
}

impl LlmGateway {
    pub fn new(backend: Box<dyn LlmBackend>, reliability: &ReliabilityConfig) -> Self {
        Self {
            backend,
            max_retries: reliability.max_retries,
            base_backoff_ms: reliability.base_backoff_ms.max(1),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(super::create_backend(config), &config.reliability)
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub async fn generate(
        &self,
        prompt: &str,
        model: &str,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let mut backoff_ms = self.base_backoff_ms;
        let mut last_message = String::new();

        for attempt in 0..=self.max_retries {
            match self.backend.generate(prompt, model, max_tokens).await {
                Ok(text) => {
                    if attempt > 0 {
                        tracing::info!(
                            backend = self.backend.name(),
                            attempt,
                            "Backend recovered after retries"
                        );
                    }
                    return Ok(text);
                }
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    last_message = e.to_string();
                    if attempt < self.max_retries {
                        tracing::warn!(
                            backend = self.backend.name(),
                            attempt = attempt + 1,
                            max_retries = self.max_retries,
                            "Backend call failed, retrying: {last_message}"
                        );
                        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                        backoff_ms = backoff_ms.saturating_mul(2).min(MAX_BACKOFF_MS);
                    }
                }
            }
        }

        Err(LlmError::Unavailable {
            backend: self.backend.name().into(),
            attempts: self.max_retries + 1,
            message: last_message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted backend: pops one canned result per call, then times out.
    struct ScriptedBackend {
        script: Mutex<VecDeque<Result<String, LlmError>>>,
    }

    impl ScriptedBackend {
        fn new(script: Vec<Result<String, LlmError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
            }
        }
    }

    #[async_trait]
    impl LlmBackend for ScriptedBackend {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn generate(
            &self,
            _prompt: &str,
            _model: &str,
            _max_tokens: u32,
        ) -> Result<String, LlmError> {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(timeout()))
        }
    }

    fn timeout() -> LlmError {
        LlmError::Timeout {
            backend: "scripted".into(),
        }
    }

    fn fast_reliability(max_retries: u32) -> ReliabilityConfig {
        ReliabilityConfig {
            max_retries,
            base_backoff_ms: 1,
            request_timeout_secs: 1,
        }
    }

    fn gateway(script: Vec<Result<String, LlmError>>, max_retries: u32) -> LlmGateway {
        LlmGateway::new(Box::new(ScriptedBackend::new(script)), &fast_reliability(max_retries))
    }

    #[tokio::test]
    async fn recovers_from_transient_failures() {
        let gw = gateway(vec![Err(timeout()), Err(timeout()), Ok("hello".into())], 3);
        let reply = gw.generate("p", "m", 64).await.unwrap();
        assert_eq!(reply, "hello");
    }

    #[tokio::test]
    async fn exhausted_retries_surface_unavailable() {
        let gw = gateway((0..4).map(|_| Err(timeout())).collect(), 2);
        let err = gw.generate("p", "m", 64).await.unwrap_err();
        match err {
            LlmError::Unavailable { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected Unavailable, got {other}"),
        }
    }

    #[tokio::test]
    async fn auth_errors_fail_without_retry() {
        let gw = gateway(
            vec![
                Err(LlmError::Auth {
                    backend: "scripted".into(),
                }),
                Ok("never reached".into()),
            ],
            3,
        );
        let err = gw.generate("p", "m", 64).await.unwrap_err();
        assert!(matches!(err, LlmError::Auth { .. }));
    }

    #[tokio::test]
    async fn invalid_response_is_not_retried() {
        let gw = gateway(
            vec![
                Err(LlmError::InvalidResponse {
                    backend: "scripted".into(),
                    message: "empty completion".into(),
                }),
                Ok("never reached".into()),
            ],
            3,
        );
        let err = gw.generate("p", "m", 64).await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse { .. }));
    }
}
