use crate::error::LlmError;
use async_trait::async_trait;

/// Capability interface to a text-generation backend.
///
/// Implementations are plain HTTP clients with no retry logic of their own;
/// [`super::LlmGateway`] layers identical timeout and retry semantics over
/// every variant. The variant is chosen once per gateway instance by
/// [`super::create_backend`].
#[async_trait]
pub trait LlmBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn generate(
        &self,
        prompt: &str,
        model: &str,
        max_tokens: u32,
    ) -> Result<String, LlmError>;
}
