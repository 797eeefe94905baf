use super::store::VersionStore;
use super::types::{EvolutionFailure, EvolutionVersion, FailureReason};
use super::validate::{strip_outer_fence, validate_rewrite};
use crate::error::EvolutionError;
use crate::llm::LlmGateway;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

const DEFAULT_INSTRUCTIONS: &str = "Refactor the code above to improve clarity and robustness. \
Keep the functionality the same and preserve all features. \
Return only the revised artifact, with no extra commentary.";

/// Outcome of a single evolve/rollback invocation. Failure is a first-class
/// result, not an error: the attempt is recorded in the ledger either way.
#[derive(Debug, Clone)]
pub enum EvolveOutcome {
    Committed(EvolutionVersion),
    Failed(EvolutionFailure),
}

impl EvolveOutcome {
    pub fn committed(&self) -> Option<&EvolutionVersion> {
        match self {
            Self::Committed(v) => Some(v),
            Self::Failed(_) => None,
        }
    }
}

/// Requests source rewrites from the LLM gateway and commits them to the
/// version ledger. Per invocation: Idle → Requesting → Validating →
/// Committed | Failed.
///
/// Generated content only ever lands in the inert store; adopting a committed
/// version into a running system is a separate, deliberate step outside this
/// pipeline.
pub struct SelfEvolutionPipeline {
    gateway: Arc<LlmGateway>,
    store: Arc<VersionStore>,
    model: String,
    max_tokens: u32,
    // One async mutex per target: a second evolve/rollback for a busy target
    // waits for the first to resolve. Different targets proceed in parallel.
    target_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SelfEvolutionPipeline {
    pub fn new(
        gateway: Arc<LlmGateway>,
        store: Arc<VersionStore>,
        model: impl Into<String>,
        max_tokens: u32,
    ) -> Self {
        Self {
            gateway,
            store,
            model: model.into(),
            max_tokens,
            target_locks: Mutex::new(HashMap::new()),
        }
    }

    fn target_lock(&self, target_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.target_locks.lock().expect("target lock map poisoned");
        locks
            .entry(target_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Request a rewrite of `source_content` and commit it if it validates.
    ///
    /// `cancel` aborts the attempt while the gateway call is in flight; a
    /// cancelled attempt is recorded as Failed with reason `cancelled` and
    /// never reaches the Validating step.
    pub async fn evolve(
        &self,
        target_id: &str,
        source_content: &str,
        instructions: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<EvolveOutcome, EvolutionError> {
        let lock = self.target_lock(target_id);
        let _guard = lock.lock().await;

        let instructions = if instructions.trim().is_empty() {
            DEFAULT_INSTRUCTIONS
        } else {
            instructions
        };
        let source_hash = hex::encode(Sha256::digest(source_content.as_bytes()));
        let prompt = format!("```\n{source_content}\n```\n\n{instructions}");

        tracing::info!(target_id, model = self.model.as_str(), "Requesting rewrite");

        // Requesting: the only suspension point in the pipeline.
        let generated = {
            let request = self.gateway.generate(&prompt, &self.model, self.max_tokens);
            if let Some(token) = cancel {
                tokio::select! {
                    () = token.cancelled() => {
                        return self.record_failure(
                            target_id,
                            &source_hash,
                            instructions,
                            "",
                            FailureReason::Cancelled,
                        );
                    }
                    result = request => result,
                }
            } else {
                request.await
            }
        };

        let raw = match generated {
            Ok(text) => text,
            Err(e) => {
                return self.record_failure(
                    target_id,
                    &source_hash,
                    instructions,
                    "",
                    FailureReason::Backend(e.to_string()),
                );
            }
        };

        // Validating.
        let content = strip_outer_fence(&raw);
        if let Err(reason) = validate_rewrite(source_content, content) {
            return self.record_failure(target_id, &source_hash, instructions, content, reason);
        }

        // Committed.
        let version = self
            .store
            .append_committed(target_id, &source_hash, instructions, content)?;
        tracing::info!(
            target_id,
            version = version.version_number,
            "Rewrite committed"
        );
        Ok(EvolveOutcome::Committed(version))
    }

    /// Re-commit the content of an earlier version as a new tip. History is
    /// never rewritten; rollback is forward-only.
    pub async fn rollback(
        &self,
        target_id: &str,
        to_version: u32,
    ) -> Result<EvolutionVersion, EvolutionError> {
        let lock = self.target_lock(target_id);
        let _guard = lock.lock().await;

        let Some(target) = self.store.committed(target_id, to_version)? else {
            return Err(EvolutionError::NoSuchVersion {
                target_id: target_id.to_string(),
                version: to_version,
            });
        };

        let source_hash = hex::encode(Sha256::digest(target.result_content.as_bytes()));
        let version = self.store.append_committed(
            target_id,
            &source_hash,
            &format!("rollback to version {to_version}"),
            &target.result_content,
        )?;
        tracing::info!(
            target_id,
            from = to_version,
            version = version.version_number,
            "Rolled back"
        );
        Ok(version)
    }

    pub fn history(&self, target_id: &str) -> Result<Vec<EvolutionVersion>, EvolutionError> {
        Ok(self.store.history(target_id)?)
    }

    pub fn tip(&self, target_id: &str) -> Result<Option<EvolutionVersion>, EvolutionError> {
        Ok(self.store.tip(target_id)?)
    }

    fn record_failure(
        &self,
        target_id: &str,
        source_hash: &str,
        instructions: &str,
        content: &str,
        reason: FailureReason,
    ) -> Result<EvolveOutcome, EvolutionError> {
        tracing::warn!(target_id, reason = %reason, "Evolution attempt failed");
        self.store
            .append_failed(target_id, source_hash, instructions, content, &reason)?;
        Ok(EvolveOutcome::Failed(EvolutionFailure {
            target_id: target_id.to_string(),
            reason,
        }))
    }
}
