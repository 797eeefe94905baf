use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    Committed,
    Failed,
}

/// One entry in a target's version ledger. Immutable once written.
///
/// Committed versions carry a `version_number` that is strictly increasing by
/// one per target; Failed attempts are provenance only and carry the
/// non-advancing marker 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionVersion {
    pub target_id: String,
    pub version_number: u32,
    /// SHA-256 of the source the rewrite was requested against.
    pub source_hash: String,
    pub instructions: String,
    pub result_content: String,
    /// Tip at the time this record was written; 0 for a root version.
    pub parent_version: u32,
    pub created_at: DateTime<Utc>,
    pub status: VersionStatus,
    /// Present on Failed records only.
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The backend returned nothing usable.
    EmptyResult,
    /// The rewrite failed the structural well-formedness check.
    StructurallyInvalid,
    /// The caller cancelled the attempt before validation.
    Cancelled,
    /// Generation itself failed (backend unavailable or invalid response).
    Backend(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyResult => write!(f, "empty_result"),
            Self::StructurallyInvalid => write!(f, "structurally_invalid"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Backend(msg) => write!(f, "backend: {msg}"),
        }
    }
}

/// A failed evolution attempt, surfaced to the caller. The target's tip is
/// guaranteed unchanged.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("evolution of {target_id} failed: {reason}")]
pub struct EvolutionFailure {
    pub target_id: String,
    pub reason: FailureReason,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_reason_display_is_stable() {
        assert_eq!(FailureReason::EmptyResult.to_string(), "empty_result");
        assert_eq!(
            FailureReason::Backend("boom".into()).to_string(),
            "backend: boom"
        );
    }

    #[test]
    fn failure_serde_roundtrip() {
        let failure = EvolutionFailure {
            target_id: "cli".into(),
            reason: FailureReason::StructurallyInvalid,
        };
        let json = serde_json::to_string(&failure).unwrap();
        let back: EvolutionFailure = serde_json::from_str(&json).unwrap();
        assert_eq!(back.reason, failure.reason);
        assert_eq!(back.target_id, "cli");
    }
}
