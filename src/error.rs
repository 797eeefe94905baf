use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for Geist.
///
/// Each subsystem defines its own error variant. Library callers can match on
/// these to decide recovery strategy; internal glue continues to use
/// `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum GeistError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── LLM backend ─────────────────────────────────────────────────────
    #[error("llm: {0}")]
    Llm(#[from] LlmError),

    // ── Prompt composition ──────────────────────────────────────────────
    #[error("compose: {0}")]
    Compose(#[from] ComposeError),

    // ── Evolution pipeline ──────────────────────────────────────────────
    #[error("evolution: {0}")]
    Evolution(#[from] EvolutionError),

    // ── Persistence ─────────────────────────────────────────────────────
    #[error("store: {0}")]
    Store(#[from] StoreError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("validation failed: {0}")]
    Validation(String),
}

// ─── LLM backend errors ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LlmError {
    /// Every retry exhausted (or the backend was unreachable from the start).
    #[error("backend {backend} unavailable after {attempts} attempt(s): {message}")]
    Unavailable {
        backend: String,
        attempts: u32,
        message: String,
    },

    /// The backend answered, but with empty or malformed content.
    #[error("backend {backend} returned an invalid response: {message}")]
    InvalidResponse { backend: String, message: String },

    /// Authentication failure. Never retried.
    #[error("backend {backend} authentication failed")]
    Auth { backend: String },

    #[error("backend {backend} rate-limited")]
    RateLimited { backend: String },

    #[error("backend {backend} timed out")]
    Timeout { backend: String },

    #[error("backend {backend} request failed: {message}")]
    Request { backend: String, message: String },
}

impl LlmError {
    /// Whether retrying this error can possibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Timeout { .. } | Self::Request { .. }
        )
    }
}

// ─── Prompt composition errors ──────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("style profile is missing required field: {0}")]
    MissingField(&'static str),
}

// ─── Evolution errors ───────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EvolutionError {
    #[error("no such version {version} for target {target_id}")]
    NoSuchVersion { target_id: String, version: u32 },

    #[error("store: {0}")]
    Store(#[from] StoreError),
}

// ─── Persistence errors ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("lock poisoned")]
    LockPoisoned,
}

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, GeistError>;
