use crate::error::ConfigError;
use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Top-level configuration, persisted as `~/.geist/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Data directory — computed from home, not serialized.
    #[serde(skip)]
    pub data_dir: PathBuf,
    /// Path to config.toml — computed from home, not serialized.
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub reliability: ReliabilityConfig,

    #[serde(default)]
    pub tone: ToneConfig,

    #[serde(default)]
    pub chat: ChatConfig,

    #[serde(default)]
    pub persona: PersonaConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Which text-generation backend to talk to. The variant is fixed once per
/// gateway instance; it is never re-inspected per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Hosted,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default = "default_hosted_base_url")]
    pub hosted_base_url: String,
    #[serde(default = "default_hosted_model")]
    pub hosted_model: String,
    /// API key for the hosted backend. Falls back to `GEIST_API_KEY` /
    /// `OPENAI_API_KEY` environment variables when unset.
    pub api_key: Option<String>,
    #[serde(default = "default_local_base_url")]
    pub local_base_url: String,
    #[serde(default = "default_local_model")]
    pub local_model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Model used for evolution requests; defaults to the chat model.
    pub evolve_model: Option<String>,
}

fn default_hosted_base_url() -> String {
    "https://api.openai.com".into()
}
fn default_hosted_model() -> String {
    "gpt-4o-mini".into()
}
fn default_local_base_url() -> String {
    "http://localhost:11434".into()
}
fn default_local_model() -> String {
    "llama3".into()
}
fn default_max_tokens() -> u32 {
    1024
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            hosted_base_url: default_hosted_base_url(),
            hosted_model: default_hosted_model(),
            api_key: None,
            local_base_url: default_local_base_url(),
            local_model: default_local_model(),
            max_tokens: default_max_tokens(),
            evolve_model: None,
        }
    }
}

impl LlmConfig {
    /// Resolve the hosted API key: explicit config value first, then
    /// environment fallbacks.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(key) = self.api_key.as_deref().map(str::trim)
            && !key.is_empty()
        {
            return Some(key.to_string());
        }
        for env_var in ["GEIST_API_KEY", "OPENAI_API_KEY"] {
            if let Ok(value) = std::env::var(env_var) {
                let value = value.trim();
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
        None
    }

    pub fn evolve_model(&self) -> &str {
        self.evolve_model.as_deref().unwrap_or(match self.backend {
            BackendKind::Hosted => &self.hosted_model,
            BackendKind::Local => &self.local_model,
        })
    }

    pub fn chat_model(&self) -> &str {
        match self.backend {
            BackendKind::Hosted => &self.hosted_model,
            BackendKind::Local => &self.local_model,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_base_backoff_ms() -> u64 {
    500
}
fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Tunables for the conversation-state engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToneConfig {
    /// Topic scores below this count as off-topic. Range [0, 100].
    #[serde(default = "default_relevance_cutoff")]
    pub relevance_cutoff: f64,
    /// Off-topic messages needed before patience decays.
    #[serde(default = "default_repeat_threshold")]
    pub repeat_threshold: u32,
    /// Patience lost per decay event.
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f64,
    /// Patience regained per on-topic message.
    #[serde(default = "default_recovery")]
    pub recovery: f64,
    /// Snark gained each time patience bottoms out (non-strict sessions only).
    #[serde(default = "default_snark_increment")]
    pub snark_increment: f64,
}

fn default_relevance_cutoff() -> f64 {
    40.0
}
fn default_repeat_threshold() -> u32 {
    3
}
fn default_decay_rate() -> f64 {
    0.3
}
fn default_recovery() -> f64 {
    0.05
}
fn default_snark_increment() -> f64 {
    0.25
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            relevance_cutoff: default_relevance_cutoff(),
            repeat_threshold: default_repeat_threshold(),
            decay_rate: default_decay_rate(),
            recovery: default_recovery(),
            snark_increment: default_snark_increment(),
        }
    }
}

impl ToneConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !(0.0..=100.0).contains(&self.relevance_cutoff) {
            return Err(ConfigError::Validation(format!(
                "tone.relevance_cutoff must be in [0, 100], got {}",
                self.relevance_cutoff
            )));
        }
        if self.repeat_threshold == 0 {
            return Err(ConfigError::Validation(
                "tone.repeat_threshold must be at least 1".into(),
            ));
        }
        for (name, value) in [
            ("tone.decay_rate", self.decay_rate),
            ("tone.recovery", self.recovery),
            ("tone.snark_increment", self.snark_increment),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Validation(format!(
                    "{name} must be in [0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Seed topics a session is anchored to, merged with the style profile's
    /// common words at session start.
    #[serde(default)]
    pub anchor_topics: Vec<String>,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_history_limit() -> usize {
    10
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            anchor_topics: Vec::new(),
            history_limit: default_history_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PersonaConfig {
    /// Path to the precomputed style profile JSON. Defaults to
    /// `<data_dir>/style_profile.json` when unset.
    pub profile_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_host")]
    pub host: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
}

fn default_gateway_host() -> String {
    "127.0.0.1".into()
}
fn default_gateway_port() -> u16 {
    8390
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
        }
    }
}

impl Config {
    pub fn load_or_init() -> Result<Self> {
        let home = UserDirs::new()
            .map(|u| u.home_dir().to_path_buf())
            .context("Could not find home directory")?;
        Self::load_or_init_at(home.join(".geist"))
    }

    /// Load (or create with defaults) a config rooted at `data_dir`.
    /// Split out from [`Config::load_or_init`] so tests can use a tempdir.
    pub fn load_or_init_at(data_dir: PathBuf) -> Result<Self> {
        let config_path = data_dir.join("config.toml");

        if !data_dir.exists() {
            fs::create_dir_all(&data_dir).context("Failed to create .geist directory")?;
        }

        if config_path.exists() {
            let contents =
                fs::read_to_string(&config_path).context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path = config_path;
            config.data_dir = data_dir;
            config.tone.validate()?;
            Ok(config)
        } else {
            let config = Self {
                config_path: config_path.clone(),
                data_dir,
                ..Self::default()
            };
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&self.config_path, toml_str).context("Failed to write config file")?;
        Ok(())
    }

    pub fn profile_path(&self) -> PathBuf {
        self.persona
            .profile_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("style_profile.json"))
    }

    pub fn turns_db_path(&self) -> PathBuf {
        self.data_dir.join("conversation.db")
    }

    pub fn evolution_db_path(&self) -> PathBuf {
        self.data_dir.join("evolution.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        assert!(ToneConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_cutoff() {
        let tone = ToneConfig {
            relevance_cutoff: 140.0,
            ..ToneConfig::default()
        };
        assert!(tone.validate().is_err());
    }

    #[test]
    fn rejects_zero_repeat_threshold() {
        let tone = ToneConfig {
            repeat_threshold: 0,
            ..ToneConfig::default()
        };
        assert!(tone.validate().is_err());
    }

    #[test]
    fn load_or_init_creates_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let created = Config::load_or_init_at(dir.path().join("home")).unwrap();
        assert!(created.config_path.exists());

        let reloaded = Config::load_or_init_at(dir.path().join("home")).unwrap();
        assert_eq!(reloaded.llm.hosted_model, created.llm.hosted_model);
        assert_eq!(reloaded.gateway.port, created.gateway.port);
    }

    #[test]
    fn evolve_model_falls_back_to_chat_model() {
        let mut llm = LlmConfig::default();
        assert_eq!(llm.evolve_model(), llm.hosted_model);
        llm.evolve_model = Some("gpt-4".into());
        assert_eq!(llm.evolve_model(), "gpt-4");
    }
}
