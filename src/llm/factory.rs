use super::hosted::HostedApiBackend;
use super::local::LocalModelBackend;
use super::traits::LlmBackend;
use crate::config::{BackendKind, Config};

/// Select the backend variant once, from config. Callers hold the trait
/// object for the life of the gateway; there is no per-call dispatch on kind.
pub fn create_backend(config: &Config) -> Box<dyn LlmBackend> {
    let timeout = config.reliability.request_timeout_secs;
    match config.llm.backend {
        BackendKind::Hosted => {
            let api_key = config.llm.resolve_api_key();
            if api_key.is_none() {
                tracing::warn!(
                    "No API key configured for hosted backend; requests will fail until one is set"
                );
            }
            Box::new(HostedApiBackend::new(
                &config.llm.hosted_base_url,
                api_key,
                timeout,
            ))
        }
        BackendKind::Local => {
            tracing::info!(
                base_url = config.llm.local_base_url.as_str(),
                model = config.llm.local_model.as_str(),
                "Using local model backend"
            );
            Box::new(LocalModelBackend::new(&config.llm.local_base_url, timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn respects_configured_backend_kind() {
        let mut config = Config::default();
        config.llm.backend = BackendKind::Local;
        assert_eq!(create_backend(&config).name(), "local");

        config.llm.backend = BackendKind::Hosted;
        assert_eq!(create_backend(&config).name(), "hosted");
    }
}
