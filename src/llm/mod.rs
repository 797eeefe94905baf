mod factory;
mod gateway;
mod hosted;
mod local;
mod traits;

pub use factory::create_backend;
pub use gateway::LlmGateway;
pub use hosted::HostedApiBackend;
pub use local::LocalModelBackend;
pub use traits::LlmBackend;

use reqwest::Client;
use std::time::Duration;

/// Shared reqwest client settings for both backend variants.
pub(crate) fn build_http_client(timeout_secs: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .unwrap_or_else(|_| Client::new())
}
