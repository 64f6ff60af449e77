use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Network options shared by the definitions fetcher and network protocols.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Applies to connecting and to each whole request.
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            user_agent: concat!("submitter/", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }
}

impl TransportConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout())
            .connect_timeout(self.timeout())
            .user_agent(self.user_agent.clone())
            .build()
    }

    pub fn trace_loaded(&self) {
        info!(
            timeout_secs = self.timeout_secs,
            user_agent = %self.user_agent,
            "Loaded TransportConfig"
        );
        debug!(?self, "TransportConfig loaded (full debug)");
    }
}
