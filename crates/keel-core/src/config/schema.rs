//! User configuration schema
//!
//! Lives at `<config_dir>/keel/config.toml` and describes how to reach each
//! network:
//!
//! ```toml
//! [networks.local]
//! rpc_url = "http://127.0.0.1:8545"
//! poll_interval_ms = 500
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::retry::RetryPolicy;

/// Root structure of config.toml
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkConfig>,
}

/// Connection settings for one network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub rpc_url: Url,

    /// Sender account; defaults to the node's first unlocked account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_poll_retries")]
    pub poll_retries: u32,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_poll_retries() -> u32 {
    60
}

impl NetworkConfig {
    pub fn new(rpc_url: Url) -> Self {
        Self {
            rpc_url,
            from: None,
            poll_interval_ms: default_poll_interval_ms(),
            poll_retries: default_poll_retries(),
        }
    }

    pub fn receipt_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.poll_retries, Duration::from_millis(self.poll_interval_ms))
    }
}

impl UserConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn network(&self, name: &str) -> Option<&NetworkConfig> {
        self.networks.get(name)
    }

    pub fn set_network(&mut self, name: impl Into<String>, network: NetworkConfig) {
        self.networks.insert(name.into(), network);
    }
}
