//! Shared core types used across the manifest, snapshot and proxy layers.

use std::fmt;

use serde::{Deserialize, Serialize};

pub use alloy_primitives::{Address, B256, Bytes, U256};

/// Identity of a contract inside a package, rendered as `package/Contract`.
///
/// Package names may themselves contain `/` (scoped packages), so parsing
/// splits on the last separator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContractKey {
    pub package: String,
    pub contract: String,
}

impl ContractKey {
    pub fn new(package: impl Into<String>, contract: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            contract: contract.into(),
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        let (package, contract) = key.rsplit_once('/')?;
        if package.is_empty() || contract.is_empty() {
            return None;
        }
        Some(Self::new(package, contract))
    }
}

impl fmt::Display for ContractKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.package, self.contract)
    }
}

/// How a proxy instance forwards to its implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ProxyKind {
    /// Admin-controlled proxy whose implementation can be replaced.
    #[default]
    Upgradeable,
    /// Non-upgradeable clone with a fixed implementation pointer.
    Minimal,
    /// A plain contract instance, no proxy in front of it.
    NonProxy,
}

impl ProxyKind {
    pub fn is_upgradeable(self) -> bool {
        matches!(self, ProxyKind::Upgradeable)
    }
}

impl fmt::Display for ProxyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyKind::Upgradeable => write!(f, "upgradeable"),
            ProxyKind::Minimal => write!(f, "minimal"),
            ProxyKind::NonProxy => write!(f, "non-proxy"),
        }
    }
}
