use alloy_primitives::{Address, Bytes, U256};

use crate::snapshot::{ProxyFilter, ProxyRecord};
use crate::types::ProxyKind;

/// Function to call on a new or upgraded instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitCall {
    /// Function name or full signature, e.g. `initialize(address,uint256)`
    pub method: String,
    /// ABI-encoded arguments, without selector
    pub args: Bytes,
}

impl InitCall {
    pub fn new(method: impl Into<String>, args: impl Into<Bytes>) -> Self {
        Self {
            method: method.into(),
            args: args.into(),
        }
    }
}

/// Request to create an instance of a contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateProxyRequest {
    /// Package the contract belongs to: this project or a linked dependency
    pub package: String,
    /// Contract alias in that package's manifest
    pub contract: String,
    pub init: Option<InitCall>,
    pub kind: ProxyKind,
    /// Admin of the proxy; the project's ProxyAdmin when unset
    pub admin: Option<Address>,
    /// Salt for a deterministic deployment through the ProxyFactory
    pub salt: Option<U256>,
    /// Signature authorizing a salted deployment on behalf of its signer
    pub signature: Option<Bytes>,
}

impl CreateProxyRequest {
    pub fn new(package: impl Into<String>, contract: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            contract: contract.into(),
            init: None,
            kind: ProxyKind::default(),
            admin: None,
            salt: None,
            signature: None,
        }
    }

    pub fn with_init(mut self, init: InitCall) -> Self {
        self.init = Some(init);
        self
    }

    pub fn with_kind(mut self, kind: ProxyKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_admin(mut self, admin: Address) -> Self {
        self.admin = Some(admin);
        self
    }

    pub fn with_salt(mut self, salt: U256) -> Self {
        self.salt = Some(salt);
        self
    }

    pub fn with_signature(mut self, signature: Bytes) -> Self {
        self.signature = Some(signature);
        self
    }
}

/// Request to upgrade the proxies selected by `filter`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpgradeRequest {
    pub filter: ProxyFilter,
    /// Called atomically with each upgrade
    pub init: Option<InitCall>,
}

impl UpgradeRequest {
    pub fn new(filter: ProxyFilter) -> Self {
        Self { filter, init: None }
    }

    pub fn with_init(mut self, init: InitCall) -> Self {
        self.init = Some(init);
        self
    }
}

/// Result of creating an instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedProxy {
    pub proxy: ProxyRecord,
    pub warnings: Vec<String>,
}

/// Outcome of an upgrade or admin change over a set of proxies
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyReport {
    /// Proxies a transaction was sent for
    pub changed: Vec<ProxyRecord>,
    /// Proxies already in the requested state
    pub up_to_date: Vec<ProxyRecord>,
    /// Minimal proxies and plain instances, which cannot be changed
    pub unchangeable: Vec<ProxyRecord>,
    /// Proxies administered by someone other than this project
    pub not_owned: Vec<ProxyRecord>,
    pub warnings: Vec<String>,
}

impl ProxyReport {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
            && self.up_to_date.is_empty()
            && self.unchangeable.is_empty()
            && self.not_owned.is_empty()
    }
}
