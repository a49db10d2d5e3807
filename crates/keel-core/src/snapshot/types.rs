//! Network snapshot data structures.
//!
//! The snapshot is the persisted record of what has actually been deployed
//! on one network. All access goes through typed accessors so invariants
//! (schema version, one hash record per alias) are checked in one place.

use std::collections::BTreeMap;

use alloy_primitives::Address;
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::artifacts::{ContractDescriptor, StorageEntry, StorageType};
use crate::error::KeelError;
use crate::types::{ContractKey, ProxyKind};
use crate::version::{MANIFEST_VERSION, check_manifest_version};

/// Address of a singleton system contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub address: Address,
}

impl From<Address> for AddressRecord {
    fn from(address: Address) -> Self {
        Self { address }
    }
}

/// A deployed implementation contract or library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractRecord {
    pub address: Address,
    #[serde(default)]
    pub constructor_code: String,
    pub local_bytecode_hash: String,
    #[serde(default)]
    pub deployed_bytecode_hash: String,
    #[serde(default)]
    pub body_bytecode_hash: String,
    #[serde(default)]
    pub types: BTreeMap<String, StorageType>,
    #[serde(default)]
    pub storage: Vec<StorageEntry>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl ContractRecord {
    /// Record for `descriptor` deployed at `address`.
    pub fn deployed(descriptor: &ContractDescriptor, address: Address) -> Self {
        Self {
            address,
            constructor_code: descriptor.constructor_code(),
            local_bytecode_hash: descriptor.local_bytecode_hash(),
            deployed_bytecode_hash: descriptor.deployed_bytecode_hash(),
            body_bytecode_hash: descriptor.body_bytecode_hash(),
            types: descriptor.storage.types.clone(),
            storage: descriptor.storage.storage.clone(),
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    /// Whether `descriptor` is the bytecode this record was deployed from.
    pub fn matches(&self, descriptor: &ContractDescriptor) -> bool {
        self.local_bytecode_hash == descriptor.local_bytecode_hash()
    }
}

/// A proxy (or plain instance) created for a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyInstance {
    pub address: Address,
    pub version: String,
    pub implementation: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin: Option<Address>,
    #[serde(default)]
    pub kind: ProxyKind,
}

/// A proxy together with the contract it was created for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRecord {
    pub package: String,
    pub contract: String,
    pub instance: ProxyInstance,
}

impl ProxyRecord {
    pub fn key(&self) -> ContractKey {
        ContractKey::new(&self.package, &self.contract)
    }
}

/// Selects proxies by package, contract and address; unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyFilter {
    pub package: Option<String>,
    pub contract: Option<String>,
    pub address: Option<Address>,
}

impl ProxyFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    pub fn with_contract(mut self, contract: impl Into<String>) -> Self {
        self.contract = Some(contract.into());
        self
    }

    pub fn with_address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    pub fn matches(&self, key: &ContractKey, instance: &ProxyInstance) -> bool {
        self.package.as_deref().is_none_or(|p| p == key.package)
            && self.contract.as_deref().is_none_or(|c| c == key.contract)
            && self.address.is_none_or(|a| a == instance.address)
    }
}

/// A dependency linked on this network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<Address>,
    pub version: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub custom_deploy: bool,
}

impl DependencyRecord {
    pub fn new(package: Option<Address>, version: impl Into<String>) -> Self {
        Self {
            package,
            version: version.into(),
            custom_deploy: false,
        }
    }

    pub fn custom(mut self) -> Self {
        self.custom_deploy = true;
        self
    }
}

/// Deployment state of a project on one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSnapshot {
    pub manifest_version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,

    #[serde(default)]
    pub frozen: bool,

    #[serde(default)]
    contracts: BTreeMap<String, ContractRecord>,

    #[serde(default)]
    solidity_libs: BTreeMap<String, ContractRecord>,

    #[serde(default)]
    proxies: BTreeMap<String, Vec<ProxyInstance>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_admin: Option<AddressRecord>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_factory: Option<AddressRecord>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<AddressRecord>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<AddressRecord>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<AddressRecord>,

    #[serde(default)]
    dependencies: BTreeMap<String, DependencyRecord>,
}

impl Default for NetworkSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkSnapshot {
    pub fn new() -> Self {
        Self {
            manifest_version: MANIFEST_VERSION.to_string(),
            version: None,
            frozen: false,
            contracts: BTreeMap::new(),
            solidity_libs: BTreeMap::new(),
            proxies: BTreeMap::new(),
            proxy_admin: None,
            proxy_factory: None,
            app: None,
            package: None,
            provider: None,
            dependencies: BTreeMap::new(),
        }
    }

    /// Check schema version and internal consistency.
    pub fn validate(&self) -> Result<(), KeelError> {
        check_manifest_version(&self.manifest_version)?;

        if let Some(alias) = self
            .contracts
            .keys()
            .find(|alias| self.solidity_libs.contains_key(*alias))
        {
            return Err(KeelError::InvalidRequest(format!(
                "'{alias}' is recorded both as a contract and as a library"
            )));
        }

        for key in self.proxies.keys() {
            if ContractKey::parse(key).is_none() {
                return Err(KeelError::InvalidRequest(format!(
                    "malformed proxy key '{key}', expected package/Contract"
                )));
            }
        }
        Ok(())
    }

    // Contracts

    pub fn contract(&self, alias: &str) -> Option<&ContractRecord> {
        self.contracts.get(alias)
    }

    pub fn contracts(&self) -> &BTreeMap<String, ContractRecord> {
        &self.contracts
    }

    pub fn contract_aliases(&self) -> Vec<String> {
        self.contracts.keys().cloned().collect()
    }

    pub fn set_contract(&mut self, alias: impl Into<String>, record: ContractRecord) {
        let alias = alias.into();
        self.solidity_libs.remove(&alias);
        self.contracts.insert(alias, record);
    }

    pub fn unset_contract(&mut self, alias: &str) -> Option<ContractRecord> {
        self.contracts.remove(alias)
    }

    /// Forget every implementation, leaving proxies and libraries alone.
    pub fn clear_contracts(&mut self) {
        self.contracts.clear();
    }

    // Libraries

    pub fn library(&self, name: &str) -> Option<&ContractRecord> {
        self.solidity_libs.get(name)
    }

    pub fn libraries(&self) -> &BTreeMap<String, ContractRecord> {
        &self.solidity_libs
    }

    pub fn set_library(&mut self, name: impl Into<String>, record: ContractRecord) {
        let name = name.into();
        self.contracts.remove(&name);
        self.solidity_libs.insert(name, record);
    }

    pub fn unset_library(&mut self, name: &str) -> Option<ContractRecord> {
        self.solidity_libs.remove(name)
    }

    /// Addresses of every deployed library, for linking.
    pub fn library_addresses(&self) -> BTreeMap<String, Address> {
        self.solidity_libs
            .iter()
            .map(|(name, record)| (name.clone(), record.address))
            .collect()
    }

    // Proxies

    pub fn add_proxy(&mut self, key: &ContractKey, instance: ProxyInstance) {
        self.proxies.entry(key.to_string()).or_default().push(instance);
    }

    /// Apply `update` to the proxy at `address`; false when it is unknown.
    pub fn update_proxy(&mut self, address: Address, update: impl FnOnce(&mut ProxyInstance)) -> bool {
        match self
            .proxies
            .values_mut()
            .flat_map(|instances| instances.iter_mut())
            .find(|instance| instance.address == address)
        {
            Some(instance) => {
                update(instance);
                true
            }
            None => false,
        }
    }

    pub fn proxies_matching(&self, filter: &ProxyFilter) -> Vec<ProxyRecord> {
        self.proxies
            .iter()
            .filter_map(|(key, instances)| ContractKey::parse(key).map(|key| (key, instances)))
            .flat_map(|(key, instances)| {
                instances
                    .iter()
                    .filter(|instance| filter.matches(&key, instance))
                    .map(|instance| ProxyRecord {
                        package: key.package.clone(),
                        contract: key.contract.clone(),
                        instance: instance.clone(),
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    pub fn proxy(&self, address: Address) -> Option<ProxyRecord> {
        self.proxies_matching(&ProxyFilter::all().with_address(address))
            .into_iter()
            .next()
    }

    pub fn proxy_count(&self) -> usize {
        self.proxies.values().map(Vec::len).sum()
    }

    // Dependencies

    pub fn dependency(&self, name: &str) -> Option<&DependencyRecord> {
        self.dependencies.get(name)
    }

    pub fn dependencies(&self) -> &BTreeMap<String, DependencyRecord> {
        &self.dependencies
    }

    pub fn set_dependency(&mut self, name: impl Into<String>, record: DependencyRecord) {
        self.dependencies.insert(name.into(), record);
    }

    pub fn unset_dependency(&mut self, name: &str) -> Option<DependencyRecord> {
        self.dependencies.remove(name)
    }

    // Lifecycle

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn unfreeze(&mut self) {
        self.frozen = false;
    }

    /// A project is published once its App container exists.
    pub fn is_published(&self) -> bool {
        self.app.is_some()
    }

    pub fn proxy_admin_address(&self) -> Option<Address> {
        self.proxy_admin.map(|r| r.address)
    }

    pub fn proxy_factory_address(&self) -> Option<Address> {
        self.proxy_factory.map(|r| r.address)
    }

    pub fn app_address(&self) -> Option<Address> {
        self.app.map(|r| r.address)
    }

    pub fn package_address(&self) -> Option<Address> {
        self.package.map(|r| r.address)
    }

    pub fn provider_address(&self) -> Option<Address> {
        self.provider.map(|r| r.address)
    }
}
