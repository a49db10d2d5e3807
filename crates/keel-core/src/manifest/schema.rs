//! Project manifest schema for keel.toml
//!
//! The manifest is the network-independent description of a project: which
//! contracts it owns, which packages it depends on and how to compile it.

use std::collections::BTreeMap;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::KeelError;
use crate::version::{MANIFEST_VERSION, VersionResolver, check_manifest_version};

/// Root structure of keel.toml
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectManifest {
    /// Package name, used as the `package` half of proxy keys
    pub name: String,

    /// Project version; changing it on a published project starts a new release
    pub version: Version,

    /// Schema tag of this file
    #[serde(default = "default_manifest_version")]
    pub manifest_version: String,

    /// Whether the project registers its contracts in an on-chain App
    #[serde(default)]
    pub publish: bool,

    /// Contract alias -> compiled contract name
    #[serde(default)]
    pub contracts: BTreeMap<String, String>,

    /// Dependency package name -> required version range
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,

    #[serde(default)]
    pub compiler: CompilerSettings,
}

fn default_manifest_version() -> String {
    MANIFEST_VERSION.to_string()
}

/// Compiler options passed through to the external build step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evm_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimizer: Option<OptimizerSettings>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizerSettings {
    pub enabled: bool,
    #[serde(default = "default_runs")]
    pub runs: u32,
}

fn default_runs() -> u32 {
    200
}

impl ProjectManifest {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            manifest_version: MANIFEST_VERSION.to_string(),
            publish: false,
            contracts: BTreeMap::new(),
            dependencies: BTreeMap::new(),
            compiler: CompilerSettings::default(),
        }
    }

    pub fn with_publish(mut self, publish: bool) -> Self {
        self.publish = publish;
        self
    }

    pub fn with_contract(mut self, alias: impl Into<String>, name: impl Into<String>) -> Self {
        self.contracts.insert(alias.into(), name.into());
        self
    }

    /// Register `name` under `alias`, replacing any previous mapping.
    pub fn add_contract(&mut self, alias: impl Into<String>, name: impl Into<String>) {
        self.contracts.insert(alias.into(), name.into());
    }

    pub fn remove_contract(&mut self, alias: &str) -> Option<String> {
        self.contracts.remove(alias)
    }

    pub fn contract_name(&self, alias: &str) -> Option<&str> {
        self.contracts.get(alias).map(String::as_str)
    }

    pub fn has_contract(&self, alias: &str) -> bool {
        self.contracts.contains_key(alias)
    }

    pub fn contract_aliases(&self) -> Vec<String> {
        self.contracts.keys().cloned().collect()
    }

    /// Add or update a dependency; the range must be a valid semver range.
    pub fn link_dependency(&mut self, name: impl Into<String>, range: impl Into<String>) -> Result<(), KeelError> {
        let name = name.into();
        let range = range.into();
        validate_range(&name, &range)?;
        self.dependencies.insert(name, range);
        Ok(())
    }

    pub fn unlink_dependency(&mut self, name: &str) -> Option<String> {
        self.dependencies.remove(name)
    }

    pub fn has_dependency(&self, name: &str) -> bool {
        self.dependencies.contains_key(name)
    }

    /// Validate the manifest
    pub fn validate(&self) -> Result<(), KeelError> {
        if self.name.trim().is_empty() {
            return Err(KeelError::InvalidRequest(
                "project name must not be empty".to_string(),
            ));
        }

        check_manifest_version(&self.manifest_version)?;

        for (alias, name) in &self.contracts {
            if alias.trim().is_empty() || name.trim().is_empty() {
                return Err(KeelError::InvalidRequest(format!(
                    "contract entry '{alias}' = '{name}' must have a non-empty alias and name"
                )));
            }
        }

        for (name, range) in &self.dependencies {
            validate_range(name, range)?;
        }
        Ok(())
    }
}

fn validate_range(name: &str, range: &str) -> Result<(), KeelError> {
    VersionResolver::parse_constraint(range).map_err(|e| {
        KeelError::InvalidRequest(format!("dependency '{name}' has an invalid version range: {e}"))
    })?;
    Ok(())
}
