//! Status of a project on one network.
//!
//! Compares the manifest and the local build against the network snapshot.
//! Nothing is sent to the chain.

use serde::Serialize;

use crate::artifacts::ArtifactProvider;
use crate::context::AppContext;
use crate::dependency::DependencyResolver;
use crate::manifest::ProjectManifest;
use crate::snapshot::{NetworkSnapshot, ProxyFilter};
use crate::types::ProxyKind;
use crate::version::satisfies_version;

/// Deployment state of a manifest contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractState {
    /// Deployed and matching the local build
    Deployed,
    /// Deployed, but the local build differs
    Changed,
    NotDeployed,
    /// Recorded on the network but no longer in the manifest
    Removed,
    /// No artifact to compare against
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractStatus {
    pub alias: String,
    pub contract: Option<String>,
    pub address: Option<String>,
    pub state: ContractState,
    pub warnings: Vec<String>,
}

/// Link state of a manifest dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyState {
    Linked,
    /// Linked at a version the manifest no longer accepts
    Outdated,
    NotLinked,
    /// Linked on the network but no longer in the manifest
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyStatus {
    pub name: String,
    pub range: Option<String>,
    pub linked_version: Option<String>,
    pub package: Option<String>,
    pub custom_deploy: bool,
    pub state: DependencyState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyStatus {
    pub key: String,
    pub address: String,
    pub implementation: String,
    pub version: String,
    pub kind: ProxyKind,
    pub admin: Option<String>,
}

/// Overall status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub project: String,
    pub network: String,
    pub manifest_version: String,
    pub deployed_version: Option<String>,
    pub published: bool,
    pub frozen: bool,
    pub contracts: Vec<ContractStatus>,
    pub dependencies: Vec<DependencyStatus>,
    pub proxies: Vec<ProxyStatus>,
}

impl StatusReport {
    /// Whether a push would change anything for contracts.
    pub fn has_pending_changes(&self) -> bool {
        self.contracts
            .iter()
            .any(|c| c.state != ContractState::Deployed)
            || self
                .dependencies
                .iter()
                .any(|d| d.state != DependencyState::Linked)
    }
}

/// Reports manifest vs. network state
pub struct StatusCommand {
    ctx: AppContext,
}

impl StatusCommand {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    pub fn execute(&self, network: &str) -> anyhow::Result<StatusReport> {
        let manifest = self.ctx.manifest_store().load()?;
        let snapshot = self.ctx.snapshot_store(network).load()?;
        let artifacts = self.ctx.artifacts();
        let packages = self.ctx.package_resolver();
        let dependencies = DependencyResolver::new(&packages, network);
        Ok(collect_status(&manifest, &snapshot, &artifacts, &dependencies))
    }
}

pub fn collect_status(
    manifest: &ProjectManifest,
    snapshot: &NetworkSnapshot,
    artifacts: &dyn ArtifactProvider,
    dependencies: &DependencyResolver<'_>,
) -> StatusReport {
    let mut contracts: Vec<ContractStatus> = manifest
        .contracts
        .iter()
        .map(|(alias, name)| {
            let record = snapshot.contract(alias);
            let state = match (record, artifacts.contract(name)) {
                (None, _) => ContractState::NotDeployed,
                (Some(_), Err(_)) => ContractState::Unknown,
                (Some(record), Ok(descriptor)) if record.matches(&descriptor) => ContractState::Deployed,
                (Some(_), Ok(_)) => ContractState::Changed,
            };
            ContractStatus {
                alias: alias.clone(),
                contract: Some(name.clone()),
                address: record.map(|r| r.address.to_string()),
                state,
                warnings: record.map(|r| r.warnings.clone()).unwrap_or_default(),
            }
        })
        .collect();
    contracts.extend(
        snapshot
            .contracts()
            .iter()
            .filter(|(alias, _)| !manifest.has_contract(alias))
            .map(|(alias, record)| ContractStatus {
                alias: alias.clone(),
                contract: None,
                address: Some(record.address.to_string()),
                state: ContractState::Removed,
                warnings: record.warnings.clone(),
            }),
    );

    let mut dependency_status: Vec<DependencyStatus> = manifest
        .dependencies
        .iter()
        .map(|(name, range)| {
            let record = snapshot.dependency(name);
            let state = match record {
                None => DependencyState::NotLinked,
                Some(record) if satisfies_version(&record.version, range) => DependencyState::Linked,
                Some(_) => DependencyState::Outdated,
            };
            DependencyStatus {
                name: name.clone(),
                range: Some(range.clone()),
                linked_version: record.map(|r| r.version.clone()),
                package: record.and_then(|r| r.package).map(|a| a.to_string()),
                custom_deploy: record.is_some_and(|r| r.custom_deploy),
                state,
            }
        })
        .collect();
    dependency_status.extend(
        snapshot
            .dependencies()
            .iter()
            .filter(|(name, _)| !manifest.has_dependency(name))
            .map(|(name, record)| DependencyStatus {
                name: name.clone(),
                range: None,
                linked_version: Some(record.version.clone()),
                package: record.package.map(|a| a.to_string()),
                custom_deploy: record.custom_deploy,
                state: DependencyState::Removed,
            }),
    );
    for status in &dependency_status {
        if status.state == DependencyState::NotLinked && dependencies.load_manifest(&status.name).is_err() {
            tracing::warn!("Dependency {} is not installed", status.name);
        }
    }

    let proxies = snapshot
        .proxies_matching(&ProxyFilter::all())
        .into_iter()
        .map(|record| ProxyStatus {
            key: record.key().to_string(),
            address: record.instance.address.to_string(),
            implementation: record.instance.implementation.to_string(),
            version: record.instance.version.clone(),
            kind: record.instance.kind,
            admin: record.instance.admin.map(|a| a.to_string()),
        })
        .collect();

    StatusReport {
        project: manifest.name.clone(),
        network: dependencies.network().to_string(),
        manifest_version: manifest.version.to_string(),
        deployed_version: snapshot.version.as_ref().map(ToString::to_string),
        published: snapshot.is_published(),
        frozen: snapshot.frozen,
        contracts,
        dependencies: dependency_status,
        proxies,
    }
}
