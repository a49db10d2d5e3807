//! Bootstrap strategies for the on-chain project container.
//!
//! Unpublished projects only need a `ProxyAdmin` to own their proxies.
//! Published projects also get an `App` linking a `Package` whose versions
//! map to `ImplementationDirectory` instances. Every auxiliary contract is
//! recorded in the snapshot as soon as it is deployed, so an interrupted
//! bootstrap resumes where it stopped.

mod app;

use std::collections::BTreeMap;

use alloy_primitives::{Address, Bytes};
use semver::Version;

pub use app::AppProject;

use crate::artifacts::{ArtifactProvider, ContractDescriptor};
use crate::chain::ChainClient;
use crate::chain::contracts::{PROXY_ADMIN_CONTRACT, PROXY_FACTORY_CONTRACT};
use crate::error::{KeelError, Result};
use crate::manifest::ProjectManifest;
use crate::snapshot::NetworkSnapshot;

/// Deploy `descriptor` with its libraries linked in.
pub async fn deploy_linked<C: ChainClient>(
    chain: &C,
    descriptor: &ContractDescriptor,
    libraries: &BTreeMap<String, Address>,
) -> Result<Address> {
    let code = descriptor.linked(libraries)?;
    Ok(chain.deploy(code).await?)
}

/// Deploy a system contract by artifact name, with optional constructor arguments.
pub async fn deploy_system<C: ChainClient>(
    chain: &C,
    artifacts: &dyn ArtifactProvider,
    name: &str,
    constructor_args: &[u8],
) -> Result<Address> {
    let deploy = async {
        let descriptor = artifacts.contract(name)?;
        let mut code = descriptor.linked(&BTreeMap::new())?.to_vec();
        code.extend_from_slice(constructor_args);
        let address = chain.deploy(Bytes::from(code)).await?;
        tracing::info!("Deployed {} at {}", name, address);
        Ok::<_, KeelError>(address)
    };
    deploy
        .await
        .map_err(|e| KeelError::deployment(format!("deploying {name}"), e))
}

/// Unpublished project: implementations are tracked only in the snapshot and
/// a `ProxyAdmin` owns the proxies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyAdminProject {
    pub proxy_admin: Address,
}

/// The on-chain container a project registers its implementations with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Project {
    ProxyAdmin(ProxyAdminProject),
    App(AppProject),
}

impl Project {
    /// Admin of every upgradeable proxy the project creates.
    pub fn proxy_admin(&self) -> Address {
        match self {
            Project::ProxyAdmin(project) => project.proxy_admin,
            Project::App(project) => project.proxy_admin,
        }
    }

    pub fn is_published(&self) -> bool {
        matches!(self, Project::App(_))
    }

    pub async fn register_implementation<C: ChainClient>(
        &self,
        chain: &C,
        alias: &str,
        implementation: Address,
    ) -> Result<()> {
        match self {
            Project::ProxyAdmin(_) => Ok(()),
            Project::App(project) => {
                project
                    .register_implementation(chain, alias, implementation)
                    .await
            }
        }
    }

    pub async fn unregister_implementation<C: ChainClient>(&self, chain: &C, alias: &str) -> Result<()> {
        match self {
            Project::ProxyAdmin(_) => Ok(()),
            Project::App(project) => project.unregister_implementation(chain, alias).await,
        }
    }

    pub async fn set_dependency<C: ChainClient>(
        &self,
        chain: &C,
        name: &str,
        package: Address,
        version: &Version,
    ) -> Result<()> {
        match self {
            Project::ProxyAdmin(_) => Ok(()),
            Project::App(project) => project.set_dependency(chain, name, package, version).await,
        }
    }

    pub async fn unset_dependency<C: ChainClient>(&self, chain: &C, name: &str) -> Result<()> {
        match self {
            Project::ProxyAdmin(_) => Ok(()),
            Project::App(project) => project.unset_dependency(chain, name).await,
        }
    }

    /// Seal the current version.
    pub async fn freeze<C: ChainClient>(&self, chain: &C) -> Result<()> {
        match self {
            Project::ProxyAdmin(_) => Err(KeelError::NotPublished { operation: "freeze" }),
            Project::App(project) => project.freeze(chain).await,
        }
    }
}

/// Deploys or fetches the project container recorded in a snapshot.
pub struct ProjectDeployer<'a, C> {
    chain: &'a C,
    artifacts: &'a dyn ArtifactProvider,
    manifest: &'a ProjectManifest,
}

impl<'a, C: ChainClient> ProjectDeployer<'a, C> {
    pub fn new(chain: &'a C, artifacts: &'a dyn ArtifactProvider, manifest: &'a ProjectManifest) -> Self {
        Self {
            chain,
            artifacts,
            manifest,
        }
    }

    /// Container for the manifest's publish setting. A project that was
    /// published once stays published.
    pub async fn ensure(&self, snapshot: &mut NetworkSnapshot) -> Result<Project> {
        if snapshot.is_published() {
            Ok(Project::App(self.ensure_app_project(snapshot).await?))
        } else if self.manifest.publish {
            let previous = self.ensure_proxy_admin_project(snapshot).await?;
            Ok(Project::App(
                AppProject::from_proxy_admin_project(
                    self.chain,
                    self.artifacts,
                    snapshot,
                    &self.manifest.name,
                    &self.manifest.version,
                    previous,
                )
                .await?,
            ))
        } else {
            Ok(Project::ProxyAdmin(
                self.ensure_proxy_admin_project(snapshot).await?,
            ))
        }
    }

    /// The recorded project, without deploying anything.
    pub fn fetch(&self, snapshot: &NetworkSnapshot) -> Result<Project> {
        let proxy_admin = snapshot
            .proxy_admin_address()
            .ok_or(KeelError::MissingProjectContract { what: "ProxyAdmin" })?;
        if snapshot.is_published() {
            Ok(Project::App(AppProject::fetch(
                snapshot,
                &self.manifest.name,
                proxy_admin,
            )?))
        } else {
            Ok(Project::ProxyAdmin(ProxyAdminProject { proxy_admin }))
        }
    }

    pub async fn ensure_proxy_admin_project(
        &self,
        snapshot: &mut NetworkSnapshot,
    ) -> Result<ProxyAdminProject> {
        let proxy_admin = self.ensure_proxy_admin(snapshot).await?;
        if snapshot.version.is_none() {
            snapshot.version = Some(self.manifest.version.clone());
        }
        Ok(ProxyAdminProject { proxy_admin })
    }

    pub async fn ensure_app_project(&self, snapshot: &mut NetworkSnapshot) -> Result<AppProject> {
        let proxy_admin = self.ensure_proxy_admin(snapshot).await?;
        AppProject::ensure(
            self.chain,
            self.artifacts,
            snapshot,
            &self.manifest.name,
            &self.manifest.version,
            proxy_admin,
        )
        .await
    }

    async fn ensure_proxy_admin(&self, snapshot: &mut NetworkSnapshot) -> Result<Address> {
        if let Some(address) = snapshot.proxy_admin_address() {
            return Ok(address);
        }
        let address = deploy_system(self.chain, self.artifacts, PROXY_ADMIN_CONTRACT, &[]).await?;
        snapshot.proxy_admin = Some(address.into());
        Ok(address)
    }

    /// The factory is only needed for minimal and salted proxies, so it is
    /// deployed on first use.
    pub async fn ensure_proxy_factory(&self, snapshot: &mut NetworkSnapshot) -> Result<Address> {
        if let Some(address) = snapshot.proxy_factory_address() {
            return Ok(address);
        }
        let address = deploy_system(self.chain, self.artifacts, PROXY_FACTORY_CONTRACT, &[]).await?;
        snapshot.proxy_factory = Some(address.into());
        Ok(address)
    }
}
