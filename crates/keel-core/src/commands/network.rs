//! Network commands: push, create, upgrade, set-admin and freeze.
//!
//! Each command opens the network snapshot in a [`SnapshotSession`], runs
//! one operation against it and commits the session, so whatever the
//! operation recorded before failing is kept on disk.
//!
//! [`SnapshotSession`]: crate::snapshot::SnapshotSession

use alloy_primitives::Address;

use crate::chain::ChainClient;
use crate::context::AppContext;
use crate::dependency::DependencyResolver;
use crate::deployer::ProjectDeployer;
use crate::error::KeelError;
use crate::proxy::{CreateProxyRequest, CreatedProxy, ProxyManager, ProxyReport, UpgradeRequest};
use crate::reconciler::{PushOptions, PushReport, Reconciler};
use crate::snapshot::ProxyFilter;

/// Options for the push command
#[derive(Debug, Clone, Default)]
pub struct PushCommandOptions {
    /// Aliases to push; every manifest contract when empty
    pub contracts: Vec<String>,
    pub push: PushOptions,
}

impl PushCommandOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contracts(mut self, contracts: Vec<String>) -> Self {
        self.contracts = contracts;
        self
    }

    pub fn with_options(mut self, push: PushOptions) -> Self {
        self.push = push;
        self
    }
}

/// Brings a network in line with the manifest
pub struct PushCommand {
    ctx: AppContext,
}

impl PushCommand {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    pub async fn execute<C: ChainClient>(
        &self,
        chain: &C,
        network: &str,
        options: &PushCommandOptions,
    ) -> anyhow::Result<PushReport> {
        let manifest = self.ctx.manifest_store().load()?;
        let artifacts = self.ctx.artifacts();
        let packages = self.ctx.package_resolver();
        let dependencies = DependencyResolver::new(&packages, network);
        let reconciler = Reconciler::new(chain, &artifacts, &dependencies, &manifest);

        let mut session = self.ctx.snapshot_store(network).open()?;
        let result = reconciler
            .push(session.snapshot_mut(), &options.contracts, options.push)
            .await;
        session.commit(result)
    }
}

/// Creates proxies and plain instances
pub struct CreateCommand {
    ctx: AppContext,
}

impl CreateCommand {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    pub async fn execute<C: ChainClient>(
        &self,
        chain: &C,
        network: &str,
        request: CreateProxyRequest,
    ) -> anyhow::Result<CreatedProxy> {
        let manifest = self.ctx.manifest_store().load()?;
        let artifacts = self.ctx.artifacts();
        let packages = self.ctx.package_resolver();
        let dependencies = DependencyResolver::new(&packages, network);
        let proxies = ProxyManager::new(chain, &artifacts, &dependencies, &manifest);

        let mut session = self.ctx.snapshot_store(network).open()?;
        let result = proxies.create_proxy(session.snapshot_mut(), request).await;
        session.commit(result)
    }
}

/// Upgrades proxies to the current implementations
pub struct UpgradeCommand {
    ctx: AppContext,
}

impl UpgradeCommand {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    pub async fn execute<C: ChainClient>(
        &self,
        chain: &C,
        network: &str,
        request: UpgradeRequest,
    ) -> anyhow::Result<ProxyReport> {
        let manifest = self.ctx.manifest_store().load()?;
        let artifacts = self.ctx.artifacts();
        let packages = self.ctx.package_resolver();
        let dependencies = DependencyResolver::new(&packages, network);
        let proxies = ProxyManager::new(chain, &artifacts, &dependencies, &manifest);

        let mut session = self.ctx.snapshot_store(network).open()?;
        let result = proxies.upgrade_proxies(session.snapshot_mut(), request).await;
        session.commit(result)
    }
}

/// What set-admin changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetAdminTarget {
    /// Admin of the selected proxies
    Proxies(ProxyFilter),
    /// Owner of the project's ProxyAdmin
    ProxyAdminOwner,
}

/// Result of the set-admin command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetAdminReport {
    pub proxies: Option<ProxyReport>,
    pub ownership_transferred: bool,
}

/// Changes proxy admins or the ProxyAdmin owner
pub struct SetAdminCommand {
    ctx: AppContext,
}

impl SetAdminCommand {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    pub async fn execute<C: ChainClient>(
        &self,
        chain: &C,
        network: &str,
        target: &SetAdminTarget,
        new_admin: Address,
    ) -> anyhow::Result<SetAdminReport> {
        if new_admin == Address::ZERO {
            anyhow::bail!("Refusing to set the zero address as admin");
        }
        let manifest = self.ctx.manifest_store().load()?;
        let artifacts = self.ctx.artifacts();
        let packages = self.ctx.package_resolver();
        let dependencies = DependencyResolver::new(&packages, network);
        let proxies = ProxyManager::new(chain, &artifacts, &dependencies, &manifest);

        let mut session = self.ctx.snapshot_store(network).open()?;
        let result = match target {
            SetAdminTarget::Proxies(filter) => proxies
                .set_proxies_admin(session.snapshot_mut(), filter, new_admin)
                .await
                .map(|report| SetAdminReport {
                    proxies: Some(report),
                    ownership_transferred: false,
                }),
            SetAdminTarget::ProxyAdminOwner => proxies
                .transfer_proxy_admin_ownership(session.snapshot(), new_admin)
                .await
                .map(|transferred| SetAdminReport {
                    proxies: None,
                    ownership_transferred: transferred,
                }),
        };
        session.commit(result)
    }
}

/// Result of the freeze command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreezeReport {
    pub version: String,
    pub already_frozen: bool,
}

/// Seals the current release of a published project
pub struct FreezeCommand {
    ctx: AppContext,
}

impl FreezeCommand {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    pub async fn execute<C: ChainClient>(&self, chain: &C, network: &str) -> anyhow::Result<FreezeReport> {
        let manifest = self.ctx.manifest_store().load()?;
        let artifacts = self.ctx.artifacts();
        let deployer = ProjectDeployer::new(chain, &artifacts, &manifest);

        let mut session = self.ctx.snapshot_store(network).open()?;
        let already_frozen = session.snapshot().frozen;
        let result = async {
            let project = deployer.fetch(session.snapshot())?;
            project.freeze(chain).await?;
            let snapshot = session.snapshot_mut();
            snapshot.freeze();
            let version = snapshot
                .version
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default();
            tracing::info!("Froze version {} of {} on {}", version, manifest.name, network);
            Ok::<_, KeelError>(FreezeReport {
                version,
                already_frozen,
            })
        }
        .await;
        session.commit(result)
    }
}
