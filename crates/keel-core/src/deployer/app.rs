use alloy_primitives::Address;
use semver::Version;

use super::{ProxyAdminProject, deploy_system};
use crate::artifacts::ArtifactProvider;
use crate::chain::ChainClient;
use crate::chain::contracts::{
    APP_CONTRACT, AppContract, DIRECTORY_CONTRACT, DirectoryContract, PACKAGE_CONTRACT,
    PackageContract,
};
use crate::error::{KeelError, Result};
use crate::snapshot::NetworkSnapshot;
use crate::version::to_semver_triple;

/// Published project: an `App` links the project's `Package`, whose current
/// version points at the `ImplementationDirectory` holding its implementations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppProject {
    pub name: String,
    pub version: Version,
    pub app: Address,
    pub package: Address,
    pub directory: Address,
    pub proxy_admin: Address,
}

impl AppProject {
    /// The project recorded in `snapshot`.
    pub fn fetch(snapshot: &NetworkSnapshot, name: &str, proxy_admin: Address) -> Result<Self> {
        let missing = |what| KeelError::MissingProjectContract { what };
        Ok(Self {
            name: name.to_string(),
            version: snapshot.version.clone().ok_or(missing("version"))?,
            app: snapshot.app_address().ok_or(missing("App"))?,
            package: snapshot.package_address().ok_or(missing("Package"))?,
            directory: snapshot.provider_address().ok_or(missing("ImplementationDirectory"))?,
            proxy_admin,
        })
    }

    /// Deploy whatever part of the container is missing for `version`.
    pub async fn ensure<C: ChainClient>(
        chain: &C,
        artifacts: &dyn ArtifactProvider,
        snapshot: &mut NetworkSnapshot,
        name: &str,
        version: &Version,
        proxy_admin: Address,
    ) -> Result<Self> {
        let package = match snapshot.package_address() {
            Some(address) => address,
            None => {
                let address = deploy_system(chain, artifacts, PACKAGE_CONTRACT, &[]).await?;
                snapshot.package = Some(address.into());
                address
            }
        };

        let directory = Self::ensure_version(chain, artifacts, snapshot, package, version).await?;

        let app = match snapshot.app_address() {
            Some(address) => address,
            None => {
                let address = deploy_system(chain, artifacts, APP_CONTRACT, &[]).await?;
                snapshot.app = Some(address.into());
                address
            }
        };

        let project = Self {
            name: name.to_string(),
            version: version.clone(),
            app,
            package,
            directory,
            proxy_admin,
        };
        project.set_dependency(chain, name, package, version).await?;
        Ok(project)
    }

    /// Directory registered for `version` in the package, deploying and
    /// registering a new one when the package does not have that version yet.
    async fn ensure_version<C: ChainClient>(
        chain: &C,
        artifacts: &dyn ArtifactProvider,
        snapshot: &mut NetworkSnapshot,
        package: Address,
        version: &Version,
    ) -> Result<Address> {
        let triple = to_semver_triple(version);
        let registry = PackageContract::new(package, chain);

        let recorded = snapshot
            .provider_address()
            .filter(|_| snapshot.version.as_ref() == Some(version));
        let directory = match recorded {
            Some(address) => address,
            None => {
                if registry.has_version(triple).await? {
                    registry.contract(triple).await?
                } else {
                    deploy_system(chain, artifacts, DIRECTORY_CONTRACT, &[]).await?
                }
            }
        };
        snapshot.provider = Some(directory.into());

        if !registry.has_version(triple).await? {
            registry
                .add_version(triple, directory)
                .await
                .map_err(|e| KeelError::deployment(format!("registering version {version}"), e))?;
        }
        snapshot.version = Some(version.clone());
        Ok(directory)
    }

    /// Publish a project that so far only had a `ProxyAdmin`, registering every
    /// recorded implementation and dependency under the new container.
    ///
    /// Running it again changes nothing and keeps every address.
    pub async fn from_proxy_admin_project<C: ChainClient>(
        chain: &C,
        artifacts: &dyn ArtifactProvider,
        snapshot: &mut NetworkSnapshot,
        name: &str,
        version: &Version,
        previous: ProxyAdminProject,
    ) -> Result<Self> {
        let project = Self::ensure(chain, artifacts, snapshot, name, version, previous.proxy_admin).await?;

        let directory = DirectoryContract::new(project.directory, chain);
        for (alias, record) in snapshot.contracts() {
            if directory.implementation(alias).await? != record.address {
                directory
                    .set_implementation(alias, record.address)
                    .await
                    .map_err(|e| KeelError::deployment(format!("registering {alias}"), e))?;
            }
        }

        for (dependency, record) in snapshot.dependencies() {
            let Some(package) = record.package else {
                continue;
            };
            let linked = Version::parse(&record.version).map_err(|e| {
                KeelError::InvalidRequest(format!(
                    "dependency {dependency} has an invalid version {}: {e}",
                    record.version
                ))
            })?;
            project.set_dependency(chain, dependency, package, &linked).await?;
        }
        tracing::info!("Published project {} at App {}", name, project.app);
        Ok(project)
    }

    pub async fn register_implementation<C: ChainClient>(
        &self,
        chain: &C,
        alias: &str,
        implementation: Address,
    ) -> Result<()> {
        DirectoryContract::new(self.directory, chain)
            .set_implementation(alias, implementation)
            .await?;
        Ok(())
    }

    pub async fn unregister_implementation<C: ChainClient>(&self, chain: &C, alias: &str) -> Result<()> {
        DirectoryContract::new(self.directory, chain)
            .unset_implementation(alias)
            .await?;
        Ok(())
    }

    /// Point the App's entry for `name` at `package`/`version`, if it does not already.
    pub async fn set_dependency<C: ChainClient>(
        &self,
        chain: &C,
        name: &str,
        package: Address,
        version: &Version,
    ) -> Result<()> {
        let app = AppContract::new(self.app, chain);
        let triple = to_semver_triple(version);
        if app.package(name).await? == (package, triple) {
            return Ok(());
        }
        app.set_package(name, package, triple)
            .await
            .map_err(|e| KeelError::deployment(format!("linking {name}"), e))
    }

    pub async fn unset_dependency<C: ChainClient>(&self, chain: &C, name: &str) -> Result<()> {
        let app = AppContract::new(self.app, chain);
        if app.package(name).await?.0 == Address::ZERO {
            return Ok(());
        }
        app.unset_package(name)
            .await
            .map_err(|e| KeelError::deployment(format!("unlinking {name}"), e))
    }

    pub async fn freeze<C: ChainClient>(&self, chain: &C) -> Result<()> {
        let directory = DirectoryContract::new(self.directory, chain);
        if !directory.frozen().await? {
            directory.freeze().await?;
        }
        Ok(())
    }
}
