//! Private deployment of a dependency.
//!
//! On networks where a dependency's publisher never deployed it, a project
//! can deploy its own copy: the dependency's libraries and contracts, an
//! `ImplementationDirectory` registering them, and a `Package` holding the
//! dependency's version. The result is written to the dependency's own
//! snapshot so later resolutions find it.

use std::collections::BTreeMap;

use alloy_primitives::Address;

use super::graph::library_dependency_order;
use super::resolver::DependencyResolver;
use crate::artifacts::ArtifactProvider;
use crate::chain::ChainClient;
use crate::chain::contracts::{DIRECTORY_CONTRACT, DirectoryContract, PACKAGE_CONTRACT, PackageContract};
use crate::deployer::{deploy_linked, deploy_system};
use crate::error::{KeelError, Result};
use crate::manifest::ProjectManifest;
use crate::snapshot::{ContractRecord, NetworkSnapshot};
use crate::version::to_semver_triple;

/// Deploy dependency `name` and return its package address.
///
/// `system` supplies the `Package` and `ImplementationDirectory` artifacts.
/// The dependency's snapshot is saved even when deployment fails midway.
pub async fn deploy_dependency<C: ChainClient>(
    chain: &C,
    system: &dyn ArtifactProvider,
    resolver: &DependencyResolver<'_>,
    name: &str,
) -> Result<Address> {
    let manifest = resolver.load_manifest(name)?;
    let artifacts = resolver.artifacts(name)?;
    let store = resolver.snapshot_store(name)?;
    let mut snapshot = store.load()?;

    tracing::info!(
        "Deploying a private copy of {}@{} on {}",
        name,
        manifest.version,
        resolver.network()
    );
    let result = deploy_into(chain, system, &artifacts, &manifest, &mut snapshot).await;

    match (result, store.save_if_changed(&snapshot)) {
        (Ok(package), Ok(_)) => Ok(package),
        (Ok(_), Err(save_err)) => Err(save_err.into()),
        (Err(err), Ok(_)) => Err(err),
        (Err(err), Err(save_err)) => {
            tracing::warn!("Failed to save snapshot of {}: {:#}", name, save_err);
            Err(err)
        }
    }
}

async fn deploy_into<C: ChainClient>(
    chain: &C,
    system: &dyn ArtifactProvider,
    artifacts: &dyn ArtifactProvider,
    manifest: &ProjectManifest,
    snapshot: &mut NetworkSnapshot,
) -> Result<Address> {
    let contract_names: Vec<String> = manifest.contracts.values().cloned().collect();
    for library in library_dependency_order(&contract_names, artifacts)? {
        if snapshot.library(&library).is_some() {
            continue;
        }
        let descriptor = artifacts.contract(&library)?;
        let address = deploy_linked(chain, &descriptor, &snapshot.library_addresses())
            .await
            .map_err(|e| KeelError::deployment(format!("deploying library {library}"), e))?;
        snapshot.set_library(library, ContractRecord::deployed(&descriptor, address));
    }

    for (alias, contract_name) in &manifest.contracts {
        let descriptor = artifacts.contract(contract_name)?;
        if snapshot.contract(alias).is_some_and(|record| record.matches(&descriptor)) {
            continue;
        }
        let address = deploy_linked(chain, &descriptor, &snapshot.library_addresses())
            .await
            .map_err(|e| KeelError::deployment(format!("deploying {alias}"), e))?;
        snapshot.set_contract(alias.clone(), ContractRecord::deployed(&descriptor, address));
    }

    let directory = match snapshot.provider_address() {
        Some(address) => address,
        None => {
            let address = deploy_system(chain, system, DIRECTORY_CONTRACT, &[]).await?;
            snapshot.provider = Some(address.into());
            address
        }
    };
    let registered: BTreeMap<String, Address> = snapshot
        .contracts()
        .iter()
        .map(|(alias, record)| (alias.clone(), record.address))
        .collect();
    let directory_contract = DirectoryContract::new(directory, chain);
    for (alias, address) in registered {
        if directory_contract.implementation(&alias).await? != address {
            directory_contract.set_implementation(&alias, address).await?;
        }
    }

    let package = match snapshot.package_address() {
        Some(address) => address,
        None => {
            let address = deploy_system(chain, system, PACKAGE_CONTRACT, &[]).await?;
            snapshot.package = Some(address.into());
            address
        }
    };
    let triple = to_semver_triple(&manifest.version);
    let registry = PackageContract::new(package, chain);
    if !registry.has_version(triple).await? {
        registry.add_version(triple, directory).await?;
    }
    snapshot.version = Some(manifest.version.clone());
    Ok(package)
}
