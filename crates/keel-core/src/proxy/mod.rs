//! Proxy lifecycle: creation, upgrades and admin changes.
//!
//! Every instance created here is recorded in the snapshot under its
//! `package/Contract` key. Upgradeable proxies are only ever touched when
//! this project administers them; minimal proxies and plain instances are
//! never upgraded.

mod request;

use std::collections::BTreeMap;

use alloy_primitives::{Address, Bytes, U256};

pub use request::{CreateProxyRequest, CreatedProxy, InitCall, ProxyReport, UpgradeRequest};

use crate::artifacts::{ArtifactProvider, ContractDescriptor};
use crate::batch::{all_or_aggregate, settle_all};
use crate::chain::contracts::{
    PROXY_CONTRACT, ProxyAdminContract, ProxyFactoryContract, created_proxy,
    proxy_constructor_args, proxy_slots,
};
use crate::chain::{ChainClient, ChainError, TransactionReceipt, has_code};
use crate::dependency::DependencyResolver;
use crate::deployer::{ProjectDeployer, deploy_linked, deploy_system};
use crate::error::{KeelError, Result};
use crate::manifest::ProjectManifest;
use crate::snapshot::{NetworkSnapshot, ProxyFilter, ProxyInstance, ProxyRecord};
use crate::types::{ContractKey, ProxyKind};

/// The implementation an instance of `package/contract` should point at.
#[derive(Debug, Clone)]
struct Target {
    implementation: Address,
    version: String,
    descriptor: ContractDescriptor,
    libraries: BTreeMap<String, Address>,
}

impl Target {
    fn init_data(&self, init: Option<&InitCall>) -> Result<Bytes> {
        match init {
            Some(init) => self.descriptor.encode_call(&init.method, &init.args),
            None => Ok(Bytes::new()),
        }
    }
}

/// Creates and maintains proxy instances for one network.
pub struct ProxyManager<'a, C> {
    chain: &'a C,
    artifacts: &'a dyn ArtifactProvider,
    dependencies: &'a DependencyResolver<'a>,
    manifest: &'a ProjectManifest,
}

impl<'a, C: ChainClient> ProxyManager<'a, C> {
    pub fn new(
        chain: &'a C,
        artifacts: &'a dyn ArtifactProvider,
        dependencies: &'a DependencyResolver<'a>,
        manifest: &'a ProjectManifest,
    ) -> Self {
        Self {
            chain,
            artifacts,
            dependencies,
            manifest,
        }
    }

    fn deployer(&self) -> ProjectDeployer<'a, C> {
        ProjectDeployer::new(self.chain, self.artifacts, self.manifest)
    }

    /// Current implementation of `package/contract`, from this project's
    /// snapshot or from a linked dependency.
    fn target(&self, snapshot: &NetworkSnapshot, package: &str, contract: &str) -> Result<Target> {
        if package == self.manifest.name {
            let name = self
                .manifest
                .contract_name(contract)
                .ok_or_else(|| KeelError::ContractNotFound {
                    alias: contract.to_string(),
                })?;
            let record = snapshot
                .contract(contract)
                .ok_or_else(|| KeelError::ContractNotDeployed {
                    package: package.to_string(),
                    alias: contract.to_string(),
                })?;
            return Ok(Target {
                implementation: record.address,
                version: self.manifest.version.to_string(),
                descriptor: self.artifacts.contract(name)?,
                libraries: snapshot.library_addresses(),
            });
        }

        if !self.manifest.has_dependency(package) {
            return Err(KeelError::DependencyNotFound {
                name: package.to_string(),
            });
        }
        let implementation = self.dependencies.implementation(package, contract)?;
        let manifest = self.dependencies.load_manifest(package)?;
        let name = manifest
            .contract_name(contract)
            .ok_or_else(|| KeelError::ContractNotFound {
                alias: format!("{package}/{contract}"),
            })?;
        let libraries = self
            .dependencies
            .load_snapshot(package)?
            .map(|snapshot| snapshot.library_addresses())
            .unwrap_or_default();
        Ok(Target {
            implementation,
            version: manifest.version.to_string(),
            descriptor: self.dependencies.artifacts(package)?.contract(name)?,
            libraries,
        })
    }

    /// Create an instance of `request.package/request.contract` and record it.
    pub async fn create_proxy(
        &self,
        snapshot: &mut NetworkSnapshot,
        request: CreateProxyRequest,
    ) -> Result<CreatedProxy> {
        if request.salt.is_some() && !request.kind.is_upgradeable() {
            return Err(KeelError::InvalidRequest(format!(
                "a salt can only be used for upgradeable proxies, not {}",
                request.kind
            )));
        }
        if request.signature.is_some() && request.salt.is_none() {
            return Err(KeelError::InvalidRequest(
                "a signature requires a salt".to_string(),
            ));
        }

        let target = self.target(snapshot, &request.package, &request.contract)?;
        let key = ContractKey::new(&request.package, &request.contract);
        let mut warnings = Vec::new();
        if request.init.is_none() && target.descriptor.has_initializer() {
            let warning = format!(
                "Possible initialization method found in contract {}. Make sure you initialize your instance.",
                target.descriptor.name
            );
            tracing::warn!("{}", warning);
            warnings.push(warning);
        }
        let data = target.init_data(request.init.as_ref())?;

        let (address, implementation, admin) = match request.kind {
            ProxyKind::Upgradeable => {
                // A taken address is reported before the project is ensured.
                let factory = snapshot.proxy_factory_address();
                if let (Some(salt), Some(factory)) = (request.salt, factory) {
                    let admin = request.admin.or(snapshot.proxy_admin_address());
                    if request.signature.is_none() || admin.is_some() {
                        let signature = request.signature.as_ref();
                        let admin = admin.unwrap_or_default();
                        self.check_salt(factory, &target, admin, &data, salt, signature)
                            .await?;
                    }
                }
                let project = self.deployer().ensure(snapshot).await?;
                let admin = request.admin.unwrap_or(project.proxy_admin());
                let address = match request.salt {
                    Some(salt) => {
                        self.create_salted(snapshot, &target, admin, data, salt, request.signature)
                            .await?
                    }
                    None => {
                        let args = proxy_constructor_args(target.implementation, admin, &data);
                        deploy_system(self.chain, self.artifacts, PROXY_CONTRACT, &args).await?
                    }
                };
                (address, target.implementation, Some(admin))
            }
            ProxyKind::Minimal => {
                let factory = self.deployer().ensure_proxy_factory(snapshot).await?;
                let receipt = ProxyFactoryContract::new(factory, self.chain)
                    .deploy_minimal(target.implementation, data)
                    .await
                    .map_err(|e| KeelError::deployment(format!("creating minimal proxy for {key}"), e))?;
                (proxy_from(&receipt)?, target.implementation, None)
            }
            ProxyKind::NonProxy => {
                let address = deploy_linked(self.chain, &target.descriptor, &target.libraries)
                    .await
                    .map_err(|e| KeelError::deployment(format!("creating instance of {key}"), e))?;
                if !data.is_empty() {
                    self.chain
                        .send(address, data)
                        .await
                        .map_err(|e| KeelError::deployment(format!("initializing instance of {key}"), e))?;
                }
                (address, address, None)
            }
        };

        let instance = ProxyInstance {
            address,
            version: target.version,
            implementation,
            admin,
            kind: request.kind,
        };
        snapshot.add_proxy(&key, instance.clone());
        tracing::info!("Created {} instance of {} at {}", request.kind, key, address);
        Ok(CreatedProxy {
            proxy: ProxyRecord {
                package: key.package,
                contract: key.contract,
                instance,
            },
            warnings,
        })
    }

    /// Deterministic deployment through the factory. Fails before sending
    /// anything when the predicted address already has code.
    async fn create_salted(
        &self,
        snapshot: &mut NetworkSnapshot,
        target: &Target,
        admin: Address,
        data: Bytes,
        salt: U256,
        signature: Option<Bytes>,
    ) -> Result<Address> {
        let factory_address = self.deployer().ensure_proxy_factory(snapshot).await?;
        self.check_salt(factory_address, target, admin, &data, salt, signature.as_ref())
            .await?;

        let receipt = ProxyFactoryContract::new(factory_address, self.chain)
            .deploy(salt, target.implementation, admin, data, signature)
            .await
            .map_err(|e| KeelError::deployment(format!("creating proxy with salt {salt}"), e))?;
        proxy_from(&receipt)
    }

    /// Fails with [`KeelError::AddressInUse`] when the address `factory`
    /// would deploy to already has code. Only reads from the chain.
    async fn check_salt(
        &self,
        factory: Address,
        target: &Target,
        admin: Address,
        data: &Bytes,
        salt: U256,
        signature: Option<&Bytes>,
    ) -> Result<()> {
        let factory = ProxyFactoryContract::new(factory, self.chain);
        let sender = match signature {
            Some(signature) => {
                factory
                    .signer(salt, target.implementation, admin, data.clone(), signature.clone())
                    .await?
            }
            None => self.chain.default_sender(),
        };
        let predicted = factory.deployment_address(salt, sender).await?;
        if has_code(self.chain, predicted).await? {
            return Err(KeelError::AddressInUse {
                address: predicted,
                salt: salt.to_string(),
            });
        }
        Ok(())
    }

    /// Upgrade every owned upgradeable proxy selected by `request.filter` to
    /// the current implementation of its contract.
    pub async fn upgrade_proxies(
        &self,
        snapshot: &mut NetworkSnapshot,
        request: UpgradeRequest,
    ) -> Result<ProxyReport> {
        let mut report = ProxyReport::default();
        let selected = snapshot.proxies_matching(&request.filter);
        let proxy_admin = snapshot.proxy_admin_address();

        let mut targets: BTreeMap<ContractKey, Target> = BTreeMap::new();
        let mut pending = Vec::new();
        for record in selected {
            if !record.instance.kind.is_upgradeable() {
                report.unchangeable.push(record);
                continue;
            }
            let Some(proxy_admin) = owning_admin(&record, proxy_admin) else {
                let warning = format!(
                    "Skipping proxy {} of {}: it is administered by {}",
                    record.instance.address,
                    record.key(),
                    describe_admin(record.instance.admin)
                );
                tracing::warn!("{}", warning);
                report.warnings.push(warning);
                report.not_owned.push(record);
                continue;
            };

            let key = record.key();
            if !targets.contains_key(&key) {
                let target = self.target(snapshot, &key.package, &key.contract)?;
                targets.insert(key.clone(), target);
            }
            let Some(target) = targets.get(&key) else {
                continue;
            };
            let (current, _) = proxy_slots(self.chain, record.instance.address).await?;
            if current == target.implementation {
                tracing::info!(
                    "Proxy {} of {} is already up to date",
                    record.instance.address,
                    key
                );
                report.up_to_date.push(record);
                continue;
            }
            pending.push((record, proxy_admin, target.init_data(request.init.as_ref())?));
        }

        let upgrades = pending.iter().map(|(record, proxy_admin, data)| {
            let target = targets.get(&record.key());
            async move {
                let target = target.ok_or_else(|| {
                    KeelError::InvalidRequest(format!("no implementation for {}", record.key()))
                })?;
                ProxyAdminContract::new(*proxy_admin, self.chain)
                    .upgrade(record.instance.address, target.implementation, data.clone())
                    .await
                    .map_err(|e| {
                        KeelError::deployment(format!("upgrading proxy {}", record.instance.address), e)
                    })?;
                Ok::<_, KeelError>((target.implementation, target.version.clone()))
            }
        });
        let results = settle_all(upgrades).await;

        let upgraded: Vec<Result<ProxyRecord>> = pending
            .into_iter()
            .zip(results)
            .map(|((mut record, _, _), result)| {
                result.map(|(implementation, version)| {
                    snapshot.update_proxy(record.instance.address, |instance| {
                        instance.implementation = implementation;
                        instance.version = version.clone();
                    });
                    record.instance.implementation = implementation;
                    record.instance.version = version;
                    tracing::info!("Upgraded proxy {} of {}", record.instance.address, record.key());
                    record
                })
            })
            .collect();
        report.changed = all_or_aggregate(upgraded)?;
        Ok(report)
    }

    /// Hand the selected owned proxies over to `new_admin`.
    pub async fn set_proxies_admin(
        &self,
        snapshot: &mut NetworkSnapshot,
        filter: &ProxyFilter,
        new_admin: Address,
    ) -> Result<ProxyReport> {
        let mut report = ProxyReport::default();
        let proxy_admin = snapshot.proxy_admin_address();

        let mut pending = Vec::new();
        for record in snapshot.proxies_matching(filter) {
            if !record.instance.kind.is_upgradeable() {
                report.unchangeable.push(record);
                continue;
            }
            if record.instance.admin == Some(new_admin) {
                report.up_to_date.push(record);
                continue;
            }
            match owning_admin(&record, proxy_admin) {
                Some(proxy_admin) => pending.push((record, proxy_admin)),
                None => {
                    let warning = format!(
                        "Skipping proxy {} of {}: it is administered by {}",
                        record.instance.address,
                        record.key(),
                        describe_admin(record.instance.admin)
                    );
                    tracing::warn!("{}", warning);
                    report.warnings.push(warning);
                    report.not_owned.push(record);
                }
            }
        }

        let changes = pending.iter().map(|(record, proxy_admin)| async move {
            ProxyAdminContract::new(*proxy_admin, self.chain)
                .change_proxy_admin(record.instance.address, new_admin)
                .await
                .map_err(|e| {
                    KeelError::deployment(format!("changing admin of proxy {}", record.instance.address), e)
                })
        });
        let results = settle_all(changes).await;

        let changed: Vec<Result<ProxyRecord>> = pending
            .into_iter()
            .zip(results)
            .map(|((mut record, _), result)| {
                result.map(|()| {
                    snapshot.update_proxy(record.instance.address, |instance| {
                        instance.admin = Some(new_admin);
                    });
                    record.instance.admin = Some(new_admin);
                    tracing::info!("Admin of proxy {} changed to {}", record.instance.address, new_admin);
                    record
                })
            })
            .collect();
        report.changed = all_or_aggregate(changed)?;
        Ok(report)
    }

    /// Transfer ownership of the project's ProxyAdmin, and with it control
    /// over every proxy it administers. Returns false when `new_owner`
    /// already owns it.
    pub async fn transfer_proxy_admin_ownership(
        &self,
        snapshot: &NetworkSnapshot,
        new_owner: Address,
    ) -> Result<bool> {
        let address = snapshot
            .proxy_admin_address()
            .ok_or(KeelError::MissingProjectContract { what: "ProxyAdmin" })?;
        let proxy_admin = ProxyAdminContract::new(address, self.chain);
        if proxy_admin.owner().await? == new_owner {
            return Ok(false);
        }
        proxy_admin
            .transfer_ownership(new_owner)
            .await
            .map_err(|e| KeelError::deployment("transferring ProxyAdmin ownership", e))?;
        tracing::info!("ProxyAdmin {} is now owned by {}", address, new_owner);
        Ok(true)
    }
}

/// The ProxyAdmin to act through when this project administers `record`.
/// Proxies recorded without an admin predate admin tracking and belong to
/// the project.
fn owning_admin(record: &ProxyRecord, proxy_admin: Option<Address>) -> Option<Address> {
    let proxy_admin = proxy_admin?;
    match record.instance.admin {
        None => Some(proxy_admin),
        Some(admin) if admin == proxy_admin => Some(proxy_admin),
        Some(_) => None,
    }
}

fn describe_admin(admin: Option<Address>) -> String {
    admin.map_or_else(|| "an unknown admin".to_string(), |admin| admin.to_string())
}

fn proxy_from(receipt: &TransactionReceipt) -> Result<Address> {
    created_proxy(receipt).ok_or_else(|| {
        KeelError::Chain(ChainError::Decode(format!(
            "transaction {} did not emit ProxyCreated",
            receipt.transaction_hash
        )))
    })
}
