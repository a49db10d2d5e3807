//! Deployment reconciliation.
//!
//! A push diffs the manifest against the network snapshot and sends the
//! transactions needed to make them agree. Every uploaded library and
//! contract is recorded in the snapshot as soon as it succeeds; the caller
//! persists the snapshot on every exit path (see [`SnapshotSession`]).
//!
//! [`SnapshotSession`]: crate::snapshot::SnapshotSession

mod plan;

use std::cell::Cell;
use std::collections::BTreeMap;

use alloy_primitives::Address;

pub use plan::{Candidate, PushOptions, PushPlan, PushReport, PushStage};

use crate::artifacts::ArtifactProvider;
use crate::batch::{all_or_aggregate, settle_all};
use crate::chain::ChainClient;
use crate::dependency::{DependencyResolver, deploy_dependency};
use crate::deployer::{Project, ProjectDeployer, deploy_linked};
use crate::error::{KeelError, Result, ValidationFailure};
use crate::manifest::ProjectManifest;
use crate::snapshot::{ContractRecord, DependencyRecord, NetworkSnapshot};
use crate::validation::{ValidationResult, validate_contract};
use crate::version::ensure_monotonic;

/// Drives a network snapshot towards the project manifest.
pub struct Reconciler<'a, C> {
    chain: &'a C,
    artifacts: &'a dyn ArtifactProvider,
    dependencies: &'a DependencyResolver<'a>,
    manifest: &'a ProjectManifest,
    stage: Cell<PushStage>,
}

impl<'a, C: ChainClient> Reconciler<'a, C> {
    /// `artifacts` must provide the project's contracts as well as the
    /// system contracts (`ProxyAdmin`, `App`, ...).
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
            stage: Cell::new(PushStage::Unlinked),
        }
    }

    /// Stage the last push reached.
    pub fn stage(&self) -> PushStage {
        self.stage.get()
    }

    /// Push `contract_names`, or every manifest contract when empty.
    pub async fn push(
        &self,
        snapshot: &mut NetworkSnapshot,
        contract_names: &[String],
        options: PushOptions,
    ) -> Result<PushReport> {
        self.stage.set(PushStage::Unlinked);
        match self.run(snapshot, contract_names, options).await {
            Ok(report) => {
                self.stage.set(PushStage::Done);
                Ok(report)
            }
            Err(err) => {
                tracing::warn!("Push failed after stage '{}': {}", self.stage.get(), err);
                self.stage.set(PushStage::Failed);
                Err(err)
            }
        }
    }

    /// Validate `contract_names` against the snapshot without sending anything.
    pub fn validate(
        &self,
        snapshot: &NetworkSnapshot,
        contract_names: &[String],
    ) -> Result<Vec<ValidationResult>> {
        let plan = PushPlan::compute(self.manifest, snapshot, self.artifacts, contract_names, false)?;
        Ok(plan
            .candidates
            .iter()
            .map(|c| validate_contract(&c.alias, &c.descriptor, snapshot.contract(&c.alias)))
            .collect())
    }

    async fn run(
        &self,
        snapshot: &mut NetworkSnapshot,
        contract_names: &[String],
        options: PushOptions,
    ) -> Result<PushReport> {
        let mut report = PushReport::default();
        let plan = PushPlan::compute(
            self.manifest,
            snapshot,
            self.artifacts,
            contract_names,
            options.reupload,
        )?;

        let accepted = self.validate_candidates(snapshot, &plan, options.force, &mut report)?;

        if let Some(current) = &snapshot.version {
            ensure_monotonic(current, &self.manifest.version)?;
        }
        if plan.new_version {
            tracing::info!(
                "Adopting version {} of {}",
                self.manifest.version,
                self.manifest.name
            );
            snapshot.unfreeze();
            snapshot.clear_contracts();
            report.version_bumped = true;
        } else if !snapshot.is_published() {
            if snapshot.version.as_ref() != Some(&self.manifest.version) {
                report.version_bumped = snapshot.version.is_some();
            }
            snapshot.version = Some(self.manifest.version.clone());
        }
        self.stage.set(PushStage::VersionChecked);

        let project = ProjectDeployer::new(self.chain, self.artifacts, self.manifest)
            .ensure(snapshot)
            .await?;
        self.link_dependencies(snapshot, &project, options, &mut report)
            .await?;
        self.stage.set(PushStage::ProjectEnsured);

        if snapshot.frozen {
            return Err(KeelError::FrozenProject {
                version: self.manifest.version.to_string(),
            });
        }

        self.upload_libraries(snapshot, &plan, &mut report).await?;
        self.stage.set(PushStage::LibrariesUploaded);

        self.upload_contracts(snapshot, &plan, &project, accepted, &mut report)
            .await?;
        self.stage.set(PushStage::ContractsUploaded);

        self.prune(snapshot, &plan, &project, &mut report).await?;
        self.stage.set(PushStage::ContractsPruned);

        if report.nothing_to_do() {
            tracing::info!("All contracts are up to date");
        }
        Ok(report)
    }

    /// Validation warnings per candidate. Fails before anything is mutated
    /// when a candidate has warnings not accepted before and `force` is off.
    fn validate_candidates(
        &self,
        snapshot: &NetworkSnapshot,
        plan: &PushPlan,
        force: bool,
        report: &mut PushReport,
    ) -> Result<BTreeMap<String, Vec<String>>> {
        let mut accepted = BTreeMap::new();
        let mut failures = Vec::new();
        for candidate in &plan.candidates {
            let previous = snapshot.contract(&candidate.alias);
            let result = validate_contract(&candidate.alias, &candidate.descriptor, previous);
            let new_warnings = result.new_warnings(previous);
            if !new_warnings.is_empty() && !force {
                failures.push(ValidationFailure {
                    alias: candidate.alias.clone(),
                    warnings: new_warnings,
                });
                continue;
            }
            for warning in &result.warnings {
                tracing::warn!("{}: {}", candidate.alias, warning);
                report.warnings.push(format!("{}: {}", candidate.alias, warning));
            }
            accepted.insert(candidate.alias.clone(), result.warnings);
        }
        if failures.is_empty() {
            Ok(accepted)
        } else {
            Err(KeelError::Validation { failures })
        }
    }

    async fn link_dependencies(
        &self,
        snapshot: &mut NetworkSnapshot,
        project: &Project,
        options: PushOptions,
        report: &mut PushReport,
    ) -> Result<()> {
        for (name, range) in &self.manifest.dependencies {
            let resolved = self.dependencies.resolve(name, range)?;
            let was_custom = snapshot.dependency(name).is_some_and(|d| d.custom_deploy);
            let (package, custom) = match resolved.package {
                Some(package) => (package, was_custom),
                None if options.deploy_dependencies => {
                    let package =
                        deploy_dependency(self.chain, self.artifacts, self.dependencies, name)
                            .await
                            .map_err(|e| KeelError::deployment(format!("deploying dependency {name}"), e))?;
                    (package, true)
                }
                None => {
                    return Err(KeelError::DependencyNotDeployed {
                        name: name.clone(),
                        network: self.dependencies.network().to_string(),
                    });
                }
            };

            project
                .set_dependency(self.chain, name, package, &resolved.version)
                .await?;
            let mut record = DependencyRecord::new(Some(package), resolved.version.to_string());
            if custom {
                record = record.custom();
            }
            if snapshot.dependency(name) != Some(&record) {
                tracing::info!("Linked {}@{} at {}", name, resolved.version, package);
                report.linked_dependencies.push(name.clone());
            }
            snapshot.set_dependency(name.clone(), record);
        }

        let stale: Vec<String> = snapshot
            .dependencies()
            .keys()
            .filter(|name| !self.manifest.has_dependency(name))
            .cloned()
            .collect();
        for name in stale {
            project
                .unset_dependency(self.chain, &name)
                .await
                .map_err(|e| KeelError::deployment(format!("unlinking {name}"), e))?;
            snapshot.unset_dependency(&name);
            tracing::info!("Unlinked {}", name);
            report.unlinked_dependencies.push(name);
        }
        Ok(())
    }

    /// Libraries go one at a time, each after the libraries it links.
    async fn upload_libraries(
        &self,
        snapshot: &mut NetworkSnapshot,
        plan: &PushPlan,
        report: &mut PushReport,
    ) -> Result<()> {
        for library in plan
            .libraries
            .iter()
            .filter(|library| plan.changed_libraries.contains(*library))
        {
            let upload = async {
                let descriptor = self.artifacts.contract(library)?;
                let address = deploy_linked(self.chain, &descriptor, &snapshot.library_addresses()).await?;
                Ok::<_, KeelError>(ContractRecord::deployed(&descriptor, address))
            };
            let record = upload
                .await
                .map_err(|e| KeelError::deployment(format!("uploading library {library}"), e))?;
            tracing::info!("Uploaded library {} at {}", library, record.address);
            snapshot.set_library(library.clone(), record);
            report.libraries.push(library.clone());
        }
        Ok(())
    }

    /// Contracts are independent once their libraries are in place, so they
    /// are uploaded together. Every success is recorded even when siblings fail.
    async fn upload_contracts(
        &self,
        snapshot: &mut NetworkSnapshot,
        plan: &PushPlan,
        project: &Project,
        mut accepted: BTreeMap<String, Vec<String>>,
        report: &mut PushReport,
    ) -> Result<()> {
        let libraries = snapshot.library_addresses();
        let uploads = plan.candidates.iter().map(|candidate| {
            let libraries = &libraries;
            async move {
                let alias = &candidate.alias;
                let address = deploy_linked(self.chain, &candidate.descriptor, libraries)
                    .await
                    .map_err(|e| KeelError::deployment(format!("uploading contract {alias}"), e))?;
                project
                    .register_implementation(self.chain, alias, address)
                    .await
                    .map_err(|e| KeelError::deployment(format!("registering contract {alias}"), e))?;
                Ok::<Address, KeelError>(address)
            }
        });
        let results = settle_all(uploads).await;

        let recorded: Vec<Result<String>> = plan
            .candidates
            .iter()
            .zip(results)
            .map(|(candidate, result)| {
                result.map(|address| {
                    let warnings = accepted.remove(&candidate.alias).unwrap_or_default();
                    tracing::info!("Uploaded {} at {}", candidate.alias, address);
                    snapshot.set_contract(
                        candidate.alias.clone(),
                        ContractRecord::deployed(&candidate.descriptor, address).with_warnings(warnings),
                    );
                    candidate.alias.clone()
                })
            })
            .collect();
        report.contracts = all_or_aggregate(recorded)?;
        Ok(())
    }

    /// Drop contracts no longer in the manifest, then libraries nothing links.
    async fn prune(
        &self,
        snapshot: &mut NetworkSnapshot,
        plan: &PushPlan,
        project: &Project,
        report: &mut PushReport,
    ) -> Result<()> {
        let removed: Vec<String> = snapshot
            .contract_aliases()
            .into_iter()
            .filter(|alias| !self.manifest.has_contract(alias))
            .collect();
        let removals = removed.iter().map(|alias| async move {
            project
                .unregister_implementation(self.chain, alias)
                .await
                .map_err(|e| KeelError::deployment(format!("removing contract {alias}"), e))
        });
        let results = settle_all(removals).await;

        let unset: Vec<Result<String>> = removed
            .into_iter()
            .zip(results)
            .map(|(alias, result)| {
                result.map(|()| {
                    snapshot.unset_contract(&alias);
                    tracing::info!("Removed {}", alias);
                    alias
                })
            })
            .collect();
        report.removed_contracts = all_or_aggregate(unset)?;

        let referenced = plan.referenced_libraries();
        let stale: Vec<String> = snapshot
            .libraries()
            .keys()
            .filter(|library| !referenced.contains(library.as_str()))
            .cloned()
            .collect();
        for library in stale {
            snapshot.unset_library(&library);
            tracing::info!("Removed library {}", library);
            report.removed_libraries.push(library);
        }
        Ok(())
    }
}
