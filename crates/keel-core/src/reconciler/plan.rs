//! What a push has to do, computed before anything is sent to the chain.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::artifacts::{ArtifactProvider, ContractDescriptor};
use crate::dependency::graph::{library_graph, reachable_libraries, topological_order};
use crate::error::{KeelError, Result};
use crate::manifest::ProjectManifest;
use crate::snapshot::NetworkSnapshot;

/// Options for a push
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushOptions {
    /// Upload every library and contract even when unchanged
    pub reupload: bool,
    /// Accept new validation warnings
    pub force: bool,
    /// Deploy private copies of dependencies missing on the network
    pub deploy_dependencies: bool,
}

impl PushOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reupload(mut self, reupload: bool) -> Self {
        self.reupload = reupload;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_deploy_dependencies(mut self, deploy_dependencies: bool) -> Self {
        self.deploy_dependencies = deploy_dependencies;
        self
    }
}

/// Progress of a push. Each stage is reached only after the previous one
/// completed; a failure leaves the snapshot with whatever earlier stages
/// recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PushStage {
    #[default]
    Unlinked,
    VersionChecked,
    ProjectEnsured,
    LibrariesUploaded,
    ContractsUploaded,
    ContractsPruned,
    Done,
    Failed,
}

impl fmt::Display for PushStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PushStage::Unlinked => "unlinked",
            PushStage::VersionChecked => "version checked",
            PushStage::ProjectEnsured => "project ensured",
            PushStage::LibrariesUploaded => "libraries uploaded",
            PushStage::ContractsUploaded => "contracts uploaded",
            PushStage::ContractsPruned => "contracts pruned",
            PushStage::Done => "done",
            PushStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of a push
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    /// Libraries uploaded, in upload order
    pub libraries: Vec<String>,
    /// Contract aliases uploaded
    pub contracts: Vec<String>,
    pub removed_contracts: Vec<String>,
    pub removed_libraries: Vec<String>,
    pub linked_dependencies: Vec<String>,
    pub unlinked_dependencies: Vec<String>,
    /// Validation warnings accepted during this push, as `alias: warning`
    pub warnings: Vec<String>,
    /// The project adopted a new version during this push
    pub version_bumped: bool,
}

impl PushReport {
    pub fn nothing_to_do(&self) -> bool {
        self.libraries.is_empty()
            && self.contracts.is_empty()
            && self.removed_contracts.is_empty()
            && self.removed_libraries.is_empty()
    }
}

/// A contract selected for upload.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub alias: String,
    pub descriptor: ContractDescriptor,
}

/// Libraries and contracts a push touches.
#[derive(Debug, Clone, Default)]
pub struct PushPlan {
    /// Every library the manifest's contracts link, dependencies first
    pub libraries: Vec<String>,
    /// Libraries that need uploading
    pub changed_libraries: BTreeSet<String>,
    pub candidates: Vec<Candidate>,
    /// The manifest version differs from the published version
    pub new_version: bool,
}

impl PushPlan {
    /// Plan a push of `contract_names` (every manifest contract when empty).
    pub fn compute(
        manifest: &ProjectManifest,
        snapshot: &NetworkSnapshot,
        artifacts: &dyn ArtifactProvider,
        contract_names: &[String],
        reupload: bool,
    ) -> Result<Self> {
        let names: Vec<String> = manifest.contracts.values().cloned().collect();
        let graph = library_graph(&names, artifacts)?;
        let linked: BTreeSet<&String> = graph.values().flatten().collect();
        let libraries: Vec<String> = topological_order(&graph)?
            .into_iter()
            .filter(|name| linked.contains(name))
            .collect();

        // Dependencies come first, so a library linking a changed one is
        // marked before anything that links it.
        let mut changed_libraries = BTreeSet::new();
        for library in &libraries {
            let changed = reupload
                || graph
                    .get(library)
                    .is_some_and(|linked| linked.iter().any(|l| changed_libraries.contains(l)))
                || match snapshot.library(library) {
                    Some(record) => !record.matches(&artifacts.contract(library)?),
                    None => true,
                };
            if changed {
                changed_libraries.insert(library.clone());
            }
        }

        let new_version =
            snapshot.is_published() && snapshot.version.as_ref() != Some(&manifest.version);

        let aliases = if contract_names.is_empty() || new_version {
            manifest.contract_aliases()
        } else {
            for alias in contract_names {
                if !manifest.has_contract(alias) {
                    return Err(KeelError::ContractNotFound {
                        alias: alias.clone(),
                    });
                }
            }
            contract_names.to_vec()
        };

        let mut candidates = Vec::new();
        for alias in aliases {
            let Some(name) = manifest.contract_name(&alias) else {
                continue;
            };
            let descriptor = artifacts.contract(name)?;
            let changed = reupload
                || new_version
                || snapshot
                    .contract(&alias)
                    .is_none_or(|record| !record.matches(&descriptor))
                || links_changed(name, &graph, &changed_libraries);
            if changed {
                candidates.push(Candidate { alias, descriptor });
            }
        }

        Ok(Self {
            libraries,
            changed_libraries,
            candidates,
            new_version,
        })
    }

    /// Libraries linked by at least one manifest contract.
    pub fn referenced_libraries(&self) -> BTreeSet<&str> {
        self.libraries.iter().map(String::as_str).collect()
    }
}

fn links_changed(
    name: &str,
    graph: &BTreeMap<String, Vec<String>>,
    changed: &BTreeSet<String>,
) -> bool {
    !changed.is_empty()
        && reachable_libraries(name, graph)
            .iter()
            .any(|library| changed.contains(library))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::StaticArtifacts;
    use crate::snapshot::ContractRecord;
    use alloy_primitives::Address;
    use semver::Version;

    const PLACEHOLDER_L: &str = "__L_____________________________________";

    fn artifacts() -> StaticArtifacts {
        StaticArtifacts::new()
            .with(ContractDescriptor::new("A", "0x6001"))
            .with(ContractDescriptor::new("B", format!("0x6002{PLACEHOLDER_L}")))
            .with(ContractDescriptor::new("L", "0x6003"))
    }

    fn manifest() -> ProjectManifest {
        ProjectManifest::new("demo", Version::new(1, 0, 0))
            .with_contract("A", "A")
            .with_contract("B", "B")
    }

    fn deployed_snapshot(artifacts: &StaticArtifacts) -> NetworkSnapshot {
        let mut snapshot = NetworkSnapshot::new();
        snapshot.version = Some(Version::new(1, 0, 0));
        for (alias, byte) in [("A", 1u8), ("B", 2)] {
            let descriptor = artifacts.contract(alias).unwrap();
            snapshot.set_contract(alias, ContractRecord::deployed(&descriptor, Address::repeat_byte(byte)));
        }
        let library = artifacts.contract("L").unwrap();
        snapshot.set_library("L", ContractRecord::deployed(&library, Address::repeat_byte(3)));
        snapshot
    }

    fn aliases(plan: &PushPlan) -> Vec<&str> {
        plan.candidates.iter().map(|c| c.alias.as_str()).collect()
    }

    #[test]
    fn test_first_push_plans_everything() {
        let artifacts = artifacts();
        let plan =
            PushPlan::compute(&manifest(), &NetworkSnapshot::new(), &artifacts, &[], false).unwrap();
        assert_eq!(plan.libraries, vec!["L"]);
        assert!(plan.changed_libraries.contains("L"));
        assert_eq!(aliases(&plan), vec!["A", "B"]);
        assert!(!plan.new_version);
    }

    #[test]
    fn test_unchanged_project_plans_nothing() {
        let artifacts = artifacts();
        let snapshot = deployed_snapshot(&artifacts);
        let plan = PushPlan::compute(&manifest(), &snapshot, &artifacts, &[], false).unwrap();
        assert!(plan.changed_libraries.is_empty());
        assert!(plan.candidates.is_empty());
    }

    #[test]
    fn test_changed_library_selects_linking_contracts() {
        let artifacts = artifacts();
        let snapshot = deployed_snapshot(&artifacts);
        let changed = artifacts.with(ContractDescriptor::new("L", "0x6004"));
        let plan = PushPlan::compute(&manifest(), &snapshot, &changed, &[], false).unwrap();
        assert_eq!(aliases(&plan), vec!["B"]);
    }

    #[test]
    fn test_changed_inner_library_marks_outer_library() {
        let l2 = "__L2____________________________________";
        let nested = StaticArtifacts::new()
            .with(ContractDescriptor::new("A", "0x6001"))
            .with(ContractDescriptor::new("B", format!("0x6002{PLACEHOLDER_L}")))
            .with(ContractDescriptor::new("L", format!("0x6003{l2}")))
            .with(ContractDescriptor::new("L2", "0x6005"));
        let mut snapshot = deployed_snapshot(&nested);
        let inner = nested.contract("L2").unwrap();
        snapshot.set_library("L2", ContractRecord::deployed(&inner, Address::repeat_byte(4)));

        let changed = nested.with(ContractDescriptor::new("L2", "0x6006"));
        let plan = PushPlan::compute(&manifest(), &snapshot, &changed, &[], false).unwrap();
        assert_eq!(plan.libraries, vec!["L2", "L"]);
        assert_eq!(
            plan.changed_libraries.iter().collect::<Vec<_>>(),
            vec!["L", "L2"]
        );
        assert_eq!(aliases(&plan), vec!["B"]);
    }

    #[test]
    fn test_reupload_selects_everything() {
        let artifacts = artifacts();
        let snapshot = deployed_snapshot(&artifacts);
        let plan = PushPlan::compute(&manifest(), &snapshot, &artifacts, &[], true).unwrap();
        assert_eq!(plan.changed_libraries.len(), 1);
        assert_eq!(aliases(&plan), vec!["A", "B"]);
    }

    #[test]
    fn test_explicit_names_are_checked() {
        let artifacts = artifacts();
        let err = PushPlan::compute(
            &manifest(),
            &NetworkSnapshot::new(),
            &artifacts,
            &["C".to_string()],
            false,
        )
        .unwrap_err();
        assert!(matches!(err, KeelError::ContractNotFound { alias } if alias == "C"));

        let plan = PushPlan::compute(
            &manifest(),
            &NetworkSnapshot::new(),
            &artifacts,
            &["A".to_string()],
            false,
        )
        .unwrap();
        assert_eq!(aliases(&plan), vec!["A"]);
    }

    #[test]
    fn test_published_version_change_selects_everything() {
        let artifacts = artifacts();
        let mut snapshot = deployed_snapshot(&artifacts);
        snapshot.app = Some(Address::repeat_byte(9).into());
        let manifest = ProjectManifest {
            version: Version::new(1, 1, 0),
            ..manifest()
        };
        let plan =
            PushPlan::compute(&manifest, &snapshot, &artifacts, &["A".to_string()], false).unwrap();
        assert!(plan.new_version);
        assert_eq!(aliases(&plan), vec!["A", "B"]);
    }
}
