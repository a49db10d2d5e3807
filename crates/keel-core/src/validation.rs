//! Pre-deployment checks for implementation contracts.
//!
//! Implementations sit behind proxies, so a constructor never runs in the
//! proxy's context and the storage layout must only ever grow by appending.

use crate::artifacts::{ContractDescriptor, StorageEntry, StorageLayout};
use crate::snapshot::ContractRecord;

/// Outcome of validating one contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub alias: String,
    pub warnings: Vec<String>,
    pub storage: StorageLayout,
}

impl ValidationResult {
    /// Warnings not already accepted in `previous`.
    pub fn new_warnings(&self, previous: Option<&ContractRecord>) -> Vec<String> {
        let accepted: &[String] = previous.map(|r| r.warnings.as_slice()).unwrap_or_default();
        self.warnings
            .iter()
            .filter(|warning| !accepted.contains(warning))
            .cloned()
            .collect()
    }
}

/// Validate `descriptor` for deployment under `alias`, comparing its storage
/// with the layout recorded for the previously deployed version.
pub fn validate_contract(
    alias: &str,
    descriptor: &ContractDescriptor,
    previous: Option<&ContractRecord>,
) -> ValidationResult {
    let mut warnings = Vec::new();

    if descriptor.has_constructor_inputs() {
        warnings.push(format!(
            "{} has a constructor with arguments; use an initializer function instead",
            descriptor.name
        ));
    }

    if let Some(previous) = previous {
        let previous_layout = StorageLayout {
            storage: previous.storage.clone(),
            types: previous.types.clone(),
        };
        warnings.extend(compare_storage(&previous_layout, &descriptor.storage));
    }

    ValidationResult {
        alias: alias.to_string(),
        warnings,
        storage: descriptor.storage.clone(),
    }
}

/// Incompatibilities between an old and a new layout. Appending is allowed.
fn compare_storage(old: &StorageLayout, new: &StorageLayout) -> Vec<String> {
    let mut warnings = Vec::new();
    for (index, before) in old.storage.iter().enumerate() {
        let Some(after) = new.storage.get(index) else {
            warnings.push(format!("variable {} was removed", describe(old, before)));
            continue;
        };
        if before.label != after.label {
            let renamed = new.storage.iter().any(|e| e.label == before.label);
            if renamed {
                warnings.push(format!(
                    "variable {} was moved; {} now occupies its position",
                    describe(old, before),
                    describe(new, after)
                ));
            } else {
                warnings.push(format!(
                    "variable {} was replaced by {}",
                    describe(old, before),
                    describe(new, after)
                ));
            }
            continue;
        }
        let (old_type, new_type) = (old.type_label(before), new.type_label(after));
        if old_type != new_type {
            warnings.push(format!(
                "variable {} changed type from {} to {}",
                before.label, old_type, new_type
            ));
        }
    }
    warnings
}

fn describe(layout: &StorageLayout, entry: &StorageEntry) -> String {
    format!("{}: {}", entry.label, layout.type_label(entry))
}
