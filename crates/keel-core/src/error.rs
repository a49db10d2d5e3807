//! Error taxonomy for reconciliation, dependency resolution and proxy management.
//!
//! Store-level failures (reading or writing files) travel as `anyhow::Error`
//! and are wrapped in [`KeelError::Other`]; everything the engine decides on
//! its own has a dedicated variant so callers can match on it.

use alloy_primitives::Address;
use thiserror::Error;

use crate::chain::ChainError;

/// Result alias used by the engine.
pub type Result<T, E = KeelError> = std::result::Result<T, E>;

/// Validation warnings that blocked a contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    /// Contract alias in the manifest
    pub alias: String,
    /// Warnings not previously accepted for this alias
    pub warnings: Vec<String>,
}

#[derive(Debug, Error)]
pub enum KeelError {
    #[error(
        "validation failed, push again with --force to accept these warnings:\n{}",
        format_validation(.failures)
    )]
    Validation { failures: Vec<ValidationFailure> },

    #[error("version {version} of the project is frozen; bump the version to push changes")]
    FrozenProject { version: String },

    #[error("cyclic library dependency: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("dependency '{name}' could not be found; is it installed?")]
    DependencyNotFound { name: String },

    #[error("installed version {installed} of '{name}' does not satisfy the required version {required}")]
    VersionMismatch {
        name: String,
        required: String,
        installed: String,
    },

    #[error("dependency '{name}' has no deployment on network '{network}'; link it with deploy_dependencies to deploy a private copy")]
    DependencyNotDeployed { name: String, network: String },

    #[error("address {address} for salt {salt} is already in use")]
    AddressInUse { address: Address, salt: String },

    #[error("{context}: {source}")]
    Deployment {
        context: String,
        #[source]
        source: Box<KeelError>,
    },

    #[error("{} operations failed:\n{}", .failures.len(), format_batch(.failures))]
    Batch { failures: Vec<KeelError> },

    #[error("unsupported manifest version {found}, expected {supported}")]
    UnsupportedManifestVersion { found: String, supported: String },

    #[error("contract '{alias}' is not defined in the project")]
    ContractNotFound { alias: String },

    #[error("contract '{alias}' of package '{package}' has not been deployed on this network; push it first")]
    ContractNotDeployed { package: String, alias: String },

    #[error("project version {requested} is lower than the deployed version {current}")]
    VersionRegression { current: String, requested: String },

    #[error("project has no {what} on this network; push it first")]
    MissingProjectContract { what: &'static str },

    #[error("{operation} requires a published project")]
    NotPublished { operation: &'static str },

    #[error("artifact for '{name}' is unusable: {reason}")]
    Artifact { name: String, reason: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("verification failed: {0}")]
    Verification(String),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl KeelError {
    /// Wrap a failure with what was being done when it happened.
    pub fn deployment(context: impl Into<String>, source: impl Into<KeelError>) -> Self {
        KeelError::Deployment {
            context: context.into(),
            source: Box::new(source.into()),
        }
    }

    /// Combine the failures of a batch; a single failure is returned unchanged.
    pub fn batch(mut failures: Vec<KeelError>) -> Self {
        if failures.len() == 1 {
            return failures.remove(0);
        }
        KeelError::Batch { failures }
    }

    /// Innermost error, looking through [`KeelError::Deployment`] wrappers.
    pub fn root(&self) -> &KeelError {
        match self {
            KeelError::Deployment { source, .. } => source.root(),
            other => other,
        }
    }
}

fn format_validation(failures: &[ValidationFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("  - {}: {}", failure.alias, failure.warnings.join("; ")))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_batch(failures: &[KeelError]) -> String {
    failures
        .iter()
        .map(|failure| format!("  - {failure}"))
        .collect::<Vec<_>>()
        .join("\n")
}
