//! Source verification against a block explorer.
//!
//! The HTTP integration lives behind [`Verifier`]; this module assembles the
//! request from the project state and polls for the outcome.

use alloy_primitives::Address;

use crate::artifacts::ArtifactProvider;
use crate::error::{KeelError, Result};
use crate::manifest::{OptimizerSettings, ProjectManifest};
use crate::retry::{RetryPolicy, retry};
use crate::snapshot::NetworkSnapshot;

/// State of a submitted verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationStatus {
    Pending,
    Verified,
    Failed(String),
}

/// Everything an explorer needs to verify one deployed contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationParams {
    pub contract_name: String,
    pub address: Address,
    /// Flattened source code
    pub source: String,
    pub compiler_version: String,
    pub evm_version: Option<String>,
    pub optimizer: Option<OptimizerSettings>,
}

impl VerificationParams {
    /// Parameters for the implementation deployed under `alias`.
    pub fn from_snapshot(
        manifest: &ProjectManifest,
        snapshot: &NetworkSnapshot,
        artifacts: &dyn ArtifactProvider,
        alias: &str,
        source: String,
    ) -> Result<Self> {
        let name = manifest
            .contract_name(alias)
            .ok_or_else(|| KeelError::ContractNotFound {
                alias: alias.to_string(),
            })?;
        let record = snapshot
            .contract(alias)
            .ok_or_else(|| KeelError::ContractNotDeployed {
                package: manifest.name.clone(),
                alias: alias.to_string(),
            })?;
        let descriptor = artifacts.contract(name)?;
        let compiler_version = manifest
            .compiler
            .version
            .clone()
            .or(descriptor.compiler_version)
            .ok_or_else(|| {
                KeelError::Verification(format!("no compiler version known for {name}"))
            })?;
        Ok(Self {
            contract_name: descriptor.name,
            address: record.address,
            source,
            compiler_version,
            evm_version: manifest.compiler.evm_version.clone(),
            optimizer: manifest.compiler.optimizer,
        })
    }
}

/// A block explorer's verification API.
#[allow(async_fn_in_trait)]
pub trait Verifier {
    fn name(&self) -> &str;

    /// Submit a verification request, returning the explorer's request id.
    async fn submit(&self, params: &VerificationParams) -> Result<String>;

    async fn status(&self, request_id: &str) -> Result<VerificationStatus>;
}

/// Submit `params` to `remote` and poll until it reports the contract as
/// verified. Exhausting `policy` surfaces the last error seen.
pub async fn verify_and_publish<V: Verifier>(
    remote: &V,
    params: &VerificationParams,
    policy: RetryPolicy,
) -> Result<()> {
    let request_id = remote.submit(params).await?;
    tracing::info!(
        "Submitted {} at {} to {} for verification",
        params.contract_name,
        params.address,
        remote.name()
    );

    let request_id = request_id.as_str();
    let outcome = retry(policy, move |_| async move {
        match remote.status(request_id).await? {
            VerificationStatus::Verified => Ok(()),
            VerificationStatus::Pending => Err(KeelError::Verification(
                "verification is still pending".to_string(),
            )),
            VerificationStatus::Failed(reason) => Err(KeelError::Verification(reason)),
        }
    })
    .await;

    match outcome {
        Ok(()) => {
            tracing::info!("{} verified on {}", params.contract_name, remote.name());
            Ok(())
        }
        Err(KeelError::Verification(reason)) => Err(KeelError::Verification(format!(
            "{} at {}: {}",
            params.contract_name, params.address, reason
        ))),
        Err(err) => Err(err),
    }
}
