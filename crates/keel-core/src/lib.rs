//! Keel Core Library
//!
//! Tracks what a smart contract project has deployed on each network and
//! brings networks in line with the project manifest: uploading changed
//! implementations, linking dependency packages, and creating and upgrading
//! proxies.

pub mod artifacts;
pub mod batch;
pub mod chain;
pub mod commands;
pub mod config;
pub mod context;
pub mod dependency;
pub mod deployer;
pub mod error;
pub mod manifest;
pub mod proxy;
pub mod reconciler;
pub mod retry;
pub mod snapshot;
pub mod types;
pub mod validation;
pub mod verify;
pub mod version;

/// Re-exports of commonly used types
pub mod prelude {
    // Errors
    pub use crate::error::{KeelError, Result};

    // Chain
    pub use crate::chain::{ChainClient, ChainError, RpcChainClient, TransactionReceipt};

    // Artifacts
    pub use crate::artifacts::{ArtifactProvider, BuildDirArtifacts, ContractDescriptor};

    // Project state
    pub use crate::manifest::{ManifestStore, ProjectManifest};
    pub use crate::snapshot::{
        ContractRecord, DependencyRecord, NetworkSnapshot, ProxyFilter, ProxyInstance, SnapshotStore,
    };
    pub use crate::types::{ContractKey, ProxyKind};

    // Operations
    pub use crate::dependency::{DependencyResolver, PackageResolver};
    pub use crate::deployer::ProjectDeployer;
    pub use crate::proxy::{CreateProxyRequest, ProxyManager, ProxyReport, UpgradeRequest};
    pub use crate::reconciler::{PushOptions, PushReport, Reconciler};

    // Context
    pub use crate::context::{AppContext, NetworkTarget};
}
