//! Dependency resolution
//!
//! Resolves linked packages to their installed manifests and on-chain
//! deployments, and orders library dependencies so a library is always
//! deployed before anything linking it.

pub mod custom;
pub mod graph;
pub mod resolver;

pub use custom::deploy_dependency;
pub use graph::{library_dependency_order, topological_order};
pub use resolver::{
    DependencyResolver, FixturePackageResolver, LocalPackageResolver, PackageResolver,
    ResolvedDependency,
};
