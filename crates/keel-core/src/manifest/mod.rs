//! Project manifest (keel.toml).

pub mod schema;
pub mod store;

pub use schema::{CompilerSettings, OptimizerSettings, ProjectManifest};
pub use store::ManifestStore;
