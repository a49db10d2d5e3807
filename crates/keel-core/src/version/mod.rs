//! Version constraints, schema tags and comparison helpers.

pub mod constraints;
pub mod manifest;

pub use constraints::{
    VersionConstraint, VersionResolver, ensure_monotonic, satisfies_version, to_semver_triple,
};
pub use manifest::{MANIFEST_VERSION, check_manifest_version};
