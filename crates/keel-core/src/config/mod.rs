//! User configuration and the TOML plumbing shared with the manifest.

pub mod parser;
pub mod paths;
pub mod schema;
pub mod store;

pub use parser::{parse_toml_file, parse_toml_str, to_toml};
pub use paths::{MANIFEST_FILE, manifest_path, snapshot_file_name};
pub use schema::{NetworkConfig, UserConfig};
pub use store::ConfigStore;
