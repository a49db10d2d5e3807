//! High-level commands for keel operations.
//!
//! This module provides the public API frontends call. Manifest commands
//! only touch keel.toml; network commands take a chain client and persist
//! the network snapshot on every exit path.

pub mod network;
pub mod project;
pub mod status;

pub use network::{
    CreateCommand, FreezeCommand, FreezeReport, PushCommand, PushCommandOptions, SetAdminCommand,
    SetAdminReport, SetAdminTarget, UpgradeCommand,
};
pub use project::{
    AddCommand, AddOptions, BumpCommand, InitCommand, InitOptions, LinkCommand, LinkOptions,
    RemoveCommand, UnlinkCommand,
};
pub use status::{StatusCommand, StatusReport};
