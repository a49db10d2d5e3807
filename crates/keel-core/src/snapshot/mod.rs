//! Per-network deployment snapshots.

pub mod store;
pub mod types;

pub use store::{SnapshotSession, SnapshotStore};
pub use types::{
    AddressRecord, ContractRecord, DependencyRecord, NetworkSnapshot, ProxyFilter, ProxyInstance,
    ProxyRecord,
};
