//! Chain client capability.
//!
//! The engine never talks to a node directly; it goes through [`ChainClient`],
//! which offers the handful of primitives deployment needs. The JSON-RPC
//! implementation lives in [`rpc`], typed wrappers for the system contracts in
//! [`contracts`].

pub mod contracts;
pub mod rpc;

use alloy_primitives::{Address, B256, Bytes};
use thiserror::Error;

pub use rpc::RpcChainClient;

/// Failures reported by a chain client.
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    /// Transport or node-level failure
    #[error("rpc error: {0}")]
    Rpc(String),
    /// The transaction or call reverted
    #[error("transaction reverted: {0}")]
    Reverted(String),
    /// A transaction was not mined within the polling budget
    #[error("timed out waiting for {what} after {attempts} attempts")]
    Timeout { what: String, attempts: u32 },
    /// Returned data could not be decoded
    #[error("could not decode {0}")]
    Decode(String),
}

/// An event log emitted by a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

/// Receipt of a mined transaction.
#[derive(Debug, Clone, Default)]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    pub contract_address: Option<Address>,
    pub logs: Vec<Log>,
}

/// Primitive operations against an Ethereum-compatible network.
///
/// Every method is a suspension point; callers fan out over independent calls
/// with `futures::future::join_all` rather than spawning threads.
#[allow(async_fn_in_trait)]
pub trait ChainClient {
    /// Network identifier reported by the node.
    async fn network_id(&self) -> Result<u64, ChainError>;

    /// Account transactions are sent from.
    fn default_sender(&self) -> Address;

    /// Deploy `init_code` (creation bytecode plus encoded constructor arguments).
    async fn deploy(&self, init_code: Bytes) -> Result<Address, ChainError>;

    /// Send a transaction and wait for it to be mined.
    async fn send(&self, to: Address, data: Bytes) -> Result<TransactionReceipt, ChainError>;

    /// Execute a read-only call.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError>;

    /// Runtime code at `address`, empty when nothing is deployed there.
    async fn get_code(&self, address: Address) -> Result<Bytes, ChainError>;

    /// Raw storage word at `slot`.
    async fn get_storage_at(&self, address: Address, slot: B256) -> Result<B256, ChainError>;
}

/// Whether `address` has code deployed.
pub async fn has_code<C: ChainClient>(chain: &C, address: Address) -> Result<bool, ChainError> {
    Ok(!chain.get_code(address).await?.is_empty())
}
