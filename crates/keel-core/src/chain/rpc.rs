//! JSON-RPC chain client.
//!
//! Transactions are sent with `eth_sendTransaction`, relying on the node to
//! hold the sender's key. Receipts are polled with a fixed [`RetryPolicy`].

use std::sync::atomic::{AtomicU64, Ordering};

use alloy_primitives::{Address, B256, Bytes, U256};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use url::Url;

use super::{ChainClient, ChainError, Log, TransactionReceipt};
use crate::retry::{RetryPolicy, poll};

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    address: Address,
    topics: Vec<B256>,
    data: Bytes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    contract_address: Option<Address>,
    status: Option<String>,
    #[serde(default)]
    logs: Vec<RpcLog>,
}

impl RpcReceipt {
    fn succeeded(&self) -> bool {
        !matches!(self.status.as_deref(), Some("0x0") | Some("0x00"))
    }
}

impl From<RpcReceipt> for TransactionReceipt {
    fn from(receipt: RpcReceipt) -> Self {
        TransactionReceipt {
            transaction_hash: receipt.transaction_hash,
            contract_address: receipt.contract_address,
            logs: receipt
                .logs
                .into_iter()
                .map(|log| Log {
                    address: log.address,
                    topics: log.topics,
                    data: log.data,
                })
                .collect(),
        }
    }
}

/// Chain client speaking Ethereum JSON-RPC over HTTP.
pub struct RpcChainClient {
    http: Client,
    url: Url,
    from: Address,
    receipt_policy: RetryPolicy,
    next_id: AtomicU64,
}

impl RpcChainClient {
    /// Connect to `url`. Without an explicit sender the node's first account is used.
    pub async fn connect(
        url: Url,
        from: Option<Address>,
        receipt_policy: RetryPolicy,
    ) -> Result<Self, ChainError> {
        let mut client = Self {
            http: Client::new(),
            url,
            from: from.unwrap_or_default(),
            receipt_policy,
            next_id: AtomicU64::new(1),
        };
        if from.is_none() {
            let accounts: Vec<Address> = client.request("eth_accounts", json!([])).await?;
            client.from = accounts
                .first()
                .copied()
                .ok_or_else(|| ChainError::Rpc("node has no unlocked accounts".to_string()))?;
        }
        tracing::debug!("Connected to {} as {}", client.url, client.from);
        Ok(client)
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ChainError> {
        let value = self.request_raw(method, params).await?;
        serde_json::from_value(value).map_err(|e| ChainError::Decode(format!("{method} result: {e}")))
    }

    async fn request_raw(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| ChainError::Rpc(format!("{method}: {e}")))?;
        if !response.status().is_success() {
            return Err(ChainError::Rpc(format!(
                "{method}: HTTP {}",
                response.status()
            )));
        }
        let response: RpcResponse = response
            .json()
            .await
            .map_err(|e| ChainError::Decode(format!("{method} response: {e}")))?;

        if let Some(error) = response.error {
            return Err(classify_error(method, error));
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    async fn send_transaction(&self, to: Option<Address>, data: Bytes) -> Result<RpcReceipt, ChainError> {
        let mut tx = json!({ "from": self.from, "data": data });
        if let Some(to) = to {
            tx["to"] = json!(to);
        }
        let hash: B256 = self.request("eth_sendTransaction", json!([tx])).await?;
        let receipt = self.wait_for_receipt(hash).await?;
        if !receipt.succeeded() {
            return Err(ChainError::Reverted(format!("transaction {hash}")));
        }
        Ok(receipt)
    }

    async fn wait_for_receipt(&self, hash: B256) -> Result<RpcReceipt, ChainError> {
        let receipt = poll(self.receipt_policy, || async move {
            self.request::<Option<RpcReceipt>>("eth_getTransactionReceipt", json!([hash]))
                .await
        })
        .await?;
        receipt.ok_or_else(|| ChainError::Timeout {
            what: format!("receipt of {hash}"),
            attempts: self.receipt_policy.attempts,
        })
    }
}

impl ChainClient for RpcChainClient {
    async fn network_id(&self) -> Result<u64, ChainError> {
        let id: String = self.request("net_version", json!([])).await?;
        parse_quantity(&id).ok_or_else(|| ChainError::Decode(format!("network id '{id}'")))
    }

    fn default_sender(&self) -> Address {
        self.from
    }

    async fn deploy(&self, init_code: Bytes) -> Result<Address, ChainError> {
        let receipt = self.send_transaction(None, init_code).await?;
        receipt.contract_address.ok_or_else(|| {
            ChainError::Decode(format!(
                "receipt of {} has no contract address",
                receipt.transaction_hash
            ))
        })
    }

    async fn send(&self, to: Address, data: Bytes) -> Result<TransactionReceipt, ChainError> {
        Ok(self.send_transaction(Some(to), data).await?.into())
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        self.request(
            "eth_call",
            json!([{ "from": self.from, "to": to, "data": data }, "latest"]),
        )
        .await
    }

    async fn get_code(&self, address: Address) -> Result<Bytes, ChainError> {
        self.request("eth_getCode", json!([address, "latest"])).await
    }

    async fn get_storage_at(&self, address: Address, slot: B256) -> Result<B256, ChainError> {
        let word: String = self
            .request("eth_getStorageAt", json!([address, slot, "latest"]))
            .await?;
        parse_word(&word).ok_or_else(|| ChainError::Decode(format!("storage word '{word}'")))
    }
}

fn classify_error(method: &str, error: RpcErrorBody) -> ChainError {
    if error.message.to_lowercase().contains("revert") {
        ChainError::Reverted(error.message)
    } else {
        ChainError::Rpc(format!("{method} failed ({}): {}", error.code, error.message))
    }
}

/// Decimal or `0x`-prefixed quantity.
fn parse_quantity(value: &str) -> Option<u64> {
    match value.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

/// Some nodes return storage words without left padding.
fn parse_word(value: &str) -> Option<B256> {
    let hex = value.strip_prefix("0x").unwrap_or(value);
    if hex.is_empty() {
        return Some(B256::ZERO);
    }
    let word = U256::from_str_radix(hex, 16).ok()?;
    Some(B256::from(word.to_be_bytes::<32>()))
}
