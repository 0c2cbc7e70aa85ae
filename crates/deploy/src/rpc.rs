//! JSON-RPC chain provider.

use std::time::Duration;

use alloy_core::primitives::{Address, TxHash, U64};
use anyhow::Context;
use backon::{ConstantBuilder, Retryable};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::{ChainProvider, NetworkProfile, TransactionReceipt, TransactionRequest};

/// Timeout of a single JSON-RPC request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Default interval between receipt polls.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// HTTP client shared by every request of a provider.
pub fn create_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Response envelope. A missing or `null` result is kept as `Value::Null` so that
/// optional results such as pending receipts decode to `None`.
#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    error: Option<RpcError>,
}

impl RpcResponse {
    fn into_result<T: DeserializeOwned>(self, method: &str) -> anyhow::Result<T> {
        if let Some(RpcError { code, message }) = self.error {
            anyhow::bail!("{method} failed with RPC error {code}: {message}");
        }

        serde_json::from_value(self.result)
            .with_context(|| format!("Unexpected {method} result"))
    }
}

/// Send `method` to the node at `url` and decode its result as `T`.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &Url,
    method: &str,
    params: Vec<Value>,
) -> anyhow::Result<T> {
    let request = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    });

    let response: RpcResponse = client
        .post(url.clone())
        .json(&request)
        .send()
        .await
        .with_context(|| format!("Failed to send {method} request"))?
        .json()
        .await
        .with_context(|| format!("Failed to parse {method} response"))?;

    response.into_result(method)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: TxHash,
    /// Absent on pre-Byzantium chains, which are treated as successful.
    #[serde(default)]
    status: Option<U64>,
    #[serde(default)]
    contract_address: Option<Address>,
    gas_used: U64,
}

impl From<RpcReceipt> for TransactionReceipt {
    fn from(receipt: RpcReceipt) -> Self {
        Self {
            tx_hash: receipt.transaction_hash,
            success: receipt.status.is_none_or(|status| status == U64::from(1)),
            contract_address: receipt.contract_address,
            gas_used: receipt.gas_used.to(),
        }
    }
}

/// Submits transactions through a node that holds the sender's key.
///
/// Transactions are sent unsigned with `eth_sendTransaction` from the profile's signer
/// account, so the node must have that account unlocked. The mnemonic only selects
/// the sender. Public endpoints that accept nothing but signed raw transactions
/// need a different [`ChainProvider`].
#[derive(Debug, Clone)]
pub struct JsonRpcProvider {
    client: reqwest::Client,
    url: Url,
    from: Address,
    poll_interval: Duration,
}

impl JsonRpcProvider {
    pub fn new(url: Url, from: Address) -> anyhow::Result<Self> {
        Ok(Self {
            client: create_client()?,
            url,
            from,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Provider for the endpoint and signer account of `profile`.
    pub fn from_profile(profile: &NetworkProfile) -> anyhow::Result<Self> {
        let from = profile
            .signer_address()
            .with_context(|| format!("Failed to derive signer for network {}", profile.id))?;
        Self::new(profile.rpc_url.clone(), from)
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn from_address(&self) -> Address {
        self.from
    }

    /// Chain id reported by the node.
    pub async fn chain_id(&self) -> anyhow::Result<u64> {
        let chain_id: U64 = json_rpc_call(&self.client, &self.url, "eth_chainId", vec![]).await?;
        Ok(chain_id.to())
    }
}

impl ChainProvider for JsonRpcProvider {
    async fn send_transaction(&self, request: TransactionRequest) -> anyhow::Result<TxHash> {
        let mut tx = serde_json::json!({
            "from": self.from,
            "data": request.data,
            "gas": format!("{:#x}", request.gas),
        });
        if let Some(to) = request.to {
            tx["to"] = serde_json::json!(to);
        }

        json_rpc_call(&self.client, &self.url, "eth_sendTransaction", vec![tx]).await
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> anyhow::Result<TransactionReceipt> {
        let fetch = || async {
            let receipt: Option<RpcReceipt> = json_rpc_call(
                &self.client,
                &self.url,
                "eth_getTransactionReceipt",
                vec![serde_json::json!(tx_hash)],
            )
            .await?;

            receipt.context("Transaction not mined yet")
        };

        let receipt = fetch
            .retry(
                ConstantBuilder::default()
                    .with_delay(self.poll_interval)
                    .without_max_times(),
            )
            .notify(|err: &anyhow::Error, _| {
                tracing::trace!(
                    error = %err,
                    tx_hash = %tx_hash,
                    "Receipt not available, retrying..."
                );
            })
            .await?;

        Ok(receipt.into())
    }
}
