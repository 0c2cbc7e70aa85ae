//! Boundary to the chain: transaction submission and confirmation.

use std::future::Future;

use alloy_core::primitives::{Address, Bytes, TxHash};

/// A transaction to submit. `to` is `None` for contract creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub to: Option<Address>,
    pub data: Bytes,
    pub gas: u64,
}

/// Outcome of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub tx_hash: TxHash,
    /// `false` when the transaction reverted.
    pub success: bool,
    /// Address of the created contract, for creation transactions.
    pub contract_address: Option<Address>,
    pub gas_used: u64,
}

/// Signs, submits and tracks transactions on one network.
pub trait ChainProvider: Send + Sync {
    /// Submit a transaction, returning its hash once the node accepted it.
    fn send_transaction(
        &self,
        request: TransactionRequest,
    ) -> impl Future<Output = anyhow::Result<TxHash>> + Send;

    /// Wait until the transaction is mined.
    ///
    /// This may wait indefinitely; callers bound it with a timeout.
    fn wait_for_receipt(
        &self,
        tx_hash: TxHash,
    ) -> impl Future<Output = anyhow::Result<TransactionReceipt>> + Send;
}
