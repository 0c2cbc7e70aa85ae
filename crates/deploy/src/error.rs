//! Error types for the deployment pipeline.

use std::time::Duration;

use alloy_core::primitives::TxHash;
use thiserror::Error;

/// Errors produced while validating or executing a deployment.
///
/// Validation errors ([`DeployError::EmptyPlan`], [`DeployError::DependencyOrder`],
/// [`DeployError::UnknownNetwork`], [`DeployError::ChainMismatch`],
/// [`DeployError::MissingCredential`]) are raised
/// before any transaction is submitted. Every other variant is raised while a run is
/// in progress and aborts the remaining steps.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The plan contains no steps.
    #[error("deployment plan is empty")]
    EmptyPlan,

    /// A step references a contract that no earlier step creates.
    #[error("step {step} references `{contract}`, which is not created by an earlier step")]
    DependencyOrder { step: usize, contract: String },

    /// A contract has not been deployed in this run.
    #[error("contract `{0}` has not been deployed in this run")]
    UnknownContract(String),

    /// The requested network id is not configured.
    #[error("network `{0}` is not configured")]
    UnknownNetwork(String),

    /// The node behind the RPC endpoint reports a different chain than the profile.
    #[error("network `{network}` expects chain id {expected}, but the node reports {actual}")]
    ChainMismatch {
        network: String,
        expected: u64,
        actual: u64,
    },

    /// The network is configured but no signing credential was injected for it.
    #[error("no mnemonic configured for network `{0}`")]
    MissingCredential(String),

    /// A compiled contract artifact could not be resolved.
    #[error("failed to load artifact `{name}`")]
    Artifact {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// Step arguments could not be encoded against the contract ABI.
    #[error("failed to encode arguments for `{target}`")]
    Encoding {
        target: String,
        #[source]
        source: anyhow::Error,
    },

    /// The chain provider rejected the transaction.
    #[error("failed to submit transaction")]
    Submission(#[source] anyhow::Error),

    /// The transaction was not confirmed before the step timeout elapsed.
    #[error("transaction {tx_hash} was not confirmed within {timeout:?}")]
    ConfirmationTimeout { tx_hash: TxHash, timeout: Duration },

    /// The transaction was mined but reverted.
    #[error("transaction {0} reverted")]
    TransactionReverted(TxHash),

    /// A creation transaction was confirmed without a contract address in its receipt.
    #[error("creation transaction {0} has no contract address in its receipt")]
    MissingContractAddress(TxHash),

    /// The run was cancelled between two steps.
    #[error("deployment cancelled after {completed} step(s)")]
    Cancelled { completed: usize },

    /// The network or plan configuration could not be extracted.
    #[error("invalid configuration")]
    Config(#[source] Box<figment::Error>),

    /// The persisted deployment registry could not be read or written.
    #[error("deployment registry error")]
    Registry(#[source] anyhow::Error),
}

/// Copyable discriminant of a [`DeployError`], recorded in step results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorKind {
    EmptyPlan,
    DependencyOrder,
    UnknownContract,
    UnknownNetwork,
    ChainMismatch,
    MissingCredential,
    Artifact,
    Encoding,
    Submission,
    ConfirmationTimeout,
    TransactionReverted,
    MissingContractAddress,
    Cancelled,
    Config,
    Registry,
}

impl DeployError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyPlan => ErrorKind::EmptyPlan,
            Self::DependencyOrder { .. } => ErrorKind::DependencyOrder,
            Self::UnknownContract(_) => ErrorKind::UnknownContract,
            Self::UnknownNetwork(_) => ErrorKind::UnknownNetwork,
            Self::ChainMismatch { .. } => ErrorKind::ChainMismatch,
            Self::MissingCredential(_) => ErrorKind::MissingCredential,
            Self::Artifact { .. } => ErrorKind::Artifact,
            Self::Encoding { .. } => ErrorKind::Encoding,
            Self::Submission(_) => ErrorKind::Submission,
            Self::ConfirmationTimeout { .. } => ErrorKind::ConfirmationTimeout,
            Self::TransactionReverted(_) => ErrorKind::TransactionReverted,
            Self::MissingContractAddress(_) => ErrorKind::MissingContractAddress,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Config(_) => ErrorKind::Config,
            Self::Registry(_) => ErrorKind::Registry,
        }
    }

    /// Whether this error is raised before any chain interaction.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyPlan
                | Self::DependencyOrder { .. }
                | Self::UnknownNetwork(_)
                | Self::ChainMismatch { .. }
                | Self::MissingCredential(_)
        )
    }
}

impl From<figment::Error> for DeployError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}
