//! Deployment steps.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An argument of a constructor or method call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepArg {
    /// A value given as text and parsed against the ABI parameter type.
    Literal(String),
    /// The address of the contract created under this name earlier in the run.
    AddressOf(String),
}

impl StepArg {
    pub fn literal(value: impl ToString) -> Self {
        Self::Literal(value.to_string())
    }

    pub fn address_of(contract: impl Into<String>) -> Self {
        Self::AddressOf(contract.into())
    }

    /// The contract this argument refers to, if it is a placeholder.
    pub fn placeholder(&self) -> Option<&str> {
        match self {
            Self::Literal(_) => None,
            Self::AddressOf(contract) => Some(contract),
        }
    }
}

impl fmt::Display for StepArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => write!(f, "{value:?}"),
            Self::AddressOf(contract) => write!(f, "{contract}.address"),
        }
    }
}

/// One transaction of a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeploymentStep {
    /// Deploy a new instance of `contract`.
    Create {
        contract: String,
        #[serde(default)]
        args: Vec<StepArg>,
    },
    /// Call `method` on the latest instance of `contract`.
    Call {
        contract: String,
        method: String,
        #[serde(default)]
        args: Vec<StepArg>,
    },
}

impl DeploymentStep {
    pub fn create(contract: impl Into<String>, args: Vec<StepArg>) -> Self {
        Self::Create {
            contract: contract.into(),
            args,
        }
    }

    pub fn call(
        contract: impl Into<String>,
        method: impl Into<String>,
        args: Vec<StepArg>,
    ) -> Self {
        Self::Call {
            contract: contract.into(),
            method: method.into(),
            args,
        }
    }

    pub fn contract(&self) -> &str {
        match self {
            Self::Create { contract, .. } | Self::Call { contract, .. } => contract,
        }
    }

    pub fn args(&self) -> &[StepArg] {
        match self {
            Self::Create { args, .. } | Self::Call { args, .. } => args,
        }
    }

    pub fn is_create(&self) -> bool {
        matches!(self, Self::Create { .. })
    }

    /// Whether any argument is an address placeholder.
    pub fn references_addresses(&self) -> bool {
        self.args().iter().any(|arg| arg.placeholder().is_some())
    }

    /// Contracts that must already exist when this step is built: every placeholder
    /// target, plus the call target for [`DeploymentStep::Call`].
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        let target = match self {
            Self::Create { .. } => None,
            Self::Call { contract, .. } => Some(contract.as_str()),
        };
        target
            .into_iter()
            .chain(self.args().iter().filter_map(StepArg::placeholder))
    }
}

impl fmt::Display for DeploymentStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args = self
            .args()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        match self {
            Self::Create { contract, .. } => write!(f, "create {contract}({args})"),
            Self::Call {
                contract, method, ..
            } => write!(f, "call {contract}.{method}({args})"),
        }
    }
}
