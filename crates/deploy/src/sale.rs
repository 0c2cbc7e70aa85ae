//! The token sale deployment: a token, a sale contract minting it, and the link
//! between the two.

use std::path::Path;

use alloy_core::primitives::{Address, U256};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::{DeployError, DeploymentStep, StepArg, config};

/// Artifact name of the token contract.
pub const TOKEN_CONTRACT: &str = "TokenContract";
/// Artifact name of the sale contract.
pub const SALE_CONTRACT: &str = "SaleContract";
/// Token method authorizing the sale contract.
pub const SET_SALE_CONTRACT: &str = "setSaleContract";

/// Token constructor parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenParams {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub version: String,
}

impl Default for TokenParams {
    fn default() -> Self {
        Self {
            name: "Gabro Token".to_string(),
            symbol: "GBO".to_string(),
            decimals: 18,
            version: "1.0".to_string(),
        }
    }
}

/// Sale constructor parameters. The token address is filled in during the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleParams {
    /// Account receiving the contributions.
    pub beneficiary: Address,
    /// Maximum number of tokens sold, in base units.
    #[serde(default = "default_supply_cap")]
    pub supply_cap: U256,
    /// Tokens per unit of ether.
    #[serde(default = "default_rate")]
    pub rate: u64,
    /// Unix timestamp at which the sale opens.
    #[serde(default = "default_start_time")]
    pub start_time: u64,
    /// Unix timestamp at which the sale closes.
    #[serde(default = "default_end_time")]
    pub end_time: u64,
    /// Smallest accepted contribution, in wei.
    #[serde(default = "default_min_contribution")]
    pub min_contribution: U256,
}

// 1,000,000,000 tokens with 18 decimals.
fn default_supply_cap() -> U256 {
    U256::from(1_000_000_000u64) * U256::from(10u64).pow(U256::from(18u64))
}

fn default_rate() -> u64 {
    5000
}

// 2018-07-20 12:58:26 UTC
fn default_start_time() -> u64 {
    1_532_091_506
}

// 2018-12-31 16:00:00 UTC
fn default_end_time() -> u64 {
    1_546_272_000
}

// 0.1 ether
fn default_min_contribution() -> U256 {
    U256::from(100_000_000_000_000_000u64)
}

impl SaleParams {
    /// Default sale terms paying out to `beneficiary`.
    pub fn new(beneficiary: Address) -> Self {
        Self {
            beneficiary,
            supply_cap: default_supply_cap(),
            rate: default_rate(),
            start_time: default_start_time(),
            end_time: default_end_time(),
            min_contribution: default_min_contribution(),
        }
    }
}

/// Artifact and method names used by the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaleContracts {
    pub token: String,
    pub sale: String,
    pub link_method: String,
}

impl Default for SaleContracts {
    fn default() -> Self {
        Self {
            token: TOKEN_CONTRACT.to_string(),
            sale: SALE_CONTRACT.to_string(),
            link_method: SET_SALE_CONTRACT.to_string(),
        }
    }
}

/// Full description of a token sale deployment.
///
/// ```toml
/// [token]
/// name = "Gabro Token"
/// symbol = "GBO"
/// decimals = 18
/// version = "1.0"
///
/// [sale]
/// beneficiary = "0x..."   # or TOKENSALE_SALE__BENEFICIARY
/// rate = 5000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalePlan {
    #[serde(default)]
    pub token: TokenParams,
    pub sale: SaleParams,
    #[serde(default)]
    pub contracts: SaleContracts,
}

impl SalePlan {
    pub fn new(token: TokenParams, sale: SaleParams) -> Self {
        Self {
            token,
            sale,
            contracts: SaleContracts::default(),
        }
    }

    /// Load the plan from the configuration file at `path` and the environment.
    pub fn load(path: &Path) -> Result<Self, DeployError> {
        let plan = Self::from_figment(config::figment(path))?;
        tracing::info!(
            path = %path.display(),
            token = %plan.token.symbol,
            beneficiary = %plan.sale.beneficiary,
            "Sale plan loaded"
        );
        Ok(plan)
    }

    pub fn from_figment(figment: Figment) -> Result<Self, DeployError> {
        Ok(figment.extract()?)
    }

    /// The three deployment steps, in order:
    ///
    /// 1. create the token,
    /// 2. create the sale contract with the token address,
    /// 3. tell the token which sale contract may mint it.
    pub fn steps(&self) -> Vec<DeploymentStep> {
        let SaleContracts {
            token,
            sale,
            link_method,
        } = &self.contracts;

        vec![
            DeploymentStep::create(
                token.clone(),
                vec![
                    StepArg::literal(&self.token.name),
                    StepArg::literal(&self.token.symbol),
                    StepArg::literal(self.token.decimals),
                    StepArg::literal(&self.token.version),
                ],
            ),
            DeploymentStep::create(
                sale.clone(),
                vec![
                    StepArg::literal(self.sale.beneficiary),
                    StepArg::address_of(token.clone()),
                    StepArg::literal(self.sale.supply_cap),
                    StepArg::literal(self.sale.rate),
                    StepArg::literal(self.sale.start_time),
                    StepArg::literal(self.sale.end_time),
                    StepArg::literal(self.sale.min_contribution),
                ],
            ),
            DeploymentStep::call(
                token.clone(),
                link_method.clone(),
                vec![StepArg::address_of(sale.clone())],
            ),
        ]
    }
}
