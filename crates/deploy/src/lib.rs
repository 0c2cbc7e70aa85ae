//! tokensale-deploy - Deployment pipeline for a token sale.
//!
//! This crate deploys a token contract and a sale contract, links them together and
//! records the deployed addresses. The core is a [`Sequencer`] that runs an ordered
//! list of [`DeploymentStep`]s, resolving address placeholders from earlier steps and
//! aborting on the first failure.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use tokensale_deploy::{ArtifactDir, Migration, NetworkProfiles, SalePlan};
//!
//! # async fn example() -> Result<(), tokensale_deploy::DeployError> {
//! let config = Path::new("Tokensale.toml");
//! let profile = NetworkProfiles::load(config)?.resolve("mainnet")?;
//! let plan = SalePlan::load(config)?;
//!
//! let report = Migration::for_sale(profile, &plan)
//!     .registry_path("deployments/mainnet.json")
//!     .run_on_profile(&ArtifactDir::new("build/contracts"))
//!     .await?;
//! report.outcome.into_result()?;
//! # Ok(())
//! # }
//! ```

mod artifacts;
pub use artifacts::{Artifact, ArtifactDir, ArtifactSource, InMemoryArtifacts};

pub mod config;

mod error;
pub use error::{DeployError, ErrorKind};

mod fingerprint;
pub use fingerprint::PlanFingerprint;

mod migration;
pub use migration::{Migration, MigrationReport};

mod network;
pub use network::{DEFAULT_GAS_LIMIT, Mnemonic, NetworkEntry, NetworkProfile, NetworkProfiles};

mod provider;
pub use provider::{ChainProvider, TransactionReceipt, TransactionRequest};

mod registry;
pub use registry::{DeployedInstance, DeploymentRegistry};

pub mod rpc;
pub use rpc::JsonRpcProvider;

pub mod sale;
pub use sale::{SaleContracts, SaleParams, SalePlan, TokenParams};

mod sequencer;
pub use sequencer::{
    DEFAULT_CONFIRMATION_TIMEOUT, RunOutcome, Sequencer, SequencerConfig, StepResult,
    validate_plan,
};

mod step;
pub use step::{DeploymentStep, StepArg};
