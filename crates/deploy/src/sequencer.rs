//! Sequential execution of deployment steps.
//!
//! Steps run strictly in order: step `i + 1` is only built once step `i` is
//! confirmed, since its arguments may contain addresses created by earlier steps.
//! The first failure aborts the run and leaves confirmed steps in place.

use std::collections::HashSet;
use std::time::Duration;

use alloy_core::primitives::{Address, TxHash};
use tokio::sync::watch;

use crate::{
    ArtifactSource, ChainProvider, DeployError, DeployedInstance, DeploymentRegistry,
    DeploymentStep, ErrorKind, NetworkProfile, StepArg, TransactionReceipt, TransactionRequest,
};

/// Default time to wait for a transaction to be mined.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Execution settings of a [`Sequencer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencerConfig {
    /// A step not confirmed within this duration fails the run.
    pub confirmation_timeout: Duration,
    /// Skip creations and calls already recorded in the registry.
    pub resume_if_present: bool,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            resume_if_present: false,
        }
    }
}

/// Outcome of one attempted step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    pub index: usize,
    /// Human-readable form of the step.
    pub step: String,
    pub success: bool,
    /// The step was satisfied by a previous run and nothing was submitted.
    pub reused: bool,
    pub tx_hash: Option<TxHash>,
    /// Address of the created instance, for creation steps.
    pub contract_address: Option<Address>,
    pub error: Option<ErrorKind>,
}

impl StepResult {
    fn confirmed(
        index: usize,
        step: &DeploymentStep,
        tx_hash: TxHash,
        address: Option<Address>,
    ) -> Self {
        Self {
            index,
            step: step.to_string(),
            success: true,
            reused: false,
            tx_hash: Some(tx_hash),
            contract_address: address,
            error: None,
        }
    }

    fn reused(
        index: usize,
        step: &DeploymentStep,
        tx_hash: Option<TxHash>,
        address: Option<Address>,
    ) -> Self {
        Self {
            index,
            step: step.to_string(),
            success: true,
            reused: true,
            tx_hash,
            contract_address: address,
            error: None,
        }
    }

    fn failed(index: usize, step: &DeploymentStep, failure: &StepFailure) -> Self {
        Self {
            index,
            step: step.to_string(),
            success: false,
            reused: false,
            tx_hash: failure.tx_hash,
            contract_address: None,
            error: Some(failure.error.kind()),
        }
    }
}

/// Results of a run that passed validation.
///
/// `results` holds one entry per attempted step. A failed step is the last entry,
/// with `success: false`. Steps after it were never attempted and are absent.
#[derive(Debug)]
pub struct RunOutcome {
    pub results: Vec<StepResult>,
    /// The error that ended the run early.
    pub error: Option<DeployError>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<Vec<StepResult>, DeployError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.results),
        }
    }
}

struct StepFailure {
    tx_hash: Option<TxHash>,
    error: DeployError,
}

impl From<DeployError> for StepFailure {
    fn from(error: DeployError) -> Self {
        Self {
            tx_hash: None,
            error,
        }
    }
}

/// Check that every step only depends on contracts created before it.
///
/// Contracts already present in `available` count as created. Placeholders naming a
/// contract that is not created earlier fail with [`DeployError::DependencyOrder`]. A
/// call on a contract the plan never creates fails with [`DeployError::UnknownContract`].
/// The check has no side effects.
pub fn validate_plan(
    steps: &[DeploymentStep],
    available: &DeploymentRegistry,
) -> Result<(), DeployError> {
    if steps.is_empty() {
        return Err(DeployError::EmptyPlan);
    }

    let planned: HashSet<&str> = steps
        .iter()
        .filter(|step| step.is_create())
        .map(DeploymentStep::contract)
        .collect();
    let mut created: HashSet<&str> = HashSet::new();

    for (index, step) in steps.iter().enumerate() {
        if let DeploymentStep::Call { contract, .. } = step {
            if !planned.contains(contract.as_str()) && !available.contains(contract) {
                return Err(DeployError::UnknownContract(contract.clone()));
            }
        }

        if let Some(missing) = step
            .dependencies()
            .find(|name| !created.contains(name) && !available.contains(name))
        {
            return Err(DeployError::DependencyOrder {
                step: index,
                contract: missing.to_string(),
            });
        }

        if step.is_create() {
            created.insert(step.contract());
        }
    }

    Ok(())
}

/// Replace placeholders with the addresses registered so far.
fn resolve_args(
    args: &[StepArg],
    registry: &DeploymentRegistry,
) -> Result<Vec<String>, DeployError> {
    args.iter()
        .map(|arg| match arg {
            StepArg::Literal(value) => Ok(value.clone()),
            StepArg::AddressOf(contract) => registry.deployed(contract).map(|a| a.to_string()),
        })
        .collect()
}

fn call_key(contract: &str, method: &str, args: &[String]) -> String {
    format!("{contract}.{method}({})", args.join(","))
}

/// Runs deployment steps one at a time against a [`ChainProvider`].
#[derive(Debug)]
pub struct Sequencer<P> {
    provider: P,
    config: SequencerConfig,
    cancel: Option<watch::Receiver<bool>>,
}

impl<P: ChainProvider> Sequencer<P> {
    pub fn new(provider: P, config: SequencerConfig) -> Self {
        Self {
            provider,
            config,
            cancel: None,
        }
    }

    /// Stop the run before the next step once `true` is sent on the channel.
    ///
    /// A step already submitted always runs to completion.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    /// Pre-submission check of `steps`. Registry contents only count when resuming.
    pub fn validate(
        &self,
        steps: &[DeploymentStep],
        registry: &DeploymentRegistry,
    ) -> Result<(), DeployError> {
        if self.config.resume_if_present {
            validate_plan(steps, registry)
        } else {
            validate_plan(steps, &DeploymentRegistry::new())
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Execute `steps` in order on the network of `profile`.
    ///
    /// Returns `Err` without submitting anything when validation fails. Otherwise
    /// returns the results of the attempted steps, with the error that stopped the
    /// run, if any.
    pub async fn run(
        &self,
        steps: &[DeploymentStep],
        profile: &NetworkProfile,
        artifacts: &impl ArtifactSource,
        registry: &mut DeploymentRegistry,
    ) -> Result<RunOutcome, DeployError> {
        self.run_with_checkpoint(steps, profile, artifacts, registry, |_| Ok(())).await
    }

    /// Like [`Sequencer::run`], calling `checkpoint` with the registry after every step
    /// confirmed on chain, before the next step starts.
    ///
    /// A checkpoint error stops the run. The confirmed step stays in the results as a
    /// success and the checkpoint error becomes the outcome error.
    pub async fn run_with_checkpoint<F>(
        &self,
        steps: &[DeploymentStep],
        profile: &NetworkProfile,
        artifacts: &impl ArtifactSource,
        registry: &mut DeploymentRegistry,
        mut checkpoint: F,
    ) -> Result<RunOutcome, DeployError>
    where
        F: FnMut(&DeploymentRegistry) -> Result<(), DeployError> + Send,
    {
        self.validate(steps, registry)?;

        tracing::info!(
            network = %profile.id,
            chain_id = profile.chain_id,
            steps = steps.len(),
            resume = self.config.resume_if_present,
            "Starting deployment run"
        );

        let mut results = Vec::with_capacity(steps.len());

        for (index, step) in steps.iter().enumerate() {
            if self.is_cancelled() {
                let error = DeployError::Cancelled {
                    completed: results.len(),
                };
                tracing::warn!(step = index, "Deployment cancelled");
                return Ok(RunOutcome {
                    results,
                    error: Some(error),
                });
            }

            tracing::info!(step = index, "{step}");

            match self.execute(index, step, profile, artifacts, registry).await {
                Ok(result) => {
                    let submitted = !result.reused;
                    results.push(result);
                    if !submitted {
                        continue;
                    }

                    if let Err(error) = checkpoint(&*registry) {
                        tracing::error!(
                            step = index,
                            error = %error,
                            "Failed to record confirmed step, aborting remaining steps"
                        );
                        return Ok(RunOutcome {
                            results,
                            error: Some(error),
                        });
                    }
                }
                Err(failure) => {
                    tracing::error!(
                        step = index,
                        contract = step.contract(),
                        tx_hash = ?failure.tx_hash,
                        error = %failure.error,
                        "Step failed, aborting remaining steps"
                    );
                    results.push(StepResult::failed(index, step, &failure));
                    return Ok(RunOutcome {
                        results,
                        error: Some(failure.error),
                    });
                }
            }
        }

        tracing::info!(network = %profile.id, steps = results.len(), "Deployment run complete");

        Ok(RunOutcome {
            results,
            error: None,
        })
    }

    async fn execute(
        &self,
        index: usize,
        step: &DeploymentStep,
        profile: &NetworkProfile,
        artifacts: &impl ArtifactSource,
        registry: &mut DeploymentRegistry,
    ) -> Result<StepResult, StepFailure> {
        match step {
            DeploymentStep::Create { contract, args } => {
                if self.config.resume_if_present {
                    if let Some(instance) = registry.instance(contract) {
                        tracing::warn!(
                            contract = %contract,
                            address = %instance.address,
                            "Contract already deployed, skipping creation"
                        );
                        return Ok(StepResult::reused(
                            index,
                            step,
                            Some(instance.deploy_tx_hash),
                            Some(instance.address),
                        ));
                    }
                }

                let args = resolve_args(args, registry)?;
                let data = artifacts
                    .require(contract)?
                    .encode_deploy(&args)
                    .map_err(|source| DeployError::Encoding {
                        target: contract.clone(),
                        source,
                    })?;

                let receipt = self
                    .submit(TransactionRequest {
                        to: None,
                        data,
                        gas: profile.gas_limit,
                    })
                    .await?;

                let address = receipt.contract_address.ok_or(StepFailure {
                    tx_hash: Some(receipt.tx_hash),
                    error: DeployError::MissingContractAddress(receipt.tx_hash),
                })?;

                registry.register(DeployedInstance {
                    contract_name: contract.clone(),
                    address,
                    deploy_tx_hash: receipt.tx_hash,
                });

                tracing::info!(
                    contract = %contract,
                    address = %address,
                    tx_hash = %receipt.tx_hash,
                    gas_used = receipt.gas_used,
                    "Contract deployed"
                );

                Ok(StepResult::confirmed(index, step, receipt.tx_hash, Some(address)))
            }
            DeploymentStep::Call {
                contract,
                method,
                args,
            } => {
                let target = registry.deployed(contract)?;
                let args = resolve_args(args, registry)?;
                let key = call_key(contract, method, &args);

                if self.config.resume_if_present && registry.has_call(&key) {
                    tracing::warn!(call = %key, "Call already confirmed, skipping");
                    return Ok(StepResult::reused(index, step, None, None));
                }

                let data = artifacts
                    .require(contract)?
                    .encode_call(method, &args)
                    .map_err(|source| DeployError::Encoding {
                        target: format!("{contract}.{method}"),
                        source,
                    })?;

                let receipt = self
                    .submit(TransactionRequest {
                        to: Some(target),
                        data,
                        gas: profile.gas_limit,
                    })
                    .await?;

                registry.record_call(key);

                tracing::info!(
                    contract = %contract,
                    method = %method,
                    tx_hash = %receipt.tx_hash,
                    gas_used = receipt.gas_used,
                    "Call confirmed"
                );

                Ok(StepResult::confirmed(index, step, receipt.tx_hash, None))
            }
        }
    }

    /// Submit a transaction and wait for it to be mined successfully.
    async fn submit(
        &self,
        request: TransactionRequest,
    ) -> Result<TransactionReceipt, StepFailure> {
        let tx_hash = self
            .provider
            .send_transaction(request)
            .await
            .map_err(DeployError::Submission)?;

        tracing::debug!(tx_hash = %tx_hash, "Transaction submitted, waiting for confirmation");

        let timeout = self.config.confirmation_timeout;
        let pending = self.provider.wait_for_receipt(tx_hash);
        let receipt = match tokio::time::timeout(timeout, pending).await {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(err)) => {
                return Err(StepFailure {
                    tx_hash: Some(tx_hash),
                    error: DeployError::Submission(err.context("Failed to fetch receipt")),
                });
            }
            Err(_) => {
                return Err(StepFailure {
                    tx_hash: Some(tx_hash),
                    error: DeployError::ConfirmationTimeout { tx_hash, timeout },
                });
            }
        };

        if !receipt.success {
            return Err(StepFailure {
                tx_hash: Some(tx_hash),
                error: DeployError::TransactionReverted(tx_hash),
            });
        }

        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> DeploymentStep {
        DeploymentStep::create("TokenContract", vec![StepArg::literal("Gabro Token")])
    }

    fn sale() -> DeploymentStep {
        DeploymentStep::create(
            "SaleContract",
            vec![StepArg::literal("0x01"), StepArg::address_of("TokenContract")],
        )
    }

    fn link() -> DeploymentStep {
        DeploymentStep::call(
            "TokenContract",
            "setSaleContract",
            vec![StepArg::address_of("SaleContract")],
        )
    }

    #[test]
    fn test_valid_order() {
        let registry = DeploymentRegistry::new();
        assert!(validate_plan(&[token(), sale(), link()], &registry).is_ok());
    }

    #[test]
    fn test_empty_plan() {
        let err = validate_plan(&[], &DeploymentRegistry::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyPlan);
    }

    #[test]
    fn test_forward_reference() {
        let err =
            validate_plan(&[sale(), token(), link()], &DeploymentRegistry::new()).unwrap_err();
        match err {
            DeployError::DependencyOrder { step, contract } => {
                assert_eq!(step, 0);
                assert_eq!(contract, "TokenContract");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_placeholder_never_created() {
        let err = validate_plan(&[token(), link()], &DeploymentRegistry::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DependencyOrder);
    }

    #[test]
    fn test_self_reference() {
        let step = DeploymentStep::create("Proxy", vec![StepArg::address_of("Proxy")]);
        let err = validate_plan(&[step], &DeploymentRegistry::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DependencyOrder);
    }

    #[test]
    fn test_call_on_contract_never_created() {
        let call = DeploymentStep::call("Vault", "pause", vec![]);
        let err = validate_plan(&[token(), call], &DeploymentRegistry::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownContract);
    }

    #[test]
    fn test_call_before_create() {
        let err =
            validate_plan(&[link(), token(), sale()], &DeploymentRegistry::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DependencyOrder);
    }

    #[test]
    fn test_registry_satisfies_dependencies() {
        let mut registry = DeploymentRegistry::new();
        registry.register(DeployedInstance {
            contract_name: "TokenContract".to_string(),
            address: Address::repeat_byte(1),
            deploy_tx_hash: TxHash::repeat_byte(1),
        });
        assert!(validate_plan(&[sale(), link()], &registry).is_ok());
    }

    #[test]
    fn test_validation_is_idempotent() {
        let registry = DeploymentRegistry::new();
        let good = [token(), sale(), link()];
        let bad = [sale(), token()];

        for _ in 0..2 {
            assert!(validate_plan(&good, &registry).is_ok());
            assert_eq!(
                validate_plan(&bad, &registry).unwrap_err().kind(),
                ErrorKind::DependencyOrder
            );
        }
    }

    #[test]
    fn test_resolve_args() {
        let mut registry = DeploymentRegistry::new();
        let address = Address::repeat_byte(0xab);
        registry.register(DeployedInstance {
            contract_name: "TokenContract".to_string(),
            address,
            deploy_tx_hash: TxHash::ZERO,
        });

        let resolved = resolve_args(
            &[StepArg::literal("5000"), StepArg::address_of("TokenContract")],
            &registry,
        )
        .unwrap();
        assert_eq!(resolved, vec!["5000".to_string(), address.to_string()]);

        let err = resolve_args(&[StepArg::address_of("SaleContract")], &registry).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownContract);
    }

    #[test]
    fn test_call_key() {
        let key = call_key("TokenContract", "setSaleContract", &["0xab".to_string()]);
        assert_eq!(key, "TokenContract.setSaleContract(0xab)");
    }
}
