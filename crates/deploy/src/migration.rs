//! Migration entry point: one plan, one network, one persisted registry.

use std::path::PathBuf;

use anyhow::Context;
use tokio::sync::watch;

use crate::{
    ArtifactSource, ChainProvider, DeployError, DeploymentRegistry, DeploymentStep,
    JsonRpcProvider, NetworkProfile, PlanFingerprint, RunOutcome, SalePlan, Sequencer,
    SequencerConfig,
};

/// Result of a migration that passed validation.
#[derive(Debug)]
pub struct MigrationReport {
    pub outcome: RunOutcome,
    /// Registry after the run, including instances created before a failure.
    pub registry: DeploymentRegistry,
    /// Persisted record after the run: this run's instances over those of earlier
    /// runs.
    pub record: DeploymentRegistry,
}

/// Runs a deployment plan against one network and records the deployed addresses.
#[derive(Debug, Clone)]
pub struct Migration {
    pub profile: NetworkProfile,
    pub steps: Vec<DeploymentStep>,
    pub config: SequencerConfig,
    /// Where the registry is persisted. Required to resume an interrupted run.
    pub registry_path: Option<PathBuf>,
    cancel: Option<watch::Receiver<bool>>,
}

impl Migration {
    pub fn new(profile: NetworkProfile, steps: Vec<DeploymentStep>) -> Self {
        Self {
            profile,
            steps,
            config: SequencerConfig::default(),
            registry_path: None,
            cancel: None,
        }
    }

    /// Migration deploying the token, the sale, and linking them.
    pub fn for_sale(profile: NetworkProfile, plan: &SalePlan) -> Self {
        Self::new(profile, plan.steps())
    }

    pub fn config(mut self, config: SequencerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.registry_path = Some(path.into());
        self
    }

    pub fn cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Fingerprint of the steps on the profile's chain.
    pub fn plan_hash(&self) -> String {
        PlanFingerprint::new(self.profile.chain_id, &self.steps).compute_hash()
    }

    /// The registry persisted at `registry_path`, if any.
    ///
    /// A file recording deployments on another chain is rejected rather than
    /// overwritten.
    fn load_record(&self) -> Result<Option<DeploymentRegistry>, DeployError> {
        let Some(path) = self.registry_path.as_ref().filter(|p| p.exists()) else {
            return Ok(None);
        };

        let record = DeploymentRegistry::load_from_file(path)?;

        if let Some(chain_id) = record.chain_id.filter(|id| *id != self.profile.chain_id) {
            return Err(DeployError::Registry(anyhow::anyhow!(
                "{} records deployments on chain {chain_id}, not on chain {}",
                path.display(),
                self.profile.chain_id
            )));
        }

        Ok(Some(record))
    }

    fn starting_registry(&self, record: Option<&DeploymentRegistry>) -> DeploymentRegistry {
        let plan_hash = self.plan_hash();

        if let Some(record) = record.filter(|_| self.config.resume_if_present) {
            if record.plan_hash.as_deref() == Some(plan_hash.as_str()) {
                tracing::info!(
                    path = ?self.registry_path,
                    instances = record.len(),
                    "Resuming from deployment registry"
                );
                return record.clone();
            }

            tracing::warn!(
                path = ?self.registry_path,
                "Deployment registry was produced for a different plan, starting fresh"
            );
        }

        DeploymentRegistry::for_plan(self.profile.chain_id, plan_hash)
    }

    /// The registry this run starts from.
    ///
    /// When resuming, a persisted registry produced for the same plan and chain is
    /// reused. Anything else starts from an empty registry.
    pub fn prepare_registry(&self) -> Result<DeploymentRegistry, DeployError> {
        let record = self.load_record()?;
        Ok(self.starting_registry(record.as_ref()))
    }

    /// Run the plan through `provider`.
    ///
    /// The persisted registry is updated after every confirmed step, so an
    /// interrupted run can be resumed. Instances recorded by earlier runs are only
    /// replaced by a confirmed creation of the same name. A registry left by a run
    /// of another plan stays resumable for neither plan until this run completes.
    pub async fn run<P: ChainProvider>(
        &self,
        provider: P,
        artifacts: &impl ArtifactSource,
    ) -> Result<MigrationReport, DeployError> {
        let record = self.load_record()?;
        let mut registry = self.starting_registry(record.as_ref());

        let mut persisted = match record {
            Some(record)
                if self.config.resume_if_present && record.plan_hash == registry.plan_hash =>
            {
                record
            }
            Some(mut record) => {
                record.plan_hash = None;
                record
            }
            None => registry.clone(),
        };

        let mut sequencer = Sequencer::new(provider, self.config);
        if let Some(cancel) = &self.cancel {
            sequencer = sequencer.with_cancellation(cancel.clone());
        }

        let path = self.registry_path.as_deref();
        let mut outcome = sequencer
            .run_with_checkpoint(&self.steps, &self.profile, artifacts, &mut registry, |run| {
                persisted.merge_from(run);
                path.map_or(Ok(()), |path| persisted.save_to_file(path))
            })
            .await?;

        if outcome.is_success() && persisted.plan_hash.is_none() {
            persisted.plan_hash = registry.plan_hash.clone();
            if let Err(err) = path.map_or(Ok(()), |path| persisted.save_to_file(path)) {
                outcome.error = Some(err);
            }
        }

        if !registry.is_empty() {
            tracing::info!(
                "Deployed contracts on {}:\n{}",
                self.profile.id,
                registry.summary_table()
            );
        }

        match &outcome.error {
            None => tracing::info!("✓ Migration complete!"),
            Some(err) => tracing::error!(
                error = %err,
                attempted = outcome.results.len(),
                total = self.steps.len(),
                "Migration aborted"
            ),
        }

        Ok(MigrationReport {
            outcome,
            registry,
            record: persisted,
        })
    }

    /// Run the plan through the profile's JSON-RPC endpoint.
    ///
    /// The node must report the profile's chain id before anything is submitted.
    pub async fn run_on_profile(
        &self,
        artifacts: &impl ArtifactSource,
    ) -> Result<MigrationReport, DeployError> {
        let provider = JsonRpcProvider::from_profile(&self.profile)
            .context("Failed to create JSON-RPC provider")
            .map_err(DeployError::Submission)?;

        let actual = provider
            .chain_id()
            .await
            .context("Failed to query chain id")
            .map_err(DeployError::Submission)?;

        if actual != self.profile.chain_id {
            return Err(DeployError::ChainMismatch {
                network: self.profile.id.clone(),
                expected: self.profile.chain_id,
                actual,
            });
        }

        tracing::info!(
            network = %self.profile.id,
            rpc_host = ?self.profile.rpc_url.host_str(),
            from = %provider.from_address(),
            "Connected to network"
        );

        self.run(provider, artifacts).await
    }
}
