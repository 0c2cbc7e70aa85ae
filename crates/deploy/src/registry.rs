//! Run-scoped record of deployed contract instances.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use alloy_core::primitives::{Address, TxHash};
use anyhow::Context;
use comfy_table::{Table, presets::UTF8_FULL};
use serde::{Deserialize, Serialize};

use crate::DeployError;

/// A contract instance created by a confirmed creation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedInstance {
    pub contract_name: String,
    pub address: Address,
    pub deploy_tx_hash: TxHash,
}

/// Latest deployed instance per contract name, for a single run.
///
/// The registry is owned by the caller and lent mutably to one run at a time, so two
/// runs against different networks never share one. It is written only after a step
/// is confirmed. Re-deploying a name replaces the previous entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRegistry {
    /// Chain the instances live on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    /// Fingerprint of the plan that produced this registry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_hash: Option<String>,
    /// Unix timestamp of the last write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    #[serde(default)]
    instances: BTreeMap<String, DeployedInstance>,
    /// Confirmed calls, keyed by `Contract.method(resolved args)`.
    #[serde(default)]
    completed_calls: BTreeSet<String>,
}

impl DeploymentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty registry tagged with the chain and plan it is produced for.
    pub fn for_plan(chain_id: u64, plan_hash: impl Into<String>) -> Self {
        Self {
            chain_id: Some(chain_id),
            plan_hash: Some(plan_hash.into()),
            ..Self::default()
        }
    }

    /// Record a confirmed instance, returning the one it replaces.
    pub fn register(&mut self, instance: DeployedInstance) -> Option<DeployedInstance> {
        self.touch();
        self.instances
            .insert(instance.contract_name.clone(), instance)
    }

    /// Address of the latest instance of `contract_name`.
    pub fn deployed(&self, contract_name: &str) -> Result<Address, DeployError> {
        self.instances
            .get(contract_name)
            .map(|instance| instance.address)
            .ok_or_else(|| DeployError::UnknownContract(contract_name.to_string()))
    }

    pub fn instance(&self, contract_name: &str) -> Option<&DeployedInstance> {
        self.instances.get(contract_name)
    }

    pub fn contains(&self, contract_name: &str) -> bool {
        self.instances.contains_key(contract_name)
    }

    pub fn instances(&self) -> impl Iterator<Item = &DeployedInstance> {
        self.instances.values()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn record_call(&mut self, key: impl Into<String>) {
        self.touch();
        self.completed_calls.insert(key.into());
    }

    pub fn has_call(&self, key: &str) -> bool {
        self.completed_calls.contains(key)
    }

    /// Fold the instances and calls of `other` into this registry.
    ///
    /// Instances are replaced per name; names only present here are kept.
    pub fn merge_from(&mut self, other: &DeploymentRegistry) {
        for instance in other.instances() {
            self.instances
                .insert(instance.contract_name.clone(), instance.clone());
        }
        self.completed_calls
            .extend(other.completed_calls.iter().cloned());
        if self.chain_id.is_none() {
            self.chain_id = other.chain_id;
        }
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Some(chrono::Utc::now().timestamp());
    }

    /// Table of deployed instances for display.
    pub fn summary_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_header(vec!["Contract", "Address", "Deploy transaction"]);

        for instance in self.instances() {
            table.add_row(vec![
                instance.contract_name.clone(),
                instance.address.to_string(),
                instance.deploy_tx_hash.to_string(),
            ]);
        }

        table
    }

    /// Save the registry as formatted JSON.
    pub fn save_to_file(&self, path: &Path) -> Result<(), DeployError> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize deployment registry")
            .map_err(DeployError::Registry)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))
                .map_err(DeployError::Registry)?;
        }

        std::fs::write(path, json)
            .with_context(|| format!("Failed to write deployment registry to {}", path.display()))
            .map_err(DeployError::Registry)?;

        tracing::debug!(
            path = %path.display(),
            instances = self.len(),
            "Deployment registry saved"
        );
        Ok(())
    }

    /// Load a registry saved with [`DeploymentRegistry::save_to_file`].
    pub fn load_from_file(path: &Path) -> Result<Self, DeployError> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read deployment registry from {}", path.display()))
            .map_err(DeployError::Registry)?;

        serde_json::from_str(&content)
            .context("Failed to parse deployment registry JSON")
            .map_err(DeployError::Registry)
    }
}
