//! Network profiles: the named chain configurations a migration can target.
//!
//! Profiles are read once at process start from a TOML file merged with
//! `TOKENSALE_`-prefixed environment variables. Nested keys are separated by `__`, so
//! the mainnet mnemonic is injected with `TOKENSALE_NETWORKS__MAINNET__MNEMONIC`.
//!
//! ```toml
//! [networks.mainnet]
//! rpc_url = "https://mainnet.example.org"
//! gas = 4600000
//! network_id = 1
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use alloy_core::primitives::Address;
use alloy_signer_local::{MnemonicBuilder, coins_bip39::English};
use anyhow::Context;
use figment::Figment;
use serde::Deserialize;
use url::Url;

use crate::{DeployError, config};

/// Default gas limit attached to every transaction.
pub const DEFAULT_GAS_LIMIT: u64 = 4_600_000;

fn default_gas() -> u64 {
    DEFAULT_GAS_LIMIT
}

/// A BIP-39 mnemonic. Never printed.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Mnemonic(String);

impl Mnemonic {
    pub fn new(phrase: impl Into<String>) -> Self {
        Self(phrase.into())
    }

    fn phrase(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Mnemonic(<redacted>)")
    }
}

/// One `[networks.<id>]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkEntry {
    /// JSON-RPC endpoint of the node.
    pub rpc_url: Url,
    /// Signing credential; expected to come from the environment.
    #[serde(default)]
    pub mnemonic: Option<Mnemonic>,
    /// Gas limit for every transaction sent on this network.
    #[serde(default = "default_gas")]
    pub gas: u64,
    /// Chain id of the network.
    pub network_id: u64,
}

#[derive(Debug, Deserialize)]
struct NetworksConfig {
    #[serde(default)]
    networks: BTreeMap<String, NetworkEntry>,
}

/// The active network of a deployment run.
///
/// The mnemonic never leaves the profile: it only derives the sender address. Keys
/// are held by the node behind `rpc_url`, which must have that account unlocked for
/// [`JsonRpcProvider`](crate::JsonRpcProvider). Hosted endpoints that only relay
/// signed transactions cannot be deployed to with this provider.
#[derive(Debug, Clone)]
pub struct NetworkProfile {
    pub id: String,
    pub rpc_url: Url,
    mnemonic: Mnemonic,
    pub gas_limit: u64,
    pub chain_id: u64,
}

impl NetworkProfile {
    pub fn new(
        id: impl Into<String>,
        rpc_url: Url,
        mnemonic: Mnemonic,
        gas_limit: u64,
        chain_id: u64,
    ) -> Self {
        Self {
            id: id.into(),
            rpc_url,
            mnemonic,
            gas_limit,
            chain_id,
        }
    }

    /// Address of the first account derived from the profile mnemonic.
    ///
    /// Transactions are sent from this account.
    pub fn signer_address(&self) -> anyhow::Result<Address> {
        let signer = MnemonicBuilder::<English>::default()
            .phrase(self.mnemonic.phrase())
            .index(0)
            .context("Invalid derivation index")?
            .build()
            .context("Failed to derive signer from mnemonic")?;

        Ok(signer.address())
    }
}

/// Store of every configured network, keyed by network id.
#[derive(Debug, Clone, Default)]
pub struct NetworkProfiles {
    networks: BTreeMap<String, NetworkEntry>,
}

impl NetworkProfiles {
    /// Load profiles from the configuration file at `path` and the environment.
    pub fn load(path: &Path) -> Result<Self, DeployError> {
        let profiles = Self::from_figment(config::figment(path))?;
        tracing::info!(
            path = %path.display(),
            networks = ?profiles.ids().collect::<Vec<_>>(),
            "Network configuration loaded"
        );
        Ok(profiles)
    }

    /// Extract profiles from an already assembled figment.
    pub fn from_figment(figment: Figment) -> Result<Self, DeployError> {
        let config: NetworksConfig = figment.extract()?;
        Ok(Self {
            networks: config.networks,
        })
    }

    /// Configured network ids, sorted.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.networks.keys().map(String::as_str)
    }

    /// Select the profile for `network_id`.
    pub fn resolve(&self, network_id: &str) -> Result<NetworkProfile, DeployError> {
        let entry = self
            .networks
            .get(network_id)
            .ok_or_else(|| DeployError::UnknownNetwork(network_id.to_string()))?;

        let mnemonic = entry
            .mnemonic
            .clone()
            .ok_or_else(|| DeployError::MissingCredential(network_id.to_string()))?;

        Ok(NetworkProfile::new(
            network_id,
            entry.rpc_url.clone(),
            mnemonic,
            entry.gas,
            entry.network_id,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use figment::providers::{Format, Serialized, Toml};

    const TEST_MNEMONIC: &str = "test test test test test test test test test test test junk";

    const CONFIG: &str = r#"
        [networks.mainnet]
        rpc_url = "https://mainnet.example.org"
        gas = 4600000
        network_id = 1

        [networks.local]
        rpc_url = "http://127.0.0.1:8545"
        network_id = 1337
    "#;

    fn figment_with_secret() -> Figment {
        Figment::new()
            .merge(Toml::string(CONFIG))
            .merge(Serialized::default("networks.mainnet.mnemonic", TEST_MNEMONIC))
    }

    #[test]
    fn test_resolve_mainnet() {
        let profiles = NetworkProfiles::from_figment(figment_with_secret()).unwrap();
        let profile = profiles.resolve("mainnet").unwrap();

        assert_eq!(profile.id, "mainnet");
        assert_eq!(profile.chain_id, 1);
        assert_eq!(profile.gas_limit, 4_600_000);
        assert_eq!(profile.rpc_url.as_str(), "https://mainnet.example.org/");
    }

    #[test]
    fn test_unknown_network() {
        let profiles = NetworkProfiles::from_figment(figment_with_secret()).unwrap();
        let err = profiles.resolve("testnet").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownNetwork);
    }

    #[test]
    fn test_missing_credential() {
        let profiles = NetworkProfiles::from_figment(figment_with_secret()).unwrap();
        let err = profiles.resolve("local").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingCredential);
    }

    #[test]
    fn test_gas_defaults() {
        let figment = figment_with_secret()
            .merge(Serialized::default("networks.local.mnemonic", TEST_MNEMONIC));
        let profiles = NetworkProfiles::from_figment(figment).unwrap();
        let profile = profiles.resolve("local").unwrap();
        assert_eq!(profile.gas_limit, DEFAULT_GAS_LIMIT);
        assert_eq!(profile.chain_id, 1337);
    }

    #[test]
    fn test_ids_sorted() {
        let profiles = NetworkProfiles::from_figment(figment_with_secret()).unwrap();
        assert_eq!(profiles.ids().collect::<Vec<_>>(), vec!["local", "mainnet"]);
    }

    #[test]
    fn test_invalid_config() {
        let figment = Figment::new().merge(Toml::string(
            r#"
            [networks.mainnet]
            rpc_url = "not a url"
            network_id = 1
            "#,
        ));
        let err = NetworkProfiles::from_figment(figment).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_mnemonic_is_redacted() {
        let profiles = NetworkProfiles::from_figment(figment_with_secret()).unwrap();
        let profile = profiles.resolve("mainnet").unwrap();
        let printed = format!("{profile:?}");
        assert!(!printed.contains("junk"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn test_signer_address() {
        let profile = NetworkProfile::new(
            "local",
            Url::parse("http://127.0.0.1:8545").unwrap(),
            Mnemonic::new(TEST_MNEMONIC),
            DEFAULT_GAS_LIMIT,
            1337,
        );
        let address = profile.signer_address().unwrap();
        assert_eq!(
            address,
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
                .parse::<Address>()
                .unwrap()
        );
    }
}
