//! Compiled contract artifacts and ABI encoding of step arguments.

use std::collections::BTreeMap;
use std::path::PathBuf;

use alloy_core::dyn_abi::{DynSolValue, JsonAbiExt, Specifier};
use alloy_core::json_abi::{JsonAbi, Param};
use alloy_core::primitives::Bytes;
use anyhow::{Context, Result};
use serde::Deserialize;

use crate::DeployError;

/// Compiled bytecode and interface of a contract, addressable by name.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub contract_name: String,
    pub abi: JsonAbi,
    pub bytecode: Bytes,
}

/// Bytecode is a hex string in truffle output and an `{ "object": .. }` table in forge output.
#[derive(Deserialize)]
#[serde(untagged)]
enum BytecodeField {
    Hex(Bytes),
    Object { object: Bytes },
}

#[derive(Deserialize)]
struct ArtifactFile {
    abi: JsonAbi,
    bytecode: BytecodeField,
}

impl Artifact {
    /// Parse an artifact from its JSON build output.
    pub fn from_json(contract_name: &str, json: &str) -> Result<Self> {
        let file: ArtifactFile = serde_json::from_str(json)
            .with_context(|| format!("Failed to parse artifact JSON for {contract_name}"))?;

        let bytecode = match file.bytecode {
            BytecodeField::Hex(code) | BytecodeField::Object { object: code } => code,
        };

        if bytecode.is_empty() {
            anyhow::bail!("Artifact {contract_name} has no creation bytecode");
        }

        Ok(Self {
            contract_name: contract_name.to_string(),
            abi: file.abi,
            bytecode,
        })
    }

    /// Creation data: bytecode followed by the ABI-encoded constructor arguments.
    pub fn encode_deploy(&self, args: &[String]) -> Result<Bytes> {
        let mut data = self.bytecode.to_vec();

        match self.abi.constructor() {
            Some(constructor) => {
                let values = coerce_args(&constructor.inputs, args)?;
                let encoded = constructor
                    .abi_encode_input(&values)
                    .context("Failed to encode constructor arguments")?;
                data.extend_from_slice(&encoded);
            }
            None if args.is_empty() => {}
            None => anyhow::bail!(
                "{} has no constructor but {} argument(s) were given",
                self.contract_name,
                args.len()
            ),
        }

        Ok(data.into())
    }

    /// Calldata for `method`, choosing the overload whose arity matches `args`.
    pub fn encode_call(&self, method: &str, args: &[String]) -> Result<Bytes> {
        let function = self
            .abi
            .function(method)
            .and_then(|overloads| overloads.iter().find(|f| f.inputs.len() == args.len()))
            .with_context(|| {
                format!(
                    "{} has no method {method} taking {} argument(s)",
                    self.contract_name,
                    args.len()
                )
            })?;

        let values = coerce_args(&function.inputs, args)?;
        let encoded = function
            .abi_encode_input(&values)
            .with_context(|| format!("Failed to encode arguments for {method}"))?;

        Ok(encoded.into())
    }
}

/// Parse string arguments against the declared parameter types.
fn coerce_args(params: &[Param], args: &[String]) -> Result<Vec<DynSolValue>> {
    if params.len() != args.len() {
        anyhow::bail!(
            "Expected {} argument(s), got {}",
            params.len(),
            args.len()
        );
    }

    params
        .iter()
        .zip(args)
        .map(|(param, arg)| {
            let ty = param
                .resolve()
                .with_context(|| format!("Unsupported parameter type {}", param.ty))?;
            ty.coerce_str(arg).with_context(|| {
                format!(
                    "Invalid value '{arg}' for parameter {} of type {}",
                    param.name, param.ty
                )
            })
        })
        .collect()
}

/// Resolves a contract name to its compiled artifact.
pub trait ArtifactSource: Send + Sync {
    fn require(&self, contract_name: &str) -> Result<Artifact, DeployError>;
}

/// Artifacts stored as `<root>/<ContractName>.json`.
#[derive(Debug, Clone)]
pub struct ArtifactDir {
    root: PathBuf,
}

impl ArtifactDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ArtifactSource for ArtifactDir {
    fn require(&self, contract_name: &str) -> Result<Artifact, DeployError> {
        let path = self.root.join(format!("{contract_name}.json"));

        std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read artifact from {}", path.display()))
            .and_then(|json| Artifact::from_json(contract_name, &json))
            .map_err(|source| DeployError::Artifact {
                name: contract_name.to_string(),
                source,
            })
    }
}

/// Artifacts held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryArtifacts {
    artifacts: BTreeMap<String, Artifact>,
}

impl InMemoryArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, artifact: Artifact) -> &mut Self {
        self.artifacts
            .insert(artifact.contract_name.clone(), artifact);
        self
    }
}

impl ArtifactSource for InMemoryArtifacts {
    fn require(&self, contract_name: &str) -> Result<Artifact, DeployError> {
        self.artifacts
            .get(contract_name)
            .cloned()
            .ok_or_else(|| DeployError::Artifact {
                name: contract_name.to_string(),
                source: anyhow::anyhow!("Artifact not found"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    const TOKEN_JSON: &str = include_str!("../tests/fixtures/TokenContract.json");
    const SALE_JSON: &str = include_str!("../tests/fixtures/SaleContract.json");

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_parse_truffle_and_forge_bytecode() {
        let token = Artifact::from_json("TokenContract", TOKEN_JSON).unwrap();
        let sale = Artifact::from_json("SaleContract", SALE_JSON).unwrap();

        assert!(token.bytecode.starts_with(&[0x60, 0x80]));
        assert!(sale.bytecode.starts_with(&[0x60, 0x80]));
        assert!(token.abi.constructor().is_some());
        assert!(token.abi.function("setSaleContract").is_some());
    }

    #[test]
    fn test_encode_deploy_appends_constructor_args() {
        let token = Artifact::from_json("TokenContract", TOKEN_JSON).unwrap();
        let data = token
            .encode_deploy(&args(&["Gabro Token", "GBO", "18", "1.0"]))
            .unwrap();

        assert!(data.starts_with(&token.bytecode[..]));
        let encoded = &data[token.bytecode.len()..];
        // Four head words, then the dynamic string tails.
        assert!(encoded.len() > 4 * 32);
        // decimals is the third head word.
        assert_eq!(encoded[2 * 32 + 31], 18);
    }

    #[test]
    fn test_encode_deploy_rejects_bad_values() {
        let token = Artifact::from_json("TokenContract", TOKEN_JSON).unwrap();
        assert!(token
            .encode_deploy(&args(&["Gabro Token", "GBO", "not-a-number", "1.0"]))
            .is_err());
        assert!(token.encode_deploy(&args(&["Gabro Token"])).is_err());
    }

    #[test]
    fn test_encode_call_has_selector() {
        let token = Artifact::from_json("TokenContract", TOKEN_JSON).unwrap();
        let data = token
            .encode_call(
                "setSaleContract",
                &args(&["0x84140d9b5a3127ef8b625c03a2df8b6bec409b62"]),
            )
            .unwrap();

        assert_eq!(data.len(), 4 + 32);
        assert_eq!(data[4 + 12], 0x84);
    }

    #[test]
    fn test_encode_call_unknown_method() {
        let token = Artifact::from_json("TokenContract", TOKEN_JSON).unwrap();
        assert!(token.encode_call("mint", &args(&[])).is_err());
        assert!(token.encode_call("setSaleContract", &args(&[])).is_err());
    }

    #[test]
    fn test_in_memory_missing_artifact() {
        let artifacts = InMemoryArtifacts::new();
        let err = artifacts.require("TokenContract").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Artifact);
    }

    #[test]
    fn test_artifact_dir() {
        let dir = ArtifactDir::new(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures"));
        let token = dir.require("TokenContract").unwrap();
        assert_eq!(token.contract_name, "TokenContract");

        let err = dir.require("Missing").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Artifact);
    }
}
