use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::DeploymentStep;

/// Inputs that identify a deployment: the chain and the exact step sequence.
///
/// A persisted registry is only resumed when it was produced for the same
/// fingerprint. Gas limit and RPC endpoint are excluded since changing them does not
/// change what gets deployed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanFingerprint<'a> {
    pub chain_id: u64,
    pub steps: &'a [DeploymentStep],
}

impl<'a> PlanFingerprint<'a> {
    pub fn new(chain_id: u64, steps: &'a [DeploymentStep]) -> Self {
        Self { chain_id, steps }
    }

    /// Hex-encoded SHA-256 of the JSON form of this fingerprint.
    pub fn compute_hash(&self) -> String {
        let json = serde_json::to_string(self)
            .expect("PlanFingerprint serialization should never fail");

        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StepArg;

    fn steps() -> Vec<DeploymentStep> {
        vec![
            DeploymentStep::create(
                "TokenContract",
                vec![StepArg::literal("Gabro Token"), StepArg::literal("GBO")],
            ),
            DeploymentStep::call(
                "TokenContract",
                "setSaleContract",
                vec![StepArg::address_of("SaleContract")],
            ),
        ]
    }

    #[test]
    fn test_hash_determinism() {
        let steps = steps();
        let hash1 = PlanFingerprint::new(1, &steps).compute_hash();
        let hash2 = PlanFingerprint::new(1, &steps).compute_hash();

        assert_eq!(hash1, hash2, "Hash should be deterministic");
        assert_eq!(hash1.len(), 64, "SHA-256 hash should be 64 hex characters");
    }

    #[test]
    fn test_hash_changes_with_chain_id() {
        let steps = steps();
        assert_ne!(
            PlanFingerprint::new(1, &steps).compute_hash(),
            PlanFingerprint::new(5, &steps).compute_hash(),
        );
    }

    #[test]
    fn test_hash_changes_with_args() {
        let steps1 = steps();
        let mut steps2 = steps();
        steps2[0] = DeploymentStep::create(
            "TokenContract",
            vec![StepArg::literal("Other Token"), StepArg::literal("GBO")],
        );

        assert_ne!(
            PlanFingerprint::new(1, &steps1).compute_hash(),
            PlanFingerprint::new(1, &steps2).compute_hash(),
        );
    }
}
