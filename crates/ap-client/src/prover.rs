//! prover seam
//!
//! proving is external: the controller hands over circuit inputs and gets
//! back the 256-byte solidity-ordered groth16 proof.

use std::future::Future;
use std::path::PathBuf;

use alloy_primitives::Bytes;
use ap_core::Circuit;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::inputs::CircuitInputs;

pub const PROOF_LEN: usize = 256;

#[derive(Debug, Error)]
pub enum ProverError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize circuit inputs: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{circuit} prover failed ({status}): {stderr}")]
    ProcessFailed {
        circuit: Circuit,
        status: String,
        stderr: String,
    },

    #[error("proof must be 256 bytes, got {0}")]
    ProofLength(usize),
}

pub trait Prover {
    fn prove(&self, inputs: &CircuitInputs) -> impl Future<Output = Result<Bytes, ProverError>>;
}

impl<P: Prover> Prover for &P {
    fn prove(&self, inputs: &CircuitInputs) -> impl Future<Output = Result<Bytes, ProverError>> {
        (**self).prove(inputs)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProverConfig {
    /// invoked as `<program> [args..] <circuit> <input.json> <proof.out>`
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    /// parent of the per-proof scratch directories, system temp if unset
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

/// shells out to a snarkjs/rapidsnark wrapper
pub struct CommandProver {
    config: ProverConfig,
}

impl CommandProver {
    pub fn new(config: ProverConfig) -> Self {
        Self { config }
    }

    fn scratch(&self) -> std::io::Result<tempfile::TempDir> {
        match &self.config.scratch_dir {
            Some(dir) => tempfile::Builder::new().prefix("ap-proof").tempdir_in(dir),
            None => tempfile::Builder::new().prefix("ap-proof").tempdir(),
        }
    }
}

impl Prover for CommandProver {
    async fn prove(&self, inputs: &CircuitInputs) -> Result<Bytes, ProverError> {
        let circuit = inputs.circuit();
        let scratch = self.scratch()?;
        let input_path = scratch.path().join("input.json");
        let proof_path = scratch.path().join("proof.bin");
        tokio::fs::write(&input_path, inputs.to_json()?).await?;

        debug!(%circuit, program = %self.config.program.display(), "running prover");
        let output = Command::new(&self.config.program)
            .args(&self.config.args)
            .arg(circuit.name())
            .arg(&input_path)
            .arg(&proof_path)
            .output()
            .await?;

        if !output.status.success() {
            return Err(ProverError::ProcessFailed {
                circuit,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let proof = tokio::fs::read(&proof_path).await?;
        if proof.len() != PROOF_LEN {
            return Err(ProverError::ProofLength(proof.len()));
        }
        info!(%circuit, "proof generated");
        Ok(Bytes::from(proof))
    }
}

/// binds the proof to the public inputs without any circuit
#[cfg(any(test, feature = "test-utils"))]
#[derive(Clone, Copy, Debug, Default)]
pub struct DigestProver;

#[cfg(any(test, feature = "test-utils"))]
impl Prover for DigestProver {
    async fn prove(&self, inputs: &CircuitInputs) -> Result<Bytes, ProverError> {
        Ok(ap_core::proof::digest::digest_proof(
            inputs.circuit(),
            &inputs.public_inputs(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::{Signal, TreeUpdateInputs};
    use ap_core::proof::digest::DigestVerifier;
    use ap_core::ProofVerifier;

    fn inputs() -> CircuitInputs {
        CircuitInputs::TreeUpdate(TreeUpdateInputs {
            old_root: Signal::from(1u64),
            new_root: Signal::from(2u64),
            leaf: Signal::from(3u64),
            path_indices: Signal::from(0u64),
            path_elements: vec![Signal::from(0u64); 2],
        })
    }

    #[tokio::test]
    async fn test_digest_prover_matches_verifier() {
        let inputs = inputs();
        let proof = DigestProver.prove(&inputs).await.unwrap();
        assert!(DigestVerifier.verify(Circuit::TreeUpdate, &proof, &inputs.public_inputs()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_prover_reads_proof() {
        let dir = tempfile::tempdir().unwrap();
        // sh -c <script> $0 <circuit> <input> <proof>
        let prover = CommandProver::new(ProverConfig {
            program: PathBuf::from("sh"),
            args: vec![
                "-c".into(),
                "test -s \"$2\" && head -c 256 /dev/zero > \"$3\"".into(),
                "prover".into(),
            ],
            scratch_dir: Some(dir.path().to_path_buf()),
        });
        let proof = prover.prove(&inputs()).await.unwrap();
        assert_eq!(proof.len(), PROOF_LEN);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_prover_surfaces_failure() {
        let prover = CommandProver::new(ProverConfig {
            program: PathBuf::from("sh"),
            args: vec!["-c".into(), "echo boom >&2; exit 3".into(), "prover".into()],
            scratch_dir: None,
        });
        match prover.prove(&inputs()).await {
            Err(ProverError::ProcessFailed { stderr, circuit, .. }) => {
                assert_eq!(stderr, "boom");
                assert_eq!(circuit, Circuit::TreeUpdate);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
