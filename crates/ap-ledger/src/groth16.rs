//! groth16 verification of snarkjs proofs over bn254
//!
//! keys come from snarkjs `verification_key.json` (decimal strings, g2
//! coordinates as `[c0, c1]`). proofs are the 256-byte solidity encoding:
//!
//! ```text
//! a.x | a.y | b.x.c1 | b.x.c0 | b.y.c1 | b.y.c0 | c.x | c.y
//! ```

use std::collections::HashMap;

use alloy_primitives::U256;
use ap_core::{Circuit, ProofVerifier};
use ark_bn254::{Bn254, Fq, Fq2, Fr, G1Affine, G2Affine};
use ark_ff::{BigInt, PrimeField, Zero};
use ark_groth16::{prepare_verifying_key, Groth16, PreparedVerifyingKey, Proof, VerifyingKey};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

pub const PROOF_LEN: usize = 256;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid verification key json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid field element: {0}")]
    Field(String),

    #[error("point not on curve or not in subgroup: {0}")]
    Point(&'static str),

    #[error("{circuit} key has {found} IC points, expected {expected}")]
    IcCount {
        circuit: Circuit,
        expected: usize,
        found: usize,
    },
}

/// snarkjs verification key, as exported
#[derive(Clone, Debug, Deserialize)]
pub struct SnarkjsKey {
    pub vk_alpha_1: Vec<String>,
    pub vk_beta_2: Vec<Vec<String>>,
    pub vk_gamma_2: Vec<Vec<String>>,
    pub vk_delta_2: Vec<Vec<String>>,
    #[serde(rename = "IC")]
    pub ic: Vec<Vec<String>>,
}

impl SnarkjsKey {
    pub fn from_json(json: &str) -> Result<Self, KeyError> {
        Ok(serde_json::from_str(json)?)
    }

    fn to_verifying_key(&self) -> Result<VerifyingKey<Bn254>, KeyError> {
        Ok(VerifyingKey {
            alpha_g1: decimal_g1(&self.vk_alpha_1)?,
            beta_g2: decimal_g2(&self.vk_beta_2)?,
            gamma_g2: decimal_g2(&self.vk_gamma_2)?,
            delta_g2: decimal_g2(&self.vk_delta_2)?,
            gamma_abc_g1: self
                .ic
                .iter()
                .map(|p| decimal_g1(p))
                .collect::<Result<_, _>>()?,
        })
    }
}

/// one prepared key per circuit
#[derive(Default)]
pub struct Groth16Verifier {
    keys: HashMap<Circuit, PreparedVerifyingKey<Bn254>>,
}

impl Groth16Verifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, circuit: Circuit, key: &SnarkjsKey) -> Result<Self, KeyError> {
        self.insert_key(circuit, key)?;
        Ok(self)
    }

    pub fn insert_key(&mut self, circuit: Circuit, key: &SnarkjsKey) -> Result<(), KeyError> {
        let vk = key.to_verifying_key()?;
        let expected = circuit.public_input_count() + 1;
        if vk.gamma_abc_g1.len() != expected {
            return Err(KeyError::IcCount {
                circuit,
                expected,
                found: vk.gamma_abc_g1.len(),
            });
        }
        self.keys.insert(circuit, prepare_verifying_key(&vk));
        debug!(%circuit, "verification key loaded");
        Ok(())
    }

    pub fn has_key(&self, circuit: Circuit) -> bool {
        self.keys.contains_key(&circuit)
    }
}

impl ProofVerifier for Groth16Verifier {
    fn verify(&self, circuit: Circuit, proof: &[u8], public_inputs: &[U256]) -> bool {
        let Some(pvk) = self.keys.get(&circuit) else {
            warn!(%circuit, "no verification key");
            return false;
        };
        let Some(proof) = decode_proof(proof) else {
            warn!(%circuit, "malformed proof");
            return false;
        };
        let Some(inputs) = public_inputs
            .iter()
            .map(|v| scalar(*v))
            .collect::<Option<Vec<Fr>>>()
        else {
            warn!(%circuit, "public input outside scalar field");
            return false;
        };
        match Groth16::<Bn254>::verify_proof(pvk, &proof, &inputs) {
            Ok(valid) => valid,
            Err(e) => {
                warn!(%circuit, error = %e, "verification failed");
                false
            }
        }
    }
}

fn base_field(value: U256) -> Option<Fq> {
    Fq::from_bigint(BigInt::new(value.into_limbs()))
}

fn scalar(value: U256) -> Option<Fr> {
    Fr::from_bigint(BigInt::new(value.into_limbs()))
}

fn word(bytes: &[u8]) -> Option<Fq> {
    base_field(U256::try_from_be_slice(bytes)?)
}

fn g1(x: Fq, y: Fq) -> Option<G1Affine> {
    if x.is_zero() && y.is_zero() {
        return Some(G1Affine::identity());
    }
    let p = G1Affine::new_unchecked(x, y);
    (p.is_on_curve() && p.is_in_correct_subgroup_assuming_on_curve()).then_some(p)
}

fn g2(x: Fq2, y: Fq2) -> Option<G2Affine> {
    if x.is_zero() && y.is_zero() {
        return Some(G2Affine::identity());
    }
    let p = G2Affine::new_unchecked(x, y);
    (p.is_on_curve() && p.is_in_correct_subgroup_assuming_on_curve()).then_some(p)
}

fn decode_proof(bytes: &[u8]) -> Option<Proof<Bn254>> {
    if bytes.len() != PROOF_LEN {
        return None;
    }
    let w: Vec<Fq> = bytes.chunks_exact(32).map(word).collect::<Option<_>>()?;
    Some(Proof {
        a: g1(w[0], w[1])?,
        b: g2(Fq2::new(w[3], w[2]), Fq2::new(w[5], w[4]))?,
        c: g1(w[6], w[7])?,
    })
}

fn decimal(s: &str) -> Result<Fq, KeyError> {
    U256::from_str_radix(s, 10)
        .ok()
        .and_then(base_field)
        .ok_or_else(|| KeyError::Field(s.to_string()))
}

fn decimal_g1(coords: &[String]) -> Result<G1Affine, KeyError> {
    let [x, y, ..] = coords else {
        return Err(KeyError::Point("g1 needs two coordinates"));
    };
    g1(decimal(x)?, decimal(y)?).ok_or(KeyError::Point("g1"))
}

fn decimal_g2(coords: &[Vec<String>]) -> Result<G2Affine, KeyError> {
    let [x, y, ..] = coords else {
        return Err(KeyError::Point("g2 needs two coordinates"));
    };
    let fq2 = |c: &[String]| -> Result<Fq2, KeyError> {
        let [c0, c1, ..] = c else {
            return Err(KeyError::Point("fq2 needs two components"));
        };
        Ok(Fq2::new(decimal(c0)?, decimal(c1)?))
    };
    g2(fq2(x)?, fq2(y)?).ok_or(KeyError::Point("g2"))
}
