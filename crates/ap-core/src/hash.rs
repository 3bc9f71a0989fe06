//! poseidon hash with circom parameters
//!
//! used for account commitments, reward nullifiers, tree leaves and every
//! merkle node. pedersen lives in its own module and is never interchangeable.

use alloy_primitives::U256;
use ark_bn254::Fr;
use light_poseidon::{Poseidon, PoseidonHasher};

use crate::error::{CoreError, Result};
use crate::field::{from_fr, to_fr};

/// widest input the circom parameter set supports
pub const MAX_POSEIDON_INPUTS: usize = 12;

pub fn poseidon_hash(inputs: &[U256]) -> Result<U256> {
    if inputs.is_empty() || inputs.len() > MAX_POSEIDON_INPUTS {
        return Err(CoreError::Poseidon(format!(
            "unsupported input width {}",
            inputs.len()
        )));
    }
    let elems = inputs
        .iter()
        .map(|v| to_fr(*v))
        .collect::<Result<Vec<Fr>>>()?;

    let mut hasher =
        Poseidon::<Fr>::new_circom(elems.len()).map_err(|e| CoreError::Poseidon(e.to_string()))?;
    let out = hasher
        .hash(&elems)
        .map_err(|e| CoreError::Poseidon(e.to_string()))?;
    Ok(from_fr(out))
}

/// merkle node combiner
pub fn poseidon_hash2(left: U256, right: U256) -> Result<U256> {
    poseidon_hash(&[left, right])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FIELD_SIZE;
    use alloy_primitives::uint;

    #[test]
    fn test_known_vectors() {
        assert_eq!(
            poseidon_hash(&[U256::from(1u8)]).unwrap(),
            uint!(18586133768512220936620570745912940619677854269274689475585506675881198879027_U256)
        );
        assert_eq!(
            poseidon_hash2(U256::from(1u8), U256::from(2u8)).unwrap(),
            uint!(7853200120776062878684798364095072458815029376092732009249414926327459813530_U256)
        );
    }

    #[test]
    fn test_order_matters() {
        let a = U256::from(7u8);
        let b = U256::from(9u8);
        assert_ne!(poseidon_hash2(a, b).unwrap(), poseidon_hash2(b, a).unwrap());
    }

    #[test]
    fn test_rejects_non_field_input() {
        let err = poseidon_hash(&[FIELD_SIZE]).unwrap_err();
        assert!(matches!(err, CoreError::NotInField(_)));
    }

    #[test]
    fn test_rejects_bad_width() {
        assert!(poseidon_hash(&[]).is_err());
        assert!(poseidon_hash(&[U256::ZERO; 13]).is_err());
        assert!(poseidon_hash(&[U256::ZERO; 3]).is_ok());
    }
}
