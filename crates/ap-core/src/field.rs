//! bn254 scalar field helpers
//!
//! every hash input and every public circuit value lives in the bn254 scalar
//! field. values outside the field are rejected, never reduced.

use alloy_primitives::{uint, Address, B256, U256};
use ark_bn254::Fr;
use ark_ff::{BigInt, PrimeField};
use rand::{rngs::OsRng, RngCore};

use crate::error::{CoreError, Result};

/// order of the bn254 scalar field
pub const FIELD_SIZE: U256 =
    uint!(21888242871839275222246405745257275088548364400416034343698204186575808495617_U256);

/// fee and amount must stay below 2^248
pub const RANGE_LIMIT: U256 = U256::from_limbs([0, 0, 0, 1 << 56]);

/// byte width of secrets, nullifiers and packed amounts
pub const LIMB_BYTES: usize = 31;

pub fn is_field_element(value: U256) -> bool {
    value < FIELD_SIZE
}

pub fn ensure_field(value: U256) -> Result<U256> {
    if is_field_element(value) {
        Ok(value)
    } else {
        Err(CoreError::NotInField(value))
    }
}

pub fn to_fr(value: U256) -> Result<Fr> {
    Fr::from_bigint(BigInt::new(value.into_limbs())).ok_or(CoreError::NotInField(value))
}

pub fn from_fr(value: Fr) -> U256 {
    U256::from_limbs(value.into_bigint().0)
}

pub fn word_to_u256(word: B256) -> U256 {
    U256::from_be_bytes(word.0)
}

pub fn u256_to_word(value: U256) -> B256 {
    B256::from(value.to_be_bytes::<32>())
}

/// addresses enter the field left-padded to 32 bytes
pub fn address_to_field(address: Address) -> U256 {
    word_to_u256(address.into_word())
}

/// 31 bytes of os randomness read little-endian
pub fn random_limb() -> U256 {
    let mut bytes = [0u8; LIMB_BYTES];
    OsRng.fill_bytes(&mut bytes);
    U256::from_le_slice(&bytes)
}

fn ensure_limb(value: U256) -> Result<()> {
    if value.bit_len() > LIMB_BYTES * 8 {
        return Err(CoreError::SecretOutOfRange);
    }
    Ok(())
}

pub fn to_le31(value: U256) -> Result<[u8; LIMB_BYTES]> {
    ensure_limb(value)?;
    let bytes = value.to_le_bytes::<32>();
    let mut out = [0u8; LIMB_BYTES];
    out.copy_from_slice(&bytes[..LIMB_BYTES]);
    Ok(out)
}

pub fn to_be31(value: U256) -> Result<[u8; LIMB_BYTES]> {
    ensure_limb(value)?;
    let bytes = value.to_be_bytes::<32>();
    let mut out = [0u8; LIMB_BYTES];
    out.copy_from_slice(&bytes[1..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_size_matches_arkworks() {
        assert_eq!(FIELD_SIZE, U256::from_limbs(Fr::MODULUS.0));
    }

    #[test]
    fn test_range_limit_is_2_pow_248() {
        assert_eq!(RANGE_LIMIT, U256::from(1u8) << 248);
    }

    #[test]
    fn test_fr_roundtrip() {
        let value = U256::from(123456789u64);
        assert_eq!(from_fr(to_fr(value).unwrap()), value);
        assert!(to_fr(FIELD_SIZE).is_err());
        assert!(to_fr(FIELD_SIZE - U256::from(1u8)).is_ok());
    }

    #[test]
    fn test_address_left_padded() {
        let address = Address::repeat_byte(0x11);
        let value = address_to_field(address);
        assert_eq!(value.bit_len(), 160 - 3);
        assert_eq!(&u256_to_word(value)[12..], address.as_slice());
    }

    #[test]
    fn test_limb_encodings() {
        let value = U256::from(0x0102u64);
        let le = to_le31(value).unwrap();
        assert_eq!(le[0], 0x02);
        assert_eq!(le[1], 0x01);
        let be = to_be31(value).unwrap();
        assert_eq!(be[29], 0x01);
        assert_eq!(be[30], 0x02);
        assert!(to_le31(U256::from(1u8) << 248).is_err());
    }

    #[test]
    fn test_random_limb_fits() {
        for _ in 0..32 {
            assert!(random_limb().bit_len() <= 248);
        }
    }
}
