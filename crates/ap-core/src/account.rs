//! anonymity point accounts
//!
//! an account is a running AP balance. every reward or withdraw consumes one
//! account (its nullifier hash gets spent) and creates the next one, whose
//! commitment lands in the shared account tree. the plaintext is boxed for
//! the holder and published next to the commitment.

use alloy_primitives::{Bytes, I256, U256};
use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::encryption::{EncryptionKeypair, EncryptionPublicKey};
use crate::error::{CoreError, Result};
use crate::field::{random_limb, to_be31, LIMB_BYTES, RANGE_LIMIT};
use crate::hash::poseidon_hash;

/// amount || secret || nullifier, 31 bytes each
pub const ACCOUNT_PLAINTEXT_LEN: usize = 3 * LIMB_BYTES;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub amount: U256,
    pub secret: U256,
    pub nullifier: U256,
    /// poseidon([amount, secret, nullifier])
    pub commitment: U256,
    /// poseidon([nullifier])
    pub nullifier_hash: U256,
}

impl Account {
    /// `amount` arrives signed because callers compute balance deltas
    pub fn new(amount: I256, secret: Option<U256>, nullifier: Option<U256>) -> Result<Self> {
        if amount.is_negative() {
            return Err(CoreError::NegativeAmount);
        }
        Self::with_amount(amount.into_raw(), secret, nullifier)
    }

    pub fn with_amount(amount: U256, secret: Option<U256>, nullifier: Option<U256>) -> Result<Self> {
        // same bound the ledger enforces on withdraw amounts
        if amount >= RANGE_LIMIT {
            return Err(CoreError::AmountOutOfRange(amount));
        }
        let secret = secret.unwrap_or_else(random_limb);
        let nullifier = nullifier.unwrap_or_else(random_limb);
        for limb in [secret, nullifier] {
            if limb.bit_len() > LIMB_BYTES * 8 {
                return Err(CoreError::SecretOutOfRange);
            }
        }

        let commitment = poseidon_hash(&[amount, secret, nullifier])?;
        let nullifier_hash = poseidon_hash(&[nullifier])?;
        Ok(Self {
            amount,
            secret,
            nullifier,
            commitment,
            nullifier_hash,
        })
    }

    /// empty balance with fresh randomness
    pub fn zero() -> Result<Self> {
        Self::with_amount(U256::ZERO, None, None)
    }

    pub fn to_plaintext(&self) -> Result<[u8; ACCOUNT_PLAINTEXT_LEN]> {
        let mut out = [0u8; ACCOUNT_PLAINTEXT_LEN];
        out[..LIMB_BYTES].copy_from_slice(&to_be31(self.amount)?);
        out[LIMB_BYTES..2 * LIMB_BYTES].copy_from_slice(&to_be31(self.secret)?);
        out[2 * LIMB_BYTES..].copy_from_slice(&to_be31(self.nullifier)?);
        Ok(out)
    }

    pub fn from_plaintext(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != ACCOUNT_PLAINTEXT_LEN {
            return Err(CoreError::MalformedCiphertext(format!(
                "account plaintext must be {} bytes, got {}",
                ACCOUNT_PLAINTEXT_LEN,
                bytes.len()
            )));
        }
        Self::with_amount(
            U256::from_be_slice(&bytes[..LIMB_BYTES]),
            Some(U256::from_be_slice(&bytes[LIMB_BYTES..2 * LIMB_BYTES])),
            Some(U256::from_be_slice(&bytes[2 * LIMB_BYTES..])),
        )
    }

    /// packed box of the base64 plaintext
    pub fn encrypt(&self, recipient: &EncryptionPublicKey) -> Result<Bytes> {
        let encoded = STANDARD.encode(self.to_plaintext()?);
        Ok(recipient.encrypt(encoded.as_bytes())?.pack())
    }

    pub fn decrypt(keys: &EncryptionKeypair, data: &[u8]) -> Result<Self> {
        let opened = keys.decrypt(data)?;
        let plaintext = STANDARD
            .decode(&opened)
            .map_err(|e| CoreError::MalformedCiphertext(format!("bad base64: {}", e)))?;
        Self::from_plaintext(&plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::field::FIELD_SIZE;

    #[test]
    fn test_negative_amount_rejected() {
        let err = Account::new(I256::MINUS_ONE, None, None).unwrap_err();
        assert!(matches!(err, CoreError::NegativeAmount));
    }

    #[test]
    fn test_amount_above_range_rejected() {
        let err = Account::with_amount(RANGE_LIMIT, None, None).unwrap_err();
        assert!(matches!(&err, CoreError::AmountOutOfRange(a) if *a == RANGE_LIMIT));
        assert_eq!(err.kind(), ErrorKind::Range);
        // below the field size but still too wide for the plaintext word
        assert!(matches!(
            Account::with_amount(FIELD_SIZE - U256::from(1u8), None, None),
            Err(CoreError::AmountOutOfRange(_))
        ));

        let widest = Account::with_amount(RANGE_LIMIT - U256::from(1u8), None, None).unwrap();
        let keys = EncryptionKeypair::generate();
        let packed = widest.encrypt(&keys.public_key()).unwrap();
        assert_eq!(Account::decrypt(&keys, &packed).unwrap(), widest);
    }

    #[test]
    fn test_zero_account() {
        let a = Account::zero().unwrap();
        let b = Account::zero().unwrap();
        assert_eq!(a.amount, U256::ZERO);
        assert_ne!(a.commitment, b.commitment);
        assert_eq!(a.nullifier_hash, poseidon_hash(&[a.nullifier]).unwrap());
    }

    #[test]
    fn test_commitment_binds_amount() {
        let s = Some(U256::from(11u8));
        let n = Some(U256::from(12u8));
        let a = Account::with_amount(U256::from(1u8), s, n).unwrap();
        let b = Account::with_amount(U256::from(2u8), s, n).unwrap();
        assert_ne!(a.commitment, b.commitment);
        assert_eq!(a.nullifier_hash, b.nullifier_hash);
    }

    #[test]
    fn test_encrypt_roundtrip() {
        let keys = EncryptionKeypair::generate();
        let account = Account::with_amount(U256::from(14400u64), None, None).unwrap();
        let packed = account.encrypt(&keys.public_key()).unwrap();
        // 24 nonce + 32 key + base64(93) + tag
        assert_eq!(packed.len(), 24 + 32 + 124 + 16);
        assert_eq!(Account::decrypt(&keys, &packed).unwrap(), account);
    }

    #[test]
    fn test_decrypt_with_wrong_key() {
        let keys = EncryptionKeypair::generate();
        let packed = Account::zero().unwrap().encrypt(&keys.public_key()).unwrap();
        let err = Account::decrypt(&EncryptionKeypair::generate(), &packed).unwrap_err();
        assert!(matches!(err, CoreError::DecryptionFailed));
    }

    #[test]
    fn test_decrypt_wrong_plaintext_length() {
        let keys = EncryptionKeypair::generate();
        let encoded = STANDARD.encode([1u8; 40]);
        let packed = keys.public_key().encrypt(encoded.as_bytes()).unwrap().pack();
        assert!(matches!(
            Account::decrypt(&keys, &packed),
            Err(CoreError::MalformedCiphertext(_))
        ));
    }

    #[test]
    fn test_plaintext_is_big_endian() {
        let account = Account::with_amount(U256::from(0x0102u64), None, None).unwrap();
        let bytes = account.to_plaintext().unwrap();
        assert_eq!(bytes[29], 0x01);
        assert_eq!(bytes[30], 0x02);
    }
}
