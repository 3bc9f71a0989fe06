//! deposit/withdrawal note
//!
//! a note is the secret half of one deposit into a base pool. the pool only
//! ever sees its pedersen commitment and, at withdrawal, its pedersen nullifier
//! hash. mining uses a separate poseidon nullifier so a note's reward can be
//! claimed exactly once without touching the pool's own nullifier namespace.

use alloy_primitives::{Address, U256};
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::field::{random_limb, to_le31, LIMB_BYTES};
use crate::hash::poseidon_hash;
use crate::pedersen::pedersen_hash;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Note {
    pub instance: Address,
    pub deposit_block: u64,
    pub withdrawal_block: u64,
    pub secret: U256,
    pub nullifier: U256,
    /// pedersen(nullifier_le31 || secret_le31)
    pub commitment: U256,
    /// pedersen(nullifier_le31)
    pub nullifier_hash: U256,
    /// poseidon([nullifier])
    pub reward_nullifier: U256,
}

impl Note {
    /// missing secret material is drawn from the os rng.
    /// block ordering is not checked here, see [`Note::mining_interval`]
    pub fn new(
        instance: Address,
        deposit_block: u64,
        withdrawal_block: u64,
        secret: Option<U256>,
        nullifier: Option<U256>,
    ) -> Result<Self> {
        let secret = secret.unwrap_or_else(random_limb);
        let nullifier = nullifier.unwrap_or_else(random_limb);

        let nullifier_bytes = to_le31(nullifier)?;
        let secret_bytes = to_le31(secret)?;

        let mut preimage = [0u8; 2 * LIMB_BYTES];
        preimage[..LIMB_BYTES].copy_from_slice(&nullifier_bytes);
        preimage[LIMB_BYTES..].copy_from_slice(&secret_bytes);

        let commitment = pedersen_hash(&preimage)?;
        let nullifier_hash = pedersen_hash(&nullifier_bytes)?;
        let reward_nullifier = poseidon_hash(&[nullifier])?;
        debug!(%instance, deposit_block, withdrawal_block, "note derived");

        Ok(Self {
            instance,
            deposit_block,
            withdrawal_block,
            secret,
            nullifier,
            commitment,
            nullifier_hash,
            reward_nullifier,
        })
    }

    /// blocks spent shielded; negative when the blocks are inverted
    pub fn mining_interval(&self) -> i128 {
        self.withdrawal_block as i128 - self.deposit_block as i128
    }

    /// 62-byte pedersen preimage
    pub fn preimage(&self) -> Result<[u8; 2 * LIMB_BYTES]> {
        let mut out = [0u8; 2 * LIMB_BYTES];
        out[..LIMB_BYTES].copy_from_slice(&to_le31(self.nullifier)?);
        out[LIMB_BYTES..].copy_from_slice(&to_le31(self.secret)?);
        Ok(out)
    }

    /// rebuild a note from its string plus the block data the string lacks
    pub fn from_note_string(
        s: &str,
        instance: Address,
        deposit_block: u64,
        withdrawal_block: u64,
    ) -> Result<Self> {
        NoteString::parse(s)?.into_note(instance, deposit_block, withdrawal_block)
    }

    /// `tornado-<currency>-<amount>-<netId>-0x<preimage hex>`
    pub fn to_note_string(&self, currency: &str, amount: &str, net_id: u64) -> Result<String> {
        Ok(format!(
            "tornado-{}-{}-{}-0x{}",
            currency,
            amount,
            net_id,
            hex::encode(self.preimage()?)
        ))
    }
}

/// secrets and metadata carried by a note string
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NoteString {
    pub currency: String,
    pub amount: String,
    pub net_id: u64,
    pub nullifier: U256,
    pub secret: U256,
}

impl NoteString {
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split('-').collect();
        if parts.len() != 5 || parts[0] != "tornado" {
            return Err(CoreError::InvalidNote(
                "expected tornado-<currency>-<amount>-<netId>-0x<hex>".into(),
            ));
        }
        let net_id = parts[3]
            .parse::<u64>()
            .map_err(|e| CoreError::InvalidNote(format!("bad net id: {}", e)))?;
        let hex_part = parts[4].strip_prefix("0x").unwrap_or(parts[4]);
        let bytes =
            hex::decode(hex_part).map_err(|e| CoreError::InvalidNote(format!("bad hex: {}", e)))?;
        if bytes.len() != 2 * LIMB_BYTES {
            return Err(CoreError::InvalidNote(format!(
                "preimage must be {} bytes, got {}",
                2 * LIMB_BYTES,
                bytes.len()
            )));
        }

        Ok(Self {
            currency: parts[1].to_string(),
            amount: parts[2].to_string(),
            net_id,
            nullifier: U256::from_le_slice(&bytes[..LIMB_BYTES]),
            secret: U256::from_le_slice(&bytes[LIMB_BYTES..]),
        })
    }

    pub fn into_note(
        self,
        instance: Address,
        deposit_block: u64,
        withdrawal_block: u64,
    ) -> Result<Note> {
        Note::new(
            instance,
            deposit_block,
            withdrawal_block,
            Some(self.secret),
            Some(self.nullifier),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::uint;

    #[test]
    fn test_note_derivation_is_deterministic() {
        let instance = Address::repeat_byte(0x42);
        let a = Note::new(instance, 10, 1450, Some(U256::from(5u8)), Some(U256::from(9u8))).unwrap();
        let b = Note::new(instance, 10, 1450, Some(U256::from(5u8)), Some(U256::from(9u8))).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.commitment, a.nullifier_hash);
        assert_eq!(a.reward_nullifier, poseidon_hash(&[U256::from(9u8)]).unwrap());
        assert_eq!(a.mining_interval(), 1440);
    }

    #[test]
    fn test_known_note_hashes() {
        let note = Note::new(Address::ZERO, 0, 1, Some(U256::from(2u8)), Some(U256::from(1u8))).unwrap();
        assert_eq!(
            note.commitment,
            uint!(17030183211568687754614983999790901520482688173745243672426762844954531501516_U256)
        );
        assert_eq!(
            note.nullifier_hash,
            uint!(15188759486016725868344403663296721188374024430739473840722227864599086804552_U256)
        );
    }

    #[test]
    fn test_random_notes_differ() {
        let a = Note::new(Address::ZERO, 0, 1, None, None).unwrap();
        let b = Note::new(Address::ZERO, 0, 1, None, None).unwrap();
        assert_ne!(a.commitment, b.commitment);
    }

    #[test]
    fn test_inverted_interval_allowed_at_construction() {
        let note = Note::new(Address::ZERO, 100, 50, None, None).unwrap();
        assert_eq!(note.mining_interval(), -50);
    }

    #[test]
    fn test_oversized_secret_rejected() {
        let err = Note::new(Address::ZERO, 0, 1, Some(U256::from(1u8) << 248), None).unwrap_err();
        assert!(matches!(err, CoreError::SecretOutOfRange));
    }

    #[test]
    fn test_note_string_roundtrip() {
        let note = Note::new(Address::repeat_byte(1), 3, 9, None, None).unwrap();
        let s = note.to_note_string("eth", "0.1", 1).unwrap();
        assert!(s.starts_with("tornado-eth-0.1-1-0x"));

        let parsed = NoteString::parse(&s).unwrap();
        assert_eq!(parsed.currency, "eth");
        assert_eq!(parsed.net_id, 1);
        let restored = parsed.into_note(Address::repeat_byte(1), 3, 9).unwrap();
        assert_eq!(restored.commitment, note.commitment);
        assert_eq!(restored.nullifier_hash, note.nullifier_hash);
    }

    #[test]
    fn test_note_string_rejects_garbage() {
        assert!(NoteString::parse("tornado-eth-0.1-1").is_err());
        assert!(NoteString::parse("tornado-eth-0.1-x-0x00").is_err());
        assert!(NoteString::parse("tornado-eth-0.1-1-0x00").is_err());
        assert!(NoteString::parse("mixer-eth-0.1-1-0x00").is_err());
    }
}
