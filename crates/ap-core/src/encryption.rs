//! x25519-xsalsa20-poly1305 boxes for account payloads
//!
//! wire layout: nonce(24) || ephemeral_public_key(32) || ciphertext.
//! compatible with the eth-sig-util encryption keys wallets already expose.

use alloy_primitives::Bytes;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use crypto_box::{
    aead::{generic_array::GenericArray, Aead},
    PublicKey, SalsaBox, SecretKey,
};
use rand::{rngs::OsRng, RngCore};

use crate::error::{CoreError, Result};

pub const NONCE_LEN: usize = 24;
pub const PUBLIC_KEY_LEN: usize = 32;
/// poly1305 tag
pub const TAG_LEN: usize = 16;

/// recipient's encryption key
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EncryptionPublicKey(pub [u8; PUBLIC_KEY_LEN]);

impl EncryptionPublicKey {
    pub fn from_base64(s: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(s.trim())
            .map_err(|e| CoreError::InvalidKey(e.to_string()))?;
        let arr: [u8; PUBLIC_KEY_LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CoreError::InvalidKey(format!("expected 32 bytes, got {}", bytes.len())))?;
        Ok(Self(arr))
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// box `plaintext` under a fresh ephemeral key
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedMessage> {
        let ephemeral = SecretKey::generate(&mut OsRng);
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let salsa = SalsaBox::new(&PublicKey::from(self.0), &ephemeral);
        let ciphertext = salsa
            .encrypt(GenericArray::from_slice(&nonce), plaintext)
            .map_err(|_| CoreError::MalformedCiphertext("encryption failed".into()))?;

        Ok(EncryptedMessage {
            nonce,
            ephemeral_public_key: *ephemeral.public_key().as_bytes(),
            ciphertext,
        })
    }
}

/// holder of the decryption key
#[derive(Clone)]
pub struct EncryptionKeypair {
    secret: [u8; 32],
}

impl EncryptionKeypair {
    pub fn generate() -> Self {
        let mut secret = [0u8; 32];
        OsRng.fill_bytes(&mut secret);
        Self { secret }
    }

    pub fn from_bytes(secret: [u8; 32]) -> Self {
        Self { secret }
    }

    /// hex private key, optional 0x prefix
    pub fn from_hex(s: &str) -> Result<Self> {
        let s = s.trim();
        let raw = hex::decode(s.strip_prefix("0x").unwrap_or(s))
            .map_err(|e| CoreError::InvalidKey(e.to_string()))?;
        let secret: [u8; 32] = raw
            .as_slice()
            .try_into()
            .map_err(|_| CoreError::InvalidKey(format!("expected 32 bytes, got {}", raw.len())))?;
        Ok(Self { secret })
    }

    pub fn secret_hex(&self) -> String {
        format!("0x{}", hex::encode(self.secret))
    }

    pub fn public_key(&self) -> EncryptionPublicKey {
        let sk = SecretKey::from(self.secret);
        EncryptionPublicKey(*sk.public_key().as_bytes())
    }

    pub fn decrypt(&self, packed: &[u8]) -> Result<Vec<u8>> {
        let message = EncryptedMessage::unpack(packed)?;
        let salsa = SalsaBox::new(
            &PublicKey::from(message.ephemeral_public_key),
            &SecretKey::from(self.secret),
        );
        salsa
            .decrypt(GenericArray::from_slice(&message.nonce), message.ciphertext.as_slice())
            .map_err(|_| CoreError::DecryptionFailed)
    }
}

impl std::fmt::Debug for EncryptionKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKeypair")
            .field("public_key", &self.public_key().to_base64())
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedMessage {
    pub nonce: [u8; NONCE_LEN],
    pub ephemeral_public_key: [u8; PUBLIC_KEY_LEN],
    pub ciphertext: Vec<u8>,
}

impl EncryptedMessage {
    pub fn pack(&self) -> Bytes {
        let mut out = Vec::with_capacity(NONCE_LEN + PUBLIC_KEY_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ephemeral_public_key);
        out.extend_from_slice(&self.ciphertext);
        Bytes::from(out)
    }

    pub fn unpack(packed: &[u8]) -> Result<Self> {
        if packed.len() < NONCE_LEN + PUBLIC_KEY_LEN + TAG_LEN {
            return Err(CoreError::MalformedCiphertext(format!(
                "payload too short: {} bytes",
                packed.len()
            )));
        }
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&packed[..NONCE_LEN]);
        let mut ephemeral_public_key = [0u8; PUBLIC_KEY_LEN];
        ephemeral_public_key.copy_from_slice(&packed[NONCE_LEN..NONCE_LEN + PUBLIC_KEY_LEN]);
        Ok(Self {
            nonce,
            ephemeral_public_key,
            ciphertext: packed[NONCE_LEN + PUBLIC_KEY_LEN..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_roundtrip() {
        let keys = EncryptionKeypair::generate();
        let msg = keys.public_key().encrypt(b"anonymity points").unwrap();
        let packed = msg.pack();
        assert_eq!(packed.len(), NONCE_LEN + PUBLIC_KEY_LEN + 16 + TAG_LEN);
        assert_eq!(keys.decrypt(&packed).unwrap(), b"anonymity points");
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let keys = EncryptionKeypair::generate();
        let other = EncryptionKeypair::generate();
        let packed = keys.public_key().encrypt(b"secret").unwrap().pack();
        assert!(matches!(other.decrypt(&packed), Err(CoreError::DecryptionFailed)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let keys = EncryptionKeypair::generate();
        let mut packed = keys.public_key().encrypt(b"secret").unwrap().pack().to_vec();
        let last = packed.len() - 1;
        packed[last] ^= 0xff;
        assert!(matches!(keys.decrypt(&packed), Err(CoreError::DecryptionFailed)));
    }

    #[test]
    fn test_short_payload_is_malformed() {
        let keys = EncryptionKeypair::generate();
        assert!(matches!(
            keys.decrypt(&[0u8; 40]),
            Err(CoreError::MalformedCiphertext(_))
        ));
    }

    #[test]
    fn test_key_encodings() {
        let keys = EncryptionKeypair::generate();
        let restored = EncryptionKeypair::from_hex(&keys.secret_hex()).unwrap();
        assert_eq!(restored.public_key(), keys.public_key());

        let pk = keys.public_key();
        assert_eq!(EncryptionPublicKey::from_base64(&pk.to_base64()).unwrap(), pk);
        assert!(EncryptionPublicKey::from_base64("AAAA").is_err());
        assert!(EncryptionKeypair::from_hex("0x1234").is_err());
    }
}
