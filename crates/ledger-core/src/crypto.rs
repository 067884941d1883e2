//! ECDSA P-256 signing for spend authorisation.
//!
//! Signatures use the fixed-width encoding: `r || s`, each a 32-byte big-endian
//! scalar, with no ASN.1 framing. Verification therefore only accepts inputs of
//! exactly [`SIGNATURE_SIZE`] bytes.

use ring::rand::SystemRandom;
use ring::signature::{
    EcdsaKeyPair, KeyPair as _, UnparsedPublicKey, ECDSA_P256_SHA256_FIXED,
    ECDSA_P256_SHA256_FIXED_SIGNING,
};

use crate::constants::{PUBLIC_KEY_SIZE, SIGNATURE_SIZE};
use crate::error::CryptoError;

const SEC1_UNCOMPRESSED_TAG: u8 = 0x04;

pub struct KeyPair {
    pkcs8: Vec<u8>,
    inner: EcdsaKeyPair,
    rng: SystemRandom,
}

impl KeyPair {
    pub fn generate() -> Result<Self, CryptoError> {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng)
            .map_err(|_| CryptoError::KeyGeneration)?;
        Self::from_pkcs8(pkcs8.as_ref())
    }

    pub fn from_pkcs8(pkcs8: &[u8]) -> Result<Self, CryptoError> {
        let rng = SystemRandom::new();
        let inner = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8, &rng)
            .map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self {
            pkcs8: pkcs8.to_vec(),
            inner,
            rng,
        })
    }

    pub fn from_pkcs8_hex(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(encoded.trim()).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Self::from_pkcs8(&bytes)
    }

    pub fn pkcs8_hex(&self) -> String {
        hex::encode(&self.pkcs8)
    }

    pub fn public_key(&self) -> &[u8] {
        self.inner.public_key().as_ref()
    }

    /// The key's address form, as used in `TxOut::address`.
    pub fn public_key_hex(&self) -> String {
        encode_public_key(self.public_key())
    }

    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        sign(message, self)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

/// SHA-256 the message and sign it, returning the fixed-width `r || s` form.
pub fn sign(message: &[u8], key_pair: &KeyPair) -> Result<Vec<u8>, CryptoError> {
    let signature = key_pair
        .inner
        .sign(&key_pair.rng, message)
        .map_err(|_| CryptoError::Signing)?;
    Ok(signature.as_ref().to_vec())
}

/// Verify a fixed-width signature. Malformed keys or signatures of the wrong
/// width are rejected rather than reported as errors.
pub fn verify(message: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
    if signature.len() != SIGNATURE_SIZE || public_key.len() != PUBLIC_KEY_SIZE {
        return false;
    }
    UnparsedPublicKey::new(&ECDSA_P256_SHA256_FIXED, public_key)
        .verify(message, signature)
        .is_ok()
}

pub fn encode_public_key(public_key: &[u8]) -> String {
    hex::encode(public_key)
}

pub fn decode_public_key(encoded: &str) -> Result<Vec<u8>, CryptoError> {
    let bytes = hex::decode(encoded)
        .map_err(|e| CryptoError::InvalidPublicKey(format!("not hex: {e}")))?;
    if bytes.len() != PUBLIC_KEY_SIZE {
        return Err(CryptoError::InvalidPublicKey(format!(
            "expected {PUBLIC_KEY_SIZE} bytes, got {}",
            bytes.len()
        )));
    }
    if bytes[0] != SEC1_UNCOMPRESSED_TAG {
        return Err(CryptoError::InvalidPublicKey(
            "not an uncompressed SEC1 point".to_string(),
        ));
    }
    Ok(bytes)
}
