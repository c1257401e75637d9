//! Authenticated encryption of serialized tokens
//!
//! Every protector is scoped by a purpose string: a payload protected for one
//! purpose cannot be unprotected under another, even with the same secret.

use crate::error::{CsrfError, Result};
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 12;

/// Encrypts and authenticates opaque payloads.
pub trait DataProtector: Send + Sync {
    fn protect(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Any failure (truncation, tampering, wrong key or purpose) is
    /// reported as [`CsrfError::DeserializationFailed`].
    fn unprotect(&self, protected: &[u8]) -> Result<Vec<u8>>;
}

/// ChaCha20-Poly1305 protector.
///
/// Output layout: `nonce (12 bytes) || ciphertext || tag`. The encryption key
/// is HMAC-SHA256(secret, purpose) and the purpose is bound as AAD.
pub struct ChaChaDataProtector {
    cipher: ChaCha20Poly1305,
    purpose: Vec<u8>,
}

impl ChaChaDataProtector {
    pub fn new(secret: &[u8], purpose: &str) -> Result<Self> {
        if secret.len() < 32 {
            return Err(CsrfError::configuration(
                "Secret key must be at least 32 bytes",
            ));
        }

        let mut mac = <HmacSha256 as Mac>::new_from_slice(secret)
            .map_err(|e| CsrfError::configuration(e.to_string()))?;
        mac.update(purpose.as_bytes());
        let subkey = mac.finalize().into_bytes();

        Ok(Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&subkey)),
            purpose: purpose.as_bytes().to_vec(),
        })
    }
}

impl DataProtector for ChaChaDataProtector {
    fn protect(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);

        let payload = Payload {
            msg: plaintext,
            aad: &self.purpose,
        };
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), payload)
            .map_err(|e| CsrfError::Internal(format!("Encryption failure: {e}")))?;

        let mut result = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    fn unprotect(&self, protected: &[u8]) -> Result<Vec<u8>> {
        if protected.len() < NONCE_LEN {
            return Err(CsrfError::DeserializationFailed);
        }

        let (nonce_bytes, ciphertext) = protected.split_at(NONCE_LEN);
        let payload = Payload {
            msg: ciphertext,
            aad: &self.purpose,
        };

        self.cipher
            .decrypt(Nonce::from_slice(nonce_bytes), payload)
            .map_err(|_| CsrfError::DeserializationFailed)
    }
}
