//! Fixed-length secure binary values

use crate::error::{CsrfError, Result};
use rand::RngCore;
use rand::rngs::OsRng;
use std::fmt;
use std::hash::{Hash, Hasher};
use subtle::ConstantTimeEq;

/// An immutable byte string of a fixed bit length with constant-time equality.
///
/// Used for the random value shared by a cookie/request token pair and for
/// the identity binding carried by request tokens.
#[derive(Clone)]
pub struct SecureBlob {
    bytes: Box<[u8]>,
}

impl SecureBlob {
    /// Fill a new blob of `bit_length` bits from the OS random source.
    pub fn generate(bit_length: usize) -> Result<Self> {
        let len = Self::byte_length(bit_length)?;
        let mut bytes = vec![0u8; len];
        OsRng.fill_bytes(&mut bytes);
        Ok(Self {
            bytes: bytes.into_boxed_slice(),
        })
    }

    /// Wrap caller-supplied bytes, which must be exactly `bit_length / 8` long.
    pub fn from_bytes(bit_length: usize, bytes: &[u8]) -> Result<Self> {
        let len = Self::byte_length(bit_length)?;
        if bytes.len() != len {
            return Err(CsrfError::invalid_argument(format!(
                "expected {} bytes for a {}-bit blob, got {}",
                len,
                bit_length,
                bytes.len()
            )));
        }
        Ok(Self {
            bytes: bytes.into(),
        })
    }

    fn byte_length(bit_length: usize) -> Result<usize> {
        if bit_length < 32 || bit_length % 8 != 0 {
            return Err(CsrfError::invalid_argument(format!(
                "bit length must be a multiple of 8 and at least 32, got {}",
                bit_length
            )));
        }
        Ok(bit_length / 8)
    }

    /// Length in bits
    pub fn bit_length(&self) -> usize {
        self.bytes.len() * 8
    }

    /// Raw bytes, for encoding only
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl PartialEq for SecureBlob {
    fn eq(&self, other: &Self) -> bool {
        // Lengths are public; contents are compared without early exit.
        self.bytes.ct_eq(&other.bytes).into()
    }
}

impl Eq for SecureBlob {}

impl Hash for SecureBlob {
    // Container lookups only. Not a cryptographic digest.
    fn hash<H: Hasher>(&self, state: &mut H) {
        let mut prefix = [0u8; 4];
        prefix.copy_from_slice(&self.bytes[..4]);
        state.write_u32(u32::from_le_bytes(prefix));
    }
}

impl fmt::Debug for SecureBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureBlob")
            .field("bits", &self.bit_length())
            .finish_non_exhaustive()
    }
}
