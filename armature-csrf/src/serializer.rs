//! Binary wire format for antiforgery tokens
//!
//! ```text
//! u8      version (1)
//! [16]    security blob
//! u8      is cookie token (0/1)
//! -- request tokens only:
//! u8      is claims based (0/1)
//! [32]    claim binding          (claims based)
//! str     username               (otherwise)
//! str     additional data
//! ```
//!
//! Strings are UTF-8 prefixed with their byte length as a 7-bit varint. The
//! encoded bytes are encrypted with a [`DataProtector`] and carried as
//! unpadded base64url.

use crate::blob::SecureBlob;
use crate::error::{CsrfError, Result};
use crate::pool::BufferPool;
use crate::protector::DataProtector;
use crate::token::{CLAIM_BINDING_BITS, CsrfToken, SECURITY_BLOB_BITS};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use std::sync::Arc;

/// Purpose string scoping the token protector
pub const TOKEN_PURPOSE: &str = "armature.csrf.token.v1";

const TOKEN_VERSION: u8 = 0x01;

/// Turns tokens into transport strings and back.
pub trait TokenSerializer: Send + Sync {
    fn serialize(&self, token: &CsrfToken) -> Result<String>;

    /// Every failure is [`CsrfError::DeserializationFailed`].
    fn deserialize(&self, serialized: &str) -> Result<CsrfToken>;
}

pub struct BinaryTokenSerializer {
    protector: Arc<dyn DataProtector>,
    pool: BufferPool,
}

impl BinaryTokenSerializer {
    /// `protector` should be scoped to [`TOKEN_PURPOSE`].
    pub fn new(protector: Arc<dyn DataProtector>) -> Self {
        Self {
            protector,
            pool: BufferPool::default(),
        }
    }

    fn encode(token: &CsrfToken, buf: &mut Vec<u8>) {
        buf.push(TOKEN_VERSION);
        buf.extend_from_slice(token.security_blob().as_bytes());
        buf.push(token.is_cookie_token() as u8);

        if !token.is_cookie_token() {
            match token.claim_binding() {
                Some(binding) => {
                    buf.push(1);
                    buf.extend_from_slice(binding.as_bytes());
                }
                None => {
                    buf.push(0);
                    write_string(buf, token.username());
                }
            }
            write_string(buf, token.additional_data());
        }
    }

    fn decode(bytes: &[u8]) -> Option<CsrfToken> {
        let mut reader = Reader::new(bytes);

        if reader.byte()? != TOKEN_VERSION {
            return None;
        }

        let security_blob =
            SecureBlob::from_bytes(SECURITY_BLOB_BITS, reader.take(SECURITY_BLOB_BITS / 8)?).ok()?;

        let token = match reader.flag()? {
            true => CsrfToken::cookie(security_blob),
            false => {
                let token = CsrfToken::request(security_blob);
                let token = if reader.flag()? {
                    let binding = reader.take(CLAIM_BINDING_BITS / 8)?;
                    token.with_claim_binding(Some(
                        SecureBlob::from_bytes(CLAIM_BINDING_BITS, binding).ok()?,
                    ))
                } else {
                    token.with_username(reader.string()?)
                };
                token.with_additional_data(reader.string()?)
            }
        };

        reader.is_empty().then_some(token)
    }
}

impl TokenSerializer for BinaryTokenSerializer {
    fn serialize(&self, token: &CsrfToken) -> Result<String> {
        let mut buf = self.pool.acquire();
        Self::encode(token, &mut buf);
        let protected = self.protector.protect(&buf)?;
        Ok(URL_SAFE_NO_PAD.encode(protected))
    }

    fn deserialize(&self, serialized: &str) -> Result<CsrfToken> {
        let protected = URL_SAFE_NO_PAD
            .decode(serialized)
            .map_err(|_| CsrfError::DeserializationFailed)?;
        let plaintext = self
            .protector
            .unprotect(&protected)
            .map_err(|_| CsrfError::DeserializationFailed)?;

        Self::decode(&plaintext).ok_or(CsrfError::DeserializationFailed)
    }
}

/// Append a 7-bit varint length prefix followed by the UTF-8 bytes.
pub(crate) fn write_string(buf: &mut Vec<u8>, value: &str) {
    let mut len = value.len();
    while len >= 0x80 {
        buf.push((len as u8) | 0x80);
        len >>= 7;
    }
    buf.push(len as u8);
    buf.extend_from_slice(value.as_bytes());
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    fn byte(&mut self) -> Option<u8> {
        let (&first, rest) = self.bytes.split_first()?;
        self.bytes = rest;
        Some(first)
    }

    fn flag(&mut self) -> Option<bool> {
        match self.byte()? {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        }
    }

    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        if self.bytes.len() < len {
            return None;
        }
        let (head, rest) = self.bytes.split_at(len);
        self.bytes = rest;
        Some(head)
    }

    fn length(&mut self) -> Option<usize> {
        let mut len = 0usize;
        // At most five groups, as for a 32-bit length.
        for shift in (0..35).step_by(7) {
            let byte = self.byte()?;
            len |= ((byte & 0x7F) as usize) << shift;
            if byte & 0x80 == 0 {
                return Some(len);
            }
        }
        None
    }

    fn string(&mut self) -> Option<String> {
        let len = self.length()?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).ok()
    }

    fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protector::ChaChaDataProtector;

    const SECRET: &[u8; 32] = b"test_secret_key_32_bytes_long!!!";

    fn serializer() -> BinaryTokenSerializer {
        let protector = ChaChaDataProtector::new(SECRET, TOKEN_PURPOSE).unwrap();
        BinaryTokenSerializer::new(Arc::new(protector))
    }

    fn request_token() -> CsrfToken {
        CsrfToken::request(SecureBlob::generate(SECURITY_BLOB_BITS).unwrap())
    }

    #[test]
    fn test_cookie_token_round_trip() {
        let serializer = serializer();
        let token = CsrfToken::generate_cookie().unwrap();

        let encoded = serializer.serialize(&token).unwrap();
        assert_eq!(serializer.deserialize(&encoded).unwrap(), token);
    }

    #[test]
    fn test_request_token_round_trips() {
        let serializer = serializer();
        let binding = SecureBlob::generate(CLAIM_BINDING_BITS).unwrap();
        let tokens = [
            request_token().with_username("alice").with_additional_data("extra"),
            request_token().with_claim_binding(Some(binding)),
            request_token().with_username("ünïcødé ✓".repeat(40)),
            request_token(),
        ];

        for token in tokens {
            let encoded = serializer.serialize(&token).unwrap();
            assert_eq!(serializer.deserialize(&encoded).unwrap(), token);
        }
    }

    #[test]
    fn test_encoding_layout() {
        let blob = SecureBlob::from_bytes(SECURITY_BLOB_BITS, &[0xAB; 16]).unwrap();
        let token = CsrfToken::request(blob)
            .with_username("bob")
            .with_additional_data("");

        let mut buf = Vec::new();
        BinaryTokenSerializer::encode(&token, &mut buf);

        assert_eq!(buf[0], TOKEN_VERSION);
        assert_eq!(&buf[1..17], &[0xAB; 16]);
        assert_eq!(&buf[17..], &[0, 0, 3, b'b', b'o', b'b', 0]);
    }

    #[test]
    fn test_varint_length_prefix() {
        let mut buf = Vec::new();
        write_string(&mut buf, &"a".repeat(300));
        assert_eq!(&buf[..2], &[0xAC, 0x02]);
        assert_eq!(buf.len(), 302);

        let mut reader = Reader::new(&buf);
        assert_eq!(reader.string().unwrap().len(), 300);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_decode_rejects_bad_shapes() {
        let mut cookie = Vec::new();
        BinaryTokenSerializer::encode(&CsrfToken::generate_cookie().unwrap(), &mut cookie);
        assert!(BinaryTokenSerializer::decode(&cookie).is_some());

        let mut wrong_version = cookie.clone();
        wrong_version[0] = 2;
        assert!(BinaryTokenSerializer::decode(&wrong_version).is_none());

        let mut trailing = cookie.clone();
        trailing.push(0);
        assert!(BinaryTokenSerializer::decode(&trailing).is_none());

        assert!(BinaryTokenSerializer::decode(&cookie[..10]).is_none());
        assert!(BinaryTokenSerializer::decode(&[]).is_none());

        let mut bad_flag = cookie;
        bad_flag[17] = 7;
        assert!(BinaryTokenSerializer::decode(&bad_flag).is_none());
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let mut buf = vec![TOKEN_VERSION];
        buf.extend_from_slice(&[0u8; 16]);
        buf.extend_from_slice(&[0, 0, 2, 0xC3, 0x28, 0]);
        assert!(BinaryTokenSerializer::decode(&buf).is_none());
    }

    #[test]
    fn test_every_flipped_byte_is_rejected() {
        let serializer = serializer();
        let token = request_token().with_username("alice");
        let encoded = serializer.serialize(&token).unwrap();
        let raw = URL_SAFE_NO_PAD.decode(&encoded).unwrap();

        for i in 0..raw.len() {
            let mut tampered = raw.clone();
            tampered[i] ^= 0x01;
            let tampered = URL_SAFE_NO_PAD.encode(&tampered);
            assert_eq!(
                serializer.deserialize(&tampered),
                Err(CsrfError::DeserializationFailed),
                "byte {} accepted after tampering",
                i
            );
        }
    }

    #[test]
    fn test_garbage_is_opaque_failure() {
        let serializer = serializer();
        for input in ["", "not base64!", "AAAA", "====", &"A".repeat(200)] {
            assert_eq!(
                serializer.deserialize(input),
                Err(CsrfError::DeserializationFailed)
            );
        }
    }

    #[test]
    fn test_other_purpose_rejected() {
        let other = ChaChaDataProtector::new(SECRET, "some.other.purpose").unwrap();
        let other = BinaryTokenSerializer::new(Arc::new(other));
        let encoded = other.serialize(&CsrfToken::generate_cookie().unwrap()).unwrap();

        assert_eq!(
            serializer().deserialize(&encoded),
            Err(CsrfError::DeserializationFailed)
        );
    }
}
