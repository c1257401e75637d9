use crate::blob::SecureBlob;
use crate::error::Result;

/// Size of the random value shared by a cookie token and its request tokens.
pub const SECURITY_BLOB_BITS: usize = 128;

/// Size of the claims-derived identity binding.
pub const CLAIM_BINDING_BITS: usize = 256;

/// A cookie token or a request token.
///
/// A cookie token only carries the security blob. A request token repeats its
/// cookie token's blob and adds the identity binding (either a claim binding
/// or a username) and any additional data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfToken {
    security_blob: SecureBlob,
    is_cookie_token: bool,
    claim_binding: Option<SecureBlob>,
    username: String,
    additional_data: String,
}

impl CsrfToken {
    /// Generate a new cookie token with a fresh random security blob
    pub fn generate_cookie() -> Result<Self> {
        Ok(Self::cookie(SecureBlob::generate(SECURITY_BLOB_BITS)?))
    }

    /// Cookie token around an existing blob
    pub fn cookie(security_blob: SecureBlob) -> Self {
        Self {
            security_blob,
            is_cookie_token: true,
            claim_binding: None,
            username: String::new(),
            additional_data: String::new(),
        }
    }

    /// Request token sharing its cookie token's blob
    pub fn request(security_blob: SecureBlob) -> Self {
        Self {
            is_cookie_token: false,
            ..Self::cookie(security_blob)
        }
    }

    /// Set the claims-derived identity binding
    pub fn with_claim_binding(mut self, claim_binding: Option<SecureBlob>) -> Self {
        self.claim_binding = claim_binding;
        self
    }

    /// Set the username binding, used when there is no claim binding
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Set the custom data checked by the additional-data hook
    pub fn with_additional_data(mut self, additional_data: impl Into<String>) -> Self {
        self.additional_data = additional_data.into();
        self
    }

    /// Random value shared by a cookie token and its request tokens
    pub fn security_blob(&self) -> &SecureBlob {
        &self.security_blob
    }

    /// Whether this is a cookie token rather than a request token
    pub fn is_cookie_token(&self) -> bool {
        self.is_cookie_token
    }

    /// Claims-derived identity binding, if any
    pub fn claim_binding(&self) -> Option<&SecureBlob> {
        self.claim_binding.as_ref()
    }

    /// Username binding, empty when unset
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Custom data, empty when unset
    pub fn additional_data(&self) -> &str {
        &self.additional_data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_token_generation() {
        let token = CsrfToken::generate_cookie().unwrap();
        assert!(token.is_cookie_token());
        assert_eq!(token.security_blob().bit_length(), SECURITY_BLOB_BITS);
        assert!(token.claim_binding().is_none());
        assert_eq!(token.username(), "");
        assert_eq!(token.additional_data(), "");
    }

    #[test]
    fn test_request_token_shares_blob() {
        let cookie = CsrfToken::generate_cookie().unwrap();
        let request = CsrfToken::request(cookie.security_blob().clone())
            .with_username("alice")
            .with_additional_data("extra");

        assert!(!request.is_cookie_token());
        assert_eq!(request.security_blob(), cookie.security_blob());
        assert_eq!(request.username(), "alice");
        assert_eq!(request.additional_data(), "extra");
    }

    #[test]
    fn test_tokens_with_different_blobs_differ() {
        let a = CsrfToken::generate_cookie().unwrap();
        let b = CsrfToken::generate_cookie().unwrap();
        assert_ne!(a, b);
    }
}
