//! Minting and validating cookie/request token pairs

use crate::blob::SecureBlob;
use crate::claims::{ClaimBindingExtractor, DefaultClaimBindingExtractor};
use crate::context::HttpContext;
use crate::error::{CsrfError, Result, ValidationFailure};
use crate::token::CsrfToken;
use std::sync::Arc;

/// Hook for binding extra application data into request tokens.
pub trait AdditionalDataProvider: Send + Sync {
    /// Data to embed in a new request token
    fn get_additional_data(&self, ctx: &HttpContext) -> String;

    /// Check the data carried by a submitted request token
    fn validate_additional_data(&self, ctx: &HttpContext, additional_data: &str) -> bool;
}

/// Embeds nothing and accepts anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAdditionalData;

impl AdditionalDataProvider for NoAdditionalData {
    fn get_additional_data(&self, _ctx: &HttpContext) -> String {
        String::new()
    }

    fn validate_additional_data(&self, _ctx: &HttpContext, _additional_data: &str) -> bool {
        true
    }
}

/// Generates tokens and checks submitted pairs against the current request.
pub trait TokenGenerator: Send + Sync {
    fn generate_cookie_token(&self) -> Result<CsrfToken>;

    fn is_cookie_token_valid(&self, cookie_token: Option<&CsrfToken>) -> bool;

    /// Mint a request token paired with `cookie_token` and bound to the
    /// caller's identity.
    fn generate_request_token(
        &self,
        ctx: &HttpContext,
        cookie_token: &CsrfToken,
    ) -> Result<CsrfToken>;

    fn try_validate_token_set(
        &self,
        ctx: &HttpContext,
        cookie_token: &CsrfToken,
        request_token: &CsrfToken,
    ) -> std::result::Result<(), ValidationFailure>;
}

pub struct DefaultTokenGenerator {
    claim_extractor: Arc<dyn ClaimBindingExtractor>,
    additional_data: Arc<dyn AdditionalDataProvider>,
}

impl DefaultTokenGenerator {
    pub fn new(
        claim_extractor: Arc<dyn ClaimBindingExtractor>,
        additional_data: Arc<dyn AdditionalDataProvider>,
    ) -> Self {
        Self {
            claim_extractor,
            additional_data,
        }
    }

    /// The caller's claim binding, or their name when no binding is derivable.
    /// Both are empty for anonymous callers.
    fn current_identity(&self, ctx: &HttpContext) -> (Option<SecureBlob>, String) {
        let principal = ctx.principal();
        let Some(identity) = principal.authenticated_identity() else {
            return (None, String::new());
        };

        match self.claim_extractor.extract_claim_binding(principal) {
            Some(binding) => (Some(binding), String::new()),
            None => (None, identity.name().unwrap_or_default().to_string()),
        }
    }
}

impl Default for DefaultTokenGenerator {
    fn default() -> Self {
        Self::new(
            Arc::new(DefaultClaimBindingExtractor::new()),
            Arc::new(NoAdditionalData),
        )
    }
}

impl TokenGenerator for DefaultTokenGenerator {
    fn generate_cookie_token(&self) -> Result<CsrfToken> {
        CsrfToken::generate_cookie()
    }

    fn is_cookie_token_valid(&self, cookie_token: Option<&CsrfToken>) -> bool {
        cookie_token.is_some_and(CsrfToken::is_cookie_token)
    }

    fn generate_request_token(
        &self,
        ctx: &HttpContext,
        cookie_token: &CsrfToken,
    ) -> Result<CsrfToken> {
        if !self.is_cookie_token_valid(Some(cookie_token)) {
            return Err(CsrfError::invalid_argument(
                "The antiforgery cookie token is invalid.",
            ));
        }

        let is_authenticated = ctx.principal().is_authenticated();
        let (claim_binding, username) = self.current_identity(ctx);
        let additional_data = self.additional_data.get_additional_data(ctx);

        if is_authenticated
            && claim_binding.is_none()
            && username.is_empty()
            && additional_data.is_empty()
        {
            return Err(CsrfError::configuration(
                "The provided identity is authenticated but has no name, no unique \
                 identifier claim and no additional data. Antiforgery tokens for it \
                 would not be bound to the user.",
            ));
        }

        Ok(CsrfToken::request(cookie_token.security_blob().clone())
            .with_claim_binding(claim_binding)
            .with_username(username)
            .with_additional_data(additional_data))
    }

    fn try_validate_token_set(
        &self,
        ctx: &HttpContext,
        cookie_token: &CsrfToken,
        request_token: &CsrfToken,
    ) -> std::result::Result<(), ValidationFailure> {
        if !cookie_token.is_cookie_token() || request_token.is_cookie_token() {
            return Err(ValidationFailure::TokensSwapped);
        }

        if cookie_token.security_blob() != request_token.security_blob() {
            return Err(ValidationFailure::SecurityBlobMismatch);
        }

        let (current_binding, current_username) = self.current_identity(ctx);

        // OpenID style identities use URIs as usernames; those compare exactly.
        let uri_shaped = starts_with_ignore_case(&current_username, "http://")
            || starts_with_ignore_case(&current_username, "https://");
        let username_matches = if uri_shaped {
            request_token.username() == current_username
        } else {
            eq_ignore_case(request_token.username(), &current_username)
        };
        if !username_matches {
            return Err(ValidationFailure::UsernameMismatch {
                expected: request_token.username().to_string(),
                actual: current_username,
            });
        }

        if request_token.claim_binding() != current_binding.as_ref() {
            return Err(ValidationFailure::ClaimBindingMismatch);
        }

        if !self
            .additional_data
            .validate_additional_data(ctx, request_token.additional_data())
        {
            return Err(ValidationFailure::AdditionalDataCheckFailed);
        }

        Ok(())
    }
}

/// Char-by-char comparison under simple (one-to-one) uppercase mapping.
///
/// Full Unicode lowercasing would fold distinct characters together, e.g.
/// the Kelvin sign and `k`.
fn eq_ignore_case(a: &str, b: &str) -> bool {
    let mut a = a.chars();
    let mut b = b.chars();
    loop {
        match (a.next(), b.next()) {
            (None, None) => return true,
            (Some(x), Some(y)) if chars_eq_ignore_case(x, y) => {}
            _ => return false,
        }
    }
}

fn chars_eq_ignore_case(a: char, b: char) -> bool {
    if a == b {
        return true;
    }
    matches!((simple_uppercase(a), simple_uppercase(b)), (Some(x), Some(y)) if x == y)
}

fn simple_uppercase(c: char) -> Option<char> {
    let mut upper = c.to_uppercase();
    let first = upper.next()?;
    upper.next().is_none().then_some(first)
}

fn starts_with_ignore_case(value: &str, prefix: &str) -> bool {
    value
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}
