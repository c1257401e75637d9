//! Reading tokens from requests and writing the cookie token to responses

use crate::config::CsrfConfig;
use crate::context::HttpContext;
use crate::error::{CsrfError, Result};
use async_trait::async_trait;
use cookie::Cookie;
use http::header::{self, HeaderValue};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
const MULTIPART_FORM_DATA: &str = "multipart/form-data";

/// Serialized tokens plus the names they travel under
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenSet {
    pub request_token: Option<String>,
    /// `None` when the client already holds a valid cookie token
    pub cookie_token: Option<String>,
    pub form_field_name: String,
    pub header_name: Option<String>,
}

/// Where tokens live on the wire.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// The serialized cookie token sent by the client, if any
    fn get_cookie_token(&self, ctx: &HttpContext) -> Option<String>;

    /// The serialized cookie and request tokens submitted with the request.
    ///
    /// An unreadable form body is [`CsrfError::DeserializationFailed`].
    async fn get_request_tokens(&self, ctx: &HttpContext) -> Result<TokenSet>;

    /// Write a new serialized cookie token to the response
    fn save_cookie_token(&self, ctx: &HttpContext, token: &str) -> Result<()>;
}

/// Cookie plus header/form-field store
pub struct CookieTokenStore {
    config: Arc<CsrfConfig>,
}

impl CookieTokenStore {
    pub fn new(config: Arc<CsrfConfig>) -> Self {
        Self { config }
    }

    fn header_token(&self, ctx: &HttpContext) -> Option<String> {
        let name = self.config.header_name.as_deref()?;
        ctx.headers()
            .get_all(name)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find(|value| !value.is_empty())
            .map(str::to_string)
    }

    fn form_token(&self, ctx: &HttpContext) -> Result<Option<String>> {
        if !is_media_type(ctx, FORM_URLENCODED) {
            // Multipart bodies are not parsed here.
            return Ok(None);
        }

        let body = std::str::from_utf8(ctx.body()).map_err(|e| {
            warn!(error = %e, "Form body is not UTF-8");
            CsrfError::DeserializationFailed
        })?;
        let fields: Vec<(String, String)> = serde_urlencoded::from_str(body).map_err(|e| {
            warn!(error = %e, "Unreadable form body");
            CsrfError::DeserializationFailed
        })?;

        Ok(fields
            .into_iter()
            .find(|(name, value)| *name == self.config.field_name && !value.is_empty())
            .map(|(_, value)| value))
    }

    fn build_cookie(&self, ctx: &HttpContext, token: &str) -> Cookie<'static> {
        let config = &self.config;
        let mut builder = Cookie::build((config.cookie_name.clone(), token.to_string()))
            .path(config.cookie_path.clone())
            .http_only(config.cookie_http_only)
            .same_site(config.cookie_same_site.into())
            .secure(config.cookie_secure_policy.is_secure(ctx.is_secure()));

        if let Some(domain) = &config.cookie_domain {
            builder = builder.domain(domain.clone());
        }
        if let Some(max_age) = config.cookie_max_age {
            let seconds = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
            builder = builder.max_age(cookie::time::Duration::seconds(seconds));
        }

        builder.build()
    }
}

#[async_trait]
impl TokenStore for CookieTokenStore {
    fn get_cookie_token(&self, ctx: &HttpContext) -> Option<String> {
        for value in ctx.headers().get_all(header::COOKIE) {
            let Ok(value) = value.to_str() else {
                continue;
            };

            for cookie in Cookie::split_parse_encoded(value) {
                let Ok(cookie) = cookie else {
                    continue;
                };

                if cookie.name() == self.config.cookie_name && !cookie.value().is_empty() {
                    return Some(cookie.value().to_string());
                }
            }
        }

        None
    }

    async fn get_request_tokens(&self, ctx: &HttpContext) -> Result<TokenSet> {
        let cookie_token = self.get_cookie_token(ctx);

        // The header is preferred so the body is only read when needed.
        let mut request_token = self.header_token(ctx);
        if request_token.is_none() && !self.config.suppress_form_field && has_form_content_type(ctx)
        {
            request_token = self.form_token(ctx)?;
        }

        Ok(TokenSet {
            request_token,
            cookie_token,
            form_field_name: self.config.field_name.clone(),
            header_name: self.config.header_name.clone(),
        })
    }

    fn save_cookie_token(&self, ctx: &HttpContext, token: &str) -> Result<()> {
        let cookie = self.build_cookie(ctx, token);
        let value = HeaderValue::from_str(&cookie.encoded().to_string())
            .map_err(|e| CsrfError::Internal(format!("Invalid cookie header: {}", e)))?;

        if !ctx.append_response_header(header::SET_COOKIE, value) {
            return Err(CsrfError::Internal(
                "The antiforgery cookie cannot be written after the response has started"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

/// Whether the request body is a form (url-encoded or multipart)
pub(crate) fn has_form_content_type(ctx: &HttpContext) -> bool {
    is_media_type(ctx, FORM_URLENCODED) || is_media_type(ctx, MULTIPART_FORM_DATA)
}

fn is_media_type(ctx: &HttpContext, expected: &str) -> bool {
    ctx.header(header::CONTENT_TYPE)
        .and_then(|value| value.split(';').next())
        .is_some_and(|media_type| media_type.trim().eq_ignore_ascii_case(expected))
}
