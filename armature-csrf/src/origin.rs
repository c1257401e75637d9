//! Header-based cross-origin check
//!
//! Uses `Origin`, `Sec-Fetch-Site` and `Host` to decide a request before any
//! token is read. Anything it cannot parse is denied.

use crate::context::HttpContext;
use http::header;
use std::collections::HashSet;
use tracing::trace;
use url::Url;

pub const SEC_FETCH_SITE: &str = "sec-fetch-site";

/// Outcome of the cross-origin check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossOriginResult {
    Allowed,
    Denied,
    /// Neither `Origin` nor `Sec-Fetch-Site` was sent. Fall back to tokens.
    Unknown,
}

#[derive(Debug, Clone, Default)]
pub struct CrossOriginValidator {
    trusted_origins: HashSet<String>,
}

impl CrossOriginValidator {
    pub fn new<I, S>(trusted_origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            trusted_origins: trusted_origins
                .into_iter()
                .map(|origin| origin.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn has_trusted_origins(&self) -> bool {
        !self.trusted_origins.is_empty()
    }

    pub fn validate(
        &self,
        origin: Option<&str>,
        sec_fetch_site: Option<&str>,
        host: Option<&str>,
    ) -> CrossOriginResult {
        let origin =
            origin.filter(|origin| !origin.is_empty() && !origin.eq_ignore_ascii_case("null"));

        if origin.is_some_and(|origin| self.trusted_origins.contains(&origin.to_ascii_lowercase())) {
            return CrossOriginResult::Allowed;
        }

        if let Some(site) = sec_fetch_site {
            return if site.eq_ignore_ascii_case("same-origin") || site.eq_ignore_ascii_case("none")
            {
                CrossOriginResult::Allowed
            } else {
                CrossOriginResult::Denied
            };
        }

        match origin {
            Some(origin) => match (origin_authority(origin), host) {
                (Some(authority), Some(host)) if authority.eq_ignore_ascii_case(host) => {
                    CrossOriginResult::Allowed
                }
                _ => CrossOriginResult::Denied,
            },
            None => CrossOriginResult::Unknown,
        }
    }

    /// Check a request. `Host` falls back to the URI authority (HTTP/2).
    pub fn validate_request(&self, ctx: &HttpContext) -> CrossOriginResult {
        let host = ctx
            .header(header::HOST)
            .or_else(|| ctx.uri().authority().map(|authority| authority.as_str()));

        let result = self.validate(ctx.header(header::ORIGIN), ctx.header(SEC_FETCH_SITE), host);
        trace!(path = %ctx.path(), result = ?result, "Cross-origin check");
        result
    }
}

/// `host[:port]` of an absolute origin, the port only when non-default
fn origin_authority(origin: &str) -> Option<String> {
    let url = Url::parse(origin).ok()?;
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}
