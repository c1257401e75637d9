//! Per-request state seen by the antiforgery components

use crate::claims::ClaimsPrincipal;
use crate::token::CsrfToken;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{Method, Request, Uri};
use parking_lot::Mutex;
use std::sync::OnceLock;

/// One HTTP exchange: the request head and body, the caller's principal and
/// the response headers written so far.
///
/// A context belongs to exactly one request and is dropped with it.
#[derive(Debug)]
pub struct HttpContext {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    is_secure: bool,
    principal: ClaimsPrincipal,
    response: Mutex<ResponseHead>,
    feature: OnceLock<Mutex<CsrfFeature>>,
}

#[derive(Debug, Default)]
struct ResponseHead {
    headers: HeaderMap,
    has_started: bool,
}

impl HttpContext {
    pub fn new(method: Method, uri: Uri) -> Self {
        let is_secure = uri.scheme_str() == Some("https");
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            is_secure,
            principal: ClaimsPrincipal::anonymous(),
            response: Mutex::new(ResponseHead::default()),
            feature: OnceLock::new(),
        }
    }

    /// Build a context from a buffered request
    pub fn from_request(request: Request<Bytes>) -> Self {
        let (parts, body) = request.into_parts();
        let mut ctx = Self::new(parts.method, parts.uri);
        ctx.headers = parts.headers;
        ctx.body = body;
        ctx
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Override TLS detection (e.g. behind a terminating proxy).
    pub fn with_secure(mut self, is_secure: bool) -> Self {
        self.is_secure = is_secure;
        self
    }

    pub fn with_principal(mut self, principal: ClaimsPrincipal) -> Self {
        self.principal = principal;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a request header, if it is visible ASCII
    pub fn header(&self, name: impl http::header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn is_secure(&self) -> bool {
        self.is_secure
    }

    pub fn principal(&self) -> &ClaimsPrincipal {
        &self.principal
    }

    /// Mark the response head as sent. Later header writes are ignored.
    pub fn start_response(&self) {
        self.response.lock().has_started = true;
    }

    pub fn has_response_started(&self) -> bool {
        self.response.lock().has_started
    }

    pub fn response_header(&self, name: impl http::header::AsHeaderName) -> Option<String> {
        self.response
            .lock()
            .headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }

    /// Snapshot of the response headers
    pub fn response_headers(&self) -> HeaderMap {
        self.response.lock().headers.clone()
    }

    /// Returns false once the response has started.
    pub fn set_response_header(&self, name: HeaderName, value: HeaderValue) -> bool {
        let mut response = self.response.lock();
        if response.has_started {
            return false;
        }
        response.headers.insert(name, value);
        true
    }

    /// Returns false once the response has started.
    pub fn append_response_header(&self, name: HeaderName, value: HeaderValue) -> bool {
        let mut response = self.response.lock();
        if response.has_started {
            return false;
        }
        response.headers.append(name, value);
        true
    }

    /// The antiforgery memo for this request, created on first use
    pub(crate) fn csrf_feature(&self) -> &Mutex<CsrfFeature> {
        self.feature.get_or_init(|| Mutex::new(CsrfFeature::default()))
    }
}

/// Antiforgery work already done for the current request.
///
/// Guards idempotence: tokens are deserialized once, at most one new cookie
/// token is minted and it is written to the response at most once.
#[derive(Debug, Default)]
pub(crate) struct CsrfFeature {
    pub have_deserialized_cookie_token: bool,
    pub cookie_token: Option<CsrfToken>,

    pub have_deserialized_request_token: bool,
    pub request_token: Option<CsrfToken>,

    pub have_generated_new_cookie_token: bool,
    pub new_cookie_token: Option<CsrfToken>,
    pub new_cookie_token_string: Option<String>,

    pub new_request_token: Option<CsrfToken>,
    pub new_request_token_string: Option<String>,

    pub have_stored_new_cookie_token: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header;

    #[test]
    fn test_from_request() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("https://example.com/submit?x=1")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Bytes::from_static(b"a=b"))
            .unwrap();

        let ctx = HttpContext::from_request(request);
        assert_eq!(ctx.method(), &Method::POST);
        assert_eq!(ctx.path(), "/submit");
        assert!(ctx.is_secure());
        assert_eq!(
            ctx.header(header::CONTENT_TYPE),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(ctx.body().as_ref(), b"a=b");
        assert!(!ctx.principal().is_authenticated());
    }

    #[test]
    fn test_plain_http_is_not_secure() {
        let ctx = HttpContext::new(Method::GET, Uri::from_static("/"));
        assert!(!ctx.is_secure());
        assert!(ctx.with_secure(true).is_secure());
    }

    #[test]
    fn test_response_headers_frozen_after_start() {
        let ctx = HttpContext::new(Method::GET, Uri::from_static("/"));
        assert!(ctx.set_response_header(header::PRAGMA, HeaderValue::from_static("no-cache")));
        ctx.start_response();

        assert!(!ctx.set_response_header(header::PRAGMA, HeaderValue::from_static("other")));
        assert!(!ctx.append_response_header(header::SET_COOKIE, HeaderValue::from_static("a=b")));
        assert_eq!(ctx.response_header(header::PRAGMA).as_deref(), Some("no-cache"));
        assert!(ctx.response_header(header::SET_COOKIE).is_none());
    }

    #[test]
    fn test_feature_is_lazily_created_once() {
        let ctx = HttpContext::new(Method::GET, Uri::from_static("/"));
        ctx.csrf_feature().lock().have_stored_new_cookie_token = true;
        assert!(ctx.csrf_feature().lock().have_stored_new_cookie_token);
    }
}
