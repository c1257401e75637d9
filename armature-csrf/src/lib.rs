//! # Armature CSRF Protection
//!
//! Antiforgery tokens for Armature applications.
//!
//! ## Features
//!
//! - ✅ **Token Pairs** - A cookie token plus a per-form request token sharing a random blob
//! - ✅ **Encrypted Tokens** - ChaCha20-Poly1305 with purpose-scoped keys
//! - ✅ **Identity Binding** - Request tokens are bound to the signed-in user's claims or name
//! - ✅ **Fetch Metadata** - `Origin` / `Sec-Fetch-Site` cross-origin fast path
//! - ✅ **Idempotent Issuance** - At most one cookie write per request
//! - ✅ **Path Exclusion** - Exclude specific paths from protection
//!
//! ## Quick Start
//!
//! ```rust
//! use armature_csrf::{CsrfConfig, CsrfMiddleware, HttpContext};
//! use http::{Method, Uri};
//!
//! // Create configuration with generated secret
//! let config = CsrfConfig::default();
//!
//! // Or with custom secret
//! let secret = CsrfConfig::generate_secret();
//! let config = CsrfConfig::new(secret).unwrap()
//!     .with_cookie_name("__Host-csrf")
//!     .with_trusted_origins(vec!["https://app.example".to_string()]);
//!
//! // Create middleware
//! let csrf = CsrfMiddleware::new(config).unwrap();
//!
//! // Issue tokens while rendering a form
//! let ctx = HttpContext::new(Method::GET, Uri::from_static("https://app.example/form"));
//! let tokens = csrf.get_and_store_tokens(&ctx).unwrap();
//!
//! assert!(tokens.request_token.is_some());
//! assert!(ctx.response_header(http::header::SET_COOKIE).is_some());
//! ```
//!
//! ## Token Validation
//!
//! ```rust
//! use armature_csrf::{CsrfConfig, CsrfMiddleware, HttpContext};
//! use http::{HeaderName, HeaderValue, Method, Uri, header};
//!
//! # tokio_test::block_on(async {
//! let csrf = CsrfMiddleware::new(CsrfConfig::default()).unwrap();
//! let tokens = csrf
//!     .get_tokens(&HttpContext::new(Method::GET, Uri::from_static("/form")))
//!     .unwrap();
//!
//! // The browser sends the cookie back, the page sends the request token.
//! let cookie = format!("csrf_token={}", tokens.cookie_token.unwrap());
//! let ctx = HttpContext::new(Method::POST, Uri::from_static("/submit"))
//!     .with_header(header::COOKIE, HeaderValue::from_str(&cookie).unwrap())
//!     .with_header(
//!         HeaderName::from_static("x-csrf-token"),
//!         HeaderValue::from_str(&tokens.request_token.unwrap()).unwrap(),
//!     );
//!
//! assert!(csrf.validate_request(&ctx).await.is_ok());
//!
//! // Without the request token the request is rejected
//! let forged = HttpContext::new(Method::POST, Uri::from_static("/submit"))
//!     .with_header(header::COOKIE, HeaderValue::from_str(&cookie).unwrap());
//! assert!(!csrf.is_request_valid(&forged).await.unwrap());
//! # });
//! ```
//!
//! ## Usage with Armature
//!
//! ```ignore
//! use armature::prelude::*;
//! use armature_csrf::{CsrfConfig, CsrfMiddleware, HttpContext};
//!
//! #[controller("/api")]
//! struct ApiController {
//!     csrf: CsrfMiddleware,
//! }
//!
//! impl ApiController {
//!     #[post("/submit")]
//!     async fn submit(&self, ctx: HttpContext) -> Result<HttpResponse, Error> {
//!         self.csrf
//!             .protect(&ctx)
//!             .await
//!             .map_err(|e| Error::Forbidden(e.to_string()))?;
//!
//!         Ok(HttpResponse::ok())
//!     }
//! }
//! ```

pub mod blob;
pub mod claims;
pub mod config;
pub mod context;
pub mod error;
pub mod generator;
pub mod middleware;
pub mod origin;
pub mod pool;
pub mod protector;
pub mod serializer;
pub mod store;
pub mod token;

pub use blob::SecureBlob;
pub use claims::{
    Claim, ClaimBindingExtractor, ClaimsIdentity, ClaimsPrincipal, DefaultClaimBindingExtractor,
};
pub use config::{CookieSecurePolicy, CsrfConfig, SameSite};
pub use context::HttpContext;
pub use error::{CsrfError, Result, TokenLocation, ValidationFailure};
pub use generator::{AdditionalDataProvider, DefaultTokenGenerator, NoAdditionalData, TokenGenerator};
pub use middleware::CsrfMiddleware;
pub use origin::{CrossOriginResult, CrossOriginValidator};
pub use protector::{ChaChaDataProtector, DataProtector};
pub use serializer::{BinaryTokenSerializer, TOKEN_PURPOSE, TokenSerializer};
pub use store::{CookieTokenStore, TokenSet, TokenStore};
pub use token::CsrfToken;
