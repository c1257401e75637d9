use crate::config::{CookieSecurePolicy, CsrfConfig};
use crate::context::{CsrfFeature, HttpContext};
use crate::error::{CsrfError, Result, TokenLocation, ValidationFailure};
use crate::generator::{DefaultTokenGenerator, TokenGenerator};
use crate::origin::{CrossOriginResult, CrossOriginValidator, SEC_FETCH_SITE};
use crate::protector::ChaChaDataProtector;
use crate::serializer::{BinaryTokenSerializer, TOKEN_PURPOSE, TokenSerializer};
use crate::store::{CookieTokenStore, TokenSet, TokenStore, has_form_content_type};
use crate::token::CsrfToken;
use http::header::{self, HeaderValue};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// CSRF protection middleware.
///
/// Issues cookie/request token pairs and validates them on unsafe requests.
/// All work done for one request is memoized on its [`HttpContext`], so
/// repeated calls never mint or write a second cookie token.
#[derive(Clone)]
pub struct CsrfMiddleware {
    config: Arc<CsrfConfig>,
    generator: Arc<dyn TokenGenerator>,
    serializer: Arc<dyn TokenSerializer>,
    store: Arc<dyn TokenStore>,
    origin_validator: Arc<CrossOriginValidator>,
}

impl CsrfMiddleware {
    /// Create new CSRF middleware with the default components
    pub fn new(config: CsrfConfig) -> Result<Self> {
        let config = Arc::new(config);
        let protector = ChaChaDataProtector::new(&config.secret, TOKEN_PURPOSE)?;

        Ok(Self {
            generator: Arc::new(DefaultTokenGenerator::default()),
            serializer: Arc::new(BinaryTokenSerializer::new(Arc::new(protector))),
            store: Arc::new(CookieTokenStore::new(Arc::clone(&config))),
            origin_validator: Arc::new(CrossOriginValidator::new(&config.trusted_origins)),
            config,
        })
    }

    pub fn with_token_generator(mut self, generator: Arc<dyn TokenGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_token_serializer(mut self, serializer: Arc<dyn TokenSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn with_token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.store = store;
        self
    }

    pub fn config(&self) -> &CsrfConfig {
        &self.config
    }

    /// Check if request needs CSRF protection
    pub fn needs_protection(&self, ctx: &HttpContext) -> bool {
        !self.config.is_safe_method(ctx.method().as_str())
            && !self.config.is_excluded_path(ctx.path())
    }

    /// Tokens for a response, without writing anything to it.
    ///
    /// `cookie_token` is set only when a new cookie token was minted; the
    /// caller is then responsible for delivering it.
    pub fn get_tokens(&self, ctx: &HttpContext) -> Result<TokenSet> {
        self.check_ssl(ctx)?;

        let mut feature = ctx.csrf_feature().lock();
        self.ensure_request_token(ctx, &mut feature)?;
        self.serialize_tokens(&mut feature)
    }

    /// Tokens for a response. A new cookie token is written to the response
    /// at most once per request, and the response is marked non-cacheable.
    pub fn get_and_store_tokens(&self, ctx: &HttpContext) -> Result<TokenSet> {
        self.check_ssl(ctx)?;

        let tokens = {
            let mut feature = ctx.csrf_feature().lock();
            self.ensure_request_token(ctx, &mut feature)?;
            let tokens = self.serialize_tokens(&mut feature)?;
            self.store_new_cookie_token(ctx, &mut feature)?;
            tokens
        };

        self.set_do_not_cache_headers(ctx);
        Ok(tokens)
    }

    /// Make sure the client holds a valid cookie token, without minting a
    /// request token.
    pub fn set_cookie_token_and_header(&self, ctx: &HttpContext) -> Result<()> {
        self.check_ssl(ctx)?;

        {
            let mut feature = ctx.csrf_feature().lock();
            self.ensure_cookie_token(ctx, &mut feature)?;
            self.serialize_cookie_token(&mut feature)?;
            self.store_new_cookie_token(ctx, &mut feature)?;
        }

        self.set_do_not_cache_headers(ctx);
        Ok(())
    }

    /// Validate the request's tokens. Token failures are logged and reported
    /// as `Ok(false)`; only configuration faults are errors.
    pub async fn is_request_valid(&self, ctx: &HttpContext) -> Result<bool> {
        match self.validate_request(ctx).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_token_failure() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Validate the request's tokens, failing with the reason.
    pub async fn validate_request(&self, ctx: &HttpContext) -> Result<()> {
        self.check_ssl(ctx)?;

        if self.config.is_safe_method(ctx.method().as_str()) {
            trace!(method = %ctx.method(), "Safe method, skipping antiforgery validation");
            return Ok(());
        }

        let result = self.validate_tokens(ctx).await;
        if let Err(e) = &result {
            if e.is_token_failure() {
                warn!(path = %ctx.path(), reason = %e, "Antiforgery validation failed");
            }
        }
        result
    }

    /// Cross-origin check first, then token validation when it is
    /// inconclusive. Excluded paths and safe methods always pass.
    pub async fn protect(&self, ctx: &HttpContext) -> Result<()> {
        self.check_ssl(ctx)?;

        if !self.needs_protection(ctx) {
            trace!(method = %ctx.method(), path = %ctx.path(), "Request exempt from antiforgery");
            return Ok(());
        }

        if self.origin_validator.has_trusted_origins() || ctx.header(SEC_FETCH_SITE).is_some() {
            match self.origin_validator.validate_request(ctx) {
                CrossOriginResult::Allowed => return Ok(()),
                CrossOriginResult::Denied => {
                    warn!(path = %ctx.path(), "Cross-origin request denied");
                    return Err(ValidationFailure::CrossOriginDenied.into());
                }
                CrossOriginResult::Unknown => {}
            }
        }

        self.validate_request(ctx).await
    }

    async fn validate_tokens(&self, ctx: &HttpContext) -> Result<()> {
        let (cookie_token, request_token) = {
            let feature = ctx.csrf_feature().lock();
            (
                cached(feature.have_deserialized_cookie_token, &feature.cookie_token),
                cached(feature.have_deserialized_request_token, &feature.request_token),
            )
        };

        let (cookie_token, request_token) = match (cookie_token, request_token) {
            (Some(cookie_token), Some(request_token)) => (cookie_token, request_token),
            (cookie_token, request_token) => {
                let tokens = self.store.get_request_tokens(ctx).await?;
                let serialized_cookie = tokens.cookie_token.ok_or_else(|| {
                    ValidationFailure::MissingCookieToken {
                        cookie_name: self.config.cookie_name.clone(),
                    }
                })?;
                let serialized_request = tokens
                    .request_token
                    .ok_or_else(|| self.missing_request_token(ctx))?;

                let cookie_token = match cookie_token {
                    Some(token) => token,
                    None => self.serializer.deserialize(&serialized_cookie)?,
                };
                let request_token = match request_token {
                    Some(token) => token,
                    None => self.serializer.deserialize(&serialized_request)?,
                };

                let mut feature = ctx.csrf_feature().lock();
                feature.cookie_token = Some(cookie_token.clone());
                feature.have_deserialized_cookie_token = true;
                feature.request_token = Some(request_token.clone());
                feature.have_deserialized_request_token = true;

                (cookie_token, request_token)
            }
        };

        self.generator
            .try_validate_token_set(ctx, &cookie_token, &request_token)?;
        Ok(())
    }

    fn missing_request_token(&self, ctx: &HttpContext) -> ValidationFailure {
        let field = self.config.field_name.clone();
        let location = match &self.config.header_name {
            None => TokenLocation::FormField(field),
            Some(header) if self.config.suppress_form_field || !has_form_content_type(ctx) => {
                TokenLocation::Header(header.clone())
            }
            Some(header) => TokenLocation::HeaderOrFormField {
                header: header.clone(),
                field,
            },
        };
        ValidationFailure::MissingRequestToken { location }
    }

    /// Decide once per request whether a new cookie token is needed.
    fn ensure_cookie_token(&self, ctx: &HttpContext, feature: &mut CsrfFeature) -> Result<()> {
        if feature.have_generated_new_cookie_token {
            return Ok(());
        }

        if !feature.have_deserialized_cookie_token {
            feature.cookie_token = self.existing_cookie_token(ctx);
            feature.have_deserialized_cookie_token = true;
        }

        feature.new_cookie_token = if self.generator.is_cookie_token_valid(feature.cookie_token.as_ref())
        {
            None
        } else {
            Some(self.generator.generate_cookie_token()?)
        };
        feature.have_generated_new_cookie_token = true;
        Ok(())
    }

    fn ensure_request_token(&self, ctx: &HttpContext, feature: &mut CsrfFeature) -> Result<()> {
        self.ensure_cookie_token(ctx, feature)?;

        if feature.new_request_token.is_none() {
            let cookie_token = feature
                .new_cookie_token
                .as_ref()
                .or(feature.cookie_token.as_ref())
                .ok_or_else(|| CsrfError::Internal("No antiforgery cookie token".to_string()))?;
            feature.new_request_token = Some(self.generator.generate_request_token(ctx, cookie_token)?);
        }

        Ok(())
    }

    /// The client's cookie token. Unreadable cookies count as absent.
    fn existing_cookie_token(&self, ctx: &HttpContext) -> Option<CsrfToken> {
        let serialized = self.store.get_cookie_token(ctx)?;
        match self.serializer.deserialize(&serialized) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable antiforgery cookie");
                None
            }
        }
    }

    fn serialize_cookie_token(&self, feature: &mut CsrfFeature) -> Result<()> {
        if feature.new_cookie_token_string.is_none() {
            if let Some(cookie_token) = &feature.new_cookie_token {
                feature.new_cookie_token_string = Some(self.serializer.serialize(cookie_token)?);
            }
        }
        Ok(())
    }

    fn serialize_tokens(&self, feature: &mut CsrfFeature) -> Result<TokenSet> {
        self.serialize_cookie_token(feature)?;
        if feature.new_request_token_string.is_none() {
            if let Some(request_token) = &feature.new_request_token {
                feature.new_request_token_string = Some(self.serializer.serialize(request_token)?);
            }
        }

        Ok(TokenSet {
            request_token: feature.new_request_token_string.clone(),
            cookie_token: feature.new_cookie_token_string.clone(),
            form_field_name: self.config.field_name.clone(),
            header_name: self.config.header_name.clone(),
        })
    }

    fn store_new_cookie_token(&self, ctx: &HttpContext, feature: &mut CsrfFeature) -> Result<()> {
        if feature.have_stored_new_cookie_token {
            return Ok(());
        }

        match &feature.new_cookie_token_string {
            Some(serialized) => {
                self.store.save_cookie_token(ctx, serialized)?;
                if !self.config.suppress_x_frame_options
                    && ctx.response_header(header::X_FRAME_OPTIONS).is_none()
                {
                    ctx.set_response_header(
                        header::X_FRAME_OPTIONS,
                        HeaderValue::from_static("SAMEORIGIN"),
                    );
                }
                feature.have_stored_new_cookie_token = true;
                debug!(cookie = %self.config.cookie_name, "New antiforgery cookie token issued");
            }
            None => {
                debug!(cookie = %self.config.cookie_name, "Reusing existing antiforgery cookie token");
            }
        }

        Ok(())
    }

    /// Responses carrying tokens must never be cached.
    fn set_do_not_cache_headers(&self, ctx: &HttpContext) {
        if ctx.has_response_started() {
            return;
        }

        let cache_control = ctx.response_header(header::CACHE_CONTROL);
        let keep_cache_control = cache_control
            .as_deref()
            .is_some_and(|value| has_directive(value, "no-cache") && has_directive(value, "no-store"));
        if !keep_cache_control {
            if let Some(existing) = &cache_control {
                warn!(
                    existing = %existing,
                    "Overriding Cache-Control header with 'no-cache, no-store' for antiforgery tokens"
                );
            }
            ctx.set_response_header(
                header::CACHE_CONTROL,
                HeaderValue::from_static("no-cache, no-store"),
            );
        }

        let pragma = ctx.response_header(header::PRAGMA);
        if !pragma
            .as_deref()
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("no-cache"))
        {
            if let Some(existing) = &pragma {
                warn!(existing = %existing, "Overriding Pragma header with 'no-cache' for antiforgery tokens");
            }
            ctx.set_response_header(header::PRAGMA, HeaderValue::from_static("no-cache"));
        }
    }

    fn check_ssl(&self, ctx: &HttpContext) -> Result<()> {
        if self.config.cookie_secure_policy == CookieSecurePolicy::Always && !ctx.is_secure() {
            return Err(CsrfError::configuration(
                "The antiforgery cookie requires SSL (CookieSecurePolicy::Always), but the \
                 current request is not an SSL request.",
            ));
        }
        Ok(())
    }
}

fn cached(have_deserialized: bool, token: &Option<CsrfToken>) -> Option<CsrfToken> {
    if have_deserialized { token.clone() } else { None }
}

fn has_directive(header_value: &str, directive: &str) -> bool {
    header_value.split(',').any(|part| {
        part.split('=')
            .next()
            .is_some_and(|name| name.trim().eq_ignore_ascii_case(directive))
    })
}
