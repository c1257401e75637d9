use crate::error::{CsrfError, Result};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use std::time::Duration;

/// Minimum master secret length in bytes
pub const MIN_SECRET_LEN: usize = 32;

/// Antiforgery configuration
#[derive(Debug, Clone)]
pub struct CsrfConfig {
    /// Master secret the token protector key is derived from (at least 32 bytes)
    pub secret: Vec<u8>,

    /// Cookie carrying the cookie token
    pub cookie_name: String,

    /// Header carrying the request token. `None` disables header lookup.
    pub header_name: Option<String>,

    /// Form field carrying the request token
    pub field_name: String,

    /// Never read the request token from a form body
    pub suppress_form_field: bool,

    /// Cookie domain
    pub cookie_domain: Option<String>,

    /// Cookie path
    pub cookie_path: String,

    /// Cookie HttpOnly flag
    pub cookie_http_only: bool,

    /// Cookie SameSite policy
    pub cookie_same_site: SameSite,

    /// Cookie Max-Age. `None` issues a session cookie.
    pub cookie_max_age: Option<Duration>,

    /// When the cookie gets the Secure flag, and whether plaintext requests
    /// are refused
    pub cookie_secure_policy: CookieSecurePolicy,

    /// Do not send `X-Frame-Options: SAMEORIGIN` with a new cookie
    pub suppress_x_frame_options: bool,

    /// Safe HTTP methods (not checked for CSRF)
    pub safe_methods: Vec<String>,

    /// Paths to exclude from CSRF protection
    pub exclude_paths: Vec<String>,

    /// Origins always allowed by the cross-origin check
    pub trusted_origins: Vec<String>,
}

/// Cookie SameSite attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

impl From<SameSite> for cookie::SameSite {
    fn from(same_site: SameSite) -> Self {
        match same_site {
            SameSite::Strict => cookie::SameSite::Strict,
            SameSite::Lax => cookie::SameSite::Lax,
            SameSite::None => cookie::SameSite::None,
        }
    }
}

/// Cookie Secure flag policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CookieSecurePolicy {
    /// Secure when the request arrived over HTTPS
    #[default]
    SameAsRequest,
    /// Always Secure. Plaintext requests are a configuration error.
    Always,
    /// Never Secure
    None,
}

impl CookieSecurePolicy {
    /// Whether a cookie written for this request gets the Secure flag
    pub fn is_secure(&self, request_is_secure: bool) -> bool {
        match self {
            CookieSecurePolicy::SameAsRequest => request_is_secure,
            CookieSecurePolicy::Always => true,
            CookieSecurePolicy::None => false,
        }
    }
}

impl CsrfConfig {
    /// Create a new CSRF configuration
    pub fn new(secret: Vec<u8>) -> Result<Self> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(CsrfError::configuration(format!(
                "Secret key must be at least {} bytes",
                MIN_SECRET_LEN
            )));
        }

        Ok(Self::with_valid_secret(secret))
    }

    fn with_valid_secret(secret: Vec<u8>) -> Self {
        Self {
            secret,
            cookie_name: "csrf_token".to_string(),
            header_name: Some("X-CSRF-Token".to_string()),
            field_name: "csrf_token".to_string(),
            suppress_form_field: false,
            cookie_domain: None,
            cookie_path: "/".to_string(),
            cookie_http_only: true,
            cookie_same_site: SameSite::Strict,
            cookie_max_age: None,
            cookie_secure_policy: CookieSecurePolicy::SameAsRequest,
            suppress_x_frame_options: false,
            safe_methods: vec![
                "GET".to_string(),
                "HEAD".to_string(),
                "OPTIONS".to_string(),
                "TRACE".to_string(),
            ],
            exclude_paths: Vec::new(),
            trusted_origins: Vec::new(),
        }
    }

    /// Generate a secret key
    pub fn generate_secret() -> Vec<u8> {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        (0..MIN_SECRET_LEN).map(|_| rng.r#gen()).collect()
    }

    /// Load configuration from `ARMATURE_CSRF_*` environment variables.
    ///
    /// Without `ARMATURE_CSRF_SECRET` (base64url) a random secret is used,
    /// which does not survive restarts or span instances.
    pub fn from_env() -> Result<Self> {
        let mut config = match env_var("ARMATURE_CSRF_SECRET") {
            Some(encoded) => {
                let secret = URL_SAFE_NO_PAD
                    .decode(encoded.trim_end_matches('='))
                    .map_err(|e| {
                        CsrfError::configuration(format!(
                            "ARMATURE_CSRF_SECRET is not valid base64url: {}",
                            e
                        ))
                    })?;
                Self::new(secret)?
            }
            None => Self::default(),
        };

        if let Some(name) = env_var("ARMATURE_CSRF_COOKIE_NAME") {
            config.cookie_name = name;
        }
        if let Some(name) = env_var("ARMATURE_CSRF_HEADER_NAME") {
            config.header_name = Some(name);
        }
        if let Some(name) = env_var("ARMATURE_CSRF_FIELD_NAME") {
            config.field_name = name;
        }
        if let Some(origins) = env_var("ARMATURE_CSRF_TRUSTED_ORIGINS") {
            config.trusted_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(flag) = env_var("ARMATURE_CSRF_REQUIRE_SECURE") {
            if matches!(flag.to_lowercase().as_str(), "1" | "true" | "yes") {
                config.cookie_secure_policy = CookieSecurePolicy::Always;
            }
        }

        Ok(config)
    }

    /// Set cookie name
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Set header name
    pub fn with_header_name(mut self, name: impl Into<String>) -> Self {
        self.header_name = Some(name.into());
        self
    }

    /// Only accept the request token from a form field
    pub fn without_header(mut self) -> Self {
        self.header_name = None;
        self
    }

    /// Set field name
    pub fn with_field_name(mut self, name: impl Into<String>) -> Self {
        self.field_name = name.into();
        self
    }

    /// Only accept the request token from a header
    pub fn with_suppress_form_field(mut self, suppress: bool) -> Self {
        self.suppress_form_field = suppress;
        self
    }

    /// Set cookie domain
    pub fn with_cookie_domain(mut self, domain: impl Into<String>) -> Self {
        self.cookie_domain = Some(domain.into());
        self
    }

    /// Set cookie path
    pub fn with_cookie_path(mut self, path: impl Into<String>) -> Self {
        self.cookie_path = path.into();
        self
    }

    /// Set cookie HttpOnly flag
    pub fn with_cookie_http_only(mut self, http_only: bool) -> Self {
        self.cookie_http_only = http_only;
        self
    }

    /// Set cookie SameSite policy
    pub fn with_cookie_same_site(mut self, same_site: SameSite) -> Self {
        self.cookie_same_site = same_site;
        self
    }

    /// Set cookie Max-Age
    pub fn with_cookie_max_age(mut self, max_age: Duration) -> Self {
        self.cookie_max_age = Some(max_age);
        self
    }

    /// Set cookie Secure policy
    pub fn with_cookie_secure_policy(mut self, policy: CookieSecurePolicy) -> Self {
        self.cookie_secure_policy = policy;
        self
    }

    pub fn with_suppress_x_frame_options(mut self, suppress: bool) -> Self {
        self.suppress_x_frame_options = suppress;
        self
    }

    /// Replace safe methods
    pub fn with_safe_methods(mut self, methods: Vec<String>) -> Self {
        self.safe_methods = methods;
        self
    }

    /// Replace excluded paths
    pub fn with_exclude_paths(mut self, paths: Vec<String>) -> Self {
        self.exclude_paths = paths;
        self
    }

    /// Replace trusted origins
    pub fn with_trusted_origins(mut self, origins: Vec<String>) -> Self {
        self.trusted_origins = origins;
        self
    }

    pub fn is_safe_method(&self, method: &str) -> bool {
        self.safe_methods
            .iter()
            .any(|safe| safe.eq_ignore_ascii_case(method))
    }

    pub fn is_excluded_path(&self, path: &str) -> bool {
        self.exclude_paths
            .iter()
            .any(|excluded| path.starts_with(excluded.as_str()))
    }
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self::with_valid_secret(Self::generate_secret())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}
