//! Error types for antiforgery operations

use thiserror::Error;

/// Result type for antiforgery operations
pub type Result<T> = std::result::Result<T, CsrfError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CsrfError {
    /// The token could not be decoded. Always opaque: malformed base64,
    /// failed decryption, unknown version and trailing bytes all look the same.
    #[error("The antiforgery token could not be decrypted.")]
    DeserializationFailed,

    #[error("{0}")]
    Validation(#[from] ValidationFailure),

    /// Fatal misconfiguration. Never retried.
    #[error("Antiforgery configuration error: {0}")]
    Configuration(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CsrfError {
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Whether this is an expected token failure (bad or missing tokens)
    /// rather than a configuration or internal fault.
    pub fn is_token_failure(&self) -> bool {
        matches!(self, Self::DeserializationFailed | Self::Validation(_))
    }

    pub fn validation_failure(&self) -> Option<&ValidationFailure> {
        match self {
            Self::Validation(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Reasons a submitted token pair is rejected.
///
/// Safe to log. Do not echo the detail back to end users.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    #[error("Validation of the provided antiforgery token failed. The cookie token and the request token were swapped.")]
    TokensSwapped,

    #[error("The antiforgery cookie token and request token do not match.")]
    SecurityBlobMismatch,

    #[error("The provided antiforgery token was meant for user \"{expected}\", but the current user is \"{actual}\".")]
    UsernameMismatch { expected: String, actual: String },

    #[error("The provided antiforgery token was meant for a different claims-based user than the current user.")]
    ClaimBindingMismatch,

    #[error("The provided antiforgery token failed a custom data check.")]
    AdditionalDataCheckFailed,

    #[error("The required antiforgery cookie \"{cookie_name}\" is not present.")]
    MissingCookieToken { cookie_name: String },

    #[error("{}", missing_request_token_message(.location))]
    MissingRequestToken { location: TokenLocation },

    #[error("The request was rejected by the cross-origin check.")]
    CrossOriginDenied,
}

/// Where a request token was looked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenLocation {
    Header(String),
    FormField(String),
    HeaderOrFormField { header: String, field: String },
}

fn missing_request_token_message(location: &TokenLocation) -> String {
    match location {
        TokenLocation::Header(header) => {
            format!("The required antiforgery header value \"{}\" is not present.", header)
        }
        TokenLocation::FormField(field) => {
            format!("The required antiforgery form field \"{}\" is not present.", field)
        }
        TokenLocation::HeaderOrFormField { header, field } => format!(
            "The required antiforgery request token was not provided in either form field \"{}\" or header value \"{}\".",
            field, header
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialization_message_is_opaque() {
        let message = CsrfError::DeserializationFailed.to_string();
        assert!(!message.contains("version"));
        assert!(!message.contains("base64"));
    }

    #[test]
    fn test_validation_from_failure() {
        let error: CsrfError = ValidationFailure::TokensSwapped.into();
        assert!(error.is_token_failure());
        assert_eq!(error.validation_failure(), Some(&ValidationFailure::TokensSwapped));
    }

    #[test]
    fn test_missing_token_messages() {
        let cookie = ValidationFailure::MissingCookieToken {
            cookie_name: "cookie-name".to_string(),
        };
        assert_eq!(
            cookie.to_string(),
            "The required antiforgery cookie \"cookie-name\" is not present."
        );

        let header = ValidationFailure::MissingRequestToken {
            location: TokenLocation::Header("header-name".to_string()),
        };
        assert_eq!(
            header.to_string(),
            "The required antiforgery header value \"header-name\" is not present."
        );

        let both = ValidationFailure::MissingRequestToken {
            location: TokenLocation::HeaderOrFormField {
                header: "header-name".to_string(),
                field: "form-field-name".to_string(),
            },
        };
        assert!(both.to_string().contains("form field \"form-field-name\""));
        assert!(both.to_string().contains("header value \"header-name\""));
    }

    #[test]
    fn test_configuration_is_not_token_failure() {
        assert!(!CsrfError::configuration("bad").is_token_failure());
        assert!(!CsrfError::invalid_argument("bad").is_token_failure());
    }
}
