//! Claims-based identities and the identity binding derived from them

use crate::blob::SecureBlob;
use crate::serializer::write_string;
use crate::token::CLAIM_BINDING_BITS;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Well-known claim types
pub mod claim_types {
    pub const SUBJECT: &str = "sub";
    pub const NAME: &str = "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/name";
    pub const NAME_IDENTIFIER: &str =
        "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/nameidentifier";
    pub const UPN: &str = "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/upn";
}

/// Issuer recorded on claims created without an explicit issuer
pub const DEFAULT_ISSUER: &str = "LOCAL AUTHORITY";

/// A single statement about a subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    #[serde(rename = "type")]
    pub claim_type: String,
    pub value: String,
    #[serde(default = "default_issuer")]
    pub issuer: String,
}

fn default_issuer() -> String {
    DEFAULT_ISSUER.to_string()
}

impl Claim {
    pub fn new(claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
            issuer: default_issuer(),
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }
}

/// A set of claims produced by one authentication scheme.
///
/// The identity counts as authenticated when it has a non-empty
/// authentication type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimsIdentity {
    #[serde(default)]
    pub authentication_type: Option<String>,
    #[serde(default)]
    pub claims: Vec<Claim>,
    #[serde(default = "default_name_claim_type")]
    pub name_claim_type: String,
}

fn default_name_claim_type() -> String {
    claim_types::NAME.to_string()
}

impl ClaimsIdentity {
    /// An unauthenticated identity
    pub fn anonymous() -> Self {
        Self {
            authentication_type: None,
            claims: Vec::new(),
            name_claim_type: default_name_claim_type(),
        }
    }

    /// An authenticated identity issued by `authentication_type`
    pub fn authenticated(authentication_type: impl Into<String>) -> Self {
        Self {
            authentication_type: Some(authentication_type.into()),
            ..Self::anonymous()
        }
    }

    pub fn with_claim(mut self, claim: Claim) -> Self {
        self.claims.push(claim);
        self
    }

    pub fn with_claims(mut self, claims: impl IntoIterator<Item = Claim>) -> Self {
        self.claims.extend(claims);
        self
    }

    pub fn with_name(self, name: impl Into<String>) -> Self {
        let claim_type = self.name_claim_type.clone();
        self.with_claim(Claim::new(claim_type, name))
    }

    pub fn is_authenticated(&self) -> bool {
        self.authentication_type
            .as_deref()
            .is_some_and(|kind| !kind.is_empty())
    }

    /// Value of the first name claim
    pub fn name(&self) -> Option<&str> {
        self.find_first(&self.name_claim_type)
            .map(|claim| claim.value.as_str())
    }

    pub fn find_first(&self, claim_type: &str) -> Option<&Claim> {
        self.claims.iter().find(|claim| claim.claim_type == claim_type)
    }
}

/// The caller of a request, possibly carrying several identities
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimsPrincipal {
    #[serde(default)]
    pub identities: Vec<ClaimsIdentity>,
}

impl ClaimsPrincipal {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn new(identity: ClaimsIdentity) -> Self {
        Self {
            identities: vec![identity],
        }
    }

    pub fn with_identity(mut self, identity: ClaimsIdentity) -> Self {
        self.identities.push(identity);
        self
    }

    pub fn authenticated_identities(&self) -> impl Iterator<Item = &ClaimsIdentity> {
        self.identities.iter().filter(|identity| identity.is_authenticated())
    }

    /// The first authenticated identity, if any
    pub fn authenticated_identity(&self) -> Option<&ClaimsIdentity> {
        self.authenticated_identities().next()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated_identity().is_some()
    }
}

/// Derives a stable fingerprint of a principal's identity.
pub trait ClaimBindingExtractor: Send + Sync {
    /// `None` when the principal has no authenticated identity to bind to.
    fn extract_claim_binding(&self, principal: &ClaimsPrincipal) -> Option<SecureBlob>;
}

/// SHA-256 over the principal's unique identifier claim, or over every claim
/// when no unique identifier is present.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClaimBindingExtractor;

const UNIQUE_IDENTIFIER_TYPES: [&str; 3] = [
    claim_types::SUBJECT,
    claim_types::NAME_IDENTIFIER,
    claim_types::UPN,
];

impl DefaultClaimBindingExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Ordered `(type, value, issuer)` fields to hash.
    fn identifier_fields(principal: &ClaimsPrincipal) -> Option<Vec<&str>> {
        for claim_type in UNIQUE_IDENTIFIER_TYPES {
            let unique = principal
                .authenticated_identities()
                .filter_map(|identity| identity.find_first(claim_type))
                .find(|claim| !claim.value.is_empty());

            if let Some(claim) = unique {
                return Some(vec![
                    claim.claim_type.as_str(),
                    claim.value.as_str(),
                    claim.issuer.as_str(),
                ]);
            }
        }

        let mut all: Vec<&Claim> = principal
            .authenticated_identities()
            .flat_map(|identity| identity.claims.iter())
            .collect();

        if all.is_empty() {
            return None;
        }

        // Full ordinal ordering so equal types with different values still
        // sort the same way regardless of enumeration order.
        all.sort_by(|a, b| {
            a.claim_type
                .cmp(&b.claim_type)
                .then_with(|| a.value.cmp(&b.value))
                .then_with(|| a.issuer.cmp(&b.issuer))
        });

        Some(
            all.into_iter()
                .flat_map(|claim| {
                    [
                        claim.claim_type.as_str(),
                        claim.value.as_str(),
                        claim.issuer.as_str(),
                    ]
                })
                .collect(),
        )
    }
}

impl ClaimBindingExtractor for DefaultClaimBindingExtractor {
    fn extract_claim_binding(&self, principal: &ClaimsPrincipal) -> Option<SecureBlob> {
        let fields = Self::identifier_fields(principal)?;

        let mut buf = Vec::new();
        for field in fields {
            write_string(&mut buf, field);
        }

        let digest = Sha256::digest(&buf);
        SecureBlob::from_bytes(CLAIM_BINDING_BITS, &digest).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(principal: &ClaimsPrincipal) -> Option<SecureBlob> {
        DefaultClaimBindingExtractor::new().extract_claim_binding(principal)
    }

    #[test]
    fn test_anonymous_has_no_binding() {
        assert!(extract(&ClaimsPrincipal::anonymous()).is_none());

        let unauthenticated = ClaimsPrincipal::new(
            ClaimsIdentity::anonymous().with_claim(Claim::new(claim_types::SUBJECT, "alice")),
        );
        assert!(extract(&unauthenticated).is_none());
    }

    #[test]
    fn test_authenticated_without_claims_has_no_binding() {
        let principal = ClaimsPrincipal::new(ClaimsIdentity::authenticated("cookies"));
        assert!(extract(&principal).is_none());
    }

    #[test]
    fn test_subject_claim_wins() {
        let with_extra = ClaimsPrincipal::new(
            ClaimsIdentity::authenticated("jwt")
                .with_claim(Claim::new("role", "admin"))
                .with_claim(Claim::new(claim_types::SUBJECT, "user-1")),
        );
        let subject_only = ClaimsPrincipal::new(
            ClaimsIdentity::authenticated("jwt").with_claim(Claim::new(claim_types::SUBJECT, "user-1")),
        );

        let binding = extract(&with_extra).unwrap();
        assert_eq!(binding.bit_length(), CLAIM_BINDING_BITS);
        assert_eq!(binding, extract(&subject_only).unwrap());
    }

    #[test]
    fn test_subject_preferred_over_name_identifier_across_identities() {
        let principal = ClaimsPrincipal::new(
            ClaimsIdentity::authenticated("a")
                .with_claim(Claim::new(claim_types::NAME_IDENTIFIER, "nid")),
        )
        .with_identity(
            ClaimsIdentity::authenticated("b").with_claim(Claim::new(claim_types::SUBJECT, "sub")),
        );
        let subject_only = ClaimsPrincipal::new(
            ClaimsIdentity::authenticated("x").with_claim(Claim::new(claim_types::SUBJECT, "sub")),
        );

        assert_eq!(extract(&principal), extract(&subject_only));
    }

    #[test]
    fn test_name_identifier_preferred_over_upn() {
        let both = ClaimsPrincipal::new(
            ClaimsIdentity::authenticated("ad")
                .with_claim(Claim::new(claim_types::UPN, "alice@corp.example"))
                .with_claim(Claim::new(claim_types::NAME_IDENTIFIER, "nid-7")),
        );
        let name_identifier_only = ClaimsPrincipal::new(
            ClaimsIdentity::authenticated("ad")
                .with_claim(Claim::new(claim_types::NAME_IDENTIFIER, "nid-7")),
        );
        let upn_only = ClaimsPrincipal::new(
            ClaimsIdentity::authenticated("ad")
                .with_claim(Claim::new(claim_types::UPN, "alice@corp.example")),
        );

        let binding = extract(&both).unwrap();
        assert_eq!(binding, extract(&name_identifier_only).unwrap());
        assert_ne!(binding, extract(&upn_only).unwrap());
    }

    #[test]
    fn test_issuer_is_part_of_binding() {
        let a = ClaimsPrincipal::new(
            ClaimsIdentity::authenticated("jwt")
                .with_claim(Claim::new(claim_types::UPN, "a@b").with_issuer("issuer-1")),
        );
        let b = ClaimsPrincipal::new(
            ClaimsIdentity::authenticated("jwt")
                .with_claim(Claim::new(claim_types::UPN, "a@b").with_issuer("issuer-2")),
        );
        assert_ne!(extract(&a), extract(&b));
    }

    #[test]
    fn test_fallback_is_order_independent() {
        let claims = vec![
            Claim::new("email", "a@example.com"),
            Claim::new("role", "admin"),
            Claim::new("role", "editor"),
            Claim::new("tenant", "acme"),
        ];
        let mut reversed = claims.clone();
        reversed.reverse();

        let forward = ClaimsPrincipal::new(ClaimsIdentity::authenticated("saml").with_claims(claims));
        let backward =
            ClaimsPrincipal::new(ClaimsIdentity::authenticated("saml").with_claims(reversed));

        let binding = extract(&forward).unwrap();
        assert_eq!(binding, extract(&backward).unwrap());
    }

    #[test]
    fn test_fallback_ignores_unauthenticated_identities() {
        let claims = vec![Claim::new("email", "a@example.com")];
        let plain = ClaimsPrincipal::new(ClaimsIdentity::authenticated("x").with_claims(claims.clone()));
        let mixed = ClaimsPrincipal::new(ClaimsIdentity::authenticated("x").with_claims(claims))
            .with_identity(ClaimsIdentity::anonymous().with_claim(Claim::new("email", "other")));

        assert_eq!(extract(&plain), extract(&mixed));
    }

    #[test]
    fn test_identity_name() {
        let identity = ClaimsIdentity::authenticated("cookies").with_name("alice");
        assert_eq!(identity.name(), Some("alice"));
        assert!(identity.is_authenticated());
        assert!(!ClaimsIdentity::authenticated("").is_authenticated());
    }

    #[test]
    fn test_principal_from_json() {
        let principal: ClaimsPrincipal = serde_json::from_str(
            r#"{"identities":[{"authentication_type":"jwt","claims":[{"type":"sub","value":"42"}]}]}"#,
        )
        .unwrap();

        let identity = principal.authenticated_identity().unwrap();
        assert_eq!(identity.find_first("sub").unwrap().issuer, DEFAULT_ISSUER);
        assert_eq!(identity.name_claim_type, claim_types::NAME);
    }
}
