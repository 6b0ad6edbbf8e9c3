//! The claim vocabulary and the JSON payload carried by a token
//!
//! A [`ClaimSet`] is an ordered JSON object. Building a claim set fills in
//! the issuer, the audience, and a fresh nonce before merging in the caller's
//! claims, which are allowed to replace any of those defaults.
//!
//! Decoding a token's claims with [`ClaimSet::decode_untrusted`] does not
//! check its signature. Verification is a separate step, performed by
//! [`Engine::validate`][crate::Engine::validate].

use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    clock::UnixTime,
    error,
    jwt::{AudienceRef, IssuerRef, JwtRef, SubjectRef},
    random::{self, RandomSource},
};

/// Length of the `jti` nonce added to every claim set
pub const NONCE_LENGTH: usize = 36;

/// Names of the claims understood by this crate
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Claim {
    /// Issuer (`iss`)
    Issuer,
    /// Audience (`aud`)
    Audience,
    /// Subject (`sub`)
    Subject,
    /// Unique token identifier (`jti`)
    JwtId,
    /// Issued at (`iat`)
    IssuedAt,
    /// Not before (`nbf`)
    NotBefore,
    /// Expires (`exp`)
    Expiration,
    /// OIDC nonce (`nonce`)
    Nonce,
    /// The OAuth client ID (`client_id`)
    ClientId,
    /// Username requested for authentication (`duo_uname`)
    DuoUsername,
    /// Where the identity provider redirects afterward (`redirect_uri`)
    RedirectUri,
    /// OAuth response type (`response_type`)
    ResponseType,
    /// OAuth scope (`scope`)
    Scope,
    /// Correlation value for the authorization request (`state`)
    State,
    /// Ask for the authorization code under `duo_code` (`use_duo_code_attribute`)
    UseDuoCodeAttribute,
    /// The authenticated username (`preferred_username`)
    PreferredUsername,
    /// When the user authenticated (`auth_time`)
    AuthTime,
    /// Details about the authentication (`auth_context`)
    AuthContext,
    /// The outcome of the authentication (`auth_result`)
    AuthResult,
}

impl Claim {
    /// The claim name as it appears in the JSON payload
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Issuer => "iss",
            Self::Audience => "aud",
            Self::Subject => "sub",
            Self::JwtId => "jti",
            Self::IssuedAt => "iat",
            Self::NotBefore => "nbf",
            Self::Expiration => "exp",
            Self::Nonce => "nonce",
            Self::ClientId => "client_id",
            Self::DuoUsername => "duo_uname",
            Self::RedirectUri => "redirect_uri",
            Self::ResponseType => "response_type",
            Self::Scope => "scope",
            Self::State => "state",
            Self::UseDuoCodeAttribute => "use_duo_code_attribute",
            Self::PreferredUsername => "preferred_username",
            Self::AuthTime => "auth_time",
            Self::AuthContext => "auth_context",
            Self::AuthResult => "auth_result",
        }
    }
}

impl fmt::Display for Claim {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The JSON claims carried as a token's payload
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
#[must_use]
pub struct ClaimSet(Map<String, Value>);

impl ClaimSet {
    /// Constructs an empty claim set
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builds the payload for an outbound token
    ///
    /// `iss`, `aud`, and a fresh 36 character `jti` are populated first; then
    /// every claim in `extra` is merged in, replacing a default of the same
    /// name.
    ///
    /// # Errors
    ///
    /// Returns an error if the nonce cannot be generated.
    pub fn build(
        issuer: &IssuerRef,
        audience: &AudienceRef,
        extra: ClaimSet,
        rng: &dyn RandomSource,
    ) -> Result<Self, error::RandomError> {
        let jti = random::generate_with_rng(NONCE_LENGTH, rng)?;

        let mut claims = Self::new()
            .with(Claim::Issuer, issuer.as_str())
            .with(Claim::Audience, audience.as_str())
            .with(Claim::JwtId, jti);

        claims.0.extend(extra.0);

        Ok(claims)
    }

    /// Reads the payload of a token without verifying it
    ///
    /// **WARNING:** *Nothing returned here has been validated.* Use it only to
    /// decide how a token should be verified, never to trust its contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is malformed.
    pub fn decode_untrusted(token: &JwtRef) -> Result<Self, error::MalformedJwt> {
        Ok(token.decompose()?.untrusted_claims().clone())
    }

    /// Adds a claim, replacing any existing value
    pub fn with(mut self, claim: Claim, value: impl Into<Value>) -> Self {
        self.insert(claim, value);
        self
    }

    /// Adds a claim with an arbitrary name, replacing any existing value
    pub fn with_custom(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Adds a claim, returning the previous value if there was one
    pub fn insert(&mut self, claim: Claim, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(claim.as_str().to_owned(), value.into())
    }

    /// Adds a claim only when no value is present yet
    pub(crate) fn insert_if_absent(&mut self, claim: Claim, value: impl Into<Value>) {
        self.0
            .entry(claim.as_str())
            .or_insert_with(|| value.into());
    }

    /// Gets a claim's raw value
    #[must_use]
    pub fn get(&self, claim: Claim) -> Option<&Value> {
        self.0.get(claim.as_str())
    }

    /// Gets a claim's raw value by name
    #[must_use]
    pub fn get_custom(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Gets a claim as a string, if it is one
    #[must_use]
    pub fn get_str(&self, claim: Claim) -> Option<&str> {
        self.get(claim).and_then(Value::as_str)
    }

    /// Gets a time claim, if it is a non-negative integer
    #[must_use]
    pub fn get_time(&self, claim: Claim) -> Option<UnixTime> {
        self.get(claim).and_then(Value::as_u64).map(UnixTime)
    }

    /// Whether the claim is present
    #[must_use]
    pub fn contains(&self, claim: Claim) -> bool {
        self.0.contains_key(claim.as_str())
    }

    /// The `iss` claim
    #[must_use]
    pub fn issuer(&self) -> Option<&IssuerRef> {
        self.get_str(Claim::Issuer).map(IssuerRef::from_str)
    }

    /// The audiences listed in the `aud` claim, which may be a single string
    /// or an array of strings
    pub fn audiences(&self) -> impl Iterator<Item = &AudienceRef> {
        let (one, many) = match self.get(Claim::Audience) {
            Some(Value::String(s)) => (Some(s.as_str()), None),
            Some(Value::Array(v)) => (None, Some(v.iter().filter_map(Value::as_str))),
            _ => (None, None),
        };

        one.into_iter()
            .chain(many.into_iter().flatten())
            .map(AudienceRef::from_str)
    }

    /// The `sub` claim
    #[must_use]
    pub fn subject(&self) -> Option<&SubjectRef> {
        self.get_str(Claim::Subject).map(SubjectRef::from_str)
    }

    /// The `iat` claim
    #[must_use]
    pub fn issued_at(&self) -> Option<UnixTime> {
        self.get_time(Claim::IssuedAt)
    }

    /// The `nbf` claim
    #[must_use]
    pub fn not_before(&self) -> Option<UnixTime> {
        self.get_time(Claim::NotBefore)
    }

    /// The `exp` claim
    #[must_use]
    pub fn expiration(&self) -> Option<UnixTime> {
        self.get_time(Claim::Expiration)
    }

    /// Iterates through every claim by name
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Decodes the claims into a typed structure
    ///
    /// # Errors
    ///
    /// Returns an error if the claims do not have the shape of `T`.
    pub fn deserialize_into<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(Value::Object(self.0.clone()))
    }

    /// Unwraps the underlying JSON object
    #[must_use]
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for ClaimSet {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ClaimSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;
    use serde_json::json;

    use super::*;
    use crate::{
        jwt::{Audience, Issuer},
        random::SystemRandom,
    };

    #[test]
    fn build_populates_defaults() -> Result<()> {
        let claims = ClaimSet::build(
            &Issuer::from_static("client"),
            &Audience::from_static("https://example.com/token"),
            ClaimSet::new(),
            &SystemRandom::new(),
        )?;

        assert_eq!(claims.issuer().map(IssuerRef::as_str), Some("client"));
        assert_eq!(
            claims.audiences().map(AudienceRef::as_str).collect::<Vec<_>>(),
            vec!["https://example.com/token"]
        );

        let jti = claims.get_str(Claim::JwtId).unwrap();
        assert_eq!(jti.len(), NONCE_LENGTH);

        Ok(())
    }

    #[test]
    fn caller_claims_override_defaults() -> Result<()> {
        let extra = ClaimSet::new()
            .with(Claim::Audience, "override")
            .with(Claim::Subject, "client")
            .with_custom("abc", "xyz");

        let claims = ClaimSet::build(
            &Issuer::from_static("client"),
            &Audience::from_static("original"),
            extra,
            &SystemRandom::new(),
        )?;

        assert_eq!(claims.get_str(Claim::Audience), Some("override"));
        assert_eq!(claims.subject().map(SubjectRef::as_str), Some("client"));
        assert_eq!(claims.get_custom("abc"), Some(&json!("xyz")));

        Ok(())
    }

    #[test]
    fn nonces_are_fresh_per_build() -> Result<()> {
        let build = || {
            ClaimSet::build(
                &Issuer::from_static("client"),
                &Audience::from_static("aud"),
                ClaimSet::new(),
                &SystemRandom::new(),
            )
        };

        assert_ne!(
            build()?.get_str(Claim::JwtId),
            build()?.get_str(Claim::JwtId)
        );

        Ok(())
    }

    #[test]
    fn audiences_accept_string_or_array() -> Result<()> {
        let claims: ClaimSet = serde_json::from_value(json!({ "aud": ["a", "b"] }))?;
        assert_eq!(
            claims.audiences().map(AudienceRef::as_str).collect::<Vec<_>>(),
            vec!["a", "b"]
        );

        let claims: ClaimSet = serde_json::from_value(json!({ "aud": 7 }))?;
        assert_eq!(claims.audiences().count(), 0);

        Ok(())
    }

    #[test]
    fn time_claims_must_be_integers() -> Result<()> {
        let claims: ClaimSet = serde_json::from_value(json!({
            "iat": 100,
            "nbf": "100",
            "exp": -5,
        }))?;

        assert_eq!(claims.issued_at(), Some(UnixTime(100)));
        assert_eq!(claims.not_before(), None);
        assert_eq!(claims.expiration(), None);

        Ok(())
    }

    #[test]
    fn insert_if_absent_keeps_existing() {
        let mut claims = ClaimSet::new().with(Claim::Expiration, 10);
        claims.insert_if_absent(Claim::Expiration, 99);
        claims.insert_if_absent(Claim::IssuedAt, 1);

        assert_eq!(claims.expiration(), Some(UnixTime(10)));
        assert_eq!(claims.issued_at(), Some(UnixTime(1)));
    }
}
