//! Common errors

#![allow(missing_copy_implementations)]

use std::error::Error as StdError;

use thiserror::Error;

/// An argument supplied by the caller was unusable
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
#[error("invalid argument: {reason}")]
pub struct InvalidArgument {
    reason: &'static str,
}

impl InvalidArgument {
    /// Describes which argument was rejected and why
    #[must_use]
    pub fn reason(&self) -> &'static str {
        self.reason
    }
}

pub(crate) const fn invalid_argument(reason: &'static str) -> InvalidArgument {
    InvalidArgument { reason }
}

/// The shared secret is too short to be used with HMAC-SHA-512
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
#[error("secret must be at least {min} bytes")]
pub struct SecretTooShort {
    min: usize,
}

pub(crate) const fn secret_too_short(min: usize) -> SecretTooShort {
    SecretTooShort { min }
}

/// The JWT is malformed and cannot be parsed out into header, payload, and signature sections
#[derive(Debug, Error)]
#[error("malformed JWT")]
pub struct MalformedJwt {
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

pub(crate) fn malformed_jwt() -> MalformedJwt {
    MalformedJwt { source: None }
}

pub(crate) fn malformed_jwt_section(
    source: impl Into<Box<dyn StdError + Send + Sync + 'static>>,
) -> MalformedJwt {
    MalformedJwt {
        source: Some(source.into()),
    }
}

/// Unexpected error (possibly a bug)
#[derive(Debug, Error)]
#[error("unexpected error")]
pub struct Unexpected {
    #[from]
    source: Box<dyn StdError + Send + Sync + 'static>,
}

pub(crate) fn unexpected(
    source: impl Into<Box<dyn StdError + Send + Sync + 'static>>,
) -> Unexpected {
    Unexpected {
        source: source.into(),
    }
}

/// The token was structurally sound but was rejected
#[derive(Debug, Error)]
#[error("JWT validation failed")]
pub struct ValidationFailed {
    #[from]
    source: ClaimsRejected,
}

impl ValidationFailed {
    /// The reason the token was rejected
    #[must_use]
    pub fn cause(&self) -> &ClaimsRejected {
        &self.source
    }
}

/// The reason a structurally valid token was rejected
#[derive(Debug, Error)]
pub enum ClaimsRejected {
    /// The signature does not match the header and payload
    #[error("signature mismatch")]
    SignatureMismatch,

    /// The token algorithm is not acceptable
    #[error("invalid algorithm '{0}'")]
    InvalidAlgorithm(String),

    /// The token audience is not acceptable
    #[error("invalid audience")]
    InvalidAudience,

    /// The token issuer is not acceptable
    #[error("invalid issuer")]
    InvalidIssuer,

    /// The token is expired according to the `exp` claim
    #[error("token expired")]
    TokenExpired,

    /// The token is not yet valid according to the `nbf` claim
    #[error("token not yet valid")]
    TokenNotYetValid,

    /// The `nbf` claim is later than the `exp` claim
    #[error("token validity window is inverted")]
    InvertedValidityWindow,

    /// A required claim is missing
    #[error("required {0} claim missing")]
    MissingRequiredClaim(&'static str),

    /// A claim is present but its value has the wrong type
    #[error("{0} claim has an invalid value")]
    InvalidClaim(&'static str),
}

/// An error occurring while generating random strings
#[derive(Debug, Error)]
pub enum RandomError {
    /// The requested length is unusable
    #[error(transparent)]
    InvalidArgument(#[from] InvalidArgument),

    /// The random number generator failed
    #[error(transparent)]
    Unexpected(#[from] Unexpected),
}

/// An error occurring while creating a signed JWT
#[derive(Debug, Error)]
pub enum JwtSigningError {
    /// The issuer, audience, or secret was unusable
    #[error(transparent)]
    InvalidArgument(#[from] InvalidArgument),

    /// An unexpected error
    #[error(transparent)]
    Unexpected(#[from] Unexpected),
}

impl From<RandomError> for JwtSigningError {
    fn from(err: RandomError) -> Self {
        match err {
            RandomError::InvalidArgument(e) => Self::InvalidArgument(e),
            RandomError::Unexpected(e) => Self::Unexpected(e),
        }
    }
}

/// An error occurring while validating a JWT
#[derive(Debug, Error)]
pub enum JwtValidationError {
    /// The secret is too short to be used for validation
    #[error(transparent)]
    SecretTooShort(#[from] SecretTooShort),

    /// The JWT is malformed, without a discernible header, payload, and signature
    #[error(transparent)]
    Malformed(#[from] MalformedJwt),

    /// The JWT was rejected
    #[error(transparent)]
    ValidationFailed(#[from] ValidationFailed),
}

impl JwtValidationError {
    /// Whether the error is due to a malformed token
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }

    /// Whether the error is due to an unusable secret
    #[must_use]
    pub fn is_secret_too_short(&self) -> bool {
        matches!(self, Self::SecretTooShort(_))
    }

    /// The reason for the rejection, if the token was well-formed
    #[must_use]
    pub fn rejection(&self) -> Option<&ClaimsRejected> {
        match self {
            Self::ValidationFailed(v) => Some(v.cause()),
            _ => None,
        }
    }
}

impl From<ClaimsRejected> for JwtValidationError {
    fn from(cause: ClaimsRejected) -> Self {
        Self::ValidationFailed(ValidationFailed::from(cause))
    }
}
