//! Errors surfaced by the client

#![allow(missing_copy_implementations)]

use std::error::Error as StdError;

use duo_jose::error::{JwtSigningError, JwtValidationError, RandomError};
use thiserror::Error;

use crate::Username;

/// An argument supplied by the caller was unusable
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid argument: {reason}")]
pub struct InvalidArgument {
    reason: String,
}

impl InvalidArgument {
    /// Describes which argument was rejected and why
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

pub(crate) fn invalid_argument(reason: impl Into<String>) -> InvalidArgument {
    InvalidArgument {
        reason: reason.into(),
    }
}

/// The client configuration was rejected while building
#[derive(Debug, Error)]
#[error("invalid configuration: {reason}")]
pub struct InvalidConfig {
    reason: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl InvalidConfig {
    /// Describes which setting was rejected and why
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

pub(crate) fn invalid_config(reason: impl Into<String>) -> InvalidConfig {
    InvalidConfig {
        reason: reason.into(),
        source: None,
    }
}

pub(crate) fn invalid_config_from(
    reason: impl Into<String>,
    source: impl Into<Box<dyn StdError + Send + Sync + 'static>>,
) -> InvalidConfig {
    InvalidConfig {
        reason: reason.into(),
        source: Some(source.into()),
    }
}

/// An error raised by the HTTP transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// Unable to send a request to the identity provider
    #[error("error sending request to identity provider")]
    RequestSend(#[source] reqwest::Error),

    /// Unable to read the response
    #[error("error reading response body")]
    BodyRead(#[source] reqwest::Error),

    /// A failure from a custom transport
    #[error("transport failure")]
    Other(#[source] Box<dyn StdError + Send + Sync + 'static>),
}

impl TransportError {
    /// Wraps an error raised by a custom [`Transport`][crate::Transport]
    pub fn other(source: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> Self {
        Self::Other(source.into())
    }
}

/// The authorization code could not be exchanged for an identity token
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// The request could not be completed
    #[error("error communicating with identity provider")]
    Transport(#[from] TransportError),

    /// The identity provider responded with a non-success status
    #[error("identity provider responded with status {status}: {body}")]
    Status {
        /// The HTTP status code
        status: u16,
        /// The body of the response
        body: String,
    },

    /// Unable to deserialize the token response
    #[error("error deserializing token response from identity provider")]
    Body(#[from] serde_json::Error),
}

/// The identity token returned by the identity provider was not acceptable
#[derive(Debug, Error)]
pub enum IdentityTokenError {
    /// The token signature, algorithm, time window, audience, or issuer was rejected
    #[error("identity token failed validation")]
    Validation(#[from] JwtValidationError),

    /// The verified claims did not have the expected shape
    #[error("identity token claims could not be decoded")]
    Decode(#[source] serde_json::Error),
}

/// An error from the Duo Universal client
#[derive(Debug, Error)]
pub enum Error {
    /// An argument supplied by the caller was unusable
    #[error(transparent)]
    InvalidArgument(#[from] InvalidArgument),

    /// The client configuration was rejected
    #[error(transparent)]
    InvalidConfig(#[from] InvalidConfig),

    /// A client token could not be signed
    #[error("error signing client token")]
    Signing(#[from] JwtSigningError),

    /// The authorization code could not be exchanged
    #[error("error exchanging authorization code")]
    ExchangeFailed(#[from] ExchangeError),

    /// The identity token was rejected
    #[error("identity token rejected")]
    TokenInvalid(#[from] IdentityTokenError),

    /// The identity token was issued for a different user
    #[error("identity token issued for {actual:?}, expected {expected:?}")]
    UsernameMismatch {
        /// The username the caller expected
        expected: Username,
        /// The username named by the identity token
        actual: Username,
    },

    /// An unexpected error
    #[error(transparent)]
    Unexpected(#[from] duo_jose::error::Unexpected),
}

impl Error {
    /// Whether the caller supplied an unusable argument
    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }

    /// Whether the configuration was rejected
    #[must_use]
    pub fn is_invalid_config(&self) -> bool {
        matches!(self, Self::InvalidConfig(_))
    }

    /// Whether the code exchange failed before a token was received
    #[must_use]
    pub fn is_exchange_failed(&self) -> bool {
        matches!(self, Self::ExchangeFailed(_))
    }

    /// Whether the identity token was rejected
    #[must_use]
    pub fn is_token_invalid(&self) -> bool {
        matches!(self, Self::TokenInvalid(_))
    }

    /// Whether the identity token named a different user
    ///
    /// This can indicate an attempt to inject a code obtained for another
    /// identity.
    #[must_use]
    pub fn is_username_mismatch(&self) -> bool {
        matches!(self, Self::UsernameMismatch { .. })
    }
}

impl From<RandomError> for Error {
    fn from(err: RandomError) -> Self {
        match err {
            RandomError::InvalidArgument(e) => Self::InvalidArgument(invalid_argument(e.reason())),
            RandomError::Unexpected(e) => Self::Unexpected(e),
        }
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        Self::ExchangeFailed(err.into())
    }
}
