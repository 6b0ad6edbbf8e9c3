//! The single JSON Web Algorithm used to sign and verify tokens

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error;

/// The minimum accepted length of a shared secret, in bytes
pub const MIN_SECRET_LENGTH: usize = 16;

/// Signing algorithms accepted by this crate
///
/// Tokens are only ever signed with HMAC-SHA-512. Any token whose header
/// names a different algorithm, including a differently cased spelling of
/// this one, is rejected before its signature is examined.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::upper_case_acronyms)]
pub enum Algorithm {
    /// HMAC using SHA-512
    HS512,
}

impl Algorithm {
    /// The algorithm name as it appears in a token header
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HS512 => "HS512",
        }
    }

    /// Looks up an algorithm by its exact header name
    #[must_use]
    pub fn from_header(alg: &str) -> Option<Self> {
        match alg {
            "HS512" => Some(Self::HS512),
            _ => None,
        }
    }

    /// The size in bytes of a signature
    #[must_use]
    pub const fn signature_size(self) -> usize {
        match self {
            Self::HS512 => 512 / 8,
        }
    }

    fn into_ring_algorithm(self) -> ring::hmac::Algorithm {
        match self {
            Self::HS512 => ring::hmac::HMAC_SHA512,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HMAC secret
#[derive(Clone)]
#[must_use]
pub struct Hmac {
    key: ring::hmac::Key,
}

impl fmt::Debug for Hmac {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Hmac { secret }")
    }
}

impl Hmac {
    /// HMAC-SHA-512 using the provided secret
    ///
    /// # Errors
    ///
    /// Returns an error if the secret is shorter than [`MIN_SECRET_LENGTH`].
    pub fn new(secret: &[u8]) -> Result<Self, error::SecretTooShort> {
        if secret.len() < MIN_SECRET_LENGTH {
            return Err(error::secret_too_short(MIN_SECRET_LENGTH));
        }

        Ok(Self {
            key: ring::hmac::Key::new(Algorithm::HS512.into_ring_algorithm(), secret),
        })
    }

    pub(crate) fn sign(&self, data: &[u8]) -> Vec<u8> {
        ring::hmac::sign(&self.key, data).as_ref().to_vec()
    }

    pub(crate) fn verify(&self, data: &[u8], signature: &[u8]) -> Result<(), error::ClaimsRejected> {
        ring::hmac::verify(&self.key, data, signature)
            .map_err(|_| error::ClaimsRejected::SignatureMismatch)
    }
}
