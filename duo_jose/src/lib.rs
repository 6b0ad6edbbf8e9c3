//! Signed tokens for the Duo Universal Prompt
//!
//! This crate implements the narrow slice of the JavaScript Object Signing and
//! Encryption (JOSE) standards used between a Duo Universal Prompt client and
//! the Duo identity provider:
//!
//! * Compact JSON Web Tokens ([RFC7519][]) signed with HMAC using SHA-512
//!   ([RFC7518][]), and nothing else
//! * Validation of the signature, algorithm, audience, issuer, and time window
//!   of a received token
//! * Unbiased alphanumeric random strings for nonces and `state` values
//!
//! [RFC7518]: https://tools.ietf.org/html/rfc7518
//! [RFC7519]: https://tools.ietf.org/html/rfc7519
//!
//! # Example
//!
//! ```
//! use duo_jose::{jwt, Claim, ClaimSet};
//!
//! let secret = b"0123456789abcdef0123456789abcdef01234567";
//! let issuer = jwt::Issuer::from_static("DIXXXXXXXXXXXXXXXXXX");
//! let audience = jwt::Audience::from_static("https://api-123456.duosecurity.com/oauth/v1/token");
//!
//! let token = jwt::sign(
//!     &issuer,
//!     secret,
//!     &audience,
//!     ClaimSet::new().with(Claim::Subject, issuer.as_str()),
//! )
//! .unwrap();
//!
//! let claims = jwt::validate(&token, &audience, secret, &issuer).unwrap();
//! assert_eq!(claims.subject().unwrap().as_str(), "DIXXXXXXXXXXXXXXXXXX");
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

pub mod claims;
pub mod clock;
pub mod error;
pub mod jwa;
pub mod jwt;
pub mod random;

#[cfg(test)]
pub(crate) mod test;

#[doc(inline)]
pub use claims::{Claim, ClaimSet};
#[doc(inline)]
pub use clock::{Clock, TestClock, UnixTime};
#[doc(inline)]
pub use jwt::{Engine, Jwt, JwtRef};
#[doc(inline)]
pub use random::{RandomSource, SystemRandom};
