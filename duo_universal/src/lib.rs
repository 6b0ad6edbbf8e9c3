//! A client for the Duo Universal Prompt
//!
//! The Duo Universal Prompt adds a second factor to a web application's
//! login. After the application has verified a user's primary credentials,
//! it redirects the user's browser to Duo. Duo then redirects back with an
//! authorization code, which the application exchanges for a signed
//! identity token describing the outcome.
//!
//! The [`Client`] performs both ends of that exchange:
//!
//! * requests sent to Duo are authenticated with short-lived HS512 client
//!   assertions signed with the client secret
//! * the returned identity token is validated for signature, audience,
//!   issuer, and expiry, and is checked against the expected username
//! * connections to Duo are pinned to a small bundled set of root
//!   certificate authorities unless configured otherwise
//!
//! # Example
//!
//! ```no_run
//! use duo_universal::{Client, StateRef, UsernameRef, AuthorizationCodeRef};
//!
//! # async fn login(
//! #     returned_state: &StateRef,
//! #     returned_code: &AuthorizationCodeRef,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::builder(
//!     "DIXXXXXXXXXXXXXXXXXX",
//!     "deadbeefdeadbeefdeadbeefdeadbeefdeadbeef",
//!     "api-123456.duosecurity.com",
//!     "https://example.com/duo-callback",
//! )
//! .build()?;
//!
//! if !client.health_check().await {
//!     // Duo is unavailable; fail open or closed as policy dictates
//! }
//!
//! let username = UsernameRef::from_str("user@example.com");
//! let state = client.generate_state()?;
//! let redirect_to = client.generate_auth_uri(username, &state)?;
//!
//! // ... redirect the browser, then on the callback:
//!
//! if returned_state != &*state {
//!     return Err("state mismatch".into());
//! }
//!
//! let result = client.exchange_code(returned_code, username).await?;
//! println!("{} authenticated: {:?}", result.username, result.auth_result.result);
//! # Ok(())
//! # }
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

mod braids;
pub mod client;
pub mod config;
pub mod dto;
pub mod error;
pub mod models;
pub mod pinning;
pub mod tls;
pub mod transport;


pub use braids::*;
#[doc(inline)]
pub use client::Client;
#[doc(inline)]
pub use config::{ClientBuilder, ClientConfig, TrustMode};
#[doc(inline)]
pub use error::Error;
#[doc(inline)]
pub use models::IdentityResult;
#[doc(inline)]
pub use pinning::{CertificatePinner, TlsErrors, TrustedRootSet};
#[doc(inline)]
pub use transport::{ReqwestTransport, Transport, TransportResponse};
