//! DTOs for interacting with the Duo OAuth endpoints

use duo_jose::{Jwt, JwtRef};
use serde::Deserialize;
use serde_json::Value;

use crate::{AccessToken, AuthorizationCodeRef, ClientIdRef};

/// The `client_assertion_type` of a signed client assertion
pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// The `grant_type` used when exchanging an authorization code
pub const GRANT_TYPE_AUTHORIZATION_CODE: &str = "authorization_code";

/// A health check request, authenticated by a client assertion
#[derive(Clone, Copy, Debug)]
pub struct HealthCheckRequest<'a> {
    /// The client ID
    pub client_id: &'a ClientIdRef,

    /// A client assertion addressed to the health check endpoint
    pub client_assertion: &'a JwtRef,
}

impl<'a> HealthCheckRequest<'a> {
    /// The request as form fields
    #[must_use]
    pub fn form(&self) -> [(&'static str, &'a str); 2] {
        [
            ("client_id", self.client_id.as_str()),
            ("client_assertion", self.client_assertion.as_str()),
        ]
    }
}

/// A request to exchange an authorization code for an identity token
#[derive(Clone, Copy, Debug)]
pub struct TokenRequest<'a> {
    /// The authorization code received at the redirect URI
    pub code: &'a AuthorizationCodeRef,

    /// The client ID
    pub client_id: &'a ClientIdRef,

    /// A client assertion addressed to the token endpoint
    pub client_assertion: &'a JwtRef,

    /// The redirect URI used in the authorization request
    pub redirect_uri: &'a str,
}

impl<'a> TokenRequest<'a> {
    /// The request as form fields
    #[must_use]
    pub fn form(&self) -> [(&'static str, &'a str); 6] {
        [
            ("code", self.code.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_assertion", self.client_assertion.as_str()),
            ("client_assertion_type", CLIENT_ASSERTION_TYPE),
            ("grant_type", GRANT_TYPE_AUTHORIZATION_CODE),
            ("redirect_uri", self.redirect_uri),
        ]
    }
}

/// The response of the health check endpoint
///
/// A failing response carries its details at the top level rather than
/// under `response`.
#[derive(Clone, Debug, Deserialize)]
pub struct HealthCheckResponse {
    /// `OK` when the service is healthy
    pub stat: String,

    /// Details of a healthy response
    #[serde(default)]
    pub response: Option<HealthCheckDetail>,

    /// The error code of a failing response
    #[serde(default)]
    pub code: Option<Value>,

    /// The server time of a failing response
    #[serde(default)]
    pub timestamp: Option<Value>,

    /// The error message of a failing response
    #[serde(default)]
    pub message: Option<String>,

    /// Further detail on the error of a failing response
    #[serde(default)]
    pub message_detail: Option<String>,
}

impl HealthCheckResponse {
    /// Whether the service reported itself healthy
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.stat == "OK"
    }
}

/// Details attached to a health check response
#[derive(Clone, Debug, Deserialize)]
pub struct HealthCheckDetail {
    /// The server time
    #[serde(default)]
    pub timestamp: Option<Value>,

    /// An error code
    #[serde(default)]
    pub code: Option<Value>,

    /// An error message
    #[serde(default)]
    pub message: Option<String>,

    /// Further detail on the error
    #[serde(default)]
    pub message_detail: Option<String>,
}

/// The response of the token endpoint
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    /// The signed identity token
    pub id_token: Jwt,

    /// An access token
    #[serde(default)]
    pub access_token: Option<AccessToken>,

    /// The type of the access token
    #[serde(default)]
    pub token_type: Option<String>,

    /// The lifetime of the access token, as sent by the server
    #[serde(default)]
    pub expires_in: Option<Value>,
}
