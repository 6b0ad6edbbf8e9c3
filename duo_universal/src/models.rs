//! The decoded result of a completed authentication
//!
//! These structures mirror the claims of the identity token. Loosely typed
//! values are kept as [`serde_json::Value`], and unrecognized fields of the
//! authentication context are preserved, so that nothing the identity
//! provider sends is lost.

use duo_jose::UnixTime;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::Username;

/// The outcome of a two-factor authentication, taken from a validated
/// identity token
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IdentityResult {
    /// The issuer of the identity token
    pub iss: String,

    /// The audiences of the identity token, joined with `,`
    #[serde(deserialize_with = "join_audiences")]
    pub aud: String,

    /// The subject of the identity token
    pub sub: String,

    /// When the identity token was issued
    pub iat: UnixTime,

    /// When the identity token expires
    pub exp: UnixTime,

    /// When the user authenticated
    pub auth_time: UnixTime,

    /// The user who authenticated
    #[serde(rename = "preferred_username")]
    pub username: Username,

    /// The nonce of the authorization request, if one was sent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// Details of the authentication
    pub auth_context: AuthContext,

    /// The result of the authentication
    pub auth_result: AuthResult,
}

fn join_audiences<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Audiences {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Audiences::deserialize(deserializer)? {
        Audiences::One(aud) => aud,
        Audiences::Many(auds) => auds.join(","),
    })
}

/// Details of an authentication
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthContext {
    /// The device used to access the application
    pub access_device: Option<AccessDevice>,
    /// The username alias used
    pub alias: Option<String>,
    /// The application being accessed
    pub application: Option<Application>,
    /// The device used to approve the authentication
    pub auth_device: Option<AuthDevice>,
    /// The user's email address
    pub email: Option<String>,
    /// The type of event
    pub event_type: Option<String>,
    /// The authentication factor used
    pub factor: Option<String>,
    /// The time of the event as an ISO 8601 string
    pub isotimestamp: Option<String>,
    /// Out-of-date software detected on the access device
    pub ood_software: Option<Value>,
    /// The reason for the result
    pub reason: Option<String>,
    /// The result of the authentication
    pub result: Option<String>,
    /// The time of the event in seconds since the epoch
    pub timestamp: Option<i64>,
    /// The trusted endpoint status of the access device
    pub trusted_endpoint_status: Option<String>,
    /// The transaction ID
    pub txid: Option<String>,
    /// The user who authenticated
    pub user: Option<User>,
    /// Any fields not listed above
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The device used to access the application
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessDevice {
    /// The browser name
    pub browser: Option<String>,
    /// The browser version
    pub browser_version: Option<String>,
    /// The Flash plugin version
    pub flash_version: Option<String>,
    /// The host name
    pub hostname: Option<String>,
    /// The IP address
    pub ip: Option<String>,
    /// Whether disk encryption is enabled, or `"unknown"`
    pub is_encryption_enabled: Option<Value>,
    /// Whether a firewall is enabled, or `"unknown"`
    pub is_firewall_enabled: Option<Value>,
    /// Whether a password is set, or `"unknown"`
    pub is_password_set: Option<Value>,
    /// The Java plugin version
    pub java_version: Option<String>,
    /// The location of the device
    pub location: Option<Location>,
    /// The operating system
    pub os: Option<String>,
    /// The operating system version
    pub os_version: Option<String>,
    /// Security agents detected on the device
    pub security_agents: Option<Value>,
}

/// A geographic location
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Location {
    /// The city
    pub city: Option<String>,
    /// The country
    pub country: Option<String>,
    /// The state or region
    pub state: Option<String>,
}

/// The application being accessed
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Application {
    /// The Duo key
    pub key: Option<String>,
    /// The name
    pub name: Option<String>,
}

/// The device used to approve the authentication
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthDevice {
    /// The IP address
    pub ip: Option<String>,
    /// The location of the device
    pub location: Option<Location>,
    /// The name
    pub name: Option<String>,
}

/// A Duo user
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    /// The groups the user belongs to
    pub groups: Vec<String>,
    /// The Duo key
    pub key: Option<String>,
    /// The name
    pub name: Option<String>,
}

/// The result of an authentication
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthResult {
    /// `allow` or `deny`
    pub result: Option<String>,
    /// A machine readable status
    pub status: Option<String>,
    /// A human readable status
    pub status_msg: Option<String>,
}
