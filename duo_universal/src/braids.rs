use std::fmt;

use aliri_braid::braid;

/// Hides a secret behind a label unless formatted with `{:#}`
///
/// `{:#?}` shows at most the first `$reveal` characters, and never the
/// whole value.
macro_rules! redacted {
    ($ty:ty, $label:literal, reveal = $reveal:literal) => {
        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                if f.alternate() {
                    write!(f, "\"{}…\"", prefix(self.as_str(), $reveal))
                } else {
                    f.write_str(concat!("***", $label, "***"))
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                if f.alternate() {
                    f.write_str(self.as_str())
                } else {
                    f.write_str(concat!("***", $label, "***"))
                }
            }
        }
    };
}

fn prefix(value: &str, reveal: usize) -> &str {
    match value.char_indices().nth(reveal) {
        Some((end, _)) => &value[..end],
        None => "",
    }
}

/// The client ID of a Duo Web SDK application
#[braid(serde)]
pub struct ClientId;

/// The client secret of a Duo Web SDK application
#[braid(serde, debug = "owned", display = "owned", ord = "omit")]
pub struct ClientSecret;

redacted!(ClientSecretRef, "CLIENT SECRET", reveal = 4);

/// A username as known to Duo
#[braid(serde)]
pub struct Username;

/// An opaque value correlating an authorization request with its callback
///
/// Comparisons are exact; no normalization of case or whitespace is applied.
#[braid(serde)]
pub struct State;

/// The authorization code returned to the redirect URI
#[braid(serde, debug = "owned", display = "owned", ord = "omit")]
pub struct AuthorizationCode;

redacted!(AuthorizationCodeRef, "AUTHORIZATION CODE", reveal = 4);

/// An OAuth2 access token
#[braid(serde, debug = "owned", display = "owned", ord = "omit")]
pub struct AccessToken;

redacted!(AccessTokenRef, "ACCESS TOKEN", reveal = 8);
