//! Compact HS512 JSON Web Tokens
//!
//! The [`Engine`] mints client assertions and authorization request objects,
//! and validates identity tokens returned by the identity provider. A token
//! is accepted only when:
//!
//! * its header names `HS512` exactly,
//! * its signature verifies under the shared secret,
//! * `nbf` (when present) is not later than `exp`,
//! * the current time lies within `[nbf - leeway, exp + leeway]`,
//! * one of its audiences is the expected audience, and
//! * its issuer is the expected issuer.
//!
//! # Example
//!
//! ```
//! use duo_jose::{jwt, ClaimSet, Engine};
//!
//! let secret = b"a shared secret of forty bytes, exactly!";
//! let issuer = jwt::Issuer::from_static("client id client id ");
//! let audience = jwt::Audience::from_static("https://api.example.com/oauth/v1/token");
//!
//! let engine = Engine::default();
//! let token = engine.sign(&issuer, secret, &audience, ClaimSet::new()).unwrap();
//!
//! let claims = engine.validate(&token, &audience, secret, &issuer).unwrap();
//! assert_eq!(claims.issuer(), Some(&*issuer));
//! ```

use std::{fmt, fmt::Write, sync::Arc, time::Duration};

use aliri_braid::braid;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::{
    claims::{Claim, ClaimSet},
    clock::{Clock, System, UnixTime},
    error,
    jwa::{Algorithm, Hmac},
    random::{RandomSource, SystemRandom},
};

/// Lifetime of a freshly signed token
pub const TOKEN_LIFETIME: Duration = Duration::from_secs(300);

/// Default tolerance for clock drift when checking time claims
pub const DEFAULT_LEEWAY: Duration = Duration::from_secs(300);

/// An audience
#[braid(serde, ref_doc = "A borrowed reference to an [`Audience`]")]
pub struct Audience;

/// An issuer of JWTs
#[braid(serde, ref_doc = "A borrowed reference to an [`Issuer`]")]
pub struct Issuer;

/// The subject of a JWT
#[braid(serde, ref_doc = "A borrowed reference to a [`Subject`]")]
pub struct Subject;

/// A JSON Web Token
///
/// This type provides custom implementations of [`Display`][JwtRef#impl-Display] and
/// [`Debug`][JwtRef#impl-Debug] to prevent unintentional disclosures of sensitive values.
#[braid(
    serde,
    debug = "owned",
    display = "owned",
    ord = "omit",
    ref_doc = "\
    A borrowed reference to a JSON Web Token ([`Jwt`])\n\
    \n\
    This type provides custom implementations of [`Display`][Self#impl-Display] and \
    [`Debug`][Self#impl-Debug] to prevent unintentional disclosures of sensitive values.
    "
)]
#[must_use]
pub struct Jwt;

impl Jwt {
    /// Serializes the header and claims and signs them with the given key
    ///
    /// # Errors
    ///
    /// Returns an error if the header or claims cannot be serialized.
    pub fn try_from_parts(
        headers: &Headers,
        claims: &ClaimSet,
        key: &Hmac,
    ) -> Result<Self, error::Unexpected> {
        let h_raw = serde_json::to_vec(headers).map_err(error::unexpected)?;
        let p_raw = serde_json::to_vec(claims).map_err(error::unexpected)?;

        let mut message = String::with_capacity((h_raw.len() + p_raw.len()) * 4 / 3 + 90);
        write!(
            message,
            "{}.{}",
            URL_SAFE_NO_PAD.encode(h_raw),
            URL_SAFE_NO_PAD.encode(p_raw)
        )
        .expect("writes to strings never fail");

        let s = URL_SAFE_NO_PAD.encode(key.sign(message.as_bytes()));

        write!(message, ".{}", s).expect("writes to strings never fail");

        Ok(Self::new(message))
    }
}

/// Prints `***JWT***` unless the alternate form `{:#?}` is requested, in which
/// case the header and payload are printed and the signature is elided. A
/// width, as in `{:#5?}`, reveals that many characters of the signature.
///
/// ```
/// # use duo_jose::JwtRef;
/// let token = JwtRef::from_str("eyJhbGciOiJIUzUxMiJ9.e30.c2lnbmF0dXJl");
///
/// assert_eq!(format!("{:?}", token), "***JWT***");
/// assert_eq!(format!("{:#?}", token), "\"eyJhbGciOiJIUzUxMiJ9.e30.…\"");
/// assert_eq!(format!("{:#5?}", token), "\"eyJhbGciOiJIUzUxMiJ9.e30.c2ln…\"");
/// ```
impl fmt::Debug for JwtRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if f.alternate() {
            f.write_str("\"")?;
            if let Some(last_period) = self.0.rfind('.') {
                f.write_str(&self.0[..=last_period])?;
                limited_reveal(&self.0[last_period + 1..], &mut *f, 0)?;
            } else {
                limited_reveal(&self.0, &mut *f, 0)?;
            }
            f.write_str("\"")
        } else {
            f.write_str(concat!("***", "JWT", "***"))
        }
    }
}

/// Prints `***JWT***` unless the alternate form `{:#}` is requested, in which
/// case the whole token is printed. A width, as in `{:#10}`, limits how much
/// of the signature is revealed.
impl fmt::Display for JwtRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if f.alternate() {
            if let Some(last_period) = self.0.rfind('.') {
                f.write_str(&self.0[..=last_period])?;
                limited_reveal(&self.0[last_period + 1..], &mut *f, usize::MAX)
            } else {
                limited_reveal(&self.0, &mut *f, usize::MAX)
            }
        } else {
            f.write_str(concat!("***", "JWT", "***"))
        }
    }
}

fn limited_reveal(unprotected: &str, f: &mut fmt::Formatter, default_len: usize) -> fmt::Result {
    let max_len = f.width().unwrap_or(default_len);
    if max_len <= 1 {
        f.write_str("…")
    } else if max_len > unprotected.len() {
        f.write_str(unprotected)
    } else {
        match unprotected.char_indices().nth(max_len - 2) {
            Some((idx, c)) if idx + c.len_utf8() < unprotected.len() => {
                f.write_str(&unprotected[0..idx + c.len_utf8()])?;
                f.write_str("…")
            }
            _ => f.write_str(unprotected),
        }
    }
}

/// The JOSE header of a token
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[must_use]
pub struct Headers {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

impl Headers {
    /// The header attached to every token this crate signs
    pub fn hs512() -> Self {
        Self {
            alg: Algorithm::HS512.as_str().to_owned(),
            typ: Some("JWT".to_owned()),
        }
    }

    /// The algorithm named by the header, verbatim
    #[must_use]
    pub fn alg(&self) -> &str {
        &self.alg
    }

    /// The media type named by the header
    #[must_use]
    pub fn typ(&self) -> Option<&str> {
        self.typ.as_deref()
    }
}

/// A token split into its sections, not yet verified
#[derive(Clone, Debug, PartialEq)]
#[must_use]
pub struct Decomposed<'a> {
    header: Headers,
    message: &'a str,
    claims: ClaimSet,
    signature: Vec<u8>,
}

macro_rules! expect_two {
    ($iter:expr) => {{
        let mut i = $iter;
        match (i.next(), i.next(), i.next()) {
            (Some(first), Some(second), None) => Some((first, second)),
            _ => None,
        }
    }};
}

impl<'a> Decomposed<'a> {
    /// Checks the header algorithm and then the signature
    ///
    /// # Errors
    ///
    /// Returns an error if the header names any algorithm other than `HS512`
    /// or if the signature does not match.
    pub fn verify(self, key: &Hmac) -> Result<ClaimSet, error::ClaimsRejected> {
        if Algorithm::from_header(self.header.alg()).is_none() {
            return Err(error::ClaimsRejected::InvalidAlgorithm(self.header.alg));
        }

        key.verify(self.message.as_bytes(), &self.signature)?;

        Ok(self.claims)
    }

    /// The untrusted header of the JWT
    ///
    /// **WARNING:** *This header has not been validated and should not be trusted.*
    pub fn untrusted_header(&self) -> &Headers {
        &self.header
    }

    /// The untrusted claims of the JWT
    ///
    /// **WARNING:** *These claims have not been validated and should not be trusted.*
    /// An adversary can place arbitrary data into the header and payload of a JWT.
    /// To validate the claims, use [`Engine::validate`].
    pub fn untrusted_claims(&self) -> &ClaimSet {
        &self.claims
    }

    /// The untrusted message of the JWT
    ///
    /// This contains the encoded header and payload of the JWT, separated by a `.`.
    pub fn untrusted_message(&self) -> &'a str {
        self.message
    }

    /// The raw signature of the JWT
    #[must_use]
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }
}

impl JwtRef {
    /// Decomposes the JWT into its parts without verifying it
    ///
    /// # Errors
    ///
    /// Returns an error if the token does not have exactly three base64url
    /// sections, or if the header or payload is not a JSON object.
    pub fn decompose(&self) -> Result<Decomposed<'_>, error::MalformedJwt> {
        let (s_str, message) =
            expect_two!(self.as_str().rsplitn(2, '.')).ok_or_else(error::malformed_jwt)?;
        let (p_str, h_str) =
            expect_two!(message.rsplitn(2, '.')).ok_or_else(error::malformed_jwt)?;

        if h_str.contains('.') {
            return Err(error::malformed_jwt());
        }

        let h_raw = URL_SAFE_NO_PAD
            .decode(h_str)
            .map_err(error::malformed_jwt_section)?;
        let p_raw = URL_SAFE_NO_PAD
            .decode(p_str)
            .map_err(error::malformed_jwt_section)?;
        let signature = URL_SAFE_NO_PAD
            .decode(s_str)
            .map_err(error::malformed_jwt_section)?;

        let header: Headers = serde_json::from_slice(&h_raw).map_err(error::malformed_jwt_section)?;
        let claims: ClaimSet =
            serde_json::from_slice(&p_raw).map_err(error::malformed_jwt_section)?;

        Ok(Decomposed {
            header,
            message,
            claims,
            signature,
        })
    }
}

/// Signs and validates tokens against an injected clock and random source
#[derive(Clone)]
#[must_use]
pub struct Engine {
    clock: Arc<dyn Clock + Send + Sync>,
    rng: Arc<dyn RandomSource + Send + Sync>,
    leeway: Duration,
    lifetime: Duration,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Engine")
            .field("leeway", &self.leeway)
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            clock: Arc::new(System),
            rng: Arc::new(SystemRandom::new()),
            leeway: DEFAULT_LEEWAY,
            lifetime: TOKEN_LIFETIME,
        }
    }
}

impl Engine {
    /// Reads the current time from `clock`
    #[inline]
    pub fn with_clock(self, clock: impl Clock + Send + Sync + 'static) -> Self {
        Self {
            clock: Arc::new(clock),
            ..self
        }
    }

    /// Draws nonces from `rng`
    #[inline]
    pub fn with_random_source(self, rng: impl RandomSource + Send + Sync + 'static) -> Self {
        Self {
            rng: Arc::new(rng),
            ..self
        }
    }

    /// Sets the tolerance applied to `exp` and `nbf`
    #[inline]
    pub fn with_leeway(self, leeway: Duration) -> Self {
        Self { leeway, ..self }
    }

    /// The tolerance applied to `exp` and `nbf`
    #[must_use]
    pub fn leeway(&self) -> Duration {
        self.leeway
    }

    /// The source used for nonces
    #[must_use]
    pub fn random_source(&self) -> &(dyn RandomSource + Send + Sync) {
        &*self.rng
    }

    /// The current time according to the engine's clock
    #[must_use]
    pub fn now(&self) -> UnixTime {
        self.clock.now()
    }

    /// Builds a claim set and signs it
    ///
    /// `iss`, `aud`, and a fresh `jti` are filled in, followed by `extra`.
    /// Then `iat` and `nbf` are set to now and `exp` to five minutes later,
    /// unless `extra` already provided them.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the issuer or audience is blank or the
    /// secret is shorter than 16 bytes.
    pub fn sign(
        &self,
        issuer: &IssuerRef,
        secret: &[u8],
        audience: &AudienceRef,
        extra: ClaimSet,
    ) -> Result<Jwt, error::JwtSigningError> {
        if issuer.as_str().trim().is_empty() {
            return Err(error::invalid_argument("issuer must not be blank").into());
        }

        if audience.as_str().trim().is_empty() {
            return Err(error::invalid_argument("audience must not be blank").into());
        }

        let key = Hmac::new(secret)
            .map_err(|_| error::invalid_argument("secret must be at least 16 bytes"))?;

        let claims = ClaimSet::build(issuer, audience, extra, &*self.rng)?;

        self.sign_claims(claims, &key)
    }

    /// Signs an already assembled claim set, filling in any missing time claims
    ///
    /// # Errors
    ///
    /// Returns an error if the claims cannot be serialized.
    pub fn sign_claims(&self, mut claims: ClaimSet, key: &Hmac) -> Result<Jwt, error::JwtSigningError> {
        let now = self.clock.now();

        claims.insert_if_absent(Claim::IssuedAt, now.0);
        claims.insert_if_absent(Claim::NotBefore, now.0);
        claims.insert_if_absent(
            Claim::Expiration,
            now.saturating_add(self.lifetime.as_secs()).0,
        );

        Ok(Jwt::try_from_parts(&Headers::hs512(), &claims, key)?)
    }

    /// Verifies a token and returns its claims
    ///
    /// # Errors
    ///
    /// * `SecretTooShort` if the secret is shorter than 16 bytes
    /// * `Malformed` if the token cannot be split and decoded
    /// * `ValidationFailed` if the algorithm, signature, time window,
    ///   audience, or issuer is unacceptable
    pub fn validate(
        &self,
        token: &JwtRef,
        expected_audience: &AudienceRef,
        secret: &[u8],
        expected_issuer: &IssuerRef,
    ) -> Result<ClaimSet, error::JwtValidationError> {
        let key = Hmac::new(secret)?;

        token
            .decompose()?
            .verify(&key)
            .and_then(|claims| {
                self.check_claims(&claims, expected_audience, expected_issuer)?;
                Ok(claims)
            })
            .map_err(|cause| {
                tracing::debug!(%cause, "token rejected");
                cause.into()
            })
    }

    fn check_claims(
        &self,
        claims: &ClaimSet,
        expected_audience: &AudienceRef,
        expected_issuer: &IssuerRef,
    ) -> Result<(), error::ClaimsRejected> {
        let now = self.clock.now();
        let leeway = self.leeway.as_secs();

        let exp = time_claim(claims, Claim::Expiration)?
            .ok_or(error::ClaimsRejected::MissingRequiredClaim("exp"))?;
        let nbf = time_claim(claims, Claim::NotBefore)?;

        if let Some(nbf) = nbf {
            if nbf > exp {
                return Err(error::ClaimsRejected::InvertedValidityWindow);
            }

            if nbf.0 > now.0.saturating_add(leeway) {
                return Err(error::ClaimsRejected::TokenNotYetValid);
            }
        }

        if exp.0 < now.0.saturating_sub(leeway) {
            return Err(error::ClaimsRejected::TokenExpired);
        }

        if claims.get(Claim::Audience).is_none() {
            return Err(error::ClaimsRejected::MissingRequiredClaim("aud"));
        }

        if !claims.audiences().any(|a| a == expected_audience) {
            return Err(error::ClaimsRejected::InvalidAudience);
        }

        match claims.issuer() {
            Some(iss) if iss == expected_issuer => Ok(()),
            Some(_) => Err(error::ClaimsRejected::InvalidIssuer),
            None => Err(error::ClaimsRejected::MissingRequiredClaim("iss")),
        }
    }
}

/// Reads a time claim, rejecting one that is present but not a
/// non-negative integer
fn time_claim(
    claims: &ClaimSet,
    claim: Claim,
) -> Result<Option<UnixTime>, error::ClaimsRejected> {
    match (claims.contains(claim), claims.get_time(claim)) {
        (true, None) => Err(error::ClaimsRejected::InvalidClaim(claim.as_str())),
        (_, time) => Ok(time),
    }
}

/// Signs a token using the system clock and random source
///
/// # Errors
///
/// See [`Engine::sign`].
pub fn sign(
    issuer: &IssuerRef,
    secret: &[u8],
    audience: &AudienceRef,
    extra: ClaimSet,
) -> Result<Jwt, error::JwtSigningError> {
    Engine::default().sign(issuer, secret, audience, extra)
}

/// Validates a token using the system clock and the default leeway
///
/// # Errors
///
/// See [`Engine::validate`].
pub fn validate(
    token: &JwtRef,
    expected_audience: &AudienceRef,
    secret: &[u8],
    expected_issuer: &IssuerRef,
) -> Result<ClaimSet, error::JwtValidationError> {
    Engine::default().validate(token, expected_audience, secret, expected_issuer)
}
