//! Certificate pinning
//!
//! Pinning narrows the set of servers the client will talk to. It runs only
//! after standard chain, hostname, and expiry validation, and it accepts a
//! connection only when the presented chain terminates at one of a closed set
//! of trusted roots.
//!
//! The default set is bundled with the crate in `data/ca_certs.pem` and is
//! parsed once, on first use.

use std::{fmt, ops, sync::Arc};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use duo_jose::UnixTime;
use once_cell::sync::Lazy;
use rustls::pki_types::CertificateDer;
use thiserror::Error;
use x509_parser::{certificate::X509Certificate, parse_x509_certificate};

const BUNDLE_DELIMITER: &str = "-----DUO_CERT-----";
const PEM_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_END: &str = "-----END CERTIFICATE-----";

static DUO_DEFAULT_ROOTS: Lazy<Result<TrustedRootSet, BundleError>> =
    Lazy::new(|| TrustedRootSet::from_bundle(include_str!("../data/ca_certs.pem")));

/// Errors reported by the TLS stack before pinning is considered
///
/// Any flag other than [`NONE`][Self::NONE] causes the pinner to reject the
/// connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TlsErrors(u8);

impl TlsErrors {
    /// No errors
    pub const NONE: Self = Self(0);

    /// The server did not present a certificate
    pub const REMOTE_CERTIFICATE_NOT_AVAILABLE: Self = Self(1);

    /// The certificate does not match the requested host name
    pub const REMOTE_CERTIFICATE_NAME_MISMATCH: Self = Self(1 << 1);

    /// The certificate chain could not be validated
    pub const REMOTE_CERTIFICATE_CHAIN_ERRORS: Self = Self(1 << 2);

    /// Whether no errors are set
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether every error in `other` is set
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl ops::BitOr for TlsErrors {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl ops::BitOrAssign for TlsErrors {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// The status of a single element in a certificate chain
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChainStatus {
    /// No problems were found
    NoError,
    /// The current time is outside the certificate's validity period
    NotTimeValid,
    /// The certificate is not signed by the next certificate in the chain
    NotSignatureValid,
    /// The chain ends at a certificate that is not self-issued
    PartialChain,
    /// The certificate could not be parsed
    Unparseable,
}

/// A single element of a [`CertificateChain`]
#[derive(Clone, Debug)]
pub struct ChainElement {
    certificate: CertificateDer<'static>,
    status: ChainStatus,
}

impl ChainElement {
    /// The DER encoded certificate
    #[must_use]
    pub fn certificate(&self) -> &CertificateDer<'static> {
        &self.certificate
    }

    /// The status of this element
    #[must_use]
    pub fn status(&self) -> ChainStatus {
        self.status
    }
}

/// A certificate chain, ordered from the end entity toward the root
#[derive(Clone, Debug)]
pub struct CertificateChain {
    elements: Vec<ChainElement>,
}

impl CertificateChain {
    /// Builds a chain from the certificates a server presented
    ///
    /// Starting at `end_entity`, the issuer of each certificate is looked up
    /// among the unused `intermediates` and then among `roots`, regardless of
    /// the order they were presented in. Presented certificates that are not
    /// on the path are dropped. The chain stops at a self-issued certificate
    /// or when no issuer can be found. Each element is then checked for time
    /// validity at `now` and for a signature by the element after it.
    #[must_use]
    pub fn assemble(
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        roots: &TrustedRootSet,
        now: UnixTime,
    ) -> Self {
        let mut used = vec![false; intermediates.len()];
        let mut certificates = vec![end_entity.clone().into_owned()];

        loop {
            let next = {
                let Some(current) = certificates.last().and_then(parse) else {
                    break;
                };

                if is_self_issued(&current) {
                    break;
                }

                if let Some(index) = find_issuer(&current, intermediates, |i| !used[i]) {
                    used[index] = true;
                    intermediates[index].clone().into_owned()
                } else if let Some(index) = find_issuer(&current, &roots.roots, |i| {
                    !certificates
                        .iter()
                        .any(|c| c.as_ref() == roots.roots[i].as_ref())
                }) {
                    roots.roots[index].clone()
                } else {
                    break;
                }
            };

            certificates.push(next);
        }

        let statuses = {
            let parsed: Vec<_> = certificates.iter().map(parse).collect();
            let now = i64::try_from(now.0).unwrap_or(i64::MAX);

            (0..parsed.len())
                .map(|i| element_status(parsed[i].as_ref(), parsed.get(i + 1), now))
                .collect::<Vec<_>>()
        };

        Self {
            elements: certificates
                .into_iter()
                .zip(statuses)
                .map(|(certificate, status)| ChainElement {
                    certificate,
                    status,
                })
                .collect(),
        }
    }

    /// The elements of the chain
    #[must_use]
    pub fn elements(&self) -> &[ChainElement] {
        &self.elements
    }

    /// The terminal element of the chain
    #[must_use]
    pub fn root(&self) -> Option<&ChainElement> {
        self.elements.last()
    }
}

fn element_status(
    cert: Option<&X509Certificate>,
    issuer: Option<&Option<X509Certificate>>,
    now: i64,
) -> ChainStatus {
    let Some(cert) = cert else {
        return ChainStatus::Unparseable;
    };

    let validity = cert.validity();
    if now < validity.not_before.timestamp() || validity.not_after.timestamp() < now {
        return ChainStatus::NotTimeValid;
    }

    match issuer {
        Some(Some(issuer)) if cert.issuer().as_raw() == issuer.subject().as_raw() => {
            if cert.verify_signature(Some(issuer.public_key())).is_ok() {
                ChainStatus::NoError
            } else {
                ChainStatus::NotSignatureValid
            }
        }
        Some(_) => ChainStatus::NotSignatureValid,
        None if is_self_issued(cert) => ChainStatus::NoError,
        None => ChainStatus::PartialChain,
    }
}

/// Finds the usable candidate that issued `cert`
///
/// A candidate whose signature over `cert` verifies wins over one that only
/// matches by name, so a mismatched signature is still reported against the
/// right element.
fn find_issuer(
    cert: &X509Certificate<'_>,
    candidates: &[CertificateDer<'_>],
    usable: impl Fn(usize) -> bool,
) -> Option<usize> {
    let mut by_name = None;

    for (index, candidate) in candidates.iter().enumerate() {
        if !usable(index) {
            continue;
        }

        let Some(candidate) = parse(candidate) else {
            continue;
        };

        if candidate.subject().as_raw() != cert.issuer().as_raw() {
            continue;
        }

        if cert.verify_signature(Some(candidate.public_key())).is_ok() {
            return Some(index);
        }

        by_name.get_or_insert(index);
    }

    by_name
}

fn parse<'a>(der: &'a CertificateDer<'_>) -> Option<X509Certificate<'a>> {
    parse_x509_certificate(der.as_ref())
        .ok()
        .map(|(_, cert)| cert)
}

fn is_self_issued(cert: &X509Certificate) -> bool {
    cert.issuer().as_raw() == cert.subject().as_raw()
}

/// A trusted root certificate bundle could not be loaded
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BundleError {
    /// A segment of the bundle is not valid base64
    #[error("root certificate {index} is not valid base64")]
    Base64 {
        /// The position of the certificate within the bundle
        index: usize,
        /// The underlying decoding error
        #[source]
        source: base64::DecodeError,
    },

    /// A segment of the bundle is not an X.509 certificate
    #[error("root certificate {index} is not a valid X.509 certificate")]
    Certificate {
        /// The position of the certificate within the bundle
        index: usize,
    },

    /// The bundle contains no certificates
    #[error("root certificate bundle is empty")]
    Empty,
}

/// An immutable set of trusted root certificates
///
/// Cloning the set is cheap; the certificates are shared.
#[derive(Clone)]
pub struct TrustedRootSet {
    roots: Arc<[CertificateDer<'static>]>,
}

impl fmt::Debug for TrustedRootSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TrustedRootSet")
            .field("len", &self.roots.len())
            .finish()
    }
}

impl TrustedRootSet {
    /// The root certificates bundled with this crate
    ///
    /// # Errors
    ///
    /// Returns an error if the bundled certificates cannot be parsed.
    pub fn duo_default() -> Result<Self, BundleError> {
        DUO_DEFAULT_ROOTS.clone()
    }

    /// Parses a bundle of certificates separated by `-----DUO_CERT-----` lines
    ///
    /// Each segment may be bare base64 encoded DER or a PEM block. Text
    /// outside of a PEM block and blank segments are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if a segment cannot be decoded or parsed, or if the
    /// bundle holds no certificates at all.
    pub fn from_bundle(bundle: &str) -> Result<Self, BundleError> {
        let roots = bundle
            .split(BUNDLE_DELIMITER)
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .enumerate()
            .map(|(index, segment)| {
                let b64: String = strip_pem_armor(segment)
                    .chars()
                    .filter(|c| !c.is_ascii_whitespace())
                    .collect();

                STANDARD
                    .decode(b64)
                    .map(CertificateDer::from)
                    .map_err(|source| BundleError::Base64 { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::from_der(roots)
    }

    /// Builds a set from DER encoded certificates
    ///
    /// # Errors
    ///
    /// Returns an error if a certificate cannot be parsed or if no
    /// certificates are given.
    pub fn from_der(
        roots: impl IntoIterator<Item = CertificateDer<'static>>,
    ) -> Result<Self, BundleError> {
        let roots: Vec<_> = roots.into_iter().collect();

        if roots.is_empty() {
            return Err(BundleError::Empty);
        }

        if let Some(index) = roots.iter().position(|r| parse(r).is_none()) {
            return Err(BundleError::Certificate { index });
        }

        Ok(Self {
            roots: roots.into(),
        })
    }

    /// Whether a certificate byte-for-byte equal to `cert` is in the set
    #[must_use]
    pub fn contains(&self, cert: &CertificateDer<'_>) -> bool {
        self.roots.iter().any(|r| r.as_ref() == cert.as_ref())
    }

    /// The number of certificates in the set
    #[must_use]
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    /// Whether the set is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Iterates over the certificates in the set
    pub fn iter(&self) -> impl Iterator<Item = &CertificateDer<'static>> {
        self.roots.iter()
    }
}

fn strip_pem_armor(segment: &str) -> &str {
    match segment.find(PEM_BEGIN) {
        Some(start) => {
            let body = &segment[start + PEM_BEGIN.len()..];
            body.find(PEM_END).map_or(body, |end| &body[..end])
        }
        None => segment,
    }
}

/// Decides whether a presented certificate chain is trustworthy
#[derive(Clone, Debug)]
pub enum CertificatePinner {
    /// Accept only chains rooted at one of these certificates
    Pinned(TrustedRootSet),

    /// Accept every chain
    ///
    /// Only suitable for local testing against a server without a
    /// publicly trusted certificate.
    Disabled,
}

impl CertificatePinner {
    /// Pins connections to the given roots
    #[must_use]
    pub fn pin(roots: TrustedRootSet) -> Self {
        Self::Pinned(roots)
    }

    /// Accepts every connection
    #[must_use]
    pub fn disable_pinning() -> Self {
        Self::Disabled
    }

    /// The pinned roots, unless pinning is disabled
    #[must_use]
    pub fn trusted_roots(&self) -> Option<&TrustedRootSet> {
        match self {
            Self::Pinned(roots) => Some(roots),
            Self::Disabled => None,
        }
    }

    /// Decides whether to accept a connection
    ///
    /// A pinned validator accepts only when a certificate and a chain are
    /// present, `errors` is empty, every chain element is free of errors,
    /// the root's self-signature verifies, and the root is one of the pinned
    /// certificates.
    #[must_use]
    pub fn validate(
        &self,
        certificate: Option<&CertificateDer<'_>>,
        chain: Option<&CertificateChain>,
        errors: TlsErrors,
    ) -> bool {
        let roots = match self {
            Self::Pinned(roots) => roots,
            Self::Disabled => return true,
        };

        let (Some(_), Some(chain)) = (certificate, chain) else {
            tracing::debug!("certificate or chain missing");
            return false;
        };

        if !errors.is_empty() {
            tracing::debug!(?errors, "TLS errors reported");
            return false;
        }

        if let Some(element) = chain
            .elements()
            .iter()
            .find(|e| e.status() != ChainStatus::NoError)
        {
            tracing::debug!(status = ?element.status(), "chain element rejected");
            return false;
        }

        let Some(root) = chain.root() else {
            tracing::debug!("chain is empty");
            return false;
        };

        let self_signed = parse(root.certificate())
            .is_some_and(|cert| cert.verify_signature(None).is_ok());

        if !self_signed {
            tracing::debug!("root self-signature does not verify");
            return false;
        }

        if !roots.contains(root.certificate()) {
            tracing::debug!("chain root is not pinned");
            return false;
        }

        true
    }
}
