//! Certificate verifiers that plug the pinner into rustls

use std::sync::Arc;

use rustls::{
    client::{
        danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
        WebPkiServerVerifier,
    },
    crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider},
    pki_types::{CertificateDer, ServerName, UnixTime},
    CertificateError, DigitallySignedStruct, RootCertStore, SignatureScheme,
};

use crate::{
    error,
    pinning::{CertificateChain, CertificatePinner, TlsErrors, TrustedRootSet},
};

/// Builds the TLS configuration enforcing `pinner`
pub(crate) fn client_config(
    pinner: &CertificatePinner,
) -> Result<rustls::ClientConfig, error::InvalidConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let verifier: Arc<dyn ServerCertVerifier> = match pinner {
        CertificatePinner::Pinned(roots) => Arc::new(PinnedServerVerifier::new(
            roots.clone(),
            Arc::clone(&provider),
        )?),
        CertificatePinner::Disabled => Arc::new(DisabledVerifier::new(Arc::clone(&provider))),
    };

    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| error::invalid_config_from("unsupported TLS protocol versions", e))?
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth();

    Ok(config)
}

/// Standard WebPKI verification followed by certificate pinning
///
/// The WebPKI trust anchors are the Mozilla roots together with the pinned
/// roots, so that a pinned private root can still pass standard validation.
#[derive(Debug)]
pub struct PinnedServerVerifier {
    inner: Arc<WebPkiServerVerifier>,
    roots: TrustedRootSet,
    pinner: CertificatePinner,
}

impl PinnedServerVerifier {
    /// Constructs a verifier pinned to `roots`
    ///
    /// # Errors
    ///
    /// Returns an error if no usable trust anchors remain.
    pub fn new(
        roots: TrustedRootSet,
        provider: Arc<CryptoProvider>,
    ) -> Result<Self, error::InvalidConfig> {
        let mut anchors = RootCertStore::empty();
        anchors.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let (added, ignored) = anchors.add_parsable_certificates(roots.iter().cloned());
        tracing::trace!(added, ignored, "added pinned roots to trust anchors");

        let inner = WebPkiServerVerifier::builder_with_provider(Arc::new(anchors), provider)
            .build()
            .map_err(|e| error::invalid_config_from("unable to construct certificate verifier", e))?;

        Ok(Self {
            inner,
            pinner: CertificatePinner::pin(roots.clone()),
            roots,
        })
    }
}

impl ServerCertVerifier for PinnedServerVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let outcome = self.inner.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        );

        let errors = match &outcome {
            Ok(_) => TlsErrors::NONE,
            Err(rustls::Error::InvalidCertificate(CertificateError::NotValidForName)) => {
                TlsErrors::REMOTE_CERTIFICATE_NAME_MISMATCH
            }
            Err(_) => TlsErrors::REMOTE_CERTIFICATE_CHAIN_ERRORS,
        };

        let chain = CertificateChain::assemble(
            end_entity,
            intermediates,
            &self.roots,
            duo_jose::UnixTime(now.as_secs()),
        );

        if self.pinner.validate(Some(end_entity), Some(&chain), errors) {
            outcome
        } else {
            tracing::warn!(?server_name, ?errors, "server certificate rejected");
            Err(outcome.err().unwrap_or(rustls::Error::InvalidCertificate(
                CertificateError::ApplicationVerificationFailure,
            )))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// Accepts any server certificate
///
/// Handshake signatures are still checked against the presented key.
#[derive(Debug)]
pub struct DisabledVerifier {
    provider: Arc<CryptoProvider>,
    pinner: CertificatePinner,
}

impl DisabledVerifier {
    /// Constructs a verifier that performs no certificate validation
    #[must_use]
    pub fn new(provider: Arc<CryptoProvider>) -> Self {
        tracing::warn!("SSL certificate validation is disabled; never use this in production");

        Self {
            provider,
            pinner: CertificatePinner::disable_pinning(),
        }
    }
}

impl ServerCertVerifier for DisabledVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        if self.pinner.validate(Some(end_entity), None, TlsErrors::NONE) {
            Ok(ServerCertVerified::assertion())
        } else {
            Err(rustls::Error::InvalidCertificate(
                CertificateError::ApplicationVerificationFailure,
            ))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use color_eyre::Result;
    use tracing_test::traced_test;

    use super::*;
    use crate::test;

    fn at(now: duo_jose::UnixTime) -> UnixTime {
        UnixTime::since_unix_epoch(Duration::from_secs(now.0))
    }

    fn pinned_verifier(roots: TrustedRootSet) -> Result<PinnedServerVerifier> {
        Ok(PinnedServerVerifier::new(
            roots,
            Arc::new(rustls::crypto::ring::default_provider()),
        )?)
    }

    #[test]
    fn pinned_duo_chain_is_verified() -> Result<()> {
        let verifier = pinned_verifier(TrustedRootSet::duo_default()?)?;
        let name = ServerName::try_from("api-123456.duosecurity.com")?;

        verifier.verify_server_cert(
            &test::duo_api_server(),
            &[test::duo_api_intermediate()],
            &name,
            &[],
            at(test::DUO_CHAIN_VALID_AT),
        )?;
        Ok(())
    }

    #[test]
    fn wrong_host_is_rejected() -> Result<()> {
        let verifier = pinned_verifier(TrustedRootSet::duo_default()?)?;
        let name = ServerName::try_from("www.example.com")?;

        let result = verifier.verify_server_cert(
            &test::duo_api_server(),
            &[test::duo_api_intermediate()],
            &name,
            &[],
            at(test::DUO_CHAIN_VALID_AT),
        );

        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn unpinned_chain_is_rejected() -> Result<()> {
        let verifier = pinned_verifier(TrustedRootSet::duo_default()?)?;
        let name = ServerName::try_from("www.microsoft.com")?;

        let result = verifier.verify_server_cert(
            &test::microsoft_com_server(),
            &[test::microsoft_com_intermediate()],
            &name,
            &[],
            at(test::MICROSOFT_CHAIN_VALID_AT),
        );

        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn expired_chain_is_rejected() -> Result<()> {
        let verifier = pinned_verifier(TrustedRootSet::duo_default()?)?;
        let name = ServerName::try_from("api-123456.duosecurity.com")?;

        let result = verifier.verify_server_cert(
            &test::duo_api_server(),
            &[test::duo_api_intermediate()],
            &name,
            &[],
            at(test::AFTER_DUO_LEAF_EXPIRED),
        );

        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn disabled_verifier_accepts_anything() -> Result<()> {
        let verifier = DisabledVerifier::new(Arc::new(rustls::crypto::ring::default_provider()));
        let name = ServerName::try_from("www.example.com")?;

        verifier.verify_server_cert(
            &CertificateDer::from(vec![1, 2, 3]),
            &[],
            &name,
            &[],
            at(test::AFTER_DUO_LEAF_EXPIRED),
        )?;
        assert!(!verifier.supported_verify_schemes().is_empty());
        Ok(())
    }

    #[test]
    #[traced_test]
    fn disabling_validation_is_logged() -> Result<()> {
        client_config(&CertificatePinner::disable_pinning())?;

        assert!(logs_contain("SSL certificate validation is disabled"));
        Ok(())
    }

    #[test]
    fn pinned_configuration_builds() -> Result<()> {
        let config = client_config(&CertificatePinner::pin(TrustedRootSet::duo_default()?))?;

        assert!(config.alpn_protocols.is_empty());
        Ok(())
    }
}
