//! HTTP transport used to reach the identity provider

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{header::HeaderValue, Url};

use crate::error::{self, TransportError};

/// Sends form-encoded requests to the identity provider
///
/// The default implementation is [`ReqwestTransport`]. Embedders and tests
/// may provide their own.
#[async_trait]
pub trait Transport: fmt::Debug + Send + Sync {
    /// POSTs `form` as `application/x-www-form-urlencoded` to `url`
    ///
    /// Responses with any status are returned; interpreting the status is
    /// the caller's responsibility.
    async fn post_form(
        &self,
        url: &Url,
        form: &[(&str, &str)],
    ) -> Result<TransportResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn post_form(
        &self,
        url: &Url,
        form: &[(&str, &str)],
    ) -> Result<TransportResponse, TransportError> {
        T::post_form(self, url, form).await
    }
}

/// The status and body of a response
#[derive(Clone, PartialEq, Eq)]
pub struct TransportResponse {
    status: u16,
    body: Vec<u8>,
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("body_len", &self.body.len())
            .finish()
    }
}

impl TransportResponse {
    /// Constructs a response
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// The HTTP status code
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// The raw response body
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The response body as text, with invalid UTF-8 replaced
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Whether the status is in the 2xx range
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A [`Transport`] backed by a [`reqwest::Client`]
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Uses an already configured client
    ///
    /// The client's TLS settings are used as given; no certificate pinning
    /// is added.
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub(crate) fn configured(
        tls: rustls::ClientConfig,
        user_agent: HeaderValue,
        timeout: Duration,
        proxy: Option<&Url>,
    ) -> Result<Self, error::InvalidConfig> {
        let mut builder = reqwest::Client::builder()
            .use_preconfigured_tls(tls)
            .user_agent(user_agent)
            .timeout(timeout);

        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(proxy.clone())
                .map_err(|e| error::invalid_config_from("invalid proxy", e))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| error::invalid_config_from("unable to construct HTTP client", e))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[tracing::instrument(err, skip(self, form), fields(url = %url))]
    async fn post_form(
        &self,
        url: &Url,
        form: &[(&str, &str)],
    ) -> Result<TransportResponse, TransportError> {
        tracing::trace!("sending request to identity provider");

        let resp = self
            .client
            .post(url.clone())
            .form(form)
            .send()
            .await
            .map_err(TransportError::RequestSend)?;

        let status = resp.status().as_u16();

        tracing::debug!(
            response.status = status,
            "received response from identity provider"
        );

        let body = resp.bytes().await.map_err(TransportError::BodyRead)?;

        Ok(TransportResponse::new(status, body.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_is_2xx() {
        assert!(TransportResponse::new(200, "").is_success());
        assert!(TransportResponse::new(204, "").is_success());
        assert!(!TransportResponse::new(199, "").is_success());
        assert!(!TransportResponse::new(301, "").is_success());
        assert!(!TransportResponse::new(500, "").is_success());
    }

    #[test]
    fn text_is_lossy() {
        let resp = TransportResponse::new(400, vec![b'o', b'k', 0xff]);
        assert_eq!(resp.text(), "ok\u{fffd}");
    }

    #[test]
    fn debug_omits_body() {
        let resp = TransportResponse::new(200, "secret");
        assert_eq!(
            format!("{:?}", resp),
            "TransportResponse { status: 200, body_len: 6 }"
        );
    }

    #[tokio::test]
    async fn unreachable_host_is_a_send_error() {
        let transport = ReqwestTransport::new(reqwest::Client::new());
        let url = Url::parse("https://127.0.0.1:9/oauth/v1/token").unwrap();

        let err = transport
            .post_form(&url, &[("client_id", "abc")])
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::RequestSend(_)));
    }
}
