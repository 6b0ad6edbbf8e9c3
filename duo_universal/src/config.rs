//! Client configuration and the builder that validates it

use std::{sync::Arc, time::Duration};

use duo_jose::{Clock, Engine, RandomSource};
use reqwest::{header::HeaderValue, Url};

use crate::{
    client::Client,
    error::{self, Error},
    pinning::{CertificatePinner, TrustedRootSet},
    tls,
    transport::{ReqwestTransport, Transport},
    ClientId, ClientIdRef, ClientSecret, ClientSecretRef,
};

/// Length of a client ID
pub const CLIENT_ID_LENGTH: usize = 20;

/// Length of a client secret
pub const CLIENT_SECRET_LENGTH: usize = 40;

/// How long a request to the identity provider may take by default
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT_PRODUCT: &str = "duo_universal_rust";

/// Which server certificates the client trusts
#[derive(Clone, Debug)]
pub enum TrustMode {
    /// Pin to the root certificates bundled with this crate
    DefaultPinned,

    /// Pin to a caller supplied set of root certificates
    CustomRoots(TrustedRootSet),

    /// Perform no certificate validation at all
    Disabled,
}

impl TrustMode {
    /// The pinner enforcing this mode
    ///
    /// # Errors
    ///
    /// Returns an error if the bundled root certificates cannot be loaded.
    pub fn pinner(&self) -> Result<CertificatePinner, error::InvalidConfig> {
        match self {
            Self::DefaultPinned => TrustedRootSet::duo_default()
                .map(CertificatePinner::pin)
                .map_err(|e| error::invalid_config_from("unable to load bundled root certificates", e)),
            Self::CustomRoots(roots) => Ok(CertificatePinner::pin(roots.clone())),
            Self::Disabled => Ok(CertificatePinner::disable_pinning()),
        }
    }
}

/// Validated, immutable client configuration
#[derive(Clone, Debug)]
pub struct ClientConfig {
    client_id: ClientId,
    client_secret: ClientSecret,
    api_host: String,
    redirect_uri: String,
    use_duo_code_attribute: bool,
    trust: TrustMode,
    user_agent: HeaderValue,
    timeout: Duration,
    proxy: Option<Url>,
    health_check_endpoint: Url,
    authorize_endpoint: Url,
    token_endpoint: Url,
}

impl ClientConfig {
    /// The client ID
    #[must_use]
    pub fn client_id(&self) -> &ClientIdRef {
        &self.client_id
    }

    /// The client secret
    #[must_use]
    pub fn client_secret(&self) -> &ClientSecretRef {
        &self.client_secret
    }

    /// The API host, such as `api-123456.duosecurity.com`
    ///
    /// The host is normalized as a URL authority: it is lowercased and a
    /// default `:443` port is dropped. Every endpoint, and so the issuer
    /// expected in identity tokens, is derived from this form.
    #[must_use]
    pub fn api_host(&self) -> &str {
        &self.api_host
    }

    /// Where the identity provider sends the user after authenticating
    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Whether the authorization code is returned as `duo_code` instead of `code`
    #[must_use]
    pub fn use_duo_code_attribute(&self) -> bool {
        self.use_duo_code_attribute
    }

    /// Which server certificates are trusted
    #[must_use]
    pub fn trust(&self) -> &TrustMode {
        &self.trust
    }

    /// The `User-Agent` sent with each request
    #[must_use]
    pub fn user_agent(&self) -> &HeaderValue {
        &self.user_agent
    }

    /// The request timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The HTTP proxy, if any
    #[must_use]
    pub fn proxy(&self) -> Option<&Url> {
        self.proxy.as_ref()
    }

    /// `https://{api_host}/oauth/v1/health_check`
    #[must_use]
    pub fn health_check_endpoint(&self) -> &Url {
        &self.health_check_endpoint
    }

    /// `https://{api_host}/oauth/v1/authorize`
    #[must_use]
    pub fn authorize_endpoint(&self) -> &Url {
        &self.authorize_endpoint
    }

    /// `https://{api_host}/oauth/v1/token`
    #[must_use]
    pub fn token_endpoint(&self) -> &Url {
        &self.token_endpoint
    }
}

/// Builds a [`Client`]
///
/// All settings are checked by [`build`][Self::build]; nothing is validated
/// on first use.
///
/// ```no_run
/// # fn main() -> Result<(), duo_universal::Error> {
/// let client = duo_universal::ClientBuilder::new(
///     "DIXXXXXXXXXXXXXXXXXX",
///     "deadbeefdeadbeefdeadbeefdeadbeefdeadbeef",
///     "api-123456.duosecurity.com",
///     "https://example.com/duo-callback",
/// )
/// .customize_user_agent_app("example", "1.0")
/// .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
#[must_use]
pub struct ClientBuilder {
    client_id: ClientId,
    client_secret: ClientSecret,
    api_host: String,
    redirect_uri: String,
    use_duo_code_attribute: bool,
    disable_ssl_certificate_validation: bool,
    custom_roots: Option<TrustedRootSet>,
    custom_app: Option<(String, String)>,
    additional_user_agent: Option<String>,
    proxy: Option<String>,
    timeout: Duration,
    transport: Option<Arc<dyn Transport>>,
    engine: Engine,
}

impl ClientBuilder {
    /// Starts a builder with the four required settings
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        api_host: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: ClientId::new(client_id.into()),
            client_secret: ClientSecret::new(client_secret.into()),
            api_host: api_host.into(),
            redirect_uri: redirect_uri.into(),
            use_duo_code_attribute: false,
            disable_ssl_certificate_validation: false,
            custom_roots: None,
            custom_app: None,
            additional_user_agent: None,
            proxy: None,
            timeout: DEFAULT_TIMEOUT,
            transport: None,
            engine: Engine::default(),
        }
    }

    /// Asks for the authorization code to be returned as `duo_code`
    ///
    /// Useful where `code` is already reserved, as in some thick clients.
    pub fn use_duo_code_attribute(self) -> Self {
        Self {
            use_duo_code_attribute: true,
            ..self
        }
    }

    /// Turns off certificate validation entirely
    ///
    /// **Never use this in production.** It overrides
    /// [`use_custom_root_certificates`][Self::use_custom_root_certificates].
    pub fn disable_ssl_certificate_validation(self) -> Self {
        Self {
            disable_ssl_certificate_validation: true,
            ..self
        }
    }

    /// Pins to `roots` instead of the bundled Duo roots
    pub fn use_custom_root_certificates(self, roots: TrustedRootSet) -> Self {
        Self {
            custom_roots: Some(roots),
            ..self
        }
    }

    /// Identifies the embedding application in the user agent
    ///
    /// Ignored unless both values are non-blank.
    pub fn customize_user_agent_app(
        self,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            custom_app: Some((name.into(), version.into())),
            ..self
        }
    }

    /// Appends a parenthesized comment to the user agent
    pub fn append_to_user_agent(self, extra: impl Into<String>) -> Self {
        Self {
            additional_user_agent: Some(extra.into()),
            ..self
        }
    }

    /// Sends all requests through an HTTP proxy
    pub fn use_http_proxy(self, proxy: impl Into<String>) -> Self {
        Self {
            proxy: Some(proxy.into()),
            ..self
        }
    }

    /// Bounds how long a request may take
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    /// Sends requests through `transport` instead of a pinned HTTPS client
    ///
    /// The transport is responsible for its own TLS settings.
    pub fn with_transport(self, transport: impl Transport + 'static) -> Self {
        Self {
            transport: Some(Arc::new(transport)),
            ..self
        }
    }

    /// Reads the current time from `clock`
    pub fn with_clock(self, clock: impl Clock + Send + Sync + 'static) -> Self {
        Self {
            engine: self.engine.with_clock(clock),
            ..self
        }
    }

    /// Draws nonces and states from `rng`
    pub fn with_random_source(self, rng: impl RandomSource + Send + Sync + 'static) -> Self {
        Self {
            engine: self.engine.with_random_source(rng),
            ..self
        }
    }

    /// Validates the settings and constructs the client
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the client ID is not a non-blank string of
    /// 20 characters, the client secret is not a non-blank string of 40
    /// characters, the API host or redirect URI is blank, the user agent or
    /// proxy is unusable, or the TLS configuration cannot be constructed.
    pub fn build(self) -> Result<Client, Error> {
        let Self {
            client_id,
            client_secret,
            api_host,
            redirect_uri,
            use_duo_code_attribute,
            disable_ssl_certificate_validation,
            custom_roots,
            custom_app,
            additional_user_agent,
            proxy,
            timeout,
            transport,
            engine,
        } = self;

        validate_required(&client_id, &client_secret, &api_host, &redirect_uri)?;
        let api_host = normalize_host(&api_host)?;

        let trust = match (disable_ssl_certificate_validation, custom_roots) {
            (true, Some(_)) => {
                tracing::warn!(
                    "custom root certificates are ignored because certificate validation is disabled"
                );
                TrustMode::Disabled
            }
            (true, None) => TrustMode::Disabled,
            (false, Some(roots)) => TrustMode::CustomRoots(roots),
            (false, None) => TrustMode::DefaultPinned,
        };

        let proxy = proxy
            .map(|p| Url::parse(&p))
            .transpose()
            .map_err(|e| error::invalid_config_from("invalid proxy URL", e))?;

        let config = ClientConfig {
            health_check_endpoint: endpoint(&api_host, "health_check")?,
            authorize_endpoint: endpoint(&api_host, "authorize")?,
            token_endpoint: endpoint(&api_host, "token")?,
            user_agent: user_agent(custom_app.as_ref(), additional_user_agent.as_deref())?,
            client_id,
            client_secret,
            api_host,
            redirect_uri,
            use_duo_code_attribute,
            trust,
            timeout,
            proxy,
        };

        let transport: Arc<dyn Transport> = match transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::configured(
                tls::client_config(&config.trust.pinner()?)?,
                config.user_agent.clone(),
                config.timeout,
                config.proxy.as_ref(),
            )?),
        };

        tracing::debug!(
            client_id = %config.client_id,
            api_host = %config.api_host,
            trust = ?config.trust,
            "constructed Duo client"
        );

        Ok(Client::from_parts(Arc::new(config), transport, engine))
    }
}

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

fn validate_required(
    client_id: &ClientIdRef,
    client_secret: &ClientSecretRef,
    api_host: &str,
    redirect_uri: &str,
) -> Result<(), error::InvalidConfig> {
    let client_id = client_id.as_str();
    if is_blank(client_id) || client_id.chars().count() != CLIENT_ID_LENGTH {
        return Err(error::invalid_config(format!(
            "client ID must be a non-blank string of length {}",
            CLIENT_ID_LENGTH
        )));
    }

    let client_secret = client_secret.as_str();
    if is_blank(client_secret) || client_secret.chars().count() != CLIENT_SECRET_LENGTH {
        return Err(error::invalid_config(format!(
            "client secret must be a non-blank string of length {}",
            CLIENT_SECRET_LENGTH
        )));
    }

    if is_blank(api_host) {
        return Err(error::invalid_config("API host must be a non-blank string"));
    }

    if is_blank(redirect_uri) {
        return Err(error::invalid_config(
            "redirect URI must be a non-blank string",
        ));
    }

    Ok(())
}

fn normalize_host(api_host: &str) -> Result<String, error::InvalidConfig> {
    let url = Url::parse(&format!("https://{}", api_host))
        .map_err(|e| error::invalid_config_from("invalid API host", e))?;

    let bare = url.path() == "/"
        && url.query().is_none()
        && url.fragment().is_none()
        && url.username().is_empty()
        && url.password().is_none();

    match url.host_str() {
        Some(host) if bare => Ok(match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_owned(),
        }),
        _ => Err(error::invalid_config(
            "API host must be a bare host name with an optional port",
        )),
    }
}

fn endpoint(api_host: &str, path: &str) -> Result<Url, error::InvalidConfig> {
    Url::parse(&format!("https://{}/oauth/v1/{}", api_host, path))
        .map_err(|e| error::invalid_config_from("invalid API host", e))
}

// RFC 7230 `token` characters
fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(|c| {
            c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c)
        })
}

fn user_agent(
    custom_app: Option<&(String, String)>,
    extra: Option<&str>,
) -> Result<HeaderValue, error::InvalidConfig> {
    let mut ua = String::new();

    if let Some((name, version)) = custom_app.filter(|(n, v)| !is_blank(n) && !is_blank(v)) {
        if !is_token(name) || !is_token(version) {
            return Err(error::invalid_config(
                "user agent application name and version must be HTTP tokens",
            ));
        }

        ua.push_str(&format!("{}/{} ", name, version));
    }

    ua.push_str(&format!(
        "{}/{} ({}; {})",
        USER_AGENT_PRODUCT,
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    ));

    if let Some(extra) = extra.filter(|e| !is_blank(e)) {
        ua.push_str(&format!(" ({})", extra));
    }

    HeaderValue::from_str(&ua).map_err(|e| error::invalid_config_from("invalid user agent", e))
}
