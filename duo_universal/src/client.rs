//! The Duo Universal Prompt client
//!
//! An authentication attempt proceeds in three steps:
//!
//! 1. Optionally, [`health_check`][Client::health_check] confirms that Duo
//!    can service requests.
//! 2. [`generate_auth_uri`][Client::generate_auth_uri] produces the URI the
//!    user's browser is redirected to. The caller keeps the username and
//!    `state` in its session.
//! 3. When Duo redirects back, the caller compares the returned `state` with
//!    the stored one and then calls
//!    [`exchange_code`][Client::exchange_code] to obtain the result.
//!
//! The client itself holds no per-attempt state and may be shared freely.

use std::sync::Arc;

use duo_jose::{
    jwt::{AudienceRef, IssuerRef},
    random, Claim, ClaimSet, Engine, Jwt,
};
use reqwest::Url;

use crate::{
    config::{ClientBuilder, ClientConfig},
    dto,
    error::{self, Error, ExchangeError, IdentityTokenError},
    models::IdentityResult,
    transport::Transport,
    AuthorizationCodeRef, State, StateRef, UsernameRef,
};

/// Shortest accepted `state`
pub const MIN_STATE_LENGTH: usize = 22;

/// Longest accepted `state`
pub const MAX_STATE_LENGTH: usize = 1024;

/// Length of a `state` produced by [`Client::generate_state`]
pub const DEFAULT_STATE_LENGTH: usize = 36;

/// A client for the Duo Universal Prompt
#[derive(Clone, Debug)]
pub struct Client {
    config: Arc<ClientConfig>,
    transport: Arc<dyn Transport>,
    engine: Engine,
}

impl Client {
    /// Starts building a client
    pub fn builder(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        api_host: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> ClientBuilder {
        ClientBuilder::new(client_id, client_secret, api_host, redirect_uri)
    }

    pub(crate) fn from_parts(
        config: Arc<ClientConfig>,
        transport: Arc<dyn Transport>,
        engine: Engine,
    ) -> Self {
        Self {
            config,
            transport,
            engine,
        }
    }

    /// The client's configuration
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Generates a random `state` of the default length
    ///
    /// # Errors
    ///
    /// Returns an error if the random number generator fails.
    pub fn generate_state(&self) -> Result<State, Error> {
        self.generate_state_with_length(DEFAULT_STATE_LENGTH)
    }

    /// Generates a random alphanumeric `state` of `length` characters
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `length` is outside
    /// `[MIN_STATE_LENGTH, MAX_STATE_LENGTH]`.
    pub fn generate_state_with_length(&self, length: usize) -> Result<State, Error> {
        if !(MIN_STATE_LENGTH..=MAX_STATE_LENGTH).contains(&length) {
            return Err(error::invalid_argument(format!(
                "invalid state length {} requested; state must be between {} and {} characters",
                length, MIN_STATE_LENGTH, MAX_STATE_LENGTH
            ))
            .into());
        }

        let state = random::generate_with_rng(length, self.engine.random_source())?;

        Ok(State::new(state))
    }

    /// Asks Duo whether it is able to service requests
    ///
    /// Any failure, including an unreachable server or an unexpected
    /// response, is reported as unhealthy.
    #[tracing::instrument(
        skip(self),
        fields(
            client_id = %self.config.client_id(),
            url = %self.config.health_check_endpoint(),
        ),
    )]
    pub async fn health_check(&self) -> bool {
        match self.request_health().await {
            Ok(resp) if resp.is_healthy() => {
                tracing::debug!("Duo is healthy");
                true
            }
            Ok(resp) => {
                tracing::warn!(
                    stat = %resp.stat,
                    detail = resp.message.as_deref().unwrap_or_default(),
                    "Duo reported itself unhealthy"
                );
                false
            }
            Err(error) => {
                tracing::warn!(%error, "health check failed");
                false
            }
        }
    }

    async fn request_health(&self) -> Result<dto::HealthCheckResponse, Error> {
        let url = self.config.health_check_endpoint();
        let assertion = self.client_assertion(url)?;

        let request = dto::HealthCheckRequest {
            client_id: self.config.client_id(),
            client_assertion: &assertion,
        };

        let resp = self.transport.post_form(url, &request.form()).await?;

        if !resp.is_success() {
            return Err(ExchangeError::Status {
                status: resp.status(),
                body: resp.text(),
            }
            .into());
        }

        Ok(serde_json::from_slice(resp.body()).map_err(ExchangeError::Body)?)
    }

    /// Builds the URI to send the user's browser to
    ///
    /// The URI carries a signed request naming `username` and `state`. Keep
    /// both in the user's session to check the callback.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `username` is blank, or if `state` is
    /// blank or its length is outside `[MIN_STATE_LENGTH, MAX_STATE_LENGTH]`.
    #[tracing::instrument(
        err,
        skip(self, state),
        fields(client_id = %self.config.client_id()),
    )]
    pub fn generate_auth_uri(&self, username: &UsernameRef, state: &StateRef) -> Result<Url, Error> {
        if username.as_str().trim().is_empty() {
            return Err(error::invalid_argument("username must not be blank").into());
        }

        let state_len = state.as_str().chars().count();
        if state.as_str().trim().is_empty()
            || !(MIN_STATE_LENGTH..=MAX_STATE_LENGTH).contains(&state_len)
        {
            return Err(error::invalid_argument(format!(
                "state must be a non-blank string between {} and {} characters",
                MIN_STATE_LENGTH, MAX_STATE_LENGTH
            ))
            .into());
        }

        let endpoint = self.config.authorize_endpoint();
        let client_id = self.config.client_id().as_str();

        let mut claims = ClaimSet::new()
            .with(Claim::ClientId, client_id)
            .with(Claim::DuoUsername, username.as_str())
            .with(Claim::RedirectUri, self.config.redirect_uri())
            .with(Claim::ResponseType, "code")
            .with(Claim::Scope, "openid")
            .with(Claim::State, state.as_str());

        if self.config.use_duo_code_attribute() {
            claims.insert(Claim::UseDuoCodeAttribute, "true");
        }

        let request = self.sign(endpoint, claims)?;

        let mut uri = endpoint.clone();
        uri.query_pairs_mut()
            .append_pair("client_id", client_id)
            .append_pair("request", request.as_str())
            .append_pair("response_type", "code");

        tracing::debug!("generated authorization URI");

        Ok(uri)
    }

    /// Exchanges the authorization code from the callback for the result of
    /// the authentication
    ///
    /// The caller must already have checked that the `state` returned with
    /// the code equals the one it sent.
    ///
    /// # Errors
    ///
    /// * `ExchangeFailed` if the request fails or Duo responds with a
    ///   non-success status or an unreadable body
    /// * `TokenInvalid` if the identity token does not validate or decode
    /// * `UsernameMismatch` if the token was issued for a user other than
    ///   `expected_username`
    #[tracing::instrument(
        err,
        skip(self, code),
        fields(
            client_id = %self.config.client_id(),
            url = %self.config.token_endpoint(),
        ),
    )]
    pub async fn exchange_code(
        &self,
        code: &AuthorizationCodeRef,
        expected_username: &UsernameRef,
    ) -> Result<IdentityResult, Error> {
        let url = self.config.token_endpoint();
        let assertion = self.client_assertion(url)?;

        let request = dto::TokenRequest {
            code,
            client_id: self.config.client_id(),
            client_assertion: &assertion,
            redirect_uri: self.config.redirect_uri(),
        };

        let resp = self.transport.post_form(url, &request.form()).await?;

        tracing::debug!(
            response.status = resp.status(),
            "received token response from Duo"
        );

        if !resp.is_success() {
            return Err(ExchangeError::Status {
                status: resp.status(),
                body: resp.text(),
            }
            .into());
        }

        let token: dto::TokenResponse =
            serde_json::from_slice(resp.body()).map_err(ExchangeError::Body)?;

        let claims = self
            .engine
            .validate(
                &token.id_token,
                AudienceRef::from_str(self.config.client_id().as_str()),
                self.config.client_secret().as_str().as_bytes(),
                IssuerRef::from_str(url.as_str()),
            )
            .map_err(IdentityTokenError::Validation)?;

        let result: IdentityResult = claims
            .deserialize_into()
            .map_err(IdentityTokenError::Decode)?;

        if result.username.as_str() != expected_username.as_str() {
            tracing::warn!(
                expected = %expected_username,
                actual = %result.username,
                "identity token issued for a different user"
            );

            return Err(Error::UsernameMismatch {
                expected: expected_username.to_owned(),
                actual: result.username,
            });
        }

        tracing::info!(
            username = %result.username,
            result = result.auth_result.result.as_deref().unwrap_or_default(),
            "two-factor authentication completed"
        );

        Ok(result)
    }

    fn client_assertion(&self, audience: &Url) -> Result<Jwt, Error> {
        let claims = ClaimSet::new().with(Claim::Subject, self.config.client_id().as_str());
        self.sign(audience, claims)
    }

    fn sign(&self, audience: &Url, claims: ClaimSet) -> Result<Jwt, Error> {
        Ok(self.engine.sign(
            IssuerRef::from_str(self.config.client_id().as_str()),
            self.config.client_secret().as_str().as_bytes(),
            AudienceRef::from_str(audience.as_str()),
            claims,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use color_eyre::Result;
    use duo_jose::{ClaimSet, JwtRef, TestClock};
    use tracing_test::traced_test;

    use super::*;
    use crate::{test, test::MockTransport, AuthorizationCode, Username};

    fn client_with(transport: &Arc<MockTransport>) -> Result<Client> {
        Ok(ClientBuilder::new(
            test::CLIENT_ID,
            test::CLIENT_SECRET,
            test::API_HOST,
            test::REDIRECT_URI,
        )
        .with_transport(Arc::clone(transport))
        .with_clock(TestClock::new(test::NOW))
        .build()?)
    }

    fn client() -> Result<Client> {
        client_with(&Arc::new(MockTransport::new()))
    }

    fn state() -> State {
        State::new("a".repeat(DEFAULT_STATE_LENGTH))
    }

    fn username() -> Username {
        Username::from_static(test::USERNAME)
    }

    fn verify_assertion(token: &str, audience: &str) -> Result<ClaimSet> {
        let engine = Engine::default().with_clock(TestClock::new(test::NOW));
        Ok(engine.validate(
            JwtRef::from_str(token),
            AudienceRef::from_str(audience),
            test::CLIENT_SECRET.as_bytes(),
            IssuerRef::from_str(test::CLIENT_ID),
        )?)
    }

    mod state {
        use super::*;

        #[test]
        fn default_length() -> Result<()> {
            let state = client()?.generate_state()?;

            assert_eq!(state.as_str().len(), DEFAULT_STATE_LENGTH);
            assert!(state.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
            Ok(())
        }

        #[test]
        fn lengths_within_bounds() -> Result<()> {
            let client = client()?;

            for length in [MIN_STATE_LENGTH, 100, MAX_STATE_LENGTH] {
                let state = client.generate_state_with_length(length)?;
                assert_eq!(state.as_str().len(), length);
                assert!(state.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
            }
            Ok(())
        }

        #[test]
        fn lengths_out_of_bounds() -> Result<()> {
            let client = client()?;

            for length in [0, 1, MIN_STATE_LENGTH - 1, MAX_STATE_LENGTH + 1] {
                let err = client.generate_state_with_length(length).unwrap_err();
                assert!(err.is_invalid_argument(), "{}", length);
            }
            Ok(())
        }

        #[test]
        fn states_differ() -> Result<()> {
            let client = client()?;

            assert_ne!(client.generate_state()?, client.generate_state()?);
            Ok(())
        }

        #[test]
        fn injected_random_source_is_used() -> Result<()> {
            let client = ClientBuilder::new(
                test::CLIENT_ID,
                test::CLIENT_SECRET,
                test::API_HOST,
                test::REDIRECT_URI,
            )
            .with_transport(MockTransport::new())
            .with_random_source(test::ScriptedRandom::new(b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJ".to_vec()))
            .build()?;

            let state = client.generate_state_with_length(MIN_STATE_LENGTH)?;

            assert_eq!(state.as_str(), "0123456789abcdefghijkl");
            Ok(())
        }
    }

    mod health_check {
        use super::*;

        #[tokio::test]
        async fn healthy() -> Result<()> {
            let transport = Arc::new(MockTransport::new().respond(200, test::HEALTHY));
            let client = client_with(&transport)?;

            assert!(client.health_check().await);
            Ok(())
        }

        #[tokio::test]
        async fn sends_client_assertion() -> Result<()> {
            let transport = Arc::new(MockTransport::new().respond(200, test::HEALTHY));
            let client = client_with(&transport)?;

            client.health_check().await;

            let requests = transport.requests();
            assert_eq!(requests.len(), 1);

            let request = &requests[0];
            assert_eq!(
                request.url.as_str(),
                "https://fake.api.host/oauth/v1/health_check"
            );
            assert_eq!(request.param("client_id"), Some(test::CLIENT_ID));

            let assertion = request.param("client_assertion").unwrap_or_default();
            let claims = verify_assertion(assertion, request.url.as_str())?;
            assert_eq!(claims.get_str(Claim::Subject), Some(test::CLIENT_ID));
            assert_eq!(claims.get_str(Claim::JwtId).map(str::len), Some(36));
            Ok(())
        }

        #[tokio::test]
        #[traced_test]
        async fn unhealthy() -> Result<()> {
            let transport = Arc::new(MockTransport::new().respond(200, test::UNHEALTHY));
            let client = client_with(&transport)?;

            assert!(!client.health_check().await);
            assert!(logs_contain("Duo reported itself unhealthy"));
            Ok(())
        }

        #[tokio::test]
        async fn error_status() -> Result<()> {
            for status in [301, 400, 404, 500] {
                let transport = Arc::new(MockTransport::new().respond(status, test::HEALTHY));
                let client = client_with(&transport)?;

                assert!(!client.health_check().await, "{}", status);
            }
            Ok(())
        }

        #[tokio::test]
        #[traced_test]
        async fn transport_failure() -> Result<()> {
            let transport = Arc::new(MockTransport::new().fail("connection refused"));
            let client = client_with(&transport)?;

            assert!(!client.health_check().await);
            assert!(logs_contain("health check failed"));
            Ok(())
        }

        #[tokio::test]
        async fn unreadable_body() -> Result<()> {
            let transport = Arc::new(MockTransport::new().respond(200, "<html>"));
            let client = client_with(&transport)?;

            assert!(!client.health_check().await);
            Ok(())
        }
    }

    mod auth_uri {
        use super::*;

        fn query(uri: &Url) -> Vec<(String, String)> {
            uri.query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect()
        }

        #[test]
        fn points_at_authorize_endpoint() -> Result<()> {
            let client = client()?;

            for name in [test::USERNAME, "I iz a user", "user@foo.bar"] {
                let uri = client.generate_auth_uri(UsernameRef::from_str(name), &state())?;

                assert_eq!(uri.scheme(), "https");
                assert_eq!(uri.host_str(), Some(test::API_HOST));
                assert_eq!(uri.path(), "/oauth/v1/authorize");
            }
            Ok(())
        }

        #[test]
        fn query_carries_signed_request() -> Result<()> {
            let client = client()?;
            let uri = client.generate_auth_uri(UsernameRef::from_str("user@foo.bar"), &state())?;
            let query = query(&uri);

            let names: Vec<_> = query.iter().map(|(k, _)| k.as_str()).collect();
            assert_eq!(names, ["client_id", "request", "response_type"]);
            assert_eq!(query[0].1, test::CLIENT_ID);
            assert_eq!(query[2].1, "code");

            let claims = verify_assertion(&query[1].1, "https://fake.api.host/oauth/v1/authorize")?;
            assert_eq!(claims.get_str(Claim::ClientId), Some(test::CLIENT_ID));
            assert_eq!(claims.get_str(Claim::DuoUsername), Some("user@foo.bar"));
            assert_eq!(claims.get_str(Claim::RedirectUri), Some(test::REDIRECT_URI));
            assert_eq!(claims.get_str(Claim::ResponseType), Some("code"));
            assert_eq!(claims.get_str(Claim::Scope), Some("openid"));
            assert_eq!(claims.get_str(Claim::State), Some(state().as_str()));
            assert!(!claims.contains(Claim::UseDuoCodeAttribute));
            Ok(())
        }

        #[test]
        fn query_is_percent_encoded() -> Result<()> {
            let client = client()?;
            let uri = client.generate_auth_uri(&username(), &state())?;

            assert!(uri
                .as_str()
                .starts_with("https://fake.api.host/oauth/v1/authorize?client_id=client+id+client+id+&request="));
            assert!(uri.as_str().ends_with("&response_type=code"));
            Ok(())
        }

        #[test]
        fn duo_code_attribute_is_requested() -> Result<()> {
            let client = ClientBuilder::new(
                test::CLIENT_ID,
                test::CLIENT_SECRET,
                test::API_HOST,
                test::REDIRECT_URI,
            )
            .use_duo_code_attribute()
            .with_transport(MockTransport::new())
            .with_clock(TestClock::new(test::NOW))
            .build()?;

            let uri = client.generate_auth_uri(&username(), &state())?;
            let query = query(&uri);
            let claims = verify_assertion(&query[1].1, "https://fake.api.host/oauth/v1/authorize")?;

            assert_eq!(claims.get_str(Claim::UseDuoCodeAttribute), Some("true"));
            Ok(())
        }

        #[test]
        fn blank_username_is_rejected() -> Result<()> {
            let client = client()?;

            for name in ["", "         "] {
                let err = client
                    .generate_auth_uri(UsernameRef::from_str(name), &state())
                    .unwrap_err();
                assert!(err.is_invalid_argument());
            }
            Ok(())
        }

        #[test]
        fn bad_state_is_rejected() -> Result<()> {
            let client = client()?;
            let short = "z".repeat(MIN_STATE_LENGTH - 1);
            let long = "z".repeat(MAX_STATE_LENGTH + 1);
            let blank = " ".repeat(DEFAULT_STATE_LENGTH);

            for state in ["", "          ", short.as_str(), long.as_str(), blank.as_str()] {
                let err = client
                    .generate_auth_uri(&username(), StateRef::from_str(state))
                    .unwrap_err();
                assert!(err.is_invalid_argument(), "{:?}", state);
            }
            Ok(())
        }

        #[test]
        fn boundary_state_lengths_are_accepted() -> Result<()> {
            let client = client()?;

            for length in [MIN_STATE_LENGTH, MAX_STATE_LENGTH] {
                let state = State::new("z".repeat(length));
                client.generate_auth_uri(&username(), &state)?;
            }
            Ok(())
        }
    }

    mod exchange {
        use super::*;

        fn good_response() -> String {
            test::token_response(&test::sign_id_token(
                test::id_token_claims(test::NOW),
                test::CLIENT_SECRET,
            ))
        }

        fn code() -> AuthorizationCode {
            AuthorizationCode::from_static("deadbeef")
        }

        #[tokio::test]
        async fn success() -> Result<()> {
            let transport = Arc::new(MockTransport::new().respond(200, good_response()));
            let client = client_with(&transport)?;

            let result = client.exchange_code(&code(), &username()).await?;

            assert_eq!(result.username, username());
            assert_eq!(result.aud, test::CLIENT_ID);
            assert_eq!(result.iss, test::TOKEN_ENDPOINT);
            assert_eq!(result.auth_result.result.as_deref(), Some("allow"));
            assert_eq!(
                result.auth_context.txid.as_deref(),
                Some("123456")
            );
            Ok(())
        }

        #[tokio::test]
        async fn mixed_case_host_expects_normalized_issuer() -> Result<()> {
            let transport = Arc::new(MockTransport::new().respond(200, good_response()));
            let client = ClientBuilder::new(
                test::CLIENT_ID,
                test::CLIENT_SECRET,
                "Fake.API.Host:443",
                test::REDIRECT_URI,
            )
            .with_transport(Arc::clone(&transport))
            .with_clock(TestClock::new(test::NOW))
            .build()?;

            let result = client.exchange_code(&code(), &username()).await?;

            assert_eq!(result.iss, test::TOKEN_ENDPOINT);
            assert_eq!(transport.requests()[0].url.as_str(), test::TOKEN_ENDPOINT);
            Ok(())
        }

        #[tokio::test]
        async fn sends_token_request() -> Result<()> {
            let transport = Arc::new(MockTransport::new().respond(200, good_response()));
            let client = client_with(&transport)?;

            client.exchange_code(&code(), &username()).await?;

            let requests = transport.requests();
            assert_eq!(requests.len(), 1);

            let request = &requests[0];
            assert_eq!(request.url.as_str(), test::TOKEN_ENDPOINT);
            assert_eq!(request.param("code"), Some("deadbeef"));
            assert_eq!(request.param("client_id"), Some(test::CLIENT_ID));
            assert_eq!(
                request.param("client_assertion_type"),
                Some("urn:ietf:params:oauth:client-assertion-type:jwt-bearer")
            );
            assert_eq!(request.param("grant_type"), Some("authorization_code"));
            assert_eq!(request.param("redirect_uri"), Some(test::REDIRECT_URI));

            let assertion = request.param("client_assertion").unwrap_or_default();
            let claims = verify_assertion(assertion, test::TOKEN_ENDPOINT)?;
            assert_eq!(claims.get_str(Claim::Subject), Some(test::CLIENT_ID));
            Ok(())
        }

        #[tokio::test]
        async fn error_status() -> Result<()> {
            for status in [301, 400, 404, 500] {
                let transport = Arc::new(MockTransport::new().respond(status, good_response()));
                let client = client_with(&transport)?;

                let err = client.exchange_code(&code(), &username()).await.unwrap_err();
                assert!(err.is_exchange_failed(), "{}", status);
            }
            Ok(())
        }

        #[tokio::test]
        async fn transport_failure() -> Result<()> {
            let transport = Arc::new(MockTransport::new().fail("connection reset"));
            let client = client_with(&transport)?;

            let err = client.exchange_code(&code(), &username()).await.unwrap_err();
            assert!(err.is_exchange_failed());
            Ok(())
        }

        #[tokio::test]
        async fn unreadable_body() -> Result<()> {
            let transport = Arc::new(MockTransport::new().respond(200, r#"{"access_token": "x"}"#));
            let client = client_with(&transport)?;

            let err = client.exchange_code(&code(), &username()).await.unwrap_err();
            assert!(err.is_exchange_failed());
            Ok(())
        }

        #[tokio::test]
        #[traced_test]
        async fn username_mismatch() -> Result<()> {
            for expected in [
                "Not username",
                "username@domain.org",
                "  username  ",
                "!@#user$%^name*&(",
                "USERNAME",
            ] {
                let transport = Arc::new(MockTransport::new().respond(200, good_response()));
                let client = client_with(&transport)?;

                let err = client
                    .exchange_code(&code(), UsernameRef::from_str(expected))
                    .await
                    .unwrap_err();
                assert!(err.is_username_mismatch(), "{}", expected);
            }

            assert!(logs_contain("identity token issued for a different user"));
            Ok(())
        }

        async fn rejected_token(claims: ClaimSet, secret: &str) -> Result<Error> {
            let body = test::token_response(&test::sign_id_token(claims, secret));
            let transport = Arc::new(MockTransport::new().respond(200, body));
            let client = client_with(&transport)?;

            Ok(client.exchange_code(&code(), &username()).await.unwrap_err())
        }

        #[tokio::test]
        async fn wrong_secret() -> Result<()> {
            let err = rejected_token(
                test::id_token_claims(test::NOW),
                "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb",
            )
            .await?;

            assert!(err.is_token_invalid());
            Ok(())
        }

        #[tokio::test]
        async fn wrong_audience() -> Result<()> {
            let claims =
                test::id_token_claims(test::NOW).with(Claim::Audience, "some other client id");
            let err = rejected_token(claims, test::CLIENT_SECRET).await?;

            assert!(err.is_token_invalid());
            Ok(())
        }

        #[tokio::test]
        async fn wrong_issuer() -> Result<()> {
            let claims = test::id_token_claims(test::NOW)
                .with(Claim::Issuer, "https://other.api.host/oauth/v1/token");
            let err = rejected_token(claims, test::CLIENT_SECRET).await?;

            assert!(err.is_token_invalid());
            Ok(())
        }

        #[tokio::test]
        async fn expired_token() -> Result<()> {
            let issued = test::NOW.saturating_sub(3600);
            let err = rejected_token(test::id_token_claims(issued), test::CLIENT_SECRET).await?;

            assert!(err.is_token_invalid());
            Ok(())
        }

        #[tokio::test]
        async fn token_within_leeway() -> Result<()> {
            // The fixture backdates `iat` a further 60 seconds
            let claims = test::id_token_claims(test::NOW.saturating_sub(440));
            assert_eq!(claims.issued_at(), Some(test::NOW.saturating_sub(500)));
            assert_eq!(claims.expiration(), Some(test::NOW.saturating_sub(200)));

            let body = test::token_response(&test::sign_id_token(claims, test::CLIENT_SECRET));
            let transport = Arc::new(MockTransport::new().respond(200, body));
            let client = client_with(&transport)?;

            client.exchange_code(&code(), &username()).await?;
            Ok(())
        }

        #[tokio::test]
        async fn malformed_token() -> Result<()> {
            let body = r#"{"id_token": "not-a-token", "access_token": "x"}"#;
            let transport = Arc::new(MockTransport::new().respond(200, body));
            let client = client_with(&transport)?;

            let err = client.exchange_code(&code(), &username()).await.unwrap_err();
            assert!(err.is_token_invalid());
            Ok(())
        }

        #[tokio::test]
        async fn claims_of_wrong_shape() -> Result<()> {
            let mut claims = test::id_token_claims(test::NOW);
            claims.insert(Claim::AuthResult, "allow");
            let err = rejected_token(claims, test::CLIENT_SECRET).await?;

            assert!(matches!(
                err,
                Error::TokenInvalid(IdentityTokenError::Decode(_))
            ));
            Ok(())
        }
    }

    #[test]
    fn client_is_shareable() {
        fn assert_send_sync<T: Send + Sync + Clone>() {}
        assert_send_sync::<Client>();
    }
}
