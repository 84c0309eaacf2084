//! The LinkedIn client handle and the plumbing shared by every authenticated call.

use crate::config::{ClientConfig, ClientOptions};
use crate::error::{ApiErrorCode, Error, Result};
use crate::retry::RetryPolicy;
use crate::session::{LoginUrl, NonceRegistry, SessionManager};
use crate::tokens::{AccessToken, TokenStore};
use crate::transport::{HttpTransport, ReqwestTransport};
use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderValue, Method, Request, Response};
use oauth2::Scope;
use oauth2::url::Url;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;

pub(crate) const LINKEDIN_VERSION: &str = "LinkedIn-Version";
pub(crate) const RESTLI_PROTOCOL_VERSION: &str = "X-Restli-Protocol-Version";

/// Client for the LinkedIn REST API.
///
/// Holds the validated configuration, the current [`crate::TokenPair`], the login session state
/// and the HTTP transport. Cloning is cheap and every clone shares the same token store and nonce
/// registry.
pub struct LinkedinClient<T = ReqwestTransport> {
    pub(crate) config: Arc<ClientConfig>,
    pub(crate) transport: Arc<T>,
    pub(crate) tokens: Arc<TokenStore>,
    pub(crate) session: SessionManager,
    pub(crate) retry: RetryPolicy,
}

impl<T> Clone for LinkedinClient<T> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            transport: Arc::clone(&self.transport),
            tokens: Arc::clone(&self.tokens),
            session: self.session.clone(),
            retry: self.retry,
        }
    }
}

impl<T> fmt::Debug for LinkedinClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkedinClient")
            .field("client_id", &self.config.client_id)
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

impl LinkedinClient<ReqwestTransport> {
    /// Validates `options` and builds a client that talks HTTP through `reqwest`.
    pub fn new(options: ClientOptions) -> Result<Self> {
        let config = options.validate()?;
        Ok(Self::from_config(config, ReqwestTransport::new()?))
    }
}

impl<T: HttpTransport> LinkedinClient<T> {
    pub fn with_transport(options: ClientOptions, transport: T) -> Result<Self> {
        Ok(Self::from_config(options.validate()?, transport))
    }

    /// Builds a client with its own nonce registry.
    pub fn from_config(config: ClientConfig, transport: T) -> Self {
        Self::with_nonce_registry(config, transport, NonceRegistry::new())
    }

    /// Builds a client whose login nonces live in `registry`.
    ///
    /// Share one registry between clients when the login URL and the callback may be handled
    /// by different client instances.
    pub fn with_nonce_registry(config: ClientConfig, transport: T, registry: NonceRegistry) -> Self {
        let session = SessionManager::new(&config, registry);
        Self {
            retry: RetryPolicy::from_config(&config),
            config: Arc::new(config),
            transport: Arc::new(transport),
            tokens: Arc::new(TokenStore::new()),
            session,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// See [`SessionManager::create_login_url`].
    pub fn login_url(&self, scopes: Option<&[Scope]>) -> LoginUrl {
        self.session.create_login_url(scopes)
    }

    /// `path` under the versioned REST base, e.g. `rest_url("posts")`.
    pub(crate) fn rest_url(&self, path: &str) -> String {
        join_url(&self.config.endpoints.rest, path)
    }

    /// `path` under the legacy `v2` base, e.g. `api_v2_url("me")`.
    pub(crate) fn api_v2_url(&self, path: &str) -> String {
        join_url(&self.config.endpoints.api_v2, path)
    }

    /// Starts a request carrying the bearer token and both version headers.
    pub(crate) fn authenticated(
        &self,
        method: Method,
        url: &str,
        access_token: &AccessToken,
    ) -> http::request::Builder {
        Request::builder()
            .method(method)
            .uri(url)
            .header(AUTHORIZATION, format!("Bearer {}", access_token.secret()))
            .header(LINKEDIN_VERSION, self.config.api_version.as_str())
            .header(RESTLI_PROTOCOL_VERSION, self.config.restli_protocol_version.as_str())
    }

    pub(crate) fn json_request(
        &self,
        method: Method,
        url: &str,
        access_token: &AccessToken,
        body: &impl Serialize,
    ) -> Result<Request<Bytes>> {
        let body = serde_json::to_vec(body).map_err(|e| Error::InvalidParameter {
            name: "body",
            reason: e.to_string(),
        })?;
        self.authenticated(method, url, access_token)
            .header(CONTENT_TYPE, "application/json")
            .body(Bytes::from(body))
            .map_err(invalid_request)
    }

    pub(crate) fn empty_request(
        &self,
        method: Method,
        url: &str,
        access_token: &AccessToken,
    ) -> Result<Request<Bytes>> {
        self.authenticated(method, url, access_token)
            .body(Bytes::new())
            .map_err(invalid_request)
    }

    /// A raw-bytes PUT to an upload URL handed out by LinkedIn.
    pub(crate) fn octet_stream_put(
        &self,
        url: &str,
        access_token: &AccessToken,
        body: Bytes,
    ) -> Result<Request<Bytes>> {
        self.authenticated(Method::PUT, url, access_token)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, HeaderValue::from(body.len()))
            .body(body)
            .map_err(invalid_request)
    }

    pub(crate) async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>> {
        let method = request.method().clone();
        let uri = request.uri().clone();
        let response = self.transport.execute(request).await?;
        tracing::debug!(%method, %uri, status = %response.status(), "LinkedIn API responded");
        Ok(response)
    }
}

fn join_url(base: &Url, path: &str) -> String {
    format!("{}/{}", base.as_str().trim_end_matches('/'), path)
}

fn invalid_request(e: http::Error) -> Error {
    Error::InvalidParameter {
        name: "url",
        reason: e.to_string(),
    }
}

/// Percent-encodes a URN for use as a single path segment.
pub(crate) fn encode_urn(urn: &str) -> String {
    form_urlencoded::byte_serialize(urn.as_bytes()).collect()
}

pub(crate) fn body_text(response: &Response<Bytes>) -> String {
    String::from_utf8_lossy(response.body()).into_owned()
}

/// Parses a successful response body, reporting a shape mismatch as an API error for `code`.
pub(crate) fn decode_json<R: DeserializeOwned>(
    response: &Response<Bytes>,
    code: ApiErrorCode,
) -> Result<R> {
    serde_json::from_slice(response.body()).map_err(|e| {
        tracing::error!(error = %e, %code, "unexpected response body");
        Error::api(code, response.status(), response.body())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{self, MockTransport};
    use pretty_assertions::assert_eq;

    #[test]
    fn urns_are_encoded_as_one_segment() {
        assert_eq!(
            encode_urn("urn:li:share:6844785523593134080"),
            "urn%3Ali%3Ashare%3A6844785523593134080"
        );
    }

    #[tokio::test]
    async fn authenticated_requests_carry_every_required_header() {
        let client = mock::authenticated_client(MockTransport::new());
        let token = client.tokens().access_token().unwrap();
        let request = client
            .json_request(
                Method::POST,
                "https://api.linkedin.com/rest/posts",
                &token,
                &serde_json::json!({"a": 1}),
            )
            .unwrap();

        let headers = request.headers();
        assert_eq!(headers[AUTHORIZATION], "Bearer test-access-token");
        assert_eq!(headers[LINKEDIN_VERSION], "202311");
        assert_eq!(headers[RESTLI_PROTOCOL_VERSION], "2.0.0");
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert_eq!(request.body().as_ref(), br#"{"a":1}"#);
    }

    #[test]
    fn endpoint_paths_join_onto_bases() {
        let client = mock::client(MockTransport::new());
        assert_eq!(client.rest_url("posts"), "https://api.linkedin.com/rest/posts");
        assert_eq!(client.api_v2_url("me"), "https://api.linkedin.com/v2/me");
    }

    #[test]
    fn construction_fails_fast_on_missing_options() {
        let err = LinkedinClient::with_transport(ClientOptions::default(), MockTransport::new())
            .unwrap_err();
        assert_eq!(err.code(), "MISSING_PARAMETER");
    }

    #[tokio::test]
    async fn clones_share_tokens_and_nonces() {
        let client = mock::client(MockTransport::new());
        let other = client.clone();
        let login = client.login_url(None);
        other.session().consume_nonce(login.nonce.secret()).unwrap();
        assert!(client.session().consume_nonce(login.nonce.secret()).is_err());
    }
}
