//! Scripted in-memory transport for unit tests.

use crate::client::LinkedinClient;
use crate::config::ClientOptions;
use crate::tokens::{AccessToken, TokenPair};
use crate::transport::{HttpTransport, TransportError};
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Response, StatusCode};
use jiff::{SignedDuration, Timestamp};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

pub(crate) const ACCESS_TOKEN: &str = "test-access-token";

#[derive(Debug, Clone)]
pub(crate) struct MockResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub delay: Duration,
}

impl MockResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn json(status: StatusCode, body: serde_json::Value) -> Self {
        Self::new(status)
            .header("content-type", "application/json")
            .body(body.to_string())
    }

    pub fn text(status: StatusCode, body: &str) -> Self {
        Self::new(status).body(body.to_string())
    }

    pub fn header(mut self, name: &'static str, value: &str) -> Self {
        self.headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_str(value).unwrap(),
        );
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub at: Instant,
}

type Handler = Box<dyn Fn(&Request<Bytes>) -> MockResponse + Send + Sync>;

struct Route {
    method: Method,
    url: String,
    handler: Handler,
}

/// Answers requests from routes matched on method and exact URL; anything else gets a 404.
#[derive(Default)]
pub(crate) struct MockTransport {
    routes: Vec<Route>,
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(
        mut self,
        method: Method,
        url: &str,
        handler: impl Fn(&Request<Bytes>) -> MockResponse + Send + Sync + 'static,
    ) -> Self {
        self.routes.push(Route {
            method,
            url: url.to_string(),
            handler: Box::new(handler),
        });
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.recorded.lock().unwrap().clone()
    }

    pub fn requests_to(&self, url: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.url == url)
            .collect()
    }
}

impl HttpTransport for MockTransport {
    async fn execute(&self, request: Request<Bytes>) -> Result<Response<Bytes>, TransportError> {
        let url = request.uri().to_string();
        self.recorded.lock().unwrap().push(RecordedRequest {
            method: request.method().clone(),
            url: url.clone(),
            headers: request.headers().clone(),
            body: request.body().clone(),
            at: Instant::now(),
        });

        let scripted = self
            .routes
            .iter()
            .find(|route| route.method == request.method() && route.url == url)
            .map(|route| (route.handler)(&request))
            .unwrap_or_else(|| MockResponse::text(StatusCode::NOT_FOUND, "no route"));

        if !scripted.delay.is_zero() {
            tokio::time::sleep(scripted.delay).await;
        }

        let mut response = Response::new(scripted.body);
        *response.status_mut() = scripted.status;
        *response.headers_mut() = scripted.headers;
        Ok(response)
    }
}

pub(crate) fn options() -> ClientOptions {
    ClientOptions {
        default_delay_between_requests_ms: 10,
        ..ClientOptions::new("a", "b", "https://cb")
    }
}

pub(crate) fn client_with(options: ClientOptions, transport: MockTransport) -> LinkedinClient<MockTransport> {
    LinkedinClient::with_transport(options, transport).unwrap()
}

pub(crate) fn client(transport: MockTransport) -> LinkedinClient<MockTransport> {
    client_with(options(), transport)
}

/// A client holding an access token valid for the next hour.
pub(crate) fn authenticated_client(transport: MockTransport) -> LinkedinClient<MockTransport> {
    authenticate(client(transport))
}

pub(crate) fn authenticate(client: LinkedinClient<MockTransport>) -> LinkedinClient<MockTransport> {
    client.tokens().set_tokens(TokenPair::new(
        AccessToken::new(ACCESS_TOKEN).unwrap(),
        Timestamp::now() + SignedDuration::from_hours(1),
    ));
    client
}
