//! The HTTP boundary of the client.
//!
//! Everything above this module speaks [`http::Request`] / [`http::Response`] with [`Bytes`]
//! bodies, so the token, session and upload logic never depends on a particular HTTP stack.
//! [`ReqwestTransport`] is the implementation used outside of tests.

use bytes::Bytes;
use http::{Request, Response};
use std::error::Error as StdError;
use std::future::Future;

/// A failure below the HTTP layer: DNS, TLS, connection resets, body read errors and the like.
#[derive(Debug, thiserror::Error)]
#[error("HTTP transport failed: {0}")]
pub struct TransportError(#[source] Box<dyn StdError + Send + Sync>);

impl TransportError {
    pub fn new(source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self(source.into())
    }
}

/// Sends a fully-formed request and returns the complete response.
///
/// Implementations must not interpret status codes; a `404` is a successful round-trip as far
/// as the transport is concerned.
pub trait HttpTransport: Send + Sync + 'static {
    fn execute(
        &self,
        request: Request<Bytes>,
    ) -> impl Future<Output = Result<Response<Bytes>, TransportError>> + Send;
}

/// [`HttpTransport`] backed by a shared [`reqwest::Client`].
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::ClientBuilder::new()
            .build()
            .map_err(TransportError::new)?;
        Ok(Self { client })
    }

    /// Reuse an existing client, e.g. one configured with proxies or custom timeouts.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: Request<Bytes>) -> Result<Response<Bytes>, TransportError> {
        let request = reqwest::Request::try_from(request).map_err(TransportError::new)?;
        let response = self
            .client
            .execute(request)
            .await
            .map_err(TransportError::new)?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(TransportError::new)?;

        let mut out = Response::new(body);
        *out.status_mut() = status;
        *out.headers_mut() = headers;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, StatusCode};
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn reqwest_transport_round_trips_status_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/upload"))
            .and(header("authorization", "Bearer abc"))
            .and(body_string("chunk"))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("etag", "\"part-1\"")
                    .set_body_string("done"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new().unwrap();
        let request = Request::builder()
            .method(Method::PUT)
            .uri(format!("{}/upload", server.uri()))
            .header("authorization", "Bearer abc")
            .body(Bytes::from_static(b"chunk"))
            .unwrap();

        let response = transport.execute(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["etag"], "\"part-1\"");
        assert_eq!(response.body().as_ref(), b"done");
    }

    #[tokio::test]
    async fn non_success_status_is_not_a_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("nope"))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new().unwrap();
        let request = Request::get(server.uri()).body(Bytes::new()).unwrap();
        let response = transport.execute(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.body().as_ref(), b"nope");
    }
}
