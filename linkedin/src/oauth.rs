//! OAuth 2.0 token exchange and refresh against LinkedIn's authorization server.
//!
//! LinkedIn's token endpoint returns a non-standard body (no `token_type`, plus a
//! `refresh_token_expires_in`), so the form POST and schema validation are done here directly
//! rather than through a generic OAuth token client.

use crate::client::{LinkedinClient, body_text};
use crate::error::{ApiErrorCode, Error, Result};
use crate::tokens::{RefreshToken, TokenPair, TokenResponse};
use crate::transport::HttpTransport;
use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{Method, Request, Response};
use tracing::instrument;

impl<T: HttpTransport> LinkedinClient<T> {
    /// Exchanges the `code` handed to the OAuth callback for a token pair.
    ///
    /// `nonce` is the `state` value from the same callback. It is checked and consumed before any
    /// network traffic, so a forged or replayed callback never reaches LinkedIn. On success the
    /// new pair replaces whatever the token store held.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidState`] if the nonce was never issued, was already used, or expired
    /// * [`Error::Api`] if LinkedIn rejects the exchange
    /// * [`Error::InvalidTokenResponse`] if the response body does not match the token schema
    #[instrument(skip_all)]
    pub async fn exchange_code(&self, code: &str, nonce: &str) -> Result<TokenPair> {
        self.session.consume_nonce(nonce)?;

        let response = self
            .post_token_form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.redirect_url.as_str()),
            ])
            .await?;

        if !response.status().is_success() {
            tracing::error!(status = %response.status(), "authorization code exchange rejected");
            return Err(Error::api(
                ApiErrorCode::FailedTokenExchange,
                response.status(),
                response.body(),
            ));
        }

        let token = TokenResponse::parse(response.body())?;
        let pair = self.tokens.set_from_response(token)?;
        tracing::info!(
            access_expires_at = %pair.access_expires_at,
            has_refresh_token = pair.refresh.is_some(),
            "exchanged authorization code for tokens"
        );
        Ok(pair)
    }

    /// Trades a refresh token for a new token pair.
    ///
    /// Uses the stored refresh token when `refresh_token` is `None`.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(pair))` - refresh succeeded and the token store now holds `pair`
    /// * `Ok(None)` - LinkedIn refused the refresh; the user has to log in again
    /// * `Err(_)` - no usable refresh token, transport failure, or a malformed response
    ///
    /// Unlike [`Self::exchange_code`], a rejected refresh is not an error: the expected recovery
    /// is a fresh login, not a retry.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: Option<&RefreshToken>) -> Result<Option<TokenPair>> {
        let refresh_token = match refresh_token {
            Some(token) => token.clone(),
            None => self.tokens.refresh_token()?,
        };

        tracing::debug!("attempting to refresh OAuth token");
        let response = self
            .post_token_form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.secret()),
            ])
            .await?;

        if !response.status().is_success() {
            tracing::error!(
                status = %response.status(),
                body = %body_text(&response),
                "failed to refresh token"
            );
            return Ok(None);
        }

        let token = TokenResponse::parse(response.body())?;
        let pair = self.tokens.set_from_response(token)?;
        tracing::info!(access_expires_at = %pair.access_expires_at, "refreshed OAuth token");
        Ok(Some(pair))
    }

    async fn post_token_form(&self, params: &[(&str, &str)]) -> Result<Response<Bytes>> {
        let body = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .append_pair("client_id", self.config.client_id.as_str())
            .append_pair("client_secret", self.config.client_secret.secret())
            .finish();

        let request = Request::builder()
            .method(Method::POST)
            .uri(self.config.endpoints.access_token.as_str())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(ACCEPT, "application/json")
            .body(Bytes::from(body))
            .map_err(|e| Error::InvalidParameter {
                name: "access_token_url",
                reason: e.to_string(),
            })?;

        self.send(request).await
    }
}
