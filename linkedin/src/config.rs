//! Client configuration.
//!
//! [`ClientOptions`] is the loosely-typed input (deserializable, every field optional or
//! defaulted). [`ClientOptions::validate`] turns it into a [`ClientConfig`], failing fast with
//! [`Error::MissingParameter`] naming every required option that is absent.

use crate::error::{Error, Result};
use crate::{API_VERSION, DEFAULT_SCOPES, RESTLI_PROTOCOL_VERSION};
use oauth2::url::Url;
use oauth2::{AuthUrl, ClientId, ClientSecret, RedirectUrl, Scope, TokenUrl};
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_DELAY_BETWEEN_REQUESTS_MS: u64 = 500;
const DEFAULT_NONCE_EXPIRATION_MS: u64 = 60_000;

/// Recognized client options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub oauth_callback_url: Option<String>,
    /// Scopes requested when [`crate::SessionManager::create_login_url`] is given none.
    pub oauth_scopes: Option<Vec<String>>,
    pub retry_attempts: u32,
    /// Settle delay before finalizing a video, and the base of every retry backoff.
    pub default_delay_between_requests_ms: u64,
    /// Disables every retry loop.
    pub no_retries: bool,
    /// Disables nonce tracking and validation entirely.
    pub no_validate_csrf: bool,
    pub nonce_expiration_ms: u64,
    pub api_version: String,
    pub restli_protocol_version: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            oauth_callback_url: None,
            oauth_scopes: None,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            default_delay_between_requests_ms: DEFAULT_DELAY_BETWEEN_REQUESTS_MS,
            no_retries: false,
            no_validate_csrf: false,
            nonce_expiration_ms: DEFAULT_NONCE_EXPIRATION_MS,
            api_version: API_VERSION.to_string(),
            restli_protocol_version: RESTLI_PROTOCOL_VERSION.to_string(),
        }
    }
}

impl ClientOptions {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        oauth_callback_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: Some(client_id.into()),
            client_secret: Some(client_secret.into()),
            oauth_callback_url: Some(oauth_callback_url.into()),
            ..Self::default()
        }
    }

    /// Reads options from `LINKEDIN_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`Self::from_env`], but reads variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut options = Self {
            client_id: lookup("LINKEDIN_CLIENT_ID"),
            client_secret: lookup("LINKEDIN_CLIENT_SECRET"),
            oauth_callback_url: lookup("LINKEDIN_OAUTH_CALLBACK_URL"),
            ..Self::default()
        };

        if let Some(scopes) = lookup("LINKEDIN_OAUTH_SCOPES") {
            options.oauth_scopes = Some(
                scopes
                    .split([' ', ','])
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
            );
        }
        if let Some(v) = lookup("LINKEDIN_RETRY_ATTEMPTS") {
            options.retry_attempts = parse_number("LINKEDIN_RETRY_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("LINKEDIN_DELAY_BETWEEN_REQUESTS_MS") {
            options.default_delay_between_requests_ms =
                parse_number("LINKEDIN_DELAY_BETWEEN_REQUESTS_MS", &v)?;
        }
        if let Some(v) = lookup("LINKEDIN_NONCE_EXPIRATION_MS") {
            options.nonce_expiration_ms = parse_number("LINKEDIN_NONCE_EXPIRATION_MS", &v)?;
        }
        if let Some(v) = lookup("LINKEDIN_NO_RETRIES") {
            options.no_retries = parse_flag("LINKEDIN_NO_RETRIES", &v)?;
        }
        if let Some(v) = lookup("LINKEDIN_NO_VALIDATE_CSRF") {
            options.no_validate_csrf = parse_flag("LINKEDIN_NO_VALIDATE_CSRF", &v)?;
        }
        Ok(options)
    }

    /// Checks required options and resolves defaults.
    pub fn validate(self) -> Result<ClientConfig> {
        fn present(value: Option<String>) -> Option<String> {
            value.filter(|v| !v.trim().is_empty())
        }

        let client_id = present(self.client_id);
        let client_secret = present(self.client_secret);
        let callback = present(self.oauth_callback_url);

        let missing: Vec<&'static str> = [
            ("client_id", client_id.is_none()),
            ("client_secret", client_secret.is_none()),
            ("oauth_callback_url", callback.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();

        let (Some(client_id), Some(client_secret), Some(callback)) =
            (client_id, client_secret, callback)
        else {
            tracing::error!(missing = ?missing, "missing required client options");
            return Err(Error::MissingParameter {
                parameters: missing,
            });
        };

        let redirect_url = RedirectUrl::new(callback).map_err(|e| Error::InvalidParameter {
            name: "oauth_callback_url",
            reason: e.to_string(),
        })?;

        let scopes = self
            .oauth_scopes
            .unwrap_or_else(|| DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect())
            .into_iter()
            .map(Scope::new)
            .collect();

        Ok(ClientConfig {
            client_id: ClientId::new(client_id),
            client_secret: ClientSecret::new(client_secret),
            redirect_url,
            scopes,
            retry_attempts: if self.no_retries {
                0
            } else {
                self.retry_attempts
            },
            delay_between_requests: Duration::from_millis(self.default_delay_between_requests_ms),
            validate_csrf: !self.no_validate_csrf,
            nonce_expiration: Duration::from_millis(self.nonce_expiration_ms),
            api_version: self.api_version,
            restli_protocol_version: self.restli_protocol_version,
            endpoints: Endpoints::default(),
        })
    }
}

fn parse_number<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| Error::InvalidParameter {
            name,
            reason: format!("{value:?}: {e}"),
        })
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(Error::InvalidParameter {
            name,
            reason: format!("{value:?} is not a boolean"),
        }),
    }
}

/// Base URLs of the authorization and resource servers.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub authorization: AuthUrl,
    pub access_token: TokenUrl,
    /// `https://api.linkedin.com/v2`, used for profile and comments.
    pub api_v2: Url,
    /// `https://api.linkedin.com/rest`, used for assets and posts.
    pub rest: Url,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            authorization: AuthUrl::from_url(linkedin_url(
                "https://www.linkedin.com/oauth/v2/authorization",
            )),
            access_token: TokenUrl::from_url(linkedin_url(
                "https://www.linkedin.com/oauth/v2/accessToken",
            )),
            api_v2: linkedin_url("https://api.linkedin.com/v2"),
            rest: linkedin_url("https://api.linkedin.com/rest"),
        }
    }
}

fn linkedin_url(url: &'static str) -> Url {
    Url::parse(url).expect("static LinkedIn URLs are valid")
}

/// Validated configuration shared by every part of the client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub client_id: ClientId,
    pub client_secret: ClientSecret,
    pub redirect_url: RedirectUrl,
    pub scopes: Vec<Scope>,
    /// Retry budget; already zero when retries are disabled.
    pub retry_attempts: u32,
    pub delay_between_requests: Duration,
    pub validate_csrf: bool,
    pub nonce_expiration: Duration,
    pub api_version: String,
    pub restli_protocol_version: String,
    pub endpoints: Endpoints,
}

impl ClientConfig {
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }
}
