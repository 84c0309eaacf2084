//! Access/refresh token types and the in-memory token store.

use crate::error::{Error, Result, TokenKind};
use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{PoisonError, RwLock};

macro_rules! secret_token {
    ($(#[$attr:meta])* $name:ident, $kind:expr) => {
        $(#[$attr])*
        #[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw token, rejecting empty values.
            pub fn new(raw: impl Into<String>) -> Result<Self> {
                let raw = raw.into();
                if raw.trim().is_empty() {
                    return Err(Error::NoSavedToken($kind));
                }
                Ok(Self(raw))
            }

            pub fn secret(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(concat!(stringify!($name), "([redacted])"))
            }
        }

        impl TryFrom<String> for $name {
            type Error = Error;

            fn try_from(raw: String) -> Result<Self> {
                Self::new(raw)
            }
        }

        impl From<$name> for String {
            fn from(token: $name) -> String {
                token.0
            }
        }
    };
}

secret_token!(
    /// An OAuth access token, sent as `Authorization: Bearer <token>`.
    AccessToken,
    TokenKind::Access
);
secret_token!(
    /// An OAuth refresh token, exchanged for a new [`TokenPair`].
    RefreshToken,
    TokenKind::Refresh
);

/// A refresh token together with the instant it stops being accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshGrant {
    pub token: RefreshToken,
    pub expires_at: Timestamp,
}

/// The token pair issued by the authorization server, with absolute expiry instants.
///
/// Pairs are created and replaced wholesale; there is no way to update one half in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: AccessToken,
    pub access_expires_at: Timestamp,
    pub refresh: Option<RefreshGrant>,
}

impl TokenPair {
    pub fn new(access_token: AccessToken, access_expires_at: Timestamp) -> Self {
        Self {
            access_token,
            access_expires_at,
            refresh: None,
        }
    }

    pub fn with_refresh(mut self, token: RefreshToken, expires_at: Timestamp) -> Self {
        self.refresh = Some(RefreshGrant { token, expires_at });
        self
    }

    /// Converts a wire response, turning relative lifetimes into absolute instants once.
    ///
    /// A refresh token is only kept when its lifetime is also present.
    pub fn from_response(response: TokenResponse, now: Timestamp) -> Result<Self> {
        let access_token = AccessToken::new(response.access_token)?;
        let access_expires_at = expires_after(now, response.expires_in);

        let refresh = match (response.refresh_token, response.refresh_token_expires_in) {
            (Some(token), Some(lifetime)) if !token.trim().is_empty() => Some(RefreshGrant {
                token: RefreshToken::new(token)?,
                expires_at: expires_after(now, lifetime),
            }),
            (Some(_), None) => {
                tracing::warn!("refresh token without a lifetime, discarding it");
                None
            }
            _ => None,
        };

        Ok(Self {
            access_token,
            access_expires_at,
            refresh,
        })
    }
}

fn expires_after(now: Timestamp, seconds: u64) -> Timestamp {
    let seconds = i64::try_from(seconds).unwrap_or(i64::MAX);
    now.checked_add(SignedDuration::from_secs(seconds))
        .unwrap_or(Timestamp::MAX)
}

/// Body of a successful `POST /oauth/v2/accessToken`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Seconds until the access token expires.
    pub expires_in: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Seconds until the refresh token expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token_expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Parses and validates a raw response body against the token schema.
    pub fn parse(body: &[u8]) -> Result<Self> {
        let response: Self =
            serde_json::from_slice(body).map_err(|source| Error::InvalidTokenResponse {
                body: String::from_utf8_lossy(body).into_owned(),
                source,
            })?;
        if response.access_token.trim().is_empty() {
            return Err(Error::InvalidTokenResponse {
                body: String::from_utf8_lossy(body).into_owned(),
                source: <serde_json::Error as serde::de::Error>::invalid_value(
                    serde::de::Unexpected::Str(""),
                    &"a non-empty access_token",
                ),
            });
        }
        Ok(response)
    }
}

/// Holds the current [`TokenPair`].
///
/// Reads never refresh: an absent or expired token is reported as an error so the caller can
/// decide whether to refresh or send the user through the login flow again.
#[derive(Debug, Default)]
pub struct TokenStore {
    pair: RwLock<Option<TokenPair>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_tokens(&self, pair: TokenPair) {
        *self.pair.write().unwrap_or_else(PoisonError::into_inner) = Some(pair);
    }

    /// Converts `response` relative to the current time and stores the result.
    pub fn set_from_response(&self, response: TokenResponse) -> Result<TokenPair> {
        let pair = TokenPair::from_response(response, Timestamp::now())?;
        self.set_tokens(pair.clone());
        Ok(pair)
    }

    pub fn clear_tokens(&self) {
        *self.pair.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// A copy of the current pair, e.g. for the caller to persist.
    pub fn snapshot(&self) -> Option<TokenPair> {
        self.pair
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn access_token(&self) -> Result<AccessToken> {
        self.access_token_at(Timestamp::now())
    }

    /// The access token as of `now`. A token is expired from its expiry instant onwards.
    pub fn access_token_at(&self, now: Timestamp) -> Result<AccessToken> {
        let guard = self.pair.read().unwrap_or_else(PoisonError::into_inner);
        let pair = guard
            .as_ref()
            .ok_or(Error::NoSavedToken(TokenKind::Access))?;
        if now >= pair.access_expires_at {
            return Err(Error::ExpiredToken(TokenKind::Access));
        }
        Ok(pair.access_token.clone())
    }

    pub fn access_token_expiration(&self) -> Result<Timestamp> {
        self.pair
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|pair| pair.access_expires_at)
            .ok_or(Error::NoSavedToken(TokenKind::Access))
    }

    pub fn refresh_token(&self) -> Result<RefreshToken> {
        self.refresh_token_at(Timestamp::now())
    }

    pub fn refresh_token_at(&self, now: Timestamp) -> Result<RefreshToken> {
        let guard = self.pair.read().unwrap_or_else(PoisonError::into_inner);
        let grant = guard
            .as_ref()
            .and_then(|pair| pair.refresh.as_ref())
            .ok_or(Error::NoSavedToken(TokenKind::Refresh))?;
        if now >= grant.expires_at {
            return Err(Error::ExpiredToken(TokenKind::Refresh));
        }
        Ok(grant.token.clone())
    }

    pub fn refresh_token_expiration(&self) -> Result<Timestamp> {
        self.pair
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|pair| pair.refresh.as_ref())
            .map(|grant| grant.expires_at)
            .ok_or(Error::NoSavedToken(TokenKind::Refresh))
    }
}
