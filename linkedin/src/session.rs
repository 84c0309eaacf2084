//! Login URLs and anti-CSRF nonces.
//!
//! Each login URL embeds a fresh nonce as its `state` parameter. The nonce is remembered in a
//! [`NonceRegistry`] until it is either consumed by the matching callback or its TTL runs out,
//! so a callback can be accepted at most once and only shortly after the URL was issued.

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use oauth2::url::Url;
use oauth2::{CsrfToken, Scope};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// Random bytes behind every nonce, before base64url encoding.
const NONCE_BYTES: u32 = 32;

/// The `state` value binding one login URL to its callback.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Nonce(String);

impl Nonce {
    fn random() -> Self {
        Self(CsrfToken::new_random_len(NONCE_BYTES).secret().clone())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

/// An authorization URL and the nonce embedded in it.
#[derive(Debug, Clone)]
pub struct LoginUrl {
    pub url: Url,
    pub nonce: Nonce,
}

#[derive(Debug)]
struct PendingNonce {
    issued_at: Instant,
    ttl: Duration,
    expiry: Option<AbortHandle>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    pending: Mutex<HashMap<String, PendingNonce>>,
}

impl RegistryInner {
    fn remove(&self, nonce: &str) -> Option<PendingNonce> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(nonce)
    }
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        let pending = self
            .pending
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for (_, entry) in pending.drain() {
            if let Some(expiry) = entry.expiry {
                expiry.abort();
            }
        }
    }
}

/// The set of nonces issued but not yet consumed.
///
/// Cloning is cheap and yields a handle to the same set. Every insertion schedules a background
/// removal after its TTL; consumption cancels that removal. When the last handle is dropped, all
/// outstanding removals are aborted.
#[derive(Debug, Clone, Default)]
pub struct NonceRegistry {
    inner: Arc<RegistryInner>,
}

static PROCESS_WIDE: LazyLock<NonceRegistry> = LazyLock::new(NonceRegistry::new);

impl NonceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry shared by everything in the process that asks for it.
    pub fn process_wide() -> Self {
        PROCESS_WIDE.clone()
    }

    /// Remembers `nonce` for `ttl`.
    ///
    /// The background removal only runs when called from within a tokio runtime. Expiry is
    /// enforced on [`Self::consume`] either way, and expired entries are pruned on every insert.
    pub fn insert(&self, nonce: &Nonce, ttl: Duration) {
        let key = nonce.secret().to_string();
        {
            let mut pending = self.lock();
            prune_expired(&mut pending);
            let previous = pending.insert(
                key.clone(),
                PendingNonce {
                    issued_at: Instant::now(),
                    ttl,
                    expiry: None,
                },
            );
            if let Some(expiry) = previous.and_then(|p| p.expiry) {
                expiry.abort();
            }
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let registry = Arc::downgrade(&self.inner);
        let expiry = runtime
            .spawn({
                let key = key.clone();
                async move {
                    tokio::time::sleep(ttl).await;
                    expire(registry, &key);
                }
            })
            .abort_handle();
        match self.lock().get_mut(&key) {
            Some(entry) => entry.expiry = Some(expiry),
            // already consumed or expired
            None => expiry.abort(),
        }
    }

    /// Removes `nonce`, returning whether it was pending and still within its TTL.
    pub fn consume(&self, nonce: &str) -> bool {
        let Some(entry) = self.inner.remove(nonce) else {
            return false;
        };
        if let Some(expiry) = entry.expiry {
            expiry.abort();
        }
        entry.issued_at.elapsed() < entry.ttl
    }

    pub fn contains(&self, nonce: &str) -> bool {
        self.lock()
            .get(nonce)
            .is_some_and(|entry| entry.issued_at.elapsed() < entry.ttl)
    }

    /// Number of nonces still within their TTL.
    pub fn len(&self) -> usize {
        let mut pending = self.lock();
        prune_expired(&mut pending);
        pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingNonce>> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drops entries past their TTL whose expiry task never ran, e.g. without a runtime or after
/// the spawning runtime shut down.
fn prune_expired(pending: &mut HashMap<String, PendingNonce>) {
    pending.retain(|_, entry| {
        let live = entry.issued_at.elapsed() < entry.ttl;
        if !live {
            if let Some(expiry) = entry.expiry.take() {
                expiry.abort();
            }
        }
        live
    });
}

fn expire(registry: Weak<RegistryInner>, nonce: &str) {
    if let Some(registry) = registry.upgrade() {
        if registry.remove(nonce).is_some() {
            tracing::debug!("login nonce expired before use");
        }
    }
}

/// Issues login URLs and validates the `state` returned to the callback.
#[derive(Debug, Clone)]
pub struct SessionManager {
    authorization_url: Url,
    client_id: String,
    redirect_url: String,
    default_scopes: Vec<Scope>,
    validate_csrf: bool,
    nonce_ttl: Duration,
    registry: NonceRegistry,
}

impl SessionManager {
    pub fn new(config: &ClientConfig, registry: NonceRegistry) -> Self {
        Self {
            authorization_url: config.endpoints.authorization.url().clone(),
            client_id: config.client_id.as_str().to_string(),
            redirect_url: config.redirect_url.as_str().to_string(),
            default_scopes: config.scopes.clone(),
            validate_csrf: config.validate_csrf,
            nonce_ttl: config.nonce_expiration,
            registry,
        }
    }

    pub fn registry(&self) -> &NonceRegistry {
        &self.registry
    }

    /// Builds an authorization URL for `scopes` (or the configured defaults).
    #[tracing::instrument(skip(self))]
    pub fn create_login_url(&self, scopes: Option<&[Scope]>) -> LoginUrl {
        let nonce = Nonce::random();
        let scope = scopes
            .unwrap_or(self.default_scopes.as_slice())
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        // LinkedIn wants %20 between scopes; form encoding produces '+', and no other '+' can
        // survive form encoding unescaped.
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_url)
            .append_pair("response_type", "code")
            .append_pair("state", nonce.secret())
            .append_pair("scope", &scope)
            .finish()
            .replace('+', "%20");

        let mut url = self.authorization_url.clone();
        url.set_query(Some(&query));

        if self.validate_csrf {
            self.registry.insert(&nonce, self.nonce_ttl);
        }

        tracing::debug!(url = %url, "created login url");
        LoginUrl { url, nonce }
    }

    /// Accepts `nonce` once, if it was issued here and has not expired.
    ///
    /// Always succeeds when CSRF validation is disabled.
    pub fn consume_nonce(&self, nonce: &str) -> Result<()> {
        if !self.validate_csrf {
            return Ok(());
        }
        if self.registry.consume(nonce) {
            Ok(())
        } else {
            tracing::warn!("rejected unknown, reused or expired login nonce");
            Err(Error::InvalidState {
                nonce: nonce.to_string(),
            })
        }
    }
}
