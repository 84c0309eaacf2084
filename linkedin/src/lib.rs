//! Client for the LinkedIn REST API.
//!
//! Covers the OAuth 2.0 authorization-code flow (login URLs with single-use CSRF nonces, token
//! exchange and refresh), the access/refresh token lifecycle, and the media upload protocol
//! including chunked video uploads with a bounded finalize retry loop. Thin typed wrappers for
//! profile, post, comment and asset status endpoints sit on top.
//!
//! ```no_run
//! # async fn run() -> linkedin_client::Result<()> {
//! use linkedin_client::{ClientOptions, LinkedinClient};
//!
//! let client = LinkedinClient::new(ClientOptions::new(
//!     "client-id",
//!     "client-secret",
//!     "http://127.0.0.1:8080/callback",
//! ))?;
//! let login = client.login_url(None);
//! println!("open {}", login.url);
//! // ... the user logs in, LinkedIn redirects back with `code` and `state` ...
//! # let (code, state) = ("", "");
//! client.exchange_code(code, state).await?;
//! let me = client.get_self_profile().await?;
//! println!("logged in as {:?}", me.localized_first_name);
//! # Ok(())
//! # }
//! ```

pub mod api;
mod client;
pub mod config;
mod error;
#[cfg(test)]
mod mock;
mod oauth;
mod retry;
pub mod session;
pub mod tokens;
pub mod transport;
pub mod upload;

pub use api::{
    AssetState, AssetStatus, Comment, CommentMessage, Profile, PostPayload, SharedPost,
};
pub use client::LinkedinClient;
pub use config::{ClientConfig, ClientOptions, Endpoints};
pub use error::{ApiErrorCode, Error, Result, TokenKind};
pub use session::{LoginUrl, Nonce, NonceRegistry, SessionManager};
pub use tokens::{AccessToken, RefreshGrant, RefreshToken, TokenPair, TokenResponse, TokenStore};
pub use transport::{HttpTransport, ReqwestTransport, TransportError};
pub use upload::{
    InitializeUploadRequest, MediaKind, MediaSource, PartResult, UploadOutcome, UploadPart,
    UploadTarget, VideoUploadTarget,
};

/// Value sent in the `LinkedIn-Version` header unless overridden.
pub const API_VERSION: &str = "202311";

/// Value sent in the `X-Restli-Protocol-Version` header unless overridden.
pub const RESTLI_PROTOCOL_VERSION: &str = "2.0.0";

/// Scopes requested by a login URL when neither the options nor the caller name any.
pub const DEFAULT_SCOPES: &[&str] = &[
    LinkedinScope::EmailAddress.as_str(),
    LinkedinScope::Sharing.as_str(),
    LinkedinScope::BasicProfile.as_str(),
    LinkedinScope::OrganizationShareWrite.as_str(),
    LinkedinScope::AdsReadWrite.as_str(),
    LinkedinScope::OrganizationShareRead.as_str(),
];

/// OAuth scopes LinkedIn's member authorization flow accepts.
///
/// <https://learn.microsoft.com/en-us/linkedin/shared/authentication/authentication#member-authorization-3-legged-oauth-flow>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkedinScope {
    OpenId,
    Profile,
    LiteProfile,
    BasicProfile,
    AdsReadWrite,
    AdsReportingRead,
    AdsRead,
    EmailAddress,
    Email,
    /// Create, modify and delete posts, comments and reactions on the member's behalf.
    Sharing,
    FirstDegreeConnections,
    OrganizationShareRead,
    OrganizationShareWrite,
    OrganizationAdmin,
    OrganizationAdminRead,
}

impl LinkedinScope {
    pub const fn as_str(self) -> &'static str {
        match self {
            LinkedinScope::OpenId => "openid",
            LinkedinScope::Profile => "profile",
            LinkedinScope::LiteProfile => "r_liteprofile",
            LinkedinScope::BasicProfile => "r_basicprofile",
            LinkedinScope::AdsReadWrite => "rw_ads",
            LinkedinScope::AdsReportingRead => "r_ads_reporting",
            LinkedinScope::AdsRead => "r_ads",
            LinkedinScope::EmailAddress => "r_emailaddress",
            LinkedinScope::Email => "email",
            LinkedinScope::Sharing => "w_member_social",
            LinkedinScope::FirstDegreeConnections => "r_1st_connections_size",
            LinkedinScope::OrganizationShareRead => "r_organization_social",
            LinkedinScope::OrganizationShareWrite => "w_organization_social",
            LinkedinScope::OrganizationAdmin => "rw_organization_admin",
            LinkedinScope::OrganizationAdminRead => "r_organization_admin",
        }
    }
}

impl From<LinkedinScope> for oauth2::Scope {
    fn from(scope: LinkedinScope) -> Self {
        oauth2::Scope::new(scope.as_str().to_string())
    }
}
