use crate::client::{LinkedinClient, decode_json};
use crate::error::{ApiErrorCode, Error, Result};
use crate::transport::HttpTransport;
use http::Method;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::instrument;

/// The authenticated member, as returned by `GET /v2/me`.
///
/// Which fields are present depends on the scopes granted at login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub localized_first_name: Option<String>,
    pub localized_last_name: Option<String>,
    pub localized_headline: Option<String>,
    pub vanity_name: Option<String>,
    pub first_name: Option<LocalizedProperty>,
    pub last_name: Option<LocalizedProperty>,
    pub headline: Option<LocalizedProperty>,
    pub profile_picture: Option<DisplayImage>,
}

impl Profile {
    /// The member URN used as `author`/`owner`/`actor` in other requests.
    pub fn urn(&self) -> String {
        format!("urn:li:person:{}", self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalizedProperty {
    /// Values keyed by locale, e.g. `en_US`.
    pub localized: BTreeMap<String, String>,
    pub preferred_locale: PreferredLocale,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferredLocale {
    pub country: String,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayImage {
    pub display_image: String,
}

impl<T: HttpTransport> LinkedinClient<T> {
    #[instrument(skip(self))]
    pub async fn get_self_profile(&self) -> Result<Profile> {
        let access_token = self.tokens.access_token()?;
        let request = self.empty_request(Method::GET, &self.api_v2_url("me"), &access_token)?;
        let response = self.send(request).await?;

        if !response.status().is_success() {
            tracing::error!(status = %response.status(), "failed to get user profile");
            return Err(Error::api(
                ApiErrorCode::FailedGetProfile,
                response.status(),
                response.body(),
            ));
        }
        decode_json(&response, ApiErrorCode::FailedGetProfile)
    }
}
