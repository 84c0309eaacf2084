use crate::client::{LinkedinClient, decode_json, encode_urn};
use crate::error::{ApiErrorCode, Error, Result};
use crate::transport::HttpTransport;
use crate::upload::MediaKind;
use http::Method;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Processing state of an uploaded asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetState {
    WaitingUpload,
    Processing,
    Available,
    Success,
    ProcessingFailed,
    #[serde(other)]
    Unknown,
}

impl AssetState {
    /// Whether the asset can be attached to a post.
    pub fn is_ready(self) -> bool {
        matches!(self, AssetState::Available | AssetState::Success)
    }

    /// Whether the state will not change any more without a new upload.
    pub fn is_final(self) -> bool {
        matches!(
            self,
            AssetState::Available | AssetState::Success | AssetState::ProcessingFailed
        )
    }
}

/// An image, document or video as returned by `GET /rest/<kind>s/<urn>`.
///
/// Only `status` is always present; the rest depends on the kind and state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetStatus {
    pub status: AssetState,
    pub id: Option<String>,
    pub owner: Option<String>,
    pub download_url: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub download_url_expires_at: Option<i64>,
    pub processing_failure_reason: Option<String>,
    pub thumbnail: Option<String>,
    pub captions: Option<String>,
    /// Video length in milliseconds.
    pub duration: Option<u64>,
    #[serde(alias = "aspectRationWidth")]
    pub aspect_ratio_width: Option<f64>,
    #[serde(alias = "aspectRationHeight")]
    pub aspect_ratio_height: Option<f64>,
}

impl<T: HttpTransport> LinkedinClient<T> {
    #[instrument(skip(self))]
    pub async fn get_asset_status(&self, kind: MediaKind, urn: &str) -> Result<AssetStatus> {
        let access_token = self.tokens.access_token()?;
        let url = self.rest_url(&format!("{}/{}", kind.collection(), encode_urn(urn)));
        let request = self.empty_request(Method::GET, &url, &access_token)?;
        let response = self.send(request).await?;

        if !response.status().is_success() {
            return Err(Error::api(
                ApiErrorCode::FailedGetAssetStatus,
                response.status(),
                response.body(),
            ));
        }
        let status: AssetStatus = decode_json(&response, ApiErrorCode::FailedGetAssetStatus)?;
        tracing::debug!(state = ?status.status, "asset status");
        Ok(status)
    }
}
