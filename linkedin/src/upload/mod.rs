//! Asset uploads: negotiating an upload target and pushing media bytes to it.
//!
//! Every upload starts with [`LinkedinClient::initialize_upload`], which registers an asset and
//! returns where to send its bytes. Images and documents take a single PUT
//! ([`LinkedinClient::upload_image_or_document`]); videos come with one upload URL per byte range
//! and go through [`LinkedinClient::upload_video`].

mod video;

pub use video::{PartResult, UploadOutcome};

use crate::client::{LinkedinClient, body_text};
use crate::error::{ApiErrorCode, Error, Result};
use crate::transport::HttpTransport;
use bytes::Bytes;
use http::{Method, Request};
use oauth2::url::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tracing::instrument;

/// The asset types LinkedIn accepts uploads for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Document,
    Video,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Document => "document",
            MediaKind::Video => "video",
        }
    }

    /// The REST collection holding assets of this kind.
    pub fn collection(self) -> &'static str {
        match self {
            MediaKind::Image => "images",
            MediaKind::Document => "documents",
            MediaKind::Video => "videos",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetOwner {
    pub owner: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoUploadRequest {
    pub owner: String,
    pub file_size_bytes: u64,
    pub upload_captions: bool,
    pub upload_thumbnail: bool,
}

/// Body of an `initializeUpload` action, one shape per [`MediaKind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum InitializeUploadRequest {
    Image(AssetOwner),
    Document(AssetOwner),
    Video(VideoUploadRequest),
}

impl InitializeUploadRequest {
    pub fn image(owner: impl Into<String>) -> Self {
        Self::Image(AssetOwner {
            owner: owner.into(),
        })
    }

    pub fn document(owner: impl Into<String>) -> Self {
        Self::Document(AssetOwner {
            owner: owner.into(),
        })
    }

    pub fn video(owner: impl Into<String>, file_size_bytes: u64) -> Self {
        Self::Video(VideoUploadRequest {
            owner: owner.into(),
            file_size_bytes,
            upload_captions: false,
            upload_thumbnail: false,
        })
    }

    /// Asks for a captions upload slot. Only meaningful for videos.
    pub fn with_captions(mut self, captions: bool) -> Self {
        if let Self::Video(video) = &mut self {
            video.upload_captions = captions;
        }
        self
    }

    /// Asks for a thumbnail upload slot. Only meaningful for videos.
    pub fn with_thumbnail(mut self, thumbnail: bool) -> Self {
        if let Self::Video(video) = &mut self {
            video.upload_thumbnail = thumbnail;
        }
        self
    }

    pub fn kind(&self) -> MediaKind {
        match self {
            Self::Image(_) => MediaKind::Image,
            Self::Document(_) => MediaKind::Document,
            Self::Video(_) => MediaKind::Video,
        }
    }

    pub fn owner(&self) -> &str {
        match self {
            Self::Image(AssetOwner { owner }) | Self::Document(AssetOwner { owner }) => owner,
            Self::Video(video) => &video.owner,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InitializeUploadBody<'a> {
    initialize_upload_request: &'a InitializeUploadRequest,
}

/// One byte range of a video and the URL it has to be PUT to. Both bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPart {
    pub upload_url: String,
    pub first_byte: u64,
    pub last_byte: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoUploadTarget {
    pub urn: String,
    pub upload_token: String,
    pub parts: Vec<UploadPart>,
}

/// Where and how to send an asset's bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadTarget {
    Image { urn: String, upload_url: String },
    Document { urn: String, upload_url: String },
    Video(VideoUploadTarget),
}

impl UploadTarget {
    pub fn urn(&self) -> &str {
        match self {
            UploadTarget::Image { urn, .. } | UploadTarget::Document { urn, .. } => urn,
            UploadTarget::Video(video) => &video.urn,
        }
    }

    pub fn kind(&self) -> MediaKind {
        match self {
            UploadTarget::Image { .. } => MediaKind::Image,
            UploadTarget::Document { .. } => MediaKind::Document,
            UploadTarget::Video(_) => MediaKind::Video,
        }
    }
}

#[derive(Deserialize)]
struct InitializeUploadResponse<V> {
    value: V,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageValue {
    upload_url: String,
    image: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentValue {
    upload_url: String,
    document: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoValue {
    upload_token: String,
    upload_instructions: Vec<UploadPart>,
    video: String,
}

fn parse_value<V: DeserializeOwned>(body: &[u8]) -> Option<V> {
    serde_json::from_slice::<InitializeUploadResponse<V>>(body)
        .ok()
        .map(|response| response.value)
}

/// Where to read media bytes from.
#[derive(Debug, Clone)]
pub enum MediaSource {
    Bytes(Bytes),
    /// Downloaded with a plain, unauthenticated GET.
    Url(Url),
    File(PathBuf),
}

impl From<Bytes> for MediaSource {
    fn from(bytes: Bytes) -> Self {
        MediaSource::Bytes(bytes)
    }
}

impl From<Vec<u8>> for MediaSource {
    fn from(bytes: Vec<u8>) -> Self {
        MediaSource::Bytes(Bytes::from(bytes))
    }
}

impl From<Url> for MediaSource {
    fn from(url: Url) -> Self {
        MediaSource::Url(url)
    }
}

impl From<PathBuf> for MediaSource {
    fn from(path: PathBuf) -> Self {
        MediaSource::File(path)
    }
}

impl<T: HttpTransport> LinkedinClient<T> {
    /// Registers a new asset and returns where its bytes have to go.
    ///
    /// # Errors
    ///
    /// [`Error::UploadInit`] when LinkedIn answers with a non-success status, or with a body
    /// that lacks the `value` expected for the requested kind.
    #[instrument(skip_all, fields(kind = %request.kind()))]
    pub async fn initialize_upload(&self, request: &InitializeUploadRequest) -> Result<UploadTarget> {
        let access_token = self.tokens.access_token()?;
        let kind = request.kind();
        let url = self.rest_url(&format!("{}?action=initializeUpload", kind.collection()));

        let request = self.json_request(
            Method::POST,
            &url,
            &access_token,
            &InitializeUploadBody {
                initialize_upload_request: request,
            },
        )?;
        let response = self.send(request).await?;

        let target = if response.status().is_success() {
            let body = response.body();
            match kind {
                MediaKind::Image => parse_value::<ImageValue>(body).map(|v| UploadTarget::Image {
                    urn: v.image,
                    upload_url: v.upload_url,
                }),
                MediaKind::Document => {
                    parse_value::<DocumentValue>(body).map(|v| UploadTarget::Document {
                        urn: v.document,
                        upload_url: v.upload_url,
                    })
                }
                MediaKind::Video => parse_value::<VideoValue>(body).map(|v| {
                    UploadTarget::Video(VideoUploadTarget {
                        urn: v.video,
                        upload_token: v.upload_token,
                        parts: v.upload_instructions,
                    })
                }),
            }
        } else {
            None
        };

        let Some(target) = target else {
            tracing::error!(status = %response.status(), "upload initialization failed");
            return Err(Error::UploadInit {
                kind,
                status: response.status(),
                body: body_text(&response),
            });
        };
        tracing::debug!(urn = target.urn(), "upload initialized");
        Ok(target)
    }

    /// PUTs a whole image or document to the `upload_url` from [`Self::initialize_upload`].
    #[instrument(skip(self, source))]
    pub async fn upload_image_or_document(&self, upload_url: &str, source: MediaSource) -> Result<()> {
        let access_token = self.tokens.access_token()?;
        let payload = self.load_media(source).await?;
        let size = payload.len();

        let request = self.octet_stream_put(upload_url, &access_token, payload)?;
        let response = self.send(request).await?;
        if !response.status().is_success() {
            tracing::error!(status = %response.status(), "failed to upload asset");
            return Err(Error::api(
                ApiErrorCode::FailedImageOrDocumentUpload,
                response.status(),
                response.body(),
            ));
        }

        tracing::info!(bytes = size, "uploaded asset");
        Ok(())
    }

    /// Initializes an upload and sends `source` to it, returning the new asset's URN.
    ///
    /// The media is loaded before initialization; for videos the declared file size is replaced
    /// by the actual payload length.
    #[instrument(skip_all, fields(kind = %request.kind()))]
    pub async fn upload(&self, request: InitializeUploadRequest, source: MediaSource) -> Result<String> {
        let payload = self.load_media(source).await?;
        let request = match request {
            InitializeUploadRequest::Video(mut video) => {
                video.file_size_bytes = payload.len() as u64;
                InitializeUploadRequest::Video(video)
            }
            other => other,
        };

        match self.initialize_upload(&request).await? {
            UploadTarget::Image { urn, upload_url } | UploadTarget::Document { urn, upload_url } => {
                self.upload_image_or_document(&upload_url, MediaSource::Bytes(payload))
                    .await?;
                Ok(urn)
            }
            UploadTarget::Video(target) => {
                let UploadOutcome::Finalized { urn, .. } = self
                    .upload_video(&target, MediaSource::Bytes(payload))
                    .await?;
                Ok(urn)
            }
        }
    }

    /// Resolves `source` into the bytes to upload.
    pub(crate) async fn load_media(&self, source: MediaSource) -> Result<Bytes> {
        match source {
            MediaSource::Bytes(bytes) => Ok(bytes),
            MediaSource::File(path) => match tokio::fs::read(&path).await {
                Ok(contents) => Ok(Bytes::from(contents)),
                Err(e) => Err(Error::DownloadMedia {
                    source_description: path.display().to_string(),
                    reason: e.to_string(),
                }),
            },
            MediaSource::Url(url) => {
                let request = Request::get(url.as_str())
                    .body(Bytes::new())
                    .map_err(|e| Error::DownloadMedia {
                        source_description: url.to_string(),
                        reason: e.to_string(),
                    })?;
                let response = self.send(request).await?;
                if !response.status().is_success() {
                    tracing::error!(status = %response.status(), %url, "failed to download media");
                    return Err(Error::DownloadMedia {
                        source_description: url.to_string(),
                        reason: format!("status {}: {}", response.status(), body_text(&response)),
                    });
                }
                tracing::debug!(%url, bytes = response.body().len(), "downloaded media");
                Ok(response.into_body())
            }
        }
    }
}
