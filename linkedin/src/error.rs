//! Error taxonomy for the LinkedIn client.
//!
//! Every failure surfaced by the library is a variant of [`Error`]. Each variant carries a stable,
//! machine-readable [`Error::code`] so callers can branch on the failing stage without matching
//! on display strings.

use crate::transport::TransportError;
use crate::upload::MediaKind;
use http::StatusCode;
use std::fmt;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Which half of a token pair an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    fn as_str(self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }

    fn as_code(self) -> &'static str {
        match self {
            TokenKind::Access => "ACCESS",
            TokenKind::Refresh => "REFRESH",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The operation that produced an [`Error::Api`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorCode {
    FailedTokenExchange,
    FailedImageOrDocumentUpload,
    FailedVideoChunkUpload,
    FailedGetProfile,
    FailedSharePost,
    FailedPostId,
    FailedPostComment,
    FailedGetAssetStatus,
}

impl ApiErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ApiErrorCode::FailedTokenExchange => "FAILED_TOKEN_EXCHANGE",
            ApiErrorCode::FailedImageOrDocumentUpload => "FAILED_IMAGE_OR_DOCUMENT_UPLOAD",
            ApiErrorCode::FailedVideoChunkUpload => "FAILED_VIDEO_CHUNK_UPLOAD",
            ApiErrorCode::FailedGetProfile => "FAILED_GET_PROFILE",
            ApiErrorCode::FailedSharePost => "FAILED_SHARE_POST",
            ApiErrorCode::FailedPostId => "FAILED_POST_ID",
            ApiErrorCode::FailedPostComment => "FAILED_POST_COMMENT",
            ApiErrorCode::FailedGetAssetStatus => "FAILED_GET_ASSET_STATUS",
        }
    }
}

impl fmt::Display for ApiErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("missing parameter(s): {}", .parameters.join(", "))]
    MissingParameter { parameters: Vec<&'static str> },

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("could not find a saved {0} token, please perform the log in process")]
    NoSavedToken(TokenKind),

    #[error("saved {0} token is expired, please perform the log in process")]
    ExpiredToken(TokenKind),

    #[error("nonce {nonce} could not be found in the state")]
    InvalidState { nonce: String },

    #[error("access token response did not match the expected schema: {body}")]
    InvalidTokenResponse {
        body: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to initialize {kind} upload (status: {status}): {body}")]
    UploadInit {
        kind: MediaKind,
        status: StatusCode,
        body: String,
    },

    #[error("upload instructions do not fit the payload: {reason}")]
    InvalidUploadInstructions { reason: String },

    #[error("failed to load media from {source_description}: {reason}")]
    DownloadMedia {
        source_description: String,
        reason: String,
    },

    #[error("failed to finalize video upload (status: {status}): {body}")]
    FinalizeUpload { status: StatusCode, body: String },

    #[error("error when calling LinkedIn API (status: {status}, code: {code}): {body}")]
    Api {
        code: ApiErrorCode,
        status: StatusCode,
        body: String,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl Error {
    /// A stable identifier for the failing stage, e.g. `FAILED_VIDEO_UPLOAD_FINALIZE`.
    pub fn code(&self) -> String {
        match self {
            Error::MissingParameter { .. } => "MISSING_PARAMETER".to_string(),
            Error::InvalidParameter { .. } => "INVALID_PARAMETER".to_string(),
            Error::NoSavedToken(kind) => format!("NO_SAVED_{}_TOKEN", kind.as_code()),
            Error::ExpiredToken(kind) => format!("EXPIRED_{}_TOKEN", kind.as_code()),
            Error::InvalidState { .. } => "INVALID_STATE".to_string(),
            Error::InvalidTokenResponse { .. } => "INVALID_TOKEN_RESPONSE".to_string(),
            Error::UploadInit { kind, .. } => {
                format!("FAILED_{}_UPLOAD_INIT", kind.as_str().to_uppercase())
            }
            Error::InvalidUploadInstructions { .. } => "INVALID_UPLOAD_INSTRUCTIONS".to_string(),
            Error::DownloadMedia { .. } => "FAILED_DOWNLOAD_MEDIA".to_string(),
            Error::FinalizeUpload { .. } => "FAILED_VIDEO_UPLOAD_FINALIZE".to_string(),
            Error::Api { code, .. } => format!("LINKEDIN_API_ERROR_{code}"),
            Error::Transport(_) => "TRANSPORT_ERROR".to_string(),
        }
    }

    /// The HTTP status of the failing response, when the error came from one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::UploadInit { status, .. }
            | Error::FinalizeUpload { status, .. }
            | Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn api(code: ApiErrorCode, status: StatusCode, body: &[u8]) -> Self {
        Error::Api {
            code,
            status,
            body: String::from_utf8_lossy(body).into_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            Error::MissingParameter {
                parameters: vec!["client_id"]
            }
            .code(),
            "MISSING_PARAMETER"
        );
        assert_eq!(
            Error::ExpiredToken(TokenKind::Refresh).code(),
            "EXPIRED_REFRESH_TOKEN"
        );
        assert_eq!(
            Error::NoSavedToken(TokenKind::Access).code(),
            "NO_SAVED_ACCESS_TOKEN"
        );
        assert_eq!(
            Error::UploadInit {
                kind: MediaKind::Video,
                status: StatusCode::BAD_REQUEST,
                body: String::new(),
            }
            .code(),
            "FAILED_VIDEO_UPLOAD_INIT"
        );
        assert_eq!(
            Error::FinalizeUpload {
                status: StatusCode::ACCEPTED,
                body: String::new(),
            }
            .code(),
            "FAILED_VIDEO_UPLOAD_FINALIZE"
        );
        assert_eq!(
            Error::api(ApiErrorCode::FailedPostComment, StatusCode::NOT_FOUND, b"").code(),
            "LINKEDIN_API_ERROR_FAILED_POST_COMMENT"
        );
    }

    #[test]
    fn missing_parameter_lists_every_field() {
        let err = Error::MissingParameter {
            parameters: vec!["client_id", "oauth_callback_url"],
        };
        assert_eq!(
            err.to_string(),
            "missing parameter(s): client_id, oauth_callback_url"
        );
    }
}
