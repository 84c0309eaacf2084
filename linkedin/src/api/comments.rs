use crate::client::{LinkedinClient, decode_json, encode_urn};
use crate::error::{ApiErrorCode, Error, Result};
use crate::retry::Attempt;
use crate::transport::HttpTransport;
use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::instrument;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentMessage {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStamp {
    pub actor: String,
    pub impersonator: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub time: i64,
}

/// A comment as returned by `socialActions/{urn}/comments`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub actor: String,
    pub object: String,
    pub message: CommentMessage,
    pub id: Option<String>,
    pub comment_urn: Option<String>,
    pub parent_comment: Option<String>,
    pub agent: Option<String>,
    pub created: Option<AuditStamp>,
    pub last_modified: Option<AuditStamp>,
}

#[derive(Serialize)]
struct NewComment<'a> {
    actor: &'a str,
    object: &'a str,
    message: NewCommentMessage<'a>,
}

#[derive(Serialize)]
struct NewCommentMessage<'a> {
    text: &'a str,
}

impl<T: HttpTransport> LinkedinClient<T> {
    /// Comments on `post_urn` as `author_urn`.
    ///
    /// A freshly shared post can take a moment to become visible to the comments endpoint, so a
    /// `404` is retried with the same backoff as video finalization. Every other failure is
    /// returned immediately.
    #[instrument(skip(self, text))]
    pub async fn post_comment(&self, post_urn: &str, author_urn: &str, text: &str) -> Result<Comment> {
        let access_token = self.tokens.access_token()?;
        let url = self.api_v2_url(&format!("socialActions/{}/comments", encode_urn(post_urn)));
        let body = NewComment {
            actor: author_urn,
            object: post_urn,
            message: NewCommentMessage { text },
        };

        let (url, body, access_token) = (url.as_str(), &body, &access_token);
        let comment: Comment = self
            .retry
            .run("post comment", || async move {
                let request = match self.json_request(Method::POST, url, access_token, body) {
                    Ok(request) => request,
                    Err(e) => return Attempt::Done(Err(e)),
                };
                let response = match self.send(request).await {
                    Ok(response) => response,
                    Err(e) => return Attempt::Done(Err(e)),
                };
                let status = response.status();
                if status == StatusCode::NOT_FOUND {
                    Attempt::Transient(Error::api(
                        ApiErrorCode::FailedPostComment,
                        status,
                        response.body(),
                    ))
                } else if status.is_success() {
                    Attempt::Done(decode_json(&response, ApiErrorCode::FailedPostComment))
                } else {
                    tracing::warn!(%status, "failed to post comment");
                    Attempt::Done(Err(Error::api(
                        ApiErrorCode::FailedPostComment,
                        status,
                        response.body(),
                    )))
                }
            })
            .await?;

        tracing::info!(comment_urn = comment.comment_urn.as_deref(), "comment posted");
        Ok(comment)
    }
}
