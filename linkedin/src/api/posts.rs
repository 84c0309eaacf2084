use crate::client::LinkedinClient;
use crate::error::{ApiErrorCode, Error, Result};
use crate::transport::HttpTransport;
use http::Method;
use serde::{Deserialize, Serialize};
use tracing::instrument;

const RESTLI_ID: &str = "x-restli-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Visibility {
    Connections,
    Public,
    LoggedIn,
    Container,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeedDistribution {
    None,
    MainFeed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Published,
    Draft,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    pub feed_distribution: FeedDistribution,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_entities: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub third_party_distribution_channels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub source: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

/// An uploaded asset attached to a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostMedia {
    /// Asset URN, e.g. `urn:li:video:...`.
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostContent {
    Article(Article),
    Media(PostMedia),
}

/// Body of `POST /rest/posts`.
///
/// <https://learn.microsoft.com/en-us/linkedin/marketing/community-management/shares/posts-api>
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPayload {
    pub author: String,
    pub visibility: Visibility,
    pub commentary: String,
    pub distribution: Distribution,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<PostContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle_state: Option<LifecycleState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_reshare_disabled_by_author: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_landing_page: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_call_to_action_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ad_context: Option<serde_json::Value>,
}

impl PostPayload {
    /// A published, public text post in the main feed.
    pub fn text(author: impl Into<String>, commentary: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            visibility: Visibility::Public,
            commentary: commentary.into(),
            distribution: Distribution {
                feed_distribution: FeedDistribution::MainFeed,
                target_entities: None,
                third_party_distribution_channels: Vec::new(),
            },
            content: None,
            lifecycle_state: Some(LifecycleState::Published),
            is_reshare_disabled_by_author: Some(false),
            container: None,
            content_landing_page: None,
            content_call_to_action_label: None,
            ad_context: None,
        }
    }

    pub fn with_media(mut self, urn: impl Into<String>, title: impl Into<String>) -> Self {
        self.content = Some(PostContent::Media(PostMedia {
            id: urn.into(),
            title: title.into(),
        }));
        self
    }

    pub fn with_article(mut self, article: Article) -> Self {
        self.content = Some(PostContent::Article(article));
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }
}

/// A post LinkedIn accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct SharedPost {
    pub post_urn: String,
    pub post_url: String,
    pub payload: PostPayload,
}

impl<T: HttpTransport> LinkedinClient<T> {
    /// Publishes a post. The new post's URN comes back in the `x-restli-id` header.
    #[instrument(skip_all, fields(author = %payload.author))]
    pub async fn share_post(&self, payload: &PostPayload) -> Result<SharedPost> {
        let access_token = self.tokens.access_token()?;
        let request =
            self.json_request(Method::POST, &self.rest_url("posts"), &access_token, payload)?;
        let response = self.send(request).await?;

        if !response.status().is_success() {
            tracing::error!(status = %response.status(), "failed to share post");
            return Err(Error::api(
                ApiErrorCode::FailedSharePost,
                response.status(),
                response.body(),
            ));
        }

        let Some(post_urn) = response
            .headers()
            .get(RESTLI_ID)
            .and_then(|id| id.to_str().ok())
            .filter(|id| !id.is_empty())
        else {
            tracing::error!("post was shared but no id came back");
            return Err(Error::api(
                ApiErrorCode::FailedPostId,
                response.status(),
                b"",
            ));
        };

        tracing::info!(post_urn, "post shared");
        Ok(SharedPost {
            post_urn: post_urn.to_string(),
            post_url: format!("https://www.linkedin.com/feed/update/{post_urn}"),
            payload: payload.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{self, MockResponse, MockTransport};
    use http::StatusCode;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const POSTS: &str = "https://api.linkedin.com/rest/posts";

    #[test]
    fn payload_serializes_like_the_posts_api_expects() {
        let payload = PostPayload::text("urn:li:person:1", "hello")
            .with_media("urn:li:video:2", "clip");
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({
                "author": "urn:li:person:1",
                "visibility": "PUBLIC",
                "commentary": "hello",
                "distribution": {"feedDistribution": "MAIN_FEED"},
                "content": {"media": {"id": "urn:li:video:2", "title": "clip"}},
                "lifecycleState": "PUBLISHED",
                "isReshareDisabledByAuthor": false
            })
        );

        let article = PostPayload::text("a", "b")
            .with_visibility(Visibility::LoggedIn)
            .with_article(Article {
                source: "https://example.com".into(),
                title: "t".into(),
                description: None,
                thumbnail: None,
            });
        let value = serde_json::to_value(&article).unwrap();
        assert_eq!(value["visibility"], "LOGGED_IN");
        assert_eq!(value["content"]["article"]["source"], "https://example.com");
    }

    #[tokio::test]
    async fn share_reads_urn_from_restli_header() {
        let transport = MockTransport::new().on(Method::POST, POSTS, |_| {
            MockResponse::new(StatusCode::CREATED).header("x-restli-id", "urn:li:share:99")
        });
        let client = mock::authenticated_client(transport);
        let payload = PostPayload::text("urn:li:person:1", "hello");

        let shared = client.share_post(&payload).await.unwrap();
        assert_eq!(shared.post_urn, "urn:li:share:99");
        assert_eq!(shared.post_url, "https://www.linkedin.com/feed/update/urn:li:share:99");
        assert_eq!(shared.payload, payload);

        let request = &client.transport().requests()[0];
        assert_eq!(request.headers["x-restli-protocol-version"], "2.0.0");
        assert_eq!(request.headers["content-type"], "application/json");
    }

    #[tokio::test]
    async fn share_without_id_header_fails() {
        let transport = MockTransport::new()
            .on(Method::POST, POSTS, |_| MockResponse::new(StatusCode::CREATED));
        let client = mock::authenticated_client(transport);
        let err = client
            .share_post(&PostPayload::text("a", "b"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "LINKEDIN_API_ERROR_FAILED_POST_ID");
    }

    #[tokio::test]
    async fn rejected_share_is_an_api_error() {
        let transport = MockTransport::new().on(Method::POST, POSTS, |_| {
            MockResponse::json(StatusCode::UNPROCESSABLE_ENTITY, json!({"message": "bad author"}))
        });
        let client = mock::authenticated_client(transport);
        let err = client
            .share_post(&PostPayload::text("a", "b"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "LINKEDIN_API_ERROR_FAILED_SHARE_POST");
        assert!(err.to_string().contains("bad author"));
    }
}
