//! Multi-part video uploads.
//!
//! LinkedIn splits a video into byte ranges, each with its own upload URL. All ranges are PUT
//! concurrently, the `ETag` of every response is collected in part order, and the upload is
//! then finalized with those ETags. Finalization commonly fails for a while after the last
//! chunk lands (the service is still processing), so it is retried with a growing backoff.

use super::{MediaSource, UploadPart, VideoUploadTarget};
use crate::client::{LinkedinClient, body_text};
use crate::error::{ApiErrorCode, Error, Result};
use crate::retry::Attempt;
use crate::tokens::AccessToken;
use crate::transport::{HttpTransport, TransportError};
use bytes::Bytes;
use http::Method;
use http::header::ETAG;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::instrument;

/// The outcome of one chunk PUT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartResult {
    pub part_index: usize,
    pub etag: String,
}

/// How a video upload ended. Failures are reported as [`Error`]s instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Finalized {
        urn: String,
        /// Chunk ETags in part order, as sent to finalize.
        part_ids: Vec<String>,
    },
}

enum UploadState {
    Uploading { parts_remaining: usize },
    AllPartsUploaded { part_ids: Vec<String> },
    Finalizing { part_ids: Vec<String> },
    Finalized { part_ids: Vec<String> },
    Failed(Error),
}

impl UploadState {
    fn name(&self) -> &'static str {
        match self {
            UploadState::Uploading { .. } => "uploading",
            UploadState::AllPartsUploaded { .. } => "all_parts_uploaded",
            UploadState::Finalizing { .. } => "finalizing",
            UploadState::Finalized { .. } => "finalized",
            UploadState::Failed(_) => "failed",
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FinalizeUploadBody<'a> {
    finalize_upload_request: FinalizeUploadRequest<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FinalizeUploadRequest<'a> {
    upload_token: &'a str,
    video: &'a str,
    uploaded_part_ids: &'a [String],
}

/// Cuts `payload` into the chunks described by `parts`.
///
/// Ranges must start at byte 0, follow each other without gaps or overlaps, and end on the
/// payload's last byte. A single part is sent as the whole payload.
fn split_payload(parts: &[UploadPart], payload: &Bytes) -> Result<Vec<Bytes>> {
    let invalid = |reason: String| Error::InvalidUploadInstructions { reason };
    let len = payload.len() as u64;

    if parts.is_empty() {
        return Err(invalid("no upload parts".to_string()));
    }

    let mut next = 0;
    for (index, part) in parts.iter().enumerate() {
        if part.first_byte != next {
            return Err(invalid(format!(
                "part {index} starts at byte {} but byte {next} is next",
                part.first_byte
            )));
        }
        if part.last_byte < part.first_byte || part.last_byte >= len {
            return Err(invalid(format!(
                "part {index} range {}..={} does not fit a {len} byte payload",
                part.first_byte, part.last_byte
            )));
        }
        next = part.last_byte + 1;
    }
    if next != len {
        return Err(invalid(format!("parts cover {next} of {len} bytes")));
    }

    if parts.len() == 1 {
        return Ok(vec![payload.clone()]);
    }
    Ok(parts
        .iter()
        .map(|part| payload.slice(part.first_byte as usize..=part.last_byte as usize))
        .collect())
}

impl<T: HttpTransport> LinkedinClient<T> {
    /// Uploads every part of a video and finalizes it.
    ///
    /// No finalize request is sent unless every part succeeded. Between the last chunk and the
    /// first finalize attempt the client waits `default_delay_between_requests_ms`.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidUploadInstructions`] if the ranges in `target` do not fit the payload
    /// * [`Error::Api`] with [`ApiErrorCode::FailedVideoChunkUpload`] if any chunk failed
    /// * [`Error::FinalizeUpload`] if finalization still failed after the retry budget
    #[instrument(skip_all, fields(urn = %target.urn, parts = target.parts.len()))]
    pub async fn upload_video(
        &self,
        target: &VideoUploadTarget,
        source: MediaSource,
    ) -> Result<UploadOutcome> {
        let payload = self.load_media(source).await?;
        let mut state = UploadState::Uploading {
            parts_remaining: target.parts.len(),
        };

        loop {
            tracing::debug!(state = state.name(), "video upload state");
            state = match state {
                UploadState::Uploading { parts_remaining } => {
                    tracing::info!(
                        bytes = payload.len(),
                        chunks = parts_remaining,
                        "uploading video"
                    );
                    match self.upload_video_parts(target, payload.clone()).await {
                        Ok(parts) => UploadState::AllPartsUploaded {
                            part_ids: parts.into_iter().map(|p| p.etag).collect(),
                        },
                        Err(e) => UploadState::Failed(e),
                    }
                }
                UploadState::AllPartsUploaded { part_ids } => {
                    // give LinkedIn time to process the chunks before finalizing
                    tokio::time::sleep(self.config.delay_between_requests).await;
                    UploadState::Finalizing { part_ids }
                }
                UploadState::Finalizing { part_ids } => {
                    match self
                        .finalize_video_upload(&target.urn, &target.upload_token, &part_ids)
                        .await
                    {
                        Ok(()) => UploadState::Finalized { part_ids },
                        Err(e) => UploadState::Failed(e),
                    }
                }
                UploadState::Finalized { part_ids } => {
                    tracing::info!("video upload finalized");
                    return Ok(UploadOutcome::Finalized {
                        urn: target.urn.clone(),
                        part_ids,
                    });
                }
                UploadState::Failed(error) => {
                    tracing::error!(%error, "video upload failed");
                    return Err(error);
                }
            };
        }
    }

    /// PUTs every chunk concurrently and returns the results in part order.
    ///
    /// Waits for all chunks to settle before reporting; the first failure (in completion order)
    /// is returned if any chunk failed.
    pub async fn upload_video_parts(
        &self,
        target: &VideoUploadTarget,
        payload: Bytes,
    ) -> Result<Vec<PartResult>> {
        let chunks = split_payload(&target.parts, &payload)?;
        let access_token = self.tokens.access_token()?;

        let mut uploads = JoinSet::new();
        for (part_index, (part, chunk)) in target.parts.iter().zip(chunks).enumerate() {
            let client = self.clone();
            let access_token = access_token.clone();
            let upload_url = part.upload_url.clone();
            uploads.spawn(async move {
                let result = client
                    .put_chunk(part_index, &upload_url, chunk, &access_token)
                    .await;
                (part_index, result)
            });
        }

        let mut etags: Vec<Option<String>> = vec![None; target.parts.len()];
        let mut failure = None;
        while let Some(joined) = uploads.join_next().await {
            match joined {
                Ok((part_index, Ok(part))) => etags[part_index] = Some(part.etag),
                Ok((part_index, Err(e))) => {
                    tracing::warn!(part_index, error = %e, "video chunk upload failed");
                    failure.get_or_insert(e);
                }
                Err(join_error) => match join_error.try_into_panic() {
                    Ok(panic) => std::panic::resume_unwind(panic),
                    Err(cancelled) => {
                        failure.get_or_insert(Error::Transport(TransportError::new(cancelled)));
                    }
                },
            }
        }
        if let Some(failure) = failure {
            return Err(failure);
        }

        etags
            .into_iter()
            .enumerate()
            .map(|(part_index, etag)| {
                etag.map(|etag| PartResult { part_index, etag }).ok_or_else(|| {
                    Error::InvalidUploadInstructions {
                        reason: format!("part {part_index} never completed"),
                    }
                })
            })
            .collect()
    }

    async fn put_chunk(
        &self,
        part_index: usize,
        upload_url: &str,
        chunk: Bytes,
        access_token: &AccessToken,
    ) -> Result<PartResult> {
        tracing::debug!(part_index, bytes = chunk.len(), "uploading video chunk");
        let request = self.octet_stream_put(upload_url, access_token, chunk)?;
        let response = self.send(request).await?;
        if !response.status().is_success() {
            return Err(Error::api(
                ApiErrorCode::FailedVideoChunkUpload,
                response.status(),
                response.body(),
            ));
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|etag| etag.to_str().ok())
            .filter(|etag| !etag.is_empty());
        match etag {
            Some(etag) => Ok(PartResult {
                part_index,
                etag: etag.to_string(),
            }),
            None => Err(Error::api(
                ApiErrorCode::FailedVideoChunkUpload,
                response.status(),
                b"response carried no ETag header",
            )),
        }
    }

    /// Tells LinkedIn every chunk of `video_urn` has arrived.
    ///
    /// `part_ids` are the chunk ETags in part order. Any non-success response is taken to mean
    /// the video is still being processed and the request is retried with a growing delay, up to
    /// `retry_attempts` times (never when `no_retries` is set). Transport failures are not
    /// retried.
    #[instrument(skip(self, upload_token, part_ids), fields(parts = part_ids.len()))]
    pub async fn finalize_video_upload(
        &self,
        video_urn: &str,
        upload_token: &str,
        part_ids: &[String],
    ) -> Result<()> {
        let access_token = self.tokens.access_token()?;
        let url = self.rest_url("videos?action=finalizeUpload");
        let body = FinalizeUploadBody {
            finalize_upload_request: FinalizeUploadRequest {
                upload_token,
                video: video_urn,
                uploaded_part_ids: part_ids,
            },
        };

        let (url, body, access_token) = (url.as_str(), &body, &access_token);
        self.retry
            .run("finalize video upload", || async move {
                let request = match self.json_request(Method::POST, url, access_token, body) {
                    Ok(request) => request,
                    Err(e) => return Attempt::Done(Err(e)),
                };
                match self.send(request).await {
                    Err(e) => Attempt::Done(Err(e)),
                    Ok(response) if response.status().is_success() => Attempt::Done(Ok(())),
                    Ok(response) => Attempt::Transient(Error::FinalizeUpload {
                        status: response.status(),
                        body: body_text(&response),
                    }),
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientOptions;
    use crate::mock::{self, MockResponse, MockTransport};
    use http::StatusCode;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    const FINALIZE: &str = "https://api.linkedin.com/rest/videos?action=finalizeUpload";

    fn part(index: usize, first_byte: u64, last_byte: u64) -> UploadPart {
        UploadPart {
            upload_url: format!("https://upload.test/part/{index}"),
            first_byte,
            last_byte,
        }
    }

    fn target(parts: Vec<UploadPart>) -> VideoUploadTarget {
        VideoUploadTarget {
            urn: "urn:li:video:42".to_string(),
            upload_token: "upload-token".to_string(),
            parts,
        }
    }

    fn payload(len: usize) -> Bytes {
        (0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>().into()
    }

    /// Chunk routes answering with `etag-<i>` after `delays[i]` milliseconds.
    fn chunk_routes(transport: MockTransport, delays: &[u64]) -> MockTransport {
        delays
            .iter()
            .enumerate()
            .fold(transport, |transport, (index, &delay)| {
                transport.on(
                    Method::PUT,
                    &format!("https://upload.test/part/{index}"),
                    move |_| {
                        MockResponse::new(StatusCode::OK)
                            .header("etag", &format!("etag-{index}"))
                            .delayed(Duration::from_millis(delay))
                    },
                )
            })
    }

    /// Finalize handler answering with `statuses` in turn, then 200.
    fn finalize_answers(
        statuses: Vec<StatusCode>,
    ) -> impl Fn(&http::Request<Bytes>) -> MockResponse + Send + Sync + 'static {
        let calls = Arc::new(AtomicU32::new(0));
        move |_: &http::Request<Bytes>| {
            let n = calls.fetch_add(1, Ordering::SeqCst) as usize;
            let status = statuses.get(n).copied().unwrap_or(StatusCode::OK);
            MockResponse::text(status, "still processing")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn chunks_upload_in_parallel_and_etags_keep_part_order() {
        let transport = chunk_routes(MockTransport::new(), &[30, 20, 0])
            .on(Method::POST, FINALIZE, |_| MockResponse::new(StatusCode::OK));
        let client = mock::authenticated_client(transport);
        let data = payload(250);

        let outcome = client
            .upload_video(
                &target(vec![part(0, 0, 99), part(1, 100, 199), part(2, 200, 249)]),
                MediaSource::Bytes(data.clone()),
            )
            .await
            .unwrap();
        assert_eq!(
            outcome,
            UploadOutcome::Finalized {
                urn: "urn:li:video:42".to_string(),
                part_ids: vec!["etag-0".into(), "etag-1".into(), "etag-2".into()],
            }
        );

        let requests = client.transport().requests();
        let puts: Vec<_> = requests.iter().filter(|r| r.method == Method::PUT).collect();
        assert_eq!(puts.len(), 3);
        // every chunk is sent before any response arrives
        assert!(puts.iter().all(|put| put.at == puts[0].at));

        let mut sent: Vec<_> = puts.clone();
        sent.sort_by_key(|put| put.url.clone());
        let reassembled: Vec<u8> = sent.iter().flat_map(|put| put.body.to_vec()).collect();
        assert_eq!(reassembled, data.to_vec());
        assert_eq!(sent[2].headers["content-length"], "50");

        let finalize = client.transport().requests_to(FINALIZE);
        assert_eq!(finalize.len(), 1);
        assert_eq!(
            serde_json::from_slice::<serde_json::Value>(&finalize[0].body).unwrap(),
            json!({"finalizeUploadRequest": {
                "uploadToken": "upload-token",
                "video": "urn:li:video:42",
                "uploadedPartIds": ["etag-0", "etag-1", "etag-2"]
            }})
        );
        // settle delay after the slowest chunk (30ms) before finalizing
        assert!(finalize[0].at - puts[0].at >= Duration::from_millis(40));
    }

    #[tokio::test(start_paused = true)]
    async fn single_part_is_sent_whole() {
        let transport = chunk_routes(MockTransport::new(), &[0])
            .on(Method::POST, FINALIZE, |_| MockResponse::new(StatusCode::OK));
        let client = mock::authenticated_client(transport);
        let data = payload(64);

        client
            .upload_video(&target(vec![part(0, 0, 63)]), MediaSource::Bytes(data.clone()))
            .await
            .unwrap();
        let put = &client.transport().requests()[0];
        assert_eq!(put.body, data);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_chunk_means_no_finalize() {
        let transport = chunk_routes(MockTransport::new(), &[0, 5])
            .on(Method::PUT, "https://upload.test/part/2", |_| {
                MockResponse::text(StatusCode::INTERNAL_SERVER_ERROR, "boom")
            })
            .on(Method::POST, FINALIZE, |_| MockResponse::new(StatusCode::OK));
        let client = mock::authenticated_client(transport);

        let err = client
            .upload_video(
                &target(vec![part(0, 0, 9), part(1, 10, 19), part(2, 20, 29)]),
                MediaSource::Bytes(payload(30)),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "LINKEDIN_API_ERROR_FAILED_VIDEO_CHUNK_UPLOAD");
        assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        // the other chunks still ran to completion
        assert_eq!(client.transport().requests().len(), 3);
        assert!(client.transport().requests_to(FINALIZE).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_etag_fails_the_chunk() {
        let transport = MockTransport::new()
            .on(Method::PUT, "https://upload.test/part/0", |_| {
                MockResponse::new(StatusCode::OK)
            })
            .on(Method::POST, FINALIZE, |_| MockResponse::new(StatusCode::OK));
        let client = mock::authenticated_client(transport);
        let err = client
            .upload_video(&target(vec![part(0, 0, 9)]), MediaSource::Bytes(payload(10)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "LINKEDIN_API_ERROR_FAILED_VIDEO_CHUNK_UPLOAD");
        assert!(client.transport().requests_to(FINALIZE).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn finalize_gives_up_after_budget_with_growing_delays() {
        let transport = MockTransport::new().on(
            Method::POST,
            FINALIZE,
            finalize_answers(vec![StatusCode::SERVICE_UNAVAILABLE; 10]),
        );
        let client = mock::authenticated_client(transport);

        let err = client
            .finalize_video_upload("urn:li:video:42", "tok", &["e".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
        assert_eq!(err.code(), "FAILED_VIDEO_UPLOAD_FINALIZE");

        let calls = client.transport().requests_to(FINALIZE);
        assert_eq!(calls.len(), 4);
        let gaps: Vec<Duration> = calls.windows(2).map(|w| w[1].at - w[0].at).collect();
        assert_eq!(
            gaps,
            vec![
                Duration::from_millis(11),
                Duration::from_millis(21),
                Duration::from_millis(31)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn finalize_succeeds_once_processing_is_done() {
        let transport = MockTransport::new().on(
            Method::POST,
            FINALIZE,
            finalize_answers(vec![StatusCode::CONFLICT, StatusCode::SERVICE_UNAVAILABLE]),
        );
        let client = mock::authenticated_client(transport);
        client
            .finalize_video_upload("urn:li:video:42", "tok", &["e".to_string()])
            .await
            .unwrap();
        assert_eq!(client.transport().requests_to(FINALIZE).len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn any_success_status_finalizes_immediately() {
        let transport = MockTransport::new().on(
            Method::POST,
            FINALIZE,
            finalize_answers(vec![StatusCode::ACCEPTED]),
        );
        let client = mock::authenticated_client(transport);
        client
            .finalize_video_upload("urn:li:video:42", "tok", &["e".to_string()])
            .await
            .unwrap();
        assert_eq!(client.transport().requests_to(FINALIZE).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_retries_means_a_single_finalize_attempt() {
        let transport = MockTransport::new().on(
            Method::POST,
            FINALIZE,
            finalize_answers(vec![StatusCode::SERVICE_UNAVAILABLE; 10]),
        );
        let client = mock::authenticate(mock::client_with(
            ClientOptions {
                no_retries: true,
                ..mock::options()
            },
            transport,
        ));

        let err = client
            .finalize_video_upload("urn:li:video:42", "tok", &[])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "FAILED_VIDEO_UPLOAD_FINALIZE");
        assert_eq!(client.transport().requests_to(FINALIZE).len(), 1);
    }

    #[test]
    fn ranges_must_fit_the_payload() {
        let data = payload(100);
        let reason = |parts: Vec<UploadPart>| match split_payload(&parts, &data) {
            Err(Error::InvalidUploadInstructions { reason }) => reason,
            other => panic!("expected invalid instructions, got {other:?}"),
        };

        assert_eq!(reason(vec![]), "no upload parts");
        assert!(reason(vec![part(0, 0, 100)]).contains("does not fit"));
        assert!(reason(vec![part(0, 1, 99)]).contains("starts at byte 1"));
        assert!(reason(vec![part(0, 0, 49), part(1, 60, 99)]).contains("byte 50 is next"));
        assert!(reason(vec![part(0, 0, 49), part(1, 40, 99)]).contains("byte 50 is next"));
        assert_eq!(reason(vec![part(0, 0, 49)]), "parts cover 50 of 100 bytes");
    }

    #[test]
    fn chunks_are_zero_copy_slices() {
        let data = payload(10);
        let chunks = split_payload(&[part(0, 0, 3), part(1, 4, 9)], &data).unwrap();
        assert_eq!(chunks[0], data.slice(0..4));
        assert_eq!(chunks[1], data.slice(4..10));
    }

    #[tokio::test]
    async fn invalid_instructions_send_nothing() {
        let client = mock::authenticated_client(MockTransport::new());
        let err = client
            .upload_video(&target(vec![part(0, 0, 10)]), MediaSource::Bytes(payload(5)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_UPLOAD_INSTRUCTIONS");
        assert!(client.transport().requests().is_empty());
    }
}
