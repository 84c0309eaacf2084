//! Walks through the LinkedIn login flow and exercises the API.
//!
//! Reads its configuration from `LINKEDIN_*` environment variables and keeps tokens in
//! `tokens.json` between runs.
//!
//! ```text
//! linkedin-cli                              log in (if needed) and print the profile
//! linkedin-cli post <text>                  share a text post
//! linkedin-cli upload <file> [text]         upload an image, document or video, then share it
//! linkedin-cli status <kind> <urn>          print the processing state of an asset
//! ```

mod callback;

use eyre::Context;
use linkedin_client::{
    ClientOptions, InitializeUploadRequest, LinkedinClient, MediaKind, MediaSource, PostPayload,
    TokenPair,
};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

const TOKENS_FILE: &str = "tokens.json";

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_ansi(std::io::stdout().is_terminal())
        .init();

    let options = ClientOptions::from_env().context("read LINKEDIN_* environment variables")?;
    let client = LinkedinClient::new(options).context("configure LinkedIn client")?;

    if tokio::fs::try_exists(TOKENS_FILE).await.unwrap_or(false) {
        let saved = tokio::fs::read_to_string(TOKENS_FILE)
            .await
            .context("read saved tokens")?;
        match serde_json::from_str::<TokenPair>(&saved) {
            Ok(pair) => client.tokens().set_tokens(pair),
            Err(e) => tracing::warn!(error = %e, "ignoring unreadable {TOKENS_FILE}"),
        }
    }
    ensure_logged_in(&client).await?;

    let me = client.get_self_profile().await.context("fetch own profile")?;
    eprintln!(
        "==> logged in as {} {} ({})",
        me.localized_first_name.as_deref().unwrap_or("?"),
        me.localized_last_name.as_deref().unwrap_or("?"),
        me.urn()
    );

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        None => {}
        Some("post") => {
            let text = args.collect::<Vec<_>>().join(" ");
            eyre::ensure!(!text.is_empty(), "usage: linkedin-cli post <text>");
            let shared = client
                .share_post(&PostPayload::text(me.urn(), text))
                .await
                .context("share post")?;
            eprintln!("==> shared {}", shared.post_url);
        }
        Some("upload") => {
            let path = PathBuf::from(
                args.next()
                    .ok_or_else(|| eyre::eyre!("usage: linkedin-cli upload <file> [text]"))?,
            );
            let request = match kind_for(&path) {
                MediaKind::Image => InitializeUploadRequest::image(me.urn()),
                MediaKind::Document => InitializeUploadRequest::document(me.urn()),
                // the size is filled in from the file
                MediaKind::Video => InitializeUploadRequest::video(me.urn(), 0),
            };
            let title = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let urn = client
                .upload(request, MediaSource::File(path))
                .await
                .context("upload media")?;
            eprintln!("==> uploaded {urn}");

            let text = args.collect::<Vec<_>>().join(" ");
            if !text.is_empty() {
                let shared = client
                    .share_post(&PostPayload::text(me.urn(), text).with_media(urn, title))
                    .await
                    .context("share post with media")?;
                eprintln!("==> shared {}", shared.post_url);
            }
        }
        Some("status") => {
            let (Some(kind), Some(urn)) = (args.next(), args.next()) else {
                eyre::bail!("usage: linkedin-cli status <image|document|video> <urn>");
            };
            let kind = match kind.as_str() {
                "image" => MediaKind::Image,
                "document" => MediaKind::Document,
                "video" => MediaKind::Video,
                other => eyre::bail!("unknown asset kind {other:?}"),
            };
            let status = client
                .get_asset_status(kind, &urn)
                .await
                .context("fetch asset status")?;
            eprintln!("==> {urn}: {:?}", status.status);
        }
        Some(other) => eyre::bail!("unknown command {other:?}"),
    }

    if let Some(pair) = client.tokens().snapshot() {
        let json = serde_json::to_string_pretty(&pair).context("serialize tokens")?;
        tokio::fs::write(TOKENS_FILE, &json)
            .await
            .context("save tokens")?;
    }

    Ok(())
}

/// Makes sure the client holds a usable access token, refreshing or logging in as needed.
async fn ensure_logged_in(client: &LinkedinClient) -> eyre::Result<()> {
    if client.tokens().access_token().is_ok() {
        return Ok(());
    }

    if client.tokens().refresh_token().is_ok() {
        if client
            .refresh(None)
            .await
            .context("refresh access token")?
            .is_some()
        {
            return Ok(());
        }
        tracing::warn!("refresh was rejected, logging in again");
    }

    let login = client.login_url(None);
    let callback = callback::listen(client.config().redirect_url.url())
        .await
        .context("set up callback endpoint")?;

    tracing::info!(url = %login.url, "asking user to follow OAuth flow");
    webbrowser::open(login.url.as_str()).context("open user's browser")?;
    let callback = callback.await.context("await authorization code")?;

    client
        .exchange_code(&callback.code, &callback.state)
        .await
        .context("exchange authorization code for tokens")?;
    Ok(())
}

fn kind_for(path: &Path) -> MediaKind {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "mp4" | "mov" | "webm" | "mkv" | "avi" => MediaKind::Video,
        "pdf" | "doc" | "docx" | "ppt" | "pptx" => MediaKind::Document,
        _ => MediaKind::Image,
    }
}
