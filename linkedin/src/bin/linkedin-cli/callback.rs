//! One-shot HTTP server receiving the OAuth redirect.

use eyre::Context;
use http_body_util::Full;
use hyper::body::{self, Bytes};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use oauth2::url::Url;
use std::convert::Infallible;
use std::future::Future;

const LOGIN_DONE_HTML: &str = "<!doctype html><html><body>\
    <p>Logged in to LinkedIn. You can close this tab.</p>\
    </body></html>";

/// What LinkedIn handed back to the callback URL.
#[derive(Debug)]
pub(crate) struct Callback {
    pub(crate) code: String,
    pub(crate) state: String,
}

fn reply(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::from(body));
    *response.status_mut() = status;
    response
}

/// Starts listening on the host and port of `redirect`.
///
/// Resolves once a request carrying `code` and `state` arrives, or with an error if the user
/// declined the authorization. Requests without either (a browser fetching `/favicon.ico`, say)
/// get a 400 and are otherwise ignored.
pub(crate) async fn listen(
    redirect: &Url,
) -> eyre::Result<impl Future<Output = eyre::Result<Callback>>> {
    let host = redirect
        .host_str()
        .ok_or_else(|| eyre::eyre!("callback URL {redirect} has no host"))?
        .to_string();
    let port = redirect
        .port_or_known_default()
        .ok_or_else(|| eyre::eyre!("callback URL {redirect} has no port"))?;
    let socket = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("bind to {host}:{port}"))?;
    tracing::debug!(%host, port, "listening for OAuth callback");

    let (tx, rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let r = async move {
            let (conn, _) = socket.accept().await.context("accept")?;
            let conn = hyper_util::rt::TokioIo::new(conn);
            let (got, mut gotten) = tokio::sync::mpsc::channel(1);
            let service = service_fn(move |req: Request<body::Incoming>| {
                let got = got.clone();
                async move {
                    let mut code = None;
                    let mut state = None;
                    let mut denied = None;
                    for (k, v) in form_urlencoded::parse(req.uri().query().unwrap_or("").as_bytes())
                    {
                        match &*k {
                            "code" => code = Some(v.into_owned()),
                            "state" => state = Some(v.into_owned()),
                            "error_description" => denied = Some(v.into_owned()),
                            "error" => {
                                denied.get_or_insert(v.into_owned());
                            }
                            _ => {}
                        }
                    }

                    let outcome = match (code, state, denied) {
                        (_, _, Some(reason)) => Err(reason),
                        (Some(code), Some(state), None) => Ok(Callback { code, state }),
                        _ => {
                            return Ok::<_, Infallible>(reply(
                                StatusCode::BAD_REQUEST,
                                "missing code or state",
                            ));
                        }
                    };
                    let response = match &outcome {
                        Ok(_) => reply(StatusCode::OK, LOGIN_DONE_HTML),
                        Err(_) => reply(StatusCode::FORBIDDEN, "authorization was declined"),
                    };
                    let _ = got.send(outcome).await;
                    Ok(response)
                }
            });
            let mut serve = std::pin::pin!(
                hyper::server::conn::http1::Builder::new().serve_connection(conn, service)
            );

            tokio::select! {
                exit = &mut serve => {
                    exit.context("callback server got bad request")?;
                    eyre::bail!("callback server exited before receiving the authorization code");
                }
                outcome = gotten.recv() => {
                    serve.as_mut().graceful_shutdown();
                    // finish sending the response page
                    let _ = serve.await;
                    match outcome {
                        Some(Ok(callback)) => Ok(callback),
                        Some(Err(reason)) => eyre::bail!("authorization was declined: {reason}"),
                        None => eyre::bail!("callback server stopped unexpectedly"),
                    }
                }
            }
        };
        let _ = tx.send(r.await);
    });

    Ok(async move { rx.await.context("callback listener dropped prematurely")? })
}
