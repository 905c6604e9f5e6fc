//! Streaming proxy step
//!
//! The final artifact goes downstream as the only file part of a new
//! multipart body, read from disk in chunks. The downstream response is
//! relayed back the same way: status and headers are mirrored and the body
//! is streamed through a [`CompletionStream`] that holds the request's
//! working data until the last chunk has been handed to the caller.

use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use axum::body::Body;
use axum::http::{HeaderMap, header};
use axum::response::Response;
use futures::Stream;
use reqwest::Url;
use reqwest::multipart::{Form, Part};
use thiserror::Error;
use tokio_util::io::ReaderStream;
use tracing::debug;

/// Header carrying the absolute destination URL
pub const TARGET_URL_HEADER: &str = "targeturl";

/// Inbound headers never copied to the downstream request. The outbound
/// body is rebuilt, so its framing headers are our own.
const REQUEST_HEADER_DENYLIST: &[&str] = &[
    "host",
    "content-type",
    "content-length",
    TARGET_URL_HEADER,
    "connection",
    "keep-alive",
    "transfer-encoding",
    "te",
    "upgrade",
    "expect",
];

/// Downstream headers never copied to the caller's response
const RESPONSE_HEADER_DENYLIST: &[&str] = &[
    "transfer-encoding",
    "connection",
    "alt-svc",
    "cache-control",
    "content-length",
    "keep-alive",
];

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("Missing 'TargetUrl' header with the destination URL")]
    MissingTarget,

    #[error("Invalid 'TargetUrl' header '{0}', expected an absolute http(s) URL")]
    InvalidTarget(String),

    #[error("Failed to open artifact {}: {source}", path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid content type for forwarded file: {0}")]
    ContentType(String),

    #[error("Downstream request failed: {0}")]
    Request(#[from] reqwest::Error),
}

impl ForwardError {
    /// Whether the caller sent something unusable, as opposed to the
    /// downstream leg failing
    pub fn is_client_error(&self) -> bool {
        matches!(self, ForwardError::MissingTarget | ForwardError::InvalidTarget(_))
    }
}

/// Reads and validates the destination URL. Runs before any file I/O.
pub fn target_url(headers: &HeaderMap) -> Result<Url, ForwardError> {
    let raw = headers
        .get(TARGET_URL_HEADER)
        .ok_or(ForwardError::MissingTarget)?;
    let raw = raw
        .to_str()
        .map_err(|_| ForwardError::InvalidTarget(String::from_utf8_lossy(raw.as_bytes()).into_owned()))?
        .trim();

    let url = Url::parse(raw).map_err(|_| ForwardError::InvalidTarget(raw.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
        return Err(ForwardError::InvalidTarget(raw.to_string()));
    }
    Ok(url)
}

/// Inbound headers minus the request denylist
pub fn forwarded_headers(inbound: &HeaderMap) -> HeaderMap {
    filter_headers(inbound, REQUEST_HEADER_DENYLIST)
}

/// Downstream response headers minus the response denylist
pub fn response_headers(downstream: &HeaderMap) -> HeaderMap {
    filter_headers(downstream, RESPONSE_HEADER_DENYLIST)
}

fn filter_headers(from: &HeaderMap, denylist: &[&str]) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(from.len());
    for (name, value) in from {
        if denylist.contains(&name.as_str()) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// The file part sent downstream
#[derive(Debug, Clone, Copy)]
pub struct Upload<'a> {
    /// Form field name of the inbound file part
    pub field_name: &'a str,
    pub path: &'a Path,
    pub file_name: &'a str,
    pub content_type: &'a str,
}

/// Sends artifacts to their destination
#[derive(Debug, Clone, Default)]
pub struct Forwarder {
    client: reqwest::Client,
}

impl Forwarder {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Posts `upload` to `target` as a streamed multipart body.
    pub async fn send(
        &self,
        target: Url,
        headers: HeaderMap,
        upload: Upload<'_>,
    ) -> Result<reqwest::Response, ForwardError> {
        let open_err = |source: io::Error| ForwardError::Artifact {
            path: upload.path.to_path_buf(),
            source,
        };
        let file = tokio::fs::File::open(upload.path).await.map_err(open_err)?;
        let length = file.metadata().await.map_err(open_err)?.len();

        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let part = Part::stream_with_length(body, length)
            .file_name(upload.file_name.to_string())
            .mime_str(upload.content_type)
            .map_err(|_| ForwardError::ContentType(upload.content_type.to_string()))?;
        let form = Form::new().part(upload.field_name.to_string(), part);

        debug!(%target, file_name = upload.file_name, length, "Sending artifact downstream");

        let response = self
            .client
            .post(target)
            .headers(headers)
            .multipart(form)
            .send()
            .await?;
        Ok(response)
    }
}

/// Relays a downstream response to the caller, keeping `guard` alive
/// until the body has been fully streamed or the caller goes away.
pub fn relay<G>(downstream: reqwest::Response, guard: G) -> Response
where
    G: Send + Unpin + 'static,
{
    let status = downstream.status();
    let mut headers = response_headers(downstream.headers());
    if let Some(content_type) = downstream.headers().get(header::CONTENT_TYPE) {
        headers.insert(header::CONTENT_TYPE, content_type.clone());
    }

    let stream = CompletionStream::new(Box::pin(downstream.bytes_stream()), guard);
    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Stream adapter that drops `guard` as soon as the inner stream ends or
/// fails, and in any case when the adapter itself is dropped.
pub struct CompletionStream<S, G> {
    inner: S,
    guard: Option<G>,
}

impl<S, G> CompletionStream<S, G> {
    pub fn new(inner: S, guard: G) -> Self {
        Self {
            inner,
            guard: Some(guard),
        }
    }

    /// Whether the guard is still held
    pub fn is_pending(&self) -> bool {
        self.guard.is_some()
    }
}

impl<S, G, T, E> Stream for CompletionStream<S, G>
where
    S: Stream<Item = Result<T, E>> + Unpin,
    G: Unpin,
{
    type Item = Result<T, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        let item = ready!(Pin::new(&mut this.inner).poll_next(cx));
        match &item {
            Some(Ok(_)) => {}
            Some(Err(_)) => {
                debug!("Response stream failed");
                this.guard.take();
            }
            None => {
                debug!("Response stream completed");
                this.guard.take();
            }
        }
        Poll::Ready(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
