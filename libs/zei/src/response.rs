use crate::error::{BoxError, HttpError};
use bytes::Bytes;
use http::{HeaderMap, Response, StatusCode, Uri, Version};
use http_body::{Body, Frame, SizeHint};
use http_body_util::{BodyExt, Empty};
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, SystemTime};
use tokio::time::{Instant, Sleep};
use tower_http::follow_redirect::RequestUri;

/// Upper bound on the body bytes copied into `HttpError::HttpStatus`
pub const ERROR_BODY_PREVIEW_LIMIT: usize = 8 * 1024;

/// Type-erased response body produced by every [`Transport`](crate::Transport).
pub type ResponseBody = http_body_util::combinators::BoxBody<Bytes, BoxError>;

/// Empty [`ResponseBody`], handy for custom transports.
#[must_use]
pub fn empty_body() -> ResponseBody {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed()
}

/// `Retry-After` as a delay: delta-seconds or an HTTP-date in the future.
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(http::header::RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(seconds) = value.parse::<i64>() {
        return u64::try_from(seconds).ok().map(Duration::from_secs);
    }

    httpdate::parse_http_date(value)
        .ok()?
        .duration_since(SystemTime::now())
        .ok()
}

pin_project! {
    /// Fails the body stream once the call deadline passes.
    ///
    /// The deadline is shared with header exchange and redirects, so a
    /// client timeout bounds the whole call including the body read.
    pub struct DeadlineBody {
        #[pin]
        inner: ResponseBody,
        #[pin]
        sleep: Sleep,
        timeout: Duration,
    }
}

impl DeadlineBody {
    pub(crate) fn new(inner: ResponseBody, deadline: Instant, timeout: Duration) -> Self {
        Self {
            inner,
            sleep: tokio::time::sleep_until(deadline),
            timeout,
        }
    }
}

impl Body for DeadlineBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        if this.sleep.poll(cx).is_ready() {
            return Poll::Ready(Some(Err(Box::new(HttpError::Timeout(*this.timeout)))));
        }
        this.inner.poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

pin_project! {
    /// Streaming body that errors with `BodyTooLarge` past a byte limit.
    ///
    /// The limit counts decompressed bytes.
    pub struct LimitedBody {
        #[pin]
        inner: ResponseBody,
        limit: usize,
        read: usize,
    }
}

impl LimitedBody {
    #[must_use]
    pub fn new(inner: ResponseBody, limit: usize) -> Self {
        Self {
            inner,
            limit,
            read: 0,
        }
    }

    #[must_use]
    pub fn bytes_read(&self) -> usize {
        self.read
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Body for LimitedBody {
    type Data = Bytes;
    type Error = HttpError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();

        match this.inner.poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    *this.read += data.len();
                    if *this.read > *this.limit {
                        return Poll::Ready(Some(Err(HttpError::BodyTooLarge {
                            limit: *this.limit,
                            actual: *this.read,
                        })));
                    }
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(HttpError::from_boxed(e)))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Response returned by [`Client`](crate::Client) calls.
///
/// The body is unread. Buffered reads ([`bytes`](Self::bytes),
/// [`text`](Self::text)) stop at the configured `max_body_size`, and a
/// client timeout keeps running while the body streams.
#[derive(Debug)]
pub struct HttpResponse {
    inner: Response<ResponseBody>,
    max_body_size: usize,
}

impl HttpResponse {
    pub(crate) fn new(
        response: Response<ResponseBody>,
        max_body_size: usize,
        deadline: Option<(Instant, Duration)>,
    ) -> Self {
        let inner = match deadline {
            Some((at, timeout)) => {
                response.map(|body| DeadlineBody::new(body, at, timeout).boxed())
            }
            None => response,
        };
        Self {
            inner,
            max_body_size,
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    #[must_use]
    pub fn version(&self) -> Version {
        self.inner.version()
    }

    /// URI of the request that produced this response, after redirects
    #[must_use]
    pub fn url(&self) -> Option<&Uri> {
        self.inner.extensions().get::<RequestUri>().map(|u| &u.0)
    }

    #[must_use]
    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    /// The raw response. Already decompressed when the default transport is used.
    #[must_use]
    pub fn into_inner(self) -> Response<ResponseBody> {
        self.inner
    }

    /// Body stream with no size limit.
    #[must_use]
    pub fn into_body(self) -> ResponseBody {
        self.inner.into_body()
    }

    /// Body stream bounded by `max_body_size`.
    #[must_use]
    pub fn into_limited_body(self) -> LimitedBody {
        LimitedBody::new(self.inner.into_body(), self.max_body_size)
    }

    /// Turn a non-2xx status into `HttpError::HttpStatus` without reading the body.
    ///
    /// # Errors
    /// Returns `HttpError::HttpStatus` with an empty preview for non-2xx statuses.
    pub fn error_for_status(self) -> Result<Self, HttpError> {
        if self.inner.status().is_success() {
            return Ok(self);
        }
        Err(HttpError::HttpStatus {
            status: self.inner.status(),
            body_preview: String::new(),
            content_type: content_type(self.inner.headers()),
            retry_after: parse_retry_after(self.inner.headers()),
        })
    }

    /// Buffer the whole body regardless of status.
    ///
    /// # Errors
    /// `BodyTooLarge` past `max_body_size`, `Timeout` when the call deadline
    /// passes, `Transport` if the stream fails.
    pub async fn bytes(self) -> Result<Bytes, HttpError> {
        read_limited(self.inner.into_body(), self.max_body_size).await
    }

    /// Buffer the body of a 2xx response.
    ///
    /// # Errors
    /// As [`bytes`](Self::bytes), plus `HttpStatus` carrying a short body
    /// preview for non-2xx statuses.
    pub async fn checked_bytes(self) -> Result<Bytes, HttpError> {
        let status = self.inner.status();
        if status.is_success() {
            return self.bytes().await;
        }

        let content_type = content_type(self.inner.headers());
        let retry_after = parse_retry_after(self.inner.headers());
        let preview_limit = self.max_body_size.min(ERROR_BODY_PREVIEW_LIMIT);
        let body_preview = match read_limited(self.inner.into_body(), preview_limit).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(HttpError::BodyTooLarge { .. }) => "<body too large for preview>".to_owned(),
            Err(e) => return Err(e),
        };

        Err(HttpError::HttpStatus {
            status,
            body_preview,
            content_type,
            retry_after,
        })
    }

    /// [`checked_bytes`](Self::checked_bytes) decoded as lossy UTF-8.
    ///
    /// # Errors
    /// Same as [`checked_bytes`](Self::checked_bytes).
    pub async fn text(self) -> Result<String, HttpError> {
        let body = self.checked_bytes().await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

async fn read_limited(body: ResponseBody, limit: usize) -> Result<Bytes, HttpError> {
    let mut collected = Vec::new();
    let mut body = std::pin::pin!(body);

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(HttpError::from_boxed)?;
        if let Some(chunk) = frame.data_ref() {
            if collected.len() + chunk.len() > limit {
                return Err(HttpError::BodyTooLarge {
                    limit,
                    actual: collected.len() + chunk.len(),
                });
            }
            collected.extend_from_slice(chunk);
        }
    }

    Ok(Bytes::from(collected))
}
