use std::time::Duration;
use thiserror::Error;

/// Boxed error used for transport sources and redirect rejections.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Classification of URL validation failures.
///
/// Provides programmatic matching for different failure modes without
/// relying on unstable error message strings.
///
/// # Example
///
/// ```ignore
/// match &err {
///     HttpError::InvalidUri { kind, .. } => match kind {
///         InvalidUriKind::ParseError => println!("Malformed URL syntax"),
///         InvalidUriKind::MissingAuthority => println!("URL needs a host"),
///         InvalidUriKind::MissingScheme => println!("URL needs http:// or https://"),
///         _ => println!("Other URI error"),
///     },
///     _ => {}
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    /// URL could not be parsed (malformed syntax)
    ParseError,
    /// URL is missing required host/authority component
    MissingAuthority,
    /// URL is missing required scheme (http/https)
    MissingScheme,
}

/// HTTP client error types
///
/// Construction errors (`InvalidUri`, `InvalidScheme`, header and form errors)
/// are produced before anything reaches the transport. Everything else comes
/// out of the transport or the per-call stack around it.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    /// Request building failed
    #[error("Failed to build request: {0}")]
    RequestBuild(#[from] http::Error),

    /// Invalid header name
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// Invalid header value
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// The configured timeout elapsed (connect, redirects or body read)
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Transport error (network, connection, etc)
    #[error("Transport error: {0}")]
    Transport(#[source] BoxError),

    /// TLS error
    #[error("TLS error: {0}")]
    Tls(#[source] BoxError),

    /// The redirect policy refused to follow a redirect.
    ///
    /// `status`, `location` and `headers` describe the response that asked
    /// for the redirect. Its body has already been discarded.
    #[error("Redirect to '{location}' after HTTP {status} rejected: {source}")]
    Redirect {
        /// Status of the redirect response
        status: http::StatusCode,
        /// Target the server redirected to
        location: String,
        /// Headers of the redirect response
        headers: Box<http::HeaderMap>,
        /// Error produced by the redirect policy
        #[source]
        source: BoxError,
    },

    /// Response body exceeded size limit
    #[error("Response body too large: limit {limit} bytes, got {actual} bytes")]
    BodyTooLarge { limit: usize, actual: usize },

    /// HTTP non-2xx status
    #[error("HTTP {status}: {body_preview}")]
    HttpStatus {
        status: http::StatusCode,
        body_preview: String,
        content_type: Option<String>,
        /// Parsed `Retry-After` header value, if present and valid
        retry_after: Option<Duration>,
    },

    /// Form URL encoding error
    #[error("Form encoding failed: {0}")]
    FormEncode(#[from] serde_urlencoded::ser::Error),

    /// Invalid URL (failed to parse)
    ///
    /// Use the `kind` field for programmatic matching. The `reason` field contains
    /// a diagnostic message intended for logging only.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUri {
        /// The URL that failed to parse
        url: String,
        /// Structured failure classification for programmatic matching
        kind: InvalidUriKind,
        /// Diagnostic message (unstable format, for logging only)
        reason: String,
    },

    /// Invalid URL scheme
    #[error("URL scheme '{scheme}' not allowed: {reason}")]
    InvalidScheme {
        /// The URL scheme that was rejected
        scheme: String,
        /// Reason the scheme was rejected
        reason: String,
    },
}

impl From<hyper::Error> for HttpError {
    fn from(err: hyper::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

impl From<hyper_util::client::legacy::Error> for HttpError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

impl HttpError {
    /// Recover an `HttpError` that travelled through a boxed error channel.
    ///
    /// Body streams and tower middleware box their errors; anything that is
    /// not already an `HttpError` becomes `Transport`.
    #[must_use]
    pub fn from_boxed(err: BoxError) -> Self {
        match err.downcast::<HttpError>() {
            Ok(http_err) => *http_err,
            Err(other) => HttpError::Transport(other),
        }
    }

    /// Whether this error was raised before the request reached the transport.
    #[must_use]
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            HttpError::RequestBuild(_)
                | HttpError::InvalidHeaderName(_)
                | HttpError::InvalidHeaderValue(_)
                | HttpError::FormEncode(_)
                | HttpError::InvalidUri { .. }
                | HttpError::InvalidScheme { .. }
        )
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::error::Error;
    use std::fmt;

    #[derive(Debug)]
    struct TestError(&'static str);

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl Error for TestError {}

    #[test]
    fn test_transport_error_preserves_source() {
        let err = HttpError::Transport(Box::new(TestError("connection refused")));

        let source = err.source().expect("Transport error should have a source");
        let downcast = source
            .downcast_ref::<TestError>()
            .expect("Should be able to downcast to TestError");
        assert_eq!(downcast.0, "connection refused");
    }

    #[test]
    fn test_redirect_error_exposes_policy_source() {
        let err = HttpError::Redirect {
            status: http::StatusCode::FOUND,
            location: "http://example.com/next".to_owned(),
            headers: Box::default(),
            source: Box::new(TestError("not allowed")),
        };

        assert!(err.to_string().contains("http://example.com/next"));
        assert!(err.to_string().contains("302"));
        let source = err.source().unwrap();
        assert_eq!(source.to_string(), "not allowed");
    }

    #[test]
    fn test_from_boxed_unwraps_http_error() {
        let boxed: BoxError = Box::new(HttpError::Timeout(Duration::from_secs(3)));
        let err = HttpError::from_boxed(boxed);
        assert!(matches!(err, HttpError::Timeout(d) if d == Duration::from_secs(3)));
    }

    #[test]
    fn test_from_boxed_wraps_foreign_error() {
        let boxed: BoxError = Box::new(TestError("reset by peer"));
        let err = HttpError::from_boxed(boxed);
        assert!(matches!(err, HttpError::Transport(_)));
        assert_eq!(err.source().unwrap().to_string(), "reset by peer");
    }

    #[test]
    fn test_construction_classification() {
        let invalid = HttpError::InvalidUri {
            url: "nope".to_owned(),
            kind: InvalidUriKind::MissingScheme,
            reason: "missing scheme".to_owned(),
        };
        assert!(invalid.is_construction());
        assert!(!HttpError::Timeout(Duration::from_secs(1)).is_construction());
        assert!(!HttpError::Transport(Box::new(TestError("x"))).is_construction());
    }
}
