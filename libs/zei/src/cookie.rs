//! Cookie persistence between requests.
//!
//! A [`CookieStore`] is consulted before every request (and every redirect
//! hop) and fed the `Set-Cookie` headers of every response. [`Jar`] is the
//! in-memory implementation backed by `cookie_store`; plug in your own store
//! for persistence.

use bytes::Bytes;
use http::{HeaderValue, Uri};
use parking_lot::RwLock;
use std::fmt;
use std::time::{Duration, SystemTime};
use url::Url;

/// Storage backend for cookies received from and sent to servers.
pub trait CookieStore: Send + Sync {
    /// Store cookies from the `Set-Cookie` headers of a response to `url`.
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Uri);

    /// Value for the `Cookie` header of a request to `url`, if any cookie applies.
    fn cookies(&self, url: &Uri) -> Option<HeaderValue>;
}

/// A single cookie as received in a `Set-Cookie` header.
#[derive(Clone, PartialEq)]
pub struct Cookie(cookie::Cookie<'static>);

impl Cookie {
    /// Session cookie with no attributes.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self(cookie::Cookie::new(name.into(), value.into()))
    }

    /// Parse a `Set-Cookie` header value.
    ///
    /// Returns `None` when the leading `name=value` pair is missing or the
    /// name is empty.
    #[must_use]
    pub fn parse(header: &str) -> Option<Self> {
        cookie::Cookie::parse(header)
            .ok()
            .map(|c| Self(c.into_owned()))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.0.name()
    }

    #[must_use]
    pub fn value(&self) -> &str {
        self.0.value()
    }

    /// `Domain` attribute, without a leading dot
    #[must_use]
    pub fn domain(&self) -> Option<&str> {
        self.0.domain()
    }

    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.0.path()
    }

    #[must_use]
    pub fn secure(&self) -> bool {
        self.0.secure().unwrap_or(false)
    }

    #[must_use]
    pub fn http_only(&self) -> bool {
        self.0.http_only().unwrap_or(false)
    }

    /// `Max-Age` attribute; negative values read as zero
    #[must_use]
    pub fn max_age(&self) -> Option<Duration> {
        self.0.max_age().and_then(|d| d.try_into().ok())
    }

    /// `Expires` attribute, `None` for session cookies
    #[must_use]
    pub fn expires(&self) -> Option<SystemTime> {
        match self.0.expires() {
            Some(cookie::Expiration::DateTime(at)) => Some(SystemTime::from(at)),
            None | Some(cookie::Expiration::Session) => None,
        }
    }
}

impl fmt::Debug for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// `cookie_store` keys cookies by `url::Url`.
fn to_url(uri: &Uri) -> Option<Url> {
    match Url::parse(&uri.to_string()) {
        Ok(url) => Some(url),
        Err(e) => {
            tracing::debug!(uri = %uri, error = %e, "URI not usable for cookie matching");
            None
        }
    }
}

/// In-memory cookie jar.
///
/// Domain, path, expiry and `Secure` matching follow RFC 6265 through the
/// `cookie_store` crate. Safe to share between clients through an `Arc`.
#[derive(Debug, Default)]
pub struct Jar {
    store: RwLock<cookie_store::CookieStore>,
}

impl Jar {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store one `Set-Cookie` value as if it came from a response to `url`.
    pub fn add_cookie_str(&self, cookie: &str, url: &Uri) {
        let Some(url) = to_url(url) else {
            return;
        };
        match cookie::Cookie::parse(cookie) {
            Ok(parsed) => self
                .store
                .write()
                .store_response_cookies(std::iter::once(parsed.into_owned()), &url),
            Err(e) => tracing::debug!(error = %e, "ignoring malformed cookie"),
        }
    }

    /// Unexpired cookies currently held
    #[must_use]
    pub fn cookies_snapshot(&self) -> Vec<Cookie> {
        self.store
            .read()
            .iter_unexpired()
            .map(|c| Cookie(cookie::Cookie::clone(c).into_owned()))
            .collect()
    }

    pub fn clear(&self) {
        self.store.write().clear();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.read().iter_unexpired().next().is_none()
    }
}

impl CookieStore for Jar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Uri) {
        let Some(url) = to_url(url) else {
            return;
        };

        let cookies: Vec<_> = cookie_headers
            .filter_map(|value| {
                let parsed = value
                    .to_str()
                    .map_err(|e| e.to_string())
                    .and_then(|s| cookie::Cookie::parse(s).map_err(|e| e.to_string()));
                match parsed {
                    Ok(c) => Some(c.into_owned()),
                    Err(e) => {
                        tracing::debug!(url = %url, error = %e, "ignoring malformed Set-Cookie header");
                        None
                    }
                }
            })
            .collect();

        self.store
            .write()
            .store_response_cookies(cookies.into_iter(), &url);
    }

    fn cookies(&self, url: &Uri) -> Option<HeaderValue> {
        let url = to_url(url)?;
        let header = self
            .store
            .read()
            .get_request_values(&url)
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");

        if header.is_empty() {
            return None;
        }

        match HeaderValue::from_maybe_shared(Bytes::from(header)) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(error = %e, "failed to build Cookie header");
                None
            }
        }
    }
}
