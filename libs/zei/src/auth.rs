//! Authorization modes attached to every request.
//!
//! Basic and Bearer are mutually exclusive: the configuration holds exactly
//! one [`Auth`] value and each setter replaces it.
//!
//! # Basic credentials on the wire
//!
//! `Basic` renders as `<username>:<password>` verbatim. The value is **not**
//! base64-encoded and carries no `Basic ` scheme prefix, which differs from
//! RFC 7617. Servers expecting the standard scheme will reject it; callers
//! that need RFC-compliant Basic auth should set the header themselves
//! through [`RequestBuilder::header`](crate::RequestBuilder::header).

use crate::error::HttpError;
use crate::secret::SecretString;
use http::HeaderValue;

/// Authentication descriptor stored in [`ClientConfig`](crate::ClientConfig).
#[derive(Debug, Clone, Default)]
pub enum Auth {
    /// No `Authorization` header is sent
    #[default]
    None,
    /// `Authorization: <username>:<password>`
    Basic {
        username: String,
        password: SecretString,
    },
    /// `Authorization: Bearer <token>`
    Bearer { token: SecretString },
}

impl Auth {
    /// Basic credentials.
    ///
    /// The username must not contain a colon: the server splits the header
    /// value on the first `:` and would attribute the rest to the password.
    #[must_use]
    pub fn basic(username: impl Into<String>, password: impl Into<SecretString>) -> Self {
        Auth::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    #[must_use]
    pub fn bearer(token: impl Into<SecretString>) -> Self {
        Auth::Bearer {
            token: token.into(),
        }
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Auth::None)
    }

    /// Short mode label for log fields; never includes credentials.
    #[must_use]
    pub fn scheme(&self) -> &'static str {
        match self {
            Auth::None => "none",
            Auth::Basic { .. } => "basic",
            Auth::Bearer { .. } => "bearer",
        }
    }

    /// Render the `Authorization` header value, or `None` for [`Auth::None`].
    ///
    /// The returned value is flagged sensitive so HTTP/2 HPACK never indexes it.
    ///
    /// # Errors
    /// Returns `HttpError::InvalidHeaderValue` if the credentials contain
    /// characters that are not allowed in a header value.
    pub fn header_value(&self) -> Result<Option<HeaderValue>, HttpError> {
        let raw = match self {
            Auth::None => return Ok(None),
            Auth::Basic { username, password } => {
                zeroize::Zeroizing::new(format!("{username}:{}", password.expose()))
            }
            Auth::Bearer { token } => zeroize::Zeroizing::new(format!("Bearer {}", token.expose())),
        };

        let mut value = HeaderValue::from_str(&raw)?;
        value.set_sensitive(true);
        Ok(Some(value))
    }
}
