use crate::auth::Auth;
use crate::cookie::CookieStore;
use crate::error::BoxError;
use crate::secret::SecretString;
use crate::transport::Transport;
use http::{StatusCode, Uri};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// User-Agent sent when [`ClientConfig::user_agent`] is empty
pub const DEFAULT_USER_AGENT: &str = "Zei/0.1";

/// Default limit for buffered response body reads (10 MiB)
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Default number of requests one call may send while following redirects
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// TLS root certificate configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Use Mozilla's root certificates (webpki-roots, no OS dependency)
    #[default]
    WebPki,
    /// Use OS native root certificate store
    Native,
}

/// Transport security configuration
///
/// Controls whether the default transport accepts plain `http://` URLs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportSecurity {
    /// Accept both `http://` and `https://` URLs (general-purpose default)
    #[default]
    AllowInsecureHttp,
    /// Require TLS for all connections
    TlsOnly,
}

/// Settings used once, when the default hyper transport is constructed.
///
/// Unlike [`ClientConfig`], these cannot change per call: they shape the
/// connection pool owned by the transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Whether plain HTTP is accepted (default: `AllowInsecureHttp`)
    pub security: TransportSecurity,

    /// TLS root certificate strategy (default: `WebPki`)
    pub tls_roots: TlsRootConfig,

    /// Timeout for idle pooled connections (default: 90 seconds)
    ///
    /// Set to `None` to use hyper-util's default idle timeout.
    pub pool_idle_timeout: Option<Duration>,

    /// Maximum number of idle connections per host (default: 32)
    ///
    /// Setting this to `0` disables connection reuse entirely.
    pub pool_max_idle_per_host: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            security: TransportSecurity::AllowInsecureHttp,
            tls_roots: TlsRootConfig::default(),
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
        }
    }
}

impl TransportConfig {
    /// HTTPS-only transport with native OS roots
    #[must_use]
    pub fn tls_only() -> Self {
        Self {
            security: TransportSecurity::TlsOnly,
            tls_roots: TlsRootConfig::Native,
            ..Default::default()
        }
    }
}

/// A redirect about to be followed, handed to a custom [`RedirectPolicy`].
#[derive(Debug)]
pub struct RedirectAttempt<'a> {
    pub(crate) status: StatusCode,
    pub(crate) location: &'a Uri,
    pub(crate) previous: &'a Uri,
    pub(crate) history: &'a [Uri],
}

impl RedirectAttempt<'_> {
    /// Status of the redirect response
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Where the server wants the client to go next
    #[must_use]
    pub fn location(&self) -> &Uri {
        self.location
    }

    /// URI of the request that produced the redirect
    #[must_use]
    pub fn previous(&self) -> &Uri {
        self.previous
    }

    /// URIs already requested in this call, oldest first
    ///
    /// Always contains at least the original request URI.
    #[must_use]
    pub fn history(&self) -> &[Uri] {
        self.history
    }
}

/// Decision returned by a redirect policy.
#[derive(Debug)]
pub enum RedirectAction {
    /// Follow the redirect
    Follow,
    /// Stop and return the redirect response itself, body unconsumed
    UseLastResponse,
    /// Stop and fail the call with [`HttpError::Redirect`](crate::HttpError::Redirect)
    Reject(BoxError),
}

impl RedirectAction {
    #[must_use]
    pub fn reject(reason: impl Into<BoxError>) -> Self {
        RedirectAction::Reject(reason.into())
    }
}

/// Error produced by the default policy once the limit is reached.
#[derive(Debug, thiserror::Error)]
#[error("stopped after {max} redirects")]
pub struct RedirectLimitExceeded {
    pub max: usize,
}

type RedirectFn = dyn Fn(&RedirectAttempt<'_>) -> RedirectAction + Send + Sync;

#[derive(Clone)]
enum RedirectMode {
    Limited(usize),
    Never,
    Custom(Arc<RedirectFn>),
}

/// Redirect handling for a client.
///
/// The default stops after [`DEFAULT_MAX_REDIRECTS`] consecutive requests
/// and fails with "stopped after 10 redirects". On every redirect that
/// changes origin (scheme, host or port) the `Authorization`, `Cookie` and
/// `Proxy-Authorization` headers are removed unless
/// [`keep_sensitive_headers`](Self::keep_sensitive_headers) was called.
///
/// ```ignore
/// let policy = RedirectPolicy::custom(|attempt| {
///     if attempt.location().host() == Some("internal.example") {
///         RedirectAction::reject("refusing internal redirect")
///     } else {
///         RedirectAction::Follow
///     }
/// });
/// ```
#[derive(Clone)]
pub struct RedirectPolicy {
    mode: RedirectMode,
    strip_sensitive_headers: bool,
}

impl Default for RedirectPolicy {
    fn default() -> Self {
        Self::limited(DEFAULT_MAX_REDIRECTS)
    }
}

impl RedirectPolicy {
    /// Send at most `max` requests per call, the original included, then fail
    /// on the next redirect
    #[must_use]
    pub fn limited(max: usize) -> Self {
        Self {
            mode: RedirectMode::Limited(max),
            strip_sensitive_headers: true,
        }
    }

    /// Never follow; 3xx responses are returned to the caller as-is
    #[must_use]
    pub fn none() -> Self {
        Self {
            mode: RedirectMode::Never,
            strip_sensitive_headers: true,
        }
    }

    /// Ask `decide` before following each redirect
    #[must_use]
    pub fn custom<F>(decide: F) -> Self
    where
        F: Fn(&RedirectAttempt<'_>) -> RedirectAction + Send + Sync + 'static,
    {
        Self {
            mode: RedirectMode::Custom(Arc::new(decide)),
            strip_sensitive_headers: true,
        }
    }

    /// Forward credentials and cookies on cross-origin redirects too
    #[must_use]
    pub fn keep_sensitive_headers(mut self) -> Self {
        self.strip_sensitive_headers = false;
        self
    }

    #[must_use]
    pub fn strips_sensitive_headers(&self) -> bool {
        self.strip_sensitive_headers
    }

    pub(crate) fn decide(&self, attempt: &RedirectAttempt<'_>) -> RedirectAction {
        match &self.mode {
            RedirectMode::Never => RedirectAction::UseLastResponse,
            // history holds every request sent so far, the original included
            RedirectMode::Limited(max) if attempt.history.len() >= *max => {
                RedirectAction::Reject(Box::new(RedirectLimitExceeded { max: *max }))
            }
            RedirectMode::Limited(_) => RedirectAction::Follow,
            RedirectMode::Custom(decide) => decide(attempt),
        }
    }
}

impl fmt::Debug for RedirectPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match &self.mode {
            RedirectMode::Limited(max) => format!("Limited({max})"),
            RedirectMode::Never => "Never".to_owned(),
            RedirectMode::Custom(_) => "Custom".to_owned(),
        };
        f.debug_struct("RedirectPolicy")
            .field("mode", &mode)
            .field("strip_sensitive_headers", &self.strip_sensitive_headers)
            .finish()
    }
}

/// Request-shaping configuration read by [`Client`](crate::Client) on every call.
///
/// Changes are picked up by the next request, so it is fine to tweak a value
/// for a single call through [`SharedConfig::update`] and restore it later.
#[derive(Clone)]
pub struct ClientConfig {
    /// Value of the `User-Agent` header; empty means [`DEFAULT_USER_AGENT`]
    pub user_agent: String,

    /// Transport override; `None` uses the client's default hyper transport
    pub transport: Option<Transport>,

    /// Redirect handling (default: stop after 10 requests, then fail)
    pub redirect: RedirectPolicy,

    /// Cookie store consulted before every request and redirect hop, and
    /// updated from every response. `None` disables automatic cookies.
    pub cookie_store: Option<Arc<dyn CookieStore>>,

    /// Time limit for the whole call: connecting, redirects and reading the
    /// response body. `None` or zero means no limit.
    ///
    /// The deadline keeps running after `execute` returns and will interrupt
    /// a body read that outlives it.
    pub timeout: Option<Duration>,

    /// Maximum response body size for buffered reads (default: 10 MiB)
    pub max_body_size: usize,

    auth: Auth,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: String::new(),
            transport: None,
            redirect: RedirectPolicy::default(),
            cookie_store: None,
            timeout: None,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            auth: Auth::None,
        }
    }
}

impl ClientConfig {
    /// Create minimal configuration (short timeout, small bodies, no redirects)
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            redirect: RedirectPolicy::none(),
            timeout: Some(Duration::from_secs(10)),
            max_body_size: 1024 * 1024, // 1 MB
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_redirect(mut self, redirect: RedirectPolicy) -> Self {
        self.redirect = redirect;
        self
    }

    #[must_use]
    pub fn with_cookie_store(mut self, store: Arc<dyn CookieStore>) -> Self {
        self.cookie_store = Some(store);
        self
    }

    #[must_use]
    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    /// The `User-Agent` value that will actually be sent
    #[must_use]
    pub fn effective_user_agent(&self) -> &str {
        if self.user_agent.is_empty() {
            DEFAULT_USER_AGENT
        } else {
            &self.user_agent
        }
    }

    /// The timeout that will actually be applied (`None` for unset or zero)
    #[must_use]
    pub fn effective_timeout(&self) -> Option<Duration> {
        self.timeout.filter(|t| !t.is_zero())
    }

    /// Send `Authorization: <username>:<password>` with every request.
    ///
    /// Replaces any previously configured authentication. The pair is sent
    /// without base64 encoding (see [`auth`](crate::auth)). The username must
    /// not contain a colon.
    pub fn set_basic_auth(&mut self, username: impl Into<String>, password: impl Into<SecretString>) {
        self.auth = Auth::basic(username, password);
    }

    /// Username and password configured by [`set_basic_auth`](Self::set_basic_auth).
    ///
    /// `None` unless Basic is the current mode.
    #[must_use]
    pub fn basic_auth(&self) -> Option<(&str, &str)> {
        match &self.auth {
            Auth::Basic { username, password } => Some((username.as_str(), password.expose())),
            Auth::None | Auth::Bearer { .. } => None,
        }
    }

    /// Send `Authorization: Bearer <token>` with every request.
    ///
    /// Replaces any previously configured authentication.
    pub fn set_bearer_auth(&mut self, token: impl Into<SecretString>) {
        self.auth = Auth::bearer(token);
    }

    /// Token configured by [`set_bearer_auth`](Self::set_bearer_auth).
    ///
    /// `None` unless Bearer is the current mode.
    #[must_use]
    pub fn bearer_auth(&self) -> Option<&str> {
        match &self.auth {
            Auth::Bearer { token } => Some(token.expose()),
            Auth::None | Auth::Basic { .. } => None,
        }
    }

    /// Current authentication mode
    #[must_use]
    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    pub fn set_auth(&mut self, auth: Auth) {
        self.auth = auth;
    }

    /// Stop sending an `Authorization` header
    pub fn clear_auth(&mut self) {
        self.auth = Auth::None;
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("user_agent", &self.user_agent)
            .field("transport", &self.transport)
            .field("redirect", &self.redirect)
            .field("cookie_store", &self.cookie_store.is_some())
            .field("timeout", &self.timeout)
            .field("max_body_size", &self.max_body_size)
            .field("auth", &self.auth)
            .finish()
    }
}

/// Caller-held handle to a [`ClientConfig`] shared with one or more clients.
///
/// Cloning is cheap and every clone points at the same configuration.
/// Clients take a short read lock at the start of each call and work from
/// that snapshot, so an update never affects a request already in flight.
#[derive(Clone, Default)]
pub struct SharedConfig(Arc<RwLock<ClientConfig>>);

impl SharedConfig {
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self(Arc::new(RwLock::new(config)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, ClientConfig> {
        self.0.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, ClientConfig> {
        self.0.write()
    }

    /// Mutate the configuration under the write lock
    ///
    /// ```ignore
    /// shared.update(|c| c.set_bearer_auth("fresh-token"));
    /// ```
    pub fn update(&self, f: impl FnOnce(&mut ClientConfig)) {
        f(&mut self.0.write());
    }

    /// Copy of the current configuration
    #[must_use]
    pub fn snapshot(&self) -> ClientConfig {
        self.0.read().clone()
    }
}

impl From<ClientConfig> for SharedConfig {
    fn from(config: ClientConfig) -> Self {
        Self::new(config)
    }
}

impl fmt::Debug for SharedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedConfig").field(&*self.0.read()).finish()
    }
}
