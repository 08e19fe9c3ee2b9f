use crate::config::{ClientConfig, SharedConfig, TransportConfig};
use crate::error::HttpError;
use crate::layers::{CookieLayer, RequestHeadersLayer, RedirectTracker};
use crate::request::{FORM_CONTENT_TYPE, RequestBuilder, build_request, encode_form};
use crate::response::{HttpResponse, ResponseBody};
use crate::transport::Transport;
use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, Request, Response};
use http_body_util::Full;
use tokio::time::Instant;
use tower::util::BoxCloneSyncService;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::follow_redirect::FollowRedirectLayer;

/// Stack assembled for a single call
type CallService = BoxCloneSyncService<Request<Full<Bytes>>, Response<ResponseBody>, HttpError>;

/// HTTP client that applies a shared [`ClientConfig`] to every request.
///
/// Each call takes a snapshot of the configuration and builds its own
/// middleware stack from it: headers, redirect policy, cookie store and
/// transport. Updating the [`SharedConfig`] affects the next call and never
/// one that is already running, so a client can be cloned freely and used
/// from many tasks at once.
///
/// # Example
///
/// ```ignore
/// use zei::{Client, ClientConfig, SharedConfig};
///
/// let config = SharedConfig::new(ClientConfig::default().with_user_agent("Fetcher/2"));
/// let client = Client::new(config.clone())?;
///
/// config.update(|c| c.set_bearer_auth("tok123"));
/// let body = client.get("https://api.example.com/me").await?.text().await?;
/// ```
#[derive(Clone, Debug)]
pub struct Client {
    config: SharedConfig,
    transport: Transport,
}

impl Client {
    /// Client over the default hyper transport.
    ///
    /// The default transport is only used while `config.transport` is unset.
    ///
    /// # Errors
    /// Returns `HttpError::Tls` if the TLS stack cannot be initialized.
    pub fn new(config: impl Into<SharedConfig>) -> Result<Self, HttpError> {
        Self::with_transport_config(config, &TransportConfig::default())
    }

    /// Client whose fallback transport is built from `transport_config`.
    ///
    /// # Errors
    /// Returns `HttpError::Tls` if the TLS stack cannot be initialized.
    pub fn with_transport_config(
        config: impl Into<SharedConfig>,
        transport_config: &TransportConfig,
    ) -> Result<Self, HttpError> {
        Ok(Self::with_transport(config, Transport::hyper(transport_config)?))
    }

    /// Client that falls back to `transport` when the configuration has none.
    #[must_use]
    pub fn with_transport(config: impl Into<SharedConfig>, transport: Transport) -> Self {
        Self {
            config: config.into(),
            transport,
        }
    }

    /// Handle to the configuration read by every call
    #[must_use]
    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    /// Send a prepared request.
    ///
    /// `User-Agent` is always replaced by the configured value (or
    /// `Zei/0.1`), and `Authorization` is set when an auth mode is
    /// configured. Redirects, cookies and the timeout follow the same
    /// configuration snapshot.
    ///
    /// # Errors
    /// Construction errors when the configured user agent or credentials
    /// cannot be encoded, then `Timeout`, `Redirect` or `Transport` from
    /// dispatch.
    pub async fn execute(&self, request: Request<Full<Bytes>>) -> Result<HttpResponse, HttpError> {
        let config = self.config.snapshot();
        let service = self.call_service(&config)?;
        let deadline = config
            .effective_timeout()
            .and_then(|timeout| Instant::now().checked_add(timeout).map(|at| (at, timeout)));

        tracing::debug!(
            method = %request.method(),
            uri = %request.uri(),
            auth = config.auth().scheme(),
            "sending request"
        );

        let call = service.oneshot(request);
        let response = match deadline {
            Some((at, timeout)) => tokio::time::timeout_at(at, call)
                .await
                .map_err(|_| HttpError::Timeout(timeout))??,
            None => call.await?,
        };

        tracing::debug!(status = response.status().as_u16(), "received response");
        Ok(HttpResponse::new(response, config.max_body_size, deadline))
    }

    /// GET `url`.
    ///
    /// # Errors
    /// `InvalidUri` or `InvalidScheme` before dispatch, then as [`execute`](Self::execute).
    pub async fn get(&self, url: &str) -> Result<HttpResponse, HttpError> {
        self.execute(build_request(Method::GET, url, None, Bytes::new())?)
            .await
    }

    /// HEAD `url`.
    ///
    /// # Errors
    /// As [`get`](Self::get).
    pub async fn head(&self, url: &str) -> Result<HttpResponse, HttpError> {
        self.execute(build_request(Method::HEAD, url, None, Bytes::new())?)
            .await
    }

    /// POST `body` to `url` with the given `Content-Type`.
    ///
    /// # Errors
    /// As [`get`](Self::get), plus `InvalidHeaderValue` for an unusable content type.
    pub async fn post(
        &self,
        url: &str,
        content_type: &str,
        body: impl Into<Bytes>,
    ) -> Result<HttpResponse, HttpError> {
        let request = build_request(Method::POST, url, Some(content_type), body.into())?;
        self.execute(request).await
    }

    /// POST URL-encoded `form` fields to `url`, sorted by key.
    ///
    /// # Errors
    /// As [`post`](Self::post), plus `FormEncode`.
    pub async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<HttpResponse, HttpError> {
        let encoded = encode_form(form)?;
        self.post(url, FORM_CONTENT_TYPE, encoded).await
    }

    /// Start a request with any method.
    pub fn request(&self, method: Method, url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(self.clone(), method, url.into())
    }

    /// Assemble the per-call stack from one configuration snapshot.
    ///
    /// From the outside in: header stamping, redirects, redirect header
    /// recording, cookies, transport. Cookies sit below redirects so every
    /// hop reads and writes the store.
    fn call_service(&self, config: &ClientConfig) -> Result<CallService, HttpError> {
        let transport = config
            .transport
            .clone()
            .unwrap_or_else(|| self.transport.clone());

        let tracker = RedirectTracker::new(config.redirect.clone());
        let redirect_headers = tracker.redirect_headers();

        let stack = ServiceBuilder::new()
            .layer(RequestHeadersLayer::try_from_config(config)?)
            .layer(FollowRedirectLayer::with_policy(tracker))
            .map_response(move |response: Response<ResponseBody>| {
                redirect_headers.record(&response);
                response
            })
            .layer(CookieLayer::new(config.cookie_store.clone()))
            .service(transport.into_service());

        Ok(BoxCloneSyncService::new(stack))
    }
}

/// The request operations of [`Client`] as an object-safe trait.
///
/// Lets code depend on "something that sends requests" and swap in a fake.
#[async_trait]
pub trait HttpRequester: Send + Sync {
    /// Send a prepared request.
    ///
    /// # Errors
    /// Any [`HttpError`] raised while sending.
    async fn execute(&self, request: Request<Full<Bytes>>) -> Result<HttpResponse, HttpError>;

    /// # Errors
    /// Invalid URLs, then as [`execute`](Self::execute).
    async fn get(&self, url: &str) -> Result<HttpResponse, HttpError>;

    /// # Errors
    /// Invalid URLs, then as [`execute`](Self::execute).
    async fn head(&self, url: &str) -> Result<HttpResponse, HttpError>;

    /// # Errors
    /// Invalid URLs or content type, then as [`execute`](Self::execute).
    async fn post(
        &self,
        url: &str,
        content_type: &str,
        body: Bytes,
    ) -> Result<HttpResponse, HttpError>;

    /// # Errors
    /// Form encoding failures, then as [`post`](Self::post).
    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<HttpResponse, HttpError>;
}

#[async_trait]
impl HttpRequester for Client {
    async fn execute(&self, request: Request<Full<Bytes>>) -> Result<HttpResponse, HttpError> {
        Client::execute(self, request).await
    }

    async fn get(&self, url: &str) -> Result<HttpResponse, HttpError> {
        Client::get(self, url).await
    }

    async fn head(&self, url: &str) -> Result<HttpResponse, HttpError> {
        Client::head(self, url).await
    }

    async fn post(
        &self,
        url: &str,
        content_type: &str,
        body: Bytes,
    ) -> Result<HttpResponse, HttpError> {
        Client::post(self, url, content_type, body).await
    }

    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<HttpResponse, HttpError> {
        Client::post_form(self, url, form).await
    }
}
