//! The collaborator that actually talks to the network.
//!
//! A [`Transport`] is any cloneable tower service taking a fully prepared
//! `Request<Full<Bytes>>` and producing `Response<ResponseBody>`. The client
//! never mutates a transport; it wraps it in a per-call middleware stack
//! instead.

use crate::config::{TlsRootConfig, TransportConfig, TransportSecurity};
use crate::error::HttpError;
use crate::response::ResponseBody;
use crate::tls;
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::fmt;
use tower::util::BoxCloneSyncService;
use tower::{Service, ServiceBuilder, ServiceExt};
use tower_http::decompression::DecompressionLayer;

/// Type-erased transport service.
pub type TransportService =
    BoxCloneSyncService<Request<Full<Bytes>>, Response<ResponseBody>, HttpError>;

/// Pluggable HTTP transport.
///
/// Cloning is cheap; clones share the underlying connection pool.
///
/// # Example
///
/// ```ignore
/// use zei::{ClientConfig, Transport, TransportConfig};
///
/// // HTTPS-only transport with OS certificates
/// let transport = Transport::hyper(&TransportConfig::tls_only())?;
/// let config = ClientConfig::default().with_transport(transport);
///
/// // Or any tower service, e.g. a canned response for tests
/// let fake = Transport::new(tower::service_fn(|_req| async {
///     Ok(http::Response::new(zei::empty_body()))
/// }));
/// ```
#[derive(Clone)]
pub struct Transport {
    service: TransportService,
}

impl Transport {
    /// Wrap an arbitrary tower service as a transport
    #[must_use]
    pub fn new<S>(service: S) -> Self
    where
        S: Service<Request<Full<Bytes>>, Response = Response<ResponseBody>, Error = HttpError>
            + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        Self {
            service: BoxCloneSyncService::new(service),
        }
    }

    /// Pooled hyper client over rustls with transparent decompression.
    ///
    /// HTTP/2 is negotiated through ALPN when the server supports it.
    /// Responses are decompressed according to `Content-Encoding`
    /// (gzip, br, deflate) and `Accept-Encoding` is added to requests.
    ///
    /// # Errors
    /// Returns `HttpError::Tls` if the TLS root store cannot be initialized.
    pub fn hyper(config: &TransportConfig) -> Result<Self, HttpError> {
        let https = build_https_connector(config.tls_roots, config.security)?;

        let mut client_builder = Client::builder(TokioExecutor::new());

        // pool_timer is required for pool_idle_timeout to take effect
        client_builder
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .http2_only(false);

        if let Some(idle_timeout) = config.pool_idle_timeout {
            client_builder.pool_idle_timeout(idle_timeout);
        }

        let hyper_client = client_builder.build::<_, Full<Bytes>>(https);

        let service = ServiceBuilder::new()
            .layer(DecompressionLayer::new())
            .service(hyper_client)
            .map_response(map_decompression_response)
            .map_err(HttpError::from);

        tracing::debug!(
            security = ?config.security,
            tls_roots = ?config.tls_roots,
            "built hyper transport"
        );

        Ok(Self::new(service))
    }

    pub(crate) fn into_service(self) -> TransportService {
        self.service
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport").finish_non_exhaustive()
    }
}

/// Convert `Response<DecompressionBody<Incoming>>` into `Response<ResponseBody>`.
fn map_decompression_response<B>(response: Response<B>) -> Response<ResponseBody>
where
    B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = response.into_parts();
    let boxed_body: ResponseBody = body.map_err(Into::into).boxed();
    Response::from_parts(parts, boxed_body)
}

/// Build the HTTPS connector for the configured root store.
///
/// `TlsOnly` makes the connector refuse plain `http://` URIs at connect time.
fn build_https_connector(
    tls_roots: TlsRootConfig,
    security: TransportSecurity,
) -> Result<HttpsConnector<HttpConnector>, HttpError> {
    let allow_http = security == TransportSecurity::AllowInsecureHttp;

    let builder = match tls_roots {
        TlsRootConfig::WebPki => hyper_rustls::HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(tls::get_crypto_provider())
            .map_err(|e| HttpError::Tls(Box::new(e)))?,
        TlsRootConfig::Native => {
            let client_config =
                tls::native_roots_client_config().map_err(|e| HttpError::Tls(e.into()))?;
            hyper_rustls::HttpsConnectorBuilder::new().with_tls_config(client_config)
        }
    };

    let connector = if allow_http {
        tracing::warn!("transport accepts plain http:// URLs; use TransportSecurity::TlsOnly to require TLS");
        builder.https_or_http().enable_all_versions().build()
    } else {
        builder.https_only().enable_all_versions().build()
    };
    Ok(connector)
}
