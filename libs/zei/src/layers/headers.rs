use crate::config::ClientConfig;
use crate::error::HttpError;
use http::{HeaderValue, Request, Response, header};
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Stamps `User-Agent` and `Authorization` from the client configuration.
///
/// Both values are rendered once when the layer is built, so an invalid
/// user agent or credential fails the call before anything is dispatched.
/// `User-Agent` always overwrites a caller-supplied value; `Authorization`
/// is only touched when an auth mode is configured.
#[derive(Clone, Debug)]
pub struct RequestHeadersLayer {
    user_agent: HeaderValue,
    authorization: Option<HeaderValue>,
}

impl RequestHeadersLayer {
    /// # Errors
    /// Returns `HttpError::InvalidHeaderValue` if the user agent or the
    /// credentials are not valid header values
    pub fn try_from_config(config: &ClientConfig) -> Result<Self, HttpError> {
        let user_agent = HeaderValue::from_str(config.effective_user_agent())?;
        let authorization = config.auth().header_value()?;
        Ok(Self {
            user_agent,
            authorization,
        })
    }
}

impl<S> Layer<S> for RequestHeadersLayer {
    type Service = RequestHeadersService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestHeadersService {
            inner,
            user_agent: self.user_agent.clone(),
            authorization: self.authorization.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RequestHeadersService<S> {
    inner: S,
    user_agent: HeaderValue,
    authorization: Option<HeaderValue>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestHeadersService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let headers = req.headers_mut();
        headers.insert(header::USER_AGENT, self.user_agent.clone());
        if let Some(authorization) = &self.authorization {
            headers.insert(header::AUTHORIZATION, authorization.clone());
        }
        self.inner.call(req)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::auth::Auth;
    use bytes::Bytes;
    use http::{Method, StatusCode};
    use http_body_util::Full;
    use tower::ServiceExt;

    /// Asserts on the headers that reach the inner service.
    #[derive(Clone)]
    struct CheckHeadersService {
        expected_ua: &'static str,
        expected_auth: Option<&'static str>,
    }

    impl Service<Request<Full<Bytes>>> for CheckHeadersService {
        type Response = Response<Full<Bytes>>;
        type Error = HttpError;
        type Future = std::future::Ready<Result<Self::Response, Self::Error>>;

        fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
            assert_eq!(req.headers().get(header::USER_AGENT).unwrap(), self.expected_ua);
            assert_eq!(
                req.headers()
                    .get(header::AUTHORIZATION)
                    .map(|v| v.to_str().unwrap()),
                self.expected_auth
            );
            std::future::ready(Ok(Response::builder()
                .status(StatusCode::OK)
                .body(Full::new(Bytes::new()))
                .unwrap()))
        }
    }

    fn request(builder: http::request::Builder) -> Request<Full<Bytes>> {
        builder
            .method(Method::GET)
            .uri("http://example.com")
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_default_user_agent_without_auth() {
        let layer = RequestHeadersLayer::try_from_config(&ClientConfig::default()).unwrap();
        let service = layer.layer(CheckHeadersService {
            expected_ua: "Zei/0.1",
            expected_auth: None,
        });

        service.oneshot(request(Request::builder())).await.unwrap();
    }

    #[tokio::test]
    async fn test_user_agent_overwrites_caller_value() {
        let config = ClientConfig::default().with_user_agent("Test/1");
        let layer = RequestHeadersLayer::try_from_config(&config).unwrap();
        let service = layer.layer(CheckHeadersService {
            expected_ua: "Test/1",
            expected_auth: None,
        });

        let req = request(Request::builder().header(header::USER_AGENT, "caller/9"));
        service.oneshot(req).await.unwrap();
    }

    #[tokio::test]
    async fn test_caller_authorization_kept_when_no_auth_configured() {
        let layer = RequestHeadersLayer::try_from_config(&ClientConfig::default()).unwrap();
        let service = layer.layer(CheckHeadersService {
            expected_ua: "Zei/0.1",
            expected_auth: Some("Custom abc"),
        });

        let req = request(Request::builder().header(header::AUTHORIZATION, "Custom abc"));
        service.oneshot(req).await.unwrap();
    }

    #[tokio::test]
    async fn test_basic_and_bearer_rendering() {
        let mut config = ClientConfig::default();
        config.set_basic_auth("zei", "password");
        let service = RequestHeadersLayer::try_from_config(&config)
            .unwrap()
            .layer(CheckHeadersService {
                expected_ua: "Zei/0.1",
                expected_auth: Some("zei:password"),
            });
        service.oneshot(request(Request::builder())).await.unwrap();

        config.set_auth(Auth::bearer("tok123"));
        let service = RequestHeadersLayer::try_from_config(&config)
            .unwrap()
            .layer(CheckHeadersService {
                expected_ua: "Zei/0.1",
                expected_auth: Some("Bearer tok123"),
            });
        service.oneshot(request(Request::builder())).await.unwrap();
    }

    #[test]
    fn test_invalid_user_agent_rejected() {
        let config = ClientConfig::default().with_user_agent("bad\x00agent");
        let result = RequestHeadersLayer::try_from_config(&config);
        assert!(matches!(result, Err(HttpError::InvalidHeaderValue(_))));
    }
}
