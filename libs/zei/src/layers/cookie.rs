use crate::cookie::CookieStore;
use http::{HeaderValue, Request, Response, header};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Attaches stored cookies to each hop and records `Set-Cookie` replies.
///
/// Sits below the redirect layer so every redirected request consults the
/// store for its own URI. Without a store the layer passes requests through.
#[derive(Clone, Default)]
pub struct CookieLayer {
    store: Option<Arc<dyn CookieStore>>,
}

impl CookieLayer {
    #[must_use]
    pub fn new(store: Option<Arc<dyn CookieStore>>) -> Self {
        Self { store }
    }
}

impl fmt::Debug for CookieLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieLayer")
            .field("store", &self.store.is_some())
            .finish()
    }
}

impl<S> Layer<S> for CookieLayer {
    type Service = CookieService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CookieService {
            inner,
            store: self.store.clone(),
        }
    }
}

#[derive(Clone)]
pub struct CookieService<S> {
    inner: S,
    store: Option<Arc<dyn CookieStore>>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for CookieService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response<ResBody>, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let Some(store) = self.store.clone() else {
            return Box::pin(self.inner.call(req));
        };

        let uri = req.uri().clone();
        if let Some(stored) = store.cookies(&uri) {
            let merged = match req.headers().get(header::COOKIE) {
                Some(existing) => merge_cookie_headers(existing, &stored),
                None => Some(stored),
            };
            if let Some(value) = merged {
                req.headers_mut().insert(header::COOKIE, value);
            }
        }

        let future = self.inner.call(req);
        Box::pin(async move {
            let response = future.await?;
            let mut set_cookies = response.headers().get_all(header::SET_COOKIE).iter();
            store.set_cookies(&mut set_cookies, &uri);
            Ok(response)
        })
    }
}

/// Append jar cookies after the ones the caller set on the request.
fn merge_cookie_headers(existing: &HeaderValue, stored: &HeaderValue) -> Option<HeaderValue> {
    let mut merged = Vec::with_capacity(existing.len() + 2 + stored.len());
    merged.extend_from_slice(existing.as_bytes());
    merged.extend_from_slice(b"; ");
    merged.extend_from_slice(stored.as_bytes());
    match HeaderValue::from_bytes(&merged) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(error = %e, "dropping stored cookies that do not fit the request header");
            None
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::cookie::Jar;
    use bytes::Bytes;
    use http::{StatusCode, Uri};
    use http_body_util::Full;
    use parking_lot::Mutex;
    use tower::ServiceExt;

    /// Records the Cookie header it sees and answers with fixed Set-Cookie values.
    #[derive(Clone)]
    struct CookieEcho {
        seen: Arc<Mutex<Vec<Option<String>>>>,
        set_cookies: &'static [&'static str],
    }

    impl Service<Request<Full<Bytes>>> for CookieEcho {
        type Response = Response<Full<Bytes>>;
        type Error = crate::HttpError;
        type Future = std::future::Ready<Result<Self::Response, Self::Error>>;

        fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
            self.seen.lock().push(
                req.headers()
                    .get(header::COOKIE)
                    .map(|v| v.to_str().unwrap().to_owned()),
            );
            let mut builder = Response::builder().status(StatusCode::OK);
            for value in self.set_cookies {
                builder = builder.header(header::SET_COOKIE, *value);
            }
            std::future::ready(Ok(builder.body(Full::new(Bytes::new())).unwrap()))
        }
    }

    fn get(uri: &str) -> Request<Full<Bytes>> {
        Request::get(uri).body(Full::new(Bytes::new())).unwrap()
    }

    #[tokio::test]
    async fn test_set_cookie_stored_and_replayed() {
        let jar = Arc::new(Jar::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let echo = CookieEcho {
            seen: seen.clone(),
            set_cookies: &["session=abc; Path=/", "theme=dark"],
        };
        let layer = CookieLayer::new(Some(jar.clone()));

        layer.layer(echo.clone()).oneshot(get("http://example.com/")).await.unwrap();
        layer.layer(echo).oneshot(get("http://example.com/page")).await.unwrap();

        let seen = seen.lock();
        assert_eq!(seen[0], None);
        let second = seen[1].as_deref().unwrap();
        assert!(second.contains("session=abc"));
        assert!(second.contains("theme=dark"));

        let uri: Uri = "http://example.com/".parse().unwrap();
        assert!(jar.cookies(&uri).is_some());
    }

    #[tokio::test]
    async fn test_caller_cookie_header_is_extended() {
        let jar = Arc::new(Jar::default());
        jar.add_cookie_str("stored=1", &"http://example.com/".parse().unwrap());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let echo = CookieEcho {
            seen: seen.clone(),
            set_cookies: &[],
        };

        let req = Request::get("http://example.com/")
            .header(header::COOKIE, "manual=2")
            .body(Full::new(Bytes::new()))
            .unwrap();
        CookieLayer::new(Some(jar))
            .layer(echo)
            .oneshot(req)
            .await
            .unwrap();

        assert_eq!(seen.lock()[0].as_deref(), Some("manual=2; stored=1"));
    }

    #[tokio::test]
    async fn test_out_of_range_max_age_from_server() {
        let jar = Arc::new(Jar::default());
        let echo = CookieEcho {
            seen: Arc::new(Mutex::new(Vec::new())),
            set_cookies: &["forever=1; Max-Age=9223372036854775807"],
        };

        let resp = CookieLayer::new(Some(jar.clone()))
            .layer(echo)
            .oneshot(get("http://example.com/"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let uri: Uri = "http://example.com/".parse().unwrap();
        assert_eq!(jar.cookies(&uri).unwrap(), "forever=1");
    }

    #[tokio::test]
    async fn test_without_store_passes_through() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let echo = CookieEcho {
            seen: seen.clone(),
            set_cookies: &["ignored=1"],
        };

        let layer = CookieLayer::default();
        layer.layer(echo.clone()).oneshot(get("http://example.com/")).await.unwrap();
        layer.layer(echo).oneshot(get("http://example.com/")).await.unwrap();

        assert_eq!(*seen.lock(), vec![None, None]);
    }
}
