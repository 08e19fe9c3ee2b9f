use crate::client::Client;
use crate::error::{HttpError, InvalidUriKind};
use crate::response::HttpResponse;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{Method, Request, Uri};
use http_body_util::Full;

/// Content type sent by [`Client::post_form`] and [`RequestBuilder::form`]
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// URL-encode form fields, sorted by key.
///
/// The sort is stable, so repeated keys keep the caller's order.
///
/// # Errors
/// Returns `HttpError::FormEncode` if serialization fails.
pub fn encode_form(fields: &[(&str, &str)]) -> Result<String, HttpError> {
    let mut sorted = fields.to_vec();
    sorted.sort_by_key(|&(key, _)| key);
    serde_urlencoded::to_string(&sorted).map_err(HttpError::from)
}

/// Parse an absolute `http://` or `https://` URL.
///
/// # Errors
/// `InvalidUri` for malformed or host-less URLs, `InvalidScheme` for any
/// scheme other than http and https.
pub fn parse_url(url: &str) -> Result<Uri, HttpError> {
    let uri: Uri = url.parse().map_err(|e: http::uri::InvalidUri| HttpError::InvalidUri {
        url: url.to_owned(),
        kind: InvalidUriKind::ParseError,
        reason: e.to_string(),
    })?;

    let Some(scheme) = uri.scheme_str() else {
        return Err(HttpError::InvalidUri {
            url: url.to_owned(),
            kind: InvalidUriKind::MissingScheme,
            reason: "missing scheme".to_owned(),
        });
    };

    if !scheme.eq_ignore_ascii_case("http") && !scheme.eq_ignore_ascii_case("https") {
        return Err(HttpError::InvalidScheme {
            scheme: scheme.to_owned(),
            reason: "only http:// and https:// are supported".to_owned(),
        });
    }

    if uri.host().is_none_or(str::is_empty) {
        return Err(HttpError::InvalidUri {
            url: url.to_owned(),
            kind: InvalidUriKind::MissingAuthority,
            reason: "missing host".to_owned(),
        });
    }

    Ok(uri)
}

/// Request with a validated URL and an optional `Content-Type`.
pub fn build_request(
    method: Method,
    url: &str,
    content_type: Option<&str>,
    body: Bytes,
) -> Result<Request<Full<Bytes>>, HttpError> {
    let uri = parse_url(url)?;
    let mut request = Request::builder().method(method).uri(uri).body(Full::new(body))?;
    if let Some(content_type) = content_type {
        request
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_str(content_type)?);
    }
    Ok(request)
}

/// Fluent request construction for methods the shortcuts don't cover.
///
/// Errors from header or form setters are held back and returned by
/// [`build`](Self::build) or [`send`](Self::send), so chains stay readable.
///
/// ```ignore
/// let resp = client
///     .request(Method::PUT, "https://api.example.com/items/7")
///     .header("content-type", "application/json")
///     .body_string(r#"{"name":"seven"}"#.to_owned())
///     .send()
///     .await?;
/// ```
#[must_use = "RequestBuilder does nothing until .send() is called"]
pub struct RequestBuilder {
    client: Client,
    method: Method,
    url: String,
    headers: Vec<(HeaderName, HeaderValue)>,
    body: Bytes,
    default_content_type: Option<&'static str>,
    error: Option<HttpError>,
}

impl RequestBuilder {
    pub(crate) fn new(client: Client, method: Method, url: String) -> Self {
        Self {
            client,
            method,
            url,
            headers: Vec::new(),
            body: Bytes::new(),
            default_content_type: None,
            error: None,
        }
    }

    /// Append a header. `User-Agent` is always replaced by the client.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if self.error.is_some() {
            return self;
        }

        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => self.headers.push((name, value)),
            (Err(e), _) => self.error = Some(HttpError::InvalidHeaderName(e)),
            (_, Err(e)) => self.error = Some(HttpError::InvalidHeaderValue(e)),
        }
        self
    }

    pub fn headers<I, K, V>(self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        headers
            .into_iter()
            .fold(self, |builder, (name, value)| builder.header(name.as_ref(), value.as_ref()))
    }

    pub fn body_bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn body_string(self, body: String) -> Self {
        self.body_bytes(body)
    }

    /// URL-encode `fields` as the body, sorted by key.
    ///
    /// `Content-Type` defaults to `application/x-www-form-urlencoded` unless
    /// a header sets it.
    pub fn form(mut self, fields: &[(&str, &str)]) -> Self {
        if self.error.is_some() {
            return self;
        }

        match encode_form(fields) {
            Ok(encoded) => {
                self.body = Bytes::from(encoded);
                self.default_content_type = Some(FORM_CONTENT_TYPE);
            }
            Err(e) => self.error = Some(e),
        }
        self
    }

    /// Assemble the request without sending it.
    ///
    /// # Errors
    /// Returns the first deferred setter error, or a URL validation error.
    pub fn build(self) -> Result<Request<Full<Bytes>>, HttpError> {
        self.into_parts().map(|(_, request)| request)
    }

    /// Send through the client that created this builder.
    ///
    /// # Errors
    /// Construction errors as for [`build`](Self::build), then anything
    /// [`Client::execute`] returns.
    pub async fn send(self) -> Result<HttpResponse, HttpError> {
        let (client, request) = self.into_parts()?;
        client.execute(request).await
    }

    fn into_parts(self) -> Result<(Client, Request<Full<Bytes>>), HttpError> {
        if let Some(e) = self.error {
            return Err(e);
        }

        let has_content_type = self.headers.iter().any(|(name, _)| name == CONTENT_TYPE);
        let content_type = self.default_content_type.filter(|_| !has_content_type);

        let mut request = build_request(self.method, &self.url, content_type, self.body)?;
        for (name, value) in self.headers {
            request.headers_mut().append(name, value);
        }
        Ok((self.client, request))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url_accepts_http_and_https() {
        assert_eq!(parse_url("http://example.com/a").unwrap().path(), "/a");
        assert_eq!(
            parse_url("https://example.com:8443").unwrap().port_u16(),
            Some(8443)
        );
    }

    #[test]
    fn test_parse_url_classifies_failures() {
        assert!(matches!(
            parse_url("not a url"),
            Err(HttpError::InvalidUri {
                kind: InvalidUriKind::ParseError,
                ..
            })
        ));
        assert!(matches!(
            parse_url("/relative/path"),
            Err(HttpError::InvalidUri {
                kind: InvalidUriKind::MissingScheme,
                ..
            })
        ));
        assert!(matches!(
            parse_url("ftp://example.com/file"),
            Err(HttpError::InvalidScheme { scheme, .. }) if scheme == "ftp"
        ));
    }

    #[test]
    fn test_encode_form_sorts_by_key() {
        let encoded = encode_form(&[("b", "2"), ("a", "1 2"), ("b", "0")]).unwrap();
        assert_eq!(encoded, "a=1+2&b=2&b=0");
        assert_eq!(encode_form(&[]).unwrap(), "");
    }

    #[test]
    fn test_build_request_sets_content_type() {
        let req = build_request(
            Method::POST,
            "http://example.com/submit",
            Some("text/plain"),
            Bytes::from_static(b"hi"),
        )
        .unwrap();
        assert_eq!(req.method(), Method::POST);
        assert_eq!(req.headers()[CONTENT_TYPE], "text/plain");
    }

    #[test]
    fn test_build_request_rejects_bad_content_type() {
        let result = build_request(Method::POST, "http://example.com", Some("a\nb"), Bytes::new());
        assert!(matches!(result, Err(HttpError::InvalidHeaderValue(_))));
    }

    fn client() -> Client {
        Client::with_transport(
            crate::SharedConfig::default(),
            crate::Transport::new(tower::service_fn(|_req: Request<Full<Bytes>>| async {
                Ok::<_, HttpError>(http::Response::new(crate::response::empty_body()))
            })),
        )
    }

    #[test]
    fn test_builder_form_defaults_content_type() {
        let req = client()
            .request(Method::POST, "http://example.com/login")
            .form(&[("user", "zei"), ("remember", "yes please")])
            .build()
            .unwrap();
        assert_eq!(req.headers()[CONTENT_TYPE], FORM_CONTENT_TYPE);
    }

    #[test]
    fn test_builder_explicit_content_type_wins() {
        let req = client()
            .request(Method::POST, "http://example.com/login")
            .header("content-type", "application/vnd.custom")
            .form(&[("a", "b")])
            .build()
            .unwrap();
        let values: Vec<_> = req.headers().get_all(CONTENT_TYPE).iter().collect();
        assert_eq!(values, vec!["application/vnd.custom"]);
    }

    #[test]
    fn test_builder_defers_header_errors() {
        let result = client()
            .request(Method::GET, "http://example.com")
            .header("bad header", "x")
            .header("x-ok", "fine")
            .build();
        assert!(matches!(result, Err(HttpError::InvalidHeaderName(_))));
    }

    #[test]
    fn test_builder_headers_from_pairs() {
        let req = client()
            .request(Method::GET, "http://example.com")
            .headers([("x-a", "1"), ("x-b", "2")])
            .build()
            .unwrap();
        assert_eq!(req.headers()["x-a"], "1");
        assert_eq!(req.headers()["x-b"], "2");
    }
}
