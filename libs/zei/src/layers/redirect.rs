//! Adapter between [`RedirectPolicy`] and tower-http's `FollowRedirect`.
//!
//! A fresh [`RedirectTracker`] is created for every call, so the redirect
//! history never leaks between requests.

use crate::config::{RedirectAction, RedirectAttempt, RedirectPolicy};
use crate::error::HttpError;
use http::{HeaderMap, Request, Response, Uri, header};
use parking_lot::Mutex;
use std::sync::Arc;
use tower_http::follow_redirect::policy::{Action, Attempt, Policy};

/// Headers removed when a redirect leaves the origin of the first request
const SENSITIVE_HEADERS: &[header::HeaderName] = &[
    header::AUTHORIZATION,
    header::COOKIE,
    header::PROXY_AUTHORIZATION,
];

/// Headers of the latest 3xx response seen during one call.
///
/// tower-http hands the policy only the status and location, so a recorder
/// below the redirect layer fills this slot for the policy to read.
#[derive(Debug, Clone, Default)]
pub struct RedirectHeaders(Arc<Mutex<Option<HeaderMap>>>);

impl RedirectHeaders {
    /// Remember the headers of `response` if it is a redirect
    pub fn record<B>(&self, response: &Response<B>) {
        if response.status().is_redirection() {
            *self.0.lock() = Some(response.headers().clone());
        }
    }

    fn take(&self) -> HeaderMap {
        self.0.lock().take().unwrap_or_default()
    }
}

/// Per-call redirect state driving a [`RedirectPolicy`].
#[derive(Debug, Clone)]
pub struct RedirectTracker {
    policy: RedirectPolicy,
    /// Original request URI followed by every location already followed
    history: Vec<Uri>,
    /// Whether the next hop leaves the original origin
    strip_next: bool,
    headers: RedirectHeaders,
}

impl RedirectTracker {
    #[must_use]
    pub fn new(policy: RedirectPolicy) -> Self {
        Self {
            policy,
            history: Vec::new(),
            strip_next: false,
            headers: RedirectHeaders::default(),
        }
    }

    /// Slot to fill from below the redirect layer with [`RedirectHeaders::record`]
    #[must_use]
    pub fn redirect_headers(&self) -> RedirectHeaders {
        self.headers.clone()
    }
}

/// Same scheme, host and port, with default ports filled in.
///
/// A missing scheme counts as https so a scheme-less URI never matches plain http.
fn is_same_origin(original: &Uri, target: &Uri) -> bool {
    let orig_scheme = original.scheme_str().unwrap_or("https");
    let target_scheme = target.scheme_str().unwrap_or("https");

    let orig_port = original.port_u16().unwrap_or_else(|| default_port(orig_scheme));
    let target_port = target.port_u16().unwrap_or_else(|| default_port(target_scheme));

    let orig_host = original.host().unwrap_or("");
    let target_host = target.host().unwrap_or("");

    orig_scheme.eq_ignore_ascii_case(target_scheme)
        && orig_host.eq_ignore_ascii_case(target_host)
        && orig_port == target_port
}

fn default_port(scheme: &str) -> u16 {
    match scheme {
        "http" => 80,
        "https" => 443,
        _ => 0,
    }
}

impl<B: Clone> Policy<B, HttpError> for RedirectTracker {
    fn redirect(&mut self, attempt: &Attempt<'_>) -> Result<Action, HttpError> {
        let previous = attempt.previous();
        let location = attempt.location();
        if self.history.is_empty() {
            self.history.push(previous.clone());
        }

        let view = RedirectAttempt {
            status: attempt.status(),
            location,
            previous,
            history: &self.history,
        };

        match self.policy.decide(&view) {
            RedirectAction::Follow => {
                self.strip_next = self.policy.strips_sensitive_headers()
                    && !is_same_origin(&self.history[0], location);
                tracing::debug!(
                    status = attempt.status().as_u16(),
                    from = %previous,
                    to = %location,
                    hop = self.history.len(),
                    "following redirect"
                );
                self.history.push(location.clone());
                Ok(Action::Follow)
            }
            RedirectAction::UseLastResponse => {
                tracing::debug!(to = %location, "returning redirect response without following");
                Ok(Action::Stop)
            }
            RedirectAction::Reject(source) => {
                tracing::warn!(
                    status = attempt.status().as_u16(),
                    to = %location,
                    error = %source,
                    "redirect rejected"
                );
                Err(HttpError::Redirect {
                    status: attempt.status(),
                    location: location.to_string(),
                    headers: Box::new(self.headers.take()),
                    source,
                })
            }
        }
    }

    fn on_request(&mut self, request: &mut Request<B>) {
        if !self.strip_next {
            return;
        }
        let headers = request.headers_mut();
        for name in SENSITIVE_HEADERS {
            if headers.remove(name).is_some() {
                tracing::debug!(header = %name, "stripped sensitive header on cross-origin redirect");
            }
        }
    }

    fn clone_body(&self, body: &B) -> Option<B> {
        // 307/308 resend the original body
        Some(body.clone())
    }
}
