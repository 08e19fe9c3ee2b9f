#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Configuration-driven HTTP client
//!
//! A [`Client`] sends requests through a pluggable [`Transport`] and shapes
//! each one from a caller-owned [`ClientConfig`]:
//! - `User-Agent` on every request (`Zei/0.1` unless configured)
//! - Basic or Bearer `Authorization` through [`Auth`]
//! - Redirect handling via [`RedirectPolicy`]
//! - Cookies through any [`CookieStore`], with [`Jar`] as the in-memory store
//! - One overall timeout covering connect, redirects and the body read
//!
//! The configuration lives behind a [`SharedConfig`] handle. Callers may
//! change it between calls; each call works from its own snapshot.
//!
//! # Basic authentication
//!
//! Basic credentials are sent as the literal `username:password`, without
//! base64 encoding or a `Basic ` prefix. See the [`auth`] module.
//!
//! # Example
//!
//! ```ignore
//! use zei::{Client, ClientConfig, SharedConfig};
//! use std::time::Duration;
//!
//! let config = SharedConfig::new(
//!     ClientConfig::default()
//!         .with_user_agent("Fetcher/1.0")
//!         .with_timeout(Duration::from_secs(10)),
//! );
//! let client = Client::new(config.clone())?;
//!
//! config.update(|c| c.set_bearer_auth("tok123"));
//! let resp = client.post_form("https://example.com/login", &[("remember", "true")]).await?;
//! println!("{}", resp.text().await?);
//! ```

pub mod auth;
mod client;
mod config;
pub mod cookie;
mod error;
pub mod layers;
mod request;
mod response;
mod secret;
mod tls;
mod transport;

pub use auth::Auth;
pub use client::{Client, HttpRequester};
pub use config::{
    ClientConfig, DEFAULT_MAX_BODY_SIZE, DEFAULT_MAX_REDIRECTS, DEFAULT_USER_AGENT,
    RedirectAction, RedirectAttempt, RedirectLimitExceeded, RedirectPolicy, SharedConfig,
    TlsRootConfig, TransportConfig, TransportSecurity,
};
pub use cookie::{Cookie, CookieStore, Jar};
pub use error::{BoxError, HttpError, InvalidUriKind};
pub use request::{FORM_CONTENT_TYPE, RequestBuilder, parse_url};
pub use response::{
    ERROR_BODY_PREVIEW_LIMIT, HttpResponse, LimitedBody, ResponseBody, empty_body,
    parse_retry_after,
};
pub use secret::SecretString;
pub use tls::TlsSetupError;
pub use transport::Transport;
