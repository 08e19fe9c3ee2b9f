//! Tower layers composed into the per-call client stack
//!
//! From the outside in:
//!
//! - [`RequestHeadersLayer`] - stamps `User-Agent` and `Authorization`
//! - `FollowRedirectLayer` driven by [`RedirectTracker`] - applies the
//!   configured [`RedirectPolicy`](crate::RedirectPolicy)
//! - a [`RedirectHeaders`] recorder keeping the latest 3xx headers for
//!   rejected redirects
//! - [`CookieLayer`] - reads and writes the configured cookie store per hop
//! - the [`Transport`](crate::Transport)

mod cookie;
mod headers;
mod redirect;

pub use cookie::{CookieLayer, CookieService};
pub use headers::{RequestHeadersLayer, RequestHeadersService};
pub use redirect::{RedirectHeaders, RedirectTracker};
