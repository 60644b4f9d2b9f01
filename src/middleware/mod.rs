//! Session-aware pipeline stages.
//!
//! Each function returns a [`ChainFunction`](crate::fetch::ChainFunction) to
//! be folded into a request pipeline with
//! [`create_enhanced_fetch`](crate::fetch::create_enhanced_fetch).
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use nhost_session::middleware::{
//!     attach_access_token_middleware, session_refresh_middleware,
//!     update_session_from_response_middleware,
//! };
//!
//! let chain = vec![
//!     session_refresh_middleware(refresher.clone(), auth_url.clone(), 60),
//!     attach_access_token_middleware(storage.clone(), auth_url.clone()),
//!     update_session_from_response_middleware(storage.clone(), auth_url.clone()),
//! ];
//! let fetch = create_enhanced_fetch(&chain, Arc::new(ReqwestFetch::default()));
//! ```

mod attach;
mod refresh;
mod update;

pub use attach::attach_access_token_middleware;
pub use refresh::session_refresh_middleware;
pub use update::update_session_from_response_middleware;

use url::Url;

/// Path of `url` relative to the auth service at `auth_url`, or `None` when
/// the request targets another service.
pub(crate) fn auth_path<'a>(url: &'a Url, auth_url: &Url) -> Option<&'a str> {
    if url.origin() != auth_url.origin() {
        return None;
    }
    let base = auth_url.path().trim_end_matches('/');
    let rest = url.path().strip_prefix(base)?;
    (rest.is_empty() || rest.starts_with('/')).then_some(rest)
}

/// Requests to the refresh-token endpoint carry their own credential and must
/// not re-enter the refresh coordinator.
pub(crate) fn is_token_endpoint(url: &Url, auth_url: &Url) -> bool {
    auth_path(url, auth_url) == Some("/token")
}
