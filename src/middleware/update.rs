use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use url::Url;

use super::auth_path;
use crate::error::Error;
use crate::fetch::{ChainFunction, Fetch, FetchRequest, FetchResponse};
use crate::session::Session;
use crate::storage::SessionStorage;

/// Keep the store in sync with responses of the auth service at `auth_url`.
///
/// - any response to `…/signout` clears the stored session;
/// - a successful response to `…/token`, `…/signin/…` or `…/signup/…` whose
///   body carries a session (either under `session` or as the body itself)
///   replaces the stored session.
///
/// Requests to other services never touch the store, whatever their path.
#[must_use]
pub fn update_session_from_response_middleware(
    storage: SessionStorage,
    auth_url: Url,
) -> ChainFunction {
    Arc::new(move |next: Arc<dyn Fetch>| -> Arc<dyn Fetch> {
        Arc::new(UpdateSessionFromResponse {
            storage: storage.clone(),
            auth_url: auth_url.clone(),
            next,
        })
    })
}

struct UpdateSessionFromResponse {
    storage: SessionStorage,
    auth_url: Url,
    next: Arc<dyn Fetch>,
}

#[async_trait]
impl Fetch for UpdateSessionFromResponse {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, Error> {
        let path = auth_path(&request.url, &self.auth_url).map(str::to_owned);
        let response = self.next.fetch(request).await?;
        let Some(path) = path else {
            return Ok(response);
        };

        if path == "/signout" {
            tracing::debug!("Sign-out response, clearing session");
            self.storage.remove();
        } else if response.is_success() && carries_session(&path) {
            if let Some(session) = extract_session(&response.body_value()) {
                tracing::debug!(path = %path, "Storing session from response");
                self.storage.set(&session);
            }
        }

        Ok(response)
    }
}

/// `path` is relative to the auth service base.
fn carries_session(path: &str) -> bool {
    path == "/token" || path.starts_with("/signin/") || path.starts_with("/signup/")
}

/// Session embedded in an auth response body, if any.
///
/// `{"session": null, ...}` (e.g. an MFA challenge) yields `None`.
fn extract_session(body: &JsonValue) -> Option<Session> {
    let candidate = match body.get("session") {
        Some(session) => session,
        None => body,
    };
    if !candidate.is_object() {
        return None;
    }
    serde_json::from_value::<Session>(candidate.clone())
        .ok()
        .filter(Session::is_complete)
}
