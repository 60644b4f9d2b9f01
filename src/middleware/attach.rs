use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use url::Url;

use super::is_token_endpoint;
use crate::error::Error;
use crate::fetch::{ChainFunction, Fetch, FetchRequest, FetchResponse};
use crate::storage::SessionStorage;

/// Set `Authorization: Bearer <access token>` from the stored session.
///
/// Reads the store only; never refreshes. Requests that already carry an
/// `Authorization` header, and refresh-token requests to the auth service at
/// `auth_url`, are left untouched.
#[must_use]
pub fn attach_access_token_middleware(storage: SessionStorage, auth_url: Url) -> ChainFunction {
    Arc::new(move |next: Arc<dyn Fetch>| -> Arc<dyn Fetch> {
        Arc::new(AttachAccessToken {
            storage: storage.clone(),
            auth_url: auth_url.clone(),
            next,
        })
    })
}

struct AttachAccessToken {
    storage: SessionStorage,
    auth_url: Url,
    next: Arc<dyn Fetch>,
}

#[async_trait]
impl Fetch for AttachAccessToken {
    async fn fetch(&self, mut request: FetchRequest) -> Result<FetchResponse, Error> {
        if !request.has_authorization() && !is_token_endpoint(&request.url, &self.auth_url) {
            if let Some(session) = self.storage.get() {
                match HeaderValue::from_str(&format!("Bearer {}", session.access_token)) {
                    Ok(mut value) => {
                        value.set_sensitive(true);
                        request.headers.insert(AUTHORIZATION, value);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Stored access token is not a valid header value");
                    }
                }
            }
        }
        self.next.fetch(request).await
    }
}
