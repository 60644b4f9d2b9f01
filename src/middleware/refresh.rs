use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use super::is_token_endpoint;
use crate::error::Error;
use crate::fetch::{ChainFunction, Fetch, FetchRequest, FetchResponse};
use crate::refresh::SessionRefresher;

/// Refresh the stored session, if due within `margin_seconds`, before the
/// request goes out.
///
/// Best effort: the request is forwarded whatever the refresh outcome, and a
/// later token-attachment stage picks up whatever session is stored by then.
/// Refresh-token requests to the auth service at `auth_url` pass straight
/// through.
#[must_use]
pub fn session_refresh_middleware(
    refresher: SessionRefresher,
    auth_url: Url,
    margin_seconds: u64,
) -> ChainFunction {
    Arc::new(move |next: Arc<dyn Fetch>| -> Arc<dyn Fetch> {
        Arc::new(SessionRefresh {
            refresher: refresher.clone(),
            auth_url: auth_url.clone(),
            margin_seconds,
            next,
        })
    })
}

struct SessionRefresh {
    refresher: SessionRefresher,
    auth_url: Url,
    margin_seconds: u64,
    next: Arc<dyn Fetch>,
}

#[async_trait]
impl Fetch for SessionRefresh {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, Error> {
        // The refresh call itself holds the exclusive lock; re-entering would deadlock.
        if !request.has_authorization() && !is_token_endpoint(&request.url, &self.auth_url) {
            if self.refresher.refresh(self.margin_seconds).await.is_none() {
                tracing::debug!(url = %request.url, "No usable session before request");
            }
        }
        self.next.fetch(request).await
    }
}
