use std::sync::Arc;

use reqwest::Method;
use serde::Serialize;
use url::Url;

use crate::auth::service_endpoint;
use crate::error::Error;
use crate::fetch::{ChainFunction, Fetch, FetchRequest, FetchResponse, create_enhanced_fetch};

/// Client for a non-auth service (storage, GraphQL, functions).
///
/// Only knows its base URL and the shared session pipeline; payload formats
/// are up to the caller.
#[derive(Clone)]
pub struct ServiceClient {
    base_url: Url,
    fetch: Arc<dyn Fetch>,
}

impl ServiceClient {
    #[must_use]
    pub fn new(base_url: Url, base: Arc<dyn Fetch>, chain: &[ChainFunction]) -> Self {
        Self {
            base_url,
            fetch: create_enhanced_fetch(chain, base),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// URL of `path` under this service.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if the result is not a valid URL.
    pub fn url(&self, path: &str) -> Result<Url, Error> {
        service_endpoint(&self.base_url, path)
    }

    /// Run `request` through the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fetch`] for a non-success status, [`Error::Http`] on
    /// network failure.
    pub async fn send(&self, request: FetchRequest) -> Result<FetchResponse, Error> {
        self.fetch.fetch(request).await?.ensure_success()
    }

    /// `POST` a JSON body to `path`.
    ///
    /// # Errors
    ///
    /// See [`ServiceClient::send`].
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<FetchResponse, Error> {
        let request = FetchRequest::new(Method::POST, self.url(path)?).with_json(body)?;
        self.send(request).await
    }

    /// `GET` `path`.
    ///
    /// # Errors
    ///
    /// See [`ServiceClient::send`].
    pub async fn get(&self, path: &str) -> Result<FetchResponse, Error> {
        self.send(FetchRequest::get(self.url(path)?)).await
    }
}

impl std::fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}
