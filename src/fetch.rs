//! Request pipeline: the [`Fetch`] executor abstraction, decorator composition
//! and the normalized [`FetchError`].

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use url::Url;

use crate::error::Error;

const FALLBACK_MESSAGE: &str = "An unexpected error occurred";

/// Outgoing request as seen by every pipeline stage.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct FetchRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl FetchRequest {
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    #[must_use]
    pub fn post(url: Url) -> Self {
        Self::new(Method::POST, url)
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Serialize `body` as the JSON request payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if `body` cannot be serialized.
    pub fn with_json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, Error> {
        self.body = Some(serde_json::to_vec(body)?);
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(self)
    }

    /// Whether the caller already supplied credentials.
    #[must_use]
    pub fn has_authorization(&self) -> bool {
        self.headers.contains_key(AUTHORIZATION)
    }
}

/// Response handed back up the pipeline. Non-success statuses are still
/// responses here; they only become errors in [`FetchResponse::ensure_success`].
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct FetchResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl FetchResponse {
    #[must_use]
    pub fn new(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Build a response with a JSON body. Mostly useful for custom transports.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if `body` cannot be serialized.
    pub fn json_body<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(Self::new(status, headers, serde_json::to_vec(body)?))
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.body).map_err(Into::into)
    }

    /// Body as a loosely typed value: JSON if it parses, text otherwise,
    /// `Null` when empty.
    #[must_use]
    pub fn body_value(&self) -> JsonValue {
        if self.body.is_empty() {
            return JsonValue::Null;
        }
        serde_json::from_slice(&self.body).unwrap_or_else(|_| {
            JsonValue::String(String::from_utf8_lossy(&self.body).into_owned())
        })
    }

    /// Returns the response on success or the normalized [`FetchError`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fetch`] for any non-2xx status.
    pub fn ensure_success(self) -> Result<Self, Error> {
        if self.is_success() {
            return Ok(self);
        }
        let body = self.body_value();
        Err(FetchError::new(body, self.status.as_u16(), self.headers).into())
    }
}

/// A request executor: the raw transport or any decorated version of it.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, Error>;
}

/// Decorator: wraps the next executor and returns a new one.
pub type ChainFunction = Arc<dyn Fn(Arc<dyn Fetch>) -> Arc<dyn Fetch> + Send + Sync>;

/// Fold `chain` around `base`, right to left.
///
/// The first chain function becomes the outermost wrapper; an empty chain
/// returns `base` itself.
#[must_use]
pub fn create_enhanced_fetch(chain: &[ChainFunction], base: Arc<dyn Fetch>) -> Arc<dyn Fetch> {
    chain.iter().rev().fold(base, |next, wrap| wrap(next))
}

/// Executor backed by an async closure.
pub struct FnFetch<F>(F);

/// Wrap an async closure as a [`Fetch`] executor.
pub fn fetch_fn<F, Fut>(f: F) -> Arc<dyn Fetch>
where
    F: Fn(FetchRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<FetchResponse, Error>> + Send + 'static,
{
    Arc::new(FnFetch(f))
}

#[async_trait]
impl<F, Fut> Fetch for FnFetch<F>
where
    F: Fn(FetchRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<FetchResponse, Error>> + Send + 'static,
{
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, Error> {
        (self.0)(request).await
    }
}

/// Base transport over `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestFetch {
    http: reqwest::Client,
}

impl ReqwestFetch {
    #[must_use]
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Fetch for ReqwestFetch {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, Error> {
        let mut builder = self
            .http
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();
        Ok(FetchResponse::new(status, headers, body))
    }
}

/// Normalized failure for a non-success response.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
#[non_exhaustive]
pub struct FetchError {
    /// Human-readable message derived from `body`.
    pub message: String,
    /// The response body as received.
    pub body: JsonValue,
    pub status: u16,
    pub headers: HeaderMap,
}

impl FetchError {
    #[must_use]
    pub fn new(body: JsonValue, status: u16, headers: HeaderMap) -> Self {
        Self {
            message: extract_message(&body),
            body,
            status,
            headers,
        }
    }
}

/// Derive a display message from an arbitrary error body.
#[must_use]
pub fn extract_message(body: &JsonValue) -> String {
    match body {
        JsonValue::String(s) if !s.is_empty() => s.clone(),
        JsonValue::Object(obj) => {
            if let Some(JsonValue::String(msg)) = obj.get("message") {
                return msg.clone();
            }
            match obj.get("error") {
                Some(JsonValue::String(err)) => return err.clone(),
                Some(JsonValue::Object(err)) => {
                    if let Some(JsonValue::String(msg)) = err.get("message") {
                        return msg.clone();
                    }
                }
                _ => {}
            }
            if let Some(JsonValue::Array(errors)) = obj.get("errors") {
                let messages: Vec<&str> = errors
                    .iter()
                    .filter_map(|e| e.get("message").and_then(JsonValue::as_str))
                    .collect();
                if !messages.is_empty() {
                    return messages.join(", ");
                }
            }
            FALLBACK_MESSAGE.to_owned()
        }
        _ => FALLBACK_MESSAGE.to_owned(),
    }
}
