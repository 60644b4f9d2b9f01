//! Test doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use parking_lot::Mutex;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde_json::{Value as JsonValue, json};

use crate::error::Error;
use crate::fetch::{Fetch, FetchError, FetchRequest, FetchResponse};
use crate::refresh::TokenRefresher;
use crate::session::{Session, now_ms};

pub(crate) const HOUR_MS: i64 = 3_600_000;

/// Unsigned JWT carrying `claims`.
pub(crate) fn jwt(claims: &JsonValue) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap());
    format!("{header}.{payload}.signature")
}

/// Session whose access token expires `offset_ms` from now (negative = already expired).
pub(crate) fn session_expiring_in(offset_ms: i64, tag: &str) -> Session {
    let exp = (now_ms() + offset_ms) / 1000;
    Session::new(jwt(&json!({"exp": exp, "sub": tag})), format!("refresh-{tag}"))
        .with_refresh_token_id(format!("id-{tag}"))
}

pub(crate) fn fetch_error(status: u16) -> Error {
    FetchError::new(json!({"error": "refresh failed"}), status, HeaderMap::new()).into()
}

/// Refresh endpoint double: replays queued results, then succeeds with a
/// session valid for an hour.
pub(crate) struct MockRefresher {
    calls: AtomicUsize,
    seen_tokens: Mutex<Vec<String>>,
    responses: Mutex<VecDeque<Result<Session, Error>>>,
    delay: Duration,
}

impl MockRefresher {
    pub(crate) fn new() -> Arc<Self> {
        Self::build(Vec::new(), Duration::ZERO)
    }

    pub(crate) fn with_responses(responses: Vec<Result<Session, Error>>) -> Arc<Self> {
        Self::build(responses, Duration::ZERO)
    }

    pub(crate) fn slow(delay: Duration) -> Arc<Self> {
        Self::build(Vec::new(), delay)
    }

    fn build(responses: Vec<Result<Session, Error>>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            seen_tokens: Mutex::new(Vec::new()),
            responses: Mutex::new(responses.into()),
            delay,
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn seen_tokens(&self) -> Vec<String> {
        self.seen_tokens.lock().clone()
    }
}

#[async_trait]
impl TokenRefresher for MockRefresher {
    async fn refresh_token(&self, refresh_token: &str) -> Result<Session, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_tokens.lock().push(refresh_token.to_owned());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.responses.lock().pop_front();
        next.unwrap_or_else(|| Ok(session_expiring_in(HOUR_MS, "refreshed")))
    }
}

/// Transport double: records requests and answers with a canned response.
pub(crate) struct RecordingTransport {
    requests: Mutex<Vec<FetchRequest>>,
    respond: Box<dyn Fn(&FetchRequest) -> FetchResponse + Send + Sync>,
}

impl RecordingTransport {
    pub(crate) fn ok() -> Arc<Self> {
        Self::responding(|_| FetchResponse::new(StatusCode::OK, HeaderMap::new(), Vec::new()))
    }

    pub(crate) fn json(status: StatusCode, body: JsonValue) -> Arc<Self> {
        Self::responding(move |_| FetchResponse::json_body(status, &body).unwrap())
    }

    pub(crate) fn responding(
        respond: impl Fn(&FetchRequest) -> FetchResponse + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            respond: Box::new(respond),
        })
    }

    pub(crate) fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().clone()
    }

    pub(crate) fn last_authorization(&self) -> Option<String> {
        self.requests
            .lock()
            .last()?
            .headers
            .get(reqwest::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    }
}

#[async_trait]
impl Fetch for RecordingTransport {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, Error> {
        let response = (self.respond)(&request);
        self.requests.lock().push(request);
        Ok(response)
    }
}
