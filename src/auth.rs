use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use url::Url;

use crate::error::Error;
use crate::fetch::{ChainFunction, Fetch, FetchRequest, FetchResponse, create_enhanced_fetch};
use crate::refresh::TokenRefresher;
use crate::session::Session;

/// Auth service client, limited to the session lifecycle calls.
///
/// Requests go through the client's own pipeline, so sign-in, refresh and
/// sign-out responses reach the session middlewares like any other call.
#[derive(Clone)]
pub struct AuthClient {
    base_url: Url,
    base: Arc<dyn Fetch>,
    chain: Vec<ChainFunction>,
    fetch: Arc<dyn Fetch>,
}

/// Response of a sign-in call. `session` is `None` when a second factor is
/// required; `mfa` then carries the challenge.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct SignInResponse {
    #[serde(default)]
    pub session: Option<Session>,
    #[serde(default)]
    pub mfa: Option<JsonValue>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshTokenRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Serialize)]
struct EmailPasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignOutRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<&'a str>,
    all: bool,
}

impl AuthClient {
    /// Create an auth client over `base`, decorated by `chain`.
    #[must_use]
    pub fn new(base_url: Url, base: Arc<dyn Fetch>, chain: Vec<ChainFunction>) -> Self {
        let fetch = create_enhanced_fetch(&chain, base.clone());
        Self {
            base_url,
            base,
            chain,
            fetch,
        }
    }

    /// Copy of this client with `chain_function` as the new outermost stage.
    ///
    /// Used once at construction to put the refresh stage in front of a
    /// client whose plain form the refresh coordinator itself uses.
    #[must_use]
    pub fn with_leading_chain_function(&self, chain_function: ChainFunction) -> Self {
        let mut chain = Vec::with_capacity(self.chain.len() + 1);
        chain.push(chain_function);
        chain.extend(self.chain.iter().cloned());
        Self::new(self.base_url.clone(), self.base.clone(), chain)
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Exchange a refresh token for a new session (`POST /token`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fetch`] if the auth service rejects the token,
    /// [`Error::Http`] on network failure, or [`Error::Json`] if the response
    /// is not a session.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<Session, Error> {
        let response = self
            .post_json("/token", &RefreshTokenRequest { refresh_token })
            .await?;
        response.json::<Session>()
    }

    /// Sign in with email and password (`POST /signin/email-password`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fetch`] on rejected credentials, [`Error::Http`] on
    /// network failure.
    pub async fn sign_in_email_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SignInResponse, Error> {
        let response = self
            .post_json("/signin/email-password", &EmailPasswordRequest { email, password })
            .await?;
        response.json::<SignInResponse>()
    }

    /// Revoke `refresh_token`, or every session of the user when `all` is set
    /// (`POST /signout`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fetch`] if the auth service rejects the call,
    /// [`Error::Http`] on network failure.
    pub async fn sign_out(&self, refresh_token: Option<&str>, all: bool) -> Result<(), Error> {
        self.post_json("/signout", &SignOutRequest { refresh_token, all })
            .await?;
        Ok(())
    }

    async fn post_json<T: Serialize>(&self, path: &str, body: &T) -> Result<FetchResponse, Error> {
        let request = FetchRequest::post(service_endpoint(&self.base_url, path)?).with_json(body)?;
        self.fetch.fetch(request).await?.ensure_success()
    }
}

#[async_trait]
impl TokenRefresher for AuthClient {
    async fn refresh_token(&self, refresh_token: &str) -> Result<Session, Error> {
        AuthClient::refresh_token(self, refresh_token).await
    }
}

impl std::fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthClient")
            .field("base_url", &self.base_url.as_str())
            .field("chain_len", &self.chain.len())
            .finish_non_exhaustive()
    }
}

/// Join `path` onto a service base URL such as `https://x.auth.eu.nhost.run/v1`.
pub(crate) fn service_endpoint(base_url: &Url, path: &str) -> Result<Url, Error> {
    let base = base_url.as_str().trim_end_matches('/');
    let path = path.trim_start_matches('/');
    Ok(format!("{base}/{path}").parse()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::fetch_fn;
    use crate::testing::RecordingTransport;
    use parking_lot::Mutex;
    use reqwest::StatusCode;
    use serde_json::json;

    fn base_url() -> Url {
        "https://local.auth.local.nhost.run/v1".parse().unwrap()
    }

    #[test]
    fn endpoint_keeps_version_prefix() {
        assert_eq!(
            service_endpoint(&base_url(), "/token").unwrap().as_str(),
            "https://local.auth.local.nhost.run/v1/token"
        );
        let trailing: Url = "https://example.com/v1/".parse().unwrap();
        assert_eq!(
            service_endpoint(&trailing, "signout").unwrap().as_str(),
            "https://example.com/v1/signout"
        );
    }

    #[tokio::test]
    async fn refresh_token_posts_refresh_token() {
        let transport = RecordingTransport::json(
            StatusCode::OK,
            json!({"accessToken": "a2", "refreshToken": "r2", "refreshTokenId": "id2"}),
        );
        let client = AuthClient::new(base_url(), transport.clone(), Vec::new());

        let session = client.refresh_token("r1").await.unwrap();

        assert_eq!(session.access_token, "a2");
        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url.path(), "/v1/token");
        let body: JsonValue = serde_json::from_slice(requests[0].body.as_ref().unwrap()).unwrap();
        assert_eq!(body, json!({"refreshToken": "r1"}));
    }

    #[tokio::test]
    async fn refresh_token_rejection_is_normalized() {
        let transport = RecordingTransport::json(
            StatusCode::UNAUTHORIZED,
            json!({"status": 401, "message": "Invalid or expired refresh token", "error": "invalid-refresh-token"}),
        );
        let client = AuthClient::new(base_url(), transport, Vec::new());

        let err = client.refresh_token("r1").await.unwrap_err();

        assert_eq!(err.status(), Some(401));
        assert_eq!(err.to_string(), "Invalid or expired refresh token");
    }

    #[tokio::test]
    async fn sign_in_without_session_reports_mfa() {
        let transport = RecordingTransport::json(
            StatusCode::OK,
            json!({"session": null, "mfa": {"ticket": "mfaTotp:abc"}}),
        );
        let client = AuthClient::new(base_url(), transport, Vec::new());

        let response = client.sign_in_email_password("a@example.com", "pw").await.unwrap();

        assert!(response.session.is_none());
        assert_eq!(response.mfa.unwrap()["ticket"], "mfaTotp:abc");
    }

    #[tokio::test]
    async fn sign_out_body() {
        let transport = RecordingTransport::json(StatusCode::OK, json!("OK"));
        let client = AuthClient::new(base_url(), transport.clone(), Vec::new());

        client.sign_out(Some("r1"), false).await.unwrap();

        let body: JsonValue =
            serde_json::from_slice(transport.requests()[0].body.as_ref().unwrap()).unwrap();
        assert_eq!(body, json!({"refreshToken": "r1", "all": false}));
    }

    #[tokio::test]
    async fn leading_chain_function_runs_first() {
        let log = Arc::new(Mutex::new(Vec::<&'static str>::new()));
        let stage = |name: &'static str, log: Arc<Mutex<Vec<&'static str>>>| -> ChainFunction {
            Arc::new(move |next: Arc<dyn Fetch>| {
                let log = log.clone();
                fetch_fn(move |request| {
                    let next = next.clone();
                    let log = log.clone();
                    async move {
                        log.lock().push(name);
                        next.fetch(request).await
                    }
                })
            })
        };
        let transport = RecordingTransport::json(StatusCode::OK, json!("OK"));
        let plain = AuthClient::new(base_url(), transport, vec![stage("inner", log.clone())]);
        let client = plain.with_leading_chain_function(stage("outer", log.clone()));

        client.sign_out(None, true).await.unwrap();
        assert_eq!(*log.lock(), vec!["outer", "inner"]);

        log.lock().clear();
        plain.sign_out(None, true).await.unwrap();
        assert_eq!(*log.lock(), vec!["inner"]);
    }
}
