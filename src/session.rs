use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use time::OffsetDateTime;

const HASURA_CLAIMS: &str = "https://hasura.io/jwt/claims";

/// Authentication session as issued by the auth service.
///
/// Replaced wholesale on every refresh; never partially updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct Session {
    pub access_token: String,
    /// Access token lifetime in seconds, as reported by the server.
    #[serde(default)]
    pub access_token_expires_in: i64,
    pub refresh_token: String,
    #[serde(default)]
    pub refresh_token_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<JsonValue>,
}

impl Session {
    #[must_use]
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            access_token_expires_in: 0,
            refresh_token: refresh_token.into(),
            refresh_token_id: String::new(),
            user: None,
        }
    }

    #[must_use]
    pub fn with_refresh_token_id(mut self, id: impl Into<String>) -> Self {
        self.refresh_token_id = id.into();
        self
    }

    #[must_use]
    pub fn with_access_token_expires_in(mut self, seconds: i64) -> Self {
        self.access_token_expires_in = seconds;
        self
    }

    #[must_use]
    pub fn with_user(mut self, user: JsonValue) -> Self {
        self.user = Some(user);
        self
    }

    /// Claims of the access token, or `None` if it is not a decodable JWT.
    #[must_use]
    pub fn decoded_token(&self) -> Option<DecodedToken> {
        decode_access_token(&self.access_token)
    }

    /// Access token expiry in epoch milliseconds.
    #[must_use]
    pub fn expires_at_ms(&self) -> Option<i64> {
        self.decoded_token().and_then(|t| t.exp)
    }

    /// A session is usable as a bearer credential only with both tokens set.
    pub(crate) fn is_complete(&self) -> bool {
        !self.access_token.is_empty() && !self.refresh_token.is_empty()
    }
}

/// Decoded view of an access token payload.
///
/// `exp` and `iat` are converted from JWT seconds to epoch milliseconds.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct DecodedToken {
    pub exp: Option<i64>,
    pub iat: Option<i64>,
    pub iss: Option<String>,
    pub sub: Option<String>,
    pub hasura_claims: Option<Map<String, JsonValue>>,
}

impl DecodedToken {
    /// Hasura user id claim, if present.
    #[must_use]
    pub fn hasura_user_id(&self) -> Option<&str> {
        self.hasura_claims
            .as_ref()?
            .get("x-hasura-user-id")?
            .as_str()
    }
}

/// Decode the payload segment of a JWT without verifying its signature.
///
/// The client only needs the expiry to schedule refreshes; the server remains
/// the authority on validity.
#[must_use]
pub fn decode_access_token(token: &str) -> Option<DecodedToken> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: Map<String, JsonValue> = serde_json::from_slice(&bytes).ok()?;

    let seconds_to_ms = |key: &str| {
        claims
            .get(key)
            .and_then(JsonValue::as_f64)
            .map(|secs| (secs * 1000.0) as i64)
    };
    let string_claim = |key: &str| {
        claims
            .get(key)
            .and_then(JsonValue::as_str)
            .map(str::to_owned)
    };

    Some(DecodedToken {
        exp: seconds_to_ms("exp"),
        iat: seconds_to_ms("iat"),
        iss: string_claim("iss"),
        sub: string_claim("sub"),
        hasura_claims: claims
            .get(HASURA_CLAIMS)
            .and_then(JsonValue::as_object)
            .cloned(),
    })
}

/// Current wall-clock time in epoch milliseconds.
#[must_use]
pub fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
