//! Coordinated session refresh.
//!
//! Readers check the stored session under a shared lock; only when a refresh
//! is due does a caller take the exclusive lock, re-check, and hit the
//! network. Callers queued behind a refresh find the new session on their
//! re-check and return without a second network call.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Error;
use crate::lock::{LockMode, SessionLock};
use crate::session::{Session, now_ms};
use crate::storage::SessionStorage;

/// Default refresh margin in seconds.
pub const DEFAULT_MARGIN_SECONDS: u64 = 60;

/// The refresh-token operation of the auth service.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Exchange `refresh_token` for a new session.
    async fn refresh_token(&self, refresh_token: &str) -> Result<Session, Error>;
}

/// Whether the stored session can be used as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshOutcome {
    pub session: Option<Session>,
    pub needs_refresh: bool,
    /// The access token is past its expiry, or has none we can read.
    pub session_expired: bool,
}

impl RefreshOutcome {
    /// Evaluate `session` against `margin_seconds` at `now` (epoch ms).
    ///
    /// A margin of 0 always asks for a refresh.
    #[must_use]
    pub fn evaluate(session: Option<Session>, margin_seconds: u64, now: i64) -> Self {
        let Some(session) = session else {
            return Self {
                session: None,
                needs_refresh: false,
                session_expired: false,
            };
        };

        let Some(exp) = session.expires_at_ms() else {
            return Self {
                session: Some(session),
                needs_refresh: true,
                session_expired: true,
            };
        };

        if margin_seconds == 0 {
            return Self {
                session: Some(session),
                needs_refresh: true,
                session_expired: false,
            };
        }

        let margin_ms = i64::try_from(margin_seconds.saturating_mul(1000)).unwrap_or(i64::MAX);
        if exp > now.saturating_add(margin_ms) {
            return Self {
                session: Some(session),
                needs_refresh: false,
                session_expired: false,
            };
        }

        Self {
            session: Some(session),
            needs_refresh: true,
            session_expired: exp < now,
        }
    }

    fn from_storage(storage: &SessionStorage, margin_seconds: u64) -> Self {
        Self::evaluate(storage.get(), margin_seconds, now_ms())
    }
}

/// Result of one coordinated attempt that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshStep {
    NoSession,
    /// Stored session is fresh enough; nothing was sent.
    Current(Session),
    /// A new session was fetched and stored.
    Refreshed(Session),
    /// The refresh call failed but the old session has not expired yet.
    Stale(Session),
}

impl RefreshStep {
    #[must_use]
    pub fn into_session(self) -> Option<Session> {
        match self {
            Self::NoSession => None,
            Self::Current(s) | Self::Refreshed(s) | Self::Stale(s) => Some(s),
        }
    }
}

/// Keeps the stored session fresh, with at most one refresh call in flight
/// per lock.
#[derive(Clone)]
pub struct SessionRefresher {
    auth: Arc<dyn TokenRefresher>,
    storage: SessionStorage,
    lock: SessionLock,
}

impl SessionRefresher {
    #[must_use]
    pub fn new(auth: Arc<dyn TokenRefresher>, storage: SessionStorage, lock: SessionLock) -> Self {
        Self {
            auth,
            storage,
            lock,
        }
    }

    #[must_use]
    pub fn storage(&self) -> &SessionStorage {
        &self.storage
    }

    /// Refresh the stored session if it expires within `margin_seconds`.
    ///
    /// Never fails: a failed attempt is retried once, after which `None` is
    /// returned. A second failure with status 401 also clears the store.
    pub async fn refresh(&self, margin_seconds: u64) -> Option<Session> {
        let err = match self.attempt(margin_seconds).await {
            Ok(step) => return step.into_session(),
            Err(err) => err,
        };
        tracing::warn!(error = %err, "Error refreshing session, retrying");

        match self.attempt(margin_seconds).await {
            Ok(step) => step.into_session(),
            Err(err) => {
                if err.status() == Some(401) {
                    tracing::error!(error = %err, "Session probably expired, clearing it");
                    self.storage.remove();
                } else {
                    tracing::warn!(error = %err, "Session refresh failed, keeping stored session");
                }
                None
            }
        }
    }

    /// One coordinated attempt. Errors only when the refresh call failed for
    /// a session that is already expired.
    pub async fn attempt(&self, margin_seconds: u64) -> Result<RefreshStep, Error> {
        let outcome = self
            .lock
            .request(LockMode::Shared, || async {
                RefreshOutcome::from_storage(&self.storage, margin_seconds)
            })
            .await;

        let Some(session) = outcome.session else {
            return Ok(RefreshStep::NoSession);
        };
        if !outcome.needs_refresh {
            return Ok(RefreshStep::Current(session));
        }

        self.lock
            .request(LockMode::Exclusive, || self.refresh_exclusive(margin_seconds))
            .await
    }

    async fn refresh_exclusive(&self, margin_seconds: u64) -> Result<RefreshStep, Error> {
        // Someone else may have refreshed while we waited for the lock.
        let outcome = RefreshOutcome::from_storage(&self.storage, margin_seconds);
        let Some(session) = outcome.session else {
            return Ok(RefreshStep::NoSession);
        };
        if !outcome.needs_refresh {
            tracing::debug!("Session already refreshed by another caller");
            return Ok(RefreshStep::Current(session));
        }

        match self.auth.refresh_token(&session.refresh_token).await {
            Ok(refreshed) => {
                self.storage.set(&refreshed);
                tracing::debug!("Session refreshed");
                Ok(RefreshStep::Refreshed(refreshed))
            }
            // TODO: this also hides malformed refresh responses, not just
            // network trouble; split once the error kinds are distinguishable.
            Err(err) if !outcome.session_expired => {
                tracing::debug!(error = %err, "Refresh failed, session still valid");
                Ok(RefreshStep::Stale(session))
            }
            Err(err) => Err(err),
        }
    }
}

impl std::fmt::Debug for SessionRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRefresher")
            .field("lock", &self.lock)
            .finish_non_exhaustive()
    }
}
