use std::sync::Arc;

use crate::auth::AuthClient;
use crate::config::{ClientOptions, generate_service_url};
use crate::error::Error;
use crate::fetch::{Fetch, ReqwestFetch};
use crate::middleware::{
    attach_access_token_middleware, session_refresh_middleware,
    update_session_from_response_middleware,
};
use crate::refresh::SessionRefresher;
use crate::service::ServiceClient;
use crate::session::Session;
use crate::storage::{SessionStorage, detect_storage};

/// Nhost client: per-service clients sharing one coordinated session.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct NhostClient {
    /// Sign-in, sign-out and token refresh.
    pub auth: AuthClient,
    /// File storage service.
    pub storage: ServiceClient,
    pub graphql: ServiceClient,
    pub functions: ServiceClient,
    session_storage: SessionStorage,
    refresher: SessionRefresher,
}

impl NhostClient {
    /// Stored session, if any. No network, no refresh.
    #[must_use]
    pub fn get_user_session(&self) -> Option<Session> {
        self.session_storage.get()
    }

    /// Refresh the session if it expires within `margin_seconds` (0 forces a
    /// refresh) and return the resulting session.
    ///
    /// Returns `None` when there is no session or the refresh failed twice;
    /// see [`SessionRefresher::refresh`].
    pub async fn refresh_session(&self, margin_seconds: u64) -> Option<Session> {
        self.refresher.refresh(margin_seconds).await
    }

    /// Forget the stored session locally. The refresh token is not revoked;
    /// use [`AuthClient::sign_out`] for that.
    pub fn clear_session(&self) {
        self.session_storage.remove();
    }

    #[must_use]
    pub fn session_storage(&self) -> &SessionStorage {
        &self.session_storage
    }
}

/// Client for interactive use: every request refreshes the session first
/// when it is about to expire.
///
/// # Errors
///
/// Returns [`Error::Config`] if a service URL cannot be built.
pub fn create_client(options: ClientOptions) -> Result<NhostClient, Error> {
    let auto_refresh = options.auto_refresh.unwrap_or(true);
    build(options, auto_refresh)
}

/// Client for server contexts where sessions are managed externally: no
/// refresh before requests, and the storage medium must be given.
///
/// # Errors
///
/// Returns [`Error::Config`] if no storage or session file is configured, or
/// a service URL cannot be built.
pub fn create_server_client(options: ClientOptions) -> Result<NhostClient, Error> {
    if options.storage.is_none() && options.session_file.is_none() {
        return Err(Error::Config(
            "server clients need an explicit session storage".into(),
        ));
    }
    let auto_refresh = options.auto_refresh.unwrap_or(false);
    build(options, auto_refresh)
}

fn build(options: ClientOptions, auto_refresh: bool) -> Result<NhostClient, Error> {
    let subdomain = options.subdomain.as_deref();
    let region = options.region.as_deref();
    let auth_url = generate_service_url("auth", subdomain, region, options.auth_url.as_ref())?;
    let storage_url =
        generate_service_url("storage", subdomain, region, options.storage_url.as_ref())?;
    let graphql_url =
        generate_service_url("graphql", subdomain, region, options.graphql_url.as_ref())?;
    let functions_url =
        generate_service_url("functions", subdomain, region, options.functions_url.as_ref())?;

    let backend = options
        .storage
        .clone()
        .unwrap_or_else(|| detect_storage(options.session_file.as_deref()));
    let session_storage = SessionStorage::new(backend);
    let lock = options.lock.clone().unwrap_or_default();
    let base: Arc<dyn Fetch> = match options.transport.clone() {
        Some(transport) => transport,
        None => Arc::new(ReqwestFetch::new(options.http.clone().unwrap_or_default())),
    };

    let mut chain = vec![
        attach_access_token_middleware(session_storage.clone(), auth_url.clone()),
        update_session_from_response_middleware(session_storage.clone(), auth_url.clone()),
    ];

    // The coordinator refreshes through the plain auth pipeline; only the
    // public auth client gets the refresh stage in front.
    let token_client = AuthClient::new(auth_url.clone(), base.clone(), chain.clone());
    let refresher = SessionRefresher::new(
        Arc::new(token_client.clone()),
        session_storage.clone(),
        lock,
    );

    let auth = if auto_refresh {
        let stage = session_refresh_middleware(
            refresher.clone(),
            auth_url.clone(),
            options.refresh_margin_seconds,
        );
        chain.insert(0, stage.clone());
        token_client.with_leading_chain_function(stage)
    } else {
        token_client
    };

    tracing::debug!(
        auth_url = %auth.base_url(),
        auto_refresh,
        margin = options.refresh_margin_seconds,
        "Nhost client created"
    );

    Ok(NhostClient {
        auth,
        storage: ServiceClient::new(storage_url, base.clone(), &chain),
        graphql: ServiceClient::new(graphql_url, base.clone(), &chain),
        functions: ServiceClient::new(functions_url, base, &chain),
        session_storage,
        refresher,
    })
}
