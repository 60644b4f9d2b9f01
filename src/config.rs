use std::path::PathBuf;
use std::sync::Arc;

use url::Url;

use crate::error::Error;
use crate::fetch::Fetch;
use crate::lock::SessionLock;
use crate::refresh::DEFAULT_MARGIN_SECONDS;
use crate::storage::SessionStorageBackend;

/// Nhost client configuration.
///
/// Everything is optional: with no subdomain/region the client targets the
/// local development stack. Use [`from_env()`](ClientOptions::from_env) for
/// convention-based setup, or [`new()`](ClientOptions::new) with `with_*`
/// methods for full control.
///
/// ```rust,ignore
/// let options = ClientOptions::new()
///     .with_subdomain("myproject")
///     .with_region("eu-central-1")
///     .with_refresh_margin_seconds(120);
/// let nhost = create_client(options)?;
/// ```
#[derive(Clone)]
#[non_exhaustive]
pub struct ClientOptions {
    pub(crate) subdomain: Option<String>,
    pub(crate) region: Option<String>,
    pub(crate) auth_url: Option<Url>,
    pub(crate) storage_url: Option<Url>,
    pub(crate) graphql_url: Option<Url>,
    pub(crate) functions_url: Option<Url>,
    pub(crate) refresh_margin_seconds: u64,
    pub(crate) storage: Option<Arc<dyn SessionStorageBackend>>,
    pub(crate) session_file: Option<PathBuf>,
    pub(crate) auto_refresh: Option<bool>,
    pub(crate) lock: Option<SessionLock>,
    pub(crate) http: Option<reqwest::Client>,
    pub(crate) transport: Option<Arc<dyn Fetch>>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            subdomain: None,
            region: None,
            auth_url: None,
            storage_url: None,
            graphql_url: None,
            functions_url: None,
            refresh_margin_seconds: DEFAULT_MARGIN_SECONDS,
            storage: None,
            session_file: None,
            auto_refresh: None,
            lock: None,
            http: None,
            transport: None,
        }
    }
}

impl ClientOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create options from environment variables.
    ///
    /// # Env vars (all optional)
    /// - `NHOST_SUBDOMAIN`, `NHOST_REGION`: project location
    /// - `NHOST_AUTH_URL`, `NHOST_STORAGE_URL`, `NHOST_GRAPHQL_URL`,
    ///   `NHOST_FUNCTIONS_URL`: per-service URL overrides
    /// - `NHOST_REFRESH_MARGIN`: refresh margin in seconds
    /// - `NHOST_SESSION_FILE`: persist the session to this JSON file
    /// - `NHOST_AUTO_REFRESH`: `1`/`true` or `0`/`false`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a URL or number is invalid.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let url = |key: &str| -> Result<Option<Url>, Error> {
            lookup(key)
                .map(|s| s.parse().map_err(|e| Error::Config(format!("{key}: {e}"))))
                .transpose()
        };

        let mut options = Self::new();
        options.subdomain = lookup("NHOST_SUBDOMAIN");
        options.region = lookup("NHOST_REGION");
        options.auth_url = url("NHOST_AUTH_URL")?;
        options.storage_url = url("NHOST_STORAGE_URL")?;
        options.graphql_url = url("NHOST_GRAPHQL_URL")?;
        options.functions_url = url("NHOST_FUNCTIONS_URL")?;
        options.session_file = lookup("NHOST_SESSION_FILE").map(PathBuf::from);

        if let Some(margin) = lookup("NHOST_REFRESH_MARGIN") {
            options.refresh_margin_seconds = margin
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("NHOST_REFRESH_MARGIN: {e}")))?;
        }

        options.auto_refresh = match lookup("NHOST_AUTO_REFRESH").as_deref() {
            None => None,
            Some("1") | Some("true") => Some(true),
            Some("0") | Some("false") => Some(false),
            Some(other) => {
                return Err(Error::Config(format!(
                    "NHOST_AUTO_REFRESH: expected true/false, got '{other}'"
                )));
            }
        };

        Ok(options)
    }

    #[must_use]
    pub fn with_subdomain(mut self, subdomain: impl Into<String>) -> Self {
        self.subdomain = Some(subdomain.into());
        self
    }

    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    #[must_use]
    pub fn with_auth_url(mut self, url: Url) -> Self {
        self.auth_url = Some(url);
        self
    }

    #[must_use]
    pub fn with_storage_url(mut self, url: Url) -> Self {
        self.storage_url = Some(url);
        self
    }

    #[must_use]
    pub fn with_graphql_url(mut self, url: Url) -> Self {
        self.graphql_url = Some(url);
        self
    }

    #[must_use]
    pub fn with_functions_url(mut self, url: Url) -> Self {
        self.functions_url = Some(url);
        self
    }

    /// Seconds before expiry at which the session is refreshed (default: 60).
    #[must_use]
    pub fn with_refresh_margin_seconds(mut self, seconds: u64) -> Self {
        self.refresh_margin_seconds = seconds;
        self
    }

    /// Use a custom storage medium. Takes precedence over a session file.
    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn SessionStorageBackend>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Persist the session to a JSON file.
    #[must_use]
    pub fn with_session_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_file = Some(path.into());
        self
    }

    /// Override the refresh-before-request behaviour chosen by the constructor.
    #[must_use]
    pub fn with_auto_refresh(mut self, enabled: bool) -> Self {
        self.auto_refresh = Some(enabled);
        self
    }

    /// Session lock to coordinate refreshes with (default: process-wide lock).
    #[must_use]
    pub fn with_lock(mut self, lock: SessionLock) -> Self {
        self.lock = Some(lock);
        self
    }

    /// Use a custom HTTP client (for connection pool reuse or proxies).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = Some(client);
        self
    }

    /// Replace the base transport entirely. Takes precedence over
    /// [`with_http_client`](Self::with_http_client).
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Fetch>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn refresh_margin_seconds(&self) -> u64 {
        self.refresh_margin_seconds
    }
}

impl std::fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientOptions")
            .field("subdomain", &self.subdomain)
            .field("region", &self.region)
            .field("auth_url", &self.auth_url)
            .field("storage_url", &self.storage_url)
            .field("graphql_url", &self.graphql_url)
            .field("functions_url", &self.functions_url)
            .field("refresh_margin_seconds", &self.refresh_margin_seconds)
            .field("session_file", &self.session_file)
            .field("auto_refresh", &self.auto_refresh)
            .finish_non_exhaustive()
    }
}

/// Base URL of `service` (`auth`, `storage`, `graphql`, `functions`).
///
/// An explicit URL wins; subdomain plus region gives the hosted URL; anything
/// else targets the local development stack.
///
/// # Errors
///
/// Returns [`Error::Config`] if subdomain or region produce an invalid URL.
pub fn generate_service_url(
    service: &str,
    subdomain: Option<&str>,
    region: Option<&str>,
    custom_url: Option<&Url>,
) -> Result<Url, Error> {
    if let Some(url) = custom_url {
        return Ok(url.clone());
    }
    let url = match (subdomain, region) {
        (Some(subdomain), Some(region)) => {
            format!("https://{subdomain}.{service}.{region}.nhost.run/v1")
        }
        _ => format!("https://local.{service}.local.nhost.run/v1"),
    };
    url.parse()
        .map_err(|e| Error::Config(format!("{service} URL '{url}': {e}")))
}
