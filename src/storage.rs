use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::Error;
use crate::session::Session;

/// Storage medium for the persisted session.
///
/// Implementations must be cheap to call synchronously and hold no cache of
/// their own beyond what they store.
///
/// # Example
///
/// ```rust,ignore
/// struct KeychainStorage { entry: keyring::Entry }
///
/// impl SessionStorageBackend for KeychainStorage {
///     fn get(&self) -> Result<Option<Session>, Error> { ... }
///     fn set(&self, session: &Session) -> Result<(), Error> { ... }
///     fn remove(&self) -> Result<(), Error> { ... }
/// }
/// ```
pub trait SessionStorageBackend: Send + Sync + 'static {
    /// Read the stored session, if any.
    fn get(&self) -> Result<Option<Session>, Error>;

    /// Replace the stored session.
    fn set(&self, session: &Session) -> Result<(), Error>;

    /// Delete the stored session.
    fn remove(&self) -> Result<(), Error>;
}

/// In-process storage. The default when nothing else is configured.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    session: Mutex<Option<Session>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorageBackend for MemoryStorage {
    fn get(&self) -> Result<Option<Session>, Error> {
        Ok(self.session.lock().clone())
    }

    fn set(&self, session: &Session) -> Result<(), Error> {
        *self.session.lock() = Some(session.clone());
        Ok(())
    }

    fn remove(&self) -> Result<(), Error> {
        *self.session.lock() = None;
        Ok(())
    }
}

/// JSON file storage. Survives restarts and can be shared by several
/// processes pointing at the same path.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SessionStorageBackend for FileStorage {
    fn get(&self) -> Result<Option<Session>, Error> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Storage(format!("{}: {e}", self.path.display()))),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn set(&self, session: &Session) -> Result<(), Error> {
        let bytes = serde_json::to_vec(session)?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .map_err(|e| Error::Storage(format!("{}: {e}", dir.display())))?;
        }
        // Write-then-rename so readers in other processes never see a torn file.
        let tmp = self.temp_path();
        fs::write(&tmp, bytes).map_err(|e| Error::Storage(format!("{}: {e}", tmp.display())))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| Error::Storage(format!("{}: {e}", self.path.display())))
    }

    fn remove(&self) -> Result<(), Error> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!("{}: {e}", self.path.display()))),
        }
    }
}

/// Pick a backend: file storage when a path is given, memory otherwise.
#[must_use]
pub fn detect_storage(session_file: Option<&Path>) -> Arc<dyn SessionStorageBackend> {
    match session_file {
        Some(path) => Arc::new(FileStorage::new(path)),
        None => Arc::new(MemoryStorage::new()),
    }
}

/// Shared handle to the persisted session.
///
/// Cloning is cheap; all clones observe the same backend. Backend failures
/// and incomplete stored sessions are logged and treated as "no session" so
/// that callers get the plain get/set/remove contract.
#[derive(Clone)]
pub struct SessionStorage {
    backend: Arc<dyn SessionStorageBackend>,
    changes: Arc<watch::Sender<Option<Session>>>,
}

impl SessionStorage {
    #[must_use]
    pub fn new(backend: Arc<dyn SessionStorageBackend>) -> Self {
        let (changes, _) = watch::channel(None);
        let storage = Self {
            backend,
            changes: Arc::new(changes),
        };
        storage.changes.send_replace(storage.get());
        storage
    }

    /// In-memory storage, mostly for tests and short-lived tools.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// Current session. Never touches the network.
    #[must_use]
    pub fn get(&self) -> Option<Session> {
        match self.backend.get() {
            Ok(Some(session)) if !session.is_complete() => {
                tracing::warn!("Ignoring incomplete stored session");
                None
            }
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read stored session");
                None
            }
        }
    }

    /// Persist `session`, replacing any previous one. Incomplete sessions
    /// (missing either token) are ignored.
    pub fn set(&self, session: &Session) {
        if !session.is_complete() {
            tracing::warn!("Refusing to store incomplete session");
            return;
        }
        if let Err(e) = self.backend.set(session) {
            tracing::warn!(error = %e, "Failed to store session");
            return;
        }
        self.changes.send_replace(Some(session.clone()));
    }

    pub fn remove(&self) {
        if let Err(e) = self.backend.remove() {
            tracing::warn!(error = %e, "Failed to remove stored session");
        }
        self.changes.send_replace(None);
    }

    /// Watch session changes made through any clone of this handle.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.changes.subscribe()
    }
}

impl std::fmt::Debug for SessionStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStorage").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(tag: &str) -> Session {
        Session::new(format!("access-{tag}"), format!("refresh-{tag}"))
    }

    #[test]
    fn memory_roundtrip() {
        let storage = SessionStorage::in_memory();
        assert!(storage.get().is_none());

        storage.set(&session("a"));
        assert_eq!(storage.get(), Some(session("a")));

        storage.set(&session("b"));
        assert_eq!(storage.get().unwrap().access_token, "access-b");

        storage.remove();
        assert!(storage.get().is_none());
    }

    #[test]
    fn clones_share_backend() {
        let storage = SessionStorage::in_memory();
        let other = storage.clone();
        storage.set(&session("a"));
        assert_eq!(other.get(), Some(session("a")));
    }

    #[test]
    fn incomplete_session_not_stored() {
        let storage = SessionStorage::in_memory();
        storage.set(&Session::new("access", ""));
        assert!(storage.get().is_none());
    }

    #[test]
    fn subscribers_see_changes() {
        let storage = SessionStorage::in_memory();
        let mut rx = storage.subscribe();

        storage.set(&session("a"));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().as_ref(), Some(&session("a")));

        storage.remove();
        assert!(rx.borrow_and_update().is_none());
    }

    #[test]
    fn file_storage_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let first = SessionStorage::new(Arc::new(FileStorage::new(&path)));
        first.set(&session("a"));

        let second = SessionStorage::new(detect_storage(Some(path.as_path())));
        assert_eq!(second.get(), Some(session("a")));

        second.remove();
        assert!(first.get().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn file_storage_remove_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileStorage::new(dir.path().join("absent.json"));
        assert!(backend.remove().is_ok());
        assert!(backend.get().unwrap().is_none());
    }

    #[test]
    fn corrupt_file_reads_as_no_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, b"{not json").unwrap();

        let backend = FileStorage::new(&path);
        assert!(matches!(backend.get(), Err(Error::Json(_))));

        let storage = SessionStorage::new(Arc::new(backend));
        assert!(storage.get().is_none());
    }

    #[test]
    fn subscribers_start_from_stored_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        SessionStorage::new(Arc::new(FileStorage::new(&path))).set(&session("a"));

        let reopened = SessionStorage::new(Arc::new(FileStorage::new(&path)));
        let rx = reopened.subscribe();

        assert_eq!(rx.borrow().as_ref(), Some(&session("a")));
    }

    #[test]
    fn incomplete_file_reads_as_no_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, br#"{"accessToken":"access-a","refreshToken":""}"#).unwrap();

        let storage = SessionStorage::new(Arc::new(FileStorage::new(&path)));

        assert!(storage.get().is_none());
        assert!(storage.subscribe().borrow().is_none());
    }
}
