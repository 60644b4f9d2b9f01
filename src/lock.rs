use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tokio::sync::RwLock;

/// Name of the lock guarding the persisted session.
pub const SESSION_LOCK_NAME: &str = "nhostSessionLock";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Any number of holders, excluded only by an exclusive holder.
    Shared,
    /// A single holder, excluding everyone else.
    Exclusive,
}

/// Registry of named shared/exclusive locks.
///
/// Every [`SessionLock`] handed out for the same name, from the same manager,
/// serializes against the others. [`LockManager::global`] spans the whole
/// process, so independent clients sharing one persisted session coordinate
/// without knowing about each other.
#[derive(Debug, Clone, Default)]
pub struct LockManager {
    locks: Arc<Mutex<HashMap<String, Arc<RwLock<()>>>>>,
}

impl LockManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide manager.
    #[must_use]
    pub fn global() -> &'static LockManager {
        static GLOBAL: OnceLock<LockManager> = OnceLock::new();
        GLOBAL.get_or_init(LockManager::new)
    }

    /// Handle to the lock called `name`, created on first use.
    #[must_use]
    pub fn lock(&self, name: &str) -> SessionLock {
        let inner = self
            .locks
            .lock()
            .entry(name.to_owned())
            .or_default()
            .clone();
        SessionLock::Native(inner)
    }
}

/// Coordination primitive used by the refresh coordinator.
///
/// `Noop` runs every critical section immediately: concurrent refreshes of
/// the same stored session are then possible, both between tasks and between
/// processes sharing one storage file. `Native` only spans the current
/// process.
#[derive(Debug, Clone)]
pub enum SessionLock {
    Native(Arc<RwLock<()>>),
    Noop,
}

impl SessionLock {
    /// The process-wide session lock.
    #[must_use]
    pub fn native() -> Self {
        LockManager::global().lock(SESSION_LOCK_NAME)
    }

    /// A lock not shared with any other handle except its own clones.
    #[must_use]
    pub fn isolated() -> Self {
        Self::Native(Arc::new(RwLock::new(())))
    }

    #[must_use]
    pub fn noop() -> Self {
        Self::Noop
    }

    /// Run `f` while holding the lock in `mode`.
    pub async fn request<F, Fut, T>(&self, mode: LockMode, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        match self {
            Self::Native(lock) => match mode {
                LockMode::Shared => {
                    let _guard = lock.read().await;
                    f().await
                }
                LockMode::Exclusive => {
                    let _guard = lock.write().await;
                    f().await
                }
            },
            Self::Noop => f().await,
        }
    }
}

impl Default for SessionLock {
    fn default() -> Self {
        Self::native()
    }
}
