#![doc = include_str!("../README.md")]

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod fetch;
pub mod lock;
pub mod middleware;
pub mod refresh;
pub mod service;
pub mod session;
pub mod storage;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use auth::{AuthClient, SignInResponse};
pub use client::{NhostClient, create_client, create_server_client};
pub use config::{ClientOptions, generate_service_url};
pub use error::Error;
pub use fetch::{
    ChainFunction, Fetch, FetchError, FetchRequest, FetchResponse, ReqwestFetch,
    create_enhanced_fetch, extract_message, fetch_fn,
};
pub use lock::{LockManager, LockMode, SESSION_LOCK_NAME, SessionLock};
pub use refresh::{
    DEFAULT_MARGIN_SECONDS, RefreshOutcome, RefreshStep, SessionRefresher, TokenRefresher,
};
pub use service::ServiceClient;
pub use session::{DecodedToken, Session, decode_access_token};
pub use storage::{
    FileStorage, MemoryStorage, SessionStorage, SessionStorageBackend, detect_storage,
};
