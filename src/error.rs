use crate::fetch::FetchError;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A service answered with a non-success status.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Session storage error: {0}")]
    Storage(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// HTTP status code carried by the error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Fetch(e) => Some(e.status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderMap;

    #[test]
    fn status_from_fetch_error() {
        let err: Error = FetchError::new(serde_json::Value::Null, 401, HeaderMap::new()).into();
        assert_eq!(err.status(), Some(401));
    }

    #[test]
    fn no_status_for_local_errors() {
        assert_eq!(Error::Storage("disk full".into()).status(), None);
        assert_eq!(Error::Config("bad".into()).status(), None);
    }
}
