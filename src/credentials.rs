//! Bearer token sources
//!
//! The client asks its [`CredentialProvider`] for a token once per logical
//! request. No token means the request goes out unauthenticated; a missing
//! token is never an error.

use arc_swap::ArcSwapOption;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Supplies the bearer token attached to outgoing requests
pub trait CredentialProvider: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

/// Never has a token
#[derive(Debug, Default, Clone, Copy)]
pub struct Anonymous;

impl CredentialProvider for Anonymous {
    fn bearer_token(&self) -> Option<String> {
        None
    }
}

/// In-memory token that can be swapped at runtime (login, logout)
///
/// Readers never block writers; a request in flight keeps the token it read.
///
/// # Examples
///
/// ```
/// use advisor_client::credentials::{CredentialProvider, SharedToken};
///
/// let token = SharedToken::default();
/// assert_eq!(token.bearer_token(), None);
/// token.set("abc123");
/// assert_eq!(token.bearer_token().as_deref(), Some("abc123"));
/// token.clear();
/// assert_eq!(token.bearer_token(), None);
/// ```
#[derive(Debug, Default)]
pub struct SharedToken {
    token: ArcSwapOption<String>,
}

impl SharedToken {
    pub fn new(token: impl Into<String>) -> Self {
        let shared = Self::default();
        shared.set(token);
        shared
    }

    pub fn set(&self, token: impl Into<String>) {
        self.token.store(Some(Arc::new(token.into())));
    }

    pub fn clear(&self) {
        self.token.store(None);
    }
}

impl CredentialProvider for SharedToken {
    fn bearer_token(&self) -> Option<String> {
        self.token.load_full().map(|t| t.as_ref().clone())
    }
}

/// Token persisted in a file, re-read on every lookup
///
/// Surrounding whitespace is trimmed. A missing, unreadable or empty file
/// yields no token.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialProvider for FileTokenStore {
    fn bearer_token(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                let token = contents.trim();
                (!token.is_empty()).then(|| token.to_string())
            }
            Err(err) => {
                debug!("No token read from {}: {}", self.path.display(), err);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn anonymous_has_no_token() {
        assert_eq!(Anonymous.bearer_token(), None);
    }

    #[test]
    fn file_store_trims_and_rereads() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  token-one  ").unwrap();
        let store = FileTokenStore::new(file.path());
        assert_eq!(store.bearer_token().as_deref(), Some("token-one"));

        std::fs::write(file.path(), "token-two").unwrap();
        assert_eq!(store.bearer_token().as_deref(), Some("token-two"));
    }

    #[test]
    fn file_store_empty_or_missing_is_none() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert_eq!(FileTokenStore::new(file.path()).bearer_token(), None);

        let dir = tempfile::tempdir().unwrap();
        let missing = FileTokenStore::new(dir.path().join("token"));
        assert_eq!(missing.bearer_token(), None);
    }
}
