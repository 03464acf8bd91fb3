//! CSRF credential boundary.
//!
//! The pipeline only ever reads the current token, once per call, by value.
//! Login and logout mutate the store from outside at any time; an absent
//! token is not an error, the credential fields are simply left off.

use std::sync::RwLock;

/// Name of the session cookie whose value doubles as the CSRF token.
pub const CSRF_COOKIE: &str = "bili_jct";

/// Supplies the CSRF token attached to state-changing calls.
pub trait CredentialProvider: Send + Sync {
    fn csrf_token(&self) -> Option<String>;
}

/// Process-wide token store behind a narrow read/write interface.
#[derive(Debug, Default)]
pub struct CredentialStore {
    token: RwLock<Option<String>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    /// Replace the current token. An empty string clears it.
    pub fn set_csrf_token(&self, token: impl Into<String>) {
        let token = token.into();
        let value = if token.is_empty() { None } else { Some(token) };
        // A poisoned lock still holds a valid Option; keep using it.
        let mut guard = self.token.write().unwrap_or_else(|e| e.into_inner());
        *guard = value;
    }

    pub fn clear(&self) {
        let mut guard = self.token.write().unwrap_or_else(|e| e.into_inner());
        *guard = None;
    }

    /// Pick the `bili_jct` value out of a `k=v; k=v` cookie string and store
    /// it. Returns whether a token was found; the store is untouched otherwise.
    pub fn update_from_cookie_header(&self, header: &str) -> bool {
        match csrf_from_cookie_header(header) {
            Some(token) => {
                self.set_csrf_token(token);
                true
            }
            None => false,
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.csrf_token().is_some()
    }
}

impl CredentialProvider for CredentialStore {
    fn csrf_token(&self) -> Option<String> {
        self.token.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Fixed token, handy for tests and one-off tools.
impl CredentialProvider for Option<String> {
    fn csrf_token(&self) -> Option<String> {
        self.clone()
    }
}

fn csrf_from_cookie_header(header: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| name.trim() == CSRF_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn store_starts_empty() {
        let store = CredentialStore::new();
        assert_eq!(store.csrf_token(), None);
        assert!(!store.is_logged_in());
    }

    #[test]
    fn set_and_clear() {
        let store = CredentialStore::new();
        store.set_csrf_token("tok123");
        assert_eq!(store.csrf_token().as_deref(), Some("tok123"));
        store.clear();
        assert_eq!(store.csrf_token(), None);
    }

    #[test]
    fn empty_token_clears() {
        let store = CredentialStore::with_token("abc");
        store.set_csrf_token("");
        assert_eq!(store.csrf_token(), None);
    }

    #[test]
    fn cookie_header_extracts_bili_jct() {
        let store = CredentialStore::new();
        let found = store.update_from_cookie_header("SESSDATA=s%2C1; bili_jct=deadbeef; DedeUserID=7");
        assert!(found);
        assert_eq!(store.csrf_token().as_deref(), Some("deadbeef"));
    }

    #[test]
    fn cookie_header_without_token_leaves_store_alone() {
        let store = CredentialStore::with_token("old");
        assert!(!store.update_from_cookie_header("SESSDATA=x; bili_jct="));
        assert_eq!(store.csrf_token().as_deref(), Some("old"));
    }

    #[test]
    fn concurrent_readers_and_writer() {
        let store = Arc::new(CredentialStore::with_token("a"));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        if i == 0 {
                            store.set_csrf_token("b");
                        }
                        let token = store.csrf_token().unwrap();
                        assert!(token == "a" || token == "b");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
