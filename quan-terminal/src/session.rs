//! Authenticated identity and its persistence across restarts.
//!
//! The [`SessionManager`] is the only writer of the session credential. Readers (the
//! request gateway, feed parameter construction) hold a cloned [`SessionHandle`].

use crate::error::SessionError;
use parking_lot::{Mutex, RwLock};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info, warn};

/// Storage key of the session token
pub const AUTH_TOKEN_KEY: &str = "authToken";
/// Storage key of the username
pub const USERNAME_KEY: &str = "username";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub username: String,
}

/// Durable client-local key/value storage.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError>;

    /// Write all entries in one step.
    fn set(&self, entries: &[(&str, &str)]) -> Result<(), SessionError>;

    /// Remove all keys in one step.
    fn remove(&self, keys: &[&str]) -> Result<(), SessionError>;
}

/// [`SessionStore`] backed by a JSON object file
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<HashMap<String, String>, SessionError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(HashMap::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(error) => Err(error.into()),
        }
    }

    /// Replace the file contents via a temporary file and rename.
    fn write(&self, entries: &HashMap<String, String>) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        Ok(self.read()?.remove(key))
    }

    fn set(&self, entries: &[(&str, &str)]) -> Result<(), SessionError> {
        let mut stored = self.read().unwrap_or_else(|error| {
            warn!(%error, path = %self.path.display(), "Overwriting unreadable session file");
            HashMap::new()
        });
        for (key, value) in entries {
            stored.insert(key.to_string(), value.to_string());
        }
        self.write(&stored)
    }

    fn remove(&self, keys: &[&str]) -> Result<(), SessionError> {
        let mut stored = self.read().unwrap_or_default();
        for key in keys {
            stored.remove(*key);
        }
        self.write(&stored)
    }
}

/// In-memory [`SessionStore`]
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let entries = entries
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Self {
            entries: Mutex::new(entries),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, entries: &[(&str, &str)]) -> Result<(), SessionError> {
        let mut stored = self.entries.lock();
        for (key, value) in entries {
            stored.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }

    fn remove(&self, keys: &[&str]) -> Result<(), SessionError> {
        let mut stored = self.entries.lock();
        for key in keys {
            stored.remove(*key);
        }
        Ok(())
    }
}

impl<S: SessionStore + ?Sized> SessionStore for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        (**self).get(key)
    }

    fn set(&self, entries: &[(&str, &str)]) -> Result<(), SessionError> {
        (**self).set(entries)
    }

    fn remove(&self, keys: &[&str]) -> Result<(), SessionError> {
        (**self).remove(keys)
    }
}

/// Read-only view of the current session
#[derive(Debug, Clone, Default)]
pub struct SessionHandle {
    current: Arc<RwLock<Option<Session>>>,
}

impl SessionHandle {
    pub fn get(&self) -> Option<Session> {
        self.current.read().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.current.read().as_ref().map(|session| session.token.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.read().is_some()
    }
}

/// Owner of the authenticated identity
pub struct SessionManager {
    store: Box<dyn SessionStore>,
    handle: SessionHandle,
}

impl SessionManager {
    pub fn new(store: Box<dyn SessionStore>) -> Self {
        Self {
            store,
            handle: SessionHandle::default(),
        }
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn current(&self) -> Option<Session> {
        self.handle.get()
    }

    /// Load the persisted session. A token without a username (or the reverse) is
    /// discarded.
    pub fn restore(&self) -> Option<Session> {
        let token = self.read_key(AUTH_TOKEN_KEY);
        let username = self.read_key(USERNAME_KEY);

        let session = match (token, username) {
            (Some(token), Some(username)) => Some(Session { token, username }),
            (None, None) => None,
            _ => {
                warn!("Discarding partially persisted session");
                self.clear();
                None
            }
        };

        if let Some(session) = &session {
            info!(username = %session.username, "Restored session");
        }
        *self.handle.current.write() = session.clone();
        session
    }

    fn read_key(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value.filter(|value| !value.is_empty()),
            Err(error) => {
                warn!(%error, key, "Failed to read persisted session");
                None
            }
        }
    }

    /// Install `session` as the current identity and persist it.
    ///
    /// The in-memory session is installed even when persisting fails.
    pub fn establish(&self, session: Session) -> Result<(), SessionError> {
        info!(username = %session.username, "Session established");
        let persisted = self.store.set(&[
            (AUTH_TOKEN_KEY, session.token.as_str()),
            (USERNAME_KEY, session.username.as_str()),
        ]);
        *self.handle.current.write() = Some(session);
        persisted
    }

    /// Drop the current identity from memory and storage.
    pub fn clear(&self) {
        *self.handle.current.write() = None;
        match self.store.remove(&[AUTH_TOKEN_KEY, USERNAME_KEY]) {
            Ok(()) => debug!("Session cleared"),
            Err(error) => warn!(%error, "Failed to clear persisted session"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session {
            token: "tok".to_string(),
            username: "quan".to_string(),
        }
    }

    #[test]
    fn test_restore() {
        struct TestCase {
            entries: Vec<(&'static str, &'static str)>,
            expected: Option<Session>,
        }

        let tests = vec![
            TestCase {
                // TC0: both keys present
                entries: vec![(AUTH_TOKEN_KEY, "tok"), (USERNAME_KEY, "quan")],
                expected: Some(session()),
            },
            TestCase {
                // TC1: nothing stored
                entries: vec![],
                expected: None,
            },
            TestCase {
                // TC2: token without username
                entries: vec![(AUTH_TOKEN_KEY, "tok")],
                expected: None,
            },
            TestCase {
                // TC3: username without token
                entries: vec![(USERNAME_KEY, "quan")],
                expected: None,
            },
            TestCase {
                // TC4: empty token counts as absent
                entries: vec![(AUTH_TOKEN_KEY, ""), (USERNAME_KEY, "quan")],
                expected: None,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let store = Arc::new(MemorySessionStore::with_entries(test.entries));
            let manager = SessionManager::new(Box::new(Arc::clone(&store)));

            let actual = manager.restore();
            assert_eq!(actual, test.expected, "TC{} failed", index);
            assert_eq!(manager.current(), test.expected, "TC{} failed", index);

            if test.expected.is_none() {
                assert_eq!(store.get(AUTH_TOKEN_KEY).unwrap(), None, "TC{} failed", index);
                assert_eq!(store.get(USERNAME_KEY).unwrap(), None, "TC{} failed", index);
            }
        }
    }

    #[test]
    fn test_establish_and_clear() {
        let store = Arc::new(MemorySessionStore::new());
        let manager = SessionManager::new(Box::new(Arc::clone(&store)));
        let handle = manager.handle();

        manager.establish(session()).unwrap();
        assert_eq!(handle.token().as_deref(), Some("tok"));
        assert_eq!(store.get(USERNAME_KEY).unwrap().as_deref(), Some("quan"));

        manager.clear();
        assert!(!handle.is_authenticated());
        assert_eq!(store.get(AUTH_TOKEN_KEY).unwrap(), None);
        assert_eq!(store.get(USERNAME_KEY).unwrap(), None);
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = std::env::temp_dir().join(format!("quan-session-{}", std::process::id()));
        let path = dir.join("session.json");
        let store = FileSessionStore::new(&path);

        assert_eq!(store.get(AUTH_TOKEN_KEY).unwrap(), None);

        let manager = SessionManager::new(Box::new(store.clone()));
        manager.establish(session()).unwrap();

        let reloaded = SessionManager::new(Box::new(FileSessionStore::new(&path)));
        assert_eq!(reloaded.restore(), Some(session()));

        reloaded.clear();
        assert_eq!(store.get(AUTH_TOKEN_KEY).unwrap(), None);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_file_store_corrupt_file() {
        let dir = std::env::temp_dir().join(format!("quan-corrupt-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("session.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = FileSessionStore::new(&path);
        assert!(matches!(store.get(AUTH_TOKEN_KEY), Err(SessionError::Corrupt(_))));

        let manager = SessionManager::new(Box::new(store));
        assert_eq!(manager.restore(), None);

        let _ = std::fs::remove_dir_all(dir);
    }
}
