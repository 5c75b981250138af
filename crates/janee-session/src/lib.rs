// SPDX-License-Identifier: MIT OR Apache-2.0
//! janee-session
//!
//! In-memory session store backed by a single JSON file. The in-memory map
//! is authoritative; after any public method returns, the file holds a
//! superset of the live set's serialisation (revoked entries may linger
//! until the next sweep, but never as `revoked: false`).

#![deny(unsafe_code)]

use chrono::Utc;
use janee_core::{SESSION_ID_PREFIX, Session};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Errors raised by session persistence.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The sessions file could not be written.
    #[error("failed to persist sessions: {0}")]
    Io(#[from] std::io::Error),

    /// The in-memory set could not be serialised.
    #[error("failed to serialise sessions: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Optional attributes recorded on a freshly created session.
#[derive(Debug, Clone, Default)]
pub struct SessionAttrs {
    /// Requesting agent identifier.
    pub agent_id: Option<String>,
    /// Human-readable reason supplied at dispatch.
    pub reason: Option<String>,
}

/// File-backed store of live sessions.
///
/// All mutations go through one lock that also serialises the file write, so
/// concurrent dispatches cannot interleave a stale persist.
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    inner: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    /// Load the store from `path`, tolerating a missing or corrupt file.
    ///
    /// Parse failures do not raise: the store starts empty and a warning is
    /// logged, matching the recovery behaviour expected at process start.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let sessions = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Vec<Session>>(&content) {
                Ok(list) => list
                    .into_iter()
                    .map(|s| (s.id.clone(), s))
                    .collect::<HashMap<_, _>>(),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "sessions file unparsable, starting empty");
                    HashMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "sessions file unreadable, starting empty");
                HashMap::new()
            }
        };
        Self {
            path,
            inner: Mutex::new(sessions),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mint a fresh session, insert it, and persist.
    pub fn create(
        &self,
        capability: &str,
        service: &str,
        ttl_secs: u64,
        attrs: SessionAttrs,
    ) -> Result<Session, SessionError> {
        let session = Session::new(
            janee_crypto::generate_token(SESSION_ID_PREFIX),
            capability,
            service,
            ttl_secs,
            attrs.agent_id,
            attrs.reason,
        );

        let mut inner = self.inner.lock().expect("session lock poisoned");
        inner.insert(session.id.clone(), session.clone());
        self.persist(&inner)?;
        Ok(session)
    }

    /// Fetch a live session, sweeping it out of memory if it is dead.
    pub fn get(&self, id: &str) -> Option<Session> {
        let mut inner = self.inner.lock().expect("session lock poisoned");
        let live = inner
            .get(id)
            .map(|s| s.is_live(Utc::now()))
            .unwrap_or(false);
        if live {
            inner.get(id).cloned()
        } else {
            inner.remove(id);
            None
        }
    }

    /// Revoke a session: mark it, persist the marked entry, then drop it
    /// from memory. Returns `false` when the id is unknown.
    ///
    /// The on-disk record observably carries `revoked: true` at least once;
    /// a later sweep reaps it.
    pub fn revoke(&self, id: &str) -> Result<bool, SessionError> {
        let mut inner = self.inner.lock().expect("session lock poisoned");
        let Some(session) = inner.get_mut(id) else {
            return Ok(false);
        };
        session.revoked = true;
        self.persist(&inner)?;
        inner.remove(id);
        Ok(true)
    }

    /// All live sessions. Persists when the sweep dropped anything.
    pub fn list(&self) -> Result<Vec<Session>, SessionError> {
        let mut inner = self.inner.lock().expect("session lock poisoned");
        let swept = Self::sweep(&mut inner);
        if swept {
            self.persist(&inner)?;
        }
        let mut sessions: Vec<Session> = inner.values().cloned().collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(sessions)
    }

    /// Sweep expired and revoked entries, persisting when anything changed.
    pub fn cleanup(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().expect("session lock poisoned");
        if Self::sweep(&mut inner) {
            self.persist(&inner)?;
        }
        Ok(())
    }

    /// Number of entries currently held in memory (live or awaiting sweep).
    pub fn len(&self) -> usize {
        self.inner.lock().expect("session lock poisoned").len()
    }

    /// Returns `true` when no entries are held in memory.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sweep(inner: &mut HashMap<String, Session>) -> bool {
        let now = Utc::now();
        let before = inner.len();
        inner.retain(|_, s| s.is_live(now));
        inner.len() != before
    }

    fn persist(&self, inner: &HashMap<String, Session>) -> Result<(), SessionError> {
        let mut sessions: Vec<&Session> = inner.values().collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        let json = serde_json::to_string_pretty(&sessions)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, json)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &tempfile::TempDir) -> SessionStore {
        SessionStore::load(dir.path().join("sessions.json"))
    }

    fn read_file(store: &SessionStore) -> Vec<Session> {
        let content = std::fs::read_to_string(store.path()).unwrap();
        serde_json::from_str(&content).unwrap()
    }

    #[test]
    fn create_persists_and_ids_carry_prefix() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp);
        let session = store
            .create("github-read", "github", 3_600, SessionAttrs::default())
            .unwrap();

        assert!(session.id.starts_with("sess_"));
        let on_disk = read_file(&store);
        assert_eq!(on_disk.len(), 1);
        assert_eq!(on_disk[0].id, session.id);
    }

    #[test]
    fn get_returns_live_sessions() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp);
        let session = store
            .create("cap", "svc", 3_600, SessionAttrs::default())
            .unwrap();
        let fetched = store.get(&session.id).unwrap();
        assert_eq!(fetched.capability, "cap");
    }

    #[test]
    fn get_sweeps_expired_sessions() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp);
        let session = store
            .create("cap", "svc", 0, SessionAttrs::default())
            .unwrap();

        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(store.get(&session.id).is_none());
        assert!(store.is_empty(), "expired entry removed from memory");
    }

    #[test]
    fn revoke_persists_marked_entry_before_reaping() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp);
        let session = store
            .create("cap", "svc", 3_600, SessionAttrs::default())
            .unwrap();

        assert!(store.revoke(&session.id).unwrap());

        // The file written by revoke() holds the revoked entry; memory no
        // longer does.
        let on_disk = read_file(&store);
        assert_eq!(on_disk.len(), 1);
        assert!(on_disk[0].revoked);
        assert!(store.get(&session.id).is_none());

        // A later sweep erases it; the file never regresses to
        // `revoked: false`.
        store.cleanup().unwrap();
        for s in read_file(&store) {
            assert_ne!((s.id == session.id, s.revoked), (true, false));
        }
    }

    #[test]
    fn revoke_unknown_returns_false() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp);
        assert!(!store.revoke("sess_missing").unwrap());
    }

    #[test]
    fn list_filters_and_persists_sweeps() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp);
        store
            .create("short", "svc", 0, SessionAttrs::default())
            .unwrap();
        let keep = store
            .create("long", "svc", 3_600, SessionAttrs::default())
            .unwrap();

        std::thread::sleep(std::time::Duration::from_millis(5));
        let live = store.list().unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, keep.id);

        let on_disk = read_file(&store);
        assert_eq!(on_disk.len(), 1, "sweep was persisted");
    }

    #[test]
    fn attrs_are_recorded() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp);
        let session = store
            .create(
                "cap",
                "svc",
                60,
                SessionAttrs {
                    agent_id: Some("agent-7".into()),
                    reason: Some("sync invoices".into()),
                },
            )
            .unwrap();
        assert_eq!(session.agent_id.as_deref(), Some("agent-7"));
        assert_eq!(session.reason.as_deref(), Some("sync invoices"));
    }

    #[test]
    fn survives_restart() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sessions.json");
        let id = {
            let store = SessionStore::load(&path);
            store
                .create("cap", "svc", 3_600, SessionAttrs::default())
                .unwrap()
                .id
        };

        let reloaded = SessionStore::load(&path);
        assert!(reloaded.get(&id).is_some());
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sessions.json");
        std::fs::write(&path, "{{{{ not json").unwrap();

        let store = SessionStore::load(&path);
        assert!(store.is_empty());
        // And the store is still usable.
        store
            .create("cap", "svc", 60, SessionAttrs::default())
            .unwrap();
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn sessions_file_mode_is_0600() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp);
        store
            .create("cap", "svc", 60, SessionAttrs::default())
            .unwrap();
        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn session_ids_are_unique() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp);
        let a = store
            .create("cap", "svc", 60, SessionAttrs::default())
            .unwrap();
        let b = store
            .create("cap", "svc", 60, SessionAttrs::default())
            .unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.len(), 2);
    }
}
