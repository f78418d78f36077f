//! The durable, mutex-guarded JSON document store (spec §4.3, invariant
//! S1). Grounded on `shared/crates/storage::StorageBackend`/
//! `StorageManager`, narrowed from a generic async key-value abstraction to
//! one synchronous document matching
//! `original_source/src/core/state.py::FIMState`.

use crate::document::{AdminCredentials, StateDocument};
use crate::error::StateError;
use chrono::{DateTime, Utc};
use fim_protocol::{Collaborator, CollaboratorMessage, Event, EventType, HexHash, Severity};
use parking_lot::Mutex;
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct PersistentState {
    path: PathBuf,
    doc: Mutex<StateDocument>,
}

impl PersistentState {
    /// Load `path` if it exists and parses; otherwise start from defaults.
    /// A present-but-corrupt file is not silently discarded — it is
    /// surfaced to `collaborator` as a warning before falling back.
    pub fn open(path: PathBuf, collaborator: &dyn Collaborator) -> Self {
        let doc = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice::<StateDocument>(&bytes).unwrap_or_else(|e| {
                collaborator.notify(CollaboratorMessage::Log {
                    timestamp: Utc::now(),
                    message: format!("state file at {} is corrupted, starting from defaults: {e}", path.display()),
                    severity: Severity::Warning,
                });
                StateDocument::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StateDocument::default(),
            Err(e) => {
                collaborator.notify(CollaboratorMessage::Log {
                    timestamp: Utc::now(),
                    message: format!("could not read state file at {}: {e}", path.display()),
                    severity: Severity::Warning,
                });
                StateDocument::default()
            }
        };
        PersistentState { path, doc: Mutex::new(doc) }
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut StateDocument) -> R) -> Result<R, StateError> {
        let mut guard = self.doc.lock();
        let result = f(&mut guard);
        write_atomic(&self.path, &guard)?;
        Ok(result)
    }

    // --- watch directory -------------------------------------------------

    pub fn set_watch_directory(&self, dir: PathBuf) -> Result<(), StateError> {
        self.mutate(|doc| doc.watch_directory = Some(dir))
    }

    pub fn watch_directory(&self) -> Option<PathBuf> {
        self.doc.lock().watch_directory.clone()
    }

    // --- chain anchor ------------------------------------------------------

    pub fn last_valid_hash(&self) -> Option<HexHash> {
        self.doc.lock().last_valid_hash
    }

    pub fn last_server_validation(&self) -> Option<serde_json::Value> {
        self.doc.lock().last_server_validation.clone()
    }

    pub fn update_last_valid(
        &self,
        hash: Option<HexHash>,
        validation: Option<serde_json::Value>,
    ) -> Result<(), StateError> {
        self.mutate(|doc| {
            doc.last_valid_hash = hash;
            doc.last_server_validation = validation;
        })
    }

    // --- event queue ---------------------------------------------------

    /// Stamps `queued_at` at the moment of enqueue (the caller never sets
    /// it), matching `FIMState.enqueue_event` in the original.
    pub fn enqueue_event(&self, mut event: Event) -> Result<Event, StateError> {
        event.queued_at = Utc::now();
        self.mutate(|doc| {
            doc.event_queue.push_back(event.clone());
        })?;
        Ok(event)
    }

    pub fn peek_event(&self) -> Option<Event> {
        self.doc.lock().event_queue.front().cloned()
    }

    pub fn dequeue_event(&self) -> Result<Option<Event>, StateError> {
        self.mutate(|doc| doc.event_queue.pop_front())
    }

    pub fn queue_len(&self) -> usize {
        self.doc.lock().event_queue.len()
    }

    /// Chain repair (spec §4.6, testable property 5): rewrite every queued
    /// event *after* the current head to anchor at `new_anchor`, stopping
    /// at (not including) the next `directory_selected` marker, which
    /// begins a new chain. Called with the just-acknowledged event E still
    /// at the head; callers dequeue E separately afterward. `new_anchor` is
    /// `None` when E emptied the tree (a delete-to-null-tree event) — the
    /// repair still runs unconditionally in that case, matching
    /// `state.py::update_queued_events_base`, which rewrites to `None` just
    /// as unconditionally as to any other root.
    pub fn repair_chain(&self, new_anchor: Option<HexHash>) -> Result<(), StateError> {
        self.mutate(|doc| {
            for event in doc.event_queue.iter_mut().skip(1) {
                if event.event_type == EventType::DirectorySelected {
                    break;
                }
                event.last_valid_hash = new_anchor;
            }
        })
    }

    // --- auth token ------------------------------------------------------

    pub fn set_token(&self, token: String, expires: DateTime<Utc>) -> Result<(), StateError> {
        self.mutate(|doc| {
            doc.jwt_token = Some(token);
            doc.token_expires = Some(expires);
        })
    }

    pub fn clear_token(&self) -> Result<(), StateError> {
        self.mutate(|doc| {
            doc.jwt_token = None;
            doc.token_expires = None;
        })
    }

    pub fn token(&self) -> Option<(String, DateTime<Utc>)> {
        let doc = self.doc.lock();
        match (&doc.jwt_token, doc.token_expires) {
            (Some(token), Some(expires)) => Some((token.clone(), expires)),
            _ => None,
        }
    }

    // --- admin credentials -----------------------------------------------
    //
    // This store only ever compares against an already-hashed password; it
    // never talks to the server and never hashes a fresh plaintext
    // password itself (spec §1, §4.3 — the locally-cached-then-server
    // decision procedure belongs to the `ControlSurface`'s `admin_verify`,
    // not to this store).

    pub fn set_admin_credentials(&self, username: String, bcrypt_hash: String) -> Result<(), StateError> {
        self.mutate(|doc| {
            doc.admin_credentials = Some(AdminCredentials { username, bcrypt_hash });
        })
    }

    pub fn clear_admin_credentials(&self) -> Result<(), StateError> {
        self.mutate(|doc| doc.admin_credentials = None)
    }

    pub fn verify_admin_credentials(&self, username: &str, password: &str) -> bool {
        let doc = self.doc.lock();
        match &doc.admin_credentials {
            Some(creds) if creds.username == username => {
                bcrypt::verify(password, &creds.bcrypt_hash).unwrap_or(false)
            }
            _ => false,
        }
    }

    // --- deregistration ----------------------------------------------------

    pub fn set_deregistered(&self, flag: bool) -> Result<(), StateError> {
        self.mutate(|doc| doc.is_deregistered = flag)
    }

    pub fn is_deregistered(&self) -> bool {
        self.doc.lock().is_deregistered
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}

fn write_atomic(path: &Path, doc: &StateDocument) -> Result<(), StateError> {
    let data = serde_json::to_vec_pretty(doc)?;
    let tmp = tmp_path_for(path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    {
        let mut f = std::fs::File::create(&tmp)?;
        f.write_all(&data)?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}
