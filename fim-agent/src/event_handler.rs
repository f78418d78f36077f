//! Event handler (C5): debounce, classify, mutate the tree, enqueue
//! (spec §4.5). Grounded on
//! `original_source/src/core/event_handler.py::FIMEventHandler.detect_file_change`,
//! restructured per the Resolved Open Question into one pure classification
//! function plus a thin mutating wrapper, instead of the original's two
//! duplicated/recursive create-vs-modify paths.

use chrono::Utc;
use fim_merkle::{hash_file, index_of, Hash, MerkleTree, TrackedFile};
use fim_protocol::{Collaborator, CollaboratorMessage, Event, EventId, EventType, HexHash, Severity, WireMerkleProof};
use fim_state::PersistentState;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// The OS's notion of what happened, before this module's tie-break rule
/// is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKind {
    Create,
    Modify,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Create,
    Modify,
    Delete,
    DuplicateSuppressed,
    Idempotent,
}

/// Presence in the tracked-file list is the source of truth, not the OS's
/// event label (spec §4.5's classification rule): a "modified" notification
/// for an absent path is promoted to create; a "created" notification for
/// a present path with an unchanged hash is suppressed.
pub fn classify(existing: Option<&Hash>, observed_kind: RawKind, new_hash: Option<Hash>) -> Classification {
    match (observed_kind, existing) {
        (RawKind::Delete, None) => Classification::Idempotent,
        (RawKind::Delete, Some(_)) => Classification::Delete,
        (_, None) => Classification::Create,
        (_, Some(old)) => match new_hash {
            Some(h) if h == *old => Classification::DuplicateSuppressed,
            _ => Classification::Modify,
        },
    }
}

struct TreeState {
    tree: Option<MerkleTree>,
    files: Vec<TrackedFile>,
}

pub struct EventHandler {
    host_id: String,
    tree_state: Mutex<TreeState>,
    state: Arc<PersistentState>,
    collaborator: Arc<dyn Collaborator>,
    counter: AtomicU64,
    on_enqueued: Arc<dyn Fn() + Send + Sync>,
}

impl EventHandler {
    pub fn new(
        host_id: String,
        tree: Option<MerkleTree>,
        files: Vec<TrackedFile>,
        state: Arc<PersistentState>,
        collaborator: Arc<dyn Collaborator>,
        on_enqueued: Arc<dyn Fn() + Send + Sync>,
    ) -> Self {
        EventHandler {
            host_id,
            tree_state: Mutex::new(TreeState { tree, files }),
            state,
            collaborator,
            counter: AtomicU64::new(0),
            on_enqueued,
        }
    }

    pub fn tracked_file_count(&self) -> usize {
        self.tree_state.lock().files.len()
    }

    pub fn reset_tree(&self, tree: Option<MerkleTree>, files: Vec<TrackedFile>) {
        let mut guard = self.tree_state.lock();
        guard.tree = tree;
        guard.files = files;
    }

    fn next_event_id(&self) -> EventId {
        let counter = self.counter.fetch_add(1, Ordering::SeqCst);
        let wall_clock_ms = Utc::now().timestamp_millis() as u128;
        EventId::from_watcher(&self.host_id, counter, wall_clock_ms)
    }

    /// Directory-lifecycle events use the control-surface id scheme
    /// (`{host_id}-gui-{short_uuid}`, SPEC_FULL.md §3's supplement,
    /// `client_gui.py`'s `f"{host_id}-gui-{uuid4().hex[:8]}"`) rather than
    /// the watcher counter scheme — they originate from a directory change
    /// request, not a filesystem notification. The short id is derived by
    /// hashing the same counter/wall-clock material `next_event_id` uses,
    /// avoiding a dedicated UUID dependency for an 8-hex-character token.
    fn next_lifecycle_event_id(&self) -> EventId {
        let counter = self.counter.fetch_add(1, Ordering::SeqCst);
        let wall_clock_ms = Utc::now().timestamp_millis() as u128;
        let seed = format!("{}-{counter}-{wall_clock_ms}", self.host_id);
        let digest = fim_merkle::hash_bytes(seed.as_bytes());
        let short_uuid: String = digest[..4].iter().map(|b| format!("{b:02x}")).collect();
        EventId::from_control_surface(&self.host_id, &short_uuid)
    }

    /// Handles one raw filesystem notification for a non-directory path
    /// (spec §4.5 steps 1-9).
    pub fn handle_raw_event(&self, path: PathBuf, observed_kind: RawKind) {
        thread::sleep(SETTLE_DELAY);

        let mut guard = self.tree_state.lock();

        let new_hash = if observed_kind == RawKind::Delete {
            None
        } else {
            match hash_file(&path) {
                Ok(Some(hash)) => Some(hash),
                Ok(None) => {
                    self.collaborator.notify(CollaboratorMessage::Log {
                        timestamp: Utc::now(),
                        message: format!("{} is unhashable, skipping", path.display()),
                        severity: Severity::Warning,
                    });
                    return;
                }
                Err(e) => {
                    self.collaborator.notify(CollaboratorMessage::Log {
                        timestamp: Utc::now(),
                        message: format!("error hashing {}: {e}", path.display()),
                        severity: Severity::Warning,
                    });
                    return;
                }
            }
        };

        let existing_index = index_of(&guard.files, &path);
        let existing_hash = existing_index.map(|i| guard.files[i].hash);

        let classification = classify(existing_hash.as_ref(), observed_kind, new_hash);

        let (old_hash, event_type, new_index) = match classification {
            Classification::Idempotent | Classification::DuplicateSuppressed => return,
            Classification::Delete => {
                let index = existing_index.expect("Delete classification implies a tracked file");
                guard.files.remove(index);
                let files = std::mem::take(&mut guard.files);
                let (tree, files) = MerkleTree::build(files);
                guard.tree = tree;
                guard.files = files;
                (existing_hash, EventType::Deleted, None)
            }
            Classification::Modify => {
                let index = existing_index.expect("Modify classification implies a tracked file");
                let new_hash = new_hash.expect("Modify always observes a hash");
                guard.files[index].hash = new_hash;
                guard
                    .tree
                    .as_mut()
                    .expect("a tracked file implies a non-null tree")
                    .update(index, new_hash);
                (existing_hash, EventType::Modified, Some(index))
            }
            Classification::Create => {
                let new_hash = new_hash.expect("Create always observes a hash");
                guard.files.push(TrackedFile { path: path.clone(), hash: new_hash });
                let files = std::mem::take(&mut guard.files);
                let (tree, files) = MerkleTree::build(files);
                let index = index_of(&files, &path);
                guard.tree = tree;
                guard.files = files;
                (None, EventType::Created, index)
            }
        };

        let root_hash = guard.tree.as_ref().map(|t| t.root());
        let merkle_proof = match (new_index, &guard.tree) {
            (Some(index), Some(tree)) => Some(WireMerkleProof::from(tree.proof(index))),
            _ => None,
        };
        let last_valid_hash = self.state.last_valid_hash();

        drop(guard);

        let now = Utc::now();
        let event = Event {
            id: self.next_event_id(),
            host_id: self.host_id.clone(),
            event_type,
            path,
            old_hash: old_hash.map(HexHash::from),
            new_hash: new_hash.map(HexHash::from),
            root_hash: root_hash.map(HexHash::from),
            merkle_proof,
            last_valid_hash,
            queued_at: now,
            timestamp: now,
        };

        self.enqueue(event);
    }

    /// Directory-lifecycle events (spec §4.7's directory-change protocol)
    /// carry no Merkle proof and are raised by the orchestrator directly,
    /// bypassing classification.
    pub fn enqueue_lifecycle(&self, event_type: EventType, path: PathBuf, hash: Option<Hash>, anchor: Option<Hash>) {
        let now = Utc::now();
        let event = Event {
            id: self.next_lifecycle_event_id(),
            host_id: self.host_id.clone(),
            event_type,
            path,
            old_hash: hash.map(HexHash::from),
            new_hash: hash.map(HexHash::from),
            root_hash: hash.map(HexHash::from),
            merkle_proof: None,
            last_valid_hash: anchor.map(HexHash::from),
            queued_at: now,
            timestamp: now,
        };
        self.enqueue(event);
    }

    fn enqueue(&self, event: Event) {
        match self.state.enqueue_event(event) {
            Ok(_) => {
                let pending = self.state.queue_len();
                self.collaborator.notify(CollaboratorMessage::Log {
                    timestamp: Utc::now(),
                    message: "change queued".to_string(),
                    severity: Severity::Info,
                });
                self.collaborator.notify(CollaboratorMessage::Pending { count: pending });
                (self.on_enqueued)();
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to enqueue event");
            }
        }
    }
}

/// Walks `dir` recursively, hashing every regular file. Unhashable files
/// are skipped with a warning (spec §4.7 step 2), not treated as fatal.
pub fn scan_directory(dir: &Path, collaborator: &dyn Collaborator) -> Vec<TrackedFile> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let entries = match std::fs::read_dir(&current) {
            Ok(entries) => entries,
            Err(e) => {
                collaborator.notify(CollaboratorMessage::Log {
                    timestamp: Utc::now(),
                    message: format!("cannot read directory {}: {e}", current.display()),
                    severity: Severity::Warning,
                });
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            match hash_file(&path) {
                Ok(Some(hash)) => files.push(TrackedFile { path, hash }),
                Ok(None) => {
                    collaborator.notify(CollaboratorMessage::Log {
                        timestamp: Utc::now(),
                        message: format!("{} is unhashable, skipping", path.display()),
                        severity: Severity::Warning,
                    });
                }
                Err(e) => {
                    collaborator.notify(CollaboratorMessage::Log {
                        timestamp: Utc::now(),
                        message: format!("error hashing {}: {e}", path.display()),
                        severity: Severity::Warning,
                    });
                }
            }
        }
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modified_notification_on_absent_path_is_promoted_to_create() {
        assert_eq!(classify(None, RawKind::Modify, Some([1u8; 32])), Classification::Create);
    }

    #[test]
    fn created_notification_with_unchanged_hash_is_suppressed() {
        let h = [7u8; 32];
        assert_eq!(classify(Some(&h), RawKind::Create, Some(h)), Classification::DuplicateSuppressed);
    }

    #[test]
    fn delete_on_untracked_path_is_idempotent() {
        assert_eq!(classify(None, RawKind::Delete, None), Classification::Idempotent);
    }

    #[test]
    fn delete_on_tracked_path_is_delete() {
        assert_eq!(classify(Some(&[1u8; 32]), RawKind::Delete, None), Classification::Delete);
    }

    #[test]
    fn modify_with_changed_hash_is_modify() {
        assert_eq!(
            classify(Some(&[1u8; 32]), RawKind::Modify, Some([2u8; 32])),
            Classification::Modify
        );
    }

    struct NullCollaborator;
    impl Collaborator for NullCollaborator {
        fn notify(&self, _message: CollaboratorMessage) {}
    }

    fn handler(dir: &std::path::Path) -> (Arc<EventHandler>, Arc<PersistentState>, tempfile::TempDir) {
        let state_dir = tempfile::tempdir().unwrap();
        let state = Arc::new(PersistentState::open(state_dir.path().join("state.json"), &NullCollaborator));
        let files = scan_directory(dir, &NullCollaborator);
        let (tree, files) = MerkleTree::build(files);
        let handler = Arc::new(EventHandler::new(
            "host-1".to_string(),
            tree,
            files,
            Arc::clone(&state),
            Arc::new(NullCollaborator),
            Arc::new(|| {}),
        ));
        (handler, state, state_dir)
    }

    /// S3: two offline modifications to the same file queue two events;
    /// both carry the pre-drain anchor until chain repair rewrites the
    /// second after the first is acknowledged (covered separately at the
    /// handshake layer).
    #[test]
    fn s3_two_offline_modifications_enqueue_with_shared_prior_anchor() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"A").unwrap();
        let (handler, state, _state_dir) = handler(dir.path());

        std::fs::write(dir.path().join("a.txt"), b"AA").unwrap();
        handler.handle_raw_event(dir.path().join("a.txt"), RawKind::Modify);
        std::fs::write(dir.path().join("a.txt"), b"AAA").unwrap();
        handler.handle_raw_event(dir.path().join("a.txt"), RawKind::Modify);

        assert_eq!(state.queue_len(), 2);
        let e1 = state.dequeue_event().unwrap().unwrap();
        let e2 = state.dequeue_event().unwrap().unwrap();

        assert_eq!(e1.old_hash, Some(HexHash::from(fim_merkle::hash_bytes(b"A"))));
        assert_eq!(e1.new_hash, Some(HexHash::from(fim_merkle::hash_bytes(b"AA"))));
        assert_eq!(e2.old_hash, Some(HexHash::from(fim_merkle::hash_bytes(b"AA"))));
        assert_eq!(e2.new_hash, Some(HexHash::from(fim_merkle::hash_bytes(b"AAA"))));
        // Neither report/ack has happened yet, so both still carry the
        // same pre-drain anchor (here: no prior validation, so `None`).
        assert_eq!(e1.last_valid_hash, None);
        assert_eq!(e2.last_valid_hash, None);
    }

    /// S4: deleting the only two tracked files in turn leaves a null tree
    /// on the second delete, with no root hash and no proof.
    #[test]
    fn s4_deleting_every_file_yields_a_null_tree_on_the_last_delete() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"A").unwrap();
        std::fs::write(dir.path().join("b.txt"), b"B").unwrap();
        let (handler, state, _state_dir) = handler(dir.path());
        assert_eq!(handler.tracked_file_count(), 2);

        std::fs::remove_file(dir.path().join("b.txt")).unwrap();
        handler.handle_raw_event(dir.path().join("b.txt"), RawKind::Delete);
        std::fs::remove_file(dir.path().join("a.txt")).unwrap();
        handler.handle_raw_event(dir.path().join("a.txt"), RawKind::Delete);

        assert_eq!(handler.tracked_file_count(), 0);
        state.dequeue_event().unwrap(); // first delete (b.txt), tree still has a.txt
        let last = state.dequeue_event().unwrap().unwrap();
        assert_eq!(last.event_type, EventType::Deleted);
        assert_eq!(last.root_hash, None);
        assert_eq!(last.merkle_proof, None);
    }

    /// Directory-lifecycle events mint ids via the control-surface scheme
    /// (`{host_id}-gui-{short_uuid}`), distinct from the watcher counter
    /// scheme used by filesystem-notification-driven events.
    #[test]
    fn lifecycle_events_use_the_control_surface_id_scheme() {
        let dir = tempfile::tempdir().unwrap();
        let (handler, state, _state_dir) = handler(dir.path());

        handler.enqueue_lifecycle(EventType::DirectorySelected, dir.path().to_path_buf(), None, None);

        let event = state.dequeue_event().unwrap().unwrap();
        assert!(event.id.0.starts_with("host-1-gui-"));
        assert_eq!(event.id.0.len(), "host-1-gui-".len() + 8);
    }
}
