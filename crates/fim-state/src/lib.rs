//! The durable, thread-safe JSON-backed state store (component C3):
//! watch directory, chain anchor, event queue, auth token, admin
//! credential comparison, and the deregistration flag, all behind one
//! document and one mutex (spec §4.3).

mod document;
mod error;
mod store;

pub use document::{AdminCredentials, StateDocument};
pub use error::StateError;
pub use store::PersistentState;

#[cfg(test)]
mod tests {
    use super::*;
    use fim_protocol::{CollaboratorMessage, Event, EventId, EventType, HexHash};
    use std::sync::Mutex as StdMutex;

    struct RecordingCollaborator {
        messages: StdMutex<Vec<CollaboratorMessage>>,
    }

    impl RecordingCollaborator {
        fn new() -> Self {
            RecordingCollaborator { messages: StdMutex::new(Vec::new()) }
        }
    }

    impl fim_protocol::Collaborator for RecordingCollaborator {
        fn notify(&self, message: CollaboratorMessage) {
            self.messages.lock().unwrap().push(message);
        }
    }

    fn sample_event(id: &str, event_type: EventType) -> Event {
        let now = chrono::Utc::now();
        Event {
            id: EventId(id.to_string()),
            host_id: "host-1".to_string(),
            event_type,
            path: "/watched/a.txt".into(),
            old_hash: None,
            new_hash: Some(HexHash(fim_merkle::hash_bytes(b"A"))),
            root_hash: Some(HexHash(fim_merkle::hash_bytes(b"A"))),
            merkle_proof: None,
            last_valid_hash: None,
            queued_at: now,
            timestamp: now,
        }
    }

    #[test]
    fn missing_file_loads_defaults_without_warning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let collaborator = RecordingCollaborator::new();
        let state = PersistentState::open(path, &collaborator);
        assert_eq!(state.queue_len(), 0);
        assert!(collaborator.messages.lock().unwrap().is_empty());
    }

    #[test]
    fn corrupted_file_falls_back_to_defaults_and_warns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"{ not json").unwrap();
        let collaborator = RecordingCollaborator::new();
        let state = PersistentState::open(path, &collaborator);
        assert_eq!(state.queue_len(), 0);
        let messages = collaborator.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(matches!(
            messages[0],
            CollaboratorMessage::Log { severity: fim_protocol::Severity::Warning, .. }
        ));
    }

    #[test]
    fn mutation_is_durable_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let collaborator = RecordingCollaborator::new();
        {
            let state = PersistentState::open(path.clone(), &collaborator);
            state.set_watch_directory("/watched".into()).unwrap();
            state.enqueue_event(sample_event("e1", EventType::Created)).unwrap();
        }
        let reopened = PersistentState::open(path, &collaborator);
        assert_eq!(reopened.watch_directory(), Some("/watched".into()));
        assert_eq!(reopened.queue_len(), 1);
    }

    #[test]
    fn queue_is_fifo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let collaborator = RecordingCollaborator::new();
        let state = PersistentState::open(path, &collaborator);

        state.enqueue_event(sample_event("e1", EventType::Created)).unwrap();
        state.enqueue_event(sample_event("e2", EventType::Modified)).unwrap();
        state.enqueue_event(sample_event("e3", EventType::Modified)).unwrap();

        assert_eq!(state.dequeue_event().unwrap().unwrap().id.0, "e1");
        assert_eq!(state.dequeue_event().unwrap().unwrap().id.0, "e2");
        assert_eq!(state.dequeue_event().unwrap().unwrap().id.0, "e3");
        assert!(state.dequeue_event().unwrap().is_none());
    }

    #[test]
    fn chain_repair_stops_at_directory_selected_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let collaborator = RecordingCollaborator::new();
        let state = PersistentState::open(path, &collaborator);

        state.enqueue_event(sample_event("e1", EventType::Modified)).unwrap();
        state.enqueue_event(sample_event("e2", EventType::Modified)).unwrap();
        state.enqueue_event(sample_event("e3", EventType::DirectorySelected)).unwrap();
        state.enqueue_event(sample_event("e4", EventType::Modified)).unwrap();

        let new_anchor = HexHash(fim_merkle::hash_bytes(b"new-root"));
        state.repair_chain(Some(new_anchor)).unwrap();
        state.dequeue_event().unwrap(); // drop e1, the just-acknowledged head

        let remaining: Vec<Event> = std::iter::from_fn(|| state.dequeue_event().unwrap()).collect();
        assert_eq!(remaining[0].id.0, "e2");
        assert_eq!(remaining[0].last_valid_hash, Some(new_anchor));
        assert_eq!(remaining[1].id.0, "e3");
        assert_ne!(remaining[1].last_valid_hash, Some(new_anchor));
        assert_eq!(remaining[2].id.0, "e4");
        assert_ne!(remaining[2].last_valid_hash, Some(new_anchor));
    }

    /// A delete-to-null-tree acknowledgement (S4) repairs subsequent queued
    /// events to a `None` anchor just as unconditionally as to any other
    /// root — this must not be skipped just because there is no new hash
    /// to rewrite to.
    #[test]
    fn chain_repair_rewrites_to_null_anchor_on_delete_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let collaborator = RecordingCollaborator::new();
        let state = PersistentState::open(path, &collaborator);

        state.enqueue_event(sample_event("e1", EventType::Deleted)).unwrap();
        state.enqueue_event(sample_event("e2", EventType::Created)).unwrap();

        state.repair_chain(None).unwrap();
        state.dequeue_event().unwrap(); // drop e1, the just-acknowledged head

        let remaining = state.dequeue_event().unwrap().unwrap();
        assert_eq!(remaining.id.0, "e2");
        assert_eq!(remaining.last_valid_hash, None);
    }

    #[test]
    fn admin_credentials_compare_only_never_hash_a_fresh_password() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let collaborator = RecordingCollaborator::new();
        let state = PersistentState::open(path, &collaborator);

        let hash = bcrypt::hash("correct horse", bcrypt::DEFAULT_COST).unwrap();
        state.set_admin_credentials("admin".to_string(), hash).unwrap();

        assert!(state.verify_admin_credentials("admin", "correct horse"));
        assert!(!state.verify_admin_credentials("admin", "wrong password"));
        assert!(!state.verify_admin_credentials("nobody", "correct horse"));
    }

    #[test]
    fn deregistration_flag_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let collaborator = RecordingCollaborator::new();
        let state = PersistentState::open(path, &collaborator);

        assert!(!state.is_deregistered());
        state.set_deregistered(true).unwrap();
        assert!(state.is_deregistered());
    }
}
