//! Wire types shared by the connection manager (C4) and queue processor
//! (C6): the event record, the server's eight-endpoint protocol, and the
//! callback contracts that separate the core from its host.

mod callback;
mod event;
mod hashhex;
mod http;

pub use callback::{Collaborator, CollaboratorMessage, ControlSurface, Severity};
pub use event::{Event, EventId, EventType, WireMerkleProof};
pub use hashhex::{HexHash, HexHashParseError};
pub use http::{
    body_indicates_not_registered, AcknowledgeOutcome, AcknowledgeRequest, HeartbeatOutcome,
    HeartbeatRequest, RegisterRequest, RegisterResponse, ReportOutcome, ReportRequest,
    ReportResponse, ReregisterRequest, ReregisterResponse, UninstallRequest, VerifyAdminRequest,
    VerifyOutcome,
};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn hex_hash_round_trips() {
        let h = fim_merkle::hash_bytes(b"A");
        let wire = HexHash::from(h);
        let s = wire.to_string();
        let parsed: HexHash = s.parse().unwrap();
        assert_eq!(parsed.0, h);
    }

    #[test]
    fn event_serializes_with_snake_case_type_tag() {
        let event = Event {
            id: EventId::from_watcher("host-1", 0, 0),
            host_id: "host-1".to_string(),
            event_type: EventType::DirectorySelected,
            path: "/watched".into(),
            old_hash: None,
            new_hash: None,
            root_hash: None,
            merkle_proof: None,
            last_valid_hash: None,
            queued_at: Utc::now(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "directory_selected");
    }

    #[test]
    fn not_registered_detection_is_case_insensitive() {
        let body = serde_json::json!({"error": "Client Not Registered"});
        assert!(body_indicates_not_registered(&body));
        let other = serde_json::json!({"error": "token expired"});
        assert!(!body_indicates_not_registered(&other));
    }

    #[test]
    fn not_registered_detection_reads_error_key_not_reason() {
        let body = serde_json::json!({"reason": "not registered"});
        assert!(!body_indicates_not_registered(&body));
    }
}
