//! The event record (spec §3) and the ordered queue it lives in.

use crate::hashhex::HexHash;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Stable event identifier. Watcher-driven events use `host_id ⊕ counter ⊕
/// wall-clock-ms`; directory-lifecycle events raised by a control surface
/// use `host_id ⊕ "gui" ⊕ short uuid`. Both are the same conceptual id, just
/// minted by two different callers, so they share one type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    pub fn from_watcher(host_id: &str, counter: u64, wall_clock_ms: u128) -> Self {
        EventId(format!("{host_id}-{counter}-{wall_clock_ms}"))
    }

    pub fn from_control_surface(host_id: &str, short_uuid: &str) -> Self {
        EventId(format!("{host_id}-gui-{short_uuid}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Created,
    Modified,
    Deleted,
    DirectorySelected,
    DirectoryUnselected,
}

impl EventType {
    pub fn is_lifecycle(self) -> bool {
        matches!(self, EventType::DirectorySelected | EventType::DirectoryUnselected)
    }
}

/// Sibling digests from leaf level upward, plus the root they prove
/// inclusion against. Omitted on the wire for lifecycle events and
/// pure-delete-last events (spec §3, §9c).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMerkleProof {
    pub index: usize,
    pub siblings: Vec<HexHash>,
    pub root: HexHash,
}

impl From<fim_merkle::MerkleProof> for WireMerkleProof {
    fn from(p: fim_merkle::MerkleProof) -> Self {
        WireMerkleProof {
            index: p.index,
            siblings: p.siblings.into_iter().map(HexHash::from).collect(),
            root: HexHash::from(p.root),
        }
    }
}

/// A single attested state transition, as persisted in the queue and as
/// sent to `/api/events/report`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub host_id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub path: PathBuf,
    pub old_hash: Option<HexHash>,
    pub new_hash: Option<HexHash>,
    /// Post-event local root. `None` when the tree became empty (I3, S4).
    pub root_hash: Option<HexHash>,
    pub merkle_proof: Option<WireMerkleProof>,
    /// The anchor this event was chained to at enqueue time. Rewritten
    /// in place by chain repair (§4.6) until this event reaches the head
    /// and is acknowledged.
    pub last_valid_hash: Option<HexHash>,
    pub queued_at: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}
