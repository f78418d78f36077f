//! Request/response shapes for the eight server endpoints (spec §6), plus
//! typed outcome enums that the connection manager and queue processor
//! collapse each HTTP status code into, replacing the original's ad hoc
//! dict/status inspection.

use crate::event::Event;
use crate::hashhex::HexHash;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub client_id: String,
    pub hardware_info: serde_json::Value,
    /// Sent as an integer, matching `original_source/src/core/config.py`'s
    /// `self.baseline_id = 1` / `connection.py`'s register payload — not a
    /// string.
    pub baseline_id: u64,
    pub platform: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterResponse {
    pub token: String,
    pub expires_in: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeartbeatRequest {
    pub file_count: usize,
    pub current_root_hash: Option<HexHash>,
}

/// The report body is the event record itself.
pub type ReportRequest = Event;

#[derive(Debug, Clone, Deserialize)]
pub struct ReportResponse {
    pub event_id: String,
    /// Opaque server receipt (spec §3: "last_server_validation (opaque
    /// receipt)") — this crate never inspects its shape, only stores and
    /// echoes it back on acknowledge.
    pub validation: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct AcknowledgeRequest {
    pub event_id: String,
    pub validation_received: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReregisterRequest {
    pub client_id: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReregisterResponse {
    pub token: String,
    pub expires_in: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UninstallRequest {
    pub client_id: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyAdminRequest {
    pub username: String,
    pub password: String,
}

/// Bodies returned alongside a 401 carry a free-form `error` string (the
/// key the server actually uses —
/// `original_source/src/core/event_handler.py:131,268`:
/// `data.get('error', '').lower()`); the only one this system distinguishes
/// is the "not registered" substring that triggers deregistration (spec
/// §4.4, §7).
pub fn body_indicates_not_registered(body: &serde_json::Value) -> bool {
    body.get("error")
        .and_then(|v| v.as_str())
        .map(|s| s.to_ascii_lowercase().contains("not registered"))
        .unwrap_or(false)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    Accepted { event_id: String, validation: serde_json::Value },
    Rejected,
    Unauthorized { not_registered: bool },
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcknowledgeOutcome {
    Accepted,
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    Ok,
    Unauthorized { not_registered: bool },
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Ok,
    Unauthorized,
    Failure,
}
