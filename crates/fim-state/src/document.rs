//! The single JSON document this store owns (spec §3: "Persistent state").

use chrono::{DateTime, Utc};
use fim_protocol::{Event, HexHash};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminCredentials {
    pub username: String,
    pub bcrypt_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDocument {
    pub watch_directory: Option<PathBuf>,
    pub last_valid_hash: Option<HexHash>,
    pub last_server_validation: Option<serde_json::Value>,
    pub event_queue: VecDeque<Event>,
    pub jwt_token: Option<String>,
    pub token_expires: Option<DateTime<Utc>>,
    pub admin_credentials: Option<AdminCredentials>,
    pub is_deregistered: bool,
}

impl Default for StateDocument {
    fn default() -> Self {
        StateDocument {
            watch_directory: None,
            last_valid_hash: None,
            last_server_validation: None,
            event_queue: VecDeque::new(),
            jwt_token: None,
            token_expires: None,
            admin_credentials: None,
            is_deregistered: false,
        }
    }
}
