//! The two seams between the attestation pipeline and everything spec §1
//! calls out of scope: the collaborator callback (core → host UI/logs) and
//! the control surface (host → core).

use chrono::{DateTime, Utc};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CollaboratorMessage {
    Log {
        timestamp: DateTime<Utc>,
        message: String,
        severity: Severity,
    },
    Status {
        connected: bool,
    },
    Pending {
        count: usize,
    },
    RemovalDetected,
    Deregistered {
        message: String,
    },
}

/// Sink for every user-visible transition the core emits (spec §6, §7's
/// surfacing policy). Implemented by whatever UI or log-rotation layer the
/// host embeds this crate in; this crate only ever calls `notify`.
pub trait Collaborator: Send + Sync {
    fn notify(&self, message: CollaboratorMessage);
}

/// The handful of things the core calls *into* the host for, rather than
/// deciding itself (spec §1's out-of-scope list, §6): directory changes
/// originate externally, stop requests are polled from the orchestrator's
/// main loop, and admin credential verification is the host's
/// locally-cached-then-server-fallback decision procedure, not the core's.
pub trait ControlSurface: Send + Sync {
    fn set_watch_directory(&self, path: PathBuf);
    fn request_stop(&self) -> bool;
    fn admin_verify(&self, username: &str, password: &str) -> bool;
}
