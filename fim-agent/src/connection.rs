//! Connection manager (C4): the {Disconnected, Connected} state machine,
//! exponential backoff, and token lifecycle (spec §4.4). Grounded on
//! `original_source/src/core/connection.py::ConnectionManager`, restated
//! with `fim_protocol`'s typed outcomes and `reqwest::blocking` in the
//! style of `bpi-oracle-node::communication::CommunicationManager` (struct
//! holding config + shared state, `tracing` at each transition).

use crate::client::ApiClient;
use crate::config::HostIdentity;
use chrono::Utc;
use fim_protocol::{
    Collaborator, CollaboratorMessage, HeartbeatOutcome, HeartbeatRequest, HexHash,
    RegisterRequest, ReregisterRequest, Severity, VerifyOutcome,
};
use fim_state::PersistentState;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct ConnectionManager {
    client: ApiClient,
    state: Arc<PersistentState>,
    collaborator: Arc<dyn Collaborator>,
    identity: HostIdentity,
    connected: AtomicBool,
    backoff: Mutex<Duration>,
    backoff_base: Duration,
    backoff_cap: Duration,
    /// Grounded on `original_source/src/core/connection.py::ConnectionManager.last_attempt`:
    /// gates `attempt_connection` so steady-state callers (the orchestrator's
    /// main loop) back off toward `backoff_cap` instead of retrying every
    /// tick (spec §4.4).
    last_attempt: Mutex<Option<Instant>>,
}

impl ConnectionManager {
    pub fn new(
        server_url: String,
        identity: HostIdentity,
        state: Arc<PersistentState>,
        collaborator: Arc<dyn Collaborator>,
        backoff_base: Duration,
        backoff_cap: Duration,
    ) -> Self {
        ConnectionManager {
            client: ApiClient::new(server_url),
            state,
            collaborator,
            identity,
            connected: AtomicBool::new(false),
            backoff: Mutex::new(backoff_base),
            backoff_base,
            backoff_cap,
            last_attempt: Mutex::new(None),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn current_backoff(&self) -> Duration {
        *self.backoff.lock()
    }

    /// Success iff a present token verifies, or a fresh registration
    /// succeeds. Never re-registers silently after an explicit
    /// deregistration signal — callers must check `PersistentState::is_deregistered`
    /// before calling this.
    ///
    /// Gated on elapsed time since the last attempt vs. the current backoff
    /// (`original_source/src/core/connection.py`:
    /// `current_time - self.last_attempt < self.current_backoff`), so a
    /// caller that polls every main-loop tick still backs off toward
    /// `backoff_cap` instead of retrying every tick.
    pub fn attempt_connection(&self) -> bool {
        {
            let mut last_attempt = self.last_attempt.lock();
            if let Some(previous) = *last_attempt {
                if previous.elapsed() < self.current_backoff() {
                    return false;
                }
            }
            *last_attempt = Some(Instant::now());
        }
        if let Some((token, _expires)) = self.state.token() {
            if self.client.verify(&token) == VerifyOutcome::Ok {
                self.on_connected();
                return true;
            }
        }
        if self.register() {
            self.on_connected();
            true
        } else {
            self.backoff_increase();
            false
        }
    }

    fn register(&self) -> bool {
        let req = RegisterRequest {
            client_id: self.identity.host_id.clone(),
            hardware_info: self.identity.hardware_info.clone(),
            baseline_id: self.identity.baseline_id,
            platform: self.identity.platform.clone(),
        };
        let response = match self.client.register(&req) {
            Ok(Some(response)) => response,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(error = %e, "registration request failed");
                return false;
            }
        };
        let expires = Utc::now() + chrono::Duration::seconds(response.expires_in as i64);
        if let Err(e) = self.state.set_token(response.token, expires) {
            tracing::error!(error = %e, "failed to persist registration token");
            return false;
        }
        true
    }

    pub fn send_heartbeat(&self, file_count: usize, current_root_hash: Option<HexHash>) {
        let Some((token, _expires)) = self.state.token() else {
            self.mark_disconnected();
            return;
        };
        let outcome = self.client.heartbeat(&token, &HeartbeatRequest { file_count, current_root_hash });
        match outcome {
            HeartbeatOutcome::Ok => {
                self.collaborator.notify(CollaboratorMessage::Log {
                    timestamp: Utc::now(),
                    message: "heartbeat ok".to_string(),
                    severity: Severity::Info,
                });
            }
            HeartbeatOutcome::Unauthorized { not_registered } => {
                self.handle_unauthorized(not_registered);
            }
            HeartbeatOutcome::Failure => {
                self.collaborator.notify(CollaboratorMessage::Log {
                    timestamp: Utc::now(),
                    message: "heartbeat failed".to_string(),
                    severity: Severity::Warning,
                });
                self.mark_disconnected();
            }
        }
    }

    /// Clears the token on any 401; additionally sets the deregistration
    /// flag and surfaces `removal_detected` when the body says "not
    /// registered" (spec §4.4, §7) — this manager never re-registers
    /// silently in that case.
    pub fn handle_unauthorized(&self, not_registered: bool) {
        if let Err(e) = self.state.clear_token() {
            tracing::error!(error = %e, "failed to clear token");
        }
        if not_registered {
            if let Err(e) = self.state.set_deregistered(true) {
                tracing::error!(error = %e, "failed to persist deregistration flag");
            }
            self.collaborator.notify(CollaboratorMessage::RemovalDetected);
        }
        self.mark_disconnected();
    }

    /// Drives the deregistration-recovery path spec §7 describes: the core
    /// halts its pipeline on a "not registered" 401 and stays halted until
    /// something calls this with admin credentials (`/api/clients/reregister`,
    /// spec §6). On success this persists the fresh token, clears the
    /// deregistered flag, and marks the manager connected immediately —
    /// the reregister response is already a verified token, unlike a bare
    /// `register` call, so there is no need to wait for the next `verify`.
    pub fn reregister(&self, username: &str, password: &str) -> bool {
        let req = ReregisterRequest {
            client_id: self.identity.host_id.clone(),
            username: username.to_string(),
            password: password.to_string(),
        };
        let response = match self.client.reregister(&req) {
            Ok(Some(response)) => response,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(error = %e, "reregistration request failed");
                return false;
            }
        };
        let expires = Utc::now() + chrono::Duration::seconds(response.expires_in as i64);
        if let Err(e) = self.state.set_token(response.token, expires) {
            tracing::error!(error = %e, "failed to persist reregistration token");
            return false;
        }
        if let Err(e) = self.state.set_deregistered(false) {
            tracing::error!(error = %e, "failed to clear deregistration flag");
            return false;
        }
        self.on_connected();
        true
    }

    fn on_connected(&self) {
        *self.backoff.lock() = self.backoff_base;
        if !self.connected.swap(true, Ordering::SeqCst) {
            self.collaborator.notify(CollaboratorMessage::Status { connected: true });
        }
    }

    pub fn mark_disconnected(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.collaborator.notify(CollaboratorMessage::Status { connected: false });
        }
    }

    fn backoff_increase(&self) {
        let mut backoff = self.backoff.lock();
        *backoff = (*backoff * 2).min(self.backoff_cap);
    }
}
