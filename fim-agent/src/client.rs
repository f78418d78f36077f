//! Typed boundary over the server's eight-endpoint protocol (spec §6),
//! each call collapsed to one of `fim-protocol`'s outcome enums rather
//! than callers inspecting status codes and bodies directly. Grounded on
//! `bpi-oracle-node::communication::CommunicationManager`'s shape (config
//! held by value, one client, `tracing` at every transition), restated
//! with `reqwest::blocking` in place of the teacher's WebSocket/tokio
//! stack per the thread-based concurrency model (spec §5).

use crate::error::AgentError;
use fim_protocol::{
    body_indicates_not_registered, AcknowledgeOutcome, AcknowledgeRequest, Event, HeartbeatOutcome,
    HeartbeatRequest, RegisterRequest, RegisterResponse, ReportOutcome, ReportResponse,
    ReregisterRequest, ReregisterResponse, UninstallRequest, VerifyAdminRequest, VerifyOutcome,
};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use std::time::Duration;

pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: String) -> Self {
        ApiClient { http: Client::new(), base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }

    pub fn register(&self, req: &RegisterRequest) -> Result<Option<RegisterResponse>, AgentError> {
        let resp = self
            .http
            .post(self.url("/api/clients/register"))
            .timeout(Duration::from_secs(10))
            .json(req)
            .send()?;
        if resp.status() == StatusCode::OK {
            Ok(Some(resp.json()?))
        } else {
            tracing::warn!(status = %resp.status(), "registration failed");
            Ok(None)
        }
    }

    pub fn verify(&self, token: &str) -> VerifyOutcome {
        let result = self
            .http
            .post(self.url("/api/clients/verify"))
            .timeout(Duration::from_secs(5))
            .bearer_auth(token)
            .send();
        match result {
            Ok(resp) if resp.status() == StatusCode::OK => VerifyOutcome::Ok,
            Ok(resp) if resp.status() == StatusCode::UNAUTHORIZED => VerifyOutcome::Unauthorized,
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "unexpected verify response");
                VerifyOutcome::Failure
            }
            Err(e) => {
                tracing::warn!(error = %e, "verify call failed");
                VerifyOutcome::Failure
            }
        }
    }

    pub fn heartbeat(&self, token: &str, req: &HeartbeatRequest) -> HeartbeatOutcome {
        let result = self
            .http
            .post(self.url("/api/clients/heartbeat"))
            .timeout(Duration::from_secs(5))
            .bearer_auth(token)
            .json(req)
            .send();
        match result {
            Ok(resp) if resp.status() == StatusCode::OK => HeartbeatOutcome::Ok,
            Ok(resp) if resp.status() == StatusCode::UNAUTHORIZED => {
                let not_registered = resp
                    .json::<serde_json::Value>()
                    .map(|body| body_indicates_not_registered(&body))
                    .unwrap_or(false);
                HeartbeatOutcome::Unauthorized { not_registered }
            }
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "unexpected heartbeat response");
                HeartbeatOutcome::Failure
            }
            Err(e) => {
                tracing::warn!(error = %e, "heartbeat call failed");
                HeartbeatOutcome::Failure
            }
        }
    }

    pub fn report(&self, token: &str, event: &Event) -> ReportOutcome {
        let result = self
            .http
            .post(self.url("/api/events/report"))
            .timeout(Duration::from_secs(10))
            .bearer_auth(token)
            .json(event)
            .send();
        match result {
            Ok(resp) if resp.status() == StatusCode::OK => match resp.json::<ReportResponse>() {
                Ok(ReportResponse { event_id, validation }) => {
                    ReportOutcome::Accepted { event_id, validation }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "malformed report response body");
                    ReportOutcome::Failure
                }
            },
            Ok(resp) if resp.status() == StatusCode::BAD_REQUEST => ReportOutcome::Rejected,
            Ok(resp) if resp.status() == StatusCode::UNAUTHORIZED => {
                let not_registered = resp
                    .json::<serde_json::Value>()
                    .map(|body| body_indicates_not_registered(&body))
                    .unwrap_or(false);
                ReportOutcome::Unauthorized { not_registered }
            }
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "unexpected report response");
                ReportOutcome::Failure
            }
            Err(e) => {
                tracing::warn!(error = %e, "report call failed");
                ReportOutcome::Failure
            }
        }
    }

    pub fn acknowledge(&self, token: &str, req: &AcknowledgeRequest) -> AcknowledgeOutcome {
        let result = self
            .http
            .post(self.url("/api/events/acknowledge"))
            .timeout(Duration::from_secs(5))
            .bearer_auth(token)
            .json(req)
            .send();
        match result {
            Ok(resp) if resp.status() == StatusCode::OK => AcknowledgeOutcome::Accepted,
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "acknowledge not accepted, will retry");
                AcknowledgeOutcome::Retry
            }
            Err(e) => {
                tracing::warn!(error = %e, "acknowledge call failed, will retry");
                AcknowledgeOutcome::Retry
            }
        }
    }

    pub fn reregister(&self, req: &ReregisterRequest) -> Result<Option<ReregisterResponse>, AgentError> {
        let resp = self
            .http
            .post(self.url("/api/clients/reregister"))
            .timeout(Duration::from_secs(10))
            .json(req)
            .send()?;
        Ok(if resp.status() == StatusCode::OK { Some(resp.json()?) } else { None })
    }

    pub fn uninstall(&self, req: &UninstallRequest) -> Result<bool, AgentError> {
        let resp = self
            .http
            .post(self.url("/api/clients/uninstall"))
            .timeout(Duration::from_secs(10))
            .json(req)
            .send()?;
        Ok(resp.status() == StatusCode::OK)
    }

    pub fn verify_admin(&self, req: &VerifyAdminRequest) -> Result<bool, AgentError> {
        let resp = self
            .http
            .post(self.url("/api/auth/verify-admin"))
            .timeout(Duration::from_secs(5))
            .json(req)
            .send()?;
        Ok(resp.status() == StatusCode::OK)
    }
}
