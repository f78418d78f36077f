//! Binary entry point. Wires a tracing-backed [`Collaborator`] and a
//! ctrl-c-driven [`ControlSurface`] around [`Orchestrator::startup`]/`run`,
//! mirroring `bpi-oracle-node`'s `src/bin/oracle_node_demo.rs` (init
//! tracing, build a config, start the component, run it to completion).
//! Everything this binary supplies is explicitly out of this crate's core
//! scope (spec §1): it's the minimal host a standalone deployment needs,
//! not a GUI or service-manager integration.

use clap::Parser;
use fim_agent::client::ApiClient;
use fim_agent::{AgentConfig, Orchestrator};
use fim_protocol::{Collaborator, CollaboratorMessage, ControlSurface, Severity, VerifyAdminRequest};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct TracingCollaborator;

impl Collaborator for TracingCollaborator {
    fn notify(&self, message: CollaboratorMessage) {
        match message {
            CollaboratorMessage::Log { message, severity, .. } => match severity {
                Severity::Info => tracing::info!("{message}"),
                Severity::Success => tracing::info!(outcome = "success", "{message}"),
                Severity::Warning => tracing::warn!("{message}"),
                Severity::Error => tracing::error!("{message}"),
            },
            CollaboratorMessage::Status { connected } => {
                tracing::info!(connected, "connection status changed");
            }
            CollaboratorMessage::Pending { count } => {
                tracing::debug!(pending = count, "queue depth changed");
            }
            CollaboratorMessage::RemovalDetected => {
                tracing::warn!("server reports this host is no longer registered");
            }
            CollaboratorMessage::Deregistered { message } => {
                tracing::warn!("{message}");
            }
        }
    }
}

/// `admin_verify` here calls straight through to the server, with no local
/// bcrypt cache — the locally-cached-then-server-fallback decision
/// procedure (spec §4.3's Resolved Open Question) belongs to a richer host
/// (a GUI, say) than this bare CLI binary provides.
struct CliControlSurface {
    stop: Arc<AtomicBool>,
    api: ApiClient,
}

impl ControlSurface for CliControlSurface {
    fn set_watch_directory(&self, path: PathBuf) {
        tracing::info!(path = %path.display(), "watch directory changed");
    }

    fn request_stop(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn admin_verify(&self, username: &str, password: &str) -> bool {
        self.api
            .verify_admin(&VerifyAdminRequest { username: username.to_string(), password: password.to_string() })
            .unwrap_or(false)
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = AgentConfig::parse();

    let stop = Arc::new(AtomicBool::new(false));
    let stop_for_handler = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        tracing::info!("stop requested, finishing current cycle");
        stop_for_handler.store(true, Ordering::SeqCst);
    })?;

    let control_surface = Arc::new(CliControlSurface {
        stop,
        api: ApiClient::new(config.server_url.clone()),
    });
    let collaborator = Arc::new(TracingCollaborator);

    let orchestrator = Orchestrator::startup(config, control_surface, collaborator);
    orchestrator.run();

    Ok(())
}
