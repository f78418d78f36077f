//! Host-side file integrity monitoring daemon.
//!
//! Five collaborating components (spec §4): the filesystem [`watcher`],
//! the [`connection`] manager (register/verify/heartbeat, backoff), the
//! [`event_handler`] (classify, mutate the Merkle tree, enqueue), the
//! [`queue_processor`] (report→acknowledge, chain repair), and the
//! [`orchestrator`] tying them together into the daemon's startup sequence
//! and main loop. `client` is the typed HTTP boundary all of the above
//! share; `config` is the CLI/environment surface.

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod event_handler;
pub mod orchestrator;
pub mod queue_processor;
pub mod watcher;

pub use config::{AgentConfig, HostIdentity};
pub use error::AgentError;
pub use orchestrator::Orchestrator;
