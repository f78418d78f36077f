//! Daemon orchestrator (C7): startup sequence, main loop, heartbeat timer,
//! and the directory-change protocol (spec §4.7). Grounded on
//! `original_source/src/daemon/background.py::run_daemon_background` (the
//! initial-connect retry loop, pending-queue kick on startup, main-loop
//! tick, heartbeat interval) and `src/gui/client_gui.py`'s
//! `change_directory`/`prompt_directory_selection`.

use crate::client::ApiClient;
use crate::config::AgentConfig;
use crate::connection::ConnectionManager;
use crate::event_handler::{scan_directory, EventHandler};
use crate::queue_processor::QueueProcessor;
use crate::watcher::{self, FsWatcher};
use fim_merkle::MerkleTree;
use fim_protocol::{Collaborator, CollaboratorMessage, ControlSurface, EventType, HexHash};
use fim_state::PersistentState;
use notify::RecommendedWatcher;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

pub struct Orchestrator {
    config: AgentConfig,
    state: Arc<PersistentState>,
    connection: Arc<ConnectionManager>,
    queue_processor: Arc<QueueProcessor>,
    event_handler: Arc<EventHandler>,
    control_surface: Arc<dyn ControlSurface>,
    collaborator: Arc<dyn Collaborator>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    watch_dir: Mutex<PathBuf>,
}

impl Orchestrator {
    pub fn startup(
        config: AgentConfig,
        control_surface: Arc<dyn ControlSurface>,
        collaborator: Arc<dyn Collaborator>,
    ) -> Arc<Orchestrator> {
        std::fs::create_dir_all(&config.watch_dir).ok();
        std::fs::create_dir_all(&config.state_dir).ok();

        let state = Arc::new(PersistentState::open(config.state_path(), collaborator.as_ref()));
        if state.watch_directory().is_none() {
            state.set_watch_directory(config.watch_dir.clone()).ok();
        }

        let files = scan_directory(&config.watch_dir, collaborator.as_ref());
        let (tree, files) = MerkleTree::build(files);

        let client = Arc::new(ApiClient::new(config.server_url.clone()));
        let connection = Arc::new(ConnectionManager::new(
            config.server_url.clone(),
            config.identity(),
            Arc::clone(&state),
            Arc::clone(&collaborator),
            config.backoff_base(),
            config.backoff_cap(),
        ));
        let queue_processor =
            Arc::new(QueueProcessor::new(client, Arc::clone(&state), Arc::clone(&connection), Arc::clone(&collaborator)));

        let qp_for_callback = Arc::clone(&queue_processor);
        let on_enqueued: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
            let qp = Arc::clone(&qp_for_callback);
            thread::spawn(move || qp.poke());
        });

        let event_handler = Arc::new(EventHandler::new(
            config.host_id.clone(),
            tree,
            files,
            Arc::clone(&state),
            Arc::clone(&collaborator),
            on_enqueued,
        ));

        let orchestrator = Arc::new(Orchestrator {
            config: config.clone(),
            state,
            connection,
            queue_processor,
            event_handler,
            control_surface,
            collaborator,
            watcher: Mutex::new(None),
            watch_dir: Mutex::new(config.watch_dir.clone()),
        });

        orchestrator.start_watcher(&config.watch_dir);
        orchestrator.initial_connect();

        if orchestrator.connection.is_connected() && orchestrator.state.queue_len() > 0 {
            orchestrator.queue_processor.poke();
        }

        orchestrator
    }

    fn start_watcher(&self, dir: &std::path::Path) {
        match watcher::watch(dir) {
            Ok(FsWatcher { guard, events }) => {
                *self.watcher.lock() = Some(guard);
                let event_handler = Arc::clone(&self.event_handler);
                thread::spawn(move || {
                    for (path, kind) in events {
                        event_handler.handle_raw_event(path, kind);
                    }
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to start filesystem watcher");
            }
        }
    }

    /// Startup retry loop (spec §4.7 step 5), bounded to
    /// `initial_connect_max_attempts` with the inter-attempt sleep capped
    /// at `initial_connect_sleep_cap` rather than the steady-state 600s
    /// backoff cap (supplemented from `background.py`'s `max_attempts =
    /// 10`).
    fn initial_connect(&self) {
        for attempt in 1..=self.config.initial_connect_max_attempts {
            if self.connection.attempt_connection() {
                return;
            }
            if attempt == self.config.initial_connect_max_attempts {
                break;
            }
            let sleep_for = self.connection.current_backoff().min(self.config.initial_connect_sleep_cap());
            thread::sleep(sleep_for);
        }
    }

    /// Runs the main loop on the calling thread until a stop signal or
    /// deregistration is observed (spec §4.7's main loop).
    pub fn run(self: &Arc<Self>) {
        let mut last_heartbeat = Instant::now() - self.config.heartbeat_interval();
        loop {
            if self.control_surface.request_stop() {
                break;
            }
            if self.state.is_deregistered() {
                self.collaborator.notify(CollaboratorMessage::Deregistered {
                    message: "host is no longer registered; halting".to_string(),
                });
                break;
            }

            if !self.connection.is_connected() {
                if self.connection.attempt_connection() {
                    self.queue_processor.poke();
                }
            }

            if last_heartbeat.elapsed() >= self.config.heartbeat_interval() {
                self.connection.send_heartbeat(self.event_handler.tracked_file_count(), self.state.last_valid_hash());
                last_heartbeat = Instant::now();
            }

            thread::sleep(self.config.main_loop_tick());
        }

        self.stop_watcher();
    }

    /// Entry point a control surface calls to recover from deregistration
    /// (spec §7: "core halts its pipeline until the external control
    /// surface clears the flag via reregister"). `run`'s loop still has to
    /// observe the cleared flag on its next iteration — calling this after
    /// `run` has already returned requires the caller to invoke `run`
    /// again.
    pub fn reregister(&self, username: &str, password: &str) -> bool {
        self.connection.reregister(username, password)
    }

    fn stop_watcher(&self) {
        *self.watcher.lock() = None;
    }

    /// Directory-change protocol (spec §4.7): unselect the old directory,
    /// stop the watcher, compute the new directory's initial root, select
    /// it, set the new chain anchor, restart the watcher.
    pub fn change_directory(&self, new_dir: PathBuf) {
        let old_dir = self.watch_dir.lock().clone();
        let anchor = self.state.last_valid_hash();
        self.event_handler.enqueue_lifecycle(
            EventType::DirectoryUnselected,
            old_dir,
            anchor.map(HexHash::into),
            anchor.map(HexHash::into),
        );

        self.stop_watcher();

        let files = scan_directory(&new_dir, self.collaborator.as_ref());
        let (tree, files) = MerkleTree::build(files);
        let initial_root = tree.as_ref().map(|t| t.root());

        self.event_handler
            .enqueue_lifecycle(EventType::DirectorySelected, new_dir.clone(), initial_root, initial_root);

        if let Err(e) = self.state.update_last_valid(initial_root.map(HexHash::from), None) {
            tracing::error!(error = %e, "failed to persist new chain anchor after directory change");
        }
        self.event_handler.reset_tree(tree, files);

        *self.watch_dir.lock() = new_dir.clone();
        if let Err(e) = self.state.set_watch_directory(new_dir.clone()) {
            tracing::error!(error = %e, "failed to persist new watch directory");
        }
        self.start_watcher(&new_dir);
        self.control_surface.set_watch_directory(new_dir);

        self.queue_processor.poke();
    }
}
