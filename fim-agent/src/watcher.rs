//! Thin wrapper over `notify`'s recommended watcher, configured for
//! recursive create/modify/delete notifications on non-directory entries
//! (spec §4.7 step 4). The teacher has no filesystem-watching component of
//! its own; this module's dependency is sourced from the wider example
//! pack's filesystem-watching tools instead.

use crate::event_handler::RawKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};

pub struct FsWatcher {
    /// Held by the caller to keep the underlying OS watch alive; dropping
    /// it stops delivery and, transitively, ends the bridging threads
    /// below.
    pub guard: RecommendedWatcher,
    pub events: Receiver<(PathBuf, RawKind)>,
}

fn classify_kind(kind: &EventKind) -> Option<RawKind> {
    match kind {
        EventKind::Create(_) => Some(RawKind::Create),
        EventKind::Modify(_) => Some(RawKind::Modify),
        EventKind::Remove(_) => Some(RawKind::Delete),
        _ => None,
    }
}

pub fn watch(dir: &Path) -> notify::Result<FsWatcher> {
    let (raw_tx, raw_rx) = channel::<notify::Result<Event>>();
    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = raw_tx.send(res);
    })?;
    watcher.watch(dir, RecursiveMode::Recursive)?;

    let (tx, rx) = channel::<(PathBuf, RawKind)>();
    std::thread::spawn(move || {
        for res in raw_rx {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(error = %e, "filesystem watch error");
                    continue;
                }
            };
            let Some(kind) = classify_kind(&event.kind) else { continue };
            for path in event.paths {
                if kind != RawKind::Delete && path.is_dir() {
                    continue;
                }
                if tx.send((path, kind)).is_err() {
                    return;
                }
            }
        }
    });

    Ok(FsWatcher { guard: watcher, events: rx })
}
