//! `aegis-watch` — per-file OS-level watchers with debounce (spec §4.H).
//!
//! Four files are watched over the lifetime of the process, each wired to a
//! distinct reaction:
//!
//! | File                     | Reaction                                           |
//! |--------------------------|-----------------------------------------------------|
//! | MCP-server spec file     | `Supervisor::reload_from_spec`                      |
//! | Identity file            | rebuild identity cache                              |
//! | Installed-skills list    | reload skills, rebuild system-prompt skill section  |
//! | Schedule file            | `Scheduler` reload (cancel + respawn drivers)        |
//!
//! [`watcher::watch_file`] is the low-level primitive; [`WatchSet`] is a
//! small registry that owns the four [`watcher::WatchHandle`]s for as long
//! as the process runs.

pub mod error;
pub mod watcher;

pub use error::{Result, WatchError};
pub use watcher::{watch_file, WatchCallback, WatchHandle, DEFAULT_DEBOUNCE};

/// Owns the watch handles for every file this process watches so they stay
/// alive (dropping a `WatchHandle` tears down its task and OS watch).
#[derive(Default)]
pub struct WatchSet {
    handles: Vec<WatchHandle>,
}

impl WatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, handle: WatchHandle) {
        self.handles.push(handle);
    }

    pub fn watch(&mut self, path: impl Into<std::path::PathBuf>, callback: WatchCallback) {
        self.add(watch_file(path, DEFAULT_DEBOUNCE, callback));
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
