//! Record of configuration fragments touched since the last reload
//!
//! The watcher feeds this set; the state machine consults it to decide
//! whether a runlevel change must also reload the configuration, and the
//! loader drops it after every successful reload.

use std::collections::BTreeSet;
use std::path::Path;

/// Set of fragment basenames whose on-disk state changed since last reload.
#[derive(Debug, Default)]
pub struct ChangeSet {
    names: BTreeSet<String>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one filesystem event for `name`. A delete or move-out erases
    /// the entry; anything else inserts it. Duplicates collapse.
    pub fn record(&mut self, name: &str, gone: bool) {
        if gone {
            self.names.remove(name);
            return;
        }
        if !self.names.insert(name.to_string()) {
            log::debug!("Change already registered for {} ...", name);
        }
    }

    /// Check whether `path` changed since last reload. Only the basename of
    /// `path` matters.
    pub fn has(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        self.names.contains(name)
    }

    pub fn any(&self) -> bool {
        !self.names.is_empty()
    }

    pub fn drop_all(&mut self) {
        self.names.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(|s| s.as_str())
    }
}
