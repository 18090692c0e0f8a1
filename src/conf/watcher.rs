//! Filesystem watcher for the configuration surfaces
//!
//! Three independent inotify slots: the fragment directory, its `available/`
//! subdirectory, and the main configuration file. Each slot is optional; an
//! administrator may use only the monolithic file or only the directory, so
//! a missing target is skipped rather than reported.
//!
//! The `available/` slot is armed without following symlinks so a mutated
//! symlink is itself observable; the top-level fragment directory follows.

use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::inotify::{AddWatchFlags, InitFlags, Inotify};

use super::changes::ChangeSet;

struct Slot {
    ino: Inotify,
    /// Set when the watched target is a single file: events on it arrive
    /// without a name and this basename is substituted.
    file_base: Option<String>,
    path: PathBuf,
}

/// Watcher over the fragment directory, `available/`, and the main file.
#[derive(Default)]
pub struct ConfWatcher {
    slots: Vec<Slot>,
}

fn event_mask() -> AddWatchFlags {
    AddWatchFlags::IN_CREATE
        | AddWatchFlags::IN_DELETE
        | AddWatchFlags::IN_MODIFY
        | AddWatchFlags::IN_ATTRIB
        | AddWatchFlags::IN_MOVED_FROM
        | AddWatchFlags::IN_MOVED_TO
}

fn arm_slot(path: &Path, extra: AddWatchFlags) -> Option<Slot> {
    let meta = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(_) => {
            log::debug!("No such file or directory, skipping {}", path.display());
            return None;
        }
    };

    let file_base = if meta.is_dir() {
        None
    } else {
        path.file_name().map(|n| n.to_string_lossy().into_owned())
    };

    let ino = match Inotify::init(InitFlags::IN_NONBLOCK | InitFlags::IN_CLOEXEC) {
        Ok(ino) => ino,
        Err(err) => {
            log::warn!("Failed creating inotify descriptor for {}: {}", path.display(), err);
            return None;
        }
    };

    if let Err(err) = ino.add_watch(path, event_mask() | extra) {
        // The target may be transiently unreadable; the other slots still cover
        log::debug!("Cannot watch {}: {}", path.display(), err);
        return None;
    }

    Some(Slot {
        ino,
        file_base,
        path: path.to_path_buf(),
    })
}

impl ConfWatcher {
    /// Arm all three slots. Any subset may come up; each failure is
    /// independent and non-fatal.
    pub fn arm(conf_file: &Path, fragment_dir: &Path) -> Self {
        let mut slots = Vec::new();

        if let Some(slot) = arm_slot(fragment_dir, AddWatchFlags::empty()) {
            slots.push(slot);
        }
        if let Some(slot) = arm_slot(&fragment_dir.join("available"), AddWatchFlags::IN_DONT_FOLLOW)
        {
            slots.push(slot);
        }
        if let Some(slot) = arm_slot(conf_file, AddWatchFlags::empty()) {
            slots.push(slot);
        }

        Self { slots }
    }

    /// Drop and re-create every slot, picking up targets that appeared or
    /// vanished since the last arm. Closing the old descriptors happens on
    /// drop.
    pub fn rearm(&mut self, conf_file: &Path, fragment_dir: &Path) {
        *self = Self::arm(conf_file, fragment_dir);
    }

    pub fn active_slots(&self) -> usize {
        self.slots.len()
    }

    /// Drain pending events from every slot into the change set.
    pub fn poll(&mut self, changes: &mut ChangeSet) {
        for slot in &self.slots {
            loop {
                let events = match slot.ino.read_events() {
                    Ok(events) => events,
                    Err(Errno::EAGAIN) => break,
                    Err(err) => {
                        log::warn!("invalid inotify event on {}: {}", slot.path.display(), err);
                        break;
                    }
                };
                if events.is_empty() {
                    break;
                }

                for ev in events {
                    let gone = ev
                        .mask
                        .intersects(AddWatchFlags::IN_DELETE | AddWatchFlags::IN_MOVED_FROM);

                    // Directory slots name the entry; file slots do not and
                    // get the file's own basename instead.
                    let name = match ev.name {
                        Some(name) => name.to_string_lossy().into_owned(),
                        None => match &slot.file_base {
                            Some(base) => base.clone(),
                            None => continue,
                        },
                    };

                    changes.record(&name, gone);
                }
            }
        }
    }
}
