//! Integration tests for the configuration watcher
//!
//! Exercises the three inotify slots against a temp tree. Events need a
//! moment to land, hence the short sleeps between filesystem operations and
//! polls.

use std::path::Path;
use std::time::Duration;

use svinit::conf::changes::ChangeSet;
use svinit::conf::watcher::ConfWatcher;

fn settle() {
    std::thread::sleep(Duration::from_millis(200));
}

struct Tree {
    _dir: tempfile::TempDir,
    conf: std::path::PathBuf,
    confd: std::path::PathBuf,
}

fn setup() -> Tree {
    let dir = tempfile::tempdir().unwrap();
    let conf = dir.path().join("svinit.conf");
    let confd = dir.path().join("svinit.d");
    std::fs::write(&conf, "# empty\n").unwrap();
    std::fs::create_dir(&confd).unwrap();
    std::fs::create_dir(confd.join("available")).unwrap();

    Tree {
        _dir: dir,
        conf,
        confd,
    }
}

#[test]
fn test_fragment_events_carry_their_own_name() {
    let tree = setup();
    let mut watcher = ConfWatcher::arm(&tree.conf, &tree.confd);
    assert_eq!(watcher.active_slots(), 3);

    let mut changes = ChangeSet::new();

    std::fs::write(tree.confd.join("new.conf"), "service [2] /sbin/new\n").unwrap();
    settle();
    watcher.poll(&mut changes);

    assert!(changes.has(Path::new("new.conf")));
    assert!(changes.any());
}

#[test]
fn test_main_file_slot_substitutes_basename() {
    let tree = setup();
    let mut watcher = ConfWatcher::arm(&tree.conf, &tree.confd);
    let mut changes = ChangeSet::new();

    // Events on a single-file watch arrive without a name; the watcher
    // substitutes the file's own basename.
    std::fs::write(&tree.conf, "host edited\n").unwrap();
    settle();
    watcher.poll(&mut changes);

    assert!(changes.has(Path::new("svinit.conf")));
}

#[test]
fn test_delete_erases_recorded_change() {
    let tree = setup();
    let mut watcher = ConfWatcher::arm(&tree.conf, &tree.confd);
    let mut changes = ChangeSet::new();

    let path = tree.confd.join("gone.conf");
    std::fs::write(&path, "service [2] /sbin/gone\n").unwrap();
    settle();
    watcher.poll(&mut changes);
    assert!(changes.has(Path::new("gone.conf")));

    std::fs::remove_file(&path).unwrap();
    settle();
    watcher.poll(&mut changes);
    assert!(!changes.has(Path::new("gone.conf")));
}

#[test]
fn test_available_subdirectory_is_watched() {
    let tree = setup();
    let mut watcher = ConfWatcher::arm(&tree.conf, &tree.confd);
    let mut changes = ChangeSet::new();

    std::fs::write(
        tree.confd.join("available/candidate.conf"),
        "service [2] /sbin/candidate\n",
    )
    .unwrap();
    settle();
    watcher.poll(&mut changes);

    assert!(changes.has(Path::new("candidate.conf")));
}

#[test]
fn test_missing_targets_are_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let conf = dir.path().join("svinit.conf");
    let confd = dir.path().join("svinit.d");
    std::fs::write(&conf, "# only the main file exists\n").unwrap();

    // Fragment directory and available/ missing: only the file slot arms
    let mut watcher = ConfWatcher::arm(&conf, &confd);
    assert_eq!(watcher.active_slots(), 1);

    let mut changes = ChangeSet::new();
    std::fs::write(&conf, "host edited\n").unwrap();
    settle();
    watcher.poll(&mut changes);
    assert!(changes.has(Path::new("svinit.conf")));
}

#[test]
fn test_rearm_picks_up_new_directory() {
    let dir = tempfile::tempdir().unwrap();
    let conf = dir.path().join("svinit.conf");
    let confd = dir.path().join("svinit.d");
    std::fs::write(&conf, "# empty\n").unwrap();

    let mut watcher = ConfWatcher::arm(&conf, &confd);
    assert_eq!(watcher.active_slots(), 1);

    std::fs::create_dir(&confd).unwrap();
    watcher.rearm(&conf, &confd);
    assert_eq!(watcher.active_slots(), 2);

    let mut changes = ChangeSet::new();
    std::fs::write(confd.join("late.conf"), "service [2] /sbin/late\n").unwrap();
    settle();
    watcher.poll(&mut changes);
    assert!(changes.has(Path::new("late.conf")));
}
