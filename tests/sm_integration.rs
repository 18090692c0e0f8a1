//! Integration tests for the supervisor state machine
//!
//! Drives bootstrap, runlevel transitions, reloads, and shutdown against
//! temp configuration trees, with recorders standing in for the hook and
//! shutdown collaborators.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use svinit::conf;
use svinit::hooks::HookPoint;
use svinit::shutdown::{HaltMode, ShutdownAction};
use svinit::svc::SvcState;
use svinit::{Paths, Runtime, Sm, SmState};

struct ShutdownRecorder(Rc<RefCell<Vec<HaltMode>>>);

impl ShutdownAction for ShutdownRecorder {
    fn shutdown(&mut self, mode: HaltMode, _script: Option<&Path>) {
        self.0.borrow_mut().push(mode);
    }
}

fn setup(main: &str, fragments: &[(&str, &str)]) -> (tempfile::TempDir, Runtime) {
    let dir = tempfile::tempdir().unwrap();
    let confd = dir.path().join("svinit.d");
    std::fs::create_dir(&confd).unwrap();

    let conf_path = dir.path().join("svinit.conf");
    std::fs::write(&conf_path, main).unwrap();

    for (name, content) in fragments {
        std::fs::write(confd.join(name), content).unwrap();
    }

    let paths = Paths {
        conf: conf_path,
        confd,
        nologin: dir.path().join("nologin"),
        hostname_file: dir.path().join("hostname"),
        cmdline: dir.path().join("cmdline"),
    };

    (dir, Runtime::new(paths))
}

fn svc_state(rt: &Runtime, cmd: &str) -> SvcState {
    rt.services.find(cmd).unwrap().state
}

#[test]
fn test_bootstrap_then_promote_to_runlevel_2() {
    let (_dir, mut rt) = setup(
        "service [S]    /sbin/bootsvc\n\
         service [2345] /sbin/netd\n\
         tty [2345]     /dev/tty1\n",
        &[],
    );
    conf::reload(&mut rt);

    let mut sm = Sm::new();
    assert_eq!(sm.state(), SmState::Bootstrap);

    // One step: runlevel S services start, machine settles in Running
    sm.step(&mut rt);
    assert_eq!(sm.state(), SmState::Running);
    assert_eq!(svc_state(&rt, "/sbin/bootsvc"), SvcState::Running);
    assert_eq!(svc_state(&rt, "/sbin/netd"), SvcState::Halted);

    // Promote to runlevel 2: phase one stops the S-only service
    sm.set_runlevel(2);
    sm.step(&mut rt);
    assert_eq!(sm.state(), SmState::RunlevelWait);
    assert!(sm.is_in_teardown());
    assert_eq!(svc_state(&rt, "/sbin/bootsvc"), SvcState::Stopping);

    // step is idempotent while a stop is uncollected
    sm.step(&mut rt);
    sm.step(&mut rt);
    assert_eq!(sm.state(), SmState::RunlevelWait);
    assert_eq!(svc_state(&rt, "/sbin/netd"), SvcState::Halted);

    // Monitor collects the stop; phase two starts the new runlevel
    rt.services.reap();
    sm.step(&mut rt);

    assert_eq!(sm.state(), SmState::Running);
    assert_eq!(rt.runlevel, 2);
    assert_eq!(rt.prevlevel, 0);
    assert!(!sm.is_in_teardown());
    assert_eq!(svc_state(&rt, "/sbin/netd"), SvcState::Running);

    // TTYs are deliberately not started when coming out of bootstrap
    assert!(!rt.ttys.find("/dev/tty1").unwrap().is_active());

    // A later transition does bring the gettys up
    sm.set_runlevel(3);
    sm.step(&mut rt);
    assert_eq!(sm.state(), SmState::Running);
    assert_eq!(rt.runlevel, 3);
    assert_eq!(rt.prevlevel, 2);
    assert!(rt.ttys.find("/dev/tty1").unwrap().is_active());
}

#[test]
fn test_set_runlevel_to_current_is_cleared() {
    let (_dir, mut rt) = setup("service [2] /sbin/netd\n", &[]);
    conf::reload(&mut rt);

    let mut sm = Sm::new();
    sm.step(&mut rt);
    sm.set_runlevel(2);
    sm.step(&mut rt);
    rt.services.reap();
    sm.step(&mut rt);
    assert_eq!(rt.runlevel, 2);

    // Requesting the current runlevel clears the request without a transition
    sm.set_runlevel(2);
    sm.step(&mut rt);
    assert_eq!(sm.state(), SmState::Running);
    assert_eq!(rt.prevlevel, 0);
}

#[test]
fn test_reload_during_running() {
    let (_dir, mut rt) = setup("", &[("netd.conf", "service [2] <svc/net> /sbin/netd\n")]);
    conf::reload(&mut rt);

    let calls = Rc::new(RefCell::new(Vec::new()));
    let c = Rc::clone(&calls);
    rt.hooks.add(HookPoint::SvcReconf, move |p| c.borrow_mut().push(p));

    let mut sm = Sm::new();
    sm.step(&mut rt);
    sm.set_runlevel(2);
    sm.step(&mut rt);
    rt.services.reap();
    sm.step(&mut rt);

    // Condition satisfied, daemon runs
    rt.conds.assert("svc/net");
    rt.services
        .step_all(svinit::svc::KindMask::ANY, rt.runlevel, false, &rt.conds);
    assert_eq!(svc_state(&rt, "/sbin/netd"), SvcState::Running);

    // Fragment touched: reload stops the daemon while its condition is in flux
    rt.changes.record("netd.conf", false);
    sm.set_reload();
    sm.step(&mut rt);
    assert_eq!(sm.state(), SmState::ReloadWait);
    assert!(sm.is_in_teardown());
    assert_eq!(svc_state(&rt, "/sbin/netd"), SvcState::Stopping);
    assert!(!rt.changes.any());
    assert!(calls.borrow().is_empty());

    // Drain: reconf hooks fire once, daemon waits on its flux condition
    rt.services.reap();
    sm.step(&mut rt);
    assert_eq!(sm.state(), SmState::Running);
    assert!(!sm.is_in_teardown());
    assert_eq!(*calls.borrow(), vec![HookPoint::SvcReconf]);
    assert_eq!(svc_state(&rt, "/sbin/netd"), SvcState::Waiting);

    // Once the condition is re-asserted the daemon comes back
    rt.conds.assert("svc/net");
    rt.services
        .step_all(svinit::svc::KindMask::ANY, rt.runlevel, false, &rt.conds);
    assert_eq!(svc_state(&rt, "/sbin/netd"), SvcState::Running);
}

#[test]
fn test_runlevel_change_absorbs_pending_fragment_edits() {
    let (dir, mut rt) = setup("service [23] /sbin/netd\n", &[]);
    conf::reload(&mut rt);

    let mut sm = Sm::new();
    sm.step(&mut rt);
    sm.set_runlevel(2);
    sm.step(&mut rt);
    rt.services.reap();
    sm.step(&mut rt);

    // A fragment appears while running and the watcher records it
    std::fs::write(
        dir.path().join("svinit.d/late.conf"),
        "service [3] /sbin/late\n",
    )
    .unwrap();
    rt.changes.record("late.conf", false);

    sm.set_runlevel(3);
    sm.step(&mut rt);
    rt.services.reap();
    sm.step(&mut rt);

    // The runlevel change reloaded the configuration on the way
    assert_eq!(rt.runlevel, 3);
    assert!(!rt.changes.any());
    assert_eq!(svc_state(&rt, "/sbin/late"), SvcState::Running);
}

#[test]
fn test_runlevel_change_without_edits_skips_reload() {
    let (dir, mut rt) = setup("service [23] /sbin/netd\n", &[]);
    conf::reload(&mut rt);

    let mut sm = Sm::new();
    sm.step(&mut rt);
    sm.set_runlevel(2);
    sm.step(&mut rt);
    rt.services.reap();
    sm.step(&mut rt);

    // Fragment on disk but no change recorded: not picked up
    std::fs::write(
        dir.path().join("svinit.d/late.conf"),
        "service [3] /sbin/late\n",
    )
    .unwrap();

    sm.set_runlevel(3);
    sm.step(&mut rt);
    rt.services.reap();
    sm.step(&mut rt);

    assert_eq!(rt.runlevel, 3);
    assert!(rt.services.find("/sbin/late").is_none());
}

#[test]
fn test_shutdown_sequence() {
    let (_dir, mut rt) = setup("service [2345] /sbin/netd\n", &[]);
    conf::reload(&mut rt);

    let modes = Rc::new(RefCell::new(Vec::new()));
    rt.shutdown = Box::new(ShutdownRecorder(Rc::clone(&modes)));

    let hooks = Rc::new(RefCell::new(Vec::new()));
    for point in [HookPoint::Shutdown, HookPoint::RunlevelChange] {
        let h = Rc::clone(&hooks);
        rt.hooks.add(point, move |p| h.borrow_mut().push(p));
    }

    let mut sm = Sm::new();
    sm.step(&mut rt);
    sm.set_runlevel(2);
    sm.step(&mut rt);
    rt.services.reap();
    sm.step(&mut rt);
    assert_eq!(svc_state(&rt, "/sbin/netd"), SvcState::Running);

    rt.halt = HaltMode::Halt;
    sm.set_runlevel(0);
    sm.step(&mut rt);

    // Shutdown hooks fired in the stop phase, everything stopping
    assert_eq!(sm.state(), SmState::RunlevelWait);
    assert_eq!(*hooks.borrow(), vec![HookPoint::Shutdown]);
    assert_eq!(svc_state(&rt, "/sbin/netd"), SvcState::Stopping);
    assert!(svinit::logger::is_terse());
    assert!(modes.borrow().is_empty());

    rt.services.reap();
    sm.step(&mut rt);

    assert_eq!(sm.state(), SmState::Running);
    assert_eq!(
        *hooks.borrow(),
        vec![HookPoint::Shutdown, HookPoint::RunlevelChange]
    );
    assert_eq!(*modes.borrow(), vec![HaltMode::Halt]);
}

#[test]
fn test_nologin_policy() {
    let (_dir, mut rt) = setup("", &[]);
    conf::reload(&mut rt);
    let nologin = rt.paths.nologin.clone();

    let mut sm = Sm::new();
    sm.step(&mut rt);

    // Leaving bootstrap (runlevel 0) erases a pre-existing nologin file
    std::fs::write(&nologin, "").unwrap();
    sm.set_runlevel(2);
    sm.step(&mut rt);
    rt.services.reap();
    sm.step(&mut rt);
    assert!(!nologin.exists());

    // Entering single-user mode creates it
    sm.set_runlevel(1);
    sm.step(&mut rt);
    rt.services.reap();
    sm.step(&mut rt);
    assert!(nologin.exists());

    // Leaving single-user mode erases it again
    sm.set_runlevel(3);
    sm.step(&mut rt);
    rt.services.reap();
    sm.step(&mut rt);
    assert!(!nologin.exists());

    // Transitions between ordinary runlevels preserve a manual override
    std::fs::write(&nologin, "maintenance window").unwrap();
    sm.set_runlevel(4);
    sm.step(&mut rt);
    rt.services.reap();
    sm.step(&mut rt);
    assert!(nologin.exists());
    assert_eq!(
        std::fs::read_to_string(&nologin).unwrap(),
        "maintenance window"
    );
}

#[test]
fn test_stale_services_unregistered_after_transition() {
    let (dir, mut rt) = setup("", &[("old.conf", "service [23] /sbin/old\n")]);
    conf::reload(&mut rt);

    let mut sm = Sm::new();
    sm.step(&mut rt);
    sm.set_runlevel(2);
    sm.step(&mut rt);
    rt.services.reap();
    sm.step(&mut rt);
    assert_eq!(svc_state(&rt, "/sbin/old"), SvcState::Running);

    // Fragment vanishes; the next transition reloads, stops, and sweeps
    std::fs::remove_file(dir.path().join("svinit.d/old.conf")).unwrap();
    rt.changes.record("old.conf", true);
    rt.changes.record("other.conf", false);

    sm.set_runlevel(3);
    sm.step(&mut rt);
    assert_eq!(sm.state(), SmState::RunlevelWait);
    assert_eq!(svc_state(&rt, "/sbin/old"), SvcState::Stopping);

    rt.services.reap();
    sm.step(&mut rt);
    assert_eq!(sm.state(), SmState::Running);
    assert!(rt.services.find("/sbin/old").is_none());
}

#[test]
fn test_runtasks_fire_once_per_runlevel() {
    let (_dir, mut rt) = setup("task [23] /bin/prep\n", &[]);
    conf::reload(&mut rt);

    let mut sm = Sm::new();
    sm.step(&mut rt);
    sm.set_runlevel(2);
    sm.step(&mut rt);
    rt.services.reap();
    sm.step(&mut rt);
    assert_eq!(svc_state(&rt, "/bin/prep"), SvcState::Done);

    // The flag resets on the next transition so the task runs again
    sm.set_runlevel(3);
    sm.step(&mut rt);
    rt.services.reap();
    sm.step(&mut rt);
    assert_eq!(svc_state(&rt, "/bin/prep"), SvcState::Done);
}
