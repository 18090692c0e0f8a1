//! Process-wide supervisor context
//!
//! One owned value threaded through the event loop instead of ambient
//! globals, so the state machine and loader stay testable. There is exactly
//! one instance per process.

use std::path::PathBuf;

use crate::cond::CondStore;
use crate::conf::changes::ChangeSet;
use crate::conf::rlimits::RlimitTable;
use crate::hooks::Hooks;
use crate::shutdown::{HaltMode, LogShutdown, ShutdownAction, SystemShutdown};
use crate::svc::SvcTable;
use crate::tty::TtyTable;

/// Compiled-in default hostname, used when neither the hostname file nor a
/// `host` directive names one.
pub const DEFHOST: &str = "noname";

/// Fallback runlevel to enter after bootstrap.
pub const DEFAULT_RUNLEVEL: u8 = 2;

/// Filesystem locations the supervisor reads and writes.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Main configuration file.
    pub conf: PathBuf,
    /// Fragment directory scanned for `*.conf`.
    pub confd: PathBuf,
    pub nologin: PathBuf,
    pub hostname_file: PathBuf,
    pub cmdline: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            conf: PathBuf::from("/etc/svinit.conf"),
            confd: PathBuf::from("/etc/svinit.d"),
            nologin: PathBuf::from("/etc/nologin"),
            hostname_file: PathBuf::from("/etc/hostname"),
            cmdline: PathBuf::from("/proc/cmdline"),
        }
    }
}

/// The supervisor's process-wide state.
pub struct Runtime {
    pub paths: Paths,

    /// Current runlevel, 0..=9. 0 while bootstrapping.
    pub runlevel: u8,
    /// Runlevel before the last completed transition; -1 until then.
    pub prevlevel: i32,
    /// Runlevel configured to enter once bootstrap finishes.
    pub cfglevel: u8,

    pub hostname: String,
    /// Network bring-up script from the `network` directive.
    pub network: Option<String>,
    /// Directory of boot scripts from the `runparts` directive.
    pub runparts: Option<PathBuf>,
    /// Shutdown script from the `shutdown` directive.
    pub sdown: Option<PathBuf>,
    pub halt: HaltMode,

    pub rlimits: RlimitTable,
    pub services: SvcTable,
    pub ttys: TtyTable,
    pub conds: CondStore,
    pub hooks: Hooks,
    pub changes: ChangeSet,
    pub shutdown: Box<dyn ShutdownAction>,

    /// Whether OS state (limits, hostname, utmp, one-shot commands) is
    /// actually mutated. Off everywhere except the real supervisor.
    pub live: bool,
}

impl Runtime {
    /// Inert context: parses and drives state without touching the OS.
    pub fn new(paths: Paths) -> Self {
        Self {
            paths,
            runlevel: 0,
            prevlevel: -1,
            cfglevel: DEFAULT_RUNLEVEL,
            hostname: DEFHOST.to_string(),
            network: None,
            runparts: None,
            sdown: None,
            halt: HaltMode::Poweroff,
            rlimits: RlimitTable::default(),
            services: SvcTable::new(),
            ttys: TtyTable::new(),
            conds: CondStore::new(),
            hooks: Hooks::new(),
            changes: ChangeSet::new(),
            shutdown: Box::new(LogShutdown),
            live: false,
        }
    }

    /// Live context for running as the actual supervisor.
    pub fn pid1(paths: Paths) -> Self {
        let mut rt = Self::new(paths);
        rt.shutdown = Box::new(SystemShutdown);
        rt.live = true;
        rt
    }
}
