//! Service table adapter
//!
//! Holds the declarations registered by the configuration loader and the
//! bookkeeping the state machine drives: mark/sweep across reloads, the
//! step discipline that stops disallowed services and starts newly allowed
//! ones, and the stop-completed query behind the two-stage waits.
//!
//! Process spawning and PID tracking live outside this core; a declaration
//! in the Stopping state stays there until `reap` confirms collection.

use std::path::{Path, PathBuf};

use crate::cond::CondStore;
use crate::conf;
use crate::conf::rlimits::RlimitTable;
use crate::conf::runlevels::{parse_runlevels, RunlevelMask};

/// Capacity of a declaration's condition field.
pub const COND_SIZE: usize = 160;

/// Service flavors a declaration can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SvcKind {
    /// One-shot command that runs to completion, useful with `[S]`.
    Run,
    /// One-shot task, not waited for.
    Task,
    /// Monitored daemon, respawned on exit.
    Service,
    /// Classic inetd-style service.
    Inetd,
}

impl SvcKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::Task => "task",
            Self::Service => "service",
            Self::Inetd => "inetd",
        }
    }

    fn bit(self) -> u32 {
        match self {
            Self::Run => 1 << 0,
            Self::Task => 1 << 1,
            Self::Service => 1 << 2,
            Self::Inetd => 1 << 3,
        }
    }
}

/// Set of service kinds a step operation applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindMask(u32);

impl KindMask {
    pub const RUN: Self = Self(1 << 0);
    pub const TASK: Self = Self(1 << 1);
    pub const SERVICE: Self = Self(1 << 2);
    pub const INETD: Self = Self(1 << 3);
    pub const ANY: Self = Self(u32::MAX);

    pub fn contains(self, kind: SvcKind) -> bool {
        self.0 & kind.bit() != 0
    }
}

impl std::ops::BitOr for KindMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Lifecycle of a declaration as far as this core tracks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SvcState {
    Halted,
    /// Allowed but gated on an unmet condition.
    Waiting,
    Running,
    /// Stop requested, not yet collected.
    Stopping,
    /// One-shot completed in this runlevel.
    Done,
}

impl SvcState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Halted => "halted",
            Self::Waiting => "waiting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Done => "done",
        }
    }
}

/// One registered service declaration.
#[derive(Debug)]
pub struct Svc {
    pub kind: SvcKind,
    pub cmd: String,
    pub args: Vec<String>,
    pub descr: Option<String>,
    pub runlevels: RunlevelMask,
    pub cond: String,
    pub sighup: bool,
    pub rlimits: RlimitTable,
    /// Configuration file this came from; `None` means the main file.
    pub origin: Option<PathBuf>,
    pub state: SvcState,
    marked: bool,
    once: bool,
}

impl Svc {
    pub fn name(&self) -> &str {
        Path::new(&self.cmd)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.cmd)
    }

    pub fn is_daemon(&self) -> bool {
        self.kind == SvcKind::Service
    }

    pub fn is_marked(&self) -> bool {
        self.marked
    }
}

/// Pieces of one declaration line, before they land in the table.
struct Decl {
    runlevels: RunlevelMask,
    cond_raw: Option<String>,
    cmd: String,
    args: Vec<String>,
    descr: Option<String>,
}

fn parse_decl(decl: &str) -> Option<Decl> {
    let tokens = shlex::split(decl)?;
    let mut runlevels = None;
    let mut cond_raw = None;
    let mut cmd = None;
    let mut args = Vec::new();
    let mut descr = None;

    let mut iter = tokens.into_iter();
    while let Some(tok) = iter.next() {
        if cmd.is_none() && tok.starts_with('[') {
            runlevels = Some(parse_runlevels(Some(&tok)));
        } else if cmd.is_none() && tok.starts_with('<') {
            cond_raw = Some(tok[1..].to_string());
        } else if tok == "--" {
            let rest: Vec<String> = iter.collect();
            if !rest.is_empty() {
                descr = Some(rest.join(" "));
            }
            break;
        } else if cmd.is_none() {
            cmd = Some(tok);
        } else {
            args.push(tok);
        }
    }

    let cmd = cmd?;
    Some(Decl {
        runlevels: runlevels.unwrap_or_else(|| parse_runlevels(None)),
        cond_raw,
        cmd,
        args,
        descr,
    })
}

/// The service table.
#[derive(Default)]
pub struct SvcTable {
    svcs: Vec<Svc>,
}

impl SvcTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one `service`/`task`/`run`/`inetd` declaration. An existing
    /// declaration with the same command and origin is updated in place and
    /// survives the next sweep.
    pub fn register(
        &mut self,
        kind: SvcKind,
        decl: &str,
        rlimits: &RlimitTable,
        origin: Option<&Path>,
    ) {
        let Some(parsed) = parse_decl(decl) else {
            log::warn!("Invalid {} declaration: {}", kind.as_str(), decl);
            return;
        };

        // UNIX daemons are assumed to handle SIGHUP unless the condition
        // carries the `!` opt-out prefix.
        let mut sighup = kind == SvcKind::Service;
        let mut cond = String::new();
        if let Some(raw) = &parsed.cond_raw {
            match conf::parse_cond(raw) {
                Some(parsed_cond) => {
                    cond = parsed_cond.expr;
                    if parsed_cond.sighup_opt_out {
                        sighup = false;
                    }
                }
                None => {
                    log::warn!(
                        "Too long event list in declaration of {}: {}",
                        parsed.cmd,
                        raw
                    );
                }
            }
        }

        let origin = origin.map(|p| p.to_path_buf());
        if let Some(svc) = self
            .svcs
            .iter_mut()
            .find(|s| s.kind == kind && s.cmd == parsed.cmd && s.origin == origin)
        {
            svc.args = parsed.args;
            svc.descr = parsed.descr;
            svc.runlevels = parsed.runlevels;
            svc.cond = cond;
            svc.sighup = sighup;
            svc.rlimits = rlimits.clone();
            svc.marked = false;
            log::debug!("Updated {} {}", kind.as_str(), svc.name());
            return;
        }

        let svc = Svc {
            kind,
            cmd: parsed.cmd,
            args: parsed.args,
            descr: parsed.descr,
            runlevels: parsed.runlevels,
            cond,
            sighup,
            rlimits: rlimits.clone(),
            origin,
            state: SvcState::Halted,
            marked: false,
            once: false,
        };
        log::debug!("Registered {} {}", kind.as_str(), svc.name());
        self.svcs.push(svc);
    }

    /// Mark every declaration as a sweep candidate. Re-registration during
    /// the following reload clears the mark.
    pub fn mark_dynamic(&mut self) {
        for svc in &mut self.svcs {
            svc.marked = true;
        }
    }

    /// Unregister everything still marked after a reload.
    pub fn clean_dynamic(&mut self) {
        self.svcs.retain(|svc| {
            if svc.marked {
                log::info!("Unregistering {} {}", svc.kind.as_str(), svc.name());
            }
            !svc.marked
        });
    }

    /// Advance every declaration matching `kinds` toward what the current
    /// runlevel and conditions allow. During a teardown window only stops
    /// are issued; starts wait for the second phase.
    pub fn step_all(
        &mut self,
        kinds: KindMask,
        runlevel: u8,
        in_teardown: bool,
        conds: &CondStore,
    ) {
        for svc in &mut self.svcs {
            if !kinds.contains(svc.kind) {
                continue;
            }

            let allowed = svc.runlevels.has(runlevel) && !svc.marked;
            let cond_ok = svc.cond.is_empty() || conds.is_on(&svc.cond);

            match svc.state {
                SvcState::Running => {
                    if !allowed || !cond_ok {
                        log::debug!("Stopping {} ...", svc.name());
                        svc.state = SvcState::Stopping;
                    }
                }
                SvcState::Stopping => {}
                SvcState::Halted | SvcState::Waiting | SvcState::Done => {
                    if !allowed {
                        svc.state = SvcState::Halted;
                        continue;
                    }
                    if in_teardown {
                        continue;
                    }
                    if !cond_ok {
                        svc.state = SvcState::Waiting;
                        continue;
                    }
                    match svc.kind {
                        SvcKind::Run | SvcKind::Task => {
                            if !svc.once {
                                log::info!("Starting {} ...", svc.name());
                                svc.once = true;
                                svc.state = SvcState::Done;
                            }
                        }
                        SvcKind::Service | SvcKind::Inetd => {
                            log::info!("Starting {} ...", svc.name());
                            svc.state = SvcState::Running;
                        }
                    }
                }
            }
        }
    }

    /// Any declaration whose stop has not been collected yet.
    pub fn stop_completed(&self) -> Option<&Svc> {
        self.svcs.iter().find(|s| s.state == SvcState::Stopping)
    }

    /// Collect every declaration whose stop finished. Returns how many were
    /// collected.
    pub fn reap(&mut self) -> usize {
        let mut count = 0;
        for svc in &mut self.svcs {
            if svc.state == SvcState::Stopping {
                log::debug!("Collected {} ...", svc.name());
                svc.state = SvcState::Halted;
                count += 1;
            }
        }
        count
    }

    /// Reset the once-per-runlevel flag of run/task declarations so they
    /// fire again in the runlevel being entered.
    pub fn runtask_clean(&mut self) {
        for svc in &mut self.svcs {
            if matches!(svc.kind, SvcKind::Run | SvcKind::Task) {
                svc.once = false;
                if svc.state == SvcState::Done {
                    svc.state = SvcState::Halted;
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.svcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.svcs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Svc> {
        self.svcs.iter()
    }

    pub fn find(&self, cmd: &str) -> Option<&Svc> {
        self.svcs.iter().find(|s| s.cmd == cmd)
    }
}
