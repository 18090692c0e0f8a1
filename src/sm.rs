//! Supervisor state machine
//!
//! ```text
//!     ┌───────────┐
//!     │ Bootstrap │
//!     └─────┬─────┘
//!           │ start runlevel S
//!     ┌─────▼─────┐   set_runlevel    ┌─────────────────┐
//!     │  Running  │──────────────────▶│ Runlevel/Change │
//!     └─────▲─────┘                   └────────┬────────┘
//!           │                                  │ stop disallowed
//!           │                         ┌────────▼────────┐
//!           │◀────── start allowed ───│  Runlevel/Wait  │
//!           │                         └─────────────────┘
//!           │ set_reload              ┌─────────────────┐
//!           └────────────────────────▶│  Reload/Change  │──▶ Reload/Wait ──▶ Running
//!                                     └─────────────────┘
//! ```
//!
//! A single `step` drives the machine; whenever the state changed during a
//! pass it advances again, so cascading transitions complete within one
//! external call. The `*/Wait` states park while any service is still
//! stopping; the event loop calls `step` again once the monitor has
//! collected it. Stop-before-start: no service is started in a new
//! configuration before every disallowed one has been collected, and hook
//! batches fire exactly once in between.

use crate::conf;
use crate::helpers;
use crate::hooks::HookPoint;
use crate::logger;
use crate::runtime::Runtime;
use crate::svc::KindMask;
use crate::utmp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmState {
    Bootstrap,
    Running,
    RunlevelChange,
    RunlevelWait,
    ReloadChange,
    ReloadWait,
}

impl SmState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bootstrap => "bootstrap",
            Self::Running => "running",
            Self::RunlevelChange => "runlevel/change",
            Self::RunlevelWait => "runlevel/wait",
            Self::ReloadChange => "reload/change",
            Self::ReloadWait => "reload/wait",
        }
    }
}

pub struct Sm {
    state: SmState,
    /// Requested runlevel; -1 when none is pending.
    newlevel: i32,
    reload: bool,
    in_teardown: bool,
}

impl Default for Sm {
    fn default() -> Self {
        Self::new()
    }
}

impl Sm {
    pub fn new() -> Self {
        Self {
            state: SmState::Bootstrap,
            newlevel: -1,
            reload: false,
            in_teardown: false,
        }
    }

    pub fn state(&self) -> SmState {
        self.state
    }

    /// Request a runlevel change; observed next time the machine is in
    /// Running. A later request supersedes an earlier pending one.
    pub fn set_runlevel(&mut self, newlevel: i32) {
        self.newlevel = newlevel;
    }

    /// Request a configuration reload; observed next time the machine is in
    /// Running.
    pub fn set_reload(&mut self) {
        self.reload = true;
    }

    /// Whether the machine is between a stop phase and its start phase.
    pub fn is_in_teardown(&self) -> bool {
        self.in_teardown
    }

    /// Disable logins in single-user mode and on the way down; re-enable
    /// only when coming from those runlevels so an administrator-managed
    /// nologin file survives other transitions.
    fn nologin(&self, rt: &Runtime) {
        if matches!(rt.runlevel, 0 | 1 | 6) {
            if let Err(err) = helpers::touch(&rt.paths.nologin) {
                log::warn!("Failed creating {}: {}", rt.paths.nologin.display(), err);
            }
        }

        if matches!(rt.prevlevel, 0 | 1 | 6) {
            helpers::erase(&rt.paths.nologin);
        }
    }

    /// Advance the machine. Re-enters until the state settles or a wait
    /// state parks on an uncollected stop.
    pub fn step(&mut self, rt: &mut Runtime) {
        loop {
            let old_state = self.state;

            log::debug!(
                "state: {}, runlevel: {}, newlevel: {}, teardown: {}, reload: {}",
                self.state.as_str(),
                rt.runlevel,
                self.newlevel,
                self.in_teardown,
                self.reload
            );

            match self.state {
                SmState::Bootstrap => {
                    log::debug!(
                        "Bootstrapping all services in runlevel S from {}",
                        rt.paths.conf.display()
                    );
                    rt.services.step_all(
                        KindMask::RUN | KindMask::TASK | KindMask::SERVICE,
                        rt.runlevel,
                        self.in_teardown,
                        &rt.conds,
                    );
                    self.state = SmState::Running;
                }

                SmState::Running => {
                    if (0..=9).contains(&self.newlevel) {
                        if rt.runlevel as i32 == self.newlevel {
                            self.newlevel = -1;
                        } else {
                            self.state = SmState::RunlevelChange;
                        }
                    } else if self.reload {
                        self.reload = false;
                        self.state = SmState::ReloadChange;
                    }
                }

                SmState::RunlevelChange => {
                    rt.prevlevel = rt.runlevel as i32;
                    rt.runlevel = self.newlevel as u8;
                    self.newlevel = -1;

                    // Terse console output and shutdown hooks before going down
                    if rt.runlevel == 0 || rt.runlevel == 6 {
                        logger::exit();
                        rt.hooks.run(HookPoint::Shutdown);
                    }

                    log::debug!(
                        "Setting new runlevel --> {} <-- previous {}",
                        rt.runlevel,
                        rt.prevlevel
                    );
                    log::info!("svinit: entering runlevel {}", rt.runlevel);
                    if rt.live {
                        utmp::runlevel_set(rt.prevlevel, rt.runlevel);
                    }

                    self.nologin(rt);

                    // Pick up any fragment edits that arrived while running
                    if rt.changes.any() {
                        conf::reload(rt);
                    }

                    rt.services.runtask_clean();

                    log::debug!("Stopping services not allowed in new runlevel ...");
                    self.in_teardown = true;
                    rt.services
                        .step_all(KindMask::ANY, rt.runlevel, true, &rt.conds);

                    self.state = SmState::RunlevelWait;
                }

                SmState::RunlevelWait => {
                    // Wait for stops to be collected; the monitor drives the
                    // next step once a child is reaped.
                    let stopping = rt.services.stop_completed().map(|s| s.name().to_string());
                    if let Some(name) = stopping {
                        log::debug!("Waiting to collect {} ...", name);
                        break;
                    }

                    log::debug!("All services have been stopped, calling runlevel change hooks ...");
                    rt.hooks.run(HookPoint::RunlevelChange);

                    log::debug!("Starting services new to this runlevel ...");
                    self.in_teardown = false;
                    rt.services
                        .step_all(KindMask::ANY, rt.runlevel, false, &rt.conds);

                    rt.services.clean_dynamic();

                    if rt.runlevel == 0 || rt.runlevel == 6 {
                        let mode = rt.halt;
                        let script = rt.sdown.clone();
                        rt.shutdown.shutdown(mode, script.as_deref());
                        self.state = SmState::Running;
                        continue;
                    }

                    // TTYs have a delayed start; none run during bootstrap
                    if rt.prevlevel > 0 {
                        rt.ttys.runlevel(rt.runlevel);
                    }

                    self.state = SmState::Running;
                }

                SmState::ReloadChange => {
                    conf::reload(rt);

                    // Conditions go in flux until re-asserted; affected
                    // services move to waiting or stop below
                    log::debug!("Stopping services not allowed after reconf ...");
                    self.in_teardown = true;
                    rt.conds.reload();
                    rt.services.step_all(
                        KindMask::SERVICE | KindMask::INETD,
                        rt.runlevel,
                        true,
                        &rt.conds,
                    );
                    rt.ttys.reload(None);

                    self.state = SmState::ReloadWait;
                }

                SmState::ReloadWait => {
                    let stopping = rt.services.stop_completed().map(|s| s.name().to_string());
                    if let Some(name) = stopping {
                        log::debug!("Waiting to collect {} ...", name);
                        break;
                    }

                    self.in_teardown = false;
                    rt.services.clean_dynamic();

                    log::debug!("Starting services after reconf ...");
                    rt.services.step_all(
                        KindMask::SERVICE | KindMask::INETD,
                        rt.runlevel,
                        false,
                        &rt.conds,
                    );

                    rt.hooks.run(HookPoint::SvcReconf);

                    // Hooks may have asserted conditions that unblock starts
                    rt.services.step_all(
                        KindMask::SERVICE | KindMask::INETD,
                        rt.runlevel,
                        false,
                        &rt.conds,
                    );
                    log::debug!("Reconfiguration done");

                    self.state = SmState::Running;
                }
            }

            if self.state == old_state {
                break;
            }
        }
    }
}
