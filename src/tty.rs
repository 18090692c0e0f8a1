//! TTY table adapter
//!
//! Getty lines registered from `tty` directives. Like services they are
//! marked and swept across reloads; unlike services they are deliberately
//! not brought up during bootstrap, only once the first real runlevel has
//! been reached.

use std::path::{Path, PathBuf};

use crate::conf::rlimits::RlimitTable;
use crate::conf::runlevels::{parse_runlevels, RunlevelMask};

#[derive(Debug)]
pub struct Tty {
    pub dev: String,
    pub args: Vec<String>,
    pub runlevels: RunlevelMask,
    pub rlimits: RlimitTable,
    pub origin: Option<PathBuf>,
    marked: bool,
    active: bool,
}

impl Tty {
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_marked(&self) -> bool {
        self.marked
    }
}

#[derive(Default)]
pub struct TtyTable {
    ttys: Vec<Tty>,
}

impl TtyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one `tty` declaration: optional `[runlevels]`, device path,
    /// free-form getty arguments. Re-registration updates in place.
    pub fn register(&mut self, decl: &str, rlimits: &RlimitTable, origin: Option<&Path>) {
        let Some(tokens) = shlex::split(decl) else {
            log::warn!("Invalid tty declaration: {}", decl);
            return;
        };

        let mut runlevels = None;
        let mut dev = None;
        let mut args = Vec::new();
        for tok in tokens {
            if dev.is_none() && tok.starts_with('[') {
                runlevels = Some(parse_runlevels(Some(&tok)));
            } else if dev.is_none() {
                dev = Some(tok);
            } else {
                args.push(tok);
            }
        }

        let Some(dev) = dev else {
            log::warn!("Invalid tty declaration: {}", decl);
            return;
        };
        let runlevels = runlevels.unwrap_or_else(|| parse_runlevels(None));

        if let Some(tty) = self.ttys.iter_mut().find(|t| t.dev == dev) {
            tty.args = args;
            tty.runlevels = runlevels;
            tty.rlimits = rlimits.clone();
            tty.origin = origin.map(|p| p.to_path_buf());
            tty.marked = false;
            log::debug!("Updated tty {}", tty.dev);
            return;
        }

        log::debug!("Registered tty {}", dev);
        self.ttys.push(Tty {
            dev,
            args,
            runlevels,
            rlimits: rlimits.clone(),
            origin: origin.map(|p| p.to_path_buf()),
            marked: false,
            active: false,
        });
    }

    /// Mark every entry as a sweep candidate.
    pub fn mark(&mut self) {
        for tty in &mut self.ttys {
            tty.marked = true;
        }
    }

    /// Re-evaluate after a reconfiguration. `None` sweeps stale entries;
    /// `Some(dev)` re-checks a single device.
    pub fn reload(&mut self, dev: Option<&str>) {
        match dev {
            None => {
                self.ttys.retain(|tty| {
                    if tty.marked {
                        log::info!("Unregistering tty {}", tty.dev);
                    }
                    !tty.marked
                });
            }
            Some(dev) => {
                if let Some(tty) = self.ttys.iter_mut().find(|t| t.dev == dev) {
                    tty.marked = false;
                }
            }
        }
    }

    /// Bring gettys up or down for the current runlevel.
    pub fn runlevel(&mut self, level: u8) {
        for tty in &mut self.ttys {
            let wanted = tty.runlevels.has(level);
            if wanted && !tty.active {
                log::info!("Starting getty on {} ...", tty.dev);
                tty.active = true;
            } else if !wanted && tty.active {
                log::info!("Stopping getty on {} ...", tty.dev);
                tty.active = false;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.ttys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ttys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tty> {
        self.ttys.iter()
    }

    pub fn find(&self, dev: &str) -> Option<&Tty> {
        self.ttys.iter().find(|t| t.dev == dev)
    }
}
