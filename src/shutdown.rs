//! System halt, poweroff, and reboot
//!
//! The state machine issues a single shutdown action after the final
//! runlevel 0/6 drain. The action is a trait so the supervisor core stays
//! testable; the system implementation runs the configured shutdown script,
//! syncs, and calls the reboot syscall.

use std::path::Path;

use nix::sys::reboot::{reboot, RebootMode};
use nix::unistd::sync;

use crate::helpers;

/// How the machine should go down when reaching runlevel 0 or 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltMode {
    /// Stop the system but leave power on.
    Halt,
    Poweroff,
    Reboot,
}

impl HaltMode {
    fn to_reboot_mode(self) -> RebootMode {
        match self {
            Self::Halt => RebootMode::RB_HALT_SYSTEM,
            Self::Poweroff => RebootMode::RB_POWER_OFF,
            Self::Reboot => RebootMode::RB_AUTOBOOT,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Halt => "halt",
            Self::Poweroff => "poweroff",
            Self::Reboot => "reboot",
        }
    }
}

/// Final action taken when the machine leaves runlevel 0/6 wait.
pub trait ShutdownAction {
    fn shutdown(&mut self, mode: HaltMode, script: Option<&Path>);
}

/// Real shutdown: run the configured script, sync, reboot(2).
pub struct SystemShutdown;

impl ShutdownAction for SystemShutdown {
    fn shutdown(&mut self, mode: HaltMode, script: Option<&Path>) {
        log::info!("Initiating {} sequence", mode.as_str());

        if let Some(script) = script {
            helpers::run_interactive(
                &script.display().to_string(),
                &format!("Running shutdown script {}", script.display()),
            );
        }

        log::info!("Syncing filesystems");
        sync();

        if let Err(err) = reboot(mode.to_reboot_mode()) {
            log::error!("reboot() failed: {}", err);
        }
    }
}

/// Inert action used when not running as the real supervisor; records the
/// request in the log only.
pub struct LogShutdown;

impl ShutdownAction for LogShutdown {
    fn shutdown(&mut self, mode: HaltMode, _script: Option<&Path>) {
        log::info!("Shutdown requested ({}), not running live", mode.as_str());
    }
}
