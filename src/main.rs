//! svinit - init-style service supervisor
//!
//! Reads the main configuration file and the fragment directory, then
//! drives the supervisor state machine from a single-threaded event loop:
//! filesystem events feed the change record, child terminations drain stop
//! phases, and signals request runlevel changes or reloads.
//!
//! Signals:
//! - SIGHUP: reload configuration
//! - SIGUSR1: halt (runlevel 0)
//! - SIGUSR2/SIGTERM: power off (runlevel 0)
//! - SIGINT: reboot (runlevel 6)

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use tokio::signal::unix::{signal, SignalKind};

use svinit::conf::watcher::ConfWatcher;
use svinit::shutdown::HaltMode;
use svinit::{conf, logger, Paths, Runtime, Sm};

#[derive(Parser)]
#[command(name = "svinit")]
#[command(about = "Init-style service supervisor")]
struct Args {
    /// Main configuration file
    #[arg(long, default_value = "/etc/svinit.conf")]
    config: PathBuf,

    /// Directory of *.conf configuration fragments
    #[arg(long, default_value = "/etc/svinit.d")]
    confdir: PathBuf,

    /// Parse the configuration, print the resulting tables, and exit
    #[arg(long)]
    check: bool,
}

fn is_pid1() -> bool {
    std::process::id() == 1
}

/// Reap any children reparented to us; the service table collects its own
/// stop bookkeeping afterwards.
fn reap_zombies() {
    loop {
        match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => break,
            Ok(status) => {
                if let Some(pid) = status.pid() {
                    log::debug!("Reaped PID {}", pid);
                }
            }
            Err(Errno::ECHILD) => break,
            Err(err) => {
                log::error!("waitpid error: {}", err);
                break;
            }
        }
    }
}

/// Print the parsed tables (for --check).
fn print_tables(rt: &Runtime) {
    println!("hostname: {}", rt.hostname);
    println!("runlevel: {} (after bootstrap)", rt.cfglevel);
    println!();

    println!("services:");
    for svc in rt.services.iter() {
        let levels: String = (0..=9u8)
            .filter(|l| svc.runlevels.has(*l))
            .map(|l| char::from(b'0' + l))
            .collect();
        println!(
            "  {:<8} [{}] {} {}{}",
            svc.kind.as_str(),
            levels,
            svc.cmd,
            svc.args.join(" "),
            svc.descr
                .as_deref()
                .map(|d| format!(" -- {}", d))
                .unwrap_or_default(),
        );
    }

    println!();
    println!("ttys:");
    for tty in rt.ttys.iter() {
        println!("  {} {}", tty.dev, tty.args.join(" "));
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let paths = Paths {
        conf: args.config,
        confd: args.confdir,
        ..Paths::default()
    };

    let debug = conf::debug_from_cmdline(&paths.cmdline);
    logger::init(debug);

    let mut rt = if is_pid1() && !args.check {
        Runtime::pid1(paths)
    } else {
        Runtime::new(paths)
    };

    // Arm the watchers first so edits during the initial load are observed,
    // then do the initial full load.
    let mut watcher = ConfWatcher::arm(&rt.paths.conf, &rt.paths.confd);
    log::debug!("{} configuration watcher slot(s) armed", watcher.active_slots());
    conf::reload(&mut rt);

    if args.check {
        print_tables(&rt);
        return Ok(());
    }

    let mut sm = Sm::new();

    // Bootstrap runlevel S, then promote to the configured runlevel
    sm.step(&mut rt);
    sm.set_runlevel(rt.cfglevel as i32);

    let mut sigchld = signal(SignalKind::child())?;
    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigusr1 = signal(SignalKind::user_defined1())?;
    let mut sigusr2 = signal(SignalKind::user_defined2())?;

    let mut tick = tokio::time::interval(Duration::from_millis(100));

    loop {
        tokio::select! {
            _ = sigchld.recv() => {
                reap_zombies();
                rt.services.reap();
            }
            _ = sighup.recv() => {
                log::info!("Received SIGHUP, reloading configuration");
                sm.set_reload();
            }
            _ = sigusr1.recv() => {
                log::info!("Received SIGUSR1, halting");
                rt.halt = HaltMode::Halt;
                sm.set_runlevel(0);
            }
            _ = sigusr2.recv() => {
                log::info!("Received SIGUSR2, powering off");
                rt.halt = HaltMode::Poweroff;
                sm.set_runlevel(0);
            }
            _ = sigterm.recv() => {
                log::info!("Received SIGTERM, powering off");
                rt.halt = HaltMode::Poweroff;
                sm.set_runlevel(0);
            }
            _ = sigint.recv() => {
                log::info!("Received SIGINT, rebooting");
                rt.halt = HaltMode::Reboot;
                sm.set_runlevel(6);
            }
            _ = tick.tick() => {
                watcher.poll(&mut rt.changes);
                rt.services.reap();
            }
        }

        sm.step(&mut rt);
    }
}
