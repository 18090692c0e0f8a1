//! Configuration loading
//!
//! The main file takes both static directives (host, runlevel, include, ...)
//! and dynamic ones (service, task, rlimit, tty, ...); fragments under the
//! configuration directory take the dynamic set only. A full reload follows
//! the mark/sweep discipline: everything is marked, re-declared entries are
//! unmarked as they parse, and the state machine unregisters what is left.

pub mod changes;
pub mod lexer;
pub mod rlimits;
pub mod runlevels;
pub mod watcher;

use std::path::Path;

use crate::helpers;
use crate::runtime::{Runtime, DEFAULT_RUNLEVEL, DEFHOST};
use crate::svc::{SvcKind, COND_SIZE};

use self::lexer::Directive;
use self::rlimits::RlimitTable;

#[derive(Debug, thiserror::Error)]
pub enum ConfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Check the kernel command line for a debug request.
pub fn debug_from_cmdline(path: &Path) -> bool {
    match std::fs::read_to_string(path) {
        Ok(line) => line.contains("finit_debug") || line.contains("--debug"),
        Err(_) => false,
    }
}

/// Parsed condition token from a service declaration.
#[derive(Debug, PartialEq, Eq)]
pub struct CondDecl {
    pub expr: String,
    /// Leading `!` on the condition: the daemon does not take SIGHUP.
    pub sighup_opt_out: bool,
}

/// Parse the condition text following the `<` marker. Returns `None` when
/// the expression exceeds the condition-field capacity; the caller leaves
/// the declaration untouched.
pub fn parse_cond(raw: &str) -> Option<CondDecl> {
    let (sighup_opt_out, rest) = match raw.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };

    let expr = match rest.find('>') {
        Some(pos) => &rest[..pos],
        None => rest,
    };

    if expr.len() >= COND_SIZE {
        return None;
    }

    Some(CondDecl {
        expr: expr.to_string(),
        sighup_opt_out,
    })
}

/// Parse the `runlevel` directive argument. Valid levels are 1..=9 except
/// the reboot level 6; everything else falls back to the default.
fn parse_runlevel_directive(arg: &str) -> u8 {
    let level = arg
        .trim()
        .parse::<u8>()
        .ok()
        .filter(|l| (1..=9).contains(l))
        .unwrap_or(DEFAULT_RUNLEVEL);

    if level == 6 {
        DEFAULT_RUNLEVEL
    } else {
        level
    }
}

/// Apply one directive from the main file. Some directives are honored
/// during bootstrap only; the dynamic set falls through to
/// [`dispatch_dynamic`].
fn dispatch_main(rt: &mut Runtime, limits: &mut RlimitTable, dir: Directive, arg: &str) {
    let bootstrap = rt.runlevel == 0;

    match dir {
        Directive::Host
        | Directive::Mknod
        | Directive::Network
        | Directive::Runparts
        | Directive::Runlevel => {
            if !bootstrap {
                log::debug!("{} is honored during bootstrap only, ignoring", dir.as_str());
                return;
            }
            match dir {
                Directive::Host => {
                    let host = arg.trim();
                    if !host.is_empty() {
                        rt.hostname = host.to_string();
                    }
                }
                Directive::Mknod => {
                    if rt.live {
                        helpers::run_interactive(
                            &format!("mknod {}", arg),
                            &format!("Creating device node {}", arg),
                        );
                    } else {
                        log::debug!("Skipping device node {} (not live)", arg);
                    }
                }
                Directive::Network => rt.network = Some(arg.trim().to_string()),
                Directive::Runparts => rt.runparts = Some(arg.trim().into()),
                Directive::Runlevel => rt.cfglevel = parse_runlevel_directive(arg),
                _ => unreachable!(),
            }
        }

        Directive::Include => {
            let path = Path::new(arg.trim());
            if !path.is_absolute() || !path.exists() {
                log::error!("Cannot find include file {}, absolute path required!", arg);
                return;
            }
            if let Err(err) = parse_main(rt, limits, path) {
                log::error!("Failed parsing include file {}: {}", path.display(), err);
            }
        }

        Directive::Shutdown => rt.sdown = Some(arg.trim().into()),

        _ => dispatch_dynamic(rt, limits, dir, arg, None),
    }
}

/// Apply one directive from the dynamic set, valid in the main file and in
/// every fragment. `origin` is the fragment path, `None` for the main file.
fn dispatch_dynamic(
    rt: &mut Runtime,
    limits: &mut RlimitTable,
    dir: Directive,
    arg: &str,
    origin: Option<&Path>,
) {
    match dir {
        Directive::Module => {
            if rt.runlevel != 0 {
                return;
            }
            let module = arg.trim();
            if rt.live {
                helpers::run_interactive(
                    &format!("modprobe {}", module),
                    &format!("Loading kernel module {}", module),
                );
            } else {
                log::debug!("Skipping kernel module {} (not live)", module);
            }
        }

        Directive::Service => rt.services.register(SvcKind::Service, arg, limits, origin),
        Directive::Task => rt.services.register(SvcKind::Task, arg, limits, origin),
        Directive::Run => rt.services.register(SvcKind::Run, arg, limits, origin),

        #[cfg(feature = "inetd")]
        Directive::Inetd => rt.services.register(SvcKind::Inetd, arg, limits, origin),
        #[cfg(not(feature = "inetd"))]
        Directive::Inetd => {
            log::error!(
                "Built with inetd support disabled, cannot register service inetd {}!",
                arg
            );
        }

        Directive::Rlimit => limits.parse(arg),
        Directive::Tty => rt.ttys.register(arg, limits, origin),

        // Static directive inside a fragment
        _ => log::debug!("Skipping {} directive in fragment", dir.as_str()),
    }
}

fn parse_lines<F>(path: &Path, mut apply: F) -> Result<(), ConfError>
where
    F: FnMut(Directive, &str),
{
    let content = std::fs::read_to_string(path)?;
    log::debug!("Parsing {}", path.display());

    for raw in content.lines() {
        let line = lexer::normalize(raw);
        if line.is_empty() || lexer::is_comment(&line) {
            continue;
        }

        match lexer::lex(&line) {
            Some((dir, arg)) => apply(dir, arg),
            None => log::warn!("Unknown directive: {}", line),
        }
    }

    Ok(())
}

/// Parse the main file (or an included file): static and dynamic passes
/// against the global limit table.
fn parse_main(rt: &mut Runtime, limits: &mut RlimitTable, path: &Path) -> Result<(), ConfError> {
    // Collect first: includes recurse back into parse_main
    let mut directives = Vec::new();
    parse_lines(path, |dir, arg| directives.push((dir, arg.to_string())))?;

    for (dir, arg) in directives {
        dispatch_main(rt, limits, dir, &arg);
    }
    Ok(())
}

/// Parse one fragment with the dynamic directive set, against a per-file
/// clone of the global limit table.
fn parse_fragment(rt: &mut Runtime, globals: &RlimitTable, path: &Path) -> Result<(), ConfError> {
    let mut working = globals.clone();
    let mut directives = Vec::new();
    parse_lines(path, |dir, arg| directives.push((dir, arg.to_string())))?;

    for (dir, arg) in directives {
        dispatch_dynamic(rt, &mut working, dir, &arg, Some(path));
    }
    Ok(())
}

/// Scan the fragment directory in lexicographic order and parse every
/// regular `*.conf` file found there.
fn scan_fragments(rt: &mut Runtime, globals: &RlimitTable) {
    let dir = rt.paths.confd.clone();
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(_) => {
            log::debug!("Skipping {}, no files found ...", dir.display());
            return;
        }
    };

    let mut names: Vec<_> = entries
        .filter_map(|e| e.ok().map(|e| e.file_name()))
        .collect();
    names.sort();

    for name in names {
        let path = dir.join(&name);

        let meta = match std::fs::symlink_metadata(&path) {
            Ok(meta) => meta,
            Err(err) => {
                log::debug!("Skipping {}, cannot access: {}", path.display(), err);
                continue;
            }
        };

        if meta.is_dir() {
            log::debug!("Skipping directory {}", path.display());
            continue;
        }

        if meta.file_type().is_symlink() {
            if let Err(err) = std::fs::canonicalize(&path) {
                log::warn!("Skipping {}, dangling symlink: {}", path.display(), err);
                continue;
            }
        }

        if !name.to_string_lossy().ends_with(".conf") {
            log::debug!("Skipping {}, not a valid .conf ...", path.display());
            continue;
        }

        if let Err(err) = parse_fragment(rt, globals, &path) {
            log::warn!("Failed opening {}: {}", path.display(), err);
        }
    }
}

/// Resolve the final hostname: the hostname file wins over the `host`
/// directive, which wins over the compiled-in default.
fn set_hostname(rt: &mut Runtime) {
    if let Ok(content) = std::fs::read_to_string(&rt.paths.hostname_file) {
        let name = content.lines().next().unwrap_or("").trim();
        if !name.is_empty() {
            rt.hostname = name.to_string();
        }
    }

    if rt.hostname.is_empty() {
        rt.hostname = DEFHOST.to_string();
    }

    if rt.live {
        if let Err(err) = nix::unistd::sethostname(&rt.hostname) {
            log::warn!("Failed setting hostname {}: {}", rt.hostname, err);
        }
    }
}

/// Full reload of the main file and every fragment.
///
/// Marks all services and TTYs for sweeping, seeds the global limits from
/// the OS, parses the main file, scans the fragment directory, applies the
/// merged limits, drops the change record, and resolves the hostname.
/// Entries still marked afterwards are stale; the state machine unregisters
/// them once their stop phase has drained.
pub fn reload(rt: &mut Runtime) {
    rt.services.mark_dynamic();
    rt.ttys.mark();

    let mut limits = RlimitTable::default();
    limits.snapshot_os();

    let conf = rt.paths.conf.clone();
    if let Err(err) = parse_main(rt, &mut limits, &conf) {
        log::debug!("Failed opening {}: {}", conf.display(), err);
    }

    scan_fragments(rt, &limits);

    rt.rlimits = limits;
    if rt.live {
        rt.rlimits.apply_os();
    }

    rt.changes.drop_all();

    set_hostname(rt);
}
