//! Resource-limit directives
//!
//! `rlimit <soft|hard> <resource> <value>` lines mutate a limit table. The
//! global table is seeded from the OS at each full reload; every fragment
//! parses against its own clone of the globals.

use nix::sys::resource::{getrlimit, setrlimit, Resource, RLIM_INFINITY};

/// Inclusive parse ceiling for numeric limit values, kept at `2 << 31`
/// (one past `u32::MAX`).
pub const RLIM_CEILING: u64 = 2 << 31;

/// Closed set of resource kinds accepted by the `rlimit` directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RlimitKind {
    As,
    Core,
    Cpu,
    Data,
    Fsize,
    Locks,
    Memlock,
    Msgqueue,
    Nice,
    Nofile,
    Nproc,
    Rss,
    Rtprio,
    Rttime,
    Sigpending,
    Stack,
}

pub const RLIMIT_KINDS: [RlimitKind; 16] = [
    RlimitKind::As,
    RlimitKind::Core,
    RlimitKind::Cpu,
    RlimitKind::Data,
    RlimitKind::Fsize,
    RlimitKind::Locks,
    RlimitKind::Memlock,
    RlimitKind::Msgqueue,
    RlimitKind::Nice,
    RlimitKind::Nofile,
    RlimitKind::Nproc,
    RlimitKind::Rss,
    RlimitKind::Rtprio,
    RlimitKind::Rttime,
    RlimitKind::Sigpending,
    RlimitKind::Stack,
];

impl RlimitKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::As => "as",
            Self::Core => "core",
            Self::Cpu => "cpu",
            Self::Data => "data",
            Self::Fsize => "fsize",
            Self::Locks => "locks",
            Self::Memlock => "memlock",
            Self::Msgqueue => "msgqueue",
            Self::Nice => "nice",
            Self::Nofile => "nofile",
            Self::Nproc => "nproc",
            Self::Rss => "rss",
            Self::Rtprio => "rtprio",
            Self::Rttime => "rttime",
            Self::Sigpending => "sigpending",
            Self::Stack => "stack",
        }
    }

    /// Resource names are case-sensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        RLIMIT_KINDS.iter().copied().find(|k| k.name() == name)
    }

    fn index(&self) -> usize {
        RLIMIT_KINDS.iter().position(|k| k == self).unwrap()
    }

    fn resource(&self) -> Resource {
        match self {
            Self::As => Resource::RLIMIT_AS,
            Self::Core => Resource::RLIMIT_CORE,
            Self::Cpu => Resource::RLIMIT_CPU,
            Self::Data => Resource::RLIMIT_DATA,
            Self::Fsize => Resource::RLIMIT_FSIZE,
            Self::Locks => Resource::RLIMIT_LOCKS,
            Self::Memlock => Resource::RLIMIT_MEMLOCK,
            Self::Msgqueue => Resource::RLIMIT_MSGQUEUE,
            Self::Nice => Resource::RLIMIT_NICE,
            Self::Nofile => Resource::RLIMIT_NOFILE,
            Self::Nproc => Resource::RLIMIT_NPROC,
            Self::Rss => Resource::RLIMIT_RSS,
            Self::Rtprio => Resource::RLIMIT_RTPRIO,
            Self::Rttime => Resource::RLIMIT_RTTIME,
            Self::Sigpending => Resource::RLIMIT_SIGPENDING,
            Self::Stack => Resource::RLIMIT_STACK,
        }
    }
}

/// One soft/hard limit pair. `RLIM_INFINITY` means no bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rlim {
    pub soft: u64,
    pub hard: u64,
}

impl Default for Rlim {
    fn default() -> Self {
        Self {
            soft: RLIM_INFINITY,
            hard: RLIM_INFINITY,
        }
    }
}

/// Limit table over every resource kind.
#[derive(Debug, Clone, Default)]
pub struct RlimitTable {
    limits: [Rlim; RLIMIT_KINDS.len()],
}

impl RlimitTable {
    pub fn get(&self, kind: RlimitKind) -> Rlim {
        self.limits[kind.index()]
    }

    /// Seed every entry from the running process's current limits.
    pub fn snapshot_os(&mut self) {
        for kind in RLIMIT_KINDS {
            match getrlimit(kind.resource()) {
                Ok((soft, hard)) => self.limits[kind.index()] = Rlim { soft, hard },
                Err(err) => log::debug!("rlimit: cannot read {}: {}", kind.name(), err),
            }
        }
    }

    /// Apply every entry to the running process. A failed kind is logged
    /// and the rest are still applied.
    pub fn apply_os(&self) {
        for kind in RLIMIT_KINDS {
            let lim = self.limits[kind.index()];
            if let Err(err) = setrlimit(kind.resource(), lim.soft, lim.hard) {
                log::warn!("rlimit: failed setting {}: {}", kind.name(), err);
            }
        }
    }

    /// Apply one `rlimit` directive argument: `<soft|hard> <resource> <value>`.
    ///
    /// Any malformed token logs a warning and leaves the table unchanged.
    pub fn parse(&mut self, arg: &str) {
        let mut tokens = arg.split_whitespace();
        let (Some(level), Some(resource), Some(value)) =
            (tokens.next(), tokens.next(), tokens.next())
        else {
            log::warn!("rlimit: parse error: {}", arg);
            return;
        };

        let Some(kind) = RlimitKind::from_name(resource) else {
            log::warn!("rlimit: unknown resource: {}", resource);
            return;
        };

        // `unlimited` is the official keyword, `infinity` kept as synonym
        let cfg = if value == "unlimited" || value == "infinity" {
            RLIM_INFINITY
        } else {
            match value.parse::<u64>() {
                Ok(v) if v <= RLIM_CEILING => v,
                _ => {
                    log::warn!("rlimit: invalid {} value: {}", kind.name(), value);
                    return;
                }
            }
        };

        let lim = &mut self.limits[kind.index()];
        match level {
            "soft" => lim.soft = cfg,
            "hard" => lim.hard = cfg,
            _ => log::warn!("rlimit: parse error: {}", arg),
        }
    }
}
