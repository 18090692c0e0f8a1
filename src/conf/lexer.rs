//! Directive lexer for svinit configuration lines
//!
//! One directive per line, keyword followed by a space and its argument.
//! Tabs count as spaces and `#` starts a comment.

/// Recognized configuration directives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Host,
    Module,
    Mknod,
    Network,
    Runparts,
    Runlevel,
    Include,
    Shutdown,
    Rlimit,
    Service,
    Task,
    Run,
    Inetd,
    Tty,
}

/// Keyword table, longest keyword first so `runlevel`/`runparts` win over `run`.
const KEYWORDS: &[(&str, Directive)] = &[
    ("runlevel", Directive::Runlevel),
    ("runparts", Directive::Runparts),
    ("shutdown", Directive::Shutdown),
    ("network", Directive::Network),
    ("include", Directive::Include),
    ("service", Directive::Service),
    ("module", Directive::Module),
    ("rlimit", Directive::Rlimit),
    ("mknod", Directive::Mknod),
    ("inetd", Directive::Inetd),
    ("host", Directive::Host),
    ("task", Directive::Task),
    ("run", Directive::Run),
    ("tty", Directive::Tty),
];

impl Directive {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Module => "module",
            Self::Mknod => "mknod",
            Self::Network => "network",
            Self::Runparts => "runparts",
            Self::Runlevel => "runlevel",
            Self::Include => "include",
            Self::Shutdown => "shutdown",
            Self::Rlimit => "rlimit",
            Self::Service => "service",
            Self::Task => "task",
            Self::Run => "run",
            Self::Inetd => "inetd",
            Self::Tty => "tty",
        }
    }
}

/// Normalize a raw line: tabs become spaces, trailing newline and surrounding
/// whitespace are stripped.
pub fn normalize(line: &str) -> String {
    line.replace('\t', " ").trim().to_string()
}

/// Check whether a normalized line is a comment.
pub fn is_comment(line: &str) -> bool {
    line.starts_with('#')
}

/// Classify a normalized line into `(directive, argument)`.
///
/// The match is a case-insensitive prefix of `keyword ` (keyword plus one
/// space); the argument is the remainder, left-stripped. Comments and
/// unrecognized lines yield `None`.
pub fn lex(line: &str) -> Option<(Directive, &str)> {
    if line.is_empty() || is_comment(line) {
        return None;
    }

    for (kw, dir) in KEYWORDS {
        let n = kw.len();
        if line.len() > n
            && line.as_bytes()[n] == b' '
            && line[..n].eq_ignore_ascii_case(kw)
        {
            return Some((*dir, line[n + 1..].trim_start()));
        }
    }

    None
}
