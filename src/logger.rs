//! Logging setup
//!
//! All modules log through the `log` facade; the binary initializes
//! `env_logger` here. During shutdown the formatter switches to terse
//! output so console messages read cleanly on the final console.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

static TERSE: AtomicBool = AtomicBool::new(false);

/// Initialize the logger. `debug` forces the debug level (kernel command
/// line override); otherwise the usual RUST_LOG environment applies with an
/// info default.
pub fn init(debug: bool) {
    let default = if debug { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format(|buf, record| {
            if TERSE.load(Ordering::Relaxed) {
                writeln!(buf, "{}", record.args())
            } else {
                writeln!(buf, "[{:<5}] {}", record.level(), record.args())
            }
        })
        .init();
}

/// Switch to terse formatting for the shutdown path.
pub fn exit() {
    TERSE.store(true, Ordering::Relaxed);
}

pub fn is_terse() -> bool {
    TERSE.load(Ordering::Relaxed)
}
