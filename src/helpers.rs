//! Small filesystem and process helpers

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::process::Command;

/// Create `path` if missing; existing files are left untouched.
pub fn touch(path: &Path) -> io::Result<()> {
    OpenOptions::new().create(true).append(true).open(path)?;
    Ok(())
}

/// Remove `path`, ignoring a file that is already gone.
pub fn erase(path: &Path) {
    if let Err(err) = std::fs::remove_file(path) {
        if err.kind() != io::ErrorKind::NotFound {
            log::warn!("Failed removing {}: {}", path.display(), err);
        }
    }
}

/// Run a one-shot command through the shell, echoing a progress message.
/// Used for bootstrap directives like device-node creation and module
/// loading.
pub fn run_interactive(cmd: &str, msg: &str) {
    log::info!("{}", msg);

    match Command::new("/bin/sh").arg("-c").arg(cmd).status() {
        Ok(status) if status.success() => {}
        Ok(status) => log::warn!("Command '{}' exited with {}", cmd, status),
        Err(err) => log::warn!("Failed running '{}': {}", cmd, err),
    }
}
