//! utmp runlevel records
//!
//! Every completed runlevel transition is persisted as a RUN_LVL utmpx
//! record so tools like `runlevel(8)` and `who -r` can report it. Failures
//! are silent; the database may be missing or unwritable.

use std::time::{SystemTime, UNIX_EPOCH};

fn copy_field(dst: &mut [libc::c_char], src: &str) {
    for (d, b) in dst.iter_mut().zip(src.bytes()) {
        *d = b as libc::c_char;
    }
}

fn level_char(level: i32) -> u8 {
    if (0..=9).contains(&level) {
        b'0' + level as u8
    } else {
        b'N'
    }
}

/// Record a runlevel transition. The previous and new levels are encoded in
/// `ut_pid` the way `runlevel(8)` expects.
pub fn runlevel_set(prevlevel: i32, runlevel: u8) {
    let prev = level_char(prevlevel);
    let new = level_char(runlevel as i32);

    let mut ut: libc::utmpx = unsafe { std::mem::zeroed() };
    ut.ut_type = libc::RUN_LVL;
    ut.ut_pid = ((prev as libc::pid_t) << 8) | new as libc::pid_t;
    copy_field(&mut ut.ut_id, "~~");
    copy_field(&mut ut.ut_line, "~");
    copy_field(&mut ut.ut_user, "runlevel");

    if let Ok(now) = SystemTime::now().duration_since(UNIX_EPOCH) {
        ut.ut_tv.tv_sec = now.as_secs() as _;
        ut.ut_tv.tv_usec = now.subsec_micros() as _;
    }

    unsafe {
        libc::setutxent();
        if libc::pututxline(&ut).is_null() {
            log::debug!("Failed writing RUN_LVL utmp record");
        }
        libc::endutxent();
    }
}
