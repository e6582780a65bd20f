//! Unix daemonization and signal wiring for `soba start --daemon`.

use anyhow::{bail, Result};

extern "C" fn handle_signal(_sig: libc::c_int) {
    soba_core::daemon::request_shutdown();
}

/// Route SIGTERM/SIGINT into the control loop's shutdown flag. The handler
/// only stores an atomic, which is async-signal-safe.
pub fn install_signal_handlers() {
    let handler = handle_signal as extern "C" fn(libc::c_int);
    unsafe {
        libc::signal(libc::SIGTERM, handler as libc::sighandler_t);
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
    }
}

/// Classic double-fork: detach from the controlling terminal and redirect
/// stdio to /dev/null. Logging must go to the file appender after this.
///
/// Call before any threads are spawned (fork only carries the calling
/// thread into the child).
pub fn daemonize() -> Result<()> {
    unsafe {
        match libc::fork() {
            -1 => bail!("fork failed"),
            0 => {}
            _ => libc::_exit(0),
        }
        if libc::setsid() == -1 {
            bail!("setsid failed");
        }
        match libc::fork() {
            -1 => bail!("second fork failed"),
            0 => {}
            _ => libc::_exit(0),
        }

        let fd = libc::open(b"/dev/null\0".as_ptr() as *const libc::c_char, libc::O_RDWR);
        if fd >= 0 {
            libc::dup2(fd, 0);
            libc::dup2(fd, 1);
            libc::dup2(fd, 2);
            if fd > 2 {
                libc::close(fd);
            }
        }
    }
    Ok(())
}
