//! Thin wrappers over the POSIX calls the supervisor needs.

use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Signal {
    Term,
    Kill,
}

/// Where a signal is delivered: a single pid, or the process group it leads.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Target {
    pub(crate) pid: u32,
    pub(crate) group: bool,
}

impl Target {
    pub(crate) fn send(self, signal: Signal) -> io::Result<()> {
        let signo = match signal {
            Signal::Term => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
        };
        let pid = self.pid as libc::pid_t;
        let target = if self.group { -pid } else { pid };

        // SAFETY: kill(2) takes plain integers and has no memory-safety
        // preconditions. The caller guarantees the pid has not been reaped.
        let rc = unsafe { libc::kill(target, signo) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

/// Block until `pid` has exited, leaving it unreaped.
///
/// The zombie keeps the pid (and its process group id) reserved, so signals
/// sent before the caller reaps can never reach a recycled process.
pub(crate) fn wait_exited(pid: u32) -> io::Result<()> {
    loop {
        // SAFETY: siginfo_t is a plain C struct for which all-zero is valid.
        let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
        // SAFETY: `info` is a valid writable siginfo_t for the whole call.
        let rc = unsafe {
            libc::waitid(
                libc::P_PID,
                pid as libc::id_t,
                &mut info,
                libc::WEXITED | libc::WNOWAIT,
            )
        };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

/// ESRCH: the target is already gone, an expected race after exit.
pub(crate) fn is_gone(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::ESRCH)
}
