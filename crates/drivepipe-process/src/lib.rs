//! Subprocess lifecycle primitives.
//!
//! [`supervisor`] starts a command and waits for it under a deadline. When the
//! deadline passes the process is asked to stop (SIGTERM) and, if it is still
//! alive after a grace period, killed (SIGKILL). [`runner`] layers one-shot
//! output capture on top.

pub mod error;
pub mod runner;
#[cfg(unix)]
mod signal;
pub mod supervisor;

pub use error::{ProcessError, Result};
pub use runner::{CommandOutput, CommandRunner};
pub use supervisor::{
    run_with_deadline, start, start_with_config, wait_with_deadline, Completion, Escalation,
    ProcessHandle, SupervisorConfig, KILL_GRACE,
};
