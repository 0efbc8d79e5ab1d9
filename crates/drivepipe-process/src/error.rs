use std::process::ExitStatus;
use std::time::Duration;

use crate::supervisor::Escalation;

/// Errors that can occur while running a supervised process.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// The executable could not be launched or its stdio could not be wired.
    #[error("failed to start {program}: {source}")]
    Start {
        program: String,
        source: std::io::Error,
    },

    /// Waiting on the process failed at the OS level.
    #[error("failed waiting on {program}: {source}")]
    Wait {
        program: String,
        source: std::io::Error,
    },

    /// The deadline passed, termination was requested and the process then
    /// ended in error (including being killed).
    #[error("{program} timed out after {timeout:?} ({escalation})")]
    Timeout {
        program: String,
        timeout: Duration,
        escalation: Escalation,
    },

    /// The process ended in error on its own.
    #[error("{program} exited unsuccessfully: {status}")]
    Exit { program: String, status: ExitStatus },
}

impl ProcessError {
    /// True when the supervisor gave up waiting, as opposed to the work failing.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProcessError::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, ProcessError>;
