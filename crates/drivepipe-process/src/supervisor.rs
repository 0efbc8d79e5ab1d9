use std::fmt;
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, ExitStatus};
use std::time::Duration;

use tracing::debug;

use crate::error::{ProcessError, Result};

/// Delay between the graceful termination signal and the forced kill.
pub const KILL_GRACE: Duration = Duration::from_secs(5);

/// Configuration for starting and escalating supervised processes.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Time between SIGTERM and SIGKILL once the deadline has passed.
    pub grace: Duration,
    /// Start the child as the leader of a new process group and signal the
    /// whole group, so wrapper shells and their children stop together.
    /// Ignored on platforms without process groups.
    pub process_group: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            grace: KILL_GRACE,
            process_group: true,
        }
    }
}

/// How far deadline escalation got before the process exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// The process exited before its deadline; no signal was sent.
    None,
    /// The graceful termination signal was sent.
    Terminated,
    /// The grace period also expired and the process was killed.
    Killed,
}

impl fmt::Display for Escalation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Escalation::None => f.write_str("no signal sent"),
            Escalation::Terminated => f.write_str("terminate requested"),
            Escalation::Killed => f.write_str("killed after grace period"),
        }
    }
}

/// A supervised process that ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub status: ExitStatus,
    /// A process may exit cleanly in response to SIGTERM; that still counts
    /// as success and is recorded here as [`Escalation::Terminated`].
    pub escalation: Escalation,
}

/// A running external command.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    program: String,
    process_group: bool,
}

impl ProcessHandle {
    /// OS process id.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Program name the process was started with.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Take the child's stdin pipe, if it was piped.
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    /// Take the child's stdout pipe, if it was piped.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Take the child's stderr pipe, if it was piped.
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Kill the process (its whole group when started as a group leader)
    /// and reap it, without a graceful stage.
    ///
    /// For abandoning a process that was started but cannot be used.
    pub fn kill(&mut self) -> std::io::Result<ExitStatus> {
        if let Some(status) = self.child.try_wait()? {
            return Ok(status);
        }

        #[cfg(unix)]
        if self.process_group {
            let target = crate::signal::Target {
                pid: self.id(),
                group: true,
            };
            match target.send(crate::signal::Signal::Kill) {
                Ok(()) => {}
                Err(err) if crate::signal::is_gone(&err) => {}
                Err(err) => return Err(err),
            }
            return self.child.wait();
        }

        self.child.kill()?;
        self.child.wait()
    }
}

/// Start a command with the default supervisor configuration.
pub fn start(command: Command) -> Result<ProcessHandle> {
    start_with_config(command, &SupervisorConfig::default())
}

/// Start a command.
///
/// The `Command` is consumed so that any pipe ends it holds are closed in the
/// parent as soon as the child is running.
pub fn start_with_config(
    mut command: Command,
    config: &SupervisorConfig,
) -> Result<ProcessHandle> {
    let program = command.get_program().to_string_lossy().into_owned();

    #[cfg(unix)]
    if config.process_group {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let child = command.spawn().map_err(|source| ProcessError::Start {
        program: program.clone(),
        source,
    })?;
    debug!(pid = child.id(), program = %program, "process started");

    Ok(ProcessHandle {
        child,
        program,
        process_group: cfg!(unix) && config.process_group,
    })
}

/// Start a command and wait for it under a deadline.
pub fn run_with_deadline(
    command: Command,
    timeout: Duration,
    grace: Duration,
) -> Result<Completion> {
    let mut handle = start(command)?;
    wait_with_deadline(&mut handle, timeout, grace)
}

/// Wait for the process, escalating once `timeout` has passed.
///
/// At `timeout` the process is sent SIGTERM; if it is still running `grace`
/// later it is sent SIGKILL. Resolution, in order:
/// 1. clean exit → `Ok`, even if SIGTERM was already sent;
/// 2. a signal was sent and the exit was not clean → [`ProcessError::Timeout`];
/// 3. otherwise → [`ProcessError::Exit`] with the process's own status.
///
/// Any timer that has not fired is cancelled before this returns, on every
/// path.
pub fn wait_with_deadline(
    handle: &mut ProcessHandle,
    timeout: Duration,
    grace: Duration,
) -> Result<Completion> {
    match handle.child.try_wait() {
        Ok(Some(status)) => return resolve(handle, timeout, Escalation::None, status),
        Ok(None) => {}
        Err(source) => return Err(wait_error(handle, source)),
    }

    let escalation =
        imp::wait_escalating(handle, timeout, grace).map_err(|e| wait_error(handle, e))?;
    let status = handle.child.wait().map_err(|e| wait_error(handle, e))?;
    resolve(handle, timeout, escalation, status)
}

fn wait_error(handle: &ProcessHandle, source: std::io::Error) -> ProcessError {
    ProcessError::Wait {
        program: handle.program.clone(),
        source,
    }
}

fn resolve(
    handle: &ProcessHandle,
    timeout: Duration,
    escalation: Escalation,
    status: ExitStatus,
) -> Result<Completion> {
    debug!(
        pid = handle.id(),
        program = %handle.program,
        %status,
        %escalation,
        "process exited"
    );

    if status.success() {
        return Ok(Completion { status, escalation });
    }
    if escalation != Escalation::None {
        return Err(ProcessError::Timeout {
            program: handle.program.clone(),
            timeout,
            escalation,
        });
    }
    Err(ProcessError::Exit {
        program: handle.program.clone(),
        status,
    })
}

#[cfg(unix)]
mod imp {
    use std::io;
    use std::sync::mpsc::{self, RecvTimeoutError};
    use std::sync::{Arc, Mutex, PoisonError};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    use tracing::{debug, trace, warn};

    use super::{Escalation, ProcessHandle};
    use crate::signal::{self, Signal, Target};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum ProcessState {
        Running,
        TerminateRequested,
        Killed,
        Exited,
    }

    type SharedState = Arc<Mutex<ProcessState>>;

    /// Block until the process exits (unreaped) while a timer escalates.
    pub(super) fn wait_escalating(
        handle: &ProcessHandle,
        timeout: Duration,
        grace: Duration,
    ) -> io::Result<Escalation> {
        let state: SharedState = Arc::new(Mutex::new(ProcessState::Running));
        let target = Target {
            pid: handle.id(),
            group: handle.process_group,
        };
        let mut timer = EscalationTimer::arm(target, Arc::clone(&state), timeout, grace)?;

        let exited = signal::wait_exited(target.pid);

        // Flip to Exited under the lock the timer signals under, before the
        // process is reaped. From here on no signal can be sent.
        let prior = {
            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *state, ProcessState::Exited)
        };
        timer.cancel();
        exited?;

        Ok(match prior {
            ProcessState::Running | ProcessState::Exited => Escalation::None,
            ProcessState::TerminateRequested => Escalation::Terminated,
            ProcessState::Killed => Escalation::Killed,
        })
    }

    /// Two-stage one-shot timer on its own thread; dropping it cancels it.
    struct EscalationTimer {
        cancel: Option<mpsc::Sender<()>>,
        thread: Option<JoinHandle<()>>,
    }

    impl EscalationTimer {
        fn arm(
            target: Target,
            state: SharedState,
            timeout: Duration,
            grace: Duration,
        ) -> io::Result<Self> {
            let (cancel, cancelled) = mpsc::channel();
            let thread = thread::Builder::new()
                .name(format!("drivepipe-deadline-{}", target.pid))
                .spawn(move || escalate(target, &cancelled, &state, timeout, grace))?;
            Ok(Self {
                cancel: Some(cancel),
                thread: Some(thread),
            })
        }

        fn cancel(&mut self) {
            drop(self.cancel.take());
            if let Some(thread) = self.thread.take() {
                let _ = thread.join();
            }
        }
    }

    impl Drop for EscalationTimer {
        fn drop(&mut self) {
            self.cancel();
        }
    }

    fn escalate(
        target: Target,
        cancelled: &mpsc::Receiver<()>,
        state: &SharedState,
        timeout: Duration,
        grace: Duration,
    ) {
        if !expired(cancelled, timeout) {
            return;
        }
        debug!(pid = target.pid, ?timeout, "deadline passed, requesting termination");
        if !advance(
            target,
            state,
            ProcessState::Running,
            ProcessState::TerminateRequested,
            Signal::Term,
        ) {
            return;
        }

        if !expired(cancelled, grace) {
            return;
        }
        debug!(pid = target.pid, ?grace, "grace period expired, killing");
        advance(
            target,
            state,
            ProcessState::TerminateRequested,
            ProcessState::Killed,
            Signal::Kill,
        );
    }

    /// Sleep for `after` unless cancelled first. Disconnection is cancellation.
    fn expired(cancelled: &mpsc::Receiver<()>, after: Duration) -> bool {
        matches!(cancelled.recv_timeout(after), Err(RecvTimeoutError::Timeout))
    }

    fn advance(
        target: Target,
        state: &SharedState,
        from: ProcessState,
        to: ProcessState,
        signal: Signal,
    ) -> bool {
        let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != from {
            trace!(pid = target.pid, state = ?*state, "escalation superseded");
            return false;
        }
        match target.send(signal) {
            Ok(()) => {
                *state = to;
                true
            }
            Err(err) if signal::is_gone(&err) => {
                trace!(pid = target.pid, ?signal, "process already gone");
                false
            }
            Err(err) => {
                warn!(pid = target.pid, ?signal, error = %err, "failed to signal process");
                false
            }
        }
    }
}

#[cfg(not(unix))]
mod imp {
    use std::io;
    use std::thread;
    use std::time::{Duration, Instant};

    use tracing::debug;

    use super::{Escalation, ProcessHandle};

    const POLL_INTERVAL: Duration = Duration::from_millis(20);

    /// Without POSIX signals there is no graceful stage: the deadline kills.
    pub(super) fn wait_escalating(
        handle: &mut ProcessHandle,
        timeout: Duration,
        _grace: Duration,
    ) -> io::Result<Escalation> {
        let started = Instant::now();
        let mut escalation = Escalation::None;
        while handle.child.try_wait()?.is_none() {
            if escalation == Escalation::None && started.elapsed() >= timeout {
                debug!(pid = handle.id(), ?timeout, "deadline passed, killing");
                handle.child.kill()?;
                escalation = Escalation::Killed;
            }
            thread::sleep(POLL_INTERVAL);
        }
        Ok(escalation)
    }
}
