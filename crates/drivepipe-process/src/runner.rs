use std::ffi::OsStr;
use std::io::{self, PipeReader, Read};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::error::{ProcessError, Result};
use crate::supervisor::{start_with_config, wait_with_deadline, Completion, SupervisorConfig};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Captured output of a one-shot command together with how it ended.
#[derive(Debug)]
pub struct CommandOutput {
    /// Combined stdout and stderr, lossily decoded as UTF-8.
    pub output: String,
    pub result: Result<Completion>,
}

impl CommandOutput {
    /// Drop the output on failure.
    pub fn into_result(self) -> Result<String> {
        self.result.map(|_| self.output)
    }
}

/// Runs one-shot commands under a deadline and captures their output.
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    config: SupervisorConfig,
}

impl CommandRunner {
    /// Runner with the default grace period and process-group signalling.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner with explicit supervisor settings.
    pub fn with_config(config: SupervisorConfig) -> Self {
        Self { config }
    }

    /// Supervisor settings applied to every run.
    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Run `program` with `args`, stdout and stderr merged into one buffer.
    ///
    /// The captured text is returned whatever the outcome, so callers can
    /// inspect partial output after a timeout.
    pub fn run<I, S>(
        &self,
        program: impl AsRef<OsStr>,
        args: I,
        timeout: Duration,
    ) -> CommandOutput
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let program = program.as_ref();
        let (reader, command) = match merged_output_command(program, args) {
            Ok(parts) => parts,
            Err(source) => {
                return CommandOutput {
                    output: String::new(),
                    result: Err(ProcessError::Start {
                        program: program.to_string_lossy().into_owned(),
                        source,
                    }),
                };
            }
        };

        let mut handle = match start_with_config(command, &self.config) {
            Ok(handle) => handle,
            Err(err) => {
                return CommandOutput {
                    output: String::new(),
                    result: Err(err),
                };
            }
        };

        let capture = OutputCapture::spawn(reader);
        let result = wait_with_deadline(&mut handle, timeout, self.config.grace);
        let output = capture.finish(self.config.grace);

        CommandOutput { output, result }
    }

    /// Run `program` with a flat argument string split on whitespace.
    pub fn run_line(
        &self,
        program: impl AsRef<OsStr>,
        arguments: &str,
        timeout: Duration,
    ) -> CommandOutput {
        self.run(program, arguments.split_whitespace(), timeout)
    }
}

/// Build a command whose stdout and stderr share one pipe.
///
/// The returned `Command` owns both write ends; it must be dropped once the
/// child is spawned or the reader never sees EOF.
fn merged_output_command<I, S>(program: &OsStr, args: I) -> io::Result<(PipeReader, Command)>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let (reader, stdout) = io::pipe()?;
    let stderr = stdout.try_clone()?;

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr);
    Ok((reader, command))
}

/// Background reader collecting everything written to the merged pipe.
struct OutputCapture {
    buf: Arc<Mutex<Vec<u8>>>,
    done: Receiver<()>,
}

impl OutputCapture {
    fn spawn(mut reader: PipeReader) -> Self {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done) = mpsc::channel();

        let sink = Arc::clone(&buf);
        thread::spawn(move || {
            let mut chunk = [0u8; READ_CHUNK_SIZE];
            loop {
                match reader.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => sink
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .extend_from_slice(&chunk[..n]),
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) => {
                        debug!(error = %err, "output capture stopped");
                        break;
                    }
                }
            }
            let _ = done_tx.send(());
        });

        Self { buf, done }
    }

    /// Wait up to `drain` for EOF, then take whatever was captured.
    ///
    /// A descendant that inherited the pipe can keep it open after the
    /// supervised process is gone; the runner does not wait on it.
    fn finish(self, drain: Duration) -> String {
        if self.done.recv_timeout(drain).is_err() {
            debug!(?drain, "output pipe still open after exit, returning partial output");
        }
        let bytes = std::mem::take(&mut *self.buf.lock().unwrap_or_else(PoisonError::into_inner));
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::supervisor::Escalation;

    #[test]
    fn captures_output_of_clean_exit() {
        let out = CommandRunner::new().run("echo", ["hi"], Duration::from_secs(1));

        assert!(out.output.contains("hi"));
        let completion = out.result.unwrap();
        assert_eq!(completion.escalation, Escalation::None);
    }

    #[test]
    fn merges_stdout_and_stderr() {
        let out = CommandRunner::new().run(
            "sh",
            ["-c", "echo to-stdout; echo to-stderr >&2"],
            Duration::from_secs(5),
        );

        assert!(out.output.contains("to-stdout"));
        assert!(out.output.contains("to-stderr"));
        assert_eq!(out.into_result().unwrap().lines().count(), 2);
    }

    #[test]
    fn keeps_partial_output_on_timeout() {
        let runner = CommandRunner::with_config(SupervisorConfig {
            grace: Duration::from_millis(500),
            ..SupervisorConfig::default()
        });

        let started = Instant::now();
        let out = runner.run(
            "sh",
            ["-c", "echo partial; sleep 30"],
            Duration::from_millis(300),
        );

        assert!(out.output.contains("partial"));
        assert!(out.result.as_ref().unwrap_err().is_timeout());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn background_child_holding_the_pipe_does_not_block_return() {
        let runner = CommandRunner::with_config(SupervisorConfig {
            grace: Duration::from_millis(300),
            ..SupervisorConfig::default()
        });

        let started = Instant::now();
        let out = runner.run("sh", ["-c", "echo hi; sleep 30 &"], Duration::from_secs(5));

        assert!(out.output.contains("hi"));
        assert_eq!(out.result.unwrap().escalation, Escalation::None);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn keeps_output_on_failure() {
        let out = CommandRunner::new().run(
            "sh",
            ["-c", "echo boom >&2; exit 2"],
            Duration::from_secs(5),
        );

        assert!(out.output.contains("boom"));
        assert!(matches!(out.result, Err(ProcessError::Exit { .. })));
        assert!(out.into_result().is_err());
    }

    #[test]
    fn start_failure_has_no_output() {
        let out = CommandRunner::new().run(
            "/nonexistent/drivepipe-no-such-binary",
            Vec::<String>::new(),
            Duration::from_secs(1),
        );

        assert!(out.output.is_empty());
        assert!(matches!(out.result, Err(ProcessError::Start { .. })));
    }

    #[test]
    fn run_line_splits_on_whitespace() {
        let out = CommandRunner::new().run_line("printf", "%s-%s  a   b", Duration::from_secs(5));

        assert_eq!(out.into_result().unwrap(), "a-b");
    }
}
