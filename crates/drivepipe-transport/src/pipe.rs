use std::fmt;
use std::process::{ChildStdin, ChildStdout, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use drivepipe_frame::{FrameReader, FrameWriter};
use drivepipe_process::{
    start_with_config, wait_with_deadline, ProcessError, ProcessHandle, SupervisorConfig,
};
use tracing::{debug, warn};

use crate::codec;
use crate::config::{DriverCommand, TransportConfig};
use crate::debug::{self as debugp, Direction};
use crate::error::{Result, TransportError};
use crate::message::Message;

/// Framed JSON messaging with a driver process over its stdin and stdout.
///
/// All methods take `&self`. One thread can sit in [`poll`](Self::poll)
/// while others [`send`](Self::send) or [`close`](Self::close).
pub struct PipeTransport {
    closed: AtomicBool,
    writer: Mutex<Option<FrameWriter<ChildStdin>>>,
    reader: Mutex<FrameReader<ChildStdout>>,
    process: Mutex<ProcessHandle>,
    pid: u32,
    config: TransportConfig,
}

impl PipeTransport {
    /// Launch `<program> <args...> <subcommand>` with piped stdin/stdout.
    ///
    /// The driver's stderr goes to `stderr`; pass `Stdio::inherit()` to share
    /// the host's.
    pub fn spawn(
        driver: &DriverCommand,
        stderr: impl Into<Stdio>,
        config: TransportConfig,
    ) -> Result<Self> {
        let mut command = driver.command(&config.subcommand);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(stderr);

        let supervisor = SupervisorConfig {
            grace: config.grace,
            ..SupervisorConfig::default()
        };
        let process = start_with_config(command, &supervisor).map_err(TransportError::Start)?;
        Self::attach(process, config)
    }

    /// Wrap an already started driver whose stdin and stdout are piped.
    fn attach(mut process: ProcessHandle, config: TransportConfig) -> Result<Self> {
        let (Some(stdin), Some(stdout)) = (process.take_stdin(), process.take_stdout()) else {
            if let Err(err) = process.kill() {
                warn!(pid = process.id(), error = %err, "failed to kill unusable driver");
            }
            return Err(TransportError::Start(ProcessError::Start {
                program: process.program().to_string(),
                source: std::io::Error::other("driver stdio was not piped"),
            }));
        };

        let pid = process.id();
        debug!(label = %config.label, pid, program = %process.program(), "driver started");

        Ok(Self {
            closed: AtomicBool::new(false),
            writer: Mutex::new(Some(FrameWriter::with_config(stdin, config.frame.clone()))),
            reader: Mutex::new(FrameReader::with_config(stdout, config.frame.clone())),
            process: Mutex::new(process),
            pid,
            config,
        })
    }

    /// Encode `message` and write it as one frame. Does not wait for a reply.
    pub fn send(&self, message: &Message) -> Result<()> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let body = codec::encode(message)?;
        if self.config.debug {
            debugp::emit(Direction::Send, message, body.len());
        }

        let mut writer = lock(&self.writer);
        let writer = writer.as_mut().ok_or(TransportError::Closed)?;
        writer.write_frame(&body).map_err(TransportError::Write)?;

        debug!(
            label = %self.config.label,
            id = message.id(),
            method = message.method().unwrap_or("-"),
            size = body.len(),
            "message sent"
        );
        Ok(())
    }

    /// Block until the next complete message arrives.
    ///
    /// Meant for a single reading loop. Concurrent callers are serialized but
    /// which of them gets which message is unspecified.
    pub fn poll(&self) -> Result<Message> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let frame = lock(&self.reader)
            .read_frame()
            .map_err(TransportError::Read)?;
        let message = codec::decode(&frame)?;
        if self.config.debug {
            debugp::emit(Direction::Recv, &message, frame.len());
        }

        debug!(
            label = %self.config.label,
            id = message.id(),
            kind = message.kind(),
            method = message.method().unwrap_or("-"),
            size = frame.len(),
            "message received"
        );
        Ok(message)
    }

    /// Close stdin and wait for the driver to exit.
    ///
    /// The driver gets `close_timeout` to exit on its own before it is sent
    /// SIGTERM, then SIGKILL after `grace`. Only the first call does any of
    /// this; later calls return `Ok(())`.
    ///
    /// A `poll` blocked in another thread returns once the driver exits and
    /// its stdout reaches EOF.
    pub fn close(&self) -> Result<()> {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        // A send blocked on a full pipe holds the writer. The deadline must
        // still start; once the driver is gone that write fails and stdin is
        // released below.
        if !self.close_stdin() {
            debug!(
                label = %self.config.label,
                pid = self.pid,
                "send in progress, waiting for driver with stdin open"
            );
        }

        let mut process = lock(&self.process);
        let waited =
            wait_with_deadline(&mut process, self.config.close_timeout, self.config.grace);
        self.close_stdin();
        let completion = waited.map_err(TransportError::Process)?;
        debug!(
            label = %self.config.label,
            pid = self.pid,
            status = %completion.status,
            escalation = %completion.escalation,
            "driver exited"
        );
        Ok(())
    }

    /// Drop the write end unless a send currently holds it.
    fn close_stdin(&self) -> bool {
        let mut writer = match self.writer.try_lock() {
            Ok(writer) => writer,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return false,
        };
        if writer.take().is_some() {
            debug!(label = %self.config.label, pid = self.pid, "driver stdin closed");
        }
        true
    }

    /// True once `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// OS process id of the driver.
    pub fn id(&self) -> u32 {
        self.pid
    }

    /// Settings the transport was spawned with.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }
}

impl Drop for PipeTransport {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(
                label = %self.config.label,
                pid = self.pid,
                error = %err,
                "driver shutdown on drop failed"
            );
        }
    }
}

impl fmt::Debug for PipeTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeTransport")
            .field("pid", &self.pid)
            .field("closed", &self.is_closed())
            .field("label", &self.config.label)
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::Read;
    use std::sync::{mpsc, Arc};
    use std::thread;
    use std::time::{Duration, Instant};

    use serde_json::json;

    use super::*;
    use crate::message::{Map, Request};

    fn shell(script: &str) -> DriverCommand {
        DriverCommand::new("sh").arg("-c").arg(script)
    }

    fn config() -> TransportConfig {
        TransportConfig {
            close_timeout: Duration::from_secs(5),
            grace: Duration::from_secs(1),
            debug: false,
            ..TransportConfig::default()
        }
    }

    /// `cat` copies every frame straight back.
    fn echo_transport() -> PipeTransport {
        PipeTransport::spawn(&shell("exec cat"), Stdio::null(), config()).unwrap()
    }

    fn params(value: serde_json::Value) -> Map {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn send_then_poll_echoes_message() {
        let transport = echo_transport();
        let msg: Message = Request::new(1, "page@1", "goto")
            .with_params(params(json!({"url": "https://example.com"})))
            .into();

        transport.send(&msg).unwrap();
        assert_eq!(transport.poll().unwrap(), msg);
        transport.close().unwrap();
    }

    #[test]
    fn messages_arrive_in_send_order() {
        let transport = echo_transport();
        for i in 1..=100 {
            transport.send(&Request::new(i, "g", "m").into()).unwrap();
        }
        for i in 1..=100 {
            assert_eq!(transport.poll().unwrap().id(), i);
        }
        transport.close().unwrap();
    }

    #[test]
    fn debug_output_does_not_change_behaviour() {
        let transport = PipeTransport::spawn(
            &shell("exec cat"),
            Stdio::null(),
            TransportConfig {
                debug: true,
                ..config()
            },
        )
        .unwrap();

        let msg: Message = Request::new(2, "g", "m").into();
        transport.send(&msg).unwrap();
        assert_eq!(transport.poll().unwrap(), msg);
        transport.close().unwrap();
    }

    #[test]
    fn close_is_idempotent_and_final() {
        let transport = echo_transport();
        transport.close().unwrap();
        transport.close().unwrap();

        assert!(transport.is_closed());
        assert!(matches!(
            transport.send(&Request::new(1, "g", "m").into()),
            Err(TransportError::Closed)
        ));
        assert!(matches!(transport.poll(), Err(TransportError::Closed)));
    }

    #[test]
    fn unclean_driver_exit_surfaces_on_close() {
        let transport =
            PipeTransport::spawn(&shell("cat >/dev/null; exit 3"), Stdio::null(), config())
                .unwrap();

        let err = transport.close().unwrap_err();
        assert!(matches!(
            err,
            TransportError::Process(ProcessError::Exit { .. })
        ));
        transport.close().unwrap();
    }

    #[test]
    fn stuck_driver_is_terminated_on_close() {
        let transport = PipeTransport::spawn(
            &shell("exec sleep 30"),
            Stdio::null(),
            TransportConfig {
                close_timeout: Duration::from_millis(200),
                grace: Duration::from_millis(200),
                ..config()
            },
        )
        .unwrap();

        let started = Instant::now();
        let err = transport.close().unwrap_err();
        assert!(matches!(err, TransportError::Process(ref e) if e.is_timeout()));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn close_escalates_while_a_send_is_blocked() {
        let transport = Arc::new(
            PipeTransport::spawn(
                &shell("exec sleep 30"),
                Stdio::null(),
                TransportConfig {
                    close_timeout: Duration::from_millis(200),
                    grace: Duration::from_millis(200),
                    ..config()
                },
            )
            .unwrap(),
        );

        // The driver never reads stdin, so 1 MiB fills the pipe and blocks.
        let sender = {
            let transport = Arc::clone(&transport);
            thread::spawn(move || {
                let blob = params(json!({"blob": "x".repeat(1024 * 1024)}));
                transport.send(&Request::new(1, "g", "upload").with_params(blob).into())
            })
        };
        thread::sleep(Duration::from_millis(300));

        let started = Instant::now();
        let err = transport.close().unwrap_err();
        assert!(matches!(err, TransportError::Process(ref e) if e.is_timeout()));
        assert!(started.elapsed() < Duration::from_secs(5));

        let sent = sender.join().unwrap();
        assert!(
            matches!(sent, Err(TransportError::Write(_) | TransportError::Closed)),
            "unexpected send result: {sent:?}"
        );
    }

    #[test]
    fn unpiped_driver_is_killed_not_leaked() {
        let mut command = std::process::Command::new("sleep");
        command.arg("30");
        let process = start_with_config(command, &SupervisorConfig::default()).unwrap();
        let pid = process.id();

        let err = PipeTransport::attach(process, config()).unwrap_err();
        assert!(matches!(err, TransportError::Start(_)));

        let alive = std::process::Command::new("kill")
            .arg("-0")
            .arg(pid.to_string())
            .stderr(Stdio::null())
            .status()
            .unwrap();
        assert!(!alive.success(), "driver {pid} still running");
    }

    #[test]
    fn poll_after_driver_exit_is_read_eof() {
        let transport = PipeTransport::spawn(&shell("exit 0"), Stdio::null(), config()).unwrap();

        let err = transport.poll().unwrap_err();
        assert!(err.is_eof(), "unexpected error: {err}");
        transport.close().unwrap();
    }

    #[test]
    fn invalid_body_is_decode_error() {
        let transport = PipeTransport::spawn(
            &shell("printf '\\002\\000\\000\\000{x'; cat >/dev/null"),
            Stdio::null(),
            config(),
        )
        .unwrap();

        assert!(matches!(transport.poll(), Err(TransportError::Decode(_))));
        transport.close().unwrap();
    }

    #[test]
    fn missing_executable_is_start_error() {
        let err = PipeTransport::spawn(
            &DriverCommand::new("/nonexistent/drivepipe-no-such-driver"),
            Stdio::null(),
            config(),
        )
        .unwrap_err();
        assert!(matches!(err, TransportError::Start(_)));
    }

    #[test]
    fn reader_thread_sees_end_after_close() {
        let transport = Arc::new(echo_transport());
        let (tx, rx) = mpsc::channel();

        let reader = {
            let transport = Arc::clone(&transport);
            thread::spawn(move || loop {
                match transport.poll() {
                    Ok(msg) => tx.send(msg.id()).unwrap(),
                    Err(err) => return err,
                }
            })
        };

        for i in 1..=3 {
            transport.send(&Request::new(i, "g", "m").into()).unwrap();
        }
        let received: Vec<i64> = (0..3).map(|_| rx.recv().unwrap()).collect();
        assert_eq!(received, [1, 2, 3]);

        transport.close().unwrap();
        let err = reader.join().unwrap();
        assert!(
            err.is_eof() || matches!(err, TransportError::Closed),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn stderr_goes_to_supplied_sink() {
        let (mut stderr, sink) = std::io::pipe().unwrap();
        let transport =
            PipeTransport::spawn(&shell("echo driver-log >&2; exec cat"), sink, config()).unwrap();

        transport.close().unwrap();
        let mut logged = String::new();
        stderr.read_to_string(&mut logged).unwrap();
        assert_eq!(logged.trim(), "driver-log");
    }
}
