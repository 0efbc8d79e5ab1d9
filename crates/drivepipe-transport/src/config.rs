use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use drivepipe_frame::FrameConfig;
use drivepipe_process::KILL_GRACE;

/// Environment variable that turns on per-message metadata lines on stdout.
pub const DEBUG_ENV: &str = "DEBUGP";

/// Subcommand appended to the driver's arguments.
pub const DRIVER_SUBCOMMAND: &str = "run-driver";

/// Default time a driver gets to exit after its stdin is closed.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for one [`PipeTransport`](crate::PipeTransport).
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Identifies this host in log events.
    pub label: String,
    pub subcommand: String,
    /// How long `close` waits for the driver before terminating it.
    pub close_timeout: Duration,
    /// Time between SIGTERM and SIGKILL when the close deadline passes.
    pub grace: Duration,
    /// Print `SEND>`/`RECV>` metadata for every message.
    pub debug: bool,
    pub frame: FrameConfig,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            label: concat!("drivepipe/", env!("CARGO_PKG_VERSION")).to_string(),
            subcommand: DRIVER_SUBCOMMAND.to_string(),
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            grace: KILL_GRACE,
            debug: debug_from_env(),
            frame: FrameConfig::default(),
        }
    }
}

/// Any non-empty value of `DEBUGP` enables debug output.
pub fn debug_from_env() -> bool {
    debug_enabled(std::env::var_os(DEBUG_ENV).as_deref())
}

fn debug_enabled(value: Option<&OsStr>) -> bool {
    value.is_some_and(|v| !v.is_empty())
}

/// How to launch the driver executable.
#[derive(Debug, Clone)]
pub struct DriverCommand {
    pub program: PathBuf,
    /// Arguments placed before the driver subcommand.
    pub args: Vec<OsString>,
    pub env: Vec<(OsString, OsString)>,
    pub current_dir: Option<PathBuf>,
}

impl DriverCommand {
    /// Launch `program` with no extra arguments or environment.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            current_dir: None,
        }
    }

    /// Append one argument before the driver subcommand.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Set one environment variable for the driver.
    pub fn with_env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.env
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    /// Working directory for the driver.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Build `<program> <args...> <subcommand>`. Stdio is left to the caller.
    pub fn command(&self, subcommand: &str) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).arg(subcommand);
        command.envs(self.env.iter().map(|(k, v)| (k, v)));
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }
        command
    }
}
