use clap::{Args, Subcommand};

use crate::exit::CliResult;

pub mod exec;
pub mod run_driver;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Act as a driver: answer framed requests on stdin/stdout until EOF.
    RunDriver(RunDriverArgs),
    /// Run a command under a deadline and print its combined output.
    Exec(ExecArgs),
    /// Show version information.
    Version(VersionArgs),
}

/// Dispatch a parsed subcommand, returning the process exit code.
pub fn run(command: Command) -> CliResult<i32> {
    match command {
        Command::RunDriver(args) => run_driver::run(args),
        Command::Exec(args) => exec::run(args),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug, Default)]
pub struct RunDriverArgs {}

#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Deadline before the command is sent SIGTERM (e.g. 5s, 500ms, 2m).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
    /// Time between SIGTERM and SIGKILL; 0 kills immediately.
    #[arg(long, default_value = "5s")]
    pub grace: String,
    /// Program to run.
    pub program: String,
    /// Arguments passed to the program.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
