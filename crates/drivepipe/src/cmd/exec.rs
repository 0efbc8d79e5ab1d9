use std::io::Write;
use std::time::Duration;

use drivepipe_process::{CommandRunner, SupervisorConfig};
use tracing::{debug, info};

use crate::cmd::ExecArgs;
use crate::exit::{io_error, process_error, CliError, CliResult, SUCCESS, USAGE};

pub fn run(args: ExecArgs) -> CliResult<i32> {
    let timeout = parse_duration("--timeout", &args.timeout)?;
    if timeout.is_zero() {
        return Err(CliError::new(USAGE, "--timeout must be greater than zero"));
    }
    let grace = parse_duration("--grace", &args.grace)?;

    let runner = CommandRunner::with_config(SupervisorConfig {
        grace,
        ..SupervisorConfig::default()
    });
    debug!(program = %args.program, ?timeout, ?grace, "running command");
    let out = runner.run(&args.program, &args.args, timeout);

    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(out.output.as_bytes())
        .and_then(|()| stdout.flush())
        .map_err(|err| io_error("failed writing output", err))?;

    match out.result {
        Ok(completion) => {
            info!(program = %args.program, escalation = %completion.escalation, "command finished");
            Ok(SUCCESS)
        }
        Err(err) => Err(process_error(&err)),
    }
}

/// `<digits><unit>` with unit `ms`, `s` or `m`; a bare number is seconds.
/// Zero is accepted so `--grace 0` kills straight after SIGTERM.
fn parse_duration(flag: &str, input: &str) -> CliResult<Duration> {
    let input = input.trim();
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (digits, unit) = input.split_at(split);

    let invalid = || CliError::new(USAGE, format!("invalid {flag} duration: {input:?}"));
    let value: u64 = digits.parse().map_err(|_| invalid())?;
    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "" | "s" => Ok(Duration::from_secs(value)),
        "m" => value
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(invalid),
        _ => Err(invalid()),
    }
}
