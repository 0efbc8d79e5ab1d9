//! Message transport to a long-lived driver process.
//!
//! The host launches the driver as `<program> <args...> run-driver` and
//! exchanges [`Message`]s with it over the driver's stdin and stdout, one
//! length-prefixed JSON frame per message. Closing the transport closes the
//! driver's stdin and waits for it to exit under a deadline, escalating to
//! SIGTERM and then SIGKILL.
//!
//! ```no_run
//! use std::process::Stdio;
//! use drivepipe_transport::{DriverCommand, PipeTransport, Request, TransportConfig};
//!
//! # fn main() -> drivepipe_transport::Result<()> {
//! let driver = DriverCommand::new("node").arg("cli.js");
//! let transport = PipeTransport::spawn(&driver, Stdio::inherit(), TransportConfig::default())?;
//! transport.send(&Request::new(1, "", "initialize").into())?;
//! let reply = transport.poll()?;
//! println!("reply to {}", reply.id());
//! transport.close()?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
mod debug;
pub mod error;
pub mod message;
mod pipe;

pub use codec::{decode, encode, CodecError};
pub use config::{
    debug_from_env, DriverCommand, TransportConfig, DEBUG_ENV, DEFAULT_CLOSE_TIMEOUT,
    DRIVER_SUBCOMMAND,
};
pub use error::{Result, TransportError};
pub use message::{ErrorDetails, ErrorResponse, Map, Message, Request, Response};
pub use pipe::PipeTransport;
