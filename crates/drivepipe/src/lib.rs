//! Drive a long-lived external process over framed JSON pipes.
//!
//! # Crate Structure
//!
//! - [`frame`]: 4-byte length-prefixed framing over any byte stream
//! - [`process`]: subprocess supervision with a deadline and SIGTERM/SIGKILL escalation
//! - [`transport`]: typed messages and the pipe transport to a driver process

/// Re-export frame types.
pub mod frame {
    pub use drivepipe_frame::*;
}

/// Re-export process supervision types.
pub mod process {
    pub use drivepipe_process::*;
}

/// Re-export transport types.
pub mod transport {
    pub use drivepipe_transport::*;
}
