//! Reference driver: answers every request it reads, until the host closes
//! the pipe.

use std::io::{Read, Write};

use drivepipe_frame::{FrameError, FrameReader, FrameWriter};
use drivepipe_transport::{
    decode, encode, ErrorDetails, ErrorResponse, Map, Message, Request, Response,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cmd::RunDriverArgs;
use crate::exit::{frame_error, CliError, CliResult, INTERNAL, SUCCESS};

/// Requests with this method are answered with an error response.
pub const FAIL_METHOD: &str = "fail";

pub fn run(_args: RunDriverArgs) -> CliResult<i32> {
    serve(std::io::stdin().lock(), std::io::stdout().lock())
}

fn serve<R: Read, W: Write>(input: R, output: W) -> CliResult<i32> {
    let mut reader = FrameReader::new(input);
    let mut writer = FrameWriter::new(output);
    let mut answered = 0usize;

    loop {
        let frame = match reader.read_frame() {
            Ok(frame) => frame,
            Err(FrameError::ConnectionClosed) => {
                info!(answered, "host closed the pipe");
                return Ok(SUCCESS);
            }
            Err(err) => return Err(frame_error("read failed", err)),
        };

        // The frame boundary is intact, so a bad body does not desync the stream.
        let message = match decode(&frame) {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, size = frame.len(), "skipping undecodable message");
                continue;
            }
        };

        let request = match message {
            Message::Request(request) => request,
            other => {
                debug!(kind = other.kind(), id = other.id(), "ignoring non-request");
                continue;
            }
        };

        let reply = reply_to(request);
        let body = encode(&reply)
            .map_err(|err| CliError::new(INTERNAL, format!("encode failed: {err}")))?;
        writer
            .write_frame(&body)
            .map_err(|err| frame_error("write failed", err))?;
        answered += 1;
    }
}

fn reply_to(request: Request) -> Message {
    let Request {
        id,
        guid,
        method,
        params,
    } = request;

    if method == FAIL_METHOD {
        let mut error = ErrorDetails::new("request failed on purpose");
        error.name = Some("Error".to_string());
        return ErrorResponse { id, guid, error }.into();
    }

    let mut result = Map::new();
    result.insert("method".to_string(), Value::String(method));
    result.insert(
        "params".to_string(),
        params.map(Value::Object).unwrap_or(Value::Null),
    );
    Response {
        id,
        guid,
        result: Some(result),
    }
    .into()
}
