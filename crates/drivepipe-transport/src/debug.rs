//! `DEBUGP` tracing of message metadata on stdout.

use std::io::Write;

use crate::message::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Send,
    Recv,
}

impl Direction {
    fn tag(self) -> &'static str {
        match self {
            Direction::Send => "\x1b[32mSEND>\x1b[0m",
            Direction::Recv => "\x1b[33mRECV>\x1b[0m",
        }
    }
}

/// One metadata line. The payload itself is never included.
pub(crate) fn format_line(direction: Direction, message: &Message, size: usize) -> String {
    format!(
        "{} id={} method={} guid={} size={}",
        direction.tag(),
        message.id(),
        message.method().unwrap_or("-"),
        message.guid(),
        size
    )
}

pub(crate) fn emit(direction: Direction, message: &Message, size: usize) {
    let line = format_line(direction, message, size);
    let mut stdout = std::io::stdout().lock();
    let _ = writeln!(stdout, "{line}");
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::message::Request;

    #[test]
    fn line_carries_metadata_only() {
        let params = match json!({"password": "hunter2"}) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        let msg: Message = Request::new(4, "page@1", "fill").with_params(params).into();

        let line = format_line(Direction::Send, &msg, 42);
        assert!(line.contains("SEND>"));
        assert!(line.ends_with("id=4 method=fill guid=page@1 size=42"));
        assert!(!line.contains("hunter2"));
    }

    #[test]
    fn replies_show_no_method() {
        let msg: Message = crate::message::Response {
            id: 4,
            guid: String::new(),
            result: None,
        }
        .into();
        let line = format_line(Direction::Recv, &msg, 8);
        assert!(line.contains("RECV>"));
        assert!(line.contains("method=-"));
    }
}
