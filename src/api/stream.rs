use super::logging::emit_sse_parse_error;
use crate::types::ServerEvent;

const HANDLED_EVENTS: &[&str] = &[
    "message_start",
    "content_block_start",
    "content_block_delta",
    "content_block_stop",
    "message_delta",
    "message_stop",
    "error",
];

/// Incremental decoder for `text/event-stream` bodies. Frames may be split
/// across network chunks; incomplete trailing data stays buffered.
#[derive(Default)]
pub struct StreamParser {
    buffer: String,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, chunk: &[u8]) -> Vec<ServerEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        let mut events = Vec::new();
        let mut start = 0;

        while let Some(end) = self.buffer[start..].find("\n\n") {
            let event_end = start + end + 2;
            if let Some(event) = parse_frame(&self.buffer[start..event_end]) {
                events.push(event);
            }
            start = event_end;
        }

        if start > 0 {
            self.buffer.drain(..start);
        }

        events
    }

    /// Whatever is left after the body ends without a closing blank line.
    pub fn flush(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }
}

fn parse_frame(frame: &str) -> Option<ServerEvent> {
    let mut event_type = None;
    let mut data = None;

    for line in frame.lines() {
        if let Some(rest) = line.strip_prefix("event: ") {
            event_type = Some(rest.trim());
        } else if let Some(rest) = line.strip_prefix("data: ") {
            data = Some(rest.trim());
        }
    }

    let (event_type, data) = (event_type?, data?);
    if data == "[DONE]" || !HANDLED_EVENTS.contains(&event_type) {
        return None;
    }

    match serde_json::from_str::<ServerEvent>(data) {
        Ok(event) => Some(event),
        Err(error) => {
            emit_sse_parse_error(Some(event_type), data, &error);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_and_unknown_frames_are_skipped() {
        let mut parser = StreamParser::new();
        let events = parser.process(b"event: ping\ndata: {\"type\":\"ping\"}\n\n");
        assert!(events.is_empty());
        assert!(parser.flush().is_empty());
    }

    #[test]
    fn test_malformed_json_is_dropped_without_stalling() {
        let mut parser = StreamParser::new();
        let events = parser.process(
            b"event: content_block_delta\ndata: {not json}\n\n\
              event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n",
        );
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ServerEvent::MessageStop));
    }

    #[test]
    fn test_error_frame_is_surfaced() {
        let mut parser = StreamParser::new();
        let events = parser.process(
            b"event: error
data: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n",
        );
        assert_eq!(events.len(), 1);
        match &events[0] {
            ServerEvent::Error { error } => {
                assert_eq!(error.error_type, "overloaded_error");
                assert_eq!(error.message, "Overloaded");
            }
            other => panic!("expected error event, got {other:?}"),
        }
    }
}
