use crate::types::StreamEvent;
use crate::util::truncate_chars;
use std::io::Write;

/// Longest tool output a sink renders before cutting it off.
pub const MAX_TOOL_OUTPUT_CHARS: usize = 500;
pub const TRUNCATION_MARKER: &str = "...";

/// Consumer of streaming events. Events arrive synchronously and in
/// production order; a sink must neither reorder nor drop them.
pub trait StreamSink: Send {
    fn handle(&mut self, event: &StreamEvent);

    /// Concatenation of every `Token` seen since the last `clear`.
    fn get_buffered_text(&self) -> String;

    fn clear(&mut self);
}

type OutputFn = Box<dyn FnMut(&str) + Send>;

/// Buffers tokens and forwards a rendering of every event to an output function.
pub struct StreamingSink {
    buffer: String,
    output: OutputFn,
}

impl StreamingSink {
    pub fn new<F>(output: F) -> Self
    where
        F: FnMut(&str) + Send + 'static,
    {
        Self {
            buffer: String::new(),
            output: Box::new(output),
        }
    }

    /// Sink that writes straight to stdout, flushing after each event.
    pub fn stdout() -> Self {
        Self::new(|text| {
            let mut stdout = std::io::stdout().lock();
            let _ = stdout.write_all(text.as_bytes());
            let _ = stdout.flush();
        })
    }
}

impl StreamSink for StreamingSink {
    fn handle(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Token(text) => {
                self.buffer.push_str(text);
                (self.output)(text);
            }
            StreamEvent::ToolStart { name, arguments } => {
                (self.output)(&render_tool_start(name, arguments));
            }
            StreamEvent::ToolEnd { name: _, output } => {
                (self.output)(&render_tool_end(output));
            }
        }
    }

    fn get_buffered_text(&self) -> String {
        self.buffer.clone()
    }

    fn clear(&mut self) {
        self.buffer.clear();
    }
}

pub fn render_tool_start(name: &str, arguments: &crate::types::ToolArguments) -> String {
    let arguments = serde_json::to_string(arguments).unwrap_or_else(|_| "{}".to_string());
    format!("\n[tool] {name} {arguments}\n")
}

pub fn render_tool_end(output: &str) -> String {
    format!("{}\n", truncate_tool_output(output))
}

pub fn truncate_tool_output(output: &str) -> String {
    truncate_chars(output, MAX_TOOL_OUTPUT_CHARS, TRUNCATION_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn capturing_sink() -> (StreamingSink, Arc<Mutex<Vec<String>>>) {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let writer = Arc::clone(&captured);
        let sink = StreamingSink::new(move |text| writer.lock().unwrap().push(text.to_string()));
        (sink, captured)
    }

    #[test]
    fn test_tokens_are_buffered_and_forwarded() {
        let (mut sink, captured) = capturing_sink();
        sink.handle(&StreamEvent::Token("Hel".into()));
        sink.handle(&StreamEvent::Token("lo".into()));

        assert_eq!(sink.get_buffered_text(), "Hello");
        assert_eq!(*captured.lock().unwrap(), vec!["Hel", "lo"]);

        sink.clear();
        assert_eq!(sink.get_buffered_text(), "");
    }

    #[test]
    fn test_tool_events_render_without_touching_buffer() {
        let (mut sink, captured) = capturing_sink();
        let arguments = json!({"pattern": "x"}).as_object().cloned().unwrap();
        sink.handle(&StreamEvent::ToolStart {
            name: "search_code".into(),
            arguments,
        });
        sink.handle(&StreamEvent::ToolEnd {
            name: "search_code".into(),
            output: "src/lib.rs:1: x".into(),
        });

        assert_eq!(sink.get_buffered_text(), "");
        let captured = captured.lock().unwrap();
        assert_eq!(captured[0], "\n[tool] search_code {\"pattern\":\"x\"}\n");
        assert_eq!(captured[1], "src/lib.rs:1: x\n");
    }

    #[test]
    fn test_tool_output_truncation_boundary() {
        let long = "a".repeat(600);
        let rendered = truncate_tool_output(&long);
        assert_eq!(rendered, format!("{}{}", "a".repeat(500), TRUNCATION_MARKER));

        let short = "b".repeat(400);
        assert_eq!(truncate_tool_output(&short), short);

        let exact = "c".repeat(500);
        assert_eq!(truncate_tool_output(&exact), exact);
    }
}
