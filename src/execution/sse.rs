//! Incremental Server-Sent Events parser.

/// A parsed SSE frame.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct SseEvent {
    /// `event:` field.
    pub event: Option<String>,
    /// Joined `data:` lines.
    pub data: String,
}

impl SseEvent {
    fn is_empty(&self) -> bool {
        self.event.is_none() && self.data.is_empty()
    }
}

/// Accepts raw byte chunks and yields complete frames.
///
/// Bytes are buffered until a full line is available, so multi-byte
/// characters split across chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    current: SseEvent,
}

impl SseParser {
    /// Create an empty parser.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return the frames it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\r', '\n']);
            self.process_line(line, &mut events);
        }

        events
    }

    /// Flush a trailing frame when the stream ends without a blank line.
    #[must_use]
    pub fn finish(mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest).into_owned();
            let mut ignored = Vec::new();
            self.process_line(line.trim_end_matches(['\r', '\n']), &mut ignored);
        }
        if self.current.is_empty() {
            None
        } else {
            Some(self.current)
        }
    }

    fn process_line(&mut self, line: &str, events: &mut Vec<SseEvent>) {
        if line.is_empty() {
            if !self.current.is_empty() {
                events.push(std::mem::take(&mut self.current));
            }
            return;
        }

        if line.starts_with(':') {
            return;
        }

        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);

        match field {
            "event" => self.current.event = Some(value.to_string()),
            "data" => {
                if !self.current.data.is_empty() {
                    self.current.data.push('\n');
                }
                self.current.data.push_str(value);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_named_events() {
        let mut parser = SseParser::new();
        let events = parser.push(b"event: thread.run.completed\ndata: {\"id\":\"run_1\"}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("thread.run.completed"));
        assert_eq!(events[0].data, "{\"id\":\"run_1\"}");
    }

    #[test]
    fn test_handles_frames_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.push(b"event: thread.mess").is_empty());
        assert!(parser.push(b"age.delta\r\ndata: {\"v\":").is_empty());
        let events = parser.push(b"1}\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("thread.message.delta"));
        assert_eq!(events[0].data, "{\"v\":1}");
    }

    #[test]
    fn test_keeps_multibyte_characters_split_between_chunks() {
        let bytes = "data: caf\u{e9}\n\n".as_bytes();
        let split = bytes.len() - 3;
        let mut parser = SseParser::new();
        assert!(parser.push(&bytes[..split]).is_empty());
        let events = parser.push(&bytes[split..]);
        assert_eq!(events[0].data, "caf\u{e9}");
    }

    #[test]
    fn test_ignores_comments_and_joins_data() {
        let mut parser = SseParser::new();
        let events = parser.push(b": keep-alive\ndata: a\ndata: b\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "a\nb");
    }

    #[test]
    fn test_finish_flushes_trailing_frame() {
        let mut parser = SseParser::new();
        assert!(parser.push(b"event: done\ndata: [DONE]").is_empty());
        let trailing = parser.finish();
        assert_eq!(
            trailing.map(|e| e.data),
            Some("[DONE]".to_string())
        );
    }
}
