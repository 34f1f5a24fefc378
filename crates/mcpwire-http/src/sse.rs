//! Server-Sent Events (SSE) decoding.
//!
//! Incremental, no-I/O parser for `text/event-stream` bodies. Bytes are fed
//! in arbitrary chunks; every completed event is passed to a callback.
//!
//! ## SSE Format
//!
//! ```text
//! id: event-123
//! event: message
//! retry: 2000
//! data: {"jsonrpc": "2.0", ...}
//!
//! ```
//!
//! Lines end in `\n`, `\r\n` or `\r`. An event is terminated by a blank
//! line. Lines starting with `:` are comments.

use mcpwire_transport_traits::{LimitsConfig, TransportError};
use thiserror::Error;

/// One decoded event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the event's `id:` field, if it had one.
    pub id: Option<String>,
    /// Value of the `event:` field. Kept for logging; never used for dispatch.
    pub event: Option<String>,
    /// All `data:` lines joined with `\n`. Empty for keepalive events.
    pub data: String,
    /// Reconnection delay from a numeric `retry:` field, in milliseconds.
    pub retry_ms: Option<u64>,
}

/// Ceiling violations. Parsing cannot continue after either.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SseError {
    /// Too many bytes arrived without a line terminator.
    #[error("SSE buffer holds {size} unconsumed bytes, limit is {max}")]
    BufferTooLarge {
        /// Unconsumed bytes held.
        size: usize,
        /// Configured ceiling.
        max: usize,
    },
    /// One event's `data:` lines grew past the ceiling.
    #[error("SSE event data reached {size} bytes, limit is {max}")]
    EventTooLarge {
        /// Accumulated data size.
        size: usize,
        /// Configured ceiling.
        max: usize,
    },
}

impl From<SseError> for TransportError {
    fn from(err: SseError) -> Self {
        Self::SseEventTooLarge(err.to_string())
    }
}

/// SSE parser for decoding events from wire format.
#[derive(Debug)]
pub struct SseParser {
    buffer: Vec<u8>,
    /// Set after a `\r` terminator so a following `\n` is not a second line.
    skip_lf: bool,
    max_buffer_bytes: usize,
    max_event_bytes: usize,

    current: SseEvent,
    has_data: bool,
    has_fields: bool,
}

impl SseParser {
    /// Creates a parser with the given ceilings.
    pub fn new(max_buffer_bytes: usize, max_event_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            skip_lf: false,
            max_buffer_bytes,
            max_event_bytes,
            current: SseEvent::default(),
            has_data: false,
            has_fields: false,
        }
    }

    /// Creates a parser using the SSE ceilings from `limits`.
    pub fn from_limits(limits: &LimitsConfig) -> Self {
        Self::new(limits.max_sse_buffer_bytes, limits.max_sse_event_bytes)
    }

    /// Feeds a chunk, calling `on_event` for every event it completes.
    pub fn feed<F>(&mut self, chunk: &[u8], mut on_event: F) -> Result<(), SseError>
    where
        F: FnMut(SseEvent),
    {
        self.buffer.extend_from_slice(chunk);
        let buffer = std::mem::take(&mut self.buffer);

        let mut start = 0;
        let result = loop {
            if self.skip_lf {
                match buffer.get(start) {
                    Some(b'\n') => {
                        start += 1;
                        self.skip_lf = false;
                    }
                    Some(_) => self.skip_lf = false,
                    None => break Ok(()),
                }
            }

            let Some(offset) = buffer[start..]
                .iter()
                .position(|b| *b == b'\n' || *b == b'\r')
            else {
                break Ok(());
            };
            let end = start + offset;
            self.skip_lf = buffer[end] == b'\r';
            let line = &buffer[start..end];
            start = end + 1;

            if let Err(e) = self.process_line(line, &mut on_event) {
                break Err(e);
            }
        };

        self.buffer = buffer;
        self.buffer.drain(..start);
        result?;

        if self.buffer.len() > self.max_buffer_bytes {
            return Err(SseError::BufferTooLarge {
                size: self.buffer.len(),
                max: self.max_buffer_bytes,
            });
        }
        Ok(())
    }

    /// Flushes an unterminated trailing event at end of stream.
    pub fn finish<F>(&mut self, mut on_event: F) -> Result<(), SseError>
    where
        F: FnMut(SseEvent),
    {
        let rest = std::mem::take(&mut self.buffer);
        self.skip_lf = false;
        if !rest.is_empty() {
            self.process_line(&rest, &mut on_event)?;
        }
        self.dispatch(&mut on_event);
        Ok(())
    }

    fn process_line<F>(&mut self, line: &[u8], on_event: &mut F) -> Result<(), SseError>
    where
        F: FnMut(SseEvent),
    {
        if line.is_empty() {
            self.dispatch(on_event);
            return Ok(());
        }
        if line[0] == b':' {
            return Ok(());
        }

        let (field, value) = match line.iter().position(|b| *b == b':') {
            Some(colon) => {
                let value = &line[colon + 1..];
                (&line[..colon], value.strip_prefix(b" ").unwrap_or(value))
            }
            None => (line, &[][..]),
        };
        let value = String::from_utf8_lossy(value);

        match field {
            b"data" => {
                let size = self.current.data.len() + usize::from(self.has_data) + value.len();
                if size > self.max_event_bytes {
                    return Err(SseError::EventTooLarge {
                        size,
                        max: self.max_event_bytes,
                    });
                }
                if self.has_data {
                    self.current.data.push('\n');
                }
                self.current.data.push_str(&value);
                self.has_data = true;
                self.has_fields = true;
            }
            b"id" => {
                // Ids containing NUL are ignored.
                if !value.contains('\0') {
                    self.current.id = Some(value.into_owned());
                    self.has_fields = true;
                }
            }
            b"event" => {
                self.current.event = Some(value.into_owned());
                self.has_fields = true;
            }
            b"retry" => {
                if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
                    if let Ok(ms) = value.parse() {
                        self.current.retry_ms = Some(ms);
                        self.has_fields = true;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn dispatch<F>(&mut self, on_event: &mut F)
    where
        F: FnMut(SseEvent),
    {
        if !self.has_fields {
            return;
        }
        let event = std::mem::take(&mut self.current);
        self.has_data = false;
        self.has_fields = false;
        on_event(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parser() -> SseParser {
        SseParser::new(1024, 256)
    }

    fn collect(parser: &mut SseParser, chunks: &[&[u8]]) -> Result<Vec<SseEvent>, SseError> {
        let mut events = Vec::new();
        for chunk in chunks {
            parser.feed(chunk, |event| events.push(event))?;
        }
        Ok(events)
    }

    #[test]
    fn test_sse_parser_simple() {
        let events = collect(&mut parser(), &[b"data: hello\n\n"]).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hello");
        assert_eq!(events[0].id, None);
    }

    #[test]
    fn test_sse_parser_full_event() {
        let mut parser = parser();
        let events = collect(
            &mut parser,
            &[b"id: 42\nevent: message\nretry: 2500\ndata: {\"a\":1}\n\n"],
        )
        .unwrap();
        assert_eq!(
            events,
            vec![SseEvent {
                id: Some("42".to_string()),
                event: Some("message".to_string()),
                data: r#"{"a":1}"#.to_string(),
                retry_ms: Some(2500),
            }]
        );
    }

    #[test]
    fn test_sse_parser_multiline_data() {
        let events = collect(&mut parser(), &[b"data: line1\ndata:line2\ndata:  line3\n\n"]).unwrap();
        // Only one leading space is stripped.
        assert_eq!(events[0].data, "line1\nline2\n line3");
    }

    #[test]
    fn test_sse_parser_line_endings() {
        let events = collect(
            &mut parser(),
            &[b"data: crlf\r\n\r\ndata: cr\r\rdata: lf\n\n"],
        )
        .unwrap();
        let data: Vec<_> = events.iter().map(|e| e.data.as_str()).collect();
        assert_eq!(data, vec!["crlf", "cr", "lf"]);
    }

    #[test]
    fn test_sse_parser_crlf_split_across_chunks() {
        let events = collect(&mut parser(), &[b"data: a\r", b"\n", b"\r", b"\ndata: b\n\n"]).unwrap();
        let data: Vec<_> = events.iter().map(|e| e.data.as_str()).collect();
        assert_eq!(data, vec!["a", "b"]);
    }

    #[test]
    fn test_sse_parser_incremental() {
        let mut parser = parser();
        assert!(collect(&mut parser, &[b"id: 1\n", b"data: par"]).unwrap().is_empty());

        let events = collect(&mut parser, &[b"tial\n", b"\n"]).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id.as_deref(), Some("1"));
        assert_eq!(events[0].data, "partial");
    }

    #[test]
    fn test_sse_parser_utf8_split_across_chunks() {
        let bytes = "data: héllo\n\n".as_bytes();
        let (first, second) = bytes.split_at(8); // inside the two-byte 'é'
        let events = collect(&mut parser(), &[first, second]).unwrap();
        assert_eq!(events[0].data, "héllo");
    }

    #[test]
    fn test_sse_parser_ignores_comments_and_unknown_fields() {
        let events = collect(
            &mut parser(),
            &[b": keepalive\nfoo: bar\ndata: actual data\n\n"],
        )
        .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "actual data");
    }

    #[test]
    fn test_sse_parser_comment_only_block_dispatches_nothing() {
        let events = collect(&mut parser(), &[b":\n\n:ping\n\n"]).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_sse_parser_id_only_event() {
        let events = collect(&mut parser(), &[b"id: 7\n\n"]).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id.as_deref(), Some("7"));
        assert_eq!(events[0].data, "");
    }

    #[test]
    fn test_sse_parser_non_numeric_retry_ignored() {
        let events = collect(&mut parser(), &[b"retry: soon\ndata: x\n\n"]).unwrap();
        assert_eq!(events[0].retry_ms, None);
    }

    #[test]
    fn test_sse_parser_finish_flushes_unterminated_event() {
        let mut parser = parser();
        assert!(collect(&mut parser, &[b"id: 9\ndata: tail"]).unwrap().is_empty());

        let mut events = Vec::new();
        parser.finish(|event| events.push(event)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id.as_deref(), Some("9"));
        assert_eq!(events[0].data, "tail");
    }

    #[test]
    fn test_sse_parser_event_too_large() {
        let mut parser = SseParser::new(1024, 8);
        let err = collect(&mut parser, &[b"data: 12345\ndata: 678\n\n"]).unwrap_err();
        assert!(matches!(err, SseError::EventTooLarge { max: 8, .. }));
    }

    #[test]
    fn test_sse_parser_buffer_too_large() {
        let mut parser = SseParser::new(16, 1024);
        let err = collect(&mut parser, &[b"data: 0123456789abcdef"]).unwrap_err();
        assert!(matches!(err, SseError::BufferTooLarge { max: 16, .. }));
    }

    #[test]
    fn test_sse_error_maps_to_wire_code() {
        let err: TransportError = SseError::EventTooLarge { size: 9, max: 8 }.into();
        assert_eq!(err.error_code(), "SSE_EVENT_DATA_TOO_LARGE");
    }
}
