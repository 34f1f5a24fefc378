//! Line readers for the child's output streams.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use mcpwire_transport_traits::{AtomicMetrics, HandlerSlot, InboundHandler};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tracing::{debug, error, trace, warn};

/// Which output stream a reader is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    fn name(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// Reads `source` line by line until EOF or a read error, forwarding each
/// line to the callback matching `stream`.
///
/// A read error ends the loop quietly. Problems with a single line (invalid
/// UTF-8, oversized, a panicking callback) are reported on the stderr
/// callback and reading continues.
pub(crate) async fn read_lines<R>(
    source: R,
    stream: OutputStream,
    handler: HandlerSlot,
    metrics: Arc<AtomicMetrics>,
    max_line_bytes: usize,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(source);
    let mut buf = Vec::new();
    // Set while skipping the remainder of an oversized line.
    let mut discarding = false;
    let limit = u64::try_from(max_line_bytes).unwrap_or(u64::MAX).saturating_add(1);

    loop {
        buf.clear();
        let read = (&mut reader).take(limit).read_until(b'\n', &mut buf).await;
        match read {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(stream = stream.name(), error = %e, "Child stream read failed");
                break;
            }
        }

        let terminated = buf.last() == Some(&b'\n');
        if discarding {
            discarding = !terminated;
            continue;
        }
        if !terminated && buf.len() > max_line_bytes {
            warn!(
                stream = stream.name(),
                max_line_bytes, "Discarding oversized line from child"
            );
            report(
                &handler,
                &format!(
                    "stdio transport: line on child {} exceeds {max_line_bytes} bytes and was discarded",
                    stream.name()
                ),
            );
            discarding = true;
            continue;
        }

        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }

        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line,
            Err(e) => {
                report(
                    &handler,
                    &format!(
                        "stdio transport: invalid UTF-8 on child {}: {e}",
                        stream.name()
                    ),
                );
                continue;
            }
        };

        match stream {
            OutputStream::Stdout => {
                if line.trim().is_empty() {
                    continue;
                }
                trace!(bytes = line.len(), "Received line from child");
                metrics.record_received(line.len());
                let delivered = std::panic::catch_unwind(AssertUnwindSafe(|| {
                    handler.on_stdout_line(line);
                }));
                if delivered.is_err() {
                    report(&handler, "stdio transport: stdout callback panicked");
                }
            }
            OutputStream::Stderr => {
                trace!(line, "Child stderr");
                let delivered = std::panic::catch_unwind(AssertUnwindSafe(|| {
                    handler.on_stderr_line(line);
                }));
                if delivered.is_err() {
                    error!("stdio transport: stderr callback panicked");
                }
            }
        }
    }

    debug!(stream = stream.name(), "Child reader finished");
}

/// Sends a diagnostic to the stderr callback, surviving a panicking handler.
fn report(handler: &HandlerSlot, message: &str) {
    let delivered = std::panic::catch_unwind(AssertUnwindSafe(|| {
        handler.on_stderr_line(message);
    }));
    if delivered.is_err() {
        error!(message, "stderr callback panicked while reporting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpwire_transport_traits::{ChannelHandler, InboundEvent};
    use pretty_assertions::assert_eq;

    async fn collect(input: &'static [u8], stream: OutputStream, max: usize) -> Vec<InboundEvent> {
        let (handler, mut receiver) = ChannelHandler::new();
        let slot = HandlerSlot::new(Arc::new(handler));
        read_lines(input, stream, slot, Arc::new(AtomicMetrics::new()), max).await;

        let mut events = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_stdout_lines_with_mixed_endings() {
        let events = collect(b"{\"id\":1}\r\n\n{\"id\":2}\n{\"id\":3}", OutputStream::Stdout, 1024).await;
        assert_eq!(
            events,
            vec![
                InboundEvent::Message(r#"{"id":1}"#.to_string()),
                InboundEvent::Message(r#"{"id":2}"#.to_string()),
                InboundEvent::Message(r#"{"id":3}"#.to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_utf8_reported_and_reader_continues() {
        let events = collect(b"\xff\xfe\n{\"ok\":true}\n", OutputStream::Stdout, 1024).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], InboundEvent::Diagnostic(text) if text.contains("invalid UTF-8")));
        assert_eq!(events[1], InboundEvent::Message(r#"{"ok":true}"#.to_string()));
    }

    #[tokio::test]
    async fn test_oversized_line_discarded() {
        let events = collect(b"0123456789abcdef\n{}\n", OutputStream::Stdout, 8).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], InboundEvent::Diagnostic(text) if text.contains("exceeds 8 bytes")));
        assert_eq!(events[1], InboundEvent::Message("{}".to_string()));
    }

    #[tokio::test]
    async fn test_stderr_lines_go_to_diagnostics() {
        let events = collect(b"booting\nready\n", OutputStream::Stderr, 1024).await;
        assert_eq!(
            events,
            vec![
                InboundEvent::Diagnostic("booting".to_string()),
                InboundEvent::Diagnostic("ready".to_string()),
            ]
        );
    }

    struct PanicsOnce(std::sync::atomic::AtomicBool, ChannelHandler);

    impl InboundHandler for PanicsOnce {
        fn on_stdout_line(&self, line: &str) {
            if !self.0.swap(true, std::sync::atomic::Ordering::SeqCst) {
                panic!("handler bug");
            }
            self.1.on_stdout_line(line);
        }

        fn on_stderr_line(&self, line: &str) {
            self.1.on_stderr_line(line);
        }
    }

    #[tokio::test]
    async fn test_panicking_callback_does_not_stop_reader() {
        let (channel, mut receiver) = ChannelHandler::new();
        let handler = PanicsOnce(Default::default(), channel);
        let slot = HandlerSlot::new(Arc::new(handler));
        let metrics = Arc::new(AtomicMetrics::new());

        read_lines(&b"{\"id\":1}\n{\"id\":2}\n"[..], OutputStream::Stdout, slot, metrics.clone(), 1024).await;

        assert!(matches!(
            receiver.try_recv().unwrap(),
            InboundEvent::Diagnostic(text) if text.contains("panicked")
        ));
        assert_eq!(
            receiver.try_recv().unwrap(),
            InboundEvent::Message(r#"{"id":2}"#.to_string())
        );
        assert_eq!(metrics.snapshot().messages_received, 2);
    }
}
