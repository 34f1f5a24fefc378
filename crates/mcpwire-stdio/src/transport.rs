//! Process-pipe transport implementation.
//!
//! This module provides [`StdioTransport`], which spawns an MCP server as a
//! child process and exchanges newline-delimited JSON over its pipes.
//!
//! # Interior Mutability Pattern
//!
//! - **parking_lot::Mutex** for lifecycle state and process handles (short-lived locks, never cross .await)
//! - **AtomicMetrics** for lock-free counter updates
//! - **tokio::sync::Mutex** for the stdin writer (held across the write .await)

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::SinkExt;
use mcpwire_transport_traits::{
    AtomicMetrics, HandlerSlot, Message, SharedHandler, Transport, TransportError,
    TransportMetrics, TransportResult, TransportState, TransportType,
};
use parking_lot::Mutex;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedWrite, LinesCodec, LinesCodecError};
use tracing::{debug, error, info, trace, warn};

use crate::config::StdioConfig;
use crate::process::{READER_JOIN_GRACE, join_readers, terminate};
use crate::reader::{OutputStream, read_lines};

type StdinWriter = FramedWrite<ChildStdin, LinesCodec>;

/// Handles owned while the child is running.
#[derive(Debug)]
struct ProcessHandles {
    child: Child,
    readers: Vec<JoinHandle<()>>,
}

/// Transport over a spawned child process's standard streams.
///
/// Each outbound message is written to the child's stdin as one line of
/// JSON. Every line the child prints on stdout is handed to
/// [`InboundHandler::on_stdout_line`](mcpwire_transport_traits::InboundHandler::on_stdout_line),
/// every stderr line to `on_stderr_line`.
///
/// # Examples
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use mcpwire_stdio::{StdioConfig, StdioTransport};
/// use mcpwire_transport_traits::{ChannelHandler, Transport};
///
/// let transport = StdioTransport::new(StdioConfig::new("my-mcp-server").with_arg("--stdio"));
/// let (handler, mut inbound) = ChannelHandler::new();
/// transport.set_handler(Arc::new(handler));
/// transport.start().await?;
/// ```
pub struct StdioTransport {
    /// Launch configuration (immutable after construction)
    config: StdioConfig,

    /// Lifecycle state (parking_lot::Mutex - never crosses await)
    state: Mutex<TransportState>,

    /// Child and reader tasks (parking_lot::Mutex - taken out before awaiting)
    handles: Mutex<Option<ProcessHandles>>,

    /// Child stdin (tokio::sync::Mutex - crosses await boundaries)
    writer: TokioMutex<Option<StdinWriter>>,

    /// Inbound callbacks shared with the reader tasks
    handler: HandlerSlot,

    /// Lock-free atomic metrics
    metrics: Arc<AtomicMetrics>,
}

impl std::fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioTransport")
            .field("config", &self.config)
            .field("state", &*self.state.lock())
            .field("pid", &self.pid())
            .field("writer", &"<FramedWrite<ChildStdin>>")
            .field("metrics", &self.metrics)
            .finish()
    }
}

impl StdioTransport {
    /// Creates an unstarted transport for the given process configuration.
    #[must_use]
    pub fn new(config: StdioConfig) -> Self {
        Self {
            config,
            state: Mutex::new(TransportState::Unstarted),
            handles: Mutex::new(None),
            writer: TokioMutex::new(None),
            handler: HandlerSlot::default(),
            metrics: Arc::new(AtomicMetrics::new()),
        }
    }

    /// Creates an unstarted transport that reports to `handler`.
    #[must_use]
    pub fn with_handler(config: StdioConfig, handler: SharedHandler) -> Self {
        let transport = Self::new(config);
        transport.handler.set(handler);
        transport
    }

    /// The launch configuration.
    pub fn config(&self) -> &StdioConfig {
        &self.config
    }

    /// OS process id of the running child, if any.
    pub fn pid(&self) -> Option<u32> {
        self.handles.lock().as_ref().and_then(|h| h.child.id())
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }

        for (name, value) in &self.config.env {
            if name.trim().is_empty() {
                continue;
            }
            match value {
                Some(value) => {
                    cmd.env(name, value);
                }
                None => {
                    cmd.env_remove(name);
                }
            }
        }

        cmd
    }

    fn spawn_reader<R>(&self, source: R, stream: OutputStream) -> JoinHandle<()>
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
    {
        tokio::spawn(read_lines(
            source,
            stream,
            self.handler.clone(),
            Arc::clone(&self.metrics),
            self.config.limits.max_line_bytes,
        ))
    }
}

/// Serializes `message` as a single line of JSON (without the terminator).
pub fn encode_line(message: &Message) -> TransportResult<String> {
    let line = serde_json::to_string(message)?;
    ensure_single_line(&line)?;
    Ok(line)
}

/// Rejects text that would break newline framing.
fn ensure_single_line(line: &str) -> TransportResult<()> {
    if line.contains('\n') || line.contains('\r') {
        return Err(TransportError::InvalidMessage(
            "message contains an embedded newline".to_string(),
        ));
    }
    Ok(())
}

fn write_error(err: LinesCodecError) -> TransportError {
    match err {
        LinesCodecError::Io(e) => TransportError::Io(e.to_string()),
        other => TransportError::SendFailed(other.to_string()),
    }
}

#[async_trait]
impl Transport for StdioTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::Stdio
    }

    fn state(&self) -> TransportState {
        *self.state.lock()
    }

    fn set_handler(&self, handler: SharedHandler) {
        self.handler.set(handler);
    }

    async fn start(&self) -> TransportResult<()> {
        if self.config.command.trim().is_empty() {
            return Err(TransportError::InvalidArgument(
                "command must not be blank".to_string(),
            ));
        }

        // Serializes concurrent starts.
        let mut writer = self.writer.lock().await;
        match self.state() {
            TransportState::Started => return Ok(()),
            TransportState::Closed => return Err(TransportError::Closed),
            TransportState::Unstarted => {}
        }

        info!(
            command = %self.config.command,
            args = ?self.config.args,
            "Starting child process"
        );

        let mut child = self.build_command().spawn().map_err(|e| {
            error!(command = %self.config.command, error = %e, "Failed to spawn child process");
            TransportError::SpawnFailed(format!("{}: {e}", self.config.command))
        })?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            // kill_on_drop reaps the child.
            return Err(TransportError::SpawnFailed(
                "child standard streams were not piped".to_string(),
            ));
        };

        let readers = vec![
            self.spawn_reader(stdout, OutputStream::Stdout),
            self.spawn_reader(stderr, OutputStream::Stderr),
        ];

        {
            let mut state = self.state.lock();
            if *state == TransportState::Closed {
                // Closed while spawning; dropping the child kills it.
                for reader in &readers {
                    reader.abort();
                }
                return Err(TransportError::Closed);
            }
            debug!(pid = ?child.id(), "Child process started");
            *self.handles.lock() = Some(ProcessHandles { child, readers });
            *state = TransportState::Started;
        }
        *writer = Some(FramedWrite::new(stdin, LinesCodec::new()));
        Ok(())
    }

    async fn send_message(&self, message: Message) -> TransportResult<()> {
        self.state().ensure_sendable()?;
        let line = encode_line(&message)?;
        let size = line.len() + 1;

        let mut writer = self.writer.lock().await;
        let Some(sink) = writer.as_mut() else {
            return Err(TransportError::Closed);
        };

        // SinkExt::send flushes after the frame is written.
        if let Err(e) = sink.send(line).await {
            warn!(error = %e, "Failed to write to child stdin");
            return Err(write_error(e));
        }

        self.metrics.record_sent(size);
        trace!(bytes = size, "Sent message to child");
        Ok(())
    }

    async fn close(&self, timeout: Duration) {
        if timeout.is_zero() {
            warn!("close called with a zero timeout; ignoring");
            return;
        }

        {
            let mut state = self.state.lock();
            if *state == TransportState::Closed {
                return;
            }
            *state = TransportState::Closed;
        }
        debug!("Closing stdio transport");

        let handles = self.handles.lock().take();

        // Dropping the writer closes the child's stdin. A write blocked on a
        // full pipe holds the lock; the kill below unblocks it.
        match tokio::time::timeout(timeout, self.writer.lock()).await {
            Ok(mut writer) => drop(writer.take()),
            Err(_) => debug!("stdin writer busy; skipping graceful stdin close"),
        }

        let Some(ProcessHandles { child, readers }) = handles else {
            return;
        };

        terminate(child, timeout).await;
        join_readers(readers, READER_JOIN_GRACE.min(timeout)).await;
        debug!("Stdio transport closed");
    }

    fn metrics(&self) -> TransportMetrics {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn message(value: serde_json::Value) -> Message {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("test message must be an object"),
        }
    }

    #[test]
    fn test_encode_line() {
        let line = encode_line(&message(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "ping"
        })))
        .unwrap();
        assert_eq!(line, r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#);
    }

    #[test]
    fn test_encode_line_escapes_newlines_in_strings() {
        let line = encode_line(&message(json!({
            "method": "log",
            "params": { "text": "line1\nline2\r\n" }
        })))
        .unwrap();
        assert!(!line.contains('\n'));
        assert!(line.contains(r"line1\nline2\r\n"));
    }

    #[test]
    fn test_ensure_single_line_rejects_literal_newlines() {
        assert!(matches!(
            ensure_single_line("{\"a\":\n1}"),
            Err(TransportError::InvalidMessage(_))
        ));
        assert!(matches!(
            ensure_single_line("{\r\"a\":1}"),
            Err(TransportError::InvalidMessage(_))
        ));
        assert!(ensure_single_line(r#"{"a":"\n"}"#).is_ok());
    }

    #[test]
    fn test_stdio_transport_creation() {
        let transport = StdioTransport::new(StdioConfig::new("cat"));
        assert_eq!(transport.transport_type(), TransportType::Stdio);
        assert_eq!(transport.state(), TransportState::Unstarted);
        assert_eq!(transport.pid(), None);
        assert_eq!(transport.metrics(), TransportMetrics::default());
    }

    #[tokio::test]
    async fn test_send_before_start() {
        let transport = StdioTransport::new(StdioConfig::new("cat"));
        let result = transport.send_message(message(json!({"method": "ping"}))).await;
        assert!(matches!(result, Err(TransportError::NotStarted)));
    }

    #[tokio::test]
    async fn test_blank_command_rejected() {
        let transport = StdioTransport::new(StdioConfig::new("   "));
        assert!(matches!(
            transport.start().await,
            Err(TransportError::InvalidArgument(_))
        ));
        assert_eq!(transport.state(), TransportState::Unstarted);
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let transport = StdioTransport::new(StdioConfig::new("/definitely/not/a/real/binary"));
        assert!(matches!(
            transport.start().await,
            Err(TransportError::SpawnFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_close_unstarted_is_idempotent() {
        let transport = StdioTransport::new(StdioConfig::new("cat"));
        transport.close(Duration::from_millis(100)).await;
        transport.close(Duration::from_millis(100)).await;
        assert_eq!(transport.state(), TransportState::Closed);
        assert!(matches!(transport.start().await, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_zero_timeout_close_is_noop() {
        let transport = StdioTransport::new(StdioConfig::new("cat"));
        transport.close(Duration::ZERO).await;
        assert_eq!(transport.state(), TransportState::Unstarted);
    }
}
