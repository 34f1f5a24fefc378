//! Streamable HTTP client transport.
//!
//! Every outbound message is a POST to one MCP endpoint. A request's answer
//! arrives either as a single `application/json` body or as a
//! `text/event-stream` that may interleave server notifications before the
//! result. Streams that end early are resumed with a GET carrying
//! `Last-Event-ID`.
//!
//! Requests are dispatched strictly in submission order by a single worker
//! task; `send_message` only enqueues.
//!
//! # Interior Mutability Pattern
//!
//! - **parking_lot::Mutex** for lifecycle, queue, in-flight table and session (never held across .await)
//! - **AtomicMetrics** for lock-free counter updates
//! - **Notify** to wake the worker when work arrives or the transport closes

use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::future::Future;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use mcpwire_transport_traits::{
    AtomicMetrics, HandlerSlot, InboundHandler, Message, MessageKind, RequestId, RequestToken,
    SharedHandler, Transport, TransportError, TransportMetrics, TransportResult, TransportState,
    TransportType, is_response_to, synthetic_error_response,
};
use parking_lot::{Mutex, RwLock};
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client as HttpClient, RequestBuilder, Response, StatusCode};
use serde_json::{Map, Value};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::config::{SharedHeaderProvider, StreamableHttpConfig};
use crate::sse::{SseEvent, SseParser};

const HEADER_SESSION_ID: &str = "mcp-session-id";
const HEADER_PROTOCOL_VERSION: &str = "mcp-protocol-version";
const HEADER_LAST_EVENT_ID: &str = "last-event-id";

const ACCEPT_POST: &str = "application/json, text/event-stream";
const ACCEPT_EVENT_STREAM: &str = "text/event-stream";

const INITIALIZE: &str = "initialize";
const CANCELLED_NOTIFICATION: &str = "notifications/cancelled";

/// How long `close` lets the worker wind down before interrupting it.
const CLOSE_GRACE: Duration = Duration::from_millis(250);

/// The two HTTP clients: `plain` has a total timeout, `streaming` does not
/// and relies on the per-chunk read timeout instead.
#[derive(Clone, Debug)]
struct Clients {
    plain: HttpClient,
    streaming: HttpClient,
}

impl Clients {
    fn build(config: &StreamableHttpConfig) -> TransportResult<Self> {
        Ok(Self {
            plain: build_client(config, config.timeouts.request)?,
            streaming: build_client(config, None)?,
        })
    }
}

fn build_client(
    config: &StreamableHttpConfig,
    total_timeout: Option<Duration>,
) -> TransportResult<HttpClient> {
    // Explicit use_rustls_tls(): cargo features are additive and another
    // dependency may enable native-tls.
    let mut builder = HttpClient::builder()
        .use_rustls_tls()
        .connect_timeout(config.timeouts.connect);

    if let Some(timeout) = total_timeout {
        builder = builder.timeout(timeout);
    }
    if let Some(user_agent) = &config.user_agent {
        builder = builder.user_agent(user_agent);
    }

    builder
        .build()
        .map_err(|e| TransportError::ConnectionFailed(format!("failed to build HTTP client: {e}")))
}

/// A queued outbound message.
#[derive(Debug)]
struct Job {
    body: Bytes,
    target: Target,
}

#[derive(Debug)]
enum Target {
    /// Expects exactly one response, delivered or synthesized.
    Request {
        id: RequestId,
        method: String,
        token: RequestToken,
    },
    /// Notification or client response: fire and forget.
    Message { method: Option<String> },
}

impl Job {
    fn is_request(&self, token: &RequestToken) -> bool {
        matches!(&self.target, Target::Request { token: queued, .. } if queued.same_as(token))
    }
}

/// State guarded by the transport lock.
#[derive(Debug, Default)]
struct Core {
    lifecycle: TransportState,
    queue: VecDeque<Job>,
    in_flight: HashMap<RequestId, RequestToken>,
    session_id: Option<String>,
    protocol_version: Option<String>,
    clients: Option<Clients>,
    runtime: Option<Handle>,
    worker: Option<JoinHandle<()>>,
}

/// Everything the worker shares with the transport handle.
struct Shared {
    config: StreamableHttpConfig,
    url: Url,
    handler: HandlerSlot,
    header_provider: RwLock<Option<SharedHeaderProvider>>,
    metrics: AtomicMetrics,
    state: Mutex<Core>,
    wake: Notify,
    shutdown: CancellationToken,
}

/// Headers for one request plus the session id they carry.
struct RequestHeaders {
    map: HeaderMap,
    session_id: Option<String>,
}

/// Resume position within a request's event stream.
#[derive(Debug, Default)]
struct StreamCursor {
    last_event_id: Option<String>,
    retry: Option<Duration>,
}

enum Chunk {
    Data(Bytes),
    End,
    Broken(String),
}

enum ContentKind {
    Json,
    EventStream,
    Other(String),
}

impl ContentKind {
    fn of(response: &Response) -> Self {
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        match content_type.split(';').next().unwrap_or("").trim() {
            "application/json" => Self::Json,
            "text/event-stream" => Self::EventStream,
            _ => Self::Other(content_type),
        }
    }
}

enum Next {
    Job(Job),
    Idle,
    Stop,
}

/// Runs `work` unless `cancelled` resolves first.
async fn until_cancelled<T>(
    cancelled: impl Future<Output = ()>,
    work: impl Future<Output = TransportResult<T>>,
) -> TransportResult<T> {
    tokio::select! {
        biased;
        _ = cancelled => Err(TransportError::Cancelled),
        result = work => result,
    }
}

fn check_status(status: StatusCode, session_id: Option<&str>) -> TransportResult<()> {
    if status == StatusCode::NOT_FOUND
        && let Some(session_id) = session_id
    {
        return Err(TransportError::SessionNotFound(session_id.to_string()));
    }
    if !status.is_success() {
        return Err(TransportError::Http {
            status: status.as_u16(),
        });
    }
    Ok(())
}

/// Adds a header, skipping names or values that are not valid HTTP.
fn insert_header(map: &mut HeaderMap, name: &str, value: &str) -> bool {
    match (
        HeaderName::from_bytes(name.as_bytes()),
        HeaderValue::from_str(value),
    ) {
        (Ok(name), Ok(value)) => {
            map.insert(name, value);
            true
        }
        _ => {
            warn!(header = name, "Skipping invalid header");
            false
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn map_send_error(err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else if err.is_connect() {
        TransportError::ConnectionFailed(err.to_string())
    } else {
        TransportError::SendFailed(err.to_string())
    }
}

impl Shared {
    fn emit_stdout(&self, line: &str) {
        let delivered =
            std::panic::catch_unwind(AssertUnwindSafe(|| self.handler.on_stdout_line(line)));
        if delivered.is_err() {
            error!("stdout callback panicked");
        }
    }

    fn emit_stderr(&self, line: &str) {
        let delivered =
            std::panic::catch_unwind(AssertUnwindSafe(|| self.handler.on_stderr_line(line)));
        if delivered.is_err() {
            error!("stderr callback panicked");
        }
    }

    fn deliver(&self, message: &Message) {
        match serde_json::to_string(message) {
            Ok(line) => {
                self.metrics.record_received(line.len());
                trace!(bytes = line.len(), "Delivering inbound message");
                self.emit_stdout(&line);
            }
            Err(e) => error!(error = %e, "Failed to serialize inbound message"),
        }
    }

    fn deliver_error(&self, id: &RequestId, err: &TransportError) {
        warn!(request_id = %id, code = err.error_code(), error = %err, "Request failed");
        self.metrics
            .synthesized_errors
            .fetch_add(1, Ordering::Relaxed);
        self.deliver(&synthetic_error_response(id, err));
    }

    /// Drops `id` from the in-flight table if it still belongs to `token`.
    fn forget(&self, id: &RequestId, token: &RequestToken) {
        let mut state = self.state.lock();
        if state
            .in_flight
            .get(id)
            .is_some_and(|current| current.same_as(token))
        {
            state.in_flight.remove(id);
        }
    }

    fn capture_session(&self, response: &Response) {
        if let Some(session_id) = response
            .headers()
            .get(HEADER_SESSION_ID)
            .and_then(|v| v.to_str().ok())
        {
            info!(session_id, "Session established");
            self.state.lock().session_id = Some(session_id.to_string());
        }
    }

    async fn build_headers(
        &self,
        accept: &'static str,
        include_session: bool,
    ) -> TransportResult<RequestHeaders> {
        let mut map = HeaderMap::new();
        map.insert(ACCEPT, HeaderValue::from_static(accept));

        for (name, value) in &self.config.headers {
            insert_header(&mut map, name, value);
        }

        let provider = self.header_provider.read().clone();
        if let Some(provider) = provider {
            for (name, value) in provider.resolve().await? {
                insert_header(&mut map, &name, &value);
            }
        }

        let mut session_sent = None;
        if include_session {
            let (session_id, protocol_version) = {
                let state = self.state.lock();
                (state.session_id.clone(), state.protocol_version.clone())
            };
            if let Some(version) = protocol_version {
                insert_header(&mut map, HEADER_PROTOCOL_VERSION, &version);
            }
            if let Some(session_id) = session_id
                && insert_header(&mut map, HEADER_SESSION_ID, &session_id)
            {
                session_sent = Some(session_id);
            }
        }

        Ok(RequestHeaders {
            map,
            session_id: session_sent,
        })
    }

    async fn send_request(
        &self,
        request: RequestBuilder,
        timeout: Option<Duration>,
    ) -> TransportResult<Response> {
        let pending = request.send();
        let result = match timeout {
            Some(limit) => tokio::time::timeout(limit, pending).await.map_err(|_| {
                TransportError::Timeout(format!("no response within {limit:?}"))
            })?,
            None => pending.await,
        };
        result.map_err(|e| map_send_error(&e))
    }

    async fn next_chunk(
        &self,
        stream: &mut BoxStream<'static, reqwest::Result<Bytes>>,
    ) -> TransportResult<Chunk> {
        let next = match self.config.timeouts.read {
            Some(limit) => tokio::time::timeout(limit, stream.next())
                .await
                .map_err(|_| TransportError::Timeout(format!("no data received for {limit:?}")))?,
            None => stream.next().await,
        };
        Ok(match next {
            Some(Ok(bytes)) => Chunk::Data(bytes),
            Some(Err(e)) => Chunk::Broken(e.to_string()),
            None => Chunk::End,
        })
    }

    async fn process(&self, clients: &Clients, job: Job) {
        match &job.target {
            Target::Request { id, method, token } => {
                self.process_request(clients, &job.body, id, method, token)
                    .await;
            }
            Target::Message { method } => {
                self.process_message(clients, &job.body, method.as_deref())
                    .await;
            }
        }
    }

    async fn process_request(
        &self,
        clients: &Clients,
        body: &Bytes,
        id: &RequestId,
        method: &str,
        token: &RequestToken,
    ) {
        if token.is_cancelled() {
            trace!(request_id = %id, "Skipping cancelled request");
            self.forget(id, token);
            return;
        }

        debug!(request_id = %id, method, "Dispatching request");
        let outcome = AssertUnwindSafe(self.execute_request(clients, body, id, method, token))
            .catch_unwind()
            .await;
        let result = outcome.unwrap_or_else(|panic| {
            Err(TransportError::Internal(format!(
                "request processing panicked: {}",
                panic_message(&*panic)
            )))
        });

        // Forgotten first so the id can be reused as soon as the error arrives.
        self.forget(id, token);
        if let Err(err) = result {
            if token.is_cancelled() {
                debug!(request_id = %id, reason = ?token.reason(), "Request cancelled");
            } else {
                self.deliver_error(id, &err);
            }
        }
    }

    async fn execute_request(
        &self,
        clients: &Clients,
        body: &Bytes,
        id: &RequestId,
        method: &str,
        token: &RequestToken,
    ) -> TransportResult<()> {
        let initialize = method == INITIALIZE;
        let headers = self.build_headers(ACCEPT_POST, !initialize).await?;

        let request = clients
            .streaming
            .post(self.url.clone())
            .headers(headers.map)
            .header(CONTENT_TYPE, "application/json")
            .body(body.clone());
        let response = until_cancelled(
            token.cancelled(),
            self.send_request(request, self.config.timeouts.request),
        )
        .await?;
        self.metrics.record_sent(body.len());

        let status = response.status();
        trace!(request_id = %id, %status, "Response received");
        if initialize && status.is_success() {
            self.capture_session(&response);
        }
        check_status(status, headers.session_id.as_deref())?;

        match ContentKind::of(&response) {
            ContentKind::Json => {
                let body = self.read_json_body(response, token).await?;
                let message = match serde_json::from_slice::<Value>(&body) {
                    Ok(Value::Object(map)) => map,
                    Ok(_) => {
                        return Err(TransportError::InvalidResponse(
                            "response body is not a JSON object".to_string(),
                        ));
                    }
                    Err(e) => return Err(TransportError::InvalidResponse(e.to_string())),
                };
                self.deliver(&message);
                Ok(())
            }
            ContentKind::EventStream => {
                self.consume_event_stream(clients, response, id, token)
                    .await
            }
            ContentKind::Other(content_type) => Err(TransportError::InvalidResponse(format!(
                "unexpected content type {content_type:?} (status {status})"
            ))),
        }
    }

    async fn read_json_body(
        &self,
        response: Response,
        token: &RequestToken,
    ) -> TransportResult<Bytes> {
        let max = self.config.limits.max_response_bytes;
        if let Some(length) = response.content_length()
            && usize::try_from(length).map_or(true, |length| length > max)
        {
            return Err(TransportError::BodyTooLarge {
                size: usize::try_from(length).unwrap_or(usize::MAX),
                max,
            });
        }

        let mut stream = response.bytes_stream().boxed();
        let mut body = BytesMut::new();
        loop {
            match until_cancelled(token.cancelled(), self.next_chunk(&mut stream)).await? {
                Chunk::Data(chunk) => {
                    let size = body.len() + chunk.len();
                    if size > max {
                        return Err(TransportError::BodyTooLarge { size, max });
                    }
                    body.extend_from_slice(&chunk);
                }
                Chunk::End => return Ok(body.freeze()),
                Chunk::Broken(reason) => return Err(TransportError::ConnectionFailed(reason)),
            }
        }
    }

    async fn consume_event_stream(
        &self,
        clients: &Clients,
        response: Response,
        id: &RequestId,
        token: &RequestToken,
    ) -> TransportResult<()> {
        let mut cursor = StreamCursor::default();
        let mut response = response;
        let mut attempt = 0u32;

        loop {
            if self
                .read_event_stream(response, id, token, &mut cursor)
                .await?
            {
                return Ok(());
            }
            if token.is_cancelled() {
                return Err(TransportError::Cancelled);
            }

            attempt += 1;
            if attempt > self.config.max_sse_reconnects {
                return Err(TransportError::SseReconnectsExceeded(
                    self.config.max_sse_reconnects,
                ));
            }
            let delay = cursor
                .retry
                .unwrap_or_else(|| self.config.backoff_for(attempt));
            self.metrics.sse_reconnects.fetch_add(1, Ordering::Relaxed);
            debug!(
                request_id = %id,
                attempt,
                ?delay,
                last_event_id = ?cursor.last_event_id,
                "Event stream ended before the response, resuming"
            );

            until_cancelled(token.cancelled(), async {
                tokio::time::sleep(delay).await;
                Ok(())
            })
            .await?;
            response = self
                .resume_stream(clients, cursor.last_event_id.as_deref(), token)
                .await?;
        }
    }

    /// Reads one event stream to its end. Returns `true` once the response
    /// for `id` has been delivered.
    async fn read_event_stream(
        &self,
        response: Response,
        id: &RequestId,
        token: &RequestToken,
        cursor: &mut StreamCursor,
    ) -> TransportResult<bool> {
        let mut parser = SseParser::from_limits(&self.config.limits);
        let mut stream = response.bytes_stream().boxed();
        let mut events = Vec::new();
        let mut satisfied = false;

        loop {
            let next = until_cancelled(token.cancelled(), self.next_chunk(&mut stream)).await;
            let chunk = match next {
                Ok(chunk) => chunk,
                // An idle stream is resumed like one the server closed.
                Err(TransportError::Timeout(reason)) => Chunk::Broken(reason),
                Err(e) => return Err(e),
            };
            match chunk {
                Chunk::Data(bytes) => parser.feed(&bytes, |event| events.push(event))?,
                Chunk::End => break,
                Chunk::Broken(reason) => {
                    warn!(request_id = %id, %reason, "Event stream broke");
                    break;
                }
            }
            for event in events.drain(..) {
                satisfied |= self.handle_event(event, id, cursor)?;
            }
            if satisfied {
                return Ok(true);
            }
        }

        parser.finish(|event| events.push(event))?;
        for event in events.drain(..) {
            satisfied |= self.handle_event(event, id, cursor)?;
        }
        Ok(satisfied)
    }

    fn handle_event(
        &self,
        event: SseEvent,
        id: &RequestId,
        cursor: &mut StreamCursor,
    ) -> TransportResult<bool> {
        if let Some(event_id) = event.id {
            cursor.last_event_id = Some(event_id);
        }
        if let Some(ms) = event.retry_ms {
            cursor.retry = Some(Duration::from_millis(ms));
        }
        if event.data.is_empty() {
            trace!("Event stream keepalive");
            return Ok(false);
        }

        let message: Map<String, Value> = match serde_json::from_str(&event.data) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                return Err(TransportError::InvalidSseEventData(
                    "event data is not a JSON object".to_string(),
                ));
            }
            Err(e) => return Err(TransportError::InvalidSseEventData(e.to_string())),
        };

        let satisfied = is_response_to(&message, id);
        self.deliver(&message);
        Ok(satisfied)
    }

    async fn resume_stream(
        &self,
        clients: &Clients,
        last_event_id: Option<&str>,
        token: &RequestToken,
    ) -> TransportResult<Response> {
        let mut headers = self.build_headers(ACCEPT_EVENT_STREAM, true).await?;
        if let Some(last_event_id) = last_event_id {
            insert_header(&mut headers.map, HEADER_LAST_EVENT_ID, last_event_id);
        }

        let request = clients.streaming.get(self.url.clone()).headers(headers.map);
        let response = until_cancelled(
            token.cancelled(),
            self.send_request(request, self.config.timeouts.request),
        )
        .await?;

        let status = response.status();
        check_status(status, headers.session_id.as_deref())?;
        match ContentKind::of(&response) {
            ContentKind::EventStream => Ok(response),
            _ => Err(TransportError::Http {
                status: status.as_u16(),
            }),
        }
    }

    async fn process_message(&self, clients: &Clients, body: &Bytes, method: Option<&str>) {
        let label = method.unwrap_or("response");
        let outcome = AssertUnwindSafe(self.execute_message(clients, body, method))
            .catch_unwind()
            .await;
        let result = outcome.unwrap_or_else(|panic| {
            Err(TransportError::Internal(format!(
                "message processing panicked: {}",
                panic_message(&*panic)
            )))
        });

        match result {
            Ok(()) => trace!(method = label, "Message sent"),
            Err(TransportError::Cancelled) => debug!(method = label, "Send interrupted by close"),
            Err(err) => {
                warn!(method = label, error = %err, "Failed to send message");
                self.emit_stderr(&format!("http transport: failed to send {label}: {err}"));
            }
        }
    }

    async fn execute_message(
        &self,
        clients: &Clients,
        body: &Bytes,
        method: Option<&str>,
    ) -> TransportResult<()> {
        let include_session = method != Some(INITIALIZE);
        let headers = self.build_headers(ACCEPT_POST, include_session).await?;
        let request = clients
            .plain
            .post(self.url.clone())
            .headers(headers.map)
            .header(CONTENT_TYPE, "application/json")
            .body(body.clone());

        let response =
            until_cancelled(self.shutdown.cancelled(), self.send_request(request, None)).await?;
        self.metrics.record_sent(body.len());
        check_status(response.status(), headers.session_id.as_deref())
    }

    async fn send_cancel_notice(&self, id: &RequestId, reason: Option<String>) -> TransportResult<()> {
        let clients = self
            .state
            .lock()
            .clients
            .clone()
            .ok_or(TransportError::NotStarted)?;

        let mut params = Map::new();
        params.insert("requestId".to_string(), id.to_value());
        if let Some(reason) = reason {
            params.insert("reason".to_string(), Value::from(reason));
        }
        let mut notice = Map::new();
        notice.insert("jsonrpc".to_string(), Value::from("2.0"));
        notice.insert("method".to_string(), Value::from(CANCELLED_NOTIFICATION));
        notice.insert("params".to_string(), Value::Object(params));

        let body = Bytes::from(serde_json::to_vec(&notice)?);
        self.execute_message(&clients, &body, Some(CANCELLED_NOTIFICATION))
            .await
    }

    async fn delete_session(&self) -> TransportResult<()> {
        let clients = self
            .state
            .lock()
            .clients
            .clone()
            .ok_or(TransportError::NotStarted)?;
        let headers = self.build_headers(ACCEPT_POST, true).await?;
        let response = self
            .send_request(clients.plain.delete(self.url.clone()).headers(headers.map), None)
            .await?;
        debug!(status = %response.status(), "Session terminated");
        Ok(())
    }

}

async fn run_worker(shared: Arc<Shared>, clients: Clients) {
    debug!(url = %shared.url, "HTTP worker started");
    loop {
        let wake = shared.wake.notified();
        let next = {
            let mut state = shared.state.lock();
            if state.lifecycle == TransportState::Closed {
                Next::Stop
            } else {
                match state.queue.pop_front() {
                    Some(job) => Next::Job(job),
                    None => Next::Idle,
                }
            }
        };

        match next {
            Next::Job(job) => shared.process(&clients, job).await,
            Next::Idle => {
                tokio::select! {
                    () = wake => {}
                    () = shared.shutdown.cancelled() => break,
                }
            }
            Next::Stop => break,
        }
    }
    debug!("HTTP worker stopped");
}

/// Client transport for the MCP Streamable HTTP binding.
///
/// # Examples
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use mcpwire_http::{StreamableHttpConfig, StreamableHttpTransport};
/// use mcpwire_transport_traits::{ChannelHandler, Transport};
///
/// let (handler, mut inbound) = ChannelHandler::new();
/// let transport = StreamableHttpTransport::with_handler(
///     StreamableHttpConfig::new("http://localhost:8080/mcp"),
///     Arc::new(handler),
/// )?;
/// transport.start().await?;
/// transport.send_message(initialize_request).await?;
/// // ... read the initialize result from `inbound`, then:
/// transport.set_protocol_version("2025-06-18")?;
/// ```
pub struct StreamableHttpTransport {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for StreamableHttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("StreamableHttpTransport")
            .field("url", &self.shared.url.as_str())
            .field("state", &state.lifecycle)
            .field("session_id", &state.session_id)
            .field("protocol_version", &state.protocol_version)
            .field("queued", &state.queue.len())
            .field("in_flight", &state.in_flight.len())
            .finish()
    }
}

impl StreamableHttpTransport {
    /// Creates an unstarted transport.
    ///
    /// Fails with `InvalidArgument` if the URL is not an absolute
    /// `http`/`https` URL.
    pub fn new(config: StreamableHttpConfig) -> TransportResult<Self> {
        let url = Url::parse(&config.url)
            .map_err(|e| TransportError::InvalidArgument(format!("invalid url {:?}: {e}", config.url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TransportError::InvalidArgument(format!(
                "unsupported url scheme {:?}",
                url.scheme()
            )));
        }

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                url,
                handler: HandlerSlot::default(),
                header_provider: RwLock::new(None),
                metrics: AtomicMetrics::new(),
                state: Mutex::new(Core::default()),
                wake: Notify::new(),
                shutdown: CancellationToken::new(),
            }),
        })
    }

    /// Creates an unstarted transport that reports to `handler`.
    pub fn with_handler(
        config: StreamableHttpConfig,
        handler: SharedHandler,
    ) -> TransportResult<Self> {
        let transport = Self::new(config)?;
        transport.shared.handler.set(handler);
        Ok(transport)
    }

    /// Installs a provider whose headers are resolved for every request.
    pub fn set_header_provider(&self, provider: SharedHeaderProvider) {
        *self.shared.header_provider.write() = Some(provider);
    }

    /// The transport configuration.
    pub fn config(&self) -> &StreamableHttpConfig {
        &self.shared.config
    }

    /// The endpoint URL.
    pub fn url(&self) -> &Url {
        &self.shared.url
    }

    /// The protocol version set with `set_protocol_version`.
    pub fn protocol_version(&self) -> Option<String> {
        self.shared.state.lock().protocol_version.clone()
    }

    /// Number of requests accepted and not yet answered.
    pub fn pending_requests(&self) -> usize {
        self.shared.state.lock().in_flight.len()
    }
}

impl Drop for StreamableHttpTransport {
    fn drop(&mut self) {
        // Lets an idle worker exit when the transport is dropped unclosed.
        self.shared.shutdown.cancel();
    }
}

#[async_trait]
impl Transport for StreamableHttpTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::Http
    }

    fn state(&self) -> TransportState {
        self.shared.state.lock().lifecycle
    }

    fn set_handler(&self, handler: SharedHandler) {
        self.shared.handler.set(handler);
    }

    async fn start(&self) -> TransportResult<()> {
        match self.state() {
            TransportState::Started => return Ok(()),
            TransportState::Closed => return Err(TransportError::Closed),
            TransportState::Unstarted => {}
        }

        let clients = match Clients::build(&self.shared.config) {
            Ok(clients) => clients,
            Err(e) => {
                self.shared.state.lock().lifecycle = TransportState::Closed;
                error!(error = %e, "Failed to build HTTP client, transport closed");
                self.shared
                    .emit_stderr(&format!("http transport: {e}, transport closed"));
                return Err(e);
            }
        };
        let runtime = Handle::try_current()
            .map_err(|e| TransportError::Internal(format!("no tokio runtime: {e}")))?;

        let mut state = self.shared.state.lock();
        match state.lifecycle {
            TransportState::Started => return Ok(()),
            TransportState::Closed => return Err(TransportError::Closed),
            TransportState::Unstarted => {}
        }
        state.clients = Some(clients.clone());
        state.worker = Some(runtime.spawn(run_worker(Arc::clone(&self.shared), clients)));
        state.runtime = Some(runtime);
        state.lifecycle = TransportState::Started;
        info!(url = %self.shared.url, "HTTP transport started");
        Ok(())
    }

    async fn send_message(&self, message: Message) -> TransportResult<()> {
        let kind = MessageKind::of(&message)?;
        let body = Bytes::from(serde_json::to_vec(&message)?);

        {
            let mut state = self.shared.state.lock();
            state.lifecycle.ensure_sendable()?;
            if kind.method() != Some(INITIALIZE) && state.protocol_version.is_none() {
                return Err(TransportError::ProtocolVersionMissing);
            }

            let target = match kind {
                MessageKind::Request { id, method } => {
                    if state.in_flight.contains_key(&id) {
                        return Err(TransportError::DuplicateRequestId(id));
                    }
                    let token = RequestToken::child_of(&self.shared.shutdown);
                    state.in_flight.insert(id.clone(), token.clone());
                    Target::Request { id, method, token }
                }
                MessageKind::Notification { method } => Target::Message {
                    method: Some(method),
                },
                MessageKind::Response { .. } | MessageKind::Unknown => {
                    Target::Message { method: None }
                }
            };
            state.queue.push_back(Job { body, target });
        }

        self.shared.wake.notify_one();
        Ok(())
    }

    async fn close(&self, timeout: Duration) {
        if timeout.is_zero() {
            warn!("close called with a zero timeout; ignoring");
            return;
        }
        let started = Instant::now();

        let (worker, cancelled) = {
            let mut state = self.shared.state.lock();
            if state.lifecycle == TransportState::Closed {
                return;
            }
            state.lifecycle = TransportState::Closed;
            state.queue.clear();
            let cancelled: Vec<RequestToken> =
                state.in_flight.drain().map(|(_, token)| token).collect();
            (state.worker.take(), cancelled)
        };
        for token in cancelled {
            token.cancel(Some("transport closed".to_string()));
        }
        self.shared.wake.notify_one();
        debug!(url = %self.shared.url, "Closing HTTP transport");

        let Some(mut worker) = worker else {
            self.shared.shutdown.cancel();
            return;
        };

        if tokio::time::timeout(CLOSE_GRACE.min(timeout), &mut worker)
            .await
            .is_err()
        {
            debug!("Worker still busy after grace period, interrupting");
            self.shared.shutdown.cancel();
            let remaining = timeout.saturating_sub(started.elapsed());
            if tokio::time::timeout(remaining, &mut worker).await.is_err() {
                warn!("Worker did not stop within the close timeout, aborting");
                worker.abort();
            }
            self.shared.state.lock().session_id = None;
            return;
        }

        let has_session = self.shared.state.lock().session_id.is_some();
        if has_session {
            let remaining = timeout.saturating_sub(started.elapsed());
            match tokio::time::timeout(remaining, self.shared.delete_session()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(error = %e, "Session DELETE failed"),
                Err(_) => debug!("Session DELETE timed out"),
            }
        }
        self.shared.state.lock().session_id = None;
        self.shared.shutdown.cancel();
        debug!("HTTP transport closed");
    }

    fn cancel_request(&self, id: &RequestId, reason: Option<String>) -> TransportResult<bool> {
        let (token, notice_runtime) = {
            let mut state = self.shared.state.lock();
            let Some(token) = state.in_flight.remove(id) else {
                return Ok(false);
            };
            let queued = state.queue.len();
            state.queue.retain(|job| !job.is_request(&token));
            // Only a request the server has seen needs a cancellation notice.
            let dispatched = state.queue.len() == queued;
            let runtime = if dispatched && state.protocol_version.is_some() {
                state.runtime.clone()
            } else {
                None
            };
            (token, runtime)
        };

        token.cancel(reason.clone());
        debug!(request_id = %id, notify = notice_runtime.is_some(), "Request cancelled");

        if let Some(runtime) = notice_runtime {
            let shared = Arc::clone(&self.shared);
            let id = id.clone();
            runtime.spawn(async move {
                let sent = until_cancelled(
                    shared.shutdown.cancelled(),
                    shared.send_cancel_notice(&id, reason),
                )
                .await;
                if let Err(e) = sent {
                    debug!(request_id = %id, error = %e, "Cancellation notice not delivered");
                }
            });
        }
        Ok(true)
    }

    fn set_protocol_version(&self, version: &str) -> TransportResult<()> {
        let version = version.trim();
        if version.is_empty() {
            return Err(TransportError::InvalidArgument(
                "protocol version must not be blank".to_string(),
            ));
        }
        self.shared.state.lock().protocol_version = Some(version.to_string());
        Ok(())
    }

    fn session_id(&self) -> Option<String> {
        self.shared.state.lock().session_id.clone()
    }

    fn metrics(&self) -> TransportMetrics {
        self.shared.metrics.snapshot()
    }
}
