//! The gateway connection: handshake, request correlation, event fan-out and
//! reconnect.

use std::{
    sync::{
        Arc, Mutex, MutexGuard, Weak,
        atomic::{AtomicU32, AtomicU64, Ordering},
    },
    time::Instant,
};

use {
    futures::{
        SinkExt, StreamExt,
        stream::{SplitSink, SplitStream},
    },
    serde::{Serialize, de::DeserializeOwned},
    serde_json::Value,
    tokio::{
        net::TcpStream,
        sync::{broadcast, mpsc, watch},
        task::JoinHandle,
    },
    tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message},
    tracing::{debug, info, warn},
};

use moltis_protocol::{
    EventFrame, GatewayFrame, HelloOk, RequestFrame, ResponseFrame, methods,
    monitor::{MonitorSession, SessionsListParams, SessionsListResult},
};

#[cfg(feature = "metrics")]
use moltis_metrics::{counter, gateway_client as metric, gauge, histogram};

use crate::{
    config::GatewayClientConfig,
    error::{Error, Result},
    listeners::{ListenerRegistry, Subscription},
    pending::PendingRequests,
    state::ConnectionState,
};

/// Stream type returned by `tokio_tungstenite::connect_async`.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const EVENT_CHANNEL_CAPACITY: usize = 256;

// ── Connection ───────────────────────────────────────────────────────

/// One established socket. Replaced wholesale on reconnect.
struct Connection {
    generation: u64,
    outbound: mpsc::UnboundedSender<Message>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Connection {
    /// Send a close frame and stop reading. The writer exits on its own
    /// once the close frame is flushed.
    fn shutdown(self) {
        let _ = self.outbound.send(Message::Close(None));
        self.reader.abort();
        drop(self.writer);
    }
}

#[derive(Default)]
struct ReconnectSlot {
    handle: Option<JoinHandle<()>>,
    armed: bool,
}

// ── Client ───────────────────────────────────────────────────────────

/// WebSocket client for the moltis gateway.
///
/// Cloning is cheap; clones share the same connection, pending requests and
/// listeners.
#[derive(Clone)]
pub struct GatewayClient {
    inner: Arc<Inner>,
}

struct Inner {
    config: GatewayClientConfig,
    next_request_id: AtomicU64,
    pending: PendingRequests,
    listeners: Arc<ListenerRegistry>,
    events_tx: broadcast::Sender<EventFrame>,
    state_tx: watch::Sender<ConnectionState>,
    connection: Mutex<Option<Connection>>,
    generation: AtomicU64,
    /// Bumped by `disconnect()`; handshakes started under an older epoch
    /// must not install their socket.
    epoch: AtomicU64,
    reconnect: Mutex<ReconnectSlot>,
    reconnect_attempts: AtomicU32,
}

impl GatewayClient {
    /// Create a disconnected client. Fails if the config does not validate.
    pub fn new(config: GatewayClientConfig) -> Result<Self> {
        config.validate()?;
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                next_request_id: AtomicU64::new(1),
                pending: PendingRequests::default(),
                listeners: Arc::new(ListenerRegistry::default()),
                events_tx,
                state_tx,
                connection: Mutex::new(None),
                generation: AtomicU64::new(0),
                epoch: AtomicU64::new(0),
                reconnect: Mutex::new(ReconnectSlot::default()),
                reconnect_attempts: AtomicU32::new(0),
            }),
        })
    }

    /// Build a client from `MOLTIS_GATEWAY_URL` / `MOLTIS_GATEWAY_TOKEN`.
    pub fn from_env() -> Result<Self> {
        Self::new(GatewayClientConfig::from_env())
    }

    pub fn config(&self) -> &GatewayClientConfig {
        &self.inner.config
    }

    /// Open the socket and complete the hello handshake.
    ///
    /// Any live connection is closed first (without triggering a reconnect),
    /// and a pending reconnect is cancelled. A failed connect does not
    /// schedule a reconnect.
    pub async fn connect(&self) -> Result<HelloOk> {
        self.inner.cancel_reconnect();
        let epoch = self.inner.epoch.load(Ordering::Acquire);
        let hello = self.inner.establish(epoch).await?;
        self.inner.reconnect_attempts.store(0, Ordering::Release);
        Ok(hello)
    }

    /// Close the connection and cancel any pending reconnect. Outstanding
    /// requests fail with [`Error::ConnectionClosed`]. Safe to call at any
    /// time, any number of times.
    pub fn disconnect(&self) {
        self.inner.cancel_reconnect();
        let (closed, failed) = {
            let mut slot = self.inner.lock_connection();
            self.inner.epoch.fetch_add(1, Ordering::AcqRel);
            let closed = slot.take();
            self.inner.set_state(ConnectionState::Disconnected);
            (closed, self.inner.pending.fail_all())
        };
        self.inner.reconnect_attempts.store(0, Ordering::Release);
        if let Some(conn) = closed {
            info!(
                generation = conn.generation,
                failed_requests = failed,
                "disconnected from gateway"
            );
            conn.shutdown();
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// True between a received `hello-ok` and the next socket close.
    pub fn is_connected(&self) -> bool {
        self.state().is_open()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Send `method` with raw JSON params and wait for its response payload.
    ///
    /// A successful response without a payload yields `Value::Null`.
    pub async fn request_value(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let Some((generation, outbound)) = self.inner.outbound() else {
            #[cfg(feature = "metrics")]
            counter!(metric::REQUESTS_TOTAL, "result" => "not_connected").increment(1);
            return Err(Error::NotConnected);
        };

        let id = self
            .inner
            .next_request_id
            .fetch_add(1, Ordering::Relaxed)
            .to_string();
        let frame = GatewayFrame::Request(RequestFrame::new(id.clone(), method, params));
        let text = serde_json::to_string(&frame)?;

        let (_guard, rx) = self.inner.pending.register(&id);
        // The socket may have closed between taking the sender and
        // registering; its close already drained the pending table.
        if self.inner.current_generation() != Some(generation) {
            return Err(Error::ConnectionClosed);
        }
        if outbound.send(Message::Text(text.into())).is_err() {
            return Err(Error::NotConnected);
        }
        debug!(id = %id, method, "gateway request sent");

        let started = Instant::now();
        let timeout = self.inner.config.request_timeout;
        let outcome = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response_result(method, response),
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                warn!(id = %id, method, timeout_ms = timeout.as_millis() as u64, "gateway request timed out");
                Err(Error::RequestTimeout {
                    method: method.to_string(),
                    timeout,
                })
            },
        };

        #[cfg(feature = "metrics")]
        {
            let result = match &outcome {
                Ok(_) => "ok",
                Err(Error::Rpc { .. }) => "rpc_error",
                Err(Error::RequestTimeout { .. }) => "timeout",
                Err(_) => "closed",
            };
            counter!(metric::REQUESTS_TOTAL, "result" => result).increment(1);
            histogram!(metric::REQUEST_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        }
        debug!(
            id = %id,
            method,
            ok = outcome.is_ok(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "gateway request finished"
        );
        outcome
    }

    /// Typed request: `params` is serialized (a JSON `null` sends no
    /// params) and the response payload decoded into `R`.
    pub async fn request<P, R>(&self, method: &str, params: &P) -> Result<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let params = match serde_json::to_value(params)? {
            Value::Null => None,
            value => Some(value),
        };
        let payload = self.request_value(method, params).await?;
        serde_json::from_value(payload).map_err(|source| Error::Decode {
            method: method.to_string(),
            source,
        })
    }

    /// `sessions.list`, unwrapped to the session records.
    pub async fn list_sessions(&self, params: &SessionsListParams) -> Result<Vec<MonitorSession>> {
        let result: SessionsListResult = self.request(methods::SESSIONS_LIST, params).await?;
        Ok(result.sessions)
    }

    /// Register a synchronous listener for every inbound event frame.
    ///
    /// Listeners run on the reader task, so they should not block.
    pub fn on_event<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&EventFrame) + Send + Sync + 'static,
    {
        self.inner.listeners.add(Arc::new(listener))
    }

    /// Async view of the event stream. Slow receivers observe
    /// `RecvError::Lagged` rather than blocking the reader.
    pub fn subscribe_events(&self) -> broadcast::Receiver<EventFrame> {
        self.inner.events_tx.subscribe()
    }

    pub fn pending_requests(&self) -> usize {
        self.inner.pending.len()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("url", &self.inner.config.url)
            .field("state", &self.state())
            .field("pending", &self.pending_requests())
            .finish()
    }
}

fn response_result(method: &str, response: ResponseFrame) -> Result<Value> {
    if response.ok {
        return Ok(response.payload.unwrap_or(Value::Null));
    }
    let error = response.error.unwrap_or_default();
    let message = if error.message.is_empty() {
        "request failed".to_string()
    } else {
        error.message
    };
    Err(Error::Rpc {
        method: method.to_string(),
        code: error.code,
        message,
    })
}

// ── Connection lifecycle ─────────────────────────────────────────────

impl Inner {
    fn lock_connection(&self) -> MutexGuard<'_, Option<Connection>> {
        match self.connection.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_reconnect(&self) -> MutexGuard<'_, ReconnectSlot> {
        match self.reconnect.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let prev = self.state_tx.send_replace(next);
        if prev != next {
            debug!(from = %prev, to = %next, "gateway connection state changed");
            #[cfg(feature = "metrics")]
            gauge!(metric::CONNECTED).set(if next.is_open() { 1.0 } else { 0.0 });
        }
    }

    fn current_generation(&self) -> Option<u64> {
        self.lock_connection().as_ref().map(|c| c.generation)
    }

    fn outbound(&self) -> Option<(u64, mpsc::UnboundedSender<Message>)> {
        self.lock_connection()
            .as_ref()
            .map(|c| (c.generation, c.outbound.clone()))
    }

    /// Connect and handshake, installing the socket on success. `epoch` is
    /// the disconnect epoch the caller observed when it decided to connect.
    async fn establish(self: &Arc<Self>, epoch: u64) -> Result<HelloOk> {
        {
            let mut slot = self.lock_connection();
            if self.epoch.load(Ordering::Acquire) != epoch {
                return Err(Error::Handshake("client disconnected".into()));
            }
            if let Some(old) = slot.take() {
                let failed = self.pending.fail_all();
                info!(
                    generation = old.generation,
                    failed_requests = failed,
                    "replacing gateway connection"
                );
                old.shutdown();
            }
            self.set_state(ConnectionState::Connecting);
        }

        let connect_timeout = self.config.connect_timeout;
        let outcome = match tokio::time::timeout(connect_timeout, self.open_and_handshake()).await {
            Ok(outcome) => outcome,
            // The half-open socket is dropped with the handshake future.
            Err(_) => Err(Error::ConnectTimeout(connect_timeout)),
        };

        match outcome {
            Ok((ws, hello)) => {
                if self.install(ws, epoch) {
                    info!(
                        url = %self.config.url,
                        protocol = ?hello.protocol,
                        server_version = hello.server.as_ref().map(|s| s.version.as_str()),
                        "connected to gateway"
                    );
                    Ok(hello)
                } else {
                    Err(Error::Handshake("client disconnected during handshake".into()))
                }
            },
            Err(e) => {
                let slot = self.lock_connection();
                if slot.is_none() {
                    self.set_state(ConnectionState::Disconnected);
                }
                debug!(url = %self.config.url, error = %e, "gateway connect failed");
                Err(e)
            },
        }
    }

    async fn open_and_handshake(&self) -> Result<(WsStream, HelloOk)> {
        let (mut ws, _response) = connect_async(self.config.url.as_str()).await?;
        tokio::task::yield_now().await;

        let hello = serde_json::to_string(&self.config.hello())?;
        ws.send(Message::Text(hello.into())).await?;
        debug!(url = %self.config.url, "sent hello, awaiting hello-ok");

        while let Some(msg) = ws.next().await {
            let text = match msg? {
                Message::Text(text) => text.as_str().to_owned(),
                Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => text,
                    Err(_) => {
                        self.frame_dropped("non-utf8 binary frame");
                        continue;
                    },
                },
                Message::Close(frame) => {
                    let reason = frame
                        .map(|f| f.reason.as_str().to_owned())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| "no reason".into());
                    return Err(Error::Handshake(format!(
                        "gateway closed the socket before hello-ok: {reason}"
                    )));
                },
                _ => continue,
            };
            match GatewayFrame::parse(&text) {
                Ok(GatewayFrame::HelloOk(hello)) => return Ok((ws, hello)),
                Ok(frame) => self.dispatch(frame),
                Err(e) => {
                    warn!(error = %e, len = text.len(), "dropping malformed gateway frame");
                    self.frame_dropped("malformed");
                },
            }
        }
        Err(Error::Handshake("gateway closed the socket before hello-ok".into()))
    }

    /// Split the socket into reader/writer tasks and mark the client open.
    /// Returns `false` if a `disconnect()` happened since `epoch`.
    fn install(self: &Arc<Self>, ws: WsStream, epoch: u64) -> bool {
        let mut slot = self.lock_connection();
        if self.epoch.load(Ordering::Acquire) != epoch {
            return false;
        }

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let (sink, stream) = ws.split();
        let (outbound, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_loop(sink, rx));
        let reader = tokio::spawn(read_loop(Arc::downgrade(self), stream, generation));

        if let Some(old) = slot.replace(Connection {
            generation,
            outbound,
            reader,
            writer,
        }) {
            let failed = self.pending.fail_all();
            debug!(
                generation = old.generation,
                failed_requests = failed,
                "superseded concurrent gateway connection"
            );
            old.shutdown();
        }
        self.set_state(ConnectionState::Open);
        true
    }

    /// Called by the reader once its socket is gone.
    fn handle_close(self: &Arc<Self>, generation: u64) {
        let failed = {
            let mut slot = self.lock_connection();
            match slot.as_ref() {
                Some(conn) if conn.generation == generation => {},
                _ => {
                    debug!(generation, "ignoring close of superseded gateway connection");
                    return;
                },
            }
            // Dropping the connection ends the writer; the reader is us.
            drop(slot.take());
            self.set_state(ConnectionState::Disconnected);
            self.pending.fail_all()
        };
        info!(generation, failed_requests = failed, "gateway connection closed");
        self.schedule_reconnect();
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        if !self.config.reconnect.enabled {
            return;
        }
        let mut slot = self.lock_reconnect();
        if slot.armed {
            return;
        }
        slot.armed = true;
        let epoch = self.epoch.load(Ordering::Acquire);
        slot.handle = Some(tokio::spawn(reconnect_loop(Arc::downgrade(self), epoch)));
    }

    fn cancel_reconnect(&self) {
        let mut slot = self.lock_reconnect();
        slot.armed = false;
        if let Some(handle) = slot.handle.take() {
            handle.abort();
        }
    }

    // ── Dispatch ─────────────────────────────────────────────────────

    fn handle_text(&self, text: &str) {
        match GatewayFrame::parse(text) {
            Ok(frame) => self.dispatch(frame),
            Err(e) => {
                warn!(error = %e, len = text.len(), "dropping malformed gateway frame");
                self.frame_dropped("malformed");
            },
        }
    }

    fn dispatch(&self, frame: GatewayFrame) {
        match frame {
            GatewayFrame::HelloOk(_) => debug!("ignoring hello-ok outside of a handshake"),
            GatewayFrame::Response(response) => {
                let id = response.id.clone();
                if !self.pending.complete(response) {
                    debug!(id = %id, "response for unknown or expired request id");
                }
            },
            GatewayFrame::Event(event) => {
                debug!(event = %event.event, seq = ?event.seq, "gateway event");
                self.listeners.dispatch(&event);
                // No receivers is fine.
                let _ = self.events_tx.send(event);
            },
            GatewayFrame::Request(request) => {
                debug!(method = %request.method, "ignoring gateway-originated request");
            },
        }
    }

    fn frame_dropped(&self, reason: &'static str) {
        debug!(reason, "gateway frame dropped");
        #[cfg(feature = "metrics")]
        counter!(metric::FRAMES_DROPPED_TOTAL, "reason" => reason).increment(1);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let conn = match self.connection.get_mut() {
            Ok(slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(conn) = conn {
            conn.shutdown();
        }
        let handle = match self.reconnect.get_mut() {
            Ok(slot) => slot.handle.take(),
            Err(poisoned) => poisoned.into_inner().handle.take(),
        };
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

// ── Tasks ────────────────────────────────────────────────────────────

async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        let closing = matches!(msg, Message::Close(_));
        if let Err(e) = sink.send(msg).await {
            debug!(error = %e, "gateway write failed");
            break;
        }
        if closing {
            break;
        }
    }
    let _ = sink.close().await;
}

async fn read_loop(weak: Weak<Inner>, mut stream: SplitStream<WsStream>, generation: u64) {
    while let Some(msg) = stream.next().await {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        match msg {
            Ok(Message::Text(text)) => inner.handle_text(text.as_str()),
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => inner.handle_text(text),
                Err(_) => inner.frame_dropped("non-utf8 binary frame"),
            },
            Ok(Message::Close(frame)) => {
                debug!(generation, ?frame, "gateway sent close frame");
                break;
            },
            Ok(_) => {},
            Err(e) => {
                warn!(generation, error = %e, "gateway socket error");
                break;
            },
        }
    }
    if let Some(inner) = weak.upgrade() {
        inner.handle_close(generation);
    }
}

async fn reconnect_loop(weak: Weak<Inner>, epoch: u64) {
    loop {
        let delay = {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let attempt = inner.reconnect_attempts.fetch_add(1, Ordering::AcqRel);
            let delay = inner.config.reconnect.delay_for(attempt);
            info!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "scheduling gateway reconnect"
            );
            delay
        };
        tokio::time::sleep(delay).await;

        let Some(inner) = weak.upgrade() else {
            return;
        };
        inner.lock_reconnect().armed = false;
        match inner.establish(epoch).await {
            Ok(_) => {
                inner.reconnect_attempts.store(0, Ordering::Release);
                info!("gateway reconnected");
                #[cfg(feature = "metrics")]
                counter!(metric::RECONNECTS_TOTAL, "result" => "ok").increment(1);
                return;
            },
            Err(e) => {
                warn!(error = %e, "gateway reconnect failed");
                #[cfg(feature = "metrics")]
                counter!(metric::RECONNECTS_TOTAL, "result" => "error").increment(1);
                // A failed connect produces no close event, so re-arm here.
                let mut slot = inner.lock_reconnect();
                if slot.armed || inner.epoch.load(Ordering::Acquire) != epoch {
                    return;
                }
                slot.armed = true;
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {super::*, moltis_protocol::ErrorShape};

    fn client() -> GatewayClient {
        GatewayClient::new(GatewayClientConfig::default()).unwrap()
    }

    #[test]
    fn ok_response_without_payload_is_null() {
        let response = ResponseFrame {
            id: "1".into(),
            ok: true,
            payload: None,
            error: None,
        };
        assert_eq!(response_result("health", response).unwrap(), Value::Null);
    }

    #[test]
    fn failed_response_without_message_uses_generic_text() {
        let response = ResponseFrame::err("1", ErrorShape::default());
        match response_result("health", response) {
            Err(Error::Rpc { message, code, .. }) => {
                assert_eq!(message, "request failed");
                assert!(code.is_none());
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn failed_response_without_error_object_uses_generic_text() {
        let response = ResponseFrame {
            id: "1".into(),
            ok: false,
            payload: None,
            error: None,
        };
        assert!(matches!(
            response_result("health", response),
            Err(Error::Rpc { message, .. }) if message == "request failed"
        ));
    }

    #[test]
    fn new_rejects_invalid_config() {
        assert!(matches!(
            GatewayClient::new(GatewayClientConfig::new("http://localhost")),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn request_before_connect_is_not_connected() {
        let client = client();
        let err = client.request_value("health", None).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
        assert_eq!(client.pending_requests(), 0);
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn responses_route_to_matching_request() {
        let client = client();
        let pending = client.inner.pending.clone();
        let (_g1, rx1) = pending.register("1");
        let (_g2, rx2) = pending.register("2");

        client.inner.handle_text(r#"{"type":"res","id":"2","ok":true,"payload":"second"}"#);
        client.inner.handle_text(r#"{"type":"res","id":"1","ok":true,"payload":"first"}"#);

        assert_eq!(rx1.await.unwrap().payload, Some(Value::from("first")));
        assert_eq!(rx2.await.unwrap().payload, Some(Value::from("second")));
    }

    #[tokio::test]
    async fn events_reach_listeners_and_broadcast() {
        let client = client();
        let hits = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&hits);
        let _sub = client.on_event(move |event| {
            assert_eq!(event.event, "tick");
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let mut rx = client.subscribe_events();

        client.inner.handle_text(r#"{"type":"event","event":"tick","seq":1}"#);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(rx.recv().await.unwrap().seq, Some(1));
    }

    #[test]
    fn malformed_and_unexpected_frames_are_ignored() {
        let client = client();
        client.inner.handle_text("{not json");
        client.inner.handle_text(r#"{"type":"res","id":"999","ok":true}"#);
        client.inner.handle_text(r#"{"type":"hello-ok"}"#);
        client.inner.handle_text(r#"{"type":"req","id":"1","method":"ping"}"#);
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(client.pending_requests(), 0);
    }

    #[test]
    fn disconnect_without_connection_is_noop() {
        let client = client();
        client.disconnect();
        client.disconnect();
        assert!(!client.is_connected());
    }

    #[test]
    fn request_ids_are_monotonic() {
        let client = client();
        let a = client.inner.next_request_id.fetch_add(1, Ordering::Relaxed);
        let b = client.inner.next_request_id.fetch_add(1, Ordering::Relaxed);
        assert_eq!(a, 1);
        assert!(b > a);
    }
}
