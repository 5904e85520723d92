//! WebSocket connection and event loop.
//!
//! A [`Connection`] owns one physical WebSocket. Construction is synchronous:
//! the socket is established on a spawned tokio task, so callers can hold and
//! use the connection immediately; outbound frames queue in the command
//! channel until the socket is up and flush afterwards.
//!
//! # Event Loop
//!
//! The spawned task handles:
//!
//! - Incoming frames from the peer (ack responses, named events)
//! - Outgoing frames from the API (fire-and-forget and ack-style)
//! - Request/response correlation by id
//! - Lifecycle events (`connect`, `disconnect`, `reconnect`, `error`)
//!   delivered through the ordinary listener path
//! - Reconnection with exponential backoff when enabled

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json, to_string};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep_until, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, trace, warn};
use url::Url;

use crate::config::ConnectOptions;
use crate::error::{Error, Result};
use crate::identifiers::{CorrelationId, ListenerId};
use crate::protocol::{AckRequest, EventFrame, Inbound};

use super::listeners::{
    EVENT_CONNECT, EVENT_DISCONNECT, EVENT_ERROR, EVENT_RECONNECT, ListenerRegistry,
};
use super::pending::PendingAcks;

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for ack-style requests.
///
/// Never zero or infinite; callers needing something else pass it explicitly.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum outstanding ack requests before new ones are rejected.
const MAX_PENDING_ACKS: usize = 128;

// ============================================================================
// Types
// ============================================================================

/// Client-side WebSocket stream.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of the socket.
type WsSink = SplitSink<WsStream, Message>;

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Send a fire-and-forget event frame.
    Emit { frame: EventFrame },
    /// Send an ack-style request and register its resolver.
    EmitAck {
        frame: AckRequest,
        ack_tx: oneshot::Sender<Result<Value>>,
    },
    /// Remove a timed-out pending entry.
    Discard(CorrelationId),
    /// Shut down the connection.
    Shutdown,
}

/// Why [`Connection::drive`] returned.
enum LoopExit {
    /// Shutdown was requested locally (or every handle was dropped).
    Shutdown,
    /// The peer closed the socket or the transport failed.
    Remote,
}

/// Sends [`ConnectionCommand::Discard`] on drop unless disarmed.
///
/// An ack call that is cancelled (its future dropped mid-await) must still
/// remove the entry registered loop-side; the guard covers that path and the
/// timeout path with one mechanism. Settled outcomes disarm it.
struct DiscardGuard {
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    correlation_id: CorrelationId,
    armed: bool,
}

impl DiscardGuard {
    fn new(
        command_tx: mpsc::UnboundedSender<ConnectionCommand>,
        correlation_id: CorrelationId,
    ) -> Self {
        Self {
            command_tx,
            correlation_id,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for DiscardGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = self
                .command_tx
                .send(ConnectionCommand::Discard(self.correlation_id));
        }
    }
}

// ============================================================================
// Connection
// ============================================================================

/// One physical WebSocket connection with listener and ack bookkeeping.
///
/// Shared read/write by every consumer holding a reference; no consumer may
/// assume exclusive ownership. All operations are non-blocking; the internal
/// event loop stays responsive while any number of ack requests are
/// outstanding.
pub struct Connection {
    /// Channel to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// Outstanding ack requests (shared with the event loop).
    pending: Arc<PendingAcks>,
    /// Listener registry (shared with the event loop).
    listeners: Arc<ListenerRegistry>,
}

impl Clone for Connection {
    fn clone(&self) -> Self {
        Self {
            command_tx: self.command_tx.clone(),
            pending: Arc::clone(&self.pending),
            listeners: Arc::clone(&self.listeners),
        }
    }
}

impl Connection {
    /// Opens a connection to `url`.
    ///
    /// Returns immediately; the socket is established on a background task.
    /// Subscribe to [`EVENT_CONNECT`] to observe readiness. Must be called
    /// from within a tokio runtime.
    #[must_use]
    pub fn open(url: Url, options: ConnectOptions) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let pending = Arc::new(PendingAcks::new());
        let listeners = Arc::new(ListenerRegistry::new());

        tokio::spawn(Self::run(
            url,
            options,
            command_rx,
            Arc::clone(&pending),
            Arc::clone(&listeners),
        ));

        Self {
            command_tx,
            pending,
            listeners,
        }
    }

    // ========================================================================
    // Listener registration
    // ========================================================================

    /// Registers a callback for `event`.
    ///
    /// Listeners for one event fire in registration order per received event
    /// instance. The returned id names this exact registration for
    /// [`Connection::off`].
    pub fn on(&self, event: &str, callback: impl Fn(Value) + Send + Sync + 'static) -> ListenerId {
        self.listeners.add(event, Arc::new(callback))
    }

    /// Registers a callback that fires at most once.
    pub fn once(
        &self,
        event: &str,
        callback: impl Fn(Value) + Send + Sync + 'static,
    ) -> ListenerId {
        self.listeners.add_once(event, Arc::new(callback))
    }

    /// Removes the registration named by `(event, id)`.
    ///
    /// Never touches other consumers' listeners for the same event.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        self.listeners.remove(event, id)
    }

    // ========================================================================
    // Sending
    // ========================================================================

    /// Sends a fire-and-forget event.
    ///
    /// No result; transport failures surface through `disconnect`/`error`
    /// listeners, not here.
    pub fn emit(&self, event: &str, payload: Value) {
        let frame = EventFrame::new(event, payload);
        if self
            .command_tx
            .send(ConnectionCommand::Emit { frame })
            .is_err()
        {
            warn!(event, "Emit on closed connection dropped");
        }
    }

    /// Sends an ack-style request and awaits the correlated response with the
    /// default timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::AckTimeout`] if no matching response arrives in time
    /// - [`Error::ConnectionClosed`] if the connection closes while pending
    /// - [`Error::Remote`] if the peer answers with an error field
    /// - [`Error::Protocol`] if too many requests are already outstanding
    pub async fn emit_ack(&self, event: &str, payload: Value) -> Result<Value> {
        self.emit_ack_with_timeout(event, payload, DEFAULT_ACK_TIMEOUT)
            .await
    }

    /// Sends an ack-style request with a caller-chosen timeout.
    ///
    /// Exactly one settlement per call: a response arriving after the timer
    /// has fired finds its pending entry already discarded. Dropping the
    /// returned future before settlement removes the entry as well.
    ///
    /// # Errors
    ///
    /// Same as [`Connection::emit_ack`].
    pub async fn emit_ack_with_timeout(
        &self,
        event: &str,
        payload: Value,
        ack_timeout: Duration,
    ) -> Result<Value> {
        let frame = AckRequest::new(event, payload);
        let correlation_id = frame.correlation_id;
        let (ack_tx, ack_rx) = oneshot::channel();

        // Armed until settlement: if this future is dropped mid-await, or the
        // timer fires first, the guard removes the loop-side pending entry.
        let mut guard = DiscardGuard::new(self.command_tx.clone(), correlation_id);

        self.command_tx
            .send(ConnectionCommand::EmitAck { frame, ack_tx })
            .map_err(|_| Error::ConnectionClosed)?;

        match timeout(ack_timeout, ack_rx).await {
            Ok(Ok(result)) => {
                guard.disarm();
                result
            }
            Ok(Err(_)) => {
                guard.disarm();
                Err(Error::ConnectionClosed)
            }
            Err(_) => {
                // Timer fired first; the guard's drop discards the pending
                // entry so a late response cannot re-settle.
                Err(Error::ack_timeout(
                    correlation_id,
                    ack_timeout.as_millis() as u64,
                ))
            }
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Returns the number of outstanding ack requests.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Returns the number of listeners registered for `event`.
    #[inline]
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.count(event)
    }

    /// Returns `true` while the event loop is alive.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.command_tx.is_closed()
    }

    /// Shuts the connection down.
    ///
    /// Rejects every pending ack with
    /// [`Error::ConnectionClosed`] and deregisters all listeners.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(ConnectionCommand::Shutdown);
        self.listeners.clear();
    }

    // ========================================================================
    // Event loop
    // ========================================================================

    /// Connect/drive/reconnect loop.
    async fn run(
        url: Url,
        options: ConnectOptions,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        pending: Arc<PendingAcks>,
        listeners: Arc<ListenerRegistry>,
    ) {
        let mut delay = options.reconnect_delay;
        let mut connected_before = false;
        // Commands received while disconnected, flushed after (re)connect.
        let mut backlog: Vec<ConnectionCommand> = Vec::new();

        loop {
            match connect_async(url.as_str()).await {
                Ok((ws_stream, _)) => {
                    delay = options.reconnect_delay;

                    if connected_before {
                        debug!(%url, "Reconnected");
                        listeners.dispatch(EVENT_RECONNECT, &Value::Null);
                    } else {
                        debug!(%url, "Connected");
                        connected_before = true;
                        listeners.dispatch(EVENT_CONNECT, &Value::Null);
                    }

                    let exit = Self::drive(
                        ws_stream,
                        &mut command_rx,
                        &mut backlog,
                        &pending,
                        &listeners,
                    )
                    .await;

                    listeners.dispatch(EVENT_DISCONNECT, &Value::Null);

                    match exit {
                        LoopExit::Shutdown => {
                            pending.fail_all();
                            listeners.clear();
                            debug!(%url, "Event loop terminated");
                            return;
                        }
                        LoopExit::Remote if !options.auto_reconnect => {
                            pending.fail_all();
                            debug!(%url, "Connection dropped, no reconnect");
                            return;
                        }
                        LoopExit::Remote => {}
                    }
                }
                Err(e) => {
                    warn!(%url, error = %e, "Connect failed");
                    listeners.dispatch(EVENT_ERROR, &json!(e.to_string()));

                    if !options.auto_reconnect {
                        listeners.dispatch(EVENT_DISCONNECT, &Value::Null);
                        pending.fail_all();
                        return;
                    }
                }
            }

            trace!(%url, ?delay, "Reconnect backoff");
            if !Self::backoff(delay, &mut command_rx, &mut backlog, &pending).await {
                // Shutdown while backing off.
                listeners.dispatch(EVENT_DISCONNECT, &Value::Null);
                pending.fail_all();
                listeners.clear();
                return;
            }
            delay = (delay * 2).min(options.max_reconnect_delay);
        }
    }

    /// Waits out one backoff period while still honoring commands.
    ///
    /// Outbound frames are parked in `backlog`; returns `false` on shutdown.
    async fn backoff(
        delay: Duration,
        command_rx: &mut mpsc::UnboundedReceiver<ConnectionCommand>,
        backlog: &mut Vec<ConnectionCommand>,
        pending: &Arc<PendingAcks>,
    ) -> bool {
        let deadline = Instant::now() + delay;

        loop {
            tokio::select! {
                _ = sleep_until(deadline) => return true,

                command = command_rx.recv() => match command {
                    None | Some(ConnectionCommand::Shutdown) => return false,
                    Some(ConnectionCommand::Discard(id)) => pending.discard(id),
                    Some(other) => backlog.push(other),
                }
            }
        }
    }

    /// Drives one established socket until it drops or shutdown is requested.
    async fn drive(
        ws_stream: WsStream,
        command_rx: &mut mpsc::UnboundedReceiver<ConnectionCommand>,
        backlog: &mut Vec<ConnectionCommand>,
        pending: &Arc<PendingAcks>,
        listeners: &Arc<ListenerRegistry>,
    ) -> LoopExit {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        // Flush frames queued while disconnected.
        for command in backlog.drain(..) {
            if let Some(exit) = Self::handle_command(command, &mut ws_write, pending).await {
                return exit;
            }
        }

        loop {
            tokio::select! {
                // Incoming frames from the peer
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            Self::handle_incoming(&text, pending, listeners);
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("WebSocket closed by remote");
                            return LoopExit::Remote;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            listeners.dispatch(EVENT_ERROR, &json!(e.to_string()));
                            return LoopExit::Remote;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            return LoopExit::Remote;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                // Outgoing frames from the API
                command = command_rx.recv() => {
                    let Some(command) = command else {
                        debug!("Command channel closed");
                        return LoopExit::Shutdown;
                    };

                    if let Some(exit) =
                        Self::handle_command(command, &mut ws_write, pending).await
                    {
                        return exit;
                    }
                }
            }
        }
    }

    /// Executes one command against the write half.
    ///
    /// Returns `Some(exit)` when the loop should stop.
    async fn handle_command(
        command: ConnectionCommand,
        ws_write: &mut WsSink,
        pending: &Arc<PendingAcks>,
    ) -> Option<LoopExit> {
        match command {
            ConnectionCommand::Emit { frame } => {
                match to_string(&frame) {
                    Ok(json) => {
                        if let Err(e) = ws_write.send(Message::Text(json.into())).await {
                            warn!(event = %frame.event, error = %e, "Emit failed");
                        }
                    }
                    Err(e) => warn!(event = %frame.event, error = %e, "Emit serialization failed"),
                }
                None
            }

            ConnectionCommand::EmitAck { frame, ack_tx } => {
                let correlation_id = frame.correlation_id;

                // The cap is enforced here, where inserts happen, so
                // concurrent callers cannot pass a stale count together.
                let outstanding = pending.len();
                if outstanding >= MAX_PENDING_ACKS {
                    warn!(outstanding, max = MAX_PENDING_ACKS, "Too many pending acks");
                    let _ = ack_tx.send(Err(Error::protocol(format!(
                        "too many pending acks: {outstanding}/{MAX_PENDING_ACKS}"
                    ))));
                    return None;
                }

                let json = match to_string(&frame) {
                    Ok(j) => j,
                    Err(e) => {
                        let _ = ack_tx.send(Err(Error::Json(e)));
                        return None;
                    }
                };

                // Register before the write so a fast peer cannot answer an
                // unknown id.
                pending.insert(correlation_id, ack_tx);

                if let Err(e) = ws_write.send(Message::Text(json.into())).await
                    && let Some(tx) = pending.take(correlation_id)
                {
                    let _ = tx.send(Err(Error::WebSocket(e)));
                }

                trace!(%correlation_id, "Ack request sent");
                None
            }

            ConnectionCommand::Discard(id) => {
                pending.discard(id);
                None
            }

            ConnectionCommand::Shutdown => {
                debug!("Shutdown command received");
                let _ = ws_write.close().await;
                Some(LoopExit::Shutdown)
            }
        }
    }

    /// Routes one inbound text frame.
    fn handle_incoming(
        text: &str,
        pending: &Arc<PendingAcks>,
        listeners: &Arc<ListenerRegistry>,
    ) {
        match Inbound::parse(text) {
            Ok(Inbound::Ack(response)) => pending.settle(response),
            Ok(Inbound::Event(frame)) => listeners.dispatch(&frame.event, &frame.payload),
            Err(_) => warn!(text = %text, "Failed to parse incoming frame"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::net::TcpListener;
    use tokio::sync::mpsc::unbounded_channel;
    use tokio_tungstenite::accept_async;

    const WAIT: Duration = Duration::from_secs(5);

    fn local_url(port: u16) -> Url {
        crate::test_support::init_tracing();
        Url::parse(&format!("ws://127.0.0.1:{port}")).expect("valid url")
    }

    /// Test peer: acks every correlated request with its own payload, except
    /// events named `noreply` (ignored) and `slow` (acked after 200ms).
    /// An event named `announce` triggers a broadcast event back.
    async fn spawn_peer() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let Ok(mut ws) = accept_async(stream).await else {
                        return;
                    };

                    while let Some(Ok(msg)) = ws.next().await {
                        let Message::Text(text) = msg else { continue };
                        let Ok(frame) = serde_json::from_str::<Value>(&text) else {
                            continue;
                        };

                        let event = frame.get("event").and_then(Value::as_str).unwrap_or("");

                        if event == "announce" {
                            let broadcast = json!({"event": "broadcast", "payload": {"n": 1}});
                            let _ = ws.send(Message::Text(broadcast.to_string().into())).await;
                            continue;
                        }

                        let Some(cid) = frame.get("correlationId").cloned() else {
                            continue;
                        };
                        if event == "noreply" {
                            continue;
                        }
                        if event == "slow" {
                            tokio::time::sleep(Duration::from_millis(200)).await;
                        }

                        let payload = frame.get("payload").cloned().unwrap_or(Value::Null);
                        let ack = json!({"correlationId": cid, "result": payload});
                        let _ = ws.send(Message::Text(ack.to_string().into())).await;
                    }
                });
            }
        });

        port
    }

    async fn connect_and_wait(port: u16, options: ConnectOptions) -> Connection {
        let conn = Connection::open(local_url(port), options);
        let (tx, mut rx) = unbounded_channel();
        conn.on(EVENT_CONNECT, move |_| {
            let _ = tx.send(());
        });
        timeout(WAIT, rx.recv()).await.expect("connect event");
        conn
    }

    #[tokio::test]
    async fn test_connect_event_fires() {
        let port = spawn_peer().await;
        let conn = connect_and_wait(port, ConnectOptions::default()).await;
        assert!(conn.is_open());
        conn.shutdown();
    }

    #[tokio::test]
    async fn test_emit_ack_resolves_with_payload() {
        let port = spawn_peer().await;
        let conn = connect_and_wait(port, ConnectOptions::default()).await;

        let reply = conn
            .emit_ack("echo", json!({"text": "hi"}))
            .await
            .expect("ack");
        assert_eq!(reply, json!({"text": "hi"}));
        assert_eq!(conn.pending_count(), 0);

        conn.shutdown();
    }

    #[tokio::test]
    async fn test_emit_ack_out_of_order_responses() {
        let port = spawn_peer().await;
        let conn = connect_and_wait(port, ConnectOptions::default()).await;

        // The slow request is issued first but answered last.
        let slow = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.emit_ack("slow", json!("s")).await })
        };
        let fast = conn.emit_ack("echo", json!("f")).await.expect("fast ack");

        assert_eq!(fast, json!("f"));
        assert_eq!(slow.await.expect("join").expect("slow ack"), json!("s"));

        conn.shutdown();
    }

    #[tokio::test]
    async fn test_emit_ack_timeout() {
        let port = spawn_peer().await;
        let conn = connect_and_wait(port, ConnectOptions::default()).await;

        let err = conn
            .emit_ack_with_timeout("noreply", json!({}), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        // Discard is processed by the loop; the table drains.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(conn.pending_count(), 0);

        conn.shutdown();
    }

    #[tokio::test]
    async fn test_late_ack_after_timeout_is_discarded() {
        let port = spawn_peer().await;
        let conn = connect_and_wait(port, ConnectOptions::default()).await;

        // Times out at 10ms; the peer answers at ~200ms.
        let err = conn
            .emit_ack_with_timeout("slow", json!({}), Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        // The late response must be dropped, not re-settled.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(conn.pending_count(), 0);
        assert!(conn.is_open());

        conn.shutdown();
    }

    #[tokio::test]
    async fn test_cancelled_emit_ack_clears_pending_entry() {
        let port = spawn_peer().await;
        let conn = connect_and_wait(port, ConnectOptions::default()).await;

        let in_flight = {
            let conn = conn.clone();
            tokio::spawn(async move {
                conn.emit_ack_with_timeout("noreply", json!({}), Duration::from_secs(60))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(conn.pending_count(), 1);

        // Cancellation is dropping the future; the entry must not outlive it.
        in_flight.abort();
        let _ = in_flight.await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(conn.pending_count(), 0);
        assert!(conn.is_open());

        conn.shutdown();
    }

    #[tokio::test]
    async fn test_pending_cap_rejects_overflow() {
        let port = spawn_peer().await;
        let conn = connect_and_wait(port, ConnectOptions::default()).await;

        let mut in_flight = Vec::new();
        for _ in 0..MAX_PENDING_ACKS {
            let conn = conn.clone();
            in_flight.push(tokio::spawn(async move {
                conn.emit_ack_with_timeout("noreply", json!({}), WAIT).await
            }));
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(conn.pending_count(), MAX_PENDING_ACKS);

        // One over the cap settles immediately with a protocol error.
        let err = conn
            .emit_ack_with_timeout("noreply", json!({}), WAIT)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
        assert_eq!(conn.pending_count(), MAX_PENDING_ACKS);

        conn.shutdown();
        for task in in_flight {
            let _ = task.await;
        }
    }

    #[tokio::test]
    async fn test_shutdown_rejects_pending_acks() {
        let port = spawn_peer().await;
        let conn = connect_and_wait(port, ConnectOptions::default()).await;

        let pending_req = {
            let conn = conn.clone();
            tokio::spawn(async move {
                conn.emit_ack_with_timeout("noreply", json!({}), WAIT).await
            })
        };
        // Let the request reach the event loop.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(conn.pending_count(), 1);

        conn.shutdown();

        let err = pending_req.await.expect("join").unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
        assert_eq!(conn.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_event_dispatch_to_listener() {
        let port = spawn_peer().await;
        let conn = connect_and_wait(port, ConnectOptions::default()).await;

        let (tx, mut rx) = unbounded_channel();
        conn.on("broadcast", move |payload| {
            let _ = tx.send(payload);
        });

        conn.emit("announce", Value::Null);

        let payload = timeout(WAIT, rx.recv()).await.expect("event").expect("payload");
        assert_eq!(payload, json!({"n": 1}));

        conn.shutdown();
    }

    #[tokio::test]
    async fn test_off_removes_only_named_listener() {
        let port = spawn_peer().await;
        let conn = connect_and_wait(port, ConnectOptions::default()).await;

        let (tx_keep, mut rx_keep) = unbounded_channel();
        let (tx_drop, mut rx_drop) = unbounded_channel();

        conn.on("broadcast", move |_| {
            let _ = tx_keep.send(());
        });
        let dropped = conn.on("broadcast", move |_| {
            let _ = tx_drop.send(());
        });

        assert!(conn.off("broadcast", dropped));

        conn.emit("announce", Value::Null);
        timeout(WAIT, rx_keep.recv()).await.expect("kept listener");
        assert!(rx_drop.try_recv().is_err());

        conn.shutdown();
    }

    #[tokio::test]
    async fn test_connect_failure_without_reconnect() {
        // Nothing listens on this port.
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let conn = Connection::open(local_url(port), ConnectOptions::default());
        let (tx, mut rx) = unbounded_channel();
        conn.on(EVENT_DISCONNECT, move |_| {
            let _ = tx.send(());
        });

        timeout(WAIT, rx.recv()).await.expect("disconnect event");

        // Event loop terminates; later ack requests fail fast.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!conn.is_open());
        let err = conn.emit_ack("echo", Value::Null).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_reconnect_after_remote_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();

        // First accept is dropped immediately; second stays open.
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("first accept");
            let ws = accept_async(stream).await.expect("handshake");
            drop(ws);

            let (stream, _) = listener.accept().await.expect("second accept");
            let mut ws = accept_async(stream).await.expect("handshake");
            while let Some(Ok(_)) = ws.next().await {}
        });

        let options = ConnectOptions::default()
            .auto_reconnect(true)
            .reconnect_delay(Duration::from_millis(10));
        let conn = Connection::open(local_url(port), options);

        let (tx, mut rx) = unbounded_channel();
        conn.on(EVENT_RECONNECT, move |_| {
            let _ = tx.send(());
        });

        timeout(WAIT, rx.recv()).await.expect("reconnect event");
        assert!(conn.is_open());

        conn.shutdown();
    }

    #[tokio::test]
    async fn test_emit_queued_before_connect_is_flushed() {
        let port = spawn_peer().await;
        let conn = Connection::open(local_url(port), ConnectOptions::default());

        let (tx, mut rx) = unbounded_channel();
        conn.on("broadcast", move |_| {
            let _ = tx.send(());
        });

        // Sent before the socket is up; must flush once connected.
        conn.emit("announce", Value::Null);

        timeout(WAIT, rx.recv()).await.expect("broadcast after flush");
        conn.shutdown();
    }
}
