//! GatewayClient — connection lifecycle, handshake, request multiplexing
//!
//! One client owns one logical connection. `connect()` opens the transport and
//! drives the protocol v3 handshake (a server challenge short-circuits the
//! settling timer); a single connection task then correlates responses to
//! pending requests and fans chat events out to subscribers. Unexpected
//! closures schedule a full reconnect with exponential backoff.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tether_protocol::chat::{self, ChatEventPayload, ChatState, ChatStreamEvent, Role};
use tether_protocol::frames::{events, methods, Frame};
use tether_protocol::{ChallengePayload, ChatMessage, ConnectParams};

use crate::config::GatewayConfig;
use crate::error::ClientError;
use crate::reconnect::{ReconnectConfig, CLOSE_NORMAL};
use crate::state::{AtomicPhase, ConnectionPhase, ConnectionState};
use crate::subscribe::{HandlerSet, Subscription};
use crate::transport::{Connector, FrameSink, FrameStream, TransportFrame};
use crate::ws::WsConnector;

/// Session key used when the caller does not care about sessions.
pub const DEFAULT_SESSION: &str = "main";

enum Command {
    Request {
        method: String,
        params: Value,
        reply: oneshot::Sender<Result<Value, ClientError>>,
    },
    Close {
        code: u16,
        reason: String,
    },
}

struct ConnHandle {
    generation: u64,
    cmd_tx: mpsc::UnboundedSender<Command>,
}

struct ClientInner {
    config: GatewayConfig,
    connector: Box<dyn Connector>,
    connecting: AtomicBool,
    reconnect_attempts: AtomicU32,
    generation: AtomicU64,
    phase: AtomicPhase,
    conn: Mutex<Option<ConnHandle>>,
    reconnect_token: Mutex<CancellationToken>,
    messages: HandlerSet<ChatMessage>,
    states: HandlerSet<ConnectionState>,
    chat_events: HandlerSet<ChatStreamEvent>,
}

impl ClientInner {
    fn notify_state(&self, state: ConnectionState) {
        self.states.emit(&state);
    }

    /// Cancel any scheduled reconnect and hand out a fresh token for the next.
    fn cancel_reconnect(&self) -> CancellationToken {
        let mut slot = self.reconnect_token.lock().expect("reconnect token poisoned");
        slot.cancel();
        *slot = CancellationToken::new();
        slot.clone()
    }
}

/// Client for the agent gateway. Cheap to clone; all clones share the one
/// logical connection.
#[derive(Clone)]
pub struct GatewayClient {
    inner: Arc<ClientInner>,
}

impl GatewayClient {
    /// Client over a real WebSocket transport.
    #[must_use]
    pub fn new(config: GatewayConfig) -> Self {
        Self::with_connector(config, Box::new(WsConnector))
    }

    /// Client over a custom transport (tests inject a mock here).
    #[must_use]
    pub fn with_connector(config: GatewayConfig, connector: Box<dyn Connector>) -> Self {
        config.warn_if_insecure();
        Self {
            inner: Arc::new(ClientInner {
                config,
                connector,
                connecting: AtomicBool::new(false),
                reconnect_attempts: AtomicU32::new(0),
                generation: AtomicU64::new(0),
                phase: AtomicPhase::new(ConnectionPhase::Idle),
                conn: Mutex::new(None),
                reconnect_token: Mutex::new(CancellationToken::new()),
                messages: HandlerSet::new(),
                states: HandlerSet::new(),
                chat_events: HandlerSet::new(),
            }),
        }
    }

    // ── Subscriptions ──

    /// Complete messages: local input echoes, synthesized finals, system notices.
    pub fn on_message<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ChatMessage) + Send + Sync + 'static,
    {
        self.inner.messages.subscribe(handler)
    }

    /// Observable connection state changes.
    pub fn on_state_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ConnectionState) + Send + Sync + 'static,
    {
        self.inner.states.subscribe(handler)
    }

    /// Streaming chat events (deltas and run terminators).
    pub fn on_chat_event<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ChatStreamEvent) + Send + Sync + 'static,
    {
        self.inner.chat_events.subscribe(handler)
    }

    /// Snapshot of the externally observable connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        match self.inner.phase.load() {
            ConnectionPhase::Connecting
            | ConnectionPhase::AwaitingHandshake
            | ConnectionPhase::HandshakeSent => ConnectionState::connecting(),
            ConnectionPhase::Ready => ConnectionState::connected(),
            ConnectionPhase::Idle | ConnectionPhase::Closed => ConnectionState::idle(),
        }
    }

    // ── Lifecycle ──

    /// Open the transport and complete the handshake.
    ///
    /// Exactly one attempt may be in flight; concurrent callers get
    /// [`ClientError::AlreadyConnecting`] immediately, they do not join the
    /// in-flight attempt. Any previous connection is torn down first.
    pub async fn connect(&self) -> Result<(), ClientError> {
        if self.inner.connecting.swap(true, Ordering::SeqCst) {
            return Err(ClientError::AlreadyConnecting);
        }

        let result = self.connect_inner().await;
        self.inner.connecting.store(false, Ordering::SeqCst);

        if let Err(e) = &result {
            self.inner.phase.store(ConnectionPhase::Closed);
            self.inner.notify_state(ConnectionState::failed(e.to_string()));
        }
        result
    }

    async fn connect_inner(&self) -> Result<(), ClientError> {
        let inner = &self.inner;

        // A manual connect supersedes any scheduled reconnect and any live
        // connection; the old task sees a stale generation and stays quiet.
        inner.cancel_reconnect();
        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(old) = inner.conn.lock().expect("conn slot poisoned").take() {
            let _ = old.cmd_tx.send(Command::Close {
                code: CLOSE_NORMAL,
                reason: "cleanup".to_string(),
            });
        }

        inner.phase.store(ConnectionPhase::Connecting);
        inner.notify_state(ConnectionState::connecting());

        let url = inner.config.endpoint().to_string();
        info!("connecting to gateway at {url}");

        let opened =
            tokio::time::timeout(inner.config.connect_timeout, inner.connector.connect(&url))
                .await;
        let (sink, stream) = match opened {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(ClientError::ConnectionTimeout),
        };

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (handshake_tx, handshake_rx) = oneshot::channel();
        *inner.conn.lock().expect("conn slot poisoned") = Some(ConnHandle {
            generation,
            cmd_tx,
        });
        inner.phase.store(ConnectionPhase::AwaitingHandshake);

        let task = ConnectionTask {
            client: self.clone(),
            generation,
            sink,
            pending: HashMap::new(),
            handshake_sent: false,
            handshake_id: None,
            handshake_reply: Some(handshake_tx),
        };
        tokio::spawn(task.run(stream, cmd_rx));

        match handshake_rx.await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Transport("connection task exited".to_string())),
        }
    }

    /// Close intentionally. Never triggers a reconnect.
    pub fn disconnect(&self) {
        self.inner.cancel_reconnect();
        let conn = self.inner.conn.lock().expect("conn slot poisoned").take();
        match conn {
            Some(conn) => {
                // The task emits the idle state once the close completes.
                let _ = conn.cmd_tx.send(Command::Close {
                    code: CLOSE_NORMAL,
                    reason: "client disconnect".to_string(),
                });
            }
            None => {
                self.inner.phase.store(ConnectionPhase::Idle);
                self.inner.notify_state(ConnectionState::idle());
            }
        }
    }

    // ── Requests ──

    /// Fire-and-forget chat send. Returns `false` without side effects when
    /// the connection is not ready; `true` once the request is dispatched
    /// (not once it is answered). Delivery failures are only logged.
    pub fn send(&self, content: &str, session_key: &str) -> bool {
        if self.inner.phase.load() != ConnectionPhase::Ready {
            return false;
        }
        let params = json!({
            "sessionKey": session_key,
            "message": content,
            "deliver": false,
            "idempotencyKey": uuid::Uuid::new_v4().to_string(),
        });
        let (reply_tx, reply_rx) = oneshot::channel();
        let dispatched = {
            let conn = self.inner.conn.lock().expect("conn slot poisoned");
            match conn.as_ref() {
                Some(conn) => conn
                    .cmd_tx
                    .send(Command::Request {
                        method: methods::CHAT_SEND.to_string(),
                        params,
                        reply: reply_tx,
                    })
                    .is_ok(),
                None => false,
            }
        };
        if !dispatched {
            return false;
        }
        tokio::spawn(async move {
            if let Ok(Err(e)) = reply_rx.await {
                warn!("chat.send failed: {e}");
            }
        });
        true
    }

    /// Load chat history. Any failure yields an empty list; callers treat
    /// that as "no history available", never as a hard error.
    pub async fn load_history(&self, session_key: &str, limit: u32) -> Vec<ChatMessage> {
        let params = json!({ "sessionKey": session_key, "limit": limit });
        match self.request(methods::CHAT_HISTORY, params).await {
            Ok(payload) => payload
                .get("messages")
                .and_then(Value::as_array)
                .map(|messages| messages.iter().map(chat::history_message).collect())
                .unwrap_or_default(),
            Err(e) => {
                warn!("failed to load history: {e}");
                Vec::new()
            }
        }
    }

    /// Issue a correlated request and await its response.
    async fn request(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        let cmd_tx = {
            let conn = self.inner.conn.lock().expect("conn slot poisoned");
            conn.as_ref()
                .ok_or(ClientError::NotConnected)?
                .cmd_tx
                .clone()
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        cmd_tx
            .send(Command::Request {
                method: method.to_string(),
                params,
                reply: reply_tx,
            })
            .map_err(|_| ClientError::NotConnected)?;
        reply_rx.await.map_err(|_| ClientError::NotConnected)?
    }

    /// Arm a reconnect after an unexpected closure, backing off exponentially.
    fn schedule_reconnect(&self) {
        let inner = &self.inner;
        let completed = inner.reconnect_attempts.load(Ordering::SeqCst);
        if !inner.config.reconnect.should_reconnect(completed) {
            warn!("giving up after {completed} reconnection attempts");
            inner.notify_state(ConnectionState::failed(
                ClientError::MaxReconnectAttempts.to_string(),
            ));
            return;
        }

        let attempt = inner.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = inner.config.reconnect.delay_for_attempt(attempt);
        info!(
            "reconnecting in {delay:?} (attempt {attempt}/{})",
            inner.config.reconnect.max_attempts
        );

        let token = {
            let slot = inner.reconnect_token.lock().expect("reconnect token poisoned");
            slot.clone()
        };
        let client = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    if let Err(e) = client.connect().await {
                        debug!("reconnect attempt failed: {e}");
                    }
                }
            }
        });
    }
}

// ── Connection task ──

enum Shutdown {
    Closed { code: u16, reason: String },
    TransportError(String),
}

/// Owns one open transport. The sole mutator of the pending map and the only
/// frame processor, so handlers run to completion in transport order.
struct ConnectionTask {
    client: GatewayClient,
    generation: u64,
    sink: Box<dyn FrameSink>,
    pending: HashMap<String, oneshot::Sender<Result<Value, ClientError>>>,
    handshake_sent: bool,
    handshake_id: Option<String>,
    handshake_reply: Option<oneshot::Sender<Result<(), ClientError>>>,
}

impl ConnectionTask {
    async fn run(
        mut self,
        mut stream: Box<dyn FrameStream>,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    ) {
        let timer = tokio::time::sleep(self.client.inner.config.handshake_delay);
        tokio::pin!(timer);

        let shutdown = loop {
            tokio::select! {
                // Some gateway builds never challenge; handshake after the
                // settling delay in that case.
                () = &mut timer, if !self.handshake_sent => {
                    debug!("no challenge received, sending handshake");
                    if let Err(e) = self.send_handshake().await {
                        break Shutdown::TransportError(e.to_string());
                    }
                }
                cmd = cmd_rx.recv() => match cmd {
                    Some(Command::Request { method, params, reply }) => {
                        let (id, frame) = Frame::request(method, params);
                        let text = match serde_json::to_string(&frame) {
                            Ok(text) => text,
                            Err(e) => {
                                let _ = reply.send(Err(ClientError::Transport(e.to_string())));
                                continue;
                            }
                        };
                        self.pending.insert(id, reply);
                        if let Err(e) = self.sink.send(text).await {
                            break Shutdown::TransportError(e.to_string());
                        }
                    }
                    Some(Command::Close { code, reason }) => {
                        let _ = self.sink.close(code, &reason).await;
                        break Shutdown::Closed { code, reason };
                    }
                    None => {
                        let _ = self.sink.close(CLOSE_NORMAL, "client dropped").await;
                        break Shutdown::Closed {
                            code: CLOSE_NORMAL,
                            reason: "client dropped".to_string(),
                        };
                    }
                },
                frame = stream.next() => match frame {
                    Some(TransportFrame::Text(text)) => {
                        if let Err(e) = self.handle_frame(&text).await {
                            break Shutdown::TransportError(e.to_string());
                        }
                    }
                    Some(TransportFrame::Closed { code, reason }) => {
                        break Shutdown::Closed { code, reason };
                    }
                    Some(TransportFrame::Error(e)) => break Shutdown::TransportError(e),
                    None => break Shutdown::Closed {
                        code: 1006,
                        reason: "connection closed".to_string(),
                    },
                },
            }
        };

        self.finish(shutdown);
    }

    /// Send the connect handshake. Guarded so that the challenge path and the
    /// timer path together produce exactly one send per attempt.
    async fn send_handshake(&mut self) -> Result<(), ClientError> {
        if self.handshake_sent {
            return Ok(());
        }
        self.handshake_sent = true;

        let params = ConnectParams::webchat(self.client.inner.config.auth_token.as_deref());
        let params =
            serde_json::to_value(params).map_err(|e| ClientError::Transport(e.to_string()))?;
        let (id, frame) = Frame::request(methods::CONNECT, params);
        let text =
            serde_json::to_string(&frame).map_err(|e| ClientError::Transport(e.to_string()))?;

        self.handshake_id = Some(id);
        self.client.inner.phase.store(ConnectionPhase::HandshakeSent);
        self.sink.send(text).await
    }

    async fn handle_frame(&mut self, raw: &str) -> Result<(), ClientError> {
        // Malformed frames must never crash the client or desync correlation.
        let frame: Frame = match serde_json::from_str(raw) {
            Ok(frame) => frame,
            Err(_) => {
                debug!("dropping unparseable frame");
                return Ok(());
            }
        };

        match frame {
            Frame::Res {
                id,
                ok,
                payload,
                error,
            } => {
                if self.handshake_id.as_deref() == Some(id.as_str()) {
                    self.handshake_id = None;
                    self.complete_handshake(ok, error.map(|e| e.message));
                } else if let Some(reply) = self.pending.remove(&id) {
                    let result = if ok {
                        Ok(payload)
                    } else {
                        Err(ClientError::RequestFailed(
                            error
                                .map(|e| e.message)
                                .unwrap_or_else(|| "request failed".to_string()),
                        ))
                    };
                    let _ = reply.send(result);
                }
                // Unmatched or duplicate ids are dropped
                Ok(())
            }
            Frame::Event { event, payload } => {
                match event.as_str() {
                    events::CONNECT_CHALLENGE => {
                        match serde_json::from_value::<ChallengePayload>(payload) {
                            Ok(challenge) if !self.handshake_sent => {
                                debug!(nonce = %challenge.nonce, "received connect challenge");
                                self.send_handshake().await?;
                            }
                            // Duplicate challenge, or one without a nonce
                            _ => {}
                        }
                    }
                    events::CHAT => self.handle_chat_event(payload),
                    _ => {}
                }
                Ok(())
            }
            Frame::Req { .. } => Ok(()), // the gateway never sends requests
        }
    }

    fn complete_handshake(&mut self, ok: bool, error: Option<String>) {
        let inner = &self.client.inner;
        if ok {
            info!("gateway handshake complete");
            inner.phase.store(ConnectionPhase::Ready);
            inner.reconnect_attempts.store(0, Ordering::SeqCst);
            inner.notify_state(ConnectionState::connected());
            if let Some(reply) = self.handshake_reply.take() {
                let _ = reply.send(Ok(()));
            }
        } else {
            let message = error.unwrap_or_else(|| "connect failed".to_string());
            warn!("gateway rejected handshake: {message}");
            // The transport is left however the gateway left it; the state
            // notification happens in connect() when the rejection propagates.
            if let Some(reply) = self.handshake_reply.take() {
                let _ = reply.send(Err(ClientError::HandshakeRejected(message)));
            }
        }
    }

    fn handle_chat_event(&self, payload: Value) {
        let Ok(event) = serde_json::from_value::<ChatEventPayload>(payload) else {
            debug!("dropping malformed chat event");
            return;
        };

        let inner = &self.client.inner;
        let text = event
            .message
            .as_ref()
            .map(chat::message_text)
            .unwrap_or_default();

        inner.chat_events.emit(&ChatStreamEvent {
            state: event.state,
            run_id: event.run_id.clone(),
            stream: (!text.is_empty()).then(|| text.clone()),
            error: event.error_message.clone(),
        });

        match event.state {
            // A completed run becomes a full assistant message
            ChatState::Final if !text.is_empty() => {
                let model = event
                    .message
                    .as_ref()
                    .and_then(|m| m.get("model"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let mut message = ChatMessage::new(Role::Assistant, text);
                if let Some(run_id) = event.run_id {
                    message.id = run_id;
                }
                message.model = model;
                inner.messages.emit(&message);
            }
            ChatState::Error => {
                let reason = event
                    .error_message
                    .unwrap_or_else(|| "Unknown error".to_string());
                inner
                    .messages
                    .emit(&ChatMessage::new(Role::System, format!("Error: {reason}")));
            }
            // Deltas and aborts never synthesize a message
            _ => {}
        }
    }

    /// Tear down: reject everything pending, settle the handshake if still
    /// open, and (when this task is still the current connection) publish the
    /// closure and decide on reconnection.
    fn finish(mut self, shutdown: Shutdown) {
        let (code, reason, cause) = match shutdown {
            Shutdown::Closed { code, reason } => {
                let cause = ClientError::Closed {
                    code,
                    reason: reason.clone(),
                };
                (code, reason, cause)
            }
            Shutdown::TransportError(message) => {
                (1006, message.clone(), ClientError::Transport(message))
            }
        };

        debug!("connection closed ({code}): {reason}");

        // No response can arrive after close; leaving these pending would
        // leak callers awaiting forever.
        for (_, reply) in self.pending.drain() {
            let _ = reply.send(Err(cause.clone()));
        }
        if let Some(reply) = self.handshake_reply.take() {
            let _ = reply.send(Err(cause));
        }

        let inner = &self.client.inner;

        // A newer connect() owns the state now; stay quiet.
        if inner.generation.load(Ordering::SeqCst) != self.generation {
            debug!("superseded connection task exiting");
            return;
        }

        {
            let mut conn = inner.conn.lock().expect("conn slot poisoned");
            if conn.as_ref().is_some_and(|c| c.generation == self.generation) {
                *conn = None;
            }
        }
        inner.phase.store(ConnectionPhase::Closed);
        inner.notify_state(ConnectionState::idle());

        if ReconnectConfig::is_unexpected_close(code) {
            self.client.schedule_reconnect();
        }
    }
}
