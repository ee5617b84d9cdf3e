//! Channel-backed mock transport for driving the client without a network

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::error::ClientError;
use crate::transport::{Connector, FrameSink, FrameStream, TransportFrame};

/// What the client wrote to the transport.
#[derive(Debug)]
pub(crate) enum Sent {
    Text(String),
    Close { code: u16 },
}

/// Test-side handle for one scripted connection.
pub(crate) struct MockSession {
    pub sent: mpsc::UnboundedReceiver<Sent>,
    pub inject: mpsc::UnboundedSender<TransportFrame>,
}

/// Hands out pre-created sessions, one per `connect()` call, and records when
/// each call happened on the (pausable) tokio clock.
pub(crate) struct MockConnector {
    sessions: Mutex<VecDeque<(mpsc::UnboundedSender<Sent>, mpsc::UnboundedReceiver<TransportFrame>)>>,
    pub connect_count: AtomicU32,
    pub connect_times: Mutex<Vec<tokio::time::Instant>>,
}

impl MockConnector {
    pub fn with_sessions(n: usize) -> (Arc<Self>, Vec<MockSession>) {
        let mut queue = VecDeque::new();
        let mut handles = Vec::new();
        for _ in 0..n {
            let (sent_tx, sent_rx) = mpsc::unbounded_channel();
            let (inject_tx, inject_rx) = mpsc::unbounded_channel();
            queue.push_back((sent_tx, inject_rx));
            handles.push(MockSession {
                sent: sent_rx,
                inject: inject_tx,
            });
        }
        let connector = Arc::new(Self {
            sessions: Mutex::new(queue),
            connect_count: AtomicU32::new(0),
            connect_times: Mutex::new(Vec::new()),
        });
        (connector, handles)
    }
}

#[async_trait]
impl Connector for Arc<MockConnector> {
    async fn connect(
        &self,
        _url: &str,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>), ClientError> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        self.connect_times
            .lock()
            .unwrap()
            .push(tokio::time::Instant::now());
        match self.sessions.lock().unwrap().pop_front() {
            Some((sent_tx, inject_rx)) => Ok((
                Box::new(MockSink { tx: sent_tx }),
                Box::new(MockStream { rx: inject_rx }),
            )),
            None => Err(ClientError::Transport("no mock session available".to_string())),
        }
    }
}

struct MockSink {
    tx: mpsc::UnboundedSender<Sent>,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send(&mut self, text: String) -> Result<(), ClientError> {
        self.tx
            .send(Sent::Text(text))
            .map_err(|_| ClientError::Transport("mock transport gone".to_string()))
    }

    async fn close(&mut self, code: u16, _reason: &str) -> Result<(), ClientError> {
        let _ = self.tx.send(Sent::Close { code });
        Ok(())
    }
}

struct MockStream {
    rx: mpsc::UnboundedReceiver<TransportFrame>,
}

#[async_trait]
impl FrameStream for MockStream {
    async fn next(&mut self) -> Option<TransportFrame> {
        self.rx.recv().await
    }
}

// ── Frame builders ──

pub(crate) fn res_ok(id: &str, payload: Value) -> TransportFrame {
    TransportFrame::Text(json!({"type": "res", "id": id, "ok": true, "payload": payload}).to_string())
}

pub(crate) fn res_err(id: &str, message: &str) -> TransportFrame {
    TransportFrame::Text(
        json!({"type": "res", "id": id, "ok": false, "error": {"message": message}}).to_string(),
    )
}

pub(crate) fn event(name: &str, payload: Value) -> TransportFrame {
    TransportFrame::Text(json!({"type": "event", "event": name, "payload": payload}).to_string())
}

pub(crate) fn chat_event(payload: Value) -> TransportFrame {
    event("chat", payload)
}

pub(crate) fn challenge() -> TransportFrame {
    event("connect.challenge", json!({"nonce": "test-nonce"}))
}

pub(crate) fn closed(code: u16) -> TransportFrame {
    TransportFrame::Closed {
        code,
        reason: "test close".to_string(),
    }
}

// ── Drivers ──

/// Receive the next text frame the client sent, parsed as JSON.
pub(crate) async fn next_frame(session: &mut MockSession) -> Value {
    loop {
        match session.sent.recv().await.expect("client closed the transport") {
            Sent::Text(text) => return serde_json::from_str(&text).expect("client sent non-JSON"),
            Sent::Close { .. } => continue,
        }
    }
}

/// Wait for the client's handshake request and acknowledge it.
pub(crate) async fn accept_handshake(session: &mut MockSession) -> Value {
    let frame = next_frame(session).await;
    assert_eq!(frame["type"], "req");
    assert_eq!(frame["method"], "connect");
    let id = frame["id"].as_str().expect("handshake without id").to_string();
    session
        .inject
        .send(res_ok(&id, json!({"protocol": 3})))
        .expect("client stream gone");
    frame
}
