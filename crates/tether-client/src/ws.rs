//! WebSocket transport over tokio-tungstenite

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::ClientError;
use crate::transport::{Connector, FrameSink, FrameStream, TransportFrame};

type WsStreamInner = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects over `ws://` / `wss://` URLs.
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>), ClientError> {
        debug!("dialing gateway at {url}");
        let (ws, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| ClientError::Transport(format!("failed to connect: {e}")))?;
        let (write, read) = ws.split();
        Ok((Box::new(WsSink { write }), Box::new(WsFrames { read })))
    }
}

struct WsSink {
    write: SplitSink<WsStreamInner, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, text: String) -> Result<(), ClientError> {
        self.write
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), ClientError> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };
        self.write
            .send(Message::Close(Some(frame)))
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }
}

struct WsFrames {
    read: SplitStream<WsStreamInner>,
}

#[async_trait]
impl FrameStream for WsFrames {
    async fn next(&mut self) -> Option<TransportFrame> {
        loop {
            return match self.read.next().await {
                Some(Ok(Message::Text(text))) => Some(TransportFrame::Text(text.to_string())),
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.to_string()))
                        .unwrap_or((1005, String::new()));
                    Some(TransportFrame::Closed { code, reason })
                }
                // Binary frames and ping/pong are not part of the protocol
                Some(Ok(_)) => continue,
                Some(Err(e)) => Some(TransportFrame::Error(e.to_string())),
                None => Some(TransportFrame::Closed {
                    code: 1006,
                    reason: "connection closed".to_string(),
                }),
            };
        }
    }
}
