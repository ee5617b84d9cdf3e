//! tether-protocol — wire types for the agent gateway WebSocket protocol
//!
//! The gateway speaks JSON text frames over a persistent WebSocket: correlated
//! `req`/`res` pairs plus out-of-band `event` frames (connect challenges and
//! streaming chat deltas). This crate holds the frame shapes, the protocol v3
//! handshake parameters, and the chat message types shared by clients.

pub mod chat;
pub mod frames;
pub mod handshake;

pub use chat::{ChatEventPayload, ChatMessage, ChatState, ChatStreamEvent, Role};
pub use frames::{Frame, ResError};
pub use handshake::{AuthParams, ChallengePayload, ClientInfo, ConnectParams, PROTOCOL_VERSION};
