//! Transport-neutral frame type.
//!
//! The session loop speaks [`Frame`] so it can run over an axum socket in
//! production and over in-memory channels in tests.

use axum::extract::ws::Message;

/// One `WebSocket` frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text payload.
    Text(String),
    /// Binary payload.
    Binary(Vec<u8>),
    /// Ping with optional payload.
    Ping(Vec<u8>),
    /// Pong with optional payload.
    Pong(Vec<u8>),
    /// Close handshake.
    Close,
}

impl From<Message> for Frame {
    fn from(msg: Message) -> Self {
        match msg {
            Message::Text(t) => Self::Text(t.as_str().to_owned()),
            Message::Binary(b) => Self::Binary(b.to_vec()),
            Message::Ping(b) => Self::Ping(b.to_vec()),
            Message::Pong(b) => Self::Pong(b.to_vec()),
            Message::Close(_) => Self::Close,
        }
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(t) => Self::Text(t.into()),
            Frame::Binary(b) => Self::Binary(b.into()),
            Frame::Ping(b) => Self::Ping(b.into()),
            Frame::Pong(b) => Self::Pong(b.into()),
            Frame::Close => Self::Close(None),
        }
    }
}
