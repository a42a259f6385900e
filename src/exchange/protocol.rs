//! Exchange wire protocol
//!
//! Participants talk over TCP using MessagePack (rmp-serde) encoded
//! [`Message`] values. Each frame is prefixed with a 4-byte length field
//! (little-endian u32):
//!
//! ```text
//! [4 bytes: message length][N bytes: MessagePack message]
//! ```
//!
//! # Message Flow
//!
//! ```text
//! Coordinator (rank 0)              Worker (rank i)
//!     |                                  |
//!     |<------- HELLO(rank, size) -------|
//!     |-------- WELCOME ---------------->|
//!     |                                  |
//!     |-------- PAYLOAD(task) ---------->|
//!     |<------- PAYLOAD(result) ---------|
//! ```

use crate::error::TransportError;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol version
///
/// Coordinator and workers must have matching protocol versions.
pub const PROTOCOL_VERSION: u32 = 1;

/// Fixed payload capacity in bytes, terminator slot included
///
/// Payload text may hold at most `PAYLOAD_CAPACITY - 1` bytes.
pub const PAYLOAD_CAPACITY: usize = 100;

/// Largest frame accepted from a peer
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Protocol message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Registration (Worker → Coordinator)
    ///
    /// First frame a worker sends after connecting to the rendezvous address.
    Hello(HelloMessage),

    /// Registration accepted (Coordinator → Worker)
    Welcome(WelcomeMessage),

    /// Application data, in either direction
    Payload(PayloadMessage),

    /// Registration rejected or peer failure
    Error(ErrorMessage),
}

/// Hello message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelloMessage {
    /// Protocol version
    pub protocol_version: u32,

    /// Ordinal the worker was launched with
    pub rank: usize,

    /// Group size the worker was launched with (must match the coordinator)
    pub size: usize,

    /// Host the worker runs on
    pub processor_name: String,
}

/// Welcome message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WelcomeMessage {
    /// Protocol version
    pub protocol_version: u32,
}

/// Payload message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadMessage {
    /// Sender ordinal
    pub source: usize,

    /// Text, at most `PAYLOAD_CAPACITY - 1` bytes
    pub text: String,
}

/// Error message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub message: String,
}

/// Check that `text` fits a payload of `capacity` bytes (terminator included)
pub fn check_capacity(text: &str, capacity: usize) -> Result<(), TransportError> {
    if text.len() >= capacity {
        return Err(TransportError::PayloadTooLarge {
            len: text.len(),
            capacity,
        });
    }
    Ok(())
}

/// Bound `text` by a receive buffer of `max_len` bytes (terminator included)
///
/// Cuts on a character boundary, so the result may be shorter than
/// `max_len - 1` bytes when the cut would split a multi-byte character.
pub fn truncate_to(mut text: String, max_len: usize) -> String {
    let limit = max_len.saturating_sub(1);
    if text.len() > limit {
        let mut cut = limit;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}

/// Serialize a message to bytes
///
/// Prepends a 4-byte length field for framing.
pub fn serialize_message(msg: &Message) -> Result<Vec<u8>, TransportError> {
    let msg_bytes = rmp_serde::to_vec(msg)?;

    let msg_len = msg_bytes.len() as u32;
    let mut framed = Vec::with_capacity(4 + msg_bytes.len());
    framed.extend_from_slice(&msg_len.to_le_bytes());
    framed.extend_from_slice(&msg_bytes);

    Ok(framed)
}

/// Read a complete message from a stream
pub async fn read_message<R>(stream: &mut R) -> Result<Message, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;

    let msg_len = u32::from_le_bytes(len_buf) as usize;
    if msg_len > MAX_FRAME_LEN {
        return Err(TransportError::Protocol(format!(
            "Message too large: {} bytes (max {})",
            msg_len, MAX_FRAME_LEN
        )));
    }

    let mut msg_buf = vec![0u8; msg_len];
    stream.read_exact(&mut msg_buf).await?;

    Ok(rmp_serde::from_slice(&msg_buf)?)
}

/// Write a message to a stream and flush it
pub async fn write_message<W>(stream: &mut W, msg: &Message) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let framed = serialize_message(msg)?;
    stream.write_all(&framed).await?;
    stream.flush().await?;
    Ok(())
}
