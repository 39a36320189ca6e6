//! Message Codec
//!
//! The session loop only depends on the `MessageCodec` trait. `BincodeCodec`
//! is the default framing:
//!
//! ```text
//! ┌──────────┬───────────────┬──────────────────────┐
//! │ magic(4) │ length(4, BE) │ bincode payload      │
//! └──────────┴───────────────┴──────────────────────┘
//! ```

use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::types::Message;

/// Maximum accepted payload size (2 MB)
pub const MAX_MESSAGE_SIZE: usize = 2 * 1024 * 1024;

/// Magic bytes prefixed to every frame
pub const PROTOCOL_MAGIC: [u8; 4] = [0xf9, 0xbe, 0xb4, 0xd9];

/// Error type for codec operations
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Unexpected magic bytes: {0:02x?}")]
    BadMagic([u8; 4]),

    #[error("I/O error while decoding: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Deserialization failed: {0}")]
    Deserialization(String),
}

/// Reader handed to the codec by the session loop
pub type MessageReader<'a> = dyn AsyncRead + Unpin + Send + 'a;

/// Encodes and decodes session messages
#[async_trait]
pub trait MessageCodec: Send + Sync {
    /// Encode a message into one complete frame
    fn encode(&self, message: &Message) -> Result<Vec<u8>, CodecError>;

    /// Read exactly one message from the stream
    async fn decode(&self, reader: &mut MessageReader<'_>) -> Result<Message, CodecError>;

    /// Message enqueued automatically when a session connects
    fn handshake(&self, remote: SocketAddr) -> Message {
        Message::version(remote, 0)
    }
}

/// Length-prefixed bincode framing
#[derive(Debug, Clone)]
pub struct BincodeCodec {
    magic: [u8; 4],
    max_size: usize,
}

impl BincodeCodec {
    pub fn new() -> Self {
        Self {
            magic: PROTOCOL_MAGIC,
            max_size: MAX_MESSAGE_SIZE,
        }
    }

    pub fn with_magic(mut self, magic: [u8; 4]) -> Self {
        self.magic = magic;
        self
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }
}

impl Default for BincodeCodec {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageCodec for BincodeCodec {
    fn encode(&self, message: &Message) -> Result<Vec<u8>, CodecError> {
        let payload = bincode::serialize(message)
            .map_err(|e| CodecError::Serialization(e.to_string()))?;

        if payload.len() > self.max_size {
            return Err(CodecError::MessageTooLarge {
                size: payload.len(),
                max: self.max_size,
            });
        }

        let mut frame = Vec::with_capacity(8 + payload.len());
        frame.extend_from_slice(&self.magic);
        frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    async fn decode(&self, reader: &mut MessageReader<'_>) -> Result<Message, CodecError> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).await?;
        if magic != self.magic {
            return Err(CodecError::BadMagic(magic));
        }

        let mut len_buf = [0u8; 4];
        reader.read_exact(&mut len_buf).await?;
        let len = u32::from_be_bytes(len_buf) as usize;

        // Check size before allocating
        if len > self.max_size {
            return Err(CodecError::MessageTooLarge {
                size: len,
                max: self.max_size,
            });
        }

        let mut payload = vec![0u8; len];
        reader.read_exact(&mut payload).await?;

        bincode::deserialize(&payload).map_err(|e| CodecError::Deserialization(e.to_string()))
    }
}
