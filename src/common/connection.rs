//! # Framed Connection
//!
//! Provides a wrapper around async byte streams with message framing for the
//! satellite protocol.
//!
//! ## Wire Protocol
//!
//! Envelopes are sent with a 4-byte length prefix (big-endian) followed by
//! JSON data:
//! ```text
//! [4 bytes: envelope length] [N bytes: JSON envelope data]
//! ```
//!
//! This length-prefixed protocol allows for:
//! - Variable-length envelopes (debug payloads can be sizable)
//! - Reliable message boundaries over a byte stream
//! - Protection against incomplete reads
//!
//! The wrapper is generic over the stream so the same framing runs over a
//! `TlsStream<TcpStream>` in production and over in-memory duplex pipes in
//! tests.

use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum allowed envelope size (16MB) to prevent memory exhaustion from a
/// misbehaving satellite.
const MAX_ENVELOPE_SIZE: usize = 16 * 1024 * 1024;

/// Stream wrapper with envelope framing support.
///
/// Handles serialization, deserialization, and length-prefixed framing of
/// envelopes over any async byte stream.
pub struct Connection<S> {
    stream: S,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Connection<S> {
    /// Wrap an established stream.
    ///
    /// # Example
    /// ```ignore
    /// let stream = connector.connect(server_name, tcp).await?;
    /// let mut conn = Connection::new(stream);
    /// ```
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Read one envelope from the connection.
    ///
    /// # Returns
    /// - `Ok(Some(T))`: Successfully read and deserialized an envelope
    /// - `Ok(None)`: Connection closed cleanly before an envelope arrived
    /// - `Err`: I/O error, oversized frame, or malformed JSON
    ///
    /// # Protocol
    /// 1. Reads 4-byte length prefix (big-endian u32)
    /// 2. Validates envelope size (max 16MB)
    /// 3. Reads envelope data of specified length
    /// 4. Deserializes JSON into the requested type
    pub async fn recv<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        // First, read the 4-byte length prefix that tells us the envelope size
        let mut length_buf = [0u8; 4];
        if self.stream.read_exact(&mut length_buf).await.is_err() {
            // Peer closed before sending anything
            return Ok(None);
        }

        let length = u32::from_be_bytes(length_buf) as usize;
        if length > MAX_ENVELOPE_SIZE {
            return Err(anyhow!(
                "envelope too large: {} bytes (max: {} bytes)",
                length,
                MAX_ENVELOPE_SIZE
            ));
        }

        // Now read the actual envelope data
        let mut data = vec![0u8; length];
        self.stream.read_exact(&mut data).await?;

        let envelope = serde_json::from_slice(&data)
            .map_err(|e| anyhow!("failed to deserialize envelope: {}", e))?;
        Ok(Some(envelope))
    }

    /// Write one envelope to the connection.
    ///
    /// # Protocol
    /// 1. Serializes the envelope to JSON
    /// 2. Writes the 4-byte length prefix (big-endian u32)
    /// 3. Writes the envelope data
    /// 4. Flushes the stream to ensure delivery
    pub async fn send<T: Serialize>(&mut self, envelope: &T) -> Result<()> {
        let data = serde_json::to_vec(envelope)?;
        let length = data.len() as u32;

        // Send: [4 bytes length][envelope data]
        self.stream.write_all(&length.to_be_bytes()).await?;
        self.stream.write_all(&data).await?;
        self.stream.flush().await?;

        Ok(())
    }
}
