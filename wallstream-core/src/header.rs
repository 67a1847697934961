//! Fixed-size message header framing every protocol message.
//!
//! ## Wire format (69 bytes, little-endian)
//!
//! ```text
//! size:  u32       (4)   payload length in bytes
//! type:  u8        (1)   message type byte
//! uri:   [u8; 64]  (64)  NUL-padded stream identifier
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::StreamError;
use crate::message::MessageType;

/// Length of the NUL-padded URI field.
pub const URI_LENGTH: usize = 64;

/// Encoded header size on the wire.
pub const HEADER_LENGTH: usize = 4 + 1 + URI_LENGTH;

pub type MessageHeaderBytes = [u8; HEADER_LENGTH];

// ── MessageHeader ────────────────────────────────────────────────

/// The fixed on-wire record preceding every message payload.
///
/// The type byte is kept raw so that a header with an unknown type can
/// still report its payload size — the receive path uses that to skip
/// the payload without desynchronizing the framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    size: u32,
    type_byte: u8,
    uri: [u8; URI_LENGTH],
}

impl MessageHeader {
    /// Build a header for a known message type.
    pub fn new(kind: MessageType, uri: &StreamId, payload_size: u32) -> Self {
        Self {
            size: payload_size,
            type_byte: kind as u8,
            uri: uri.to_wire(),
        }
    }

    /// Payload length in bytes.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Raw type byte, including values this client does not know.
    pub fn type_byte(&self) -> u8 {
        self.type_byte
    }

    /// Resolve the type byte to a known [`MessageType`].
    pub fn message_type(&self) -> Result<MessageType, StreamError> {
        MessageType::try_from(self.type_byte)
    }

    /// The stream identifier, with NUL padding stripped.
    pub fn uri(&self) -> &str {
        let end = self
            .uri
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(URI_LENGTH);
        // encode() only ever stores valid UTF-8 here; a header decoded
        // from the wire may not, in which case we fall back to the
        // longest valid prefix.
        match std::str::from_utf8(&self.uri[..end]) {
            Ok(s) => s,
            Err(e) => {
                let valid = e.valid_up_to();
                std::str::from_utf8(&self.uri[..valid]).unwrap_or("")
            }
        }
    }

    /// Serialize to wire bytes.
    pub fn encode(&self) -> MessageHeaderBytes {
        let mut buf = [0u8; HEADER_LENGTH];
        buf[0..4].copy_from_slice(&self.size.to_le_bytes());
        buf[4] = self.type_byte;
        buf[5..].copy_from_slice(&self.uri);
        buf
    }

    /// Deserialize from wire bytes.
    ///
    /// Fails with [`StreamError::MalformedHeader`] if fewer than
    /// [`HEADER_LENGTH`] bytes are available.
    pub fn decode(data: &[u8]) -> Result<Self, StreamError> {
        if data.len() < HEADER_LENGTH {
            return Err(StreamError::MalformedHeader("header truncated"));
        }
        let mut uri = [0u8; URI_LENGTH];
        uri.copy_from_slice(&data[5..HEADER_LENGTH]);
        Ok(Self {
            size: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            type_byte: data[4],
            uri,
        })
    }
}

// ── StreamId ─────────────────────────────────────────────────────

/// A validated stream identifier: 1..=63 bytes, no NUL bytes.
///
/// Multiple concurrent streams may share a hostname but must carry
/// distinct identifiers so the wall server can tell them apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamId(String);

static STREAM_COUNTER: AtomicU64 = AtomicU64::new(0);

impl StreamId {
    /// Validate an identifier supplied by the caller.
    pub fn new(id: impl Into<String>) -> Result<Self, StreamError> {
        let id = id.into();
        if id.is_empty() {
            return Err(StreamError::InvalidStreamId("must not be empty"));
        }
        if id.len() >= URI_LENGTH {
            return Err(StreamError::InvalidStreamId(
                "must be at most 63 bytes",
            ));
        }
        if id.bytes().any(|b| b == 0) {
            return Err(StreamError::InvalidStreamId(
                "must not contain NUL bytes",
            ));
        }
        Ok(Self(id))
    }

    /// Generate a process-unique identifier.
    pub fn generate() -> Self {
        let n = STREAM_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("{}-{}", std::process::id(), n))
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// NUL-padded wire form for the header's URI field.
    pub fn to_wire(&self) -> [u8; URI_LENGTH] {
        let mut buf = [0u8; URI_LENGTH];
        buf[..self.0.len()].copy_from_slice(self.0.as_bytes());
        buf
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let id = StreamId::new("bench-stream").unwrap();
        let hdr = MessageHeader::new(MessageType::PixelStream, &id, 16384);

        let encoded = hdr.encode();
        assert_eq!(encoded.len(), HEADER_LENGTH);

        let decoded = MessageHeader::decode(&encoded).unwrap();
        assert_eq!(decoded, hdr);
        assert_eq!(decoded.size(), 16384);
        assert_eq!(decoded.message_type().unwrap(), MessageType::PixelStream);
        assert_eq!(decoded.uri(), "bench-stream");
    }

    #[test]
    fn header_truncated() {
        let err = MessageHeader::decode(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, StreamError::MalformedHeader(_)));
    }

    #[test]
    fn header_unknown_type_still_reports_size() {
        let id = StreamId::new("s").unwrap();
        let mut bytes = MessageHeader::new(MessageType::Quit, &id, 77).encode();
        bytes[4] = 0xEE;

        let decoded = MessageHeader::decode(&bytes).unwrap();
        assert_eq!(decoded.size(), 77);
        assert!(matches!(
            decoded.message_type(),
            Err(StreamError::UnknownMessageType { value: 0xEE })
        ));
    }

    #[test]
    fn header_size_is_little_endian() {
        let id = StreamId::new("s").unwrap();
        let bytes = MessageHeader::new(MessageType::Event, &id, 0x0102_0304).encode();
        assert_eq!(&bytes[0..4], &[0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn stream_id_rejects_empty_and_long() {
        assert!(StreamId::new("").is_err());
        assert!(StreamId::new("x".repeat(63)).is_ok());
        assert!(StreamId::new("x".repeat(64)).is_err());
        assert!(StreamId::new("a\0b").is_err());
    }

    #[test]
    fn generated_ids_are_distinct() {
        let a = StreamId::generate();
        let b = StreamId::generate();
        assert_ne!(a, b);
    }
}
