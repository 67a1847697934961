//! Domain-specific error types for the wall-stream protocol.
//!
//! All fallible operations return `Result<T, StreamError>`.
//! No panics on invalid input — every error is typed and recoverable.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the wall-stream client.
#[derive(Debug, Error)]
pub enum StreamError {
    // ── Connection Errors ────────────────────────────────────────
    /// The TCP channel to the wall server could not be opened.
    #[error("could not connect to {host}:{port}: {reason}")]
    ConnectFailed {
        host: String,
        port: u16,
        reason: String,
    },

    /// The server did not announce its protocol version in time.
    #[error("server protocol version was not received within {0:?}")]
    HandshakeTimeout(Duration),

    /// The server speaks an older protocol than this client requires.
    #[error("server uses unsupported protocol: {server} < {required}")]
    ProtocolTooOld { server: i32, required: i32 },

    /// The peer closed the channel or the I/O layer reported an error.
    #[error("transport closed")]
    TransportClosed,

    /// A read made no progress within its deadline.
    #[error("read timed out after {0:?} without progress")]
    ReadTimeout(Duration),

    /// A write made no progress within its deadline.
    #[error("write timed out after {0:?} without progress")]
    WriteTimeout(Duration),

    // ── Protocol Errors ──────────────────────────────────────────
    /// A message header could not be parsed.
    #[error("malformed header: {0}")]
    MalformedHeader(&'static str),

    /// A message payload could not be parsed.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The type byte did not map to any known message type.
    ///
    /// Non-fatal: the receive worker skips the payload and resumes.
    #[error("unknown message type: {value:#04x}")]
    UnknownMessageType { value: u8 },

    // ── Pipeline Errors ──────────────────────────────────────────
    /// The JPEG encoder rejected a segment; the whole frame is aborted.
    #[error("compression of segment {segment_index} failed: {reason}")]
    CompressionFailed {
        segment_index: usize,
        reason: String,
    },

    /// `send` was called while the previous frame was still unfinished.
    #[error("previous frame is still open; call finish_frame first")]
    FrameOverlap,

    /// `finish_frame` was called with no frame open.
    #[error("no frame is open; call send first")]
    NoOpenFrame,

    /// Segment generation was aborted by the caller's sink.
    #[error("segment generation aborted by caller")]
    AbortedByCaller,

    /// The supplied image view is inconsistent with its declared geometry.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    // ── Stream Errors ────────────────────────────────────────────
    /// Operation attempted on a stream that has already closed.
    #[error("stream is closed")]
    StreamClosed,

    /// The stream identifier is empty, too long, or contains NUL bytes.
    #[error("invalid stream id: {0}")]
    InvalidStreamId(&'static str),

    /// Frame operations are not available on an observer stream.
    #[error("stream was opened as an observer and cannot send frames")]
    NotASource,

    /// The event queue overflowed and dropped its oldest entries.
    ///
    /// Non-fatal: surfaced through `Stream::overflowed_event_count`.
    #[error("event queue overflowed; {dropped} event(s) dropped")]
    QueueOverflow { dropped: u64 },
}

impl From<std::io::Error> for StreamError {
    fn from(_: std::io::Error) -> Self {
        StreamError::TransportClosed
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for StreamError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        StreamError::TransportClosed
    }
}
