//! Stream lifecycle state machine with validated transitions.
//!
//! ```text
//!  Connecting ──► Handshaking ──► Ready ◄──► SendingFrame
//!       │               │           │              │
//!       ▼               ▼           ▼              ▼
//!     Closed ◄───── Closing ◄───────┴──────────────┘
//! ```

use crate::error::StreamError;

/// The current phase of a stream's lifecycle.
///
/// `SendingFrame` doubles as the "frame open" flag: a frame is open
/// exactly while the stream sits in that phase, which is what enforces
/// the at-most-one-outstanding-frame contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamPhase {
    /// TCP connection initiated but not yet established.
    #[default]
    Connecting,

    /// TCP link is up; awaiting the server's protocol version.
    Handshaking,

    /// Connected, no frame open.
    Ready,

    /// A frame has been opened by `send` and not yet finished.
    SendingFrame,

    /// Graceful shutdown in progress (QUIT queued).
    Closing,

    /// Terminal state. All operations fail with `StreamClosed`.
    Closed,
}

impl std::fmt::Display for StreamPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

impl StreamPhase {
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Whether protocol traffic may still be queued.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Ready | Self::SendingFrame)
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Valid from: `Connecting`.
    pub fn begin_handshake(&mut self) -> Result<(), StreamError> {
        match self {
            Self::Connecting => {
                *self = Self::Handshaking;
                Ok(())
            }
            _ => Err(StreamError::StreamClosed),
        }
    }

    /// Valid from: `Handshaking`.
    pub fn finish_handshake(&mut self) -> Result<(), StreamError> {
        match self {
            Self::Handshaking => {
                *self = Self::Ready;
                Ok(())
            }
            _ => Err(StreamError::StreamClosed),
        }
    }

    /// Open a frame. Valid from: `Ready`.
    pub fn begin_frame(&mut self) -> Result<(), StreamError> {
        match self {
            Self::Ready => {
                *self = Self::SendingFrame;
                Ok(())
            }
            Self::SendingFrame => Err(StreamError::FrameOverlap),
            _ => Err(StreamError::StreamClosed),
        }
    }

    /// Close the open frame. Valid from: `SendingFrame`.
    pub fn finish_frame(&mut self) -> Result<(), StreamError> {
        match self {
            Self::SendingFrame => {
                *self = Self::Ready;
                Ok(())
            }
            Self::Ready => Err(StreamError::NoOpenFrame),
            _ => Err(StreamError::StreamClosed),
        }
    }

    /// Revert an opened frame whose pipeline failed before anything
    /// reached the wire. Valid from: `SendingFrame`.
    pub fn abort_frame(&mut self) {
        if matches!(self, Self::SendingFrame) {
            *self = Self::Ready;
        }
    }

    /// Begin graceful shutdown. Valid from any non-terminal phase.
    pub fn begin_close(&mut self) -> Result<(), StreamError> {
        match self {
            Self::Closed => Err(StreamError::StreamClosed),
            Self::Closing => Ok(()),
            _ => {
                *self = Self::Closing;
                Ok(())
            }
        }
    }

    /// Force the terminal state regardless of the current phase.
    pub fn force_close(&mut self) {
        *self = Self::Closed;
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_lifecycle() {
        let mut phase = StreamPhase::default();
        assert_eq!(phase, StreamPhase::Connecting);

        phase.begin_handshake().unwrap();
        phase.finish_handshake().unwrap();
        assert!(phase.is_open());

        phase.begin_frame().unwrap();
        assert_eq!(phase, StreamPhase::SendingFrame);
        phase.finish_frame().unwrap();
        assert_eq!(phase, StreamPhase::Ready);

        phase.begin_close().unwrap();
        phase.force_close();
        assert!(phase.is_closed());
    }

    #[test]
    fn double_send_is_frame_overlap() {
        let mut phase = StreamPhase::Ready;
        phase.begin_frame().unwrap();
        assert!(matches!(
            phase.begin_frame(),
            Err(StreamError::FrameOverlap)
        ));
    }

    #[test]
    fn finish_without_send_is_rejected() {
        let mut phase = StreamPhase::Ready;
        assert!(matches!(
            phase.finish_frame(),
            Err(StreamError::NoOpenFrame)
        ));
    }

    #[test]
    fn closed_rejects_everything() {
        let mut phase = StreamPhase::Closed;
        assert!(matches!(phase.begin_frame(), Err(StreamError::StreamClosed)));
        assert!(matches!(
            phase.finish_frame(),
            Err(StreamError::StreamClosed)
        ));
        assert!(matches!(phase.begin_close(), Err(StreamError::StreamClosed)));
    }

    #[test]
    fn abort_frame_reverts_to_ready() {
        let mut phase = StreamPhase::SendingFrame;
        phase.abort_frame();
        assert_eq!(phase, StreamPhase::Ready);

        // No-op outside SendingFrame.
        let mut phase = StreamPhase::Closed;
        phase.abort_frame();
        assert!(phase.is_closed());
    }

    #[test]
    fn close_is_idempotent_until_closed() {
        let mut phase = StreamPhase::SendingFrame;
        phase.begin_close().unwrap();
        phase.begin_close().unwrap();
        assert_eq!(phase, StreamPhase::Closing);
    }
}
