//! Protocol message taxonomy.
//!
//! Uses proper enums with `TryFrom` — no panics on unknown values.
//! Byte codes are stable within [`PROTOCOL_VERSION`](crate::PROTOCOL_VERSION).

use std::fmt;

use crate::error::StreamError;

// ── MessageType ──────────────────────────────────────────────────

/// All message types understood by the wall-stream protocol.
///
/// Organized by direction:
/// - client → server: stream announcement, pixel data, event binding
/// - server → client: frame acknowledgement, events, bind replies
/// - either: QUIT
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Graceful disconnect (either direction). Empty payload.
    Quit = 0,
    /// Announce a new pixel source for the header's URI. Empty payload.
    PixelStreamOpen = 1,
    /// Terminal control message closing the current frame. Empty payload.
    PixelStreamFinishFrame = 2,
    /// One image segment: parameter block followed by pixel bytes.
    PixelStream = 3,
    /// The source stops sending pixels for this URI. Empty payload.
    PixelStreamClose = 4,
    /// Announce an event-only observer for the header's URI. Empty payload.
    ObserverOpen = 5,
    /// Server acknowledges a finished frame. Empty payload.
    FrameAck = 6,
    /// Request user-event delivery. Payload: `u8 exclusive`.
    BindEvents = 7,
    /// Reply to [`BindEvents`](Self::BindEvents). Payload: `u8 success`.
    BindEventsReply = 8,
    /// A serialized user-interaction event.
    Event = 9,
    /// Preferred/minimum/maximum stream dimensions record.
    SizeHints = 10,
}

impl TryFrom<u8> for MessageType {
    type Error = StreamError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageType::Quit),
            1 => Ok(MessageType::PixelStreamOpen),
            2 => Ok(MessageType::PixelStreamFinishFrame),
            3 => Ok(MessageType::PixelStream),
            4 => Ok(MessageType::PixelStreamClose),
            5 => Ok(MessageType::ObserverOpen),
            6 => Ok(MessageType::FrameAck),
            7 => Ok(MessageType::BindEvents),
            8 => Ok(MessageType::BindEventsReply),
            9 => Ok(MessageType::Event),
            10 => Ok(MessageType::SizeHints),
            _ => Err(StreamError::UnknownMessageType { value }),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_roundtrip() {
        let all = [
            MessageType::Quit,
            MessageType::PixelStreamOpen,
            MessageType::PixelStreamFinishFrame,
            MessageType::PixelStream,
            MessageType::PixelStreamClose,
            MessageType::ObserverOpen,
            MessageType::FrameAck,
            MessageType::BindEvents,
            MessageType::BindEventsReply,
            MessageType::Event,
            MessageType::SizeHints,
        ];
        for ty in all {
            assert_eq!(MessageType::try_from(ty as u8).unwrap(), ty);
        }
    }

    #[test]
    fn message_type_invalid() {
        let err = MessageType::try_from(0xFF).unwrap_err();
        assert!(matches!(
            err,
            StreamError::UnknownMessageType { value: 0xFF }
        ));
    }
}
