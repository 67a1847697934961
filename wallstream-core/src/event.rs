//! User-interaction events delivered by the wall server.
//!
//! ## Wire format (72 bytes, little-endian)
//!
//! ```text
//! kind:       u32       (4)
//! x:          f64       (8)   normalized [0, 1]
//! y:          f64       (8)   normalized [0, 1]
//! dx:         f64       (8)   wheel / swipe delta
//! dy:         f64       (8)
//! modifiers:  u32       (4)   modifier-key bitfield
//! text:       [u8; 32]  (32)  NUL-padded UTF-8 key text
//! ```

use std::collections::VecDeque;

use crate::error::StreamError;

/// Encoded event size on the wire.
pub const EVENT_LENGTH: usize = 4 + 4 * 8 + 4 + TEXT_LENGTH;

/// Length of the NUL-padded key-text field.
pub const TEXT_LENGTH: usize = 32;

// ── EventKind ────────────────────────────────────────────────────

/// Kind of user-interaction event.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The window showing this stream was closed on the wall.
    Close = 0,
    Press = 1,
    Release = 2,
    DoubleClick = 3,
    Move = 4,
    Click = 5,
    Wheel = 6,
    SwipeLeft = 7,
    SwipeRight = 8,
    SwipeUp = 9,
    SwipeDown = 10,
    KeyPress = 11,
    KeyRelease = 12,
    /// The stream's window was resized on the wall.
    ViewSizeChanged = 13,
}

impl TryFrom<u32> for EventKind {
    type Error = StreamError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(EventKind::Close),
            1 => Ok(EventKind::Press),
            2 => Ok(EventKind::Release),
            3 => Ok(EventKind::DoubleClick),
            4 => Ok(EventKind::Move),
            5 => Ok(EventKind::Click),
            6 => Ok(EventKind::Wheel),
            7 => Ok(EventKind::SwipeLeft),
            8 => Ok(EventKind::SwipeRight),
            9 => Ok(EventKind::SwipeUp),
            10 => Ok(EventKind::SwipeDown),
            11 => Ok(EventKind::KeyPress),
            12 => Ok(EventKind::KeyRelease),
            13 => Ok(EventKind::ViewSizeChanged),
            _ => Err(StreamError::MalformedPayload(format!(
                "unknown event kind {value}"
            ))),
        }
    }
}

/// Modifier-key flags carried in [`Event::modifiers`].
pub mod modifiers {
    pub const NONE: u32 = 0x00;
    pub const SHIFT: u32 = 0x01;
    pub const CTRL: u32 = 0x02;
    pub const ALT: u32 = 0x04;
    pub const META: u32 = 0x08;
}

// ── Event ────────────────────────────────────────────────────────

/// A typed user-interaction event.
///
/// Coordinates are normalized to `[0, 1]` relative to the stream's
/// window on the wall; `dx`/`dy` carry wheel and swipe deltas.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub x: f64,
    pub y: f64,
    pub dx: f64,
    pub dy: f64,
    pub modifiers: u32,
    /// Key text for keyboard events, at most 31 bytes of UTF-8.
    pub key_text: String,
}

impl Event {
    /// An event of `kind` at the given normalized position.
    pub fn at(kind: EventKind, x: f64, y: f64) -> Self {
        Self {
            kind,
            x,
            y,
            dx: 0.0,
            dy: 0.0,
            modifiers: modifiers::NONE,
            key_text: String::new(),
        }
    }

    /// Serialize to wire bytes.
    pub fn encode(&self) -> [u8; EVENT_LENGTH] {
        let mut buf = [0u8; EVENT_LENGTH];
        buf[0..4].copy_from_slice(&(self.kind as u32).to_le_bytes());
        buf[4..12].copy_from_slice(&self.x.to_le_bytes());
        buf[12..20].copy_from_slice(&self.y.to_le_bytes());
        buf[20..28].copy_from_slice(&self.dx.to_le_bytes());
        buf[28..36].copy_from_slice(&self.dy.to_le_bytes());
        buf[36..40].copy_from_slice(&self.modifiers.to_le_bytes());
        let text = self.key_text.as_bytes();
        let mut len = text.len().min(TEXT_LENGTH - 1);
        // Truncate on a character boundary so the field stays UTF-8.
        while len > 0 && !self.key_text.is_char_boundary(len) {
            len -= 1;
        }
        buf[40..40 + len].copy_from_slice(&text[..len]);
        buf
    }

    /// Deserialize from wire bytes.
    ///
    /// The payload must be exactly [`EVENT_LENGTH`] bytes.
    pub fn decode(data: &[u8]) -> Result<Self, StreamError> {
        if data.len() != EVENT_LENGTH {
            return Err(StreamError::MalformedPayload(format!(
                "event payload is {} bytes, expected {}",
                data.len(),
                EVENT_LENGTH
            )));
        }
        let kind = EventKind::try_from(u32::from_le_bytes([
            data[0], data[1], data[2], data[3],
        ]))?;
        let read_f64 = |off: usize| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&data[off..off + 8]);
            f64::from_le_bytes(b)
        };
        let text_field = &data[40..40 + TEXT_LENGTH];
        let end = text_field
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(TEXT_LENGTH);
        let key_text = std::str::from_utf8(&text_field[..end])
            .map_err(|_| {
                StreamError::MalformedPayload("event key text is not UTF-8".into())
            })?
            .to_owned();
        Ok(Self {
            kind,
            x: read_f64(4),
            y: read_f64(12),
            dx: read_f64(20),
            dy: read_f64(28),
            modifiers: u32::from_le_bytes([data[36], data[37], data[38], data[39]]),
            key_text,
        })
    }
}

// ── EventQueue ───────────────────────────────────────────────────

/// Bounded FIFO of events with an oldest-drop overflow policy.
///
/// The receive worker pushes, the application pops. When the queue is
/// full the oldest event is discarded and the overflow counter
/// incremented; the counter is surfaced through
/// `Stream::overflowed_event_count`.
#[derive(Debug)]
pub struct EventQueue {
    queue: VecDeque<Event>,
    capacity: usize,
    overflowed: u64,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity.min(64)),
            capacity,
            overflowed: 0,
        }
    }

    /// Append an event, dropping the oldest entry when full.
    pub fn push(&mut self, event: Event) {
        if self.queue.len() == self.capacity {
            self.queue.pop_front();
            self.overflowed += 1;
        }
        self.queue.push_back(event);
    }

    /// Pop the oldest queued event.
    pub fn pop(&mut self) -> Option<Event> {
        self.queue.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Total events dropped due to overflow since construction.
    pub fn overflowed(&self) -> u64 {
        self.overflowed
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_roundtrip() {
        let event = Event {
            kind: EventKind::Wheel,
            x: 0.5,
            y: 0.25,
            dx: -120.0,
            dy: 0.0,
            modifiers: modifiers::SHIFT | modifiers::CTRL,
            key_text: String::new(),
        };
        let bytes = event.encode();
        let decoded = Event::decode(&bytes).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn key_event_roundtrip() {
        let event = Event {
            kind: EventKind::KeyPress,
            x: 0.0,
            y: 0.0,
            dx: 0.0,
            dy: 0.0,
            modifiers: modifiers::ALT,
            key_text: "a".into(),
        };
        let decoded = Event::decode(&event.encode()).unwrap();
        assert_eq!(decoded.key_text, "a");
        assert_eq!(decoded.modifiers, modifiers::ALT);
    }

    #[test]
    fn key_text_is_truncated_to_field() {
        let event = Event {
            kind: EventKind::KeyPress,
            x: 0.0,
            y: 0.0,
            dx: 0.0,
            dy: 0.0,
            modifiers: modifiers::NONE,
            key_text: "x".repeat(100),
        };
        let decoded = Event::decode(&event.encode()).unwrap();
        assert_eq!(decoded.key_text.len(), TEXT_LENGTH - 1);
    }

    #[test]
    fn wrong_length_is_malformed() {
        assert!(matches!(
            Event::decode(&[0u8; 10]),
            Err(StreamError::MalformedPayload(_))
        ));
    }

    #[test]
    fn unknown_kind_is_malformed() {
        let mut bytes = Event::at(EventKind::Press, 0.0, 0.0).encode();
        bytes[0..4].copy_from_slice(&999u32.to_le_bytes());
        assert!(Event::decode(&bytes).is_err());
    }

    #[test]
    fn queue_fifo_and_overflow() {
        let mut q = EventQueue::new(3);
        for i in 0..5 {
            q.push(Event::at(EventKind::Move, i as f64, 0.0));
        }
        assert_eq!(q.len(), 3);
        assert_eq!(q.overflowed(), 2);

        // Oldest two (x = 0, 1) were dropped.
        assert_eq!(q.pop().unwrap().x, 2.0);
        assert_eq!(q.pop().unwrap().x, 3.0);
        assert_eq!(q.pop().unwrap().x, 4.0);
        assert!(q.pop().is_none());
    }
}
