//! Property tests for the wire codecs and the segmenter's coverage
//! guarantee.

use proptest::prelude::*;

use wallstream_core::{
    Event, EventKind, ImageView, MessageHeader, MessageType, PixelFormat,
    Segmenter, StreamId, HEADER_LENGTH,
};

fn arb_message_type() -> impl Strategy<Value = MessageType> {
    prop_oneof![
        Just(MessageType::Quit),
        Just(MessageType::PixelStreamOpen),
        Just(MessageType::PixelStreamFinishFrame),
        Just(MessageType::PixelStream),
        Just(MessageType::PixelStreamClose),
        Just(MessageType::ObserverOpen),
        Just(MessageType::FrameAck),
        Just(MessageType::BindEvents),
        Just(MessageType::BindEventsReply),
        Just(MessageType::Event),
        Just(MessageType::SizeHints),
    ]
}

fn arb_event_kind() -> impl Strategy<Value = EventKind> {
    prop_oneof![
        Just(EventKind::Close),
        Just(EventKind::Press),
        Just(EventKind::Release),
        Just(EventKind::DoubleClick),
        Just(EventKind::Move),
        Just(EventKind::Click),
        Just(EventKind::Wheel),
        Just(EventKind::SwipeLeft),
        Just(EventKind::SwipeRight),
        Just(EventKind::SwipeUp),
        Just(EventKind::SwipeDown),
        Just(EventKind::KeyPress),
        Just(EventKind::KeyRelease),
        Just(EventKind::ViewSizeChanged),
    ]
}

proptest! {
    #[test]
    fn header_roundtrip(
        size in any::<u32>(),
        kind in arb_message_type(),
        id in "[a-zA-Z0-9._-]{1,63}",
    ) {
        let id = StreamId::new(id).unwrap();
        let header = MessageHeader::new(kind, &id, size);
        let encoded = header.encode();
        prop_assert_eq!(encoded.len(), HEADER_LENGTH);

        let decoded = MessageHeader::decode(&encoded).unwrap();
        prop_assert_eq!(decoded.size(), size);
        prop_assert_eq!(decoded.message_type().unwrap(), kind);
        prop_assert_eq!(decoded.uri(), id.as_str());
        prop_assert_eq!(decoded, header);
    }

    #[test]
    fn event_roundtrip(
        kind in arb_event_kind(),
        x in 0.0f64..=1.0,
        y in 0.0f64..=1.0,
        dx in -1e6f64..=1e6,
        dy in -1e6f64..=1e6,
        modifiers in any::<u32>(),
        text in "[ -~]{0,31}",
    ) {
        let event = Event {
            kind,
            x,
            y,
            dx,
            dy,
            modifiers,
            key_text: text,
        };
        let decoded = Event::decode(&event.encode()).unwrap();
        prop_assert_eq!(decoded, event);
    }

    /// The tiles of any source must be disjoint, cover it exactly, and
    /// arrive in row-major order with the declared raw byte size.
    #[test]
    fn segmenter_coverage(
        width in 1u32..200,
        height in 1u32..200,
        seg_w in 1u32..64,
        seg_h in 1u32..64,
    ) {
        let pixels = vec![0u8; (width * height * 4) as usize];
        let image = ImageView::new(&pixels, width, height, PixelFormat::Rgba).unwrap();
        let segments = Segmenter::new(seg_w, seg_h).segments(&image).unwrap();

        let mut covered = vec![false; (width * height) as usize];
        let mut previous: Option<(u32, u32)> = None;
        for segment in &segments {
            // Row-major: (y, x) keys strictly increase.
            let key = (segment.y, segment.x);
            if let Some(prev) = previous {
                prop_assert!(key > prev);
            }
            previous = Some(key);

            prop_assert_eq!(
                segment.data.len(),
                (segment.width * segment.height * 4) as usize
            );
            for py in segment.y..segment.y + segment.height {
                for px in segment.x..segment.x + segment.width {
                    let idx = (py * width + px) as usize;
                    prop_assert!(!covered[idx]);
                    covered[idx] = true;
                }
            }
        }
        prop_assert!(covered.into_iter().all(|c| c));
    }
}
