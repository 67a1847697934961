//! Client-side streaming pipeline for a tiled display wall.
//!
//! A source application hands raw framebuffer images to a [`Stream`];
//! they are cut into tiles, optionally JPEG-compressed on a shared
//! worker pool, and delivered to the wall server over a length-prefixed
//! TCP protocol. User-interaction events flow back over the same
//! connection into a bounded per-stream queue.
//!
//! ```no_run
//! use wallstream_core::{ImageView, PixelFormat, Stream};
//!
//! # async fn demo() -> Result<(), wallstream_core::StreamError> {
//! let mut stream = Stream::open("simulation", "wall-host").await?;
//! let pixels = vec![0u8; 1920 * 1080 * 4];
//! let image = ImageView::new(&pixels, 1920, 1080, PixelFormat::Bgra)?;
//! let ack = stream.send_and_finish(image).await?;
//! ack.await?;
//! stream.close().await;
//! # Ok(())
//! # }
//! ```

mod compress;
mod error;
mod event;
mod header;
mod hints;
mod message;
mod network;
mod segment;
mod segmenter;
mod stream;

/// Protocol version this client requires from the server.
pub const PROTOCOL_VERSION: i32 = 15;

/// Upper bound on a single message payload; headers declaring more are
/// treated as malformed.
pub const MAX_PAYLOAD_SIZE: usize = 256 * 1024 * 1024;

pub use compress::CompressorPool;
pub use error::StreamError;
pub use event::{modifiers, Event, EventKind, EventQueue, EVENT_LENGTH};
pub use header::{MessageHeader, StreamId, HEADER_LENGTH, URI_LENGTH};
pub use hints::{SizeHints, SIZE_HINTS_LENGTH, UNSPECIFIED};
pub use message::MessageType;
pub use network::{
    Connection, FlushPolicy, MessageSink, MessageSource, DEFAULT_PORT,
    DEFAULT_RECEIVE_TIMEOUT,
};
pub use segment::{
    Compression, ImageView, PixelFormat, RowOrder, Segment, Subsampling,
    SEGMENT_PARAMS_LENGTH,
};
pub use segmenter::{Segmenter, DEFAULT_SEGMENT_DIMENSION};
pub use stream::{FrameAck, FrameToken, Stream, StreamConfig};
