//! Image sources and the tiled segments cut from them.
//!
//! A [`Segment`] is one rectangular tile of a frame, carried in a
//! PIXELSTREAM message as a parameter block followed by the tile's
//! bytes — packed raw pixels or a self-contained JPEG bitstream.
//!
//! ## Segment payload wire format (little-endian)
//!
//! ```text
//! x:          u32  (4)   tile origin in source pixels
//! y:          u32  (4)
//! width:      u32  (4)
//! height:     u32  (4)
//! data_size:  u32  (4)
//! row_order:  u8   (1)
//! compressed: u8   (1)
//! format:     u8   (1)
//! padding:    u8   (1)
//! data:       [u8] (data_size)
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::StreamError;

/// Size of the parameter block preceding the tile bytes.
pub const SEGMENT_PARAMS_LENGTH: usize = 5 * 4 + 4;

// ── PixelFormat ──────────────────────────────────────────────────

/// Pixel layout of raw image data. All formats are 4 bytes per pixel.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgba = 0,
    Bgra = 1,
    Argb = 2,
    Abgr = 3,
}

impl PixelFormat {
    /// Bytes consumed by a single pixel in this format.
    pub const fn bytes_per_pixel(self) -> usize {
        4
    }
}

impl TryFrom<u8> for PixelFormat {
    type Error = StreamError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PixelFormat::Rgba),
            1 => Ok(PixelFormat::Bgra),
            2 => Ok(PixelFormat::Argb),
            3 => Ok(PixelFormat::Abgr),
            _ => Err(StreamError::MalformedPayload(format!(
                "unknown pixel format {value}"
            ))),
        }
    }
}

// ── RowOrder ─────────────────────────────────────────────────────

/// Whether pixel row 0 is at the top or the bottom of the image in
/// memory.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RowOrder {
    #[default]
    TopDown = 0,
    BottomUp = 1,
}

impl TryFrom<u8> for RowOrder {
    type Error = StreamError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RowOrder::TopDown),
            1 => Ok(RowOrder::BottomUp),
            _ => Err(StreamError::MalformedPayload(format!(
                "unknown row order {value}"
            ))),
        }
    }
}

// ── Compression ──────────────────────────────────────────────────

/// JPEG chroma subsampling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Subsampling {
    Yuv444,
    Yuv422,
    #[default]
    Yuv420,
}

/// Per-frame compression policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Send packed raw pixels unchanged.
    Off,
    /// JPEG-encode every segment on the compressor pool.
    On {
        /// Encoder quality, `0..=100`.
        quality: u8,
        subsampling: Subsampling,
    },
}

impl Default for Compression {
    fn default() -> Self {
        Compression::On {
            quality: 75,
            subsampling: Subsampling::default(),
        }
    }
}

// ── ImageView ────────────────────────────────────────────────────

/// A borrowed view of one source framebuffer handed to `Stream::send`.
///
/// The pixel buffer must hold exactly `width * height` packed pixels
/// of the declared format; rows are stored according to `row_order`.
#[derive(Debug, Clone, Copy)]
pub struct ImageView<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
    format: PixelFormat,
    row_order: RowOrder,
    compression: Compression,
}

impl<'a> ImageView<'a> {
    /// Wrap a packed pixel buffer.
    ///
    /// Fails with [`StreamError::InvalidImage`] when the buffer length
    /// does not match `width * height * 4` or a dimension is zero.
    pub fn new(
        data: &'a [u8],
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Self, StreamError> {
        if width == 0 || height == 0 {
            return Err(StreamError::InvalidImage(format!(
                "image dimensions {width}x{height} are empty"
            )));
        }
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if data.len() != expected {
            return Err(StreamError::InvalidImage(format!(
                "buffer holds {} bytes, {width}x{height} {format:?} needs {expected}",
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            height,
            format,
            row_order: RowOrder::TopDown,
            compression: Compression::default(),
        })
    }

    /// Set the in-memory row order (default top-down).
    pub fn with_row_order(mut self, row_order: RowOrder) -> Self {
        self.row_order = row_order;
        self
    }

    /// Set the compression policy (default JPEG at quality 75, 4:2:0).
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn row_order(&self) -> RowOrder {
        self.row_order
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }
}

// ── Segment ──────────────────────────────────────────────────────

/// One rectangular tile of a frame.
///
/// Invariant: `data.len() == width * height * 4` when `!compressed`;
/// otherwise `data` is a self-contained JPEG bitstream.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub row_order: RowOrder,
    pub format: PixelFormat,
    pub compressed: bool,
    pub data: Bytes,
}

impl Segment {
    /// Serialize the parameter block followed by the tile bytes.
    pub fn to_payload(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(SEGMENT_PARAMS_LENGTH + self.data.len());
        buf.put_u32_le(self.x);
        buf.put_u32_le(self.y);
        buf.put_u32_le(self.width);
        buf.put_u32_le(self.height);
        buf.put_u32_le(self.data.len() as u32);
        buf.put_u8(self.row_order as u8);
        buf.put_u8(self.compressed as u8);
        buf.put_u8(self.format as u8);
        buf.put_u8(0); // padding
        buf.extend_from_slice(&self.data);
        buf.freeze()
    }

    /// Deserialize a PIXELSTREAM payload.
    pub fn from_payload(data: &[u8]) -> Result<Self, StreamError> {
        if data.len() < SEGMENT_PARAMS_LENGTH {
            return Err(StreamError::MalformedPayload(format!(
                "segment payload is {} bytes, parameter block needs {}",
                data.len(),
                SEGMENT_PARAMS_LENGTH
            )));
        }
        let field = |i: usize| {
            u32::from_le_bytes([
                data[i * 4],
                data[i * 4 + 1],
                data[i * 4 + 2],
                data[i * 4 + 3],
            ])
        };
        let (x, y, width, height, data_size) =
            (field(0), field(1), field(2), field(3), field(4));
        let row_order = RowOrder::try_from(data[20])?;
        let compressed = match data[21] {
            0 => false,
            1 => true,
            v => {
                return Err(StreamError::MalformedPayload(format!(
                    "compressed flag must be 0 or 1, got {v}"
                )))
            }
        };
        let format = PixelFormat::try_from(data[22])?;

        let body = &data[SEGMENT_PARAMS_LENGTH..];
        if body.len() != data_size as usize {
            return Err(StreamError::MalformedPayload(format!(
                "segment declares {data_size} data bytes but carries {}",
                body.len()
            )));
        }
        if !compressed {
            let expected = width as usize * height as usize * format.bytes_per_pixel();
            if body.len() != expected {
                return Err(StreamError::MalformedPayload(format!(
                    "raw {width}x{height} segment needs {expected} bytes, got {}",
                    body.len()
                )));
            }
        }
        Ok(Self {
            x,
            y,
            width,
            height,
            row_order,
            format,
            compressed,
            data: Bytes::copy_from_slice(body),
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_segment(w: u32, h: u32) -> Segment {
        Segment {
            x: 512,
            y: 0,
            width: w,
            height: h,
            row_order: RowOrder::TopDown,
            format: PixelFormat::Bgra,
            compressed: false,
            data: Bytes::from(vec![0xAB; (w * h * 4) as usize]),
        }
    }

    #[test]
    fn segment_payload_roundtrip() {
        let seg = raw_segment(16, 8);
        let payload = seg.to_payload();
        assert_eq!(payload.len(), SEGMENT_PARAMS_LENGTH + 16 * 8 * 4);

        let decoded = Segment::from_payload(&payload).unwrap();
        assert_eq!(decoded, seg);
    }

    #[test]
    fn raw_segment_size_invariant_is_checked() {
        let seg = Segment {
            data: Bytes::from_static(&[1, 2, 3]),
            ..raw_segment(16, 8)
        };
        let payload = seg.to_payload();
        assert!(Segment::from_payload(&payload).is_err());
    }

    #[test]
    fn compressed_segment_skips_size_invariant() {
        let seg = Segment {
            compressed: true,
            data: Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xD9]),
            ..raw_segment(16, 8)
        };
        let decoded = Segment::from_payload(&seg.to_payload()).unwrap();
        assert!(decoded.compressed);
        assert_eq!(decoded.data.len(), 4);
    }

    #[test]
    fn truncated_payload_is_malformed() {
        assert!(Segment::from_payload(&[0u8; 10]).is_err());
    }

    #[test]
    fn image_view_validates_geometry() {
        let buf = vec![0u8; 64 * 64 * 4];
        assert!(ImageView::new(&buf, 64, 64, PixelFormat::Rgba).is_ok());
        assert!(ImageView::new(&buf, 64, 63, PixelFormat::Rgba).is_err());
        assert!(ImageView::new(&buf, 0, 64, PixelFormat::Rgba).is_err());
    }

    #[test]
    fn image_view_builder_defaults() {
        let buf = vec![0u8; 4];
        let view = ImageView::new(&buf, 1, 1, PixelFormat::Argb).unwrap();
        assert_eq!(view.row_order(), RowOrder::TopDown);
        assert!(matches!(
            view.compression(),
            Compression::On { quality: 75, .. }
        ));

        let view = view
            .with_row_order(RowOrder::BottomUp)
            .with_compression(Compression::Off);
        assert_eq!(view.row_order(), RowOrder::BottomUp);
        assert_eq!(view.compression(), Compression::Off);
    }
}
