//! Grid segmentation of a source image into tiles.
//!
//! The segmenter walks the source top-left in row-major order cutting
//! tiles of a nominal dimension; the last column and row may be
//! smaller to cover the remainder exactly.

use bytes::{Bytes, BytesMut};

use crate::error::StreamError;
use crate::segment::{ImageView, Segment};

/// Nominal tile dimension used when none is configured.
pub const DEFAULT_SEGMENT_DIMENSION: (u32, u32) = (512, 512);

/// Cuts [`ImageView`]s into grids of [`Segment`]s.
#[derive(Debug, Clone, Copy)]
pub struct Segmenter {
    segment_width: u32,
    segment_height: u32,
}

impl Default for Segmenter {
    fn default() -> Self {
        let (w, h) = DEFAULT_SEGMENT_DIMENSION;
        Self::new(w, h)
    }
}

impl Segmenter {
    /// A segmenter with the given nominal tile dimension.
    ///
    /// Zero dimensions are treated as 1.
    pub fn new(segment_width: u32, segment_height: u32) -> Self {
        Self {
            segment_width: segment_width.max(1),
            segment_height: segment_height.max(1),
        }
    }

    /// Cut `image` into tiles, invoking `sink` once per tile in
    /// row-major order. Returns the number of tiles produced.
    ///
    /// A `false` return from `sink` aborts generation with
    /// [`StreamError::AbortedByCaller`]. When a single tile covers the
    /// whole source, its pixel buffer is one contiguous copy of the
    /// source.
    pub fn generate(
        &self,
        image: &ImageView<'_>,
        mut sink: impl FnMut(Segment) -> bool,
    ) -> Result<usize, StreamError> {
        let (width, height) = (image.width(), image.height());

        // Whole image fits one tile: no per-row copying needed.
        if self.segment_width >= width && self.segment_height >= height {
            let segment = Segment {
                x: 0,
                y: 0,
                width,
                height,
                row_order: image.row_order(),
                format: image.format(),
                compressed: false,
                data: Bytes::copy_from_slice(image.data()),
            };
            if !sink(segment) {
                return Err(StreamError::AbortedByCaller);
            }
            return Ok(1);
        }

        let bpp = image.format().bytes_per_pixel();
        let stride = width as usize * bpp;
        let mut produced = 0usize;

        let mut y = 0u32;
        while y < height {
            let tile_h = self.segment_height.min(height - y);
            let mut x = 0u32;
            while x < width {
                let tile_w = self.segment_width.min(width - x);

                let row_bytes = tile_w as usize * bpp;
                let mut data =
                    BytesMut::with_capacity(row_bytes * tile_h as usize);
                for row in 0..tile_h {
                    let offset =
                        (y + row) as usize * stride + x as usize * bpp;
                    data.extend_from_slice(
                        &image.data()[offset..offset + row_bytes],
                    );
                }

                let segment = Segment {
                    x,
                    y,
                    width: tile_w,
                    height: tile_h,
                    row_order: image.row_order(),
                    format: image.format(),
                    compressed: false,
                    data: data.freeze(),
                };
                if !sink(segment) {
                    return Err(StreamError::AbortedByCaller);
                }
                produced += 1;
                x += tile_w;
            }
            y += tile_h;
        }
        Ok(produced)
    }

    /// Collect all tiles of `image` into a vector.
    pub fn segments(
        &self,
        image: &ImageView<'_>,
    ) -> Result<Vec<Segment>, StreamError> {
        let mut out = Vec::new();
        self.generate(image, |segment| {
            out.push(segment);
            true
        })?;
        Ok(out)
    }
}

// ── Tests ────────────────────────────────────────────────────────
