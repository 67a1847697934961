//! Size hints a source can announce so the wall server picks a
//! sensible initial window geometry.
//!
//! Wire format (24 bytes, little-endian): six `u32` fields in
//! declaration order. `0` means unspecified.

use crate::error::StreamError;

/// Encoded size on the wire.
pub const SIZE_HINTS_LENGTH: usize = 6 * 4;

/// Value for a dimension the source does not constrain.
pub const UNSPECIFIED: u32 = 0;

/// Minimum, maximum and preferred dimensions of a stream's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SizeHints {
    pub min_width: u32,
    pub min_height: u32,
    pub max_width: u32,
    pub max_height: u32,
    pub preferred_width: u32,
    pub preferred_height: u32,
}

impl SizeHints {
    /// Hints that only state a preferred size.
    pub fn preferred(width: u32, height: u32) -> Self {
        Self {
            preferred_width: width,
            preferred_height: height,
            ..Self::default()
        }
    }

    pub fn encode(&self) -> [u8; SIZE_HINTS_LENGTH] {
        let mut buf = [0u8; SIZE_HINTS_LENGTH];
        for (i, v) in [
            self.min_width,
            self.min_height,
            self.max_width,
            self.max_height,
            self.preferred_width,
            self.preferred_height,
        ]
        .into_iter()
        .enumerate()
        {
            buf[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
        }
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, StreamError> {
        if data.len() != SIZE_HINTS_LENGTH {
            return Err(StreamError::MalformedPayload(format!(
                "size hints payload is {} bytes, expected {}",
                data.len(),
                SIZE_HINTS_LENGTH
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
        Ok(Self {
            min_width: field(0),
            min_height: field(1),
            max_width: field(2),
            max_height: field(3),
            preferred_width: field(4),
            preferred_height: field(5),
        })
    }
}
