//! Parallel JPEG compression of frame segments.
//!
//! The pool is shared at process scope and holds no per-stream state.
//! Concurrency is bounded by a semaphore sized to the hardware
//! parallelism; the actual encoding runs on the blocking thread pool.
//! Segments of a frame are compressed concurrently but always yielded
//! back in segmenter order.

use std::sync::{Arc, OnceLock};

use jpeg_encoder::{ColorType, Encoder, SamplingFactor};
use tokio::sync::Semaphore;

use crate::error::StreamError;
use crate::segment::{PixelFormat, Segment, Subsampling};

static GLOBAL_POOL: OnceLock<Arc<CompressorPool>> = OnceLock::new();

// ── CompressorPool ───────────────────────────────────────────────

/// Bounded pool of JPEG encode workers.
#[derive(Debug)]
pub struct CompressorPool {
    permits: Arc<Semaphore>,
    workers: usize,
}

impl CompressorPool {
    /// A pool allowing `workers` concurrent encodes.
    ///
    /// Zero is treated as 1.
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    /// The process-wide pool, sized to the available hardware
    /// parallelism on first use.
    pub fn global() -> Arc<CompressorPool> {
        Arc::clone(GLOBAL_POOL.get_or_init(|| {
            let workers = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1);
            Arc::new(CompressorPool::new(workers))
        }))
    }

    /// Maximum concurrent encodes.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Replace every raw segment's pixels with a JPEG bitstream.
    ///
    /// All segments of the frame are encoded before returning, and the
    /// returned order is the input order regardless of completion
    /// order. Any per-segment failure fails the whole frame with
    /// [`StreamError::CompressionFailed`]; no partial frame survives.
    pub async fn compress_frame(
        &self,
        segments: Vec<Segment>,
        quality: u8,
        subsampling: Subsampling,
    ) -> Result<Vec<Segment>, StreamError> {
        let mut handles = Vec::with_capacity(segments.len());
        for segment in segments {
            let permits = Arc::clone(&self.permits);
            handles.push(tokio::spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|_| "compressor pool shut down".to_string())?;
                tokio::task::spawn_blocking(move || {
                    encode_segment(segment, quality, subsampling)
                })
                .await
                .map_err(|e| e.to_string())?
            }));
        }

        let mut out = Vec::with_capacity(handles.len());
        let mut failure: Option<StreamError> = None;
        for (segment_index, handle) in handles.into_iter().enumerate() {
            let result: Result<Segment, String> = match handle.await {
                Ok(r) => r,
                Err(join) => Err(join.to_string()),
            };
            match result {
                Ok(segment) => out.push(segment),
                Err(reason) => {
                    failure.get_or_insert(StreamError::CompressionFailed {
                        segment_index,
                        reason,
                    });
                }
            }
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(out),
        }
    }
}

// ── Encoding ─────────────────────────────────────────────────────

fn sampling_factor(subsampling: Subsampling) -> SamplingFactor {
    match subsampling {
        Subsampling::Yuv444 => SamplingFactor::F_1_1,
        Subsampling::Yuv422 => SamplingFactor::F_2_1,
        Subsampling::Yuv420 => SamplingFactor::F_2_2,
    }
}

/// Rotate `[A, c0, c1, c2]` pixels to `[c0, c1, c2, A]` so that
/// alpha-first layouts map onto the encoder's native color types.
fn alpha_to_back(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for px in data.chunks_exact(4) {
        out.extend_from_slice(&[px[1], px[2], px[3], px[0]]);
    }
    out
}

fn encode_segment(
    segment: Segment,
    quality: u8,
    subsampling: Subsampling,
) -> Result<Segment, String> {
    if segment.compressed {
        return Ok(segment);
    }
    if segment.width > u16::MAX as u32 || segment.height > u16::MAX as u32 {
        return Err(format!(
            "segment {}x{} exceeds the encoder's dimension limit",
            segment.width, segment.height
        ));
    }

    let (pixels, color) = match segment.format {
        PixelFormat::Rgba => (None, ColorType::Rgba),
        PixelFormat::Bgra => (None, ColorType::Bgra),
        PixelFormat::Argb => (Some(alpha_to_back(&segment.data)), ColorType::Rgba),
        PixelFormat::Abgr => (Some(alpha_to_back(&segment.data)), ColorType::Bgra),
    };
    let input: &[u8] = pixels.as_deref().unwrap_or(&segment.data);

    let mut jpeg = Vec::new();
    let mut encoder = Encoder::new(&mut jpeg, quality.clamp(1, 100));
    encoder.set_sampling_factor(sampling_factor(subsampling));
    encoder
        .encode(
            input,
            segment.width as u16,
            segment.height as u16,
            color,
        )
        .map_err(|e| e.to_string())?;

    Ok(Segment {
        compressed: true,
        data: jpeg.into(),
        ..segment
    })
}

// ── Tests ────────────────────────────────────────────────────────
