//! Public client API: a named bidirectional session with a wall server.
//!
//! A `Stream` owns its transport and two background workers — a sender
//! draining the bounded outbound queue and a receiver dispatching
//! server messages. Callers drive it from one task at a time; frames
//! follow the `send* → finish_frame` handshake, with the server's
//! FRAME_ACK doubling as "frame consumed, ready for the next one".

mod phase;
mod receive;
mod send;

pub(crate) use phase::StreamPhase;

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, Instrument};

use crate::compress::CompressorPool;
use crate::error::StreamError;
use crate::event::{Event, EventQueue};
use crate::header::{MessageHeader, StreamId};
use crate::hints::SizeHints;
use crate::message::MessageType;
use crate::network::{Connection, FlushPolicy, DEFAULT_PORT, DEFAULT_RECEIVE_TIMEOUT};
use crate::segment::{Compression, ImageView};
use crate::segmenter::{Segmenter, DEFAULT_SEGMENT_DIMENSION};

use send::SendCommand;

// ── Shared state ─────────────────────────────────────────────────

/// State shared between the caller and the two worker tasks.
pub(crate) struct Shared {
    pub phase: StreamPhase,
    /// Waiters for FRAME_ACK, oldest first.
    pub pending_acks: VecDeque<oneshot::Sender<Result<(), StreamError>>>,
    /// Waiter for BIND_EVENTS_REPLY.
    pub pending_bind: Option<oneshot::Sender<Result<bool, StreamError>>>,
    pub events: EventQueue,
}

impl Shared {
    /// State for a stream whose handshake already succeeded.
    pub fn new_ready(event_capacity: usize) -> Self {
        Self {
            phase: StreamPhase::Ready,
            pending_acks: VecDeque::new(),
            pending_bind: None,
            events: EventQueue::new(event_capacity),
        }
    }
}

/// Poison-tolerant lock: a panicked worker must not wedge the caller.
pub(crate) fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Move the stream to `Closed` and fail every outstanding waiter.
pub(crate) fn fail_stream(shared: &Arc<Mutex<Shared>>) {
    let mut guard = lock(shared);
    guard.phase.force_close();
    for waiter in guard.pending_acks.drain(..) {
        let _ = waiter.send(Err(StreamError::TransportClosed));
    }
    if let Some(waiter) = guard.pending_bind.take() {
        let _ = waiter.send(Err(StreamError::TransportClosed));
    }
}

// ── StreamConfig ─────────────────────────────────────────────────

/// Construction options for a [`Stream`].
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Nominal tile dimension for the segmenter.
    pub segment_width: u32,
    pub segment_height: u32,

    /// Outbound queue depth; rounded up to a power of two.
    pub send_queue_depth: usize,

    /// Bound of the user-event queue (oldest dropped on overflow).
    pub event_queue_capacity: usize,

    /// Progress window for reads on the transport.
    pub receive_timeout: Duration,

    /// How long `close` waits for queued writes to flush.
    pub close_grace: Duration,

    /// Compressor pool override; the process-wide pool by default.
    pub compressor: Option<Arc<CompressorPool>>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        let (segment_width, segment_height) = DEFAULT_SEGMENT_DIMENSION;
        Self {
            segment_width,
            segment_height,
            send_queue_depth: 64,
            event_queue_capacity: 1024,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            close_grace: Duration::from_secs(3),
            compressor: None,
        }
    }
}

impl StreamConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the nominal segment dimension.
    pub fn with_segment_dimension(mut self, width: u32, height: u32) -> Self {
        self.segment_width = width;
        self.segment_height = height;
        self
    }

    /// Set the outbound queue depth (rounded up to a power of two).
    pub fn with_send_queue_depth(mut self, depth: usize) -> Self {
        self.send_queue_depth = depth.max(1).next_power_of_two();
        self
    }

    /// Set the event queue bound.
    pub fn with_event_queue_capacity(mut self, capacity: usize) -> Self {
        self.event_queue_capacity = capacity.max(1);
        self
    }

    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    pub fn with_close_grace(mut self, grace: Duration) -> Self {
        self.close_grace = grace;
        self
    }

    /// Use a dedicated compressor pool instead of the process-wide one.
    pub fn with_compressor(mut self, pool: Arc<CompressorPool>) -> Self {
        self.compressor = Some(pool);
        self
    }
}

// ── FrameToken / FrameAck ────────────────────────────────────────

/// Resolves once the frame has been fully written to the transport.
///
/// Observe-only: dropping the token does not cancel the enqueued
/// frame.
#[derive(Debug)]
pub struct FrameToken {
    rx: oneshot::Receiver<Result<(), StreamError>>,
}

impl Future for FrameToken {
    type Output = Result<(), StreamError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.unwrap_or(Err(StreamError::TransportClosed)))
    }
}

/// Resolves once the server acknowledged the finished frame (or the
/// stream terminated). Observe-only, like [`FrameToken`].
#[derive(Debug)]
pub struct FrameAck {
    rx: oneshot::Receiver<Result<(), StreamError>>,
}

impl Future for FrameAck {
    type Output = Result<(), StreamError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.unwrap_or(Err(StreamError::TransportClosed)))
    }
}

// ── Stream ───────────────────────────────────────────────────────

/// A live, named session delivering frames to (and receiving events
/// from) a wall server.
pub struct Stream {
    id: StreamId,
    config: StreamConfig,
    segmenter: Segmenter,
    compressor: Arc<CompressorPool>,
    shared: Arc<Mutex<Shared>>,
    queue: mpsc::Sender<SendCommand>,
    token: CancellationToken,
    workers: Option<(JoinHandle<()>, JoinHandle<()>)>,
    server_protocol_version: i32,
    observer: bool,
}

impl Stream {
    /// Open a pixel source on the default port with default options.
    pub async fn open(id: &str, host: &str) -> Result<Self, StreamError> {
        Self::open_with(StreamConfig::default(), id, host, DEFAULT_PORT).await
    }

    /// Open a pixel source with explicit options.
    pub async fn open_with(
        config: StreamConfig,
        id: &str,
        host: &str,
        port: u16,
    ) -> Result<Self, StreamError> {
        Self::open_inner(config, id, host, port, false).await
    }

    /// Open an event-only observer on the default port.
    ///
    /// An observer registers for events but never sends frames; frame
    /// operations fail with [`StreamError::NotASource`].
    pub async fn open_observer(id: &str, host: &str) -> Result<Self, StreamError> {
        Self::open_observer_with(StreamConfig::default(), id, host, DEFAULT_PORT).await
    }

    /// Open an event-only observer with explicit options.
    pub async fn open_observer_with(
        config: StreamConfig,
        id: &str,
        host: &str,
        port: u16,
    ) -> Result<Self, StreamError> {
        Self::open_inner(config, id, host, port, true).await
    }

    async fn open_inner(
        config: StreamConfig,
        id: &str,
        host: &str,
        port: u16,
        observer: bool,
    ) -> Result<Self, StreamError> {
        let id = StreamId::new(id)?;
        let span = tracing::info_span!("stream", uri = %id, host, port);

        async {
            // Connecting and Handshaking both happen inside
            // Connection::open; the stream becomes visible to the
            // caller only once it is Ready.
            let connection = Connection::open(host, port).await?;
            let server_protocol_version = connection.server_protocol_version();
            debug!(version = server_protocol_version, "handshake complete");

            let (mut sink, source) = connection.split();
            let source = source.with_timeout(config.receive_timeout);

            let announce = if observer {
                MessageType::ObserverOpen
            } else {
                MessageType::PixelStreamOpen
            };
            sink.send(
                &MessageHeader::new(announce, &id, 0),
                &[],
                FlushPolicy::WaitFlushed,
            )
            .await?;

            let shared =
                Arc::new(Mutex::new(Shared::new_ready(config.event_queue_capacity)));
            let token = CancellationToken::new();
            let depth = config.send_queue_depth.max(1).next_power_of_two();
            let (queue, queue_rx) = mpsc::channel(depth);

            let send_task = tokio::spawn(
                send::run(
                    sink,
                    id.clone(),
                    queue_rx,
                    Arc::clone(&shared),
                    token.clone(),
                )
                .in_current_span(),
            );
            let recv_task = tokio::spawn(
                receive::run(source, Arc::clone(&shared), token.clone())
                    .in_current_span(),
            );

            let segmenter = Segmenter::new(config.segment_width, config.segment_height);
            let compressor = config
                .compressor
                .clone()
                .unwrap_or_else(CompressorPool::global);

            Ok(Self {
                id,
                config,
                segmenter,
                compressor,
                shared,
                queue,
                token,
                workers: Some((send_task, recv_task)),
                server_protocol_version,
                observer,
            })
        }
        .instrument(span)
        .await
    }

    // ── Frames ───────────────────────────────────────────────────

    /// Segment (and optionally compress) `image`, enqueue its tiles
    /// and open a frame.
    ///
    /// Returns once every tile sits in the outbound queue, suspending
    /// on backpressure when the queue is full. The returned token
    /// resolves when the frame is fully on the wire.
    pub async fn send(&mut self, image: ImageView<'_>) -> Result<FrameToken, StreamError> {
        if self.observer {
            return Err(StreamError::NotASource);
        }
        lock(&self.shared).phase.begin_frame()?;

        match self.run_pipeline(image).await {
            Ok(token) => Ok(token),
            Err(err) => {
                // A frame that never reached the wire is not open.
                lock(&self.shared).phase.abort_frame();
                Err(err)
            }
        }
    }

    async fn run_pipeline(
        &mut self,
        image: ImageView<'_>,
    ) -> Result<FrameToken, StreamError> {
        let segments = self.segmenter.segments(&image)?;
        let segments = match image.compression() {
            Compression::On {
                quality,
                subsampling,
            } => {
                self.compressor
                    .compress_frame(segments, quality, subsampling)
                    .await?
            }
            Compression::Off => segments,
        };

        let (done_tx, done_rx) = oneshot::channel();
        let mut done_tx = Some(done_tx);
        let last = segments.len().saturating_sub(1);
        for (i, segment) in segments.into_iter().enumerate() {
            let command = SendCommand {
                kind: MessageType::PixelStream,
                payload: segment.to_payload(),
                flush: FlushPolicy::Asynchronous,
                done: if i == last { done_tx.take() } else { None },
            };
            self.queue
                .send(command)
                .await
                .map_err(|_| StreamError::StreamClosed)?;
        }
        Ok(FrameToken { rx: done_rx })
    }

    /// Submit the frame-finished control message.
    ///
    /// The returned acknowledgement resolves when the server confirms
    /// the frame was received in full.
    pub async fn finish_frame(&mut self) -> Result<FrameAck, StreamError> {
        if self.observer {
            return Err(StreamError::NotASource);
        }
        let rx = {
            let mut guard = lock(&self.shared);
            guard.phase.finish_frame()?;
            let (tx, rx) = oneshot::channel();
            guard.pending_acks.push_back(tx);
            rx
        };
        self.queue
            .send(SendCommand {
                kind: MessageType::PixelStreamFinishFrame,
                payload: Bytes::new(),
                flush: FlushPolicy::WaitFlushed,
                done: None,
            })
            .await
            .map_err(|_| StreamError::StreamClosed)?;
        Ok(FrameAck { rx })
    }

    /// Convenience: `send` followed by `finish_frame`.
    pub async fn send_and_finish(
        &mut self,
        image: ImageView<'_>,
    ) -> Result<FrameAck, StreamError> {
        let _token = self.send(image).await?;
        self.finish_frame().await
    }

    // ── Events ───────────────────────────────────────────────────

    /// Ask the server to deliver user events for this stream.
    ///
    /// In exclusive mode no other registrant receives the same events.
    /// Returns the server's success flag.
    pub async fn register_for_events(
        &mut self,
        exclusive: bool,
    ) -> Result<bool, StreamError> {
        let rx = {
            let mut guard = lock(&self.shared);
            if !guard.phase.is_open() {
                return Err(StreamError::StreamClosed);
            }
            let (tx, rx) = oneshot::channel();
            guard.pending_bind = Some(tx);
            rx
        };
        self.queue
            .send(SendCommand {
                kind: MessageType::BindEvents,
                payload: Bytes::from(vec![exclusive as u8]),
                flush: FlushPolicy::WaitFlushed,
                done: None,
            })
            .await
            .map_err(|_| StreamError::StreamClosed)?;
        rx.await.unwrap_or(Err(StreamError::TransportClosed))
    }

    /// Whether at least one event is queued.
    pub fn has_event(&self) -> bool {
        !lock(&self.shared).events.is_empty()
    }

    /// Pop the oldest queued event.
    pub fn get_event(&self) -> Option<Event> {
        lock(&self.shared).events.pop()
    }

    /// Events dropped so far because the bounded queue overflowed.
    pub fn overflowed_event_count(&self) -> u64 {
        lock(&self.shared).events.overflowed()
    }

    // ── Hints & accessors ────────────────────────────────────────

    /// Announce preferred window dimensions to the wall server.
    pub async fn send_size_hints(&mut self, hints: SizeHints) -> Result<(), StreamError> {
        if !lock(&self.shared).phase.is_open() {
            return Err(StreamError::StreamClosed);
        }
        self.queue
            .send(SendCommand {
                kind: MessageType::SizeHints,
                payload: Bytes::copy_from_slice(&hints.encode()),
                flush: FlushPolicy::Asynchronous,
                done: None,
            })
            .await
            .map_err(|_| StreamError::StreamClosed)
    }

    /// The identifier naming this stream on the wall.
    pub fn id(&self) -> &StreamId {
        &self.id
    }

    /// The protocol version the server announced at handshake.
    pub fn server_protocol_version(&self) -> i32 {
        self.server_protocol_version
    }

    pub fn is_observer(&self) -> bool {
        self.observer
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.shared).phase.is_closed()
    }

    // ── Shutdown ─────────────────────────────────────────────────

    /// Graceful close: QUIT the server, wait up to the grace window
    /// for queued writes to flush, then tear down the workers.
    ///
    /// Idempotent; all later operations fail with
    /// [`StreamError::StreamClosed`].
    pub async fn close(&mut self) {
        let was_open = {
            let mut guard = lock(&self.shared);
            let was_open = !guard.phase.is_closed();
            if was_open {
                let _ = guard.phase.begin_close();
            }
            was_open
        };

        if was_open {
            if !self.observer {
                let _ = self
                    .queue
                    .send(SendCommand::control(MessageType::PixelStreamClose))
                    .await;
            }
            let (tx, rx) = oneshot::channel();
            let quit = SendCommand {
                kind: MessageType::Quit,
                payload: Bytes::new(),
                flush: FlushPolicy::WaitFlushed,
                done: Some(tx),
            };
            if self.queue.send(quit).await.is_ok() {
                let _ = timeout(self.config.close_grace, rx).await;
            }
        }

        self.token.cancel();
        if let Some((send_task, recv_task)) = self.workers.take() {
            let _ = send_task.await;
            let _ = recv_task.await;
        }
        fail_stream(&self.shared);
        debug!(uri = %self.id, "stream closed");
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.id)
            .field("observer", &self.observer)
            .field("phase", &lock(&self.shared).phase)
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────
