//! Background sender draining the stream's outbound queue.
//!
//! Commands are written strictly in FIFO order, so segments of a frame
//! go out in segmenter order and frames never interleave. The bounded
//! queue is the backpressure mechanism: when it is full, `Stream::send`
//! suspends its caller until the worker drains a slot.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::Shared;
use crate::error::StreamError;
use crate::header::{MessageHeader, StreamId};
use crate::message::MessageType;
use crate::network::{FlushPolicy, MessageSink};

// ── SendCommand ──────────────────────────────────────────────────

/// One outbound message queued for the send worker.
pub(crate) struct SendCommand {
    pub kind: MessageType,
    pub payload: Bytes,
    pub flush: FlushPolicy,
    /// Resolved once the message is fully written (or errored).
    pub done: Option<oneshot::Sender<Result<(), StreamError>>>,
}

impl SendCommand {
    pub fn control(kind: MessageType) -> Self {
        Self {
            kind,
            payload: Bytes::new(),
            flush: FlushPolicy::Asynchronous,
            done: None,
        }
    }
}

// ── Worker loop ──────────────────────────────────────────────────

/// Drain `queue` onto `sink` until cancellation, queue closure, or a
/// write failure.
///
/// On failure the stream is marked closed, every pending waiter fails
/// with `TransportClosed`, and any commands still queued have their
/// completions failed as well.
pub(crate) async fn run<W>(
    mut sink: MessageSink<W>,
    uri: StreamId,
    mut queue: mpsc::Receiver<SendCommand>,
    shared: Arc<Mutex<Shared>>,
    token: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let cmd = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            cmd = queue.recv() => match cmd {
                Some(cmd) => cmd,
                None => break,
            },
        };

        let header = MessageHeader::new(cmd.kind, &uri, cmd.payload.len() as u32);
        match sink.send(&header, &cmd.payload, cmd.flush).await {
            Ok(()) => {
                if let Some(done) = cmd.done {
                    let _ = done.send(Ok(()));
                }
            }
            Err(err) => {
                error!(%err, kind = ?cmd.kind, "send worker: write failed");
                if let Some(done) = cmd.done {
                    let _ = done.send(Err(StreamError::TransportClosed));
                }
                super::fail_stream(&shared);
                token.cancel();
                break;
            }
        }
    }

    // Fail completions for anything still queued.
    queue.close();
    while let Ok(cmd) = queue.try_recv() {
        if let Some(done) = cmd.done {
            let _ = done.send(Err(StreamError::TransportClosed));
        }
    }
    debug!("send worker stopped");
}

// ── Tests ────────────────────────────────────────────────────────
