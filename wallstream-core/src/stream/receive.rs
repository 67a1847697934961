//! Background receiver dispatching server-bound messages.
//!
//! Reads framed messages and routes them: FRAME_ACK resolves the
//! oldest pending acknowledgement, EVENT feeds the bounded event
//! queue, BIND_EVENTS_REPLY resolves the pending registration, QUIT
//! initiates close, and unknown types are skipped using the header's
//! size so the framing never desynchronizes.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::Shared;
use crate::error::StreamError;
use crate::event::Event;
use crate::header::MessageHeader;
use crate::message::MessageType;
use crate::network::MessageSource;

/// What the dispatcher decided about the stream's future.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    /// The server asked us to shut down.
    Quit,
}

/// Read and dispatch messages until cancellation or a fatal error.
pub(crate) async fn run<R>(
    mut source: MessageSource<R>,
    shared: Arc<Mutex<Shared>>,
    token: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            result = source.receive() => result,
        };

        let flow = match result {
            Ok((header, payload)) => {
                match dispatch(&shared, &header, payload) {
                    Ok(flow) => flow,
                    Err(err) => {
                        warn!(%err, "receive worker: dispatch failed");
                        super::fail_stream(&shared);
                        token.cancel();
                        break;
                    }
                }
            }
            Err(StreamError::ReadTimeout(t)) => {
                // One zero-byte readability probe before giving up.
                if source.probe_readable().await {
                    continue;
                }
                warn!(timeout = ?t, "receive worker: no read progress");
                super::fail_stream(&shared);
                token.cancel();
                break;
            }
            Err(err) => {
                debug!(%err, "receive worker: transport ended");
                super::fail_stream(&shared);
                token.cancel();
                break;
            }
        };

        if flow == Flow::Quit {
            debug!("server requested quit");
            super::fail_stream(&shared);
            token.cancel();
            break;
        }

        // Batch-dispatch whatever is already buffered before parking
        // on the socket again.
        while flow == Flow::Continue && source.has_message(0) {
            match source.receive().await {
                Ok((header, payload)) => {
                    match dispatch(&shared, &header, payload) {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Quit) | Err(_) => {
                            super::fail_stream(&shared);
                            token.cancel();
                            return;
                        }
                    }
                }
                Err(_) => {
                    super::fail_stream(&shared);
                    token.cancel();
                    return;
                }
            }
        }
    }
    debug!("receive worker stopped");
}

/// Route one message. Non-fatal anomalies (unknown types, unexpected
/// directions) are logged and skipped.
fn dispatch(
    shared: &Arc<Mutex<Shared>>,
    header: &MessageHeader,
    payload: Bytes,
) -> Result<Flow, StreamError> {
    let kind = match header.message_type() {
        Ok(kind) => kind,
        Err(StreamError::UnknownMessageType { value }) => {
            warn!(
                value,
                size = header.size(),
                "skipping unknown message type"
            );
            return Ok(Flow::Continue);
        }
        Err(err) => return Err(err),
    };

    match kind {
        MessageType::FrameAck => {
            let mut guard = super::lock(shared);
            match guard.pending_acks.pop_front() {
                Some(waiter) => {
                    let _ = waiter.send(Ok(()));
                }
                None => warn!("frame ack with no pending frame"),
            }
        }
        MessageType::Event => {
            let event = Event::decode(&payload)?;
            let mut guard = super::lock(shared);
            let before = guard.events.overflowed();
            guard.events.push(event);
            let dropped = guard.events.overflowed() - before;
            if dropped > 0 {
                warn!(
                    total = guard.events.overflowed(),
                    "event queue overflow, oldest event dropped"
                );
            }
        }
        MessageType::BindEventsReply => {
            let success = payload.first().copied().unwrap_or(0) != 0;
            let mut guard = super::lock(shared);
            match guard.pending_bind.take() {
                Some(waiter) => {
                    let _ = waiter.send(Ok(success));
                }
                None => warn!("bind reply with no pending registration"),
            }
        }
        MessageType::Quit => return Ok(Flow::Quit),
        other => {
            warn!(kind = ?other, "skipping unexpected client-bound message");
        }
    }
    Ok(Flow::Continue)
}

// ── Tests ────────────────────────────────────────────────────────
