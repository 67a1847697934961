//! TCP connection to the wall server with protocol handshake and
//! message framing.
//!
//! Immediately after connecting, the server announces its protocol
//! version as a little-endian `int32`; a server older than
//! [`PROTOCOL_VERSION`](crate::PROTOCOL_VERSION) is rejected. Every
//! subsequent message is a [`MessageHeader`] followed by `size`
//! payload bytes.
//!
//! The connection splits into an owned [`MessageSink`] (writer) and
//! [`MessageSource`] (reader). Send atomicity comes from ownership:
//! exactly one worker task holds the sink, so messages can never
//! interleave. Both halves are generic over the underlying I/O so
//! tests can drive them over in-memory pipes.

use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{lookup_host, TcpSocket};
use tokio::time::timeout;

use crate::error::StreamError;
use crate::header::{MessageHeader, HEADER_LENGTH};
use crate::{MAX_PAYLOAD_SIZE, PROTOCOL_VERSION};

/// Port the wall server listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 1701;

/// Default progress window for reads and writes.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);

// ── FlushPolicy ──────────────────────────────────────────────────

/// Whether a send returns as soon as the bytes are handed to the OS
/// or only after the write half has been flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushPolicy {
    #[default]
    Asynchronous,
    WaitFlushed,
}

// ── Connection ───────────────────────────────────────────────────

/// An established, version-checked connection to a wall server.
#[derive(Debug)]
pub struct Connection {
    sink: MessageSink<OwnedWriteHalf>,
    source: MessageSource<OwnedReadHalf>,
    server_protocol_version: i32,
}

impl Connection {
    /// Connect to `host:port`, apply the low-latency socket options and
    /// perform the version handshake.
    pub async fn open(host: &str, port: u16) -> Result<Self, StreamError> {
        let connect_failed = |reason: String| StreamError::ConnectFailed {
            host: host.to_owned(),
            port,
            reason,
        };

        let addrs = lookup_host((host, port))
            .await
            .map_err(|e| connect_failed(e.to_string()))?;

        let mut last_error = "host resolved to no addresses".to_owned();
        let mut stream = None;
        for addr in addrs {
            let socket = if addr.is_ipv4() {
                TcpSocket::new_v4()
            } else {
                TcpSocket::new_v6()
            }
            .map_err(|e| connect_failed(e.to_string()))?;
            socket
                .set_keepalive(true)
                .map_err(|e| connect_failed(e.to_string()))?;

            match timeout(DEFAULT_RECEIVE_TIMEOUT, socket.connect(addr)).await {
                Ok(Ok(s)) => {
                    stream = Some(s);
                    break;
                }
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => last_error = "connect timed out".to_owned(),
            }
        }
        let stream = stream.ok_or_else(|| connect_failed(last_error))?;
        let _ = stream.set_nodelay(true);

        let server_protocol_version = Self::receive_protocol_version(&stream).await?;
        if server_protocol_version < PROTOCOL_VERSION {
            return Err(StreamError::ProtocolTooOld {
                server: server_protocol_version,
                required: PROTOCOL_VERSION,
            });
        }

        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            sink: MessageSink::new(write_half),
            source: MessageSource::new(read_half),
            server_protocol_version,
        })
    }

    async fn receive_protocol_version(
        stream: &tokio::net::TcpStream,
    ) -> Result<i32, StreamError> {
        let mut bytes = [0u8; 4];
        let mut filled = 0usize;
        while filled < 4 {
            match timeout(DEFAULT_RECEIVE_TIMEOUT, stream.readable()).await {
                Err(_) => {
                    return Err(StreamError::HandshakeTimeout(
                        DEFAULT_RECEIVE_TIMEOUT,
                    ))
                }
                Ok(Err(_)) => return Err(StreamError::TransportClosed),
                Ok(Ok(())) => {}
            }
            match stream.try_read(&mut bytes[filled..]) {
                Ok(0) => return Err(StreamError::TransportClosed),
                Ok(n) => filled += n,
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(_) => return Err(StreamError::TransportClosed),
            }
        }
        Ok(i32::from_le_bytes(bytes))
    }

    /// The version the server announced during the handshake.
    pub fn server_protocol_version(&self) -> i32 {
        self.server_protocol_version
    }

    /// Split into the write and read halves, each owned by one worker.
    pub fn split(
        self,
    ) -> (MessageSink<OwnedWriteHalf>, MessageSource<OwnedReadHalf>) {
        (self.sink, self.source)
    }
}

// ── MessageSink ──────────────────────────────────────────────────

/// Owned write half framing messages onto the byte channel.
///
/// Partial writes are retried until the full message is delivered;
/// each individual write must make progress within the timeout.
#[derive(Debug)]
pub struct MessageSink<W> {
    writer: W,
    timeout: Duration,
}

impl<W: AsyncWrite + Unpin> MessageSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            timeout: DEFAULT_RECEIVE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Write `header` then `payload` as one framed message.
    pub async fn send(
        &mut self,
        header: &MessageHeader,
        payload: &[u8],
        flush: FlushPolicy,
    ) -> Result<(), StreamError> {
        self.write_with_progress(&header.encode()).await?;
        if !payload.is_empty() {
            self.write_with_progress(payload).await?;
        }
        if flush == FlushPolicy::WaitFlushed {
            self.writer.flush().await?;
        }
        Ok(())
    }

    /// Flush any buffered bytes to the peer.
    pub async fn flush(&mut self) -> Result<(), StreamError> {
        self.writer.flush().await?;
        Ok(())
    }

    async fn write_with_progress(
        &mut self,
        mut buf: &[u8],
    ) -> Result<(), StreamError> {
        while !buf.is_empty() {
            match timeout(self.timeout, self.writer.write(buf)).await {
                Err(_) => return Err(StreamError::WriteTimeout(self.timeout)),
                Ok(Err(e)) => return Err(e.into()),
                Ok(Ok(0)) => return Err(StreamError::TransportClosed),
                Ok(Ok(n)) => buf = &buf[n..],
            }
        }
        Ok(())
    }
}

// ── MessageSource ────────────────────────────────────────────────

/// Owned read half reassembling framed messages.
///
/// Waiting for the *start* of a message is unbounded (an idle stream
/// is not an error); once any byte of a message has arrived, each
/// further read must make progress within the timeout.
#[derive(Debug)]
pub struct MessageSource<R> {
    reader: R,
    buf: BytesMut,
    timeout: Duration,
}

impl<R: AsyncRead + Unpin> MessageSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: BytesMut::with_capacity(4096),
            timeout: DEFAULT_RECEIVE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Read the next framed message.
    pub async fn receive(&mut self) -> Result<(MessageHeader, Bytes), StreamError> {
        self.fill(HEADER_LENGTH).await?;
        let header = MessageHeader::decode(&self.buf[..HEADER_LENGTH])?;
        let payload_len = header.size() as usize;
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(StreamError::MalformedHeader(
                "payload length exceeds limit",
            ));
        }
        self.fill(HEADER_LENGTH + payload_len).await?;
        self.buf.advance(HEADER_LENGTH);
        let payload = self.buf.split_to(payload_len).freeze();
        Ok((header, payload))
    }

    /// Non-blocking hint: whether a full message with at least
    /// `min_payload` payload bytes is already buffered.
    pub fn has_message(&self, min_payload: usize) -> bool {
        self.buf.len() >= HEADER_LENGTH + min_payload
    }

    /// Zero-byte readability probe: polls the channel once without
    /// waiting and reports whether new bytes arrived.
    pub async fn probe_readable(&mut self) -> bool {
        matches!(
            timeout(Duration::ZERO, self.reader.read_buf(&mut self.buf)).await,
            Ok(Ok(n)) if n > 0
        )
    }

    async fn fill(&mut self, need: usize) -> Result<(), StreamError> {
        while self.buf.len() < need {
            let n = if self.buf.is_empty() {
                self.reader.read_buf(&mut self.buf).await?
            } else {
                match timeout(self.timeout, self.reader.read_buf(&mut self.buf))
                    .await
                {
                    Err(_) => return Err(StreamError::ReadTimeout(self.timeout)),
                    Ok(r) => r?,
                }
            };
            if n == 0 {
                return Err(StreamError::TransportClosed);
            }
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::StreamId;
    use crate::message::MessageType;

    fn header(kind: MessageType, size: u32) -> MessageHeader {
        let id = StreamId::new("t").unwrap();
        MessageHeader::new(kind, &id, size)
    }

    #[tokio::test]
    async fn send_receive_over_duplex() {
        let (client, server) = tokio::io::duplex(1024);
        let (_, client_tx) = tokio::io::split(client);
        let (server_rx, _) = tokio::io::split(server);

        let mut sink = MessageSink::new(client_tx);
        let mut source = MessageSource::new(server_rx);

        let payload = b"hello wall".to_vec();
        sink.send(
            &header(MessageType::PixelStream, payload.len() as u32),
            &payload,
            FlushPolicy::WaitFlushed,
        )
        .await
        .unwrap();

        let (hdr, body) = source.receive().await.unwrap();
        assert_eq!(hdr.message_type().unwrap(), MessageType::PixelStream);
        assert_eq!(hdr.uri(), "t");
        assert_eq!(&body[..], b"hello wall");
    }

    #[tokio::test]
    async fn multiple_messages_batch_into_buffer() {
        let (client, server) = tokio::io::duplex(4096);
        let (_, client_tx) = tokio::io::split(client);
        let (server_rx, _) = tokio::io::split(server);

        let mut sink = MessageSink::new(client_tx);
        let mut source = MessageSource::new(server_rx);

        for _ in 0..3 {
            sink.send(&header(MessageType::FrameAck, 0), &[], FlushPolicy::Asynchronous)
                .await
                .unwrap();
        }
        sink.flush().await.unwrap();

        let (first, _) = source.receive().await.unwrap();
        assert_eq!(first.message_type().unwrap(), MessageType::FrameAck);
        // The remaining two are already buffered.
        assert!(source.has_message(0));
        source.receive().await.unwrap();
        source.receive().await.unwrap();
        assert!(!source.has_message(0));
    }

    #[tokio::test]
    async fn eof_is_transport_closed() {
        let (client, server) = tokio::io::duplex(64);
        let (server_rx, _) = tokio::io::split(server);
        drop(client);

        let mut source = MessageSource::new(server_rx);
        assert!(matches!(
            source.receive().await,
            Err(StreamError::TransportClosed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn partial_message_times_out() {
        let (client, server) = tokio::io::duplex(256);
        let (_, mut client_tx) = tokio::io::split(client);
        let (server_rx, _) = tokio::io::split(server);

        // Half a header, then silence.
        client_tx.write_all(&[0u8; 10]).await.unwrap();

        let mut source = MessageSource::new(server_rx);
        assert!(matches!(
            source.receive().await,
            Err(StreamError::ReadTimeout(_))
        ));
    }

    #[tokio::test]
    async fn oversized_payload_is_rejected() {
        let (client, server) = tokio::io::duplex(256);
        let (_, mut client_tx) = tokio::io::split(client);
        let (server_rx, _) = tokio::io::split(server);

        let id = StreamId::new("t").unwrap();
        let hdr = MessageHeader::new(MessageType::PixelStream, &id, u32::MAX);
        client_tx.write_all(&hdr.encode()).await.unwrap();

        let mut source = MessageSource::new(server_rx);
        assert!(matches!(
            source.receive().await,
            Err(StreamError::MalformedHeader(_))
        ));
    }

    #[tokio::test]
    async fn probe_reports_pending_bytes() {
        let (client, server) = tokio::io::duplex(256);
        let (_, mut client_tx) = tokio::io::split(client);
        let (server_rx, _) = tokio::io::split(server);

        let mut source = MessageSource::new(server_rx);
        assert!(!source.probe_readable().await);

        client_tx.write_all(&[1, 2, 3]).await.unwrap();
        tokio::task::yield_now().await;
        assert!(source.probe_readable().await);
    }
}
