//! Byte transport under a WebSocket connection.
//!
//! A [`Transport`] owns one connected stream. Before the Upgrade handshake
//! it is used whole; afterwards it is split so the read and write
//! directions can be driven from different tasks.

use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use crate::socket::stream::MaybeTlsStream;
use bytes::BytesMut;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};

/// Bytes requested from the socket per read, matching a 64 KiB `recv`.
pub const DEFAULT_READ_CHUNK: usize = 64 * 1024;

async fn read_with_timeout<R>(
    reader: &mut R,
    buf: &mut BytesMut,
    chunk: usize,
    limit: Option<Duration>,
) -> Result<usize, NetError>
where
    R: tokio::io::AsyncRead + Unpin,
{
    buf.reserve(chunk);
    match limit {
        Some(limit) => tokio::time::timeout(limit, reader.read_buf(buf))
            .await
            .map_err(|_| NetError::ConnectionTimedOut)?
            .socket_context(),
        None => reader.read_buf(buf).await.socket_context(),
    }
}

#[derive(Debug)]
pub struct Transport {
    stream: MaybeTlsStream,
    read_chunk: usize,
    read_timeout: Option<Duration>,
}

impl Transport {
    pub fn new(stream: MaybeTlsStream) -> Self {
        Self {
            stream,
            read_chunk: DEFAULT_READ_CHUNK,
            read_timeout: None,
        }
    }

    pub fn with_read_chunk(mut self, chunk: usize) -> Self {
        self.read_chunk = chunk.max(1);
        self
    }

    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn is_tls(&self) -> bool {
        self.stream.is_tls()
    }

    pub async fn send(&mut self, data: &[u8]) -> Result<(), NetError> {
        self.stream.write_all(data).await.socket_context()?;
        self.stream.flush().await.socket_context()
    }

    /// Append received bytes to `buf`. `Ok(0)` means end-of-stream.
    pub async fn recv(&mut self, buf: &mut BytesMut) -> Result<usize, NetError> {
        read_with_timeout(&mut self.stream, buf, self.read_chunk, self.read_timeout).await
    }

    pub async fn shutdown_write(&mut self) -> Result<(), NetError> {
        self.stream.shutdown().await.socket_context()
    }

    pub fn split(self) -> (TransportReader, TransportWriter) {
        let (read, write) = tokio::io::split(self.stream);
        (
            TransportReader {
                inner: read,
                read_chunk: self.read_chunk,
                read_timeout: self.read_timeout,
            },
            TransportWriter {
                inner: write,
                write_closed: false,
            },
        )
    }
}

/// Read direction of a split [`Transport`].
#[derive(Debug)]
pub struct TransportReader {
    inner: ReadHalf<MaybeTlsStream>,
    read_chunk: usize,
    read_timeout: Option<Duration>,
}

impl TransportReader {
    /// Append received bytes to `buf`. `Ok(0)` means end-of-stream.
    pub async fn recv(&mut self, buf: &mut BytesMut) -> Result<usize, NetError> {
        read_with_timeout(&mut self.inner, buf, self.read_chunk, self.read_timeout).await
    }

    /// Discard incoming bytes until the peer closes its side.
    pub async fn drain_to_eof(&mut self) -> Result<(), NetError> {
        let mut scratch = BytesMut::new();
        loop {
            scratch.clear();
            // The read timeout does not apply here; callers bound the drain.
            scratch.reserve(self.read_chunk);
            if self.inner.read_buf(&mut scratch).await.socket_context()? == 0 {
                return Ok(());
            }
        }
    }
}

/// Write direction of a split [`Transport`].
#[derive(Debug)]
pub struct TransportWriter {
    inner: WriteHalf<MaybeTlsStream>,
    write_closed: bool,
}

impl TransportWriter {
    pub async fn send(&mut self, data: &[u8]) -> Result<(), NetError> {
        if self.write_closed {
            return Err(NetError::ConnectionClosed);
        }
        self.inner.write_all(data).await.socket_context()?;
        self.inner.flush().await.socket_context()
    }

    /// Half-close: send FIN (and TLS close_notify) while keeping reads open.
    pub async fn shutdown_write(&mut self) -> Result<(), NetError> {
        if self.write_closed {
            return Ok(());
        }
        self.write_closed = true;
        self.inner.shutdown().await.socket_context()
    }

    pub fn is_write_closed(&self) -> bool {
        self.write_closed
    }
}
