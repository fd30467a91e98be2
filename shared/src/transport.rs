//! Length-prefixed framing over a byte stream.
//!
//! ```text
//! [i32 LE payload length][payload]
//! ```
//!
//! Every read and write is bounded by a timeout so a silent peer can never
//! hold up the caller for longer than that. Failures are returned, never
//! thrown: a vanished peer shows up as [`TransportError::Closed`], a bogus
//! length prefix as [`TransportError::InvalidLength`].

use crate::{DEFAULT_IO_TIMEOUT, MAX_MESSAGE_SIZE};
use log::debug;
use std::future::Future;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

#[derive(Debug, Error)]
pub enum TransportError {
    /// Peer went away: EOF, reset, or a read that stalled past the timeout.
    #[error("connection closed")]
    Closed,
    /// Length prefix was negative or above the size cap; payload not read.
    #[error("invalid frame length {0}")]
    InvalidLength(i32),
    /// Outgoing payload exceeds the size cap; nothing was written.
    #[error("payload of {0} bytes exceeds frame limit")]
    Oversized(usize),
    #[error("send failed: {0}")]
    SendFailed(#[source] io::Error),
}

impl TransportError {
    /// True for errors caused by the peer sending garbage rather than leaving.
    pub fn is_malformed(&self) -> bool {
        matches!(self, TransportError::InvalidLength(_))
    }
}

/// Result of a zero-wait readiness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Connected, nothing to read yet.
    Idle,
    /// At least one byte is waiting.
    Readable,
    /// Peer closed or the socket reports an error.
    Dead,
}

/// Polls `future` once without waiting. `None` means it was not ready.
pub async fn poll_now<F: Future>(future: F) -> Option<F::Output> {
    timeout(Duration::ZERO, future).await.ok()
}

/// A stream split into discrete length-prefixed messages.
#[derive(Debug)]
pub struct FramedStream<S> {
    stream: S,
    io_timeout: Duration,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self::with_timeout(stream, DEFAULT_IO_TIMEOUT)
    }

    pub fn with_timeout(stream: S, io_timeout: Duration) -> Self {
        Self { stream, io_timeout }
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Raw access to the underlying stream. Writing through it bypasses
    /// framing.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Writes one frame and flushes it.
    pub async fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(TransportError::Oversized(payload.len()));
        }

        // Checked above: MAX_MESSAGE_SIZE fits in an i32.
        let len = payload.len() as i32;
        let io_timeout = self.io_timeout;
        let stream = &mut self.stream;

        let write = async {
            stream.write_all(&len.to_le_bytes()).await?;
            stream.write_all(payload).await?;
            stream.flush().await
        };

        match timeout(io_timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TransportError::SendFailed(e)),
            Err(_) => Err(TransportError::SendFailed(io::Error::new(
                io::ErrorKind::TimedOut,
                "write timed out",
            ))),
        }
    }

    /// Reads one complete frame.
    pub async fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        let mut len_bytes = [0u8; 4];
        self.read_exact(&mut len_bytes).await?;

        let len = i32::from_le_bytes(len_bytes);
        let size = match usize::try_from(len) {
            Ok(size) if size <= MAX_MESSAGE_SIZE => size,
            _ => return Err(TransportError::InvalidLength(len)),
        };

        let mut payload = vec![0u8; size];
        self.read_exact(&mut payload).await?;
        Ok(payload)
    }

    /// Fills `buf` completely, one bounded read at a time.
    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        let mut filled = 0;
        while filled < buf.len() {
            match timeout(self.io_timeout, self.stream.read(&mut buf[filled..])).await {
                Ok(Ok(0)) => {
                    debug!("peer closed after {} of {} bytes", filled, buf.len());
                    return Err(TransportError::Closed);
                }
                Ok(Ok(n)) => filled += n,
                Ok(Err(e)) => {
                    debug!("read failed: {}", e);
                    return Err(TransportError::Closed);
                }
                Err(_) => {
                    debug!("read stalled after {} of {} bytes", filled, buf.len());
                    return Err(TransportError::Closed);
                }
            }
        }
        Ok(())
    }

    /// Best-effort close of the write half; errors are irrelevant here.
    pub async fn shutdown(&mut self) {
        let _ = timeout(self.io_timeout, self.stream.shutdown()).await;
    }
}

impl FramedStream<TcpStream> {
    /// Opens a TCP connection, giving up after the I/O timeout.
    pub async fn connect(addr: &str, io_timeout: Duration) -> io::Result<Self> {
        let stream = match timeout(io_timeout, TcpStream::connect(addr)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connecting to {} timed out", addr),
                ))
            }
        };
        stream.set_nodelay(true)?;
        Ok(Self::with_timeout(stream, io_timeout))
    }

    /// Checks for pending data or a dead peer without waiting.
    pub async fn probe(&self) -> Liveness {
        let mut buf = [0u8; 1];
        match poll_now(self.stream.peek(&mut buf)).await {
            None => Liveness::Idle,
            Some(Ok(0)) => Liveness::Dead,
            Some(Ok(_)) => Liveness::Readable,
            Some(Err(e)) => {
                debug!("probe failed: {}", e);
                Liveness::Dead
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;
    use tokio::net::TcpListener;
    use tokio_test::{assert_err, assert_ok};

    const SHORT: Duration = Duration::from_millis(100);

    #[tokio::test]
    async fn test_send_then_receive() {
        let (a, b) = duplex(1024);
        let mut sender = FramedStream::new(a);
        let mut receiver = FramedStream::new(b);

        assert_ok!(sender.send(b"hello").await);
        assert_ok!(sender.send(b"").await);

        assert_eq!(receiver.receive().await.unwrap(), b"hello".to_vec());
        assert_eq!(receiver.receive().await.unwrap(), Vec::<u8>::new());
    }

    #[tokio::test]
    async fn test_length_prefix_is_little_endian() {
        let (a, mut b) = duplex(1024);
        let mut sender = FramedStream::new(a);
        sender.send(&[9, 8, 7]).await.unwrap();

        let mut raw = [0u8; 7];
        b.read_exact(&mut raw).await.unwrap();
        assert_eq!(raw, [3, 0, 0, 0, 9, 8, 7]);
    }

    #[tokio::test]
    async fn test_negative_length_rejected() {
        let (mut a, b) = duplex(1024);
        let mut receiver = FramedStream::with_timeout(b, SHORT);

        a.write_all(&(-1i32).to_le_bytes()).await.unwrap();
        match receiver.receive().await {
            Err(TransportError::InvalidLength(-1)) => {}
            other => panic!("expected invalid length, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_oversized_length_rejected_without_reading_payload() {
        let (mut a, b) = duplex(1024);
        let mut receiver = FramedStream::with_timeout(b, SHORT);

        let too_big = (MAX_MESSAGE_SIZE as i32) + 1;
        a.write_all(&too_big.to_le_bytes()).await.unwrap();
        a.write_all(&[1, 2, 3]).await.unwrap();

        let err = assert_err!(receiver.receive().await);
        assert!(err.is_malformed());
        assert!(matches!(err, TransportError::InvalidLength(len) if len == too_big));
    }

    #[tokio::test]
    async fn test_oversized_send_refused() {
        let (a, _b) = duplex(16);
        let mut sender = FramedStream::new(a);
        let payload = vec![0u8; MAX_MESSAGE_SIZE + 1];
        assert!(matches!(
            sender.send(&payload).await,
            Err(TransportError::Oversized(_))
        ));
    }

    #[tokio::test]
    async fn test_peer_close_reports_closed() {
        let (a, b) = duplex(1024);
        let mut receiver = FramedStream::with_timeout(b, SHORT);
        drop(a);

        let err = assert_err!(receiver.receive().await);
        assert!(matches!(err, TransportError::Closed));
        assert!(!err.is_malformed());
    }

    #[tokio::test]
    async fn test_stalled_partial_frame_reports_closed() {
        let (mut a, b) = duplex(1024);
        let mut receiver = FramedStream::with_timeout(b, SHORT);

        a.write_all(&10i32.to_le_bytes()).await.unwrap();
        a.write_all(&[1, 2, 3]).await.unwrap();

        let err = assert_err!(receiver.receive().await);
        assert!(matches!(err, TransportError::Closed));
        drop(a);
    }

    #[tokio::test]
    async fn test_send_to_closed_peer_fails() {
        let (a, b) = duplex(1024);
        let mut sender = FramedStream::with_timeout(a, SHORT);
        drop(b);

        assert!(matches!(
            sender.send(b"anyone there?").await,
            Err(TransportError::SendFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_probe_tracks_tcp_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let mut client = FramedStream::connect(&addr, SHORT).await.unwrap();
        let (accepted, _) = listener.accept().await.unwrap();
        let mut server = FramedStream::with_timeout(accepted, SHORT);

        assert_eq!(server.probe().await, Liveness::Idle);

        client.send(b"ping").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(server.probe().await, Liveness::Readable);

        drop(client);
        tokio::time::sleep(Duration::from_millis(50)).await;
        // Unread data is still readable; the close shows once it is drained.
        assert_eq!(server.receive().await.unwrap(), b"ping".to_vec());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(server.probe().await, Liveness::Dead);
    }

    #[tokio::test]
    async fn test_poll_now_returns_ready_values() {
        assert_eq!(poll_now(async { 5 }).await, Some(5));
        assert_eq!(
            poll_now(tokio::time::sleep(Duration::from_secs(10))).await,
            None
        );
    }
}
