//! Read-ahead buffer over an async byte stream
//!
//! Detection stages inspect bytes without committing to an interpretation.
//! Whatever a stage reads but does not consume stays in the buffer and is
//! served first to the next reader, so nothing the peer sent is lost or
//! interpreted twice.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf};

/// Bytes requested from the inner stream per read
const READ_CHUNK: usize = 4096;

/// Async stream with a replayable read-ahead buffer
#[derive(Debug)]
pub struct Lookahead<S> {
    inner: S,
    buf: BytesMut,
    eof: bool,
}

impl<S> Lookahead<S> {
    /// Wrap a stream with an empty buffer
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(READ_CHUNK),
            eof: false,
        }
    }

    /// Bytes read from the stream and not consumed yet
    #[inline]
    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    /// Whether the inner stream reported end of stream
    #[inline]
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Drop `n` buffered bytes
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.buf.len());
        self.buf.advance(n);
    }

    /// Remove and return `n` buffered bytes
    pub fn split_buffered(&mut self, n: usize) -> Bytes {
        let n = n.min(self.buf.len());
        self.buf.split_to(n).freeze()
    }
}

impl<S: AsyncRead + Unpin> Lookahead<S> {
    /// Read once from the inner stream into the buffer
    ///
    /// Returns the number of bytes added; 0 means end of stream.
    pub async fn fill_more(&mut self) -> io::Result<usize> {
        if self.eof {
            return Ok(0);
        }

        self.buf.reserve(READ_CHUNK);
        let n = self.inner.read_buf(&mut self.buf).await?;
        if n == 0 {
            self.eof = true;
        }
        Ok(n)
    }

    /// Read until at least `want` bytes are buffered
    ///
    /// Returns `false` if the stream ended first; the short buffer is kept.
    pub async fn fill(&mut self, want: usize) -> io::Result<bool> {
        while self.buf.len() < want {
            if self.fill_more().await? == 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for Lookahead<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        dst: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if !this.buf.is_empty() {
            let n = this.buf.len().min(dst.remaining());
            dst.put_slice(&this.buf[..n]);
            this.buf.advance(n);
            return Poll::Ready(Ok(()));
        }

        if this.eof {
            return Poll::Ready(Ok(()));
        }

        Pin::new(&mut this.inner).poll_read(cx, dst)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for Lookahead<S> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, data: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, data)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
