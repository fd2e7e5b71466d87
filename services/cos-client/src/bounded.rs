//! A fixed-length window over a seekable source.

use std::cmp;
use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::io::{AsyncRead, AsyncSeek, AsyncSeekExt as _, ReadBuf};

/// Exposes at most `len` bytes of a source, starting at the source's
/// position when the view was created.
///
/// Offsets are relative to that starting position. Seeks outside
/// `[0, len)` fail with [`io::ErrorKind::InvalidInput`]. Dropping the view
/// drops the source.
#[derive(Debug)]
pub struct BoundedReader<R> {
    inner: R,
    start: u64,
    len: u64,
    position: u64,
}

impl<R> BoundedReader<R>
where
    R: AsyncRead + AsyncSeek + Unpin,
{
    /// Wrap `inner` at its current position.
    ///
    /// The view's length is `len`, or whatever remains of the source if that
    /// is shorter.
    pub async fn new(mut inner: R, len: u64) -> io::Result<Self> {
        let start = inner.stream_position().await?;
        let end = inner.seek(SeekFrom::End(0)).await?;
        inner.seek(SeekFrom::Start(start)).await?;

        Ok(Self {
            inner,
            start,
            len: cmp::min(len, end.saturating_sub(start)),
            position: 0,
        })
    }
}

impl<R> BoundedReader<R> {
    /// Length of the view in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the view is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current offset within the view.
    pub fn position(&self) -> u64 {
        self.position
    }

    fn remaining(&self) -> u64 {
        self.len.saturating_sub(self.position)
    }
}

impl<R> AsyncRead for BoundedReader<R>
where
    R: AsyncRead + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        let remaining = this.remaining();
        if remaining == 0 || buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        let max = cmp::min(remaining, buf.remaining() as u64) as usize;
        let mut limited = ReadBuf::new(buf.initialize_unfilled_to(max));
        ready!(Pin::new(&mut this.inner).poll_read(cx, &mut limited))?;

        let read = limited.filled().len();
        buf.advance(read);
        this.position += read as u64;
        Poll::Ready(Ok(()))
    }
}

impl<R> AsyncSeek for BoundedReader<R>
where
    R: AsyncSeek + Unpin,
{
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        let this = self.get_mut();

        let target = match position {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::Current(delta) => i128::from(this.position) + i128::from(delta),
            SeekFrom::End(delta) => i128::from(this.len) + i128::from(delta),
        };

        if target < 0 || target >= i128::from(this.len) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("seek to {target} outside of bounded view of {} bytes", this.len),
            ));
        }

        Pin::new(&mut this.inner).start_seek(SeekFrom::Start(this.start + target as u64))
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        let this = self.get_mut();
        let absolute = ready!(Pin::new(&mut this.inner).poll_complete(cx))?;
        this.position = cmp::min(absolute.saturating_sub(this.start), this.len);
        Poll::Ready(Ok(this.position))
    }
}
