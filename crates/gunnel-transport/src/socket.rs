//! Raw stream socket with an expedited-data channel.
//!
//! tokio's `TcpStream` never asks the reactor for `EPOLLPRI`, so out-of-band
//! arrivals would go unnoticed. [`Socket`] owns the std stream directly and
//! registers it through [`AsyncFd`] with priority interest where the platform
//! supports it, which lets [`RelayLeg::next_event`] report urgent bytes ahead
//! of ordinary data.

use std::fmt;
use std::future::Future;
use std::io::{self, Read, Write};
use std::mem::MaybeUninit;
use std::net::{Shutdown, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use gunnel_core::URGENT_BUFFER_SIZE;
use gunnel_core::io::{LegEvent, RelayLeg, UrgentDelivery};
use socket2::SockRef;
use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, AsyncWrite, Interest, ReadBuf};

#[cfg(any(target_os = "linux", target_os = "android"))]
const READ_INTEREST: Interest = Interest::READABLE.add(Interest::PRIORITY);
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const READ_INTEREST: Interest = Interest::READABLE;

/// The std stream behind a [`Socket`].
#[derive(Debug)]
enum Stream {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl Stream {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => (&*s).read(buf),
            Stream::Unix(s) => (&*s).read(buf),
        }
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => (&*s).write(buf),
            Stream::Unix(s) => (&*s).write(buf),
        }
    }

    fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.shutdown(how),
            Stream::Unix(s) => s.shutdown(how),
        }
    }

    /// Read one pending urgent byte, `None` when nothing is pending.
    fn recv_urgent(&self) -> io::Result<Option<u8>> {
        let Stream::Tcp(tcp) = self else {
            return Ok(None);
        };
        let mut byte = [MaybeUninit::new(0u8); URGENT_BUFFER_SIZE];
        match SockRef::from(tcp).recv_out_of_band(&mut byte) {
            Ok(0) => Ok(None),
            // SAFETY: the buffer was initialised above and recv only overwrites it.
            Ok(_) => Ok(Some(unsafe { byte[0].assume_init() })),
            // EINVAL: no urgent byte pending (or already consumed).
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl AsRawFd for Stream {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            Stream::Tcp(s) => s.as_raw_fd(),
            Stream::Unix(s) => s.as_raw_fd(),
        }
    }
}

/// A connected, non-blocking stream socket registered with the reactor.
pub struct Socket {
    inner: AsyncFd<Stream>,
}

impl Socket {
    fn new(stream: Stream) -> io::Result<Self> {
        let inner = AsyncFd::try_with_interest(stream, READ_INTEREST.add(Interest::WRITABLE))
            .map_err(|e| e.into_parts().1)?;
        Ok(Self { inner })
    }

    /// Take over a TCP stream accepted or connected by tokio.
    pub fn from_tcp(stream: tokio::net::TcpStream) -> io::Result<Self> {
        let std = stream.into_std()?;
        std.set_nonblocking(true)?;
        Self::new(Stream::Tcp(std))
    }

    /// Take over a local stream socket accepted or connected by tokio.
    pub fn from_unix(stream: tokio::net::UnixStream) -> io::Result<Self> {
        let std = stream.into_std()?;
        std.set_nonblocking(true)?;
        Self::new(Stream::Unix(std))
    }

    /// Whether the socket carries an expedited-data channel.
    pub fn has_urgent_channel(&self) -> bool {
        matches!(self.inner.get_ref(), Stream::Tcp(_))
    }

    /// Shut the socket down in the given direction(s).
    pub fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        self.inner.get_ref().shutdown(how)
    }

    async fn send_all(&self, mut data: &[u8]) -> io::Result<()> {
        while !data.is_empty() {
            let mut guard = self.inner.writable().await?;
            match guard.try_io(|inner| inner.get_ref().write(data)) {
                Ok(Ok(0)) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(Ok(n)) => data = &data[n..],
                Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => {}
                Ok(Err(e)) => return Err(e),
                Err(_would_block) => {}
            }
        }
        Ok(())
    }

    async fn write_urgent(&self, mut data: &[u8]) -> io::Result<()> {
        let Stream::Tcp(tcp) = self.inner.get_ref() else {
            return Err(io::ErrorKind::Unsupported.into());
        };
        while !data.is_empty() {
            let mut guard = self.inner.writable().await?;
            match guard.try_io(|_| SockRef::from(tcp).send_out_of_band(data)) {
                Ok(Ok(0)) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(Ok(n)) => data = &data[n..],
                Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => {}
                Ok(Err(e)) => return Err(e),
                Err(_would_block) => {}
            }
        }
        Ok(())
    }

    async fn wait_event(&self, buf: &mut [u8]) -> io::Result<LegEvent> {
        loop {
            let mut guard = self.inner.ready(READ_INTEREST).await?;
            let ready = guard.ready();

            #[cfg(any(target_os = "linux", target_os = "android"))]
            if ready.is_priority() {
                match self.inner.get_ref().recv_urgent() {
                    Ok(Some(byte)) => {
                        buf[0] = byte;
                        return Ok(LegEvent::Urgent(1));
                    }
                    Ok(None) => guard.clear_ready_matching(tokio::io::Ready::PRIORITY),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                }
            }

            if !(ready.is_readable() || ready.is_read_closed()) {
                continue;
            }
            match guard.try_io(|inner| inner.get_ref().read(buf)) {
                Ok(Ok(0)) => return Ok(LegEvent::Closed),
                Ok(Ok(n)) => return Ok(LegEvent::Data(n)),
                Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => {}
                Ok(Err(e)) => return Err(e),
                Err(_would_block) => {}
            }
        }
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("stream", self.inner.get_ref())
            .finish()
    }
}

impl RelayLeg for Socket {
    fn next_event<'a>(
        &'a mut self,
        buf: &'a mut [u8],
    ) -> impl Future<Output = io::Result<LegEvent>> + Send + 'a {
        self.wait_event(buf)
    }

    fn send<'a>(&'a mut self, data: &'a [u8]) -> impl Future<Output = io::Result<()>> + Send + 'a {
        self.send_all(data)
    }

    fn send_urgent<'a>(
        &'a mut self,
        data: &'a [u8],
    ) -> impl Future<Output = io::Result<UrgentDelivery>> + Send + 'a {
        async move {
            if self.has_urgent_channel() {
                self.write_urgent(data).await?;
                Ok(UrgentDelivery::Expedited)
            } else {
                self.send_all(data).await?;
                Ok(UrgentDelivery::Inline)
            }
        }
    }

    fn close(&mut self) -> impl Future<Output = ()> + Send + '_ {
        let _ = self.shutdown(Shutdown::Both);
        std::future::ready(())
    }
}

impl AsyncRead for Socket {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            let mut guard = ready!(self.inner.poll_read_ready(cx))?;
            let unfilled = buf.initialize_unfilled();
            match guard.try_io(|inner| inner.get_ref().read(unfilled)) {
                Ok(Ok(len)) => {
                    buf.advance(len);
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => continue,
                Ok(Err(e)) => return Poll::Ready(Err(e)),
                Err(_would_block) => continue,
            }
        }
    }
}

impl AsyncWrite for Socket {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        loop {
            let mut guard = ready!(self.inner.poll_write_ready(cx))?;
            match guard.try_io(|inner| inner.get_ref().write(buf)) {
                Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => continue,
                Ok(result) => return Poll::Ready(result),
                Err(_would_block) => continue,
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(self.inner.get_ref().shutdown(Shutdown::Write))
    }
}
