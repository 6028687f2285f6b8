// Copyright (c) 2026 nexio contributors. Licensed under Apache License, Version 2.0.

use crate::context::Dispatcher;
use crate::error::{Error, Result};
use crate::stop_token::{clear_stop_registration, CallbackHandle, StopToken};
use mio::{Interest, Token};
use std::future::Future;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A connected TCP socket driven by a context's reactor.
///
/// `read_some`/`write_some` are single-attempt operations (like the POSIX calls they
/// wrap): they may complete for fewer bytes than requested. Use [`super::read_exact`]
/// and [`super::write_all`] for the "keep going until done" versions.
pub struct Stream {
    dispatcher: Dispatcher,
    io: mio::net::TcpStream,
    token: Token,
}

impl Stream {
    /// Begins connecting to `addr`. Resolves once the connection completes or fails;
    /// does not resolve early on a merely-in-progress connect.
    ///
    /// # Errors
    ///
    /// Returns the OS error reported for the failed connection attempt.
    pub async fn connect(dispatcher: &Dispatcher, addr: SocketAddr) -> Result<Self> {
        let mut io = mio::net::TcpStream::connect(addr)?;
        let token = dispatcher.reactor().alloc_token();
        dispatcher.reactor().register(&mut io, token, Interest::READABLE | Interest::WRITABLE)?;
        let stream = Self {
            dispatcher: dispatcher.clone(),
            io,
            token,
        };
        Connecting { stream: &stream, registered: false }.await?;
        Ok(stream)
    }

    /// Wraps an already-connected `mio` socket, registering it with `dispatcher`'s
    /// reactor. Used by [`super::Listener::accept`].
    pub(crate) fn from_mio(dispatcher: &Dispatcher, mut io: mio::net::TcpStream) -> Result<Self> {
        let token = dispatcher.reactor().alloc_token();
        dispatcher.reactor().register(&mut io, token, Interest::READABLE | Interest::WRITABLE)?;
        Ok(Self {
            dispatcher: dispatcher.clone(),
            io,
            token,
        })
    }

    /// The local address this socket is bound to.
    ///
    /// # Errors
    ///
    /// Returns the OS error from the underlying `getsockname` call.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.io.local_addr()?)
    }

    /// The address of the remote peer.
    ///
    /// # Errors
    ///
    /// Returns the OS error from the underlying `getpeername` call.
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.io.peer_addr()?)
    }

    /// Reads at most `buf.len()` bytes, returning the number actually read (`0` means
    /// the peer closed the write half of the connection).
    #[must_use]
    pub fn read_some<'a>(&'a mut self, buf: &'a mut [u8]) -> ReadSome<'a> {
        ReadSome { stream: self, buf, stop: None, stop_handle: None }
    }

    /// Writes at most `buf.len()` bytes, returning the number actually written.
    #[must_use]
    pub fn write_some<'a>(&'a mut self, buf: &'a [u8]) -> WriteSome<'a> {
        WriteSome { stream: self, buf, stop: None, stop_handle: None }
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        let _ = self.dispatcher.reactor().deregister(&mut self.io, self.token);
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream").field("peer_addr", &self.io.peer_addr().ok()).finish_non_exhaustive()
    }
}

struct Connecting<'a> {
    stream: &'a Stream,
    registered: bool,
}

impl Future for Connecting<'_> {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.registered {
            return match self.stream.io.take_error() {
                Ok(None) => Poll::Ready(Ok(())),
                Ok(Some(e)) => Poll::Ready(Err(Error::from(e))),
                Err(e) => Poll::Ready(Err(Error::from(e))),
            };
        }
        self.registered = true;
        self.stream.dispatcher.reactor().set_write_waker(self.stream.token, cx.waker().clone());
        Poll::Pending
    }
}

/// Future returned by [`Stream::read_some`].
pub struct ReadSome<'a> {
    stream: &'a mut Stream,
    buf: &'a mut [u8],
    stop: Option<StopToken>,
    stop_handle: Option<CallbackHandle>,
}

impl<'a> ReadSome<'a> {
    /// Makes the read resolve with [`Error::Canceled`] as soon as `stop` fires,
    /// rather than only the next time the socket happens to become readable.
    #[must_use]
    pub fn with_stop(mut self, stop: StopToken) -> Self {
        self.stop = Some(stop);
        self
    }
}

impl Future for ReadSome<'_> {
    type Output = Result<usize>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(stop) = &this.stop {
            if stop.is_stopped() {
                return Poll::Ready(Err(Error::Canceled));
            }
            if this.stop_handle.is_none() {
                let waker = cx.waker().clone();
                this.stop_handle = Some(stop.register(move || waker.wake()));
            }
        }
        match this.stream.io.read(this.buf) {
            Ok(0) => {
                clear_stop_registration(&this.stop, &mut this.stop_handle);
                tracing::trace!(token = this.stream.token.0, "read_some observed eof");
                Poll::Ready(Err(Error::Eof))
            }
            Ok(n) => {
                clear_stop_registration(&this.stop, &mut this.stop_handle);
                Poll::Ready(Ok(n))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                this.stream.dispatcher.reactor().set_read_waker(this.stream.token, cx.waker().clone());
                Poll::Pending
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                cx.waker().wake_by_ref();
                Poll::Pending
            }
            Err(e) => {
                clear_stop_registration(&this.stop, &mut this.stop_handle);
                Poll::Ready(Err(Error::from(e)))
            }
        }
    }
}

/// Future returned by [`Stream::write_some`].
pub struct WriteSome<'a> {
    stream: &'a mut Stream,
    buf: &'a [u8],
    stop: Option<StopToken>,
    stop_handle: Option<CallbackHandle>,
}

impl<'a> WriteSome<'a> {
    /// Makes the write resolve with [`Error::Canceled`] as soon as `stop` fires,
    /// rather than only the next time the socket happens to become writable.
    #[must_use]
    pub fn with_stop(mut self, stop: StopToken) -> Self {
        self.stop = Some(stop);
        self
    }
}

impl Future for WriteSome<'_> {
    type Output = Result<usize>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(stop) = &this.stop {
            if stop.is_stopped() {
                return Poll::Ready(Err(Error::Canceled));
            }
            if this.stop_handle.is_none() {
                let waker = cx.waker().clone();
                this.stop_handle = Some(stop.register(move || waker.wake()));
            }
        }
        match this.stream.io.write(this.buf) {
            Ok(n) => {
                clear_stop_registration(&this.stop, &mut this.stop_handle);
                Poll::Ready(Ok(n))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                this.stream.dispatcher.reactor().set_write_waker(this.stream.token, cx.waker().clone());
                Poll::Pending
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                cx.waker().wake_by_ref();
                Poll::Pending
            }
            Err(e) => {
                clear_stop_registration(&this.stop, &mut this.stop_handle);
                Poll::Ready(Err(Error::from(e)))
            }
        }
    }
}
