// Copyright (c) 2026 nexio contributors. Licensed under Apache License, Version 2.0.

use super::Stream;
use crate::context::Dispatcher;
use crate::error::{Error, Result};
use crate::stop_token::{clear_stop_registration, CallbackHandle, StopToken};
use mio::{Interest, Token};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A bound, listening TCP socket.
pub struct Listener {
    dispatcher: Dispatcher,
    io: mio::net::TcpListener,
    token: Token,
}

impl Listener {
    /// Binds and starts listening on `addr`.
    ///
    /// # Errors
    ///
    /// Returns the OS error from the underlying `bind`/`listen` calls.
    pub fn bind(dispatcher: &Dispatcher, addr: SocketAddr) -> Result<Self> {
        let mut io = mio::net::TcpListener::bind(addr)?;
        let token = dispatcher.reactor().alloc_token();
        dispatcher.reactor().register(&mut io, token, Interest::READABLE)?;
        Ok(Self {
            dispatcher: dispatcher.clone(),
            io,
            token,
        })
    }

    /// The address this listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns the OS error from the underlying `getsockname` call.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.io.local_addr()?)
    }

    /// Accepts the next incoming connection.
    #[must_use]
    pub fn accept(&self) -> Accept<'_> {
        Accept {
            listener: self,
            stop: None,
            stop_handle: None,
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        let _ = self.dispatcher.reactor().deregister(&mut self.io, self.token);
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener").field("local_addr", &self.io.local_addr().ok()).finish_non_exhaustive()
    }
}

/// Future returned by [`Listener::accept`].
pub struct Accept<'a> {
    listener: &'a Listener,
    stop: Option<StopToken>,
    stop_handle: Option<CallbackHandle>,
}

impl<'a> Accept<'a> {
    /// Makes the accept resolve with [`Error::Canceled`] as soon as `stop` fires.
    #[must_use]
    pub fn with_stop(mut self, stop: StopToken) -> Self {
        self.stop = Some(stop);
        self
    }
}

impl Future for Accept<'_> {
    type Output = Result<(Stream, SocketAddr)>;

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
        match this.listener.io.accept() {
            Ok((io, peer)) => {
                clear_stop_registration(&this.stop, &mut this.stop_handle);
                match Stream::from_mio(&this.listener.dispatcher, io) {
                    Ok(stream) => {
                        tracing::trace!(?peer, "accepted connection");
                        Poll::Ready(Ok((stream, peer)))
                    }
                    Err(e) => Poll::Ready(Err(e)),
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                this.listener.dispatcher.reactor().set_read_waker(this.listener.token, cx.waker().clone());
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
