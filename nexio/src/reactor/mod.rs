// Copyright (c) 2026 nexio contributors. Licensed under Apache License, Version 2.0.

//! The portable readiness reactor. Built directly on `mio::Poll`, which itself
//! multiplexes to epoll (Linux), kqueue (macOS), and the IOCP-backed poller
//! (Windows) - this crate's reactor code is platform-neutral because that fan-out
//! happens one layer down, inside `mio`.

use mio::{Events, Interest, Token};
use rustc_hash::FxHashMap;
use std::io;
use std::sync::Mutex;
use std::task::Waker;
use std::time::Duration;

/// The token the cross-thread wakeup source (`mio::Waker`) is registered at. Real
/// I/O registrations start at [`Reactor::alloc_token`], which begins at 1.
const WAKE_TOKEN: Token = Token(0);

/// Which kind of completion a dispatch pass is routing. Every readiness event (or
/// timer expiry) `poll_once` observes is classified into one of these and dispatched
/// through a single match, rather than compared ad hoc at each call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionKey {
    /// An I/O readiness event at this token; look up its registered read/write
    /// wakers.
    Io(Token),
    /// The cross-thread wakeup (`mio::Waker`) fired; the fallback queue has new
    /// work.
    Wake,
    /// The timer service's next deadline elapsed, or `poll_once`'s timeout (computed
    /// from that deadline) ran out waiting for it; check for expired timers.
    Timer,
}

#[derive(Default)]
struct Registration {
    read_waker: Option<Waker>,
    write_waker: Option<Waker>,
}

/// Result of one pass through [`Reactor::poll_once`]: the completions observed,
/// classified by [`CompletionKey`], and the set of task wakers that are now ready to
/// be invoked.
pub(crate) struct PollOutcome {
    pub(crate) keys: Vec<CompletionKey>,
    pub(crate) wakers: Vec<Waker>,
}

/// Owns the `mio::Poll` instance, the registry used to (de)register I/O sources,
/// and the per-token waker bookkeeping that lets [`super::context::ContextInner`]
/// turn a readiness event into a task resumption.
pub(crate) struct Reactor {
    poll: Mutex<mio::Poll>,
    registry: mio::Registry,
    waker: mio::Waker,
    next_token: std::sync::atomic::AtomicUsize,
    registrations: Mutex<FxHashMap<Token, Registration>>,
}

impl Reactor {
    pub(crate) fn new() -> io::Result<Self> {
        let poll = mio::Poll::new()?;
        let registry = poll.registry().try_clone()?;
        let waker = mio::Waker::new(&registry, WAKE_TOKEN)?;
        Ok(Self {
            poll: Mutex::new(poll),
            registry,
            waker,
            next_token: std::sync::atomic::AtomicUsize::new(1),
            registrations: Mutex::new(FxHashMap::default()),
        })
    }

    /// Allocates a fresh token for a new I/O source. Tokens are never reused within
    /// a process's lifetime, so a stale readiness event can never be mistaken for a
    /// different, newer registration.
    pub(crate) fn alloc_token(&self) -> Token {
        Token(self.next_token.fetch_add(1, std::sync::atomic::Ordering::Relaxed))
    }

    pub(crate) fn register(
        &self,
        source: &mut impl mio::event::Source,
        token: Token,
        interest: Interest,
    ) -> io::Result<()> {
        self.registry.register(source, token, interest)?;
        self.registrations.lock().unwrap_or_else(std::sync::PoisonError::into_inner).insert(token, Registration::default());
        tracing::trace!(token = token.0, ?interest, "registered reactor source");
        Ok(())
    }

    pub(crate) fn deregister(&self, source: &mut impl mio::event::Source, token: Token) -> io::Result<()> {
        self.registrations.lock().unwrap_or_else(std::sync::PoisonError::into_inner).remove(&token);
        tracing::trace!(token = token.0, "deregistered reactor source");
        self.registry.deregister(source)
    }

    pub(crate) fn set_read_waker(&self, token: Token, waker: Waker) {
        let mut regs = self.registrations.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(reg) = regs.get_mut(&token) {
            reg.read_waker = Some(waker);
        }
    }

    pub(crate) fn set_write_waker(&self, token: Token, waker: Waker) {
        let mut regs = self.registrations.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(reg) = regs.get_mut(&token) {
            reg.write_waker = Some(waker);
        }
    }

    /// Wakes any thread currently blocked inside [`Reactor::poll_once`]. Coalesces:
    /// any number of calls between two `poll_once` invocations cost at most one
    /// extra wakeup.
    pub(crate) fn wake(&self) -> io::Result<()> {
        self.waker.wake()
    }

    /// Blocks for up to `timeout` (or indefinitely if `None`) waiting for readiness
    /// events, then drains the wakers registered for whichever tokens became ready.
    pub(crate) fn poll_once(&self, timeout: Option<Duration>) -> io::Result<PollOutcome> {
        tracing::trace!(?timeout, "reactor poll_once: blocking for readiness");
        let mut events = Events::with_capacity(256);
        {
            let mut poll = self.poll.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            match poll.poll(&mut events, timeout) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    tracing::trace!("reactor poll_once: interrupted, returning empty outcome");
                    return Ok(PollOutcome {
                        keys: Vec::new(),
                        wakers: Vec::new(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        let mut keys = Vec::new();
        let mut ready = Vec::new();
        for event in &events {
            let key = if event.token() == WAKE_TOKEN {
                CompletionKey::Wake
            } else {
                CompletionKey::Io(event.token())
            };
            if let CompletionKey::Io(token) = key {
                ready.push((token, event.is_readable(), event.is_writable()));
            }
            keys.push(key);
        }

        let mut wakers = Vec::new();
        if !ready.is_empty() {
            let mut regs = self.registrations.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            for (token, readable, writable) in ready {
                if let Some(reg) = regs.get_mut(&token) {
                    if readable {
                        if let Some(w) = reg.read_waker.take() {
                            wakers.push(w);
                        }
                    }
                    if writable {
                        if let Some(w) = reg.write_waker.take() {
                            wakers.push(w);
                        }
                    }
                }
            }
        }

        tracing::trace!(keys = keys.len(), wakers = wakers.len(), "reactor poll_once: dispatching completions");
        Ok(PollOutcome { keys, wakers })
    }
}
