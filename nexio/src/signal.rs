// Copyright (c) 2026 nexio contributors. Licensed under Apache License, Version 2.0.

//! Process-wide signal delivery. Signals aren't file descriptors owned by any one
//! [`ExecutionContext`](crate::context::ExecutionContext) - a `SIGINT` is delivered to
//! the process, not to a reactor - so this module keeps its own singleton registry and
//! a dedicated OS thread, independent of any context's reactor, and routes delivery to
//! waiters through their own [`Dispatcher`]s.

use crate::context::{Dispatcher, Runnable};
use crate::error::{Error, Result};
use crate::stop_token::{clear_stop_registration, CallbackHandle, StopToken};
use rustc_hash::FxHashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::task::{Context, Poll, Waker};

struct Waiter {
    dispatcher: Dispatcher,
    waker: Waker,
}

#[derive(Default)]
struct SignalRegistry {
    waiters: FxHashMap<i32, Vec<Waiter>>,
    pending: FxHashMap<i32, bool>,
}

static REGISTRY: OnceLock<Mutex<SignalRegistry>> = OnceLock::new();
static THREAD_STARTED: OnceLock<()> = OnceLock::new();

fn registry() -> &'static Mutex<SignalRegistry> {
    REGISTRY.get_or_init(|| Mutex::new(SignalRegistry::default()))
}

#[cfg(unix)]
fn ensure_delivery_thread() {
    THREAD_STARTED.get_or_init(|| {
        std::thread::Builder::new()
            .name("nexio-signal".into())
            .spawn(delivery_loop)
            .expect("failed to spawn signal delivery thread");
    });
}

#[cfg(unix)]
fn delivery_loop() {
    use signal_hook::iterator::Signals;
    // Re-registering the same signal number from a second `SignalWait` just adds a
    // waiter to the existing entry; the OS-level hook for a given number is installed
    // exactly once, the first time it is seen.
    let mut known: Vec<i32> = Vec::new();
    let mut signals: Option<Signals> = None;
    loop {
        let wanted = registry().lock().unwrap_or_else(std::sync::PoisonError::into_inner).waiters.keys().copied().collect::<Vec<_>>();
        let mut new_numbers: Vec<i32> = wanted.iter().filter(|n| !known.contains(n)).copied().collect();
        if !new_numbers.is_empty() || signals.is_none() {
            known.append(&mut new_numbers);
            if known.is_empty() {
                std::thread::sleep(std::time::Duration::from_millis(50));
                continue;
            }
            signals = Signals::new(&known).ok();
        }
        let Some(sigs) = signals.as_mut() else {
            std::thread::sleep(std::time::Duration::from_millis(50));
            continue;
        };
        for signum in sigs.pending() {
            deliver(signum);
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
}

#[cfg(not(unix))]
fn ensure_delivery_thread() {}

fn deliver(signum: i32) {
    tracing::debug!(signum, "delivering signal");
    let mut reg = registry().lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    let waiters = reg.waiters.remove(&signum).unwrap_or_default();
    if waiters.is_empty() {
        reg.pending.insert(signum, true);
    }
    drop(reg);
    for waiter in waiters {
        let waker = waiter.waker;
        waiter.dispatcher.dispatch(Runnable::new(move || waker.wake()));
    }
}

/// An awaitable that resolves the next time the process receives a particular signal.
///
/// Cheap to create; one `SignalWait` can be awaited repeatedly, each call observing the
/// next occurrence of the signal after the previous one resolved.
#[derive(Debug, Clone)]
pub struct SignalWait {
    dispatcher: Dispatcher,
    signum: i32,
    cleared: Arc<AtomicBool>,
}

impl SignalWait {
    /// Begins watching for `signum` (one of the `signal_hook::consts::SIG*` constants
    /// on unix; unsupported on other platforms, see module docs).
    #[must_use]
    pub fn new(dispatcher: &Dispatcher, signum: i32) -> Self {
        ensure_delivery_thread();
        Self {
            dispatcher: dispatcher.clone(),
            signum,
            cleared: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Stops watching. A wait already suspended in [`Wait::poll`] is woken and
    /// resolves with [`Error::Canceled`] rather than being left to hang forever; no
    /// further deliveries are observed after that.
    pub fn cancel(&self) {
        self.cleared.store(true, Ordering::Release);
        let mut reg = registry().lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let removed = if let Some(list) = reg.waiters.get_mut(&self.signum) {
            let (stay, gone): (Vec<_>, Vec<_>) =
                std::mem::take(list).into_iter().partition(|w| !Arc::ptr_eq(&self.dispatcher.inner, &w.dispatcher.inner));
            *list = stay;
            gone
        } else {
            Vec::new()
        };
        drop(reg);
        for waiter in removed {
            tracing::trace!("waking signal waiter for canceled watch");
            waiter.waker.wake();
        }
    }

    /// Awaits the next delivery of this signal.
    #[must_use]
    pub fn wait(&self) -> Wait<'_> {
        Wait {
            watch: self,
            stop: None,
            stop_handle: None,
        }
    }
}

/// Future returned by [`SignalWait::wait`].
#[derive(Debug)]
pub struct Wait<'a> {
    watch: &'a SignalWait,
    stop: Option<StopToken>,
    stop_handle: Option<CallbackHandle>,
}

impl<'a> Wait<'a> {
    /// Makes the wait resolve with [`Error::Canceled`] as soon as `stop` fires.
    #[must_use]
    pub fn with_stop(mut self, stop: StopToken) -> Self {
        self.stop = Some(stop);
        self
    }
}

impl Future for Wait<'_> {
    type Output = Result<()>;

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
        if this.watch.cleared.load(Ordering::Acquire) {
            clear_stop_registration(&this.stop, &mut this.stop_handle);
            return Poll::Ready(Err(Error::Canceled));
        }
        let mut reg = registry().lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(was_pending) = reg.pending.get_mut(&this.watch.signum) {
            if *was_pending {
                *was_pending = false;
                drop(reg);
                clear_stop_registration(&this.stop, &mut this.stop_handle);
                tracing::trace!(signum = this.watch.signum, "signal wait resolved from pending delivery");
                return Poll::Ready(Ok(()));
            }
        }
        reg.waiters.entry(this.watch.signum).or_default().push(Waiter {
            dispatcher: this.watch.dispatcher.clone(),
            waker: cx.waker().clone(),
        });
        Poll::Pending
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::context::{Config, ExecutionContext};

    #[test]
    fn cancel_before_delivery_resolves_canceled() {
        let ctx = ExecutionContext::new(Config::default());
        let dispatcher = ctx.dispatcher();
        let watch = SignalWait::new(&dispatcher, signal_hook::consts::SIGUSR1);
        watch.cancel();
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut wait = watch.wait();
        assert!(matches!(Pin::new(&mut wait).poll(&mut cx), Poll::Ready(Err(Error::Canceled))));
    }

    fn noop_waker() -> Waker {
        use std::task::{RawWaker, RawWakerVTable};
        fn no_op(_: *const ()) {}
        fn clone(_: *const ()) -> RawWaker {
            RawWaker::new(std::ptr::null(), &VTABLE)
        }
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
        unsafe { Waker::from_raw(RawWaker::new(std::ptr::null(), &VTABLE)) }
    }
}
