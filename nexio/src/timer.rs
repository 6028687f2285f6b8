// Copyright (c) 2026 nexio contributors. Licensed under Apache License, Version 2.0.

//! A timer service backed by a min-heap keyed on absolute deadline, and the
//! [`Timer`] endpoint that waits on one entry in it.

use crate::context::Dispatcher;
use crate::error::{Error, Result};
use crate::stop_token::{clear_stop_registration, CallbackHandle, StopToken};
use rustc_hash::FxHashMap;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

struct Slot {
    deadline: Instant,
    waker: Option<Waker>,
    cancelled: bool,
}

/// Context [`Service`] that owns the min-heap of armed timers.
///
/// Cancelled or superseded heap entries are left in place and skipped lazily when
/// popped (a `BinaryHeap` has no `decrease-key`/remove-in-place operation without
/// hand-rolling the heap, and the extra stale entries cost O(log n) to skip past,
/// not O(n)), rather than maintaining an explicit `heap_index` back-pointer per
/// entry.
pub struct TimerService {
    heap: Mutex<BinaryHeap<Reverse<(Instant, u64)>>>,
    slots: Mutex<FxHashMap<u64, Slot>>,
    next_id: AtomicU64,
}

impl Default for TimerService {
    fn default() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            slots: Mutex::new(FxHashMap::default()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl TimerService {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn alloc_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn arm(&self, id: u64, deadline: Instant) {
        let existing_waker = {
            let mut slots = self.slots.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let waker = slots.get_mut(&id).and_then(|s| s.waker.take());
            slots.insert(
                id,
                Slot {
                    deadline,
                    waker: waker.clone(),
                    cancelled: false,
                },
            );
            waker
        };
        let _ = existing_waker;
        self.heap.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(Reverse((deadline, id)));
    }

    fn cancel(&self, id: u64) {
        let mut slots = self.slots.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(slot) = slots.get_mut(&id) {
            slot.cancelled = true;
            if let Some(waker) = slot.waker.take() {
                waker.wake();
            }
        }
    }

    /// Returns the deadline of the earliest still-live timer, if any. Used by the
    /// run loop to bound how long it blocks in `mio::Poll::poll`.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        let mut heap = self.heap.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let slots = self.slots.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        loop {
            let &Reverse((deadline, id)) = heap.peek()?;
            match slots.get(&id) {
                Some(slot) if slot.deadline == deadline && !slot.cancelled => return Some(deadline),
                _ => {
                    heap.pop();
                }
            }
        }
    }

    /// Pops and wakes every timer whose deadline has passed as of `now`.
    pub(crate) fn process_expired(&self, now: Instant) {
        let mut heap = self.heap.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut slots = self.slots.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        loop {
            let Some(&Reverse((deadline, id))) = heap.peek() else {
                break;
            };
            if deadline > now {
                break;
            }
            heap.pop();
            let is_live = matches!(slots.get(&id), Some(slot) if slot.deadline == deadline);
            if is_live {
                if let Some(slot) = slots.remove(&id) {
                    if !slot.cancelled {
                        if let Some(waker) = slot.waker {
                            tracing::trace!(timer_id = id, "timer deadline elapsed");
                            waker.wake();
                        }
                    }
                }
            }
            // else: a stale heap entry left behind by a rearm; the live slot (if
            // any) keeps its own, later, heap entry and is untouched here.
        }
    }
}

/// A single-shot deadline timer. Cheap to create; armed with
/// [`expires_at`](Timer::expires_at) or [`expires_after`](Timer::expires_after) and
/// observed with [`wait`](Timer::wait).
#[derive(Debug, Clone)]
pub struct Timer {
    dispatcher: Dispatcher,
    id: u64,
}

impl Timer {
    /// Creates an unarmed timer. Call [`expires_at`](Self::expires_at) or
    /// [`expires_after`](Self::expires_after) before [`wait`](Self::wait)ing on it.
    #[must_use]
    pub fn new(dispatcher: &Dispatcher) -> Self {
        let service = dispatcher_timers(dispatcher);
        Self {
            dispatcher: dispatcher.clone(),
            id: service.alloc_id(),
        }
    }

    /// Arms (or re-arms) the timer to expire at `deadline`, replacing any
    /// previously set deadline. A waiter already suspended on [`wait`](Self::wait)
    /// keeps waiting, now for the new deadline.
    pub fn expires_at(&self, deadline: Instant) {
        dispatcher_timers(&self.dispatcher).arm(self.id, deadline);
    }

    /// Equivalent to `self.expires_at(Instant::now() + duration)`.
    pub fn expires_after(&self, duration: Duration) {
        self.expires_at(Instant::now() + duration);
    }

    /// Cancels the timer. Any in-flight [`wait`](Self::wait) resolves immediately
    /// with [`Error::Canceled`]. A no-op if the timer was never armed or already
    /// fired.
    pub fn cancel(&self) {
        dispatcher_timers(&self.dispatcher).cancel(self.id);
    }

    /// Awaits the timer's armed deadline. Must be called after arming the timer at
    /// least once; waiting on a never-armed timer resolves immediately.
    #[must_use]
    pub fn wait(&self) -> Wait<'_> {
        Wait {
            timer: self,
            stop: None,
            stop_handle: None,
        }
    }
}

/// Future returned by [`Timer::wait`].
#[derive(Debug)]
pub struct Wait<'a> {
    timer: &'a Timer,
    stop: Option<StopToken>,
    stop_handle: Option<CallbackHandle>,
}

impl<'a> Wait<'a> {
    /// Makes the wait resolve with [`Error::Canceled`] as soon as `stop` fires,
    /// independent of the timer's own deadline.
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
        let service = dispatcher_timers(&this.timer.dispatcher);
        let mut slots = service.slots.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match slots.get_mut(&this.timer.id) {
            None => {
                drop(slots);
                clear_stop_registration(&this.stop, &mut this.stop_handle);
                Poll::Ready(Ok(()))
            }
            Some(slot) if slot.cancelled => {
                slots.remove(&this.timer.id);
                drop(slots);
                clear_stop_registration(&this.stop, &mut this.stop_handle);
                Poll::Ready(Err(Error::Canceled))
            }
            Some(slot) => {
                slot.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

fn dispatcher_timers(dispatcher: &Dispatcher) -> &TimerService {
    dispatcher.timers()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Config, ExecutionContext};
    use std::time::Duration;

    #[test]
    fn timers_fire_in_deadline_order() {
        let ctx = ExecutionContext::new(Config::default());
        let dispatcher = ctx.dispatcher();
        let service = dispatcher_timers(&dispatcher);
        let now = Instant::now();
        service.arm(1, now + Duration::from_millis(20));
        service.arm(2, now + Duration::from_millis(10));
        assert_eq!(service.next_deadline(), Some(now + Duration::from_millis(10)));
        service.process_expired(now + Duration::from_millis(15));
        assert_eq!(service.next_deadline(), Some(now + Duration::from_millis(20)));
    }

    #[test]
    fn cancel_before_wait_is_observed() {
        let ctx = ExecutionContext::new(Config::default());
        let dispatcher = ctx.dispatcher();
        let timer = Timer::new(&dispatcher);
        timer.expires_after(Duration::from_secs(60));
        timer.cancel();
        let waker = futures_noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut wait = timer.wait();
        match Pin::new(&mut wait).poll(&mut cx) {
            Poll::Ready(Err(Error::Canceled)) => {}
            other => panic!("expected Canceled, got {other:?}"),
        }
    }

    fn futures_noop_waker() -> Waker {
        use std::task::{RawWaker, RawWakerVTable};
        fn no_op(_: *const ()) {}
        fn clone(_: *const ()) -> RawWaker {
            RawWaker::new(std::ptr::null(), &VTABLE)
        }
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
        unsafe { Waker::from_raw(RawWaker::new(std::ptr::null(), &VTABLE)) }
    }
}
