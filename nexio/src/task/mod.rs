// Copyright (c) 2026 nexio contributors. Licensed under Apache License, Version 2.0.

//! Tasks: the unit of concurrency this crate schedules.
//!
//! A [`Task`] is a plain `Future` wrapper - there is no separate coroutine ABI to
//! resume, because `std::future::Future` already gives us a stackless, suspend/resume
//! state machine for free. What this module adds on top is the piece `Future` alone
//! doesn't specify: how a [`Waker::wake`] call gets routed back through a
//! [`Dispatcher`](crate::context::Dispatcher) so a woken task resumes on the right
//! context instead of wherever the wakeup happened to originate. [`spawn`] and
//! [`run_on`] build that waker once, via [`header::TaskHeader`], and every
//! subsequent `.await` inside the spawned future reuses it.

mod any_dispatcher;
mod header;
mod join;

pub use any_dispatcher::AnyDispatcher;
pub use crate::context::Dispatcher;
pub use join::JoinTask;

use header::TaskHeader;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A future that hasn't been handed to a dispatcher yet.
///
/// Polling a bare `Task` directly (for example with `.await` inside another task)
/// runs it on whatever waker is already driving the caller - it does not get its own
/// dispatcher-aware waker until it is [`spawn`]ed or [`run_on`] is used to start it.
/// This is the right choice for "just a sub-step of the thing I'm already running",
/// and the wrong choice for "run this independently and let me check on it later" -
/// use [`spawn`] for the latter.
#[derive(Debug)]
pub struct Task<F> {
    inner: F,
}

impl<F: Future> Task<F> {
    /// Wraps `inner` without doing anything else; it only begins making progress once
    /// it is polled (directly, or by being spawned).
    pub fn new(inner: F) -> Self {
        Self { inner }
    }
}

impl<F: Future> Future for Task<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // SAFETY: `inner` is never moved out of `self` while pinned; this is the
        // standard pin-projection for a single-field wrapper.
        unsafe { self.map_unchecked_mut(|s| &mut s.inner) }.poll(cx)
    }
}

/// Starts running `future` on `dispatcher` immediately (it is polled once before
/// `spawn` returns control to the caller) and returns a handle that resolves to its
/// output once it completes.
///
/// Dropping the returned [`JoinTask`] does not cancel the spawned future; it keeps
/// running to completion and its result is simply discarded. Pair the spawn with a
/// [`StopToken`](crate::stop_token::StopToken) if the future should be cancellable.
pub fn spawn<F>(dispatcher: &Dispatcher, future: F) -> JoinTask<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    run_on(dispatcher, Task::new(future))
}

/// Like [`spawn`], but takes an already-constructed [`Task`].
pub fn run_on<F>(dispatcher: &Dispatcher, task: Task<F>) -> JoinTask<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let (join, header) = TaskHeader::new(dispatcher.clone(), task);
    header.schedule();
    join
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Config, ExecutionContext};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc as StdArc, Mutex};

    #[test]
    fn spawned_task_result_is_observed_by_join() {
        let ctx = ExecutionContext::new(Config::default());
        let dispatcher = ctx.dispatcher();
        let join = spawn(&dispatcher, async { 1 + 1 });
        let result = StdArc::new(AtomicUsize::new(0));
        let result_for_task = result.clone();
        spawn(&dispatcher, async move {
            let value = join.await.expect("task should not panic");
            result_for_task.store(value, Ordering::Release);
        });
        ctx.run();
        assert_eq!(result.load(Ordering::Acquire), 2);
    }

    #[test]
    fn panicking_task_delivers_task_panicked_to_its_join() {
        let ctx = ExecutionContext::new(Config::default());
        let dispatcher = ctx.dispatcher();
        let outcome = StdArc::new(Mutex::new(None));
        let outcome_for_task = outcome.clone();
        let join = spawn(&dispatcher, async { panic!("boom") });
        spawn(&dispatcher, async move {
            *outcome_for_task.lock().unwrap() = Some(join.await);
        });
        ctx.run();
        let result = outcome.lock().unwrap().take().expect("join task did not finish");
        match result {
            Err(crate::error::Error::TaskPanicked(message)) => assert!(message.contains("boom")),
            other => panic!("expected TaskPanicked, got {other:?}"),
        }
    }

    #[test]
    #[should_panic(expected = "JoinTask polled after completion")]
    fn polling_a_join_task_again_after_completion_panics() {
        let ctx = ExecutionContext::new(Config::default());
        let dispatcher = ctx.dispatcher();
        let join = spawn(&dispatcher, async { 1 });
        ctx.run();

        let waker = futures_noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut join = join;
        let pinned = std::pin::Pin::new(&mut join);
        match pinned.poll(&mut cx) {
            Poll::Ready(Ok(1)) => {}
            other => panic!("expected the task's result on the first poll, got {other:?}"),
        }
        // Second poll after the result was already taken: must panic, not hang.
        std::pin::Pin::new(&mut join).poll(&mut cx);
    }

    fn futures_noop_waker() -> std::task::Waker {
        use std::task::{RawWaker, RawWakerVTable, Waker};
        fn no_op(_: *const ()) {}
        fn clone(_: *const ()) -> RawWaker {
            RawWaker::new(std::ptr::null(), &VTABLE)
        }
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
        unsafe { Waker::from_raw(RawWaker::new(std::ptr::null(), &VTABLE)) }
    }

    #[test]
    fn run_returns_once_all_spawned_tasks_complete() {
        let ctx = ExecutionContext::new(Config::default());
        let dispatcher = ctx.dispatcher();
        let completed = StdArc::new(AtomicUsize::new(0));
        for _ in 0..4 {
            let completed = completed.clone();
            spawn(&dispatcher, async move {
                completed.fetch_add(1, Ordering::AcqRel);
            });
        }
        ctx.run();
        assert_eq!(completed.load(Ordering::Acquire), 4);
    }
}
