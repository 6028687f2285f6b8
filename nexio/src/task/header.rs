// Copyright (c) 2026 nexio contributors. Licensed under Apache License, Version 2.0.

use super::any_dispatcher::AnyDispatcher;
use super::join::{Completable, JoinTask, Shared};
use super::Task;
use crate::context::{Dispatcher, Runnable};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

/// The scheduling state behind one spawned task: the dispatcher it resumes on, and
/// the boxed future itself. Building the dispatcher-aware [`Waker`] once here (in
/// [`make_waker`]) is what lets an ordinary `cx.waker().wake()` call inside any
/// `.await` point in the future route back through [`Dispatcher::dispatch`], instead
/// of every I/O and timer endpoint having to know about dispatchers itself.
pub(crate) struct TaskHeader {
    dispatcher: Dispatcher,
    future: Mutex<Option<Pin<Box<dyn Future<Output = ()> + Send>>>>,
    completion: Arc<dyn Completable>,
}

impl TaskHeader {
    pub(crate) fn new<F>(dispatcher: Dispatcher, task: Task<F>) -> (JoinTask<F::Output>, Arc<Self>)
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let shared = Shared::new();
        let shared_for_future = shared.clone();
        let wrapped: Pin<Box<dyn Future<Output = ()> + Send>> = Box::pin(async move {
            let value = task.await;
            shared_for_future.complete(Ok(value));
        });
        dispatcher.on_work_started();
        let header = Arc::new(Self {
            dispatcher,
            future: Mutex::new(Some(wrapped)),
            completion: shared.clone(),
        });
        (JoinTask::new(shared), header)
    }

    /// Posts one poll of this task to its dispatcher. Called to kick off the task the
    /// first time, and again every time its waker fires.
    pub(crate) fn schedule(self: Arc<Self>) {
        let header = self.clone();
        self.dispatcher.dispatch(Runnable::new(move || header.poll_once()));
    }

    fn poll_once(self: Arc<Self>) {
        let mut slot = self.future.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(mut fut) = slot.take() else {
            // Already completed (or a stale wakeup raced a completion); nothing to do.
            return;
        };
        drop(slot);
        let waker = make_waker(self.clone());
        let mut cx = Context::from_waker(&waker);
        tracing::trace!("polling task");
        match panic::catch_unwind(AssertUnwindSafe(|| fut.as_mut().poll(&mut cx))) {
            Ok(Poll::Pending) => {
                *self.future.lock().unwrap_or_else(PoisonError::into_inner) = Some(fut);
            }
            Ok(Poll::Ready(())) => {
                tracing::trace!("task completed");
                self.dispatcher.on_work_finished();
            }
            Err(payload) => {
                let message = panic_message(&payload);
                tracing::error!(panic = %message, "task panicked during poll");
                self.completion.complete_with_panic(message);
                self.dispatcher.on_work_finished();
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked with a non-string payload".to_string()
    }
}

fn make_waker(header: Arc<TaskHeader>) -> Waker {
    let dispatcher = AnyDispatcher::new(Arc::into_raw(header).cast::<()>(), &VTABLE);
    // SAFETY: `dispatcher`'s data pointer came from `Arc::into_raw` on a `TaskHeader`
    // one line above, matching what `VTABLE`'s functions expect.
    unsafe { dispatcher.into_waker() }
}

static VTABLE: RawWakerVTable = RawWakerVTable::new(waker_clone, waker_wake, waker_wake_by_ref, waker_drop);

unsafe fn waker_clone(ptr: *const ()) -> RawWaker {
    let arc = unsafe { Arc::from_raw(ptr.cast::<TaskHeader>()) };
    let cloned = arc.clone();
    std::mem::forget(arc);
    RawWaker::new(Arc::into_raw(cloned).cast::<()>(), &VTABLE)
}

unsafe fn waker_wake(ptr: *const ()) {
    let arc = unsafe { Arc::from_raw(ptr.cast::<TaskHeader>()) };
    arc.schedule();
}

unsafe fn waker_wake_by_ref(ptr: *const ()) {
    let arc = unsafe { Arc::from_raw(ptr.cast::<TaskHeader>()) };
    arc.clone().schedule();
    std::mem::forget(arc);
}

unsafe fn waker_drop(ptr: *const ()) {
    let arc = unsafe { Arc::from_raw(ptr.cast::<TaskHeader>()) };
    drop(arc);
}
