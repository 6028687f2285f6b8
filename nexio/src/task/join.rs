// Copyright (c) 2026 nexio contributors. Licensed under Apache License, Version 2.0.

use crate::error::Error;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, Waker};

pub(crate) struct Shared<T> {
    result: Mutex<Option<std::result::Result<T, Error>>>,
    waker: Mutex<Option<Waker>>,
}

impl<T> Shared<T> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            result: Mutex::new(None),
            waker: Mutex::new(None),
        })
    }

    pub(crate) fn complete(&self, value: std::result::Result<T, Error>) {
        *self.result.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
        if let Some(waker) = self.waker.lock().unwrap_or_else(PoisonError::into_inner).take() {
            waker.wake();
        }
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        let mut result = self.result.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(Err(Error::TaskPanicked(message))) = result.take() {
            tracing::error!(panic = %message, "a spawned task panicked and its JoinTask was dropped without observing the result");
        }
    }
}

/// Type-erased completion hook a [`super::header::TaskHeader`] uses to deliver a
/// caught panic to the [`JoinTask`] without needing to know its output type.
pub(crate) trait Completable: Send + Sync {
    fn complete_with_panic(&self, message: String);
}

impl<T: Send> Completable for Shared<T> {
    fn complete_with_panic(&self, message: String) {
        self.complete(Err(Error::TaskPanicked(message)));
    }
}

/// A handle to a task started with [`spawn`](super::spawn) or [`run_on`](super::run_on),
/// resolving to the task's output, or [`Error::TaskPanicked`] if it panicked instead
/// of completing normally.
pub struct JoinTask<T> {
    shared: Arc<Shared<T>>,
    consumed: bool,
}

impl<T> JoinTask<T> {
    pub(crate) fn new(shared: Arc<Shared<T>>) -> Self {
        Self { shared, consumed: false }
    }
}

impl<T> Future for JoinTask<T> {
    type Output = std::result::Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        assert!(!this.consumed, "JoinTask polled after completion");
        let mut result = this.shared.result.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(value) = result.take() {
            drop(result);
            this.consumed = true;
            Poll::Ready(value)
        } else {
            drop(result);
            *this.shared.waker.lock().unwrap_or_else(PoisonError::into_inner) = Some(cx.waker().clone());
            Poll::Pending
        }
    }
}

impl<T> std::fmt::Debug for JoinTask<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinTask").finish_non_exhaustive()
    }
}
