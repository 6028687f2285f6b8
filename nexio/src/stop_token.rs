// Copyright (c) 2026 nexio contributors. Licensed under Apache License, Version 2.0.

//! Cooperative cancellation. A [`StopSource`] owns the cancel flag; any number of
//! [`StopToken`]s cloned from it can observe it or register a one-shot callback to
//! run exactly when it fires.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

struct StopState {
    stopped: AtomicBool,
    callbacks: Mutex<Vec<(u64, Box<dyn FnOnce() + Send>)>>,
}

/// Owns the cancellation flag for one or more [`StopToken`]s derived from it.
///
/// Dropping the source does not itself trigger cancellation; call
/// [`StopSource::stop`] explicitly.
#[derive(Clone, Debug)]
pub struct StopSource {
    inner: Arc<StopState>,
}

impl std::fmt::Debug for StopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopState")
            .field("stopped", &self.stopped.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Default for StopSource {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSource {
    /// Creates a fresh, unstopped source.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StopState {
                stopped: AtomicBool::new(false),
                callbacks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Returns a token that observes this source.
    #[must_use]
    pub fn token(&self) -> StopToken {
        StopToken {
            inner: self.inner.clone(),
        }
    }

    /// Requests cancellation. Idempotent: only the first call runs the registered
    /// callbacks, in registration order.
    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let callbacks = std::mem::take(&mut *self.inner.callbacks.lock().unwrap_or_else(|e| e.into_inner()));
        for (_, cb) in callbacks {
            cb();
        }
    }
}

/// A cheap, `Clone`-able handle for observing or reacting to cancellation requested
/// through the [`StopSource`] it was derived from.
#[derive(Clone, Debug)]
pub struct StopToken {
    inner: Arc<StopState>,
}

/// Handle returned by [`StopToken::register`]; pass to [`StopToken::deregister`] to
/// remove the callback before it runs (e.g. because the operation it guarded already
/// completed on its own).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackHandle(u64);

impl StopToken {
    /// A token that can never be stopped. Endpoint methods accept `Option<StopToken>`
    /// but callers that never need cancellation can use this instead of `None` when a
    /// concrete token is required by signature.
    #[must_use]
    pub fn never() -> Self {
        StopSource::new().token()
    }

    /// Returns whether cancellation has already been requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    /// Registers `callback` to run exactly once, either immediately (if already
    /// stopped) or the moment [`StopSource::stop`] is called.
    ///
    /// Returns a handle that can be passed to [`StopToken::deregister`] to cancel the
    /// registration before it fires.
    pub fn register<F>(&self, callback: F) -> CallbackHandle
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_stopped() {
            callback();
            return CallbackHandle(0);
        }
        let mut callbacks = self.inner.callbacks.lock().unwrap_or_else(|e| e.into_inner());
        // Re-check under the lock: `stop()` may have run between the check above and
        // acquiring it.
        if self.inner.stopped.load(Ordering::Acquire) {
            drop(callbacks);
            callback();
            return CallbackHandle(0);
        }
        let id = callbacks.len() as u64 + 1;
        callbacks.push((id, Box::new(callback)));
        CallbackHandle(id)
    }

    /// Removes a callback registered with [`StopToken::register`] if it has not yet
    /// run. A no-op if it already ran or was already removed.
    pub fn deregister(&self, handle: CallbackHandle) {
        if handle.0 == 0 {
            return;
        }
        let mut callbacks = self.inner.callbacks.lock().unwrap_or_else(|e| e.into_inner());
        callbacks.retain(|(id, _)| *id != handle.0);
    }
}

/// Deregisters `*handle` from `stop` if a callback is still pending there, consuming
/// the slot. A no-op if `stop` is `None` (the awaitable carries no stop-token) or
/// `*handle` is already `None` (it never got around to registering - resolved on its
/// very first poll). Shared by every `with_stop`-enabled awaitable's `poll()` so the
/// cancellation callback is always removed once the result is ready, per the
/// cooperative-cancellation invariant documented on this module.
pub(crate) fn clear_stop_registration(stop: &Option<StopToken>, handle: &mut Option<CallbackHandle>) {
    if let (Some(stop), Some(handle)) = (stop, handle.take()) {
        stop.deregister(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn stop_runs_registered_callbacks_once() {
        let source = StopSource::new();
        let token = source.token();
        let count = Arc::new(AtomicU32::new(0));
        let count2 = count.clone();
        token.register(move || {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        source.stop();
        source.stop();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn already_stopped_token_runs_callback_immediately() {
        let source = StopSource::new();
        source.stop();
        let token = source.token();
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = ran.clone();
        token.register(move || ran2.store(true, Ordering::SeqCst));
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn deregister_prevents_callback() {
        let source = StopSource::new();
        let token = source.token();
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = ran.clone();
        let handle = token.register(move || ran2.store(true, Ordering::SeqCst));
        token.deregister(handle);
        source.stop();
        assert!(!ran.load(Ordering::SeqCst));
    }
}
