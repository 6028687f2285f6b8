// Copyright (c) 2026 nexio contributors. Licensed under Apache License, Version 2.0.

/// A boxed unit of work posted to an [`ExecutionContext`](super::ExecutionContext):
/// either a plain continuation (a waker firing) or a spawned task's next poll.
///
/// `run` consumes the `Runnable`; dropping one without calling `run` (the shutdown
/// drain path) simply discards the closure and whatever it captured, which is the
/// correct "don't resume this" behaviour for a stopped context.
pub struct Runnable {
    action: Box<dyn FnOnce() + Send>,
}

impl Runnable {
    /// Wraps `action` as a work item ready to be posted to a [`Dispatcher`](super::Dispatcher).
    pub fn new<F>(action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            action: Box::new(action),
        }
    }

    /// Runs the wrapped action, consuming this `Runnable`.
    pub fn run(self) {
        (self.action)();
    }
}

impl std::fmt::Debug for Runnable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runnable").finish_non_exhaustive()
    }
}
