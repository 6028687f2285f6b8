// Copyright (c) 2026 nexio contributors. Licensed under Apache License, Version 2.0.

use super::{ContextInner, Runnable};
use crate::reactor::Reactor;
use crate::timer::TimerService;
use std::sync::Arc;

/// A cheap, cloneable handle to an [`ExecutionContext`](super::ExecutionContext).
///
/// Two dispatchers compare equal iff they point at the same context. Passing a
/// `Dispatcher` to [`dispatch`](Self::dispatch) from a thread already running that
/// context's loop resumes the work item inline instead of posting it to the
/// fallback queue - the cheap-resumption fast path described in the crate's design
/// notes (see `DESIGN.md`).
#[derive(Clone)]
pub struct Dispatcher {
    pub(crate) inner: Arc<ContextInner>,
}

impl Dispatcher {
    pub(crate) fn new(inner: Arc<ContextInner>) -> Self {
        Self { inner }
    }

    /// Runs `runnable` now if the calling thread is already driving this
    /// dispatcher's context, otherwise posts it to the fallback queue and wakes the
    /// reactor.
    pub fn dispatch(&self, runnable: Runnable) {
        if ContextInner::is_current(&self.inner) {
            runnable.run();
        } else {
            self.inner.post(runnable);
        }
    }

    pub(crate) fn reactor(&self) -> &Reactor {
        &self.inner.reactor
    }

    pub(crate) fn timers(&self) -> &TimerService {
        &self.inner.timers
    }

    pub(crate) fn on_work_started(&self) {
        self.inner.on_work_started();
    }

    pub(crate) fn on_work_finished(&self) {
        self.inner.on_work_finished();
    }
}

impl PartialEq for Dispatcher {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Dispatcher {}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("context", &Arc::as_ptr(&self.inner))
            .finish()
    }
}
