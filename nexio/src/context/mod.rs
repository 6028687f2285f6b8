// Copyright (c) 2026 nexio contributors. Licensed under Apache License, Version 2.0.

//! The execution context: owns the reactor and timer service, runs posted
//! continuations and I/O completions, and tracks outstanding work so [`run`] knows
//! when there's nothing left to do.
//!
//! [`run`]: ExecutionContext::run

mod dispatcher;
mod runnable;
mod service;

pub use dispatcher::Dispatcher;
pub use runnable::Runnable;
pub use service::Service;

use crate::reactor::{CompletionKey, Reactor};
use crate::timer::TimerService;
use rustc_hash::FxHashMap;
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

thread_local! {
    static CURRENT: RefCell<Vec<*const ContextInner>> = const { RefCell::new(Vec::new()) };
}

/// Construction-time knobs for an [`ExecutionContext`]. Deliberately small: this
/// crate does not parse configuration files or environment variables itself, that is
/// left to the embedder.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Advisory hint for the expected number of threads that will call
    /// [`ExecutionContext::run`] concurrently. Used only to size the initial
    /// fallback queue capacity; the context behaves correctly regardless of the
    /// actual number of callers.
    pub concurrency_hint: Option<usize>,
}

struct ServiceEntry {
    value: Arc<dyn Any + Send + Sync>,
    shutdown: Box<dyn Fn(&Arc<dyn Any + Send + Sync>) + Send>,
}

pub(crate) struct ContextInner {
    pub(crate) reactor: Reactor,
    pub(crate) timers: TimerService,
    work_count: AtomicUsize,
    stopped: AtomicBool,
    shutdown_done: AtomicBool,
    fallback_queue: Mutex<VecDeque<Runnable>>,
    services: Mutex<FxHashMap<TypeId, ServiceEntry>>,
    service_order: Mutex<Vec<TypeId>>,
}

impl ContextInner {
    fn new(config: Config) -> Self {
        let capacity = config.concurrency_hint.unwrap_or(1).max(1) * 16;
        Self {
            reactor: Reactor::new().expect("failed to initialize reactor"),
            timers: TimerService::new(),
            work_count: AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
            shutdown_done: AtomicBool::new(false),
            fallback_queue: Mutex::new(VecDeque::with_capacity(capacity)),
            services: Mutex::new(FxHashMap::default()),
            service_order: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn on_work_started(&self) {
        self.work_count.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn on_work_finished(&self) {
        self.work_count.fetch_sub(1, Ordering::AcqRel);
        // A finished unit of work may be the thing blocking `mio::Poll::poll`, so make
        // sure a thread sitting in `run()` notices the new zero count promptly.
        let _ = self.reactor.wake();
    }

    fn is_current(this: &Arc<Self>) -> bool {
        let target = Arc::as_ptr(this);
        CURRENT.with(|stack| stack.borrow().iter().any(|&p| std::ptr::eq(p, target)))
    }

    pub(crate) fn post(&self, runnable: Runnable) {
        self.on_work_started();
        self.fallback_queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push_back(runnable);
        let _ = self.reactor.wake();
    }

    fn pop_runnable(&self) -> Option<Runnable> {
        self.fallback_queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front()
    }

    fn compute_timeout(&self, deadline: Option<Instant>) -> Option<Duration> {
        let now = Instant::now();
        let timer_timeout = self.timers.next_deadline().map(|at| at.saturating_duration_since(now));
        let run_for_timeout = deadline.map(|d| d.saturating_duration_since(now));
        match (timer_timeout, run_for_timeout) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }

    /// Runs the loop until `deadline` passes (if set), the context is stopped, or
    /// (when `run_to_completion` is true) there's no outstanding work left.
    fn run_loop(self: &Arc<Self>, deadline: Option<Instant>, run_to_completion: bool, one_shot: bool) -> bool {
        tracing::trace!(run_to_completion, one_shot, "context run_loop entered");
        let ptr = Arc::as_ptr(self);
        CURRENT.with(|stack| stack.borrow_mut().push(ptr));
        let _guard = scopeguard(|| {
            CURRENT.with(|stack| {
                stack.borrow_mut().pop();
            });
        });

        let mut ran_anything = false;
        loop {
            if self.stopped.load(Ordering::Acquire) {
                break;
            }
            if let Some(runnable) = self.pop_runnable() {
                runnable.run();
                self.on_work_finished();
                ran_anything = true;
                if one_shot {
                    break;
                }
            } else {
                if self.stopped.load(Ordering::Acquire) {
                    break;
                }
                if run_to_completion && self.work_count.load(Ordering::Acquire) == 0 {
                    break;
                }
                let timeout = self.compute_timeout(deadline);
                let now = if let Ok(outcome) = self.reactor.poll_once(timeout) {
                    ran_anything = ran_anything || !outcome.keys.is_empty() || !outcome.wakers.is_empty();
                    let now = Instant::now();
                    for key in outcome.keys {
                        self.dispatch_completion(key, now);
                    }
                    for waker in outcome.wakers {
                        waker.wake();
                    }
                    now
                } else {
                    Instant::now()
                };
                self.dispatch_completion(CompletionKey::Timer, now);
                if let Some(d) = deadline {
                    if now >= d {
                        break;
                    }
                }
                if one_shot {
                    break;
                }
            }
            if !run_to_completion && !one_shot {
                // `poll`/`poll_for` style callers only want the work currently ready;
                // once the fallback queue and reactor are both drained for this
                // iteration, stop instead of blocking for more.
                if self.fallback_queue.lock().unwrap_or_else(std::sync::PoisonError::into_inner).is_empty() {
                    break;
                }
            }
        }
        ran_anything
    }

    /// Routes one classified reactor completion. `Io`/`Wake` completions are already
    /// fully handled via the `Waker`s `poll_once` resolved into `PollOutcome::wakers`;
    /// only `Timer` needs a further action here (checking the timer service for
    /// expired deadlines).
    fn dispatch_completion(&self, key: CompletionKey, now: Instant) {
        match key {
            CompletionKey::Timer => {
                tracing::trace!("dispatching timer completion");
                self.timers.process_expired(now);
            }
            CompletionKey::Io(token) => {
                tracing::trace!(token = token.0, "dispatching io completion");
            }
            CompletionKey::Wake => {
                tracing::trace!("dispatching wake completion");
            }
        }
    }

    /// Unblocks every thread currently parked in `run*`/`poll*` without running any
    /// [`Service::shutdown`] hook; the context's services are left intact so
    /// [`ExecutionContext::restart`] can resume using it. See [`Self::shutdown`] for
    /// the hook-running teardown counterpart.
    fn stop(&self) {
        tracing::debug!("context stop requested");
        self.stopped.store(true, Ordering::Release);
        let _ = self.reactor.wake();
    }

    /// Full teardown: unblocks the run loop, drops whatever is left in the fallback
    /// queue, and runs every registered [`Service::shutdown`] hook in reverse
    /// registration order. Idempotent - a second call is a no-op, so it is safe to
    /// invoke both explicitly and from `Drop`.
    fn shutdown(&self) {
        if self.shutdown_done.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!("context shutdown starting");
        self.stop();
        let drained: Vec<_> = self
            .fallback_queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .drain(..)
            .collect();
        drop(drained); // dropped, not run, per shutdown contract
        let order = self.service_order.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let services = self.services.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for ty in order.iter().rev() {
            if let Some(entry) = services.get(ty) {
                (entry.shutdown)(&entry.value);
            }
        }
        drop(services);
        drop(order);
        tracing::debug!("context shutdown complete");
    }

    pub(crate) fn use_service<S: Service + Default>(self: &Arc<Self>) -> Arc<S> {
        let ty = TypeId::of::<S>();
        let mut services = self.services.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(entry) = services.get(&ty) {
            return entry.value.clone().downcast::<S>().expect("service type mismatch");
        }
        let value = Arc::new(S::default());
        services.insert(ty, service_entry(value.clone()));
        drop(services);
        self.service_order.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(ty);
        value
    }

    pub(crate) fn find_service<S: Service>(&self) -> Option<Arc<S>> {
        let services = self.services.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        services.get(&TypeId::of::<S>()).map(|e| e.value.clone().downcast::<S>().expect("service type mismatch"))
    }

    pub(crate) fn make_service<S: Service>(&self, value: S) -> Arc<S> {
        let ty = TypeId::of::<S>();
        let mut services = self.services.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        assert!(
            !services.contains_key(&ty),
            "service {} already registered on this context",
            std::any::type_name::<S>()
        );
        let value = Arc::new(value);
        services.insert(ty, service_entry(value.clone()));
        drop(services);
        self.service_order.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(ty);
        value
    }
}

fn scopeguard<F: FnMut()>(f: F) -> impl Drop {
    struct Guard<F: FnMut()>(F);
    impl<F: FnMut()> Drop for Guard<F> {
        fn drop(&mut self) {
            (self.0)();
        }
    }
    Guard(f)
}

/// Owns the reactor, timer service, and a set of [`Service`] singletons; drives the
/// run loop that resumes suspended tasks and completes I/O.
///
/// Always held behind an `Arc` (see [`ExecutionContext::new`]) since [`Dispatcher`]s
/// and endpoint types keep their own clone of it for the lifetime of the operations
/// they submit.
pub struct ExecutionContext(pub(crate) Arc<ContextInner>);

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("stopped", &self.0.stopped.load(Ordering::Relaxed))
            .field("work_count", &self.0.work_count.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl ExecutionContext {
    /// Creates a new context with its own reactor thread ready to be driven by
    /// [`run`](Self::run).
    #[must_use]
    pub fn new(config: Config) -> Arc<Self> {
        Arc::new(Self(Arc::new(ContextInner::new(config))))
    }

    /// Returns a cheap, cloneable handle that I/O endpoints and spawned tasks use to
    /// resume work on this context.
    #[must_use]
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.0.clone())
    }

    /// Runs until stopped or until there is no outstanding work. Blocks the calling
    /// thread. Safe to call from multiple threads concurrently.
    pub fn run(self: &Arc<Self>) {
        self.0.run_loop(None, true, false);
    }

    /// Runs a single ready item (one posted continuation or one I/O completion) and
    /// returns. Returns `false` if nothing was ready and the context is not stopped.
    pub fn run_one(self: &Arc<Self>) -> bool {
        self.0.run_loop(None, false, true)
    }

    /// Runs ready work without blocking for more; returns once the fallback queue
    /// and reactor have both been drained for this call.
    pub fn poll(self: &Arc<Self>) {
        self.0.run_loop(Some(Instant::now()), false, false);
    }

    /// Like [`poll`](Self::poll) but stops after handling at most one item.
    pub fn poll_one(self: &Arc<Self>) -> bool {
        self.0.run_loop(Some(Instant::now()), false, true)
    }

    /// Runs for up to `duration`, or until stopped / out of work, whichever comes
    /// first.
    pub fn run_for(self: &Arc<Self>, duration: Duration) {
        self.0.run_loop(Some(Instant::now() + duration), true, false);
    }

    /// Runs until `deadline`, or until stopped / out of work, whichever comes first.
    pub fn run_until(self: &Arc<Self>, deadline: Instant) {
        self.0.run_loop(Some(deadline), true, false);
    }

    /// Requests that every thread currently blocked in `run*`/`poll*` return
    /// promptly. Unlike [`shutdown`](Self::shutdown), this does not run any
    /// [`Service::shutdown`] hook and does not drain the fallback queue - the context
    /// is left fully reusable via [`restart`](Self::restart).
    pub fn stop(&self) {
        self.0.stop();
    }

    /// Tears the context down: unblocks `run*`/`poll*`, drops whatever continuations
    /// are still queued, and runs every registered [`Service::shutdown`] hook in
    /// reverse registration order. Idempotent; also invoked from `Drop` if it was
    /// never called explicitly. A context that has been shut down should not be
    /// [`restart`](Self::restart)ed - its services have torn down their state.
    pub fn shutdown(&self) {
        self.0.shutdown();
    }

    /// Returns whether [`stop`](Self::stop) or [`shutdown`](Self::shutdown) has been
    /// called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.stopped.load(Ordering::Acquire)
    }

    /// Clears the stopped flag so the context can be reused after a plain
    /// [`stop`](Self::stop) (not a [`shutdown`](Self::shutdown) - service state was
    /// never torn down, so there is nothing to reinitialize). Continuations still
    /// sitting in the fallback queue at the time of the stop were left untouched and
    /// resume being processed once the run loop is driven again.
    pub fn restart(&self) {
        self.0.stopped.store(false, Ordering::Release);
    }

    /// Returns whether the calling thread is currently inside a `run*`/`poll*` call
    /// on this context. [`Dispatcher::dispatch`] uses this to decide whether it can
    /// run a continuation inline.
    #[must_use]
    pub fn is_running_in_this_thread(&self) -> bool {
        ContextInner::is_current(&self.0)
    }

    /// Looks up the service of type `S`, creating it with `S::default()` if this is
    /// the first request for that type.
    pub fn use_service<S: Service + Default>(&self) -> Arc<S> {
        self.0.use_service::<S>()
    }

    /// Looks up the service of type `S` without creating it.
    #[must_use]
    pub fn find_service<S: Service>(&self) -> Option<Arc<S>> {
        self.0.find_service::<S>()
    }

    /// Registers `value` as the context's singleton instance of `S`.
    ///
    /// # Panics
    ///
    /// Panics if a service of type `S` is already registered; this is a logic error,
    /// not a recoverable failure - see the module docs on [`crate::error`].
    pub fn make_service<S: Service>(&self, value: S) -> Arc<S> {
        self.0.make_service(value)
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        self.0.shutdown();
    }
}

fn service_entry<S: Service>(value: Arc<S>) -> ServiceEntry {
    ServiceEntry {
        value: value as Arc<dyn Any + Send + Sync>,
        shutdown: Box::new(|v| {
            if let Some(s) = v.downcast_ref::<S>() {
                s.shutdown();
            }
        }),
    }
}
