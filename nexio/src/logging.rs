// Copyright (c) 2026 nexio contributors. Licensed under Apache License, Version 2.0.

//! Structured logging setup for embedders who don't already run their own
//! `tracing` subscriber. Every context-lifecycle event, reactor dispatch, and
//! operation completion is instrumented with [`tracing`] spans and events; this
//! module only wires up where they go.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Whether [`init`] installs a process-wide subscriber or one scoped to the calling
/// thread.
///
/// Thread-local scope is primarily useful in tests, where multiple test threads
/// might otherwise race to set the global default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    /// Set via [`tracing::subscriber::set_global_default`]. Can only be done once
    /// per process.
    #[default]
    Global,
    /// Set via [`tracing::subscriber::set_default`], active only on this thread for
    /// the lifetime of the returned guard.
    ThreadLocal,
}

/// Initializes a compact, unfiltered-by-default `tracing` subscriber writing to
/// stderr. The filter can be overridden with the `NEXIO_LOG` environment variable
/// (falls back to `info` when unset or invalid).
///
/// Returns a [`tracing::dispatcher::DefaultGuard`] when `scope` is
/// [`Scope::ThreadLocal`]; drop it to restore the previous subscriber for that
/// thread. Returns `None` for [`Scope::Global`].
pub fn init(scope: Scope) -> Option<tracing::dispatcher::DefaultGuard> {
    let filter = EnvFilter::try_from_env("NEXIO_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(false)
        .with_thread_ids(true);

    let registry = tracing_subscriber::registry().with(filter).with(fmt_layer);
    match scope {
        Scope::Global => {
            registry.init();
            None
        }
        Scope::ThreadLocal => Some(registry.set_default()),
    }
}
