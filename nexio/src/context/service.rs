// Copyright (c) 2026 nexio contributors. Licensed under Apache License, Version 2.0.

/// A singleton attached to an [`ExecutionContext`](super::ExecutionContext), looked
/// up by its concrete type via [`ExecutionContext::use_service`](super::ExecutionContext::use_service).
///
/// The timer and signal services are the two built-in implementors; embedders can
/// register their own with [`ExecutionContext::make_service`](super::ExecutionContext::make_service).
pub trait Service: std::any::Any + Send + Sync + 'static {
    /// Called once during context shutdown, in the reverse order services were
    /// created. The default does nothing.
    fn shutdown(&self) {}
}
