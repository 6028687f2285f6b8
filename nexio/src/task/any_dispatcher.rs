// Copyright (c) 2026 nexio contributors. Licensed under Apache License, Version 2.0.

use std::task::{RawWaker, RawWakerVTable, Waker};

/// The type-erased form of a task's scheduling handle: a `(data, vtable)` pair, the
/// same shape [`RawWaker`] itself uses. Every [`Waker`] built for a spawned task (see
/// `header::make_waker`) is constructed through one of these rather than calling
/// `RawWaker::new` directly at the call site, so the erasure has one named type
/// instead of being implicit in a pointer and a `&'static VTABLE`.
///
/// Two handles compare equal iff they point at the same underlying task - `data` is
/// the only part of the pair that identifies *which* task a waker belongs to, the
/// vtable is shared by every task in the crate.
#[derive(Clone, Copy)]
pub struct AnyDispatcher {
    data: *const (),
    vtable: &'static RawWakerVTable,
}

impl AnyDispatcher {
    pub(crate) fn new(data: *const (), vtable: &'static RawWakerVTable) -> Self {
        Self { data, vtable }
    }

    /// Builds the `Waker` this handle describes.
    ///
    /// # Safety
    ///
    /// `data` must be a valid pointer for `vtable`'s clone/wake/wake-by-ref/drop
    /// functions, under the same contract `RawWaker::new` itself documents.
    pub(crate) unsafe fn into_waker(self) -> Waker {
        unsafe { Waker::from_raw(RawWaker::new(self.data, self.vtable)) }
    }
}

impl PartialEq for AnyDispatcher {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.data, other.data)
    }
}

impl Eq for AnyDispatcher {}

impl std::fmt::Debug for AnyDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyDispatcher").field("data", &self.data).finish()
    }
}

// SAFETY: `AnyDispatcher` is just a pointer and a `&'static` vtable reference; it
// carries no borrowed data of its own and every vtable function used with it
// (`waker_clone`/`waker_wake`/...) is itself `Send + Sync` safe, matching the
// contract `Waker` already relies on.
unsafe impl Send for AnyDispatcher {}
unsafe impl Sync for AnyDispatcher {}
