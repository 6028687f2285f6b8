// Copyright (c) 2026 nexio contributors. Licensed under Apache License, Version 2.0.

//! The unified error taxonomy returned by every endpoint operation. See [`Error`].

/// Errors produced by task, reactor, and endpoint operations.
///
/// Each variant is a distinct, named failure mode with its own [diagnostic code] and
/// (where it helps) actionable text; this mirrors how other parts of the workspace
/// report recoverable failures rather than collapsing everything into a single
/// `io::Error`.
///
/// Invariant violations (duplicate service registration, awaiting a [`JoinTask`]
/// twice, misusing a [`Dispatcher`] across contexts) are logic errors and panic
/// instead of returning a value here - see the module docs on [`crate::context`].
///
/// [diagnostic code]: miette::Diagnostic::code
/// [`JoinTask`]: crate::task::JoinTask
/// [`Dispatcher`]: crate::task::Dispatcher
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum Error {
    /// The peer closed its write half; a read returned zero bytes.
    #[error("end of stream")]
    #[diagnostic(code(nexio::eof))]
    Eof,

    /// The operation's stop-token was triggered before or during the call.
    #[error("operation canceled")]
    #[diagnostic(code(nexio::canceled))]
    Canceled,

    /// The peer reset or otherwise tore down the connection mid-operation.
    #[error("connection closed by peer")]
    #[diagnostic(code(nexio::connection_closed))]
    ConnectionClosed,

    /// A scatter/gather write was asked to send more bytes than fit the supplied
    /// buffers without truncation.
    #[error("write would truncate data")]
    #[diagnostic(
        code(nexio::would_truncate),
        help("Ensure the destination buffer is large enough for the full payload.")
    )]
    WouldTruncate,

    /// The underlying OS call failed. Preserves the original [`std::io::Error`].
    #[error("OS-level I/O error")]
    #[diagnostic(code(nexio::os_error))]
    #[cfg_attr(
        target_os = "linux",
        diagnostic(help("Check `errno` and relevant `ulimit` / `/proc/sys` limits."))
    )]
    #[cfg_attr(
        target_os = "macos",
        diagnostic(help("Check `errno` and relevant `ulimit` / `sysctl` limits."))
    )]
    #[cfg_attr(
        target_os = "windows",
        diagnostic(help("Check the Win32 error code surfaced via `std::io::Error::raw_os_error`."))
    )]
    Os(#[source] std::io::Error),

    /// A spawned task panicked; the panic payload could not be preserved across the
    /// `catch_unwind` boundary, so only a description is kept.
    #[error("task panicked: {0}")]
    #[diagnostic(
        code(nexio::task_panicked),
        help("This indicates a bug in the spawned future; check the panic message above.")
    )]
    TaskPanicked(String),

    /// Reserved for test-only failure injection; never produced by production code
    /// paths.
    #[error("test failure: {0}")]
    #[diagnostic(code(nexio::test_failure))]
    TestFailure(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => Error::Eof,
            std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionAborted => {
                Error::ConnectionClosed
            }
            _ => Error::Os(err),
        }
    }
}

/// Convenience alias used throughout the crate's public API.
pub type Result<T> = std::result::Result<T, Error>;
