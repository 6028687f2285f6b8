// Copyright (c) 2026 nexio contributors. Licensed under Apache License, Version 2.0.

//! TCP endpoints built on the reactor: [`Stream`] for a connected socket and
//! [`Listener`] for an accepting one.

mod listener;
mod stream;

pub use listener::{Accept, Listener};
pub use stream::{ReadSome, Stream, WriteSome};

use crate::error::{Error, Result};

/// Reads into `buf` until it is completely full or the stream reports EOF.
///
/// # Errors
///
/// Returns [`Error::Eof`] if the stream closes before `buf` is filled, or whatever
/// error the underlying reads produced.
pub async fn read_exact(stream: &mut Stream, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read_some(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(Error::Eof);
        }
        filled += n;
    }
    Ok(())
}

/// Writes all of `buf`, looping over short writes.
///
/// # Errors
///
/// Returns whatever error the underlying writes produced.
pub async fn write_all(stream: &mut Stream, buf: &[u8]) -> Result<()> {
    let mut sent = 0;
    while sent < buf.len() {
        let n = stream.write_some(&buf[sent..]).await?;
        if n == 0 {
            return Err(Error::ConnectionClosed);
        }
        sent += n;
    }
    Ok(())
}
