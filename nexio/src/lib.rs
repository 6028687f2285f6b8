/*
 *   Copyright (c) 2026 nexio contributors
 *   All rights reserved.
 *
 *   Licensed under the Apache License, Version 2.0 (the "License");
 *   you may not use this file except in compliance with the License.
 *   You may obtain a copy of the License at
 *
 *   http://www.apache.org/licenses/LICENSE-2.0
 *
 *   Unless required by applicable law or agreed to in writing, software
 *   distributed under the License is distributed on an "AS IS" BASIS,
 *   WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *   See the License for the specific language governing permissions and
 *   limitations under the License.
 */

//! An asynchronous I/O runtime built around three ideas: a [`Task`] whose resumption
//! is always routed through a [`Dispatcher`], an [`ExecutionContext`] that drives a
//! `mio`-backed reactor, and a small set of I/O endpoints ([`net::Stream`],
//! [`net::Listener`], [`timer::Timer`], [`signal::SignalWait`], [`tls::TlsStream`])
//! that all complete through that same reactor.
//!
//! This crate is not a general-purpose green-thread runtime. There is no work
//! stealing, no user-visible priority scheduling, and no stackful fiber support. It
//! exists to drive I/O-bound `async fn`s to completion on an explicit, inspectable
//! set of execution contexts, each backed by its own reactor thread.
//!
//! # Example
//!
//! ```no_run
//! use nexio::context::{Config, ExecutionContext};
//! use nexio::net::Stream;
//!
//! # async fn run() -> Result<(), nexio::Error> {
//! let ctx = ExecutionContext::new(Config::default());
//! let dispatcher = ctx.dispatcher();
//! let mut stream = Stream::connect(&dispatcher, "127.0.0.1:9000".parse().unwrap()).await?;
//! let mut buf = [0_u8; 1024];
//! let n = stream.read_some(&mut buf).await?;
//! println!("read {n} bytes");
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod error;
pub mod logging;
pub mod net;
pub mod reactor;
pub mod signal;
pub mod stop_token;
pub mod task;
pub mod timer;
pub mod tls;

pub use context::{Config, ExecutionContext};
pub use error::Error;
pub use stop_token::{StopSource, StopToken};
pub use task::{Dispatcher, Task};
