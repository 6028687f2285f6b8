// Copyright (c) 2026 nexio contributors. Licensed under Apache License, Version 2.0.

//! TLS on top of [`net::Stream`](crate::net::Stream), using `rustls` directly rather
//! than a `tokio`-integrated wrapper crate - this crate's reactor isn't `tokio`'s, so
//! the usual `tokio-rustls` glue doesn't apply. [`TlsStream`] drives the handshake and
//! record layer itself: push ciphertext in, pull plaintext out, and vice versa.

use crate::error::{Error, Result};
use crate::net::Stream;
use std::io::{self, Read, Write};
use tokio::sync::Mutex;

enum Conn {
    Client(Box<rustls::ClientConnection>),
    Server(Box<rustls::ServerConnection>),
}

impl Conn {
    fn is_handshaking(&self) -> bool {
        match self {
            Self::Client(c) => c.is_handshaking(),
            Self::Server(c) => c.is_handshaking(),
        }
    }

    fn wants_read(&self) -> bool {
        match self {
            Self::Client(c) => c.wants_read(),
            Self::Server(c) => c.wants_read(),
        }
    }

    fn wants_write(&self) -> bool {
        match self {
            Self::Client(c) => c.wants_write(),
            Self::Server(c) => c.wants_write(),
        }
    }

    fn read_tls(&mut self, rd: &mut dyn Read) -> io::Result<usize> {
        match self {
            Self::Client(c) => c.read_tls(rd),
            Self::Server(c) => c.read_tls(rd),
        }
    }

    fn write_tls(&mut self, wr: &mut dyn Write) -> io::Result<usize> {
        match self {
            Self::Client(c) => c.write_tls(wr),
            Self::Server(c) => c.write_tls(wr),
        }
    }

    fn process_new_packets(&mut self) -> std::result::Result<(), rustls::Error> {
        match self {
            Self::Client(c) => c.process_new_packets().map(|_| ()),
            Self::Server(c) => c.process_new_packets().map(|_| ()),
        }
    }

    fn read_plaintext(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Client(c) => c.reader().read(buf),
            Self::Server(c) => c.reader().read(buf),
        }
    }

    fn write_plaintext(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Client(c) => c.writer().write(buf),
            Self::Server(c) => c.writer().write(buf),
        }
    }
}

/// A TLS-wrapped [`Stream`]. Construct with [`TlsStream::connect`] (client side) or
/// [`TlsStream::accept`] (server side); both drive the handshake to completion before
/// returning.
pub struct TlsStream {
    io: Mutex<Stream>,
    conn: Mutex<Conn>,
}

impl TlsStream {
    /// Wraps an already-connected `stream` and performs the client side of the
    /// handshake against `config`.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from the underlying stream, or a TLS protocol error from
    /// the handshake itself.
    pub async fn connect(stream: Stream, config: std::sync::Arc<rustls::ClientConfig>, server_name: rustls_pki_types::ServerName<'static>) -> Result<Self> {
        let conn = rustls::ClientConnection::new(config, server_name).map_err(to_error)?;
        let tls = Self {
            io: Mutex::new(stream),
            conn: Mutex::new(Conn::Client(Box::new(conn))),
        };
        tls.drive_handshake().await?;
        Ok(tls)
    }

    /// Wraps an already-accepted `stream` and performs the server side of the
    /// handshake against `config`.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from the underlying stream, or a TLS protocol error from
    /// the handshake itself.
    pub async fn accept(stream: Stream, config: std::sync::Arc<rustls::ServerConfig>) -> Result<Self> {
        let conn = rustls::ServerConnection::new(config).map_err(to_error)?;
        let tls = Self {
            io: Mutex::new(stream),
            conn: Mutex::new(Conn::Server(Box::new(conn))),
        };
        tls.drive_handshake().await?;
        Ok(tls)
    }

    async fn drive_handshake(&self) -> Result<()> {
        loop {
            let (handshaking, wants_write, wants_read) = {
                let conn = self.conn.lock().await;
                (conn.is_handshaking(), conn.wants_write(), conn.wants_read())
            };
            if !handshaking {
                return Ok(());
            }
            if wants_write {
                self.flush_tls().await?;
            }
            if wants_read {
                self.pull_tls().await?;
            }
        }
    }

    /// Reads some decrypted application data, returning `0` once the peer has closed
    /// the connection cleanly.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from the underlying stream, or a TLS record error.
    pub async fn read_some(&self, buf: &mut [u8]) -> Result<usize> {
        loop {
            let outcome = {
                let mut conn = self.conn.lock().await;
                conn.read_plaintext(buf)
            };
            match outcome {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(Error::from(e)),
            }
            self.pull_tls().await?;
        }
    }

    /// Encrypts and sends `buf`, flushing the resulting ciphertext before returning.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from the underlying stream, or a TLS record error.
    pub async fn write_some(&self, buf: &[u8]) -> Result<usize> {
        let n = {
            let mut conn = self.conn.lock().await;
            conn.write_plaintext(buf).map_err(Error::from)?
        };
        self.flush_tls().await?;
        Ok(n)
    }

    async fn pull_tls(&self) -> Result<()> {
        let mut raw = [0_u8; 4096];
        let n = {
            let mut io = self.io.lock().await;
            io.read_some(&mut raw).await?
        };
        if n == 0 {
            return Err(Error::ConnectionClosed);
        }
        let mut conn = self.conn.lock().await;
        conn.read_tls(&mut &raw[..n]).map_err(Error::from)?;
        conn.process_new_packets().map_err(to_error)
    }

    async fn flush_tls(&self) -> Result<()> {
        let mut ciphertext = Vec::new();
        {
            let mut conn = self.conn.lock().await;
            while conn.wants_write() {
                let before = ciphertext.len();
                conn.write_tls(&mut ciphertext).map_err(Error::from)?;
                if ciphertext.len() == before {
                    break;
                }
            }
        }
        if ciphertext.is_empty() {
            return Ok(());
        }
        let mut io = self.io.lock().await;
        let mut sent = 0;
        while sent < ciphertext.len() {
            let n = io.write_some(&ciphertext[sent..]).await?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
            sent += n;
        }
        Ok(())
    }
}

fn to_error(e: rustls::Error) -> Error {
    Error::from(io::Error::new(io::ErrorKind::Other, e))
}
