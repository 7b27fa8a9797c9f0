/*
 * icesmtp - SMTP protocol engine
 * Copyright (C) 2022 viridIT SAS
 *
 * This program is free software: you can redistribute it and/or modify it under
 * the terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or any later version.
 *
 * This program is distributed in the hope that it will be useful, but WITHOUT
 * ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
 * FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * this program. If not, see https://www.gnu.org/licenses/.
 *
*/

//! In-memory session streams for tests and embedded fixtures.
//!
//! [`Mock`] plays a whole client script at once: the input bytes are
//! served to the engine as one read stream, everything the engine writes
//! lands in a shared output buffer inspected after the session. The
//! [`MockTlsUpgrader`] stands in for the rustls handshake so STARTTLS
//! flows run without certificates or key exchange.

use crate::connection::BoxedSessionStream;
use crate::tls::{TlsError, TlsInfo, TlsUpgrader};
use tokio_rustls::rustls;

/// A session stream emulating a socket: scripted input, captured output.
#[derive(Debug)]
pub struct Mock {
    read: std::io::Cursor<Vec<u8>>,
    write: std::sync::Arc<std::sync::Mutex<Vec<u8>>>,
}

impl Mock {
    /// A stream serving `input` to the reader.
    #[must_use]
    pub fn new(input: Vec<u8>) -> Self {
        Self {
            read: std::io::Cursor::new(input),
            write: std::sync::Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    /// A handle onto the captured output. Grab it before the mock moves
    /// into a [`Connection`](crate::Connection).
    #[must_use]
    pub fn output(&self) -> std::sync::Arc<std::sync::Mutex<Vec<u8>>> {
        std::sync::Arc::clone(&self.write)
    }

    /// A stream writing into an existing output buffer, so several
    /// streams (e.g. before and after STARTTLS) produce one transcript.
    #[must_use]
    pub fn with_output(
        input: Vec<u8>,
        output: std::sync::Arc<std::sync::Mutex<Vec<u8>>>,
    ) -> Self {
        Self {
            read: std::io::Cursor::new(input),
            write: output,
        }
    }
}

impl tokio::io::AsyncRead for Mock {
    fn poll_read(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.read).poll_read(cx, buf)
    }
}

impl tokio::io::AsyncWrite for Mock {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<Result<usize, std::io::Error>> {
        self.write
            .lock()
            .expect("mock output poisoned")
            .extend_from_slice(buf);
        std::task::Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), std::io::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), std::io::Error>> {
        std::task::Poll::Ready(Ok(()))
    }
}

/// A scripted TLS upgrade: swaps in a prepared replacement stream and
/// reports a prepared [`TlsInfo`], without any handshake.
pub struct MockTlsUpgrader {
    replacement: std::sync::Mutex<Option<BoxedSessionStream>>,
    info: TlsInfo,
}

impl MockTlsUpgrader {
    /// Upgrade exactly once onto `replacement`, reporting `info`.
    pub fn new(replacement: impl crate::SessionStream + 'static, info: TlsInfo) -> Self {
        Self {
            replacement: std::sync::Mutex::new(Some(Box::new(replacement))),
            info,
        }
    }

    /// An upgrader whose handshake always fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            replacement: std::sync::Mutex::new(None),
            info: TlsInfo::default(),
        }
    }
}

#[async_trait::async_trait]
impl TlsUpgrader for MockTlsUpgrader {
    async fn upgrade(
        &self,
        stream: BoxedSessionStream,
        _config: std::sync::Arc<rustls::ServerConfig>,
    ) -> Result<(BoxedSessionStream, TlsInfo), TlsError> {
        drop(stream);
        let replacement = self
            .replacement
            .lock()
            .expect("mock upgrader poisoned")
            .take();
        replacement.map_or_else(
            || {
                Err(TlsError::Handshake(std::io::Error::new(
                    std::io::ErrorKind::ConnectionAborted,
                    "scripted handshake failure",
                )))
            },
            |replacement| Ok((replacement, self.info.clone())),
        )
    }
}
