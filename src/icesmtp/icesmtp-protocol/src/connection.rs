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

use crate::tls::{RustlsUpgrader, TlsError, TlsInfo, TlsUpgrader};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};
use tokio_rustls::rustls;

/// Any byte stream a session can run over: a TCP socket, its TLS
/// wrapping, or an in-memory pair in tests.
pub trait SessionStream: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + Sync + Unpin {}

impl<T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + Sync + Unpin> SessionStream for T {}

/// An owned, type-erased session stream.
pub type BoxedSessionStream = Box<dyn SessionStream>;

/// One client connection: a line-buffered reader/writer over a boxed
/// stream, with timeout-bounded operations, byte accounting and an
/// in-band TLS upgrade point.
///
/// After a successful upgrade the buffer is re-initialized against the
/// TLS stream, so bytes buffered before the handshake can never leak
/// into the secured session.
pub struct Connection {
    stream: Option<tokio::io::BufReader<BoxedSessionStream>>,
    upgrader: std::sync::Arc<dyn TlsUpgrader>,
    tls: Option<TlsInfo>,
    bytes_read: u64,
    bytes_written: u64,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("connected", &self.stream.is_some())
            .field("tls", &self.tls)
            .field("bytes_read", &self.bytes_read)
            .field("bytes_written", &self.bytes_written)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Wrap a stream, upgrading TLS with the production rustls
    /// handshake when asked to.
    pub fn new(stream: impl SessionStream + 'static) -> Self {
        Self::with_upgrader(stream, std::sync::Arc::new(RustlsUpgrader))
    }

    /// Wrap a stream with a custom TLS upgrader. Tests inject a scripted
    /// upgrader here to simulate post-handshake streams.
    pub fn with_upgrader(
        stream: impl SessionStream + 'static,
        upgrader: std::sync::Arc<dyn TlsUpgrader>,
    ) -> Self {
        Self {
            stream: Some(tokio::io::BufReader::new(Box::new(stream) as BoxedSessionStream)),
            upgrader,
            tls: None,
            bytes_read: 0,
            bytes_written: 0,
        }
    }

    /// Mark the connection as already TLS-secured (SMTPS), recording the
    /// negotiated state. No in-band handshake is performed.
    #[must_use]
    pub fn secured(mut self, info: TlsInfo) -> Self {
        self.tls = Some(info);
        self
    }

    fn stream_mut(
        &mut self,
    ) -> std::io::Result<&mut tokio::io::BufReader<BoxedSessionStream>> {
        self.stream.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotConnected, "connection is gone")
        })
    }

    /// Read one line, up to and including the next LF. The timeout acts
    /// as a read deadline and is cleared on return. `Ok(None)` is end of
    /// stream.
    ///
    /// # Errors
    ///
    /// * `ErrorKind::TimedOut` when the deadline passes
    /// * any transport error
    pub async fn read_line(
        &mut self,
        timeout: Option<std::time::Duration>,
    ) -> std::io::Result<Option<Vec<u8>>> {
        let stream = self.stream_mut()?;
        let mut line = Vec::with_capacity(80);
        let read = stream.read_until(b'\n', &mut line);
        let count = match timeout {
            Some(timeout) if !timeout.is_zero() => tokio::time::timeout(timeout, read)
                .await
                .map_err(|_elapsed| {
                    std::io::Error::new(std::io::ErrorKind::TimedOut, "read deadline exceeded")
                })??,
            _ => read.await?,
        };
        self.bytes_read += count as u64;
        if count == 0 {
            return Ok(None);
        }
        Ok(Some(line))
    }

    /// Write and flush a buffer. The timeout acts as a write deadline.
    ///
    /// # Errors
    ///
    /// * `ErrorKind::TimedOut` when the deadline passes
    /// * any transport error
    pub async fn send(
        &mut self,
        buf: &[u8],
        timeout: Option<std::time::Duration>,
    ) -> std::io::Result<()> {
        let stream = self.stream_mut()?;
        let write = async {
            stream.write_all(buf).await?;
            stream.flush().await
        };
        match timeout {
            Some(timeout) if !timeout.is_zero() => tokio::time::timeout(timeout, write)
                .await
                .map_err(|_elapsed| {
                    std::io::Error::new(std::io::ErrorKind::TimedOut, "write deadline exceeded")
                })??,
            _ => write.await?,
        }
        self.bytes_written += buf.len() as u64;
        Ok(())
    }

    /// Perform the in-band server-role TLS handshake, bounded by
    /// `timeout`, and swap the underlying stream for its TLS wrapping.
    /// The line buffer is re-initialized against the new stream.
    ///
    /// # Errors
    ///
    /// * the handshake failed or timed out; the connection is dead
    pub async fn upgrade_tls(
        &mut self,
        config: std::sync::Arc<rustls::ServerConfig>,
        timeout: std::time::Duration,
    ) -> Result<TlsInfo, TlsError> {
        let stream = self
            .stream
            .take()
            .ok_or_else(|| TlsError::Config("connection is gone".to_string()))?
            .into_inner();
        let upgrader = std::sync::Arc::clone(&self.upgrader);
        let (secured, info) = tokio::time::timeout(timeout, upgrader.upgrade(stream, config))
            .await
            .map_err(|_elapsed| TlsError::HandshakeTimeout(timeout))??;
        self.stream = Some(tokio::io::BufReader::new(secured));
        self.tls = Some(info.clone());
        Ok(info)
    }

    /// The negotiated TLS state, if TLS is active.
    #[must_use]
    pub const fn tls_info(&self) -> Option<&TlsInfo> {
        self.tls.as_ref()
    }

    /// True once TLS is active on this connection.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Total bytes read from the peer.
    #[must_use]
    pub const fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Total bytes written to the peer.
    #[must_use]
    pub const fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Shut the write side down and drop the stream.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
    }
}
