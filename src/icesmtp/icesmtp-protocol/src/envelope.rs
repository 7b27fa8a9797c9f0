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

use crate::command::{EsmtpParams, MailPath};
use crate::envelope_builder::EnvelopeBuilder;

/// Session facts captured when the envelope was created, carried with it
/// into storage (the raw material of a `Received` header).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvelopeMetadata {
    /// The session that produced the envelope.
    pub session_id: String,
    /// The hostname the client gave in HELO/EHLO.
    pub client_hostname: Option<String>,
    /// The peer address of the connection.
    pub client_addr: Option<std::net::SocketAddr>,
    /// This server's hostname.
    pub server_hostname: String,
    /// Whether TLS was active during reception.
    pub tls_active: bool,
    /// The negotiated TLS version, if TLS was active.
    pub tls_version: Option<String>,
    /// The negotiated cipher suite, if TLS was active.
    pub tls_cipher: Option<String>,
    /// The authenticated username, if any.
    pub authenticated_user: Option<String>,
}

/// One SMTP mail transaction: reverse-path, forward-paths, ESMTP
/// parameters and message content, frozen at DATA completion.
///
/// The default backend buffers the content in memory; alternative
/// implementations may spill to disk as long as they uphold the same
/// lifecycle.
pub trait Envelope: std::fmt::Debug + Send + Sync {
    /// Unique envelope identifier, 12 random bytes as lowercase hex.
    fn id(&self) -> &str;

    /// The reverse-path given in MAIL FROM.
    fn mail_from(&self) -> &MailPath;

    /// The accepted forward-paths, in arrival order, duplicates kept.
    fn recipients(&self) -> &[MailPath];

    /// Number of accepted forward-paths.
    fn recipient_count(&self) -> usize {
        self.recipients().len()
    }

    /// ESMTP parameters from the MAIL command.
    fn esmtp_params(&self) -> &EsmtpParams;

    /// The value of the `SIZE` parameter, or 0 when absent.
    fn declared_size(&self) -> u64;

    /// When MAIL FROM was accepted.
    fn received_at(&self) -> std::time::SystemTime;

    /// The message content (headers and body), dot-unstuffed, CRLF line
    /// endings preserved. Empty until DATA completes.
    fn data(&self) -> &[u8];

    /// Actual size of the message content in bytes.
    fn data_size(&self) -> u64 {
        self.data().len() as u64
    }

    /// True once the envelope is frozen.
    fn is_finalized(&self) -> bool;

    /// Session facts captured at envelope creation.
    fn metadata(&self) -> &EnvelopeMetadata;
}

/// Creates envelope builders. Embedders supply their own factory to back
/// envelopes with something other than memory.
pub trait EnvelopeFactory: Send + Sync {
    /// A fresh builder carrying the given session metadata.
    fn new_builder(&self, metadata: EnvelopeMetadata) -> Box<dyn EnvelopeBuilder>;
}
