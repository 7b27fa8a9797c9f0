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
use crate::envelope::{Envelope, EnvelopeFactory, EnvelopeMetadata};
use crate::id::random_hex;

/// Error from an envelope builder operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BuilderError {
    /// The envelope is frozen; no further mutation is allowed.
    #[error("envelope already finalized")]
    Finalized,
    /// MAIL FROM has not been set.
    #[error("no reverse-path set")]
    NoMailFrom,
    /// No recipient has been added.
    #[error("no recipients")]
    NoRecipients,
    /// A data writer is open; it must be closed before finalizing.
    #[error("data writer still open")]
    DataWriterOpen,
    /// A data writer has already been handed out.
    #[error("data writer already open")]
    DataWriterAlreadyOpen,
    /// The data writer was closed; no further writes are accepted.
    #[error("data writer is closed")]
    WriterClosed,
}

/// Sink for the message content of one transaction. The writer must be
/// closed before the envelope can be finalized, and rejects writes once
/// closed.
pub trait DataWriter: Send + std::fmt::Debug {
    /// Append `buf` to the message content.
    ///
    /// # Errors
    ///
    /// * the writer is already closed
    fn write(&mut self, buf: &[u8]) -> Result<usize, BuilderError>;

    /// Mark the content complete.
    ///
    /// # Errors
    ///
    /// * implementation-defined flush failures
    fn close(&mut self) -> Result<(), BuilderError>;
}

/// Accumulates one mail transaction and freezes it into an [`Envelope`].
pub trait EnvelopeBuilder: Send + Sync {
    /// Record the reverse-path and the MAIL ESMTP parameters.
    ///
    /// # Errors
    ///
    /// * the envelope is already finalized
    fn set_mail_from(&mut self, path: MailPath, params: EsmtpParams) -> Result<(), BuilderError>;

    /// Append a forward-path. Duplicates are kept, order is preserved.
    ///
    /// # Errors
    ///
    /// * the envelope is already finalized
    fn add_recipient(&mut self, path: MailPath) -> Result<(), BuilderError>;

    /// Open the single data writer for the message content.
    ///
    /// # Errors
    ///
    /// * a writer is already outstanding, or the envelope is finalized
    fn open_data_writer(&mut self) -> Result<Box<dyn DataWriter>, BuilderError>;

    /// Freeze the envelope. Requires a reverse-path, at least one
    /// recipient and a closed (or never opened) data writer.
    ///
    /// # Errors
    ///
    /// * [`BuilderError::NoMailFrom`], [`BuilderError::NoRecipients`],
    ///   [`BuilderError::DataWriterOpen`] or [`BuilderError::Finalized`]
    fn finalize(&mut self) -> Result<std::sync::Arc<dyn Envelope>, BuilderError>;

    /// Clear everything and assign a fresh envelope id. Idempotent.
    fn reset(&mut self);

    /// The current state as an (unfrozen) envelope, for inspection
    /// during the transaction.
    fn snapshot(&self) -> std::sync::Arc<dyn Envelope>;
}

/// The frozen product of [`MemoryEnvelopeBuilder`].
#[derive(Debug)]
struct MemoryEnvelope {
    id: String,
    mail_from: MailPath,
    recipients: Vec<MailPath>,
    params: EsmtpParams,
    declared_size: u64,
    received_at: std::time::SystemTime,
    data: Vec<u8>,
    finalized: bool,
    metadata: EnvelopeMetadata,
}

impl Envelope for MemoryEnvelope {
    fn id(&self) -> &str {
        &self.id
    }

    fn mail_from(&self) -> &MailPath {
        &self.mail_from
    }

    fn recipients(&self) -> &[MailPath] {
        &self.recipients
    }

    fn esmtp_params(&self) -> &EsmtpParams {
        &self.params
    }

    fn declared_size(&self) -> u64 {
        self.declared_size
    }

    fn received_at(&self) -> std::time::SystemTime {
        self.received_at
    }

    fn data(&self) -> &[u8] {
        &self.data
    }

    fn is_finalized(&self) -> bool {
        self.finalized
    }

    fn metadata(&self) -> &EnvelopeMetadata {
        &self.metadata
    }
}

#[derive(Debug, Default)]
struct DataBuffer {
    bytes: Vec<u8>,
    closed: bool,
}

/// Writer of the in-memory backend. Shares the buffer with its builder
/// so the builder can freeze the bytes at finalize time.
#[derive(Debug)]
struct MemoryDataWriter {
    buffer: std::sync::Arc<std::sync::Mutex<DataBuffer>>,
}

impl DataWriter for MemoryDataWriter {
    fn write(&mut self, buf: &[u8]) -> Result<usize, BuilderError> {
        let mut buffer = self.buffer.lock().expect("data buffer poisoned");
        if buffer.closed {
            return Err(BuilderError::WriterClosed);
        }
        buffer.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn close(&mut self) -> Result<(), BuilderError> {
        self.buffer.lock().expect("data buffer poisoned").closed = true;
        Ok(())
    }
}

/// The default envelope backend: message content buffered in memory.
pub struct MemoryEnvelopeBuilder {
    id: String,
    metadata: EnvelopeMetadata,
    mail_from: Option<MailPath>,
    recipients: Vec<MailPath>,
    params: EsmtpParams,
    declared_size: u64,
    received_at: std::time::SystemTime,
    buffer: Option<std::sync::Arc<std::sync::Mutex<DataBuffer>>>,
    finalized: bool,
}

impl MemoryEnvelopeBuilder {
    /// A fresh builder carrying the given session metadata.
    #[must_use]
    pub fn new(metadata: EnvelopeMetadata) -> Self {
        Self {
            id: random_hex(12),
            metadata,
            mail_from: None,
            recipients: Vec::new(),
            params: EsmtpParams::new(),
            declared_size: 0,
            received_at: std::time::SystemTime::now(),
            buffer: None,
            finalized: false,
        }
    }

    fn data_bytes(&self) -> Vec<u8> {
        self.buffer.as_ref().map_or_else(Vec::new, |buffer| {
            buffer.lock().expect("data buffer poisoned").bytes.clone()
        })
    }
}

impl EnvelopeBuilder for MemoryEnvelopeBuilder {
    fn set_mail_from(&mut self, path: MailPath, params: EsmtpParams) -> Result<(), BuilderError> {
        if self.finalized {
            return Err(BuilderError::Finalized);
        }
        self.declared_size = params
            .get("SIZE")
            .and_then(|value| value.parse().ok())
            .unwrap_or(0);
        self.mail_from = Some(path);
        self.params = params;
        self.received_at = std::time::SystemTime::now();
        Ok(())
    }

    fn add_recipient(&mut self, path: MailPath) -> Result<(), BuilderError> {
        if self.finalized {
            return Err(BuilderError::Finalized);
        }
        self.recipients.push(path);
        Ok(())
    }

    fn open_data_writer(&mut self) -> Result<Box<dyn DataWriter>, BuilderError> {
        if self.finalized {
            return Err(BuilderError::Finalized);
        }
        if self.buffer.is_some() {
            return Err(BuilderError::DataWriterAlreadyOpen);
        }
        let buffer = std::sync::Arc::new(std::sync::Mutex::new(DataBuffer::default()));
        self.buffer = Some(std::sync::Arc::clone(&buffer));
        Ok(Box::new(MemoryDataWriter { buffer }))
    }

    fn finalize(&mut self) -> Result<std::sync::Arc<dyn Envelope>, BuilderError> {
        if self.finalized {
            return Err(BuilderError::Finalized);
        }
        let Some(mail_from) = self.mail_from.clone() else {
            return Err(BuilderError::NoMailFrom);
        };
        if self.recipients.is_empty() {
            return Err(BuilderError::NoRecipients);
        }
        if let Some(buffer) = &self.buffer {
            if !buffer.lock().expect("data buffer poisoned").closed {
                return Err(BuilderError::DataWriterOpen);
            }
        }

        self.finalized = true;
        Ok(std::sync::Arc::new(MemoryEnvelope {
            id: self.id.clone(),
            mail_from,
            recipients: self.recipients.clone(),
            params: self.params.clone(),
            declared_size: self.declared_size,
            received_at: self.received_at,
            data: self.data_bytes(),
            finalized: true,
            metadata: self.metadata.clone(),
        }))
    }

    fn reset(&mut self) {
        self.id = random_hex(12);
        self.mail_from = None;
        self.recipients.clear();
        self.params.clear();
        self.declared_size = 0;
        self.received_at = std::time::SystemTime::now();
        self.buffer = None;
        self.finalized = false;
    }

    fn snapshot(&self) -> std::sync::Arc<dyn Envelope> {
        std::sync::Arc::new(MemoryEnvelope {
            id: self.id.clone(),
            mail_from: self.mail_from.clone().unwrap_or_default(),
            recipients: self.recipients.clone(),
            params: self.params.clone(),
            declared_size: self.declared_size,
            received_at: self.received_at,
            data: self.data_bytes(),
            finalized: self.finalized,
            metadata: self.metadata.clone(),
        })
    }
}

/// Factory for the in-memory backend; the default when the session
/// configuration names no other.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryEnvelopeFactory;

impl EnvelopeFactory for MemoryEnvelopeFactory {
    fn new_builder(&self, metadata: EnvelopeMetadata) -> Box<dyn EnvelopeBuilder> {
        Box::new(MemoryEnvelopeBuilder::new(metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> MemoryEnvelopeBuilder {
        MemoryEnvelopeBuilder::new(EnvelopeMetadata::default())
    }

    fn params_with_size(size: &str) -> EsmtpParams {
        EsmtpParams::from([("SIZE".to_string(), size.to_string())])
    }

    #[test]
    fn full_lifecycle() {
        let mut builder = builder();
        builder
            .set_mail_from(MailPath::new("a@b.example"), EsmtpParams::new())
            .unwrap();
        builder.add_recipient(MailPath::new("u@x.example")).unwrap();
        builder.add_recipient(MailPath::new("v@x.example")).unwrap();

        let mut writer = builder.open_data_writer().unwrap();
        writer.write(b"Subject: t\r\n\r\nhello\r\n").unwrap();
        writer.close().unwrap();

        let envelope = builder.finalize().unwrap();
        assert!(envelope.is_finalized());
        assert_eq!(envelope.mail_from().address, "a@b.example");
        assert_eq!(envelope.recipient_count(), 2);
        assert_eq!(envelope.data(), b"Subject: t\r\n\r\nhello\r\n");
        assert_eq!(envelope.data_size(), 21);
        assert_eq!(envelope.id().len(), 24);
    }

    #[test]
    fn finalize_requires_mail_from() {
        let mut builder = builder();
        builder.add_recipient(MailPath::new("u@x.example")).unwrap();
        assert_eq!(builder.finalize().unwrap_err(), BuilderError::NoMailFrom);
    }

    #[test]
    fn finalize_requires_recipients() {
        let mut builder = builder();
        builder
            .set_mail_from(MailPath::null(), EsmtpParams::new())
            .unwrap();
        assert_eq!(builder.finalize().unwrap_err(), BuilderError::NoRecipients);
    }

    #[test]
    fn finalize_requires_closed_writer() {
        let mut builder = builder();
        builder
            .set_mail_from(MailPath::new("a@b.example"), EsmtpParams::new())
            .unwrap();
        builder.add_recipient(MailPath::new("u@x.example")).unwrap();
        let mut writer = builder.open_data_writer().unwrap();
        assert_eq!(
            builder.finalize().unwrap_err(),
            BuilderError::DataWriterOpen
        );
        writer.close().unwrap();
        assert!(builder.finalize().is_ok());
    }

    #[test]
    fn finalize_is_single_shot() {
        let mut builder = builder();
        builder
            .set_mail_from(MailPath::new("a@b.example"), EsmtpParams::new())
            .unwrap();
        builder.add_recipient(MailPath::new("u@x.example")).unwrap();
        builder.finalize().unwrap();
        assert_eq!(builder.finalize().unwrap_err(), BuilderError::Finalized);
        assert_eq!(
            builder
                .add_recipient(MailPath::new("w@x.example"))
                .unwrap_err(),
            BuilderError::Finalized
        );
    }

    #[test]
    fn writer_rejects_writes_after_close() {
        let mut builder = builder();
        let mut writer = builder.open_data_writer().unwrap();
        writer.write(b"one").unwrap();
        writer.close().unwrap();
        assert_eq!(writer.write(b"two").unwrap_err(), BuilderError::WriterClosed);
    }

    #[test]
    fn only_one_writer() {
        let mut builder = builder();
        let _writer = builder.open_data_writer().unwrap();
        assert_eq!(
            builder.open_data_writer().unwrap_err(),
            BuilderError::DataWriterAlreadyOpen
        );
    }

    #[test]
    fn reset_regenerates_id_and_clears() {
        let mut builder = builder();
        let before = builder.snapshot().id().to_string();
        builder
            .set_mail_from(MailPath::new("a@b.example"), params_with_size("42"))
            .unwrap();
        builder.add_recipient(MailPath::new("u@x.example")).unwrap();
        builder.reset();

        let snapshot = builder.snapshot();
        assert_ne!(snapshot.id(), before);
        assert_eq!(snapshot.recipient_count(), 0);
        assert_eq!(snapshot.declared_size(), 0);
        assert!(!snapshot.is_finalized());

        builder.reset();
        assert_eq!(builder.snapshot().recipient_count(), 0);
    }

    #[test]
    fn declared_size_from_params() {
        let mut builder = builder();
        builder
            .set_mail_from(MailPath::new("a@b.example"), params_with_size("1000"))
            .unwrap();
        assert_eq!(builder.snapshot().declared_size(), 1000);

        builder.reset();
        builder
            .set_mail_from(MailPath::new("a@b.example"), params_with_size("garbage"))
            .unwrap();
        assert_eq!(builder.snapshot().declared_size(), 0);
    }

    #[test]
    fn snapshot_does_not_freeze() {
        let mut builder = builder();
        builder
            .set_mail_from(MailPath::new("a@b.example"), EsmtpParams::new())
            .unwrap();
        let snapshot = builder.snapshot();
        assert!(!snapshot.is_finalized());
        assert!(builder.add_recipient(MailPath::new("u@x.example")).is_ok());
    }
}
