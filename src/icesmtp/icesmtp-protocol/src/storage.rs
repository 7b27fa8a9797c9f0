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

use crate::envelope::Envelope;

/// Which storage operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum StorageOperation {
    /// [`Storage::store`].
    Store,
    /// [`Storage::store_stream`].
    StoreStream,
}

/// Receipt for a successfully persisted envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageReceipt {
    /// The identifier the backend filed the message under. May differ
    /// from the envelope id.
    pub message_id: String,
    /// The envelope that was stored.
    pub envelope_id: String,
    /// When the message was durably stored, if the backend knows.
    pub stored_at: Option<std::time::SystemTime>,
    /// Bytes written by the backend.
    pub bytes_written: u64,
    /// Backend-specific receipt data.
    pub backend: Option<String>,
}

/// A failed storage operation. Per-transaction, never per-session
/// fatal: the engine answers 451 and the session continues.
#[derive(Debug, thiserror::Error)]
#[error("storage {operation} failed for envelope {envelope_id}: {message}")]
pub struct StorageError {
    /// The operation that failed.
    pub operation: StorageOperation,
    /// The envelope being stored.
    pub envelope_id: String,
    /// Whether retrying the operation may succeed.
    pub retryable: bool,
    /// Human-readable description.
    pub message: String,
    /// The underlying error, if any.
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl StorageError {
    /// A [`StorageOperation::Store`] failure for `envelope_id`.
    pub fn store(envelope_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: StorageOperation::Store,
            envelope_id: envelope_id.into(),
            retryable: false,
            message: message.into(),
            cause: None,
        }
    }

    /// Mark the failure as retryable.
    #[must_use]
    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }

    /// Attach the underlying error.
    #[must_use]
    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

/// Durable persistence for finalized envelopes. The engine commits an
/// envelope *before* acknowledging it: `store` returning `Ok` strictly
/// precedes the `250 accepted` reply, and a failed `store` is always
/// followed by a 4xx reply and an envelope drop.
///
/// Implementations are shared across sessions and must be internally
/// synchronized.
#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    /// Persist a finalized envelope.
    ///
    /// # Errors
    ///
    /// * the backend could not durably store the message
    async fn store(
        &self,
        envelope: std::sync::Arc<dyn Envelope>,
    ) -> Result<StorageReceipt, StorageError>;

    /// Persist an envelope whose content arrives through `data` instead
    /// of the envelope's own buffer, for backends that stream large
    /// messages. The default delegates to [`Storage::store`].
    ///
    /// # Errors
    ///
    /// * the backend could not durably store the message
    async fn store_stream(
        &self,
        envelope: std::sync::Arc<dyn Envelope>,
        data: &mut (dyn tokio::io::AsyncRead + Send + Unpin),
    ) -> Result<StorageReceipt, StorageError> {
        let _ = data;
        self.store(envelope).await
    }
}
