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

use crate::command::MailPath;
use crate::session::SessionInfo;
use icesmtp_common::Reply;

/// The outcome of validating one forward-path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum RecipientStatus {
    /// Not validated yet.
    Pending,
    /// The recipient is accepted.
    Accepted,
    /// The recipient is permanently refused.
    Rejected,
    /// The recipient is temporarily refused.
    Deferred,
}

/// A recipient validation verdict: the status plus the reply the engine
/// sends verbatim when the status is anything but `Accepted`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientResult {
    /// The validation status.
    pub status: RecipientStatus,
    /// The reply to send to the client.
    pub reply: Reply,
}

impl RecipientResult {
    /// Accept the recipient.
    #[must_use]
    pub fn accepted() -> Self {
        Self {
            status: RecipientStatus::Accepted,
            reply: Reply::ok(),
        }
    }

    /// Permanently refuse the recipient with `reply`.
    #[must_use]
    pub const fn rejected(reply: Reply) -> Self {
        Self {
            status: RecipientStatus::Rejected,
            reply,
        }
    }

    /// Temporarily refuse the recipient with `reply`.
    #[must_use]
    pub const fn deferred(reply: Reply) -> Self {
        Self {
            status: RecipientStatus::Deferred,
            reply,
        }
    }
}

/// Validates forward-paths during RCPT processing. Implementations may
/// be backed by databases, directories, APIs or static tables, and must
/// be safe to call concurrently from independent sessions.
#[async_trait::async_trait]
pub trait Mailbox: Send + Sync {
    /// Decide whether `recipient` is deliverable for this session.
    async fn validate_recipient(
        &self,
        recipient: &MailPath,
        session: &SessionInfo,
    ) -> RecipientResult;
}

/// A sender validation verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderResult {
    /// Whether the sender is accepted.
    pub accepted: bool,
    /// The reply to send when the sender is refused.
    pub reply: Reply,
    /// The sender would be acceptable after authentication.
    pub require_auth: bool,
}

impl SenderResult {
    /// Accept the sender.
    #[must_use]
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            reply: Reply::ok(),
            require_auth: false,
        }
    }

    /// Refuse the sender with `reply`.
    #[must_use]
    pub const fn rejected(reply: Reply) -> Self {
        Self {
            accepted: false,
            reply,
            require_auth: false,
        }
    }
}

/// Validates reverse-paths during MAIL processing. Optional: a session
/// without a sender policy accepts every sender.
#[async_trait::async_trait]
pub trait SenderPolicy: Send + Sync {
    /// Decide whether `sender` may start a transaction on this session.
    async fn validate_sender(&self, sender: &MailPath, session: &SessionInfo) -> SenderResult;
}
