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

use crate::command::{Command, MailPath};
use crate::envelope::Envelope;
use crate::error::SessionError;
use crate::session::SessionInfo;
use crate::tls::TlsInfo;
use icesmtp_common::DisconnectReason;

/// Session lifecycle callbacks. Every method has a no-op default, so
/// implementations override only what they observe. Hooks are shared
/// across sessions and must be internally synchronized.
#[async_trait::async_trait]
pub trait SessionHooks: Send + Sync {
    /// A session started; the greeting has not been sent yet.
    async fn on_connect(&self, _session: &SessionInfo) {}

    /// The session ended. Fired exactly once, with the reason.
    async fn on_disconnect(&self, _session: &SessionInfo, _reason: DisconnectReason) {}

    /// A command was parsed and is about to be dispatched. Returning an
    /// error vetoes it: the engine answers `554 Transaction failed` and
    /// drops the command.
    async fn on_command(&self, _command: &Command, _session: &SessionInfo) -> anyhow::Result<()> {
        Ok(())
    }

    /// MAIL FROM was accepted.
    async fn on_mail_from(&self, _sender: &MailPath, _session: &SessionInfo) {}

    /// RCPT TO was accepted.
    async fn on_rcpt_to(&self, _recipient: &MailPath, _session: &SessionInfo) {}

    /// DATA was accepted; content transfer is about to begin.
    async fn on_data_start(&self, _session: &SessionInfo) {}

    /// A message was received, finalized and (when storage is
    /// configured) committed.
    async fn on_data_end(
        &self,
        _envelope: &std::sync::Arc<dyn Envelope>,
        _session: &SessionInfo,
    ) {
    }

    /// STARTTLS completed; the session restarts from the greeted state.
    async fn on_tls_upgrade(&self, _tls: &TlsInfo, _session: &SessionInfo) {}

    /// A session-level error occurred.
    async fn on_error(&self, _error: &SessionError, _session: &SessionInfo) {}
}
