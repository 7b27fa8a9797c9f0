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

/// The state of an SMTP session.
///
/// SMTP is stateful; commands are only legal in certain states. The engine
/// walks this taxonomy from `Disconnected` to one of the two terminal
/// states, `Terminated` (clean) or `Aborted` (forced).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum State {
    /// No connection is active yet.
    Disconnected,
    /// The transport is established but the greeting has not been sent.
    Connected,
    /// The 220 greeting has been sent; the client must identify itself.
    Greeted,
    /// HELO or EHLO has been accepted; a mail transaction may begin.
    Identified,
    /// MAIL FROM has been accepted; at least one RCPT TO must follow.
    MailFrom,
    /// At least one RCPT TO has been accepted.
    RcptTo,
    /// DATA has been accepted; the server is consuming message content.
    Data,
    /// Message content has been fully received.
    DataDone,
    /// STARTTLS has been accepted; TLS negotiation is in progress.
    StartTls,
    /// QUIT has been received; the 221 reply is on its way out.
    Terminating,
    /// The session ended cleanly.
    Terminated,
    /// The session was forcibly ended (error, limit or policy).
    Aborted,
}

impl State {
    /// True for the two final states from which no transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated | Self::Aborted)
    }

    /// True while a mail transaction is in flight, i.e. an envelope
    /// builder is live. A transaction begins with MAIL FROM and ends with
    /// DATA completion or RSET.
    #[must_use]
    pub const fn in_transaction(self) -> bool {
        matches!(self, Self::MailFrom | Self::RcptTo | Self::Data)
    }

    /// True if SMTP commands are read and dispatched in this state.
    /// The `Data` state accepts message content only.
    #[must_use]
    pub const fn can_accept_commands(self) -> bool {
        matches!(
            self,
            Self::Greeted | Self::Identified | Self::MailFrom | Self::RcptTo
        )
    }
}
