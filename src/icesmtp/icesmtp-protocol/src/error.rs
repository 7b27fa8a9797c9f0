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

use crate::state_machine::StateTransitionError;
use crate::tls::TlsError;

/// Why [`Engine::run`](crate::Engine::run) gave up on a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A transport error, including read/write deadline overruns
    /// (`ErrorKind::TimedOut`).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// TLS configuration or handshake failure.
    #[error(transparent)]
    Tls(#[from] TlsError),

    /// The engine attempted an illegal state transition.
    #[error(transparent)]
    StateTransition(#[from] StateTransitionError),

    /// The consecutive-error budget is exhausted.
    #[error("too many consecutive errors")]
    TooManyErrors,

    /// The run was cancelled through its token.
    #[error("session cancelled")]
    Cancelled,

    /// A command hook vetoed processing.
    #[error("command hook rejected the command: {0}")]
    Hook(anyhow::Error),
}

impl SessionError {
    /// True when the underlying cause is a read or write deadline.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Io(err) if err.kind() == std::io::ErrorKind::TimedOut)
    }
}
