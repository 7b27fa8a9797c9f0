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

/// Why a session ended. Reported exactly once per session through the
/// `on_disconnect` hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum DisconnectReason {
    /// The client sent QUIT.
    Normal,
    /// The session timed out or its run was cancelled.
    Timeout,
    /// An I/O or protocol error tore the session down.
    Error,
    /// A policy decision closed the session.
    PolicyViolation,
    /// A resource ceiling (error budget, ...) closed the session.
    ResourceLimit,
    /// The TLS handshake failed.
    TlsFailure,
    /// The server is shutting down.
    ServerShutdown,
}
