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

/// Per-session resource ceilings.
///
/// A value of zero means "no cap" for counts and sizes, and "no timeout"
/// for durations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLimits {
    /// Maximum message size in bytes.
    pub max_message_size: u64,
    /// Maximum recipients per message.
    pub max_recipients: usize,
    /// Maximum length of a command line in bytes (RFC 5321: 512).
    pub max_command_length: usize,
    /// Maximum length of a message data line in bytes (RFC 5321: 998).
    pub max_line_length: usize,
    /// Timeout for reading one command line.
    pub command_timeout: std::time::Duration,
    /// Timeout for reading one line of message data.
    pub data_timeout: std::time::Duration,
    /// Timeout for an idle connection, used when `command_timeout` is unset.
    pub idle_timeout: std::time::Duration,
    /// Maximum consecutive protocol errors before disconnection.
    pub max_errors: u32,
    /// Maximum mail transactions per session.
    pub max_transactions: u32,
    /// Maximum authentication attempts per session.
    pub max_auth_attempts: u32,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_message_size: 25 * 1024 * 1024,
            max_recipients: 100,
            max_command_length: 512,
            max_line_length: 998,
            command_timeout: std::time::Duration::from_secs(5 * 60),
            data_timeout: std::time::Duration::from_secs(10 * 60),
            idle_timeout: std::time::Duration::from_secs(5 * 60),
            max_errors: 10,
            max_transactions: 100,
            max_auth_attempts: 3,
        }
    }
}

impl SessionLimits {
    /// Limits with every cap and timeout disabled.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_message_size: 0,
            max_recipients: 0,
            max_command_length: 0,
            max_line_length: 0,
            command_timeout: std::time::Duration::ZERO,
            data_timeout: std::time::Duration::ZERO,
            idle_timeout: std::time::Duration::ZERO,
            max_errors: 0,
            max_transactions: 0,
            max_auth_attempts: 0,
        }
    }

    /// True when `size` exceeds the message size cap.
    #[must_use]
    pub const fn message_size_exceeded(&self, size: u64) -> bool {
        self.max_message_size > 0 && size > self.max_message_size
    }

    /// True when `count` recipients already reach the recipient cap.
    #[must_use]
    pub const fn recipients_at_limit(&self, count: usize) -> bool {
        self.max_recipients > 0 && count >= self.max_recipients
    }

    /// True when a command line of `length` bytes exceeds the cap.
    #[must_use]
    pub const fn command_too_long(&self, length: usize) -> bool {
        self.max_command_length > 0 && length > self.max_command_length
    }

    /// True when a data line of `length` bytes exceeds the cap.
    #[must_use]
    pub const fn line_too_long(&self, length: usize) -> bool {
        self.max_line_length > 0 && length > self.max_line_length
    }

    /// True once `count` consecutive errors consume the whole budget.
    /// The check is strict: the `max_errors`th error trips it.
    #[must_use]
    pub const fn error_budget_exhausted(&self, count: u32) -> bool {
        self.max_errors > 0 && count >= self.max_errors
    }

    /// True when `count` transactions already reach the transaction cap.
    #[must_use]
    pub const fn transactions_at_limit(&self, count: u32) -> bool {
        self.max_transactions > 0 && count >= self.max_transactions
    }

    /// The timeout for the next command read: `command_timeout` if set,
    /// falling back to `idle_timeout`.
    #[must_use]
    pub fn command_read_timeout(&self) -> Option<std::time::Duration> {
        if !self.command_timeout.is_zero() {
            Some(self.command_timeout)
        } else if !self.idle_timeout.is_zero() {
            Some(self.idle_timeout)
        } else {
            None
        }
    }

    /// The timeout for the next message data line read.
    #[must_use]
    pub fn data_read_timeout(&self) -> Option<std::time::Duration> {
        if self.data_timeout.is_zero() {
            None
        } else {
            Some(self.data_timeout)
        }
    }

    /// The deadline for a STARTTLS handshake: `command_timeout` if set,
    /// else 30 seconds. A stalled handshake must never hold the session
    /// open indefinitely.
    #[must_use]
    pub fn tls_handshake_timeout(&self) -> std::time::Duration {
        if self.command_timeout.is_zero() {
            std::time::Duration::from_secs(30)
        } else {
            self.command_timeout
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let limits = SessionLimits::default();
        assert_eq!(limits.max_message_size, 25 * 1024 * 1024);
        assert_eq!(limits.max_recipients, 100);
        assert_eq!(limits.max_command_length, 512);
        assert_eq!(limits.max_line_length, 998);
        assert_eq!(limits.max_errors, 10);
        assert_eq!(limits.max_transactions, 100);
        assert_eq!(limits.max_auth_attempts, 3);
    }

    #[test]
    fn zero_means_uncapped() {
        let limits = SessionLimits::unlimited();
        assert!(!limits.message_size_exceeded(u64::MAX));
        assert!(!limits.recipients_at_limit(usize::MAX));
        assert!(!limits.error_budget_exhausted(u32::MAX));
        assert!(!limits.transactions_at_limit(u32::MAX));
        assert_eq!(limits.command_read_timeout(), None);
        assert_eq!(limits.data_read_timeout(), None);
    }

    #[test]
    fn error_budget_is_strict() {
        let limits = SessionLimits {
            max_errors: 3,
            ..SessionLimits::default()
        };
        assert!(!limits.error_budget_exhausted(2));
        assert!(limits.error_budget_exhausted(3));
        assert!(limits.error_budget_exhausted(4));
    }

    #[test]
    fn command_timeout_falls_back_to_idle() {
        let limits = SessionLimits {
            command_timeout: std::time::Duration::ZERO,
            idle_timeout: std::time::Duration::from_secs(60),
            ..SessionLimits::default()
        };
        assert_eq!(
            limits.command_read_timeout(),
            Some(std::time::Duration::from_secs(60))
        );
    }

    #[test]
    fn handshake_deadline_defaults_to_thirty_seconds() {
        let limits = SessionLimits {
            command_timeout: std::time::Duration::ZERO,
            ..SessionLimits::default()
        };
        assert_eq!(
            limits.tls_handshake_timeout(),
            std::time::Duration::from_secs(30)
        );
    }
}
