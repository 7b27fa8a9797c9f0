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

/// A three-digit SMTP reply code as defined in RFC 5321 section 4.2.
///
/// The first digit partitions the reply space: 1yz preliminary, 2yz
/// positive completion, 3yz positive intermediate, 4yz transient negative,
/// 5yz permanent negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// 211
    pub const SYSTEM_STATUS: Self = Self(211);
    /// 214
    pub const HELP_MESSAGE: Self = Self(214);
    /// 220
    pub const SERVICE_READY: Self = Self(220);
    /// 221
    pub const SERVICE_CLOSING: Self = Self(221);
    /// 250
    pub const OK: Self = Self(250);
    /// 251
    pub const USER_NOT_LOCAL_FORWARD: Self = Self(251);
    /// 252
    pub const CANNOT_VRFY: Self = Self(252);
    /// 354
    pub const START_MAIL_INPUT: Self = Self(354);
    /// 421
    pub const SERVICE_NOT_AVAILABLE: Self = Self(421);
    /// 450
    pub const MAILBOX_BUSY: Self = Self(450);
    /// 451
    pub const LOCAL_ERROR: Self = Self(451);
    /// 452
    pub const INSUFFICIENT_STORAGE: Self = Self(452);
    /// 454
    pub const TLS_NOT_AVAILABLE: Self = Self(454);
    /// 455
    pub const PARAMS_NOT_ACCOMMODATED: Self = Self(455);
    /// 500
    pub const SYNTAX_ERROR: Self = Self(500);
    /// 501
    pub const SYNTAX_ERROR_PARAMS: Self = Self(501);
    /// 502
    pub const NOT_IMPLEMENTED: Self = Self(502);
    /// 503
    pub const BAD_SEQUENCE: Self = Self(503);
    /// 504
    pub const PARAM_NOT_IMPLEMENTED: Self = Self(504);
    /// 530
    pub const STARTTLS_REQUIRED: Self = Self(530);
    /// 550
    pub const MAILBOX_UNAVAILABLE: Self = Self(550);
    /// 551
    pub const USER_NOT_LOCAL: Self = Self(551);
    /// 552
    pub const EXCEEDED_STORAGE: Self = Self(552);
    /// 553
    pub const MAILBOX_NAME_INVALID: Self = Self(553);
    /// 554
    pub const TRANSACTION_FAILED: Self = Self(554);
    /// 555
    pub const PARAMS_NOT_RECOGNIZED: Self = Self(555);

    /// Create a reply code from its numeric value.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// The numeric value of this reply code.
    #[must_use]
    pub const fn value(self) -> u16 {
        self.0
    }

    /// Positive (2yz or 3yz) reply code.
    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 >= 200 && self.0 < 400
    }

    /// Negative (4yz or 5yz) reply code.
    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 >= 400
    }

    /// Transient negative (4yz) reply code.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        self.0 >= 400 && self.0 < 500
    }

    /// Permanent negative (5yz) reply code.
    #[must_use]
    pub const fn is_permanent(self) -> bool {
        self.0 >= 500
    }

    /// The category of this reply code (first digit times 100).
    #[must_use]
    pub const fn category(self) -> u16 {
        (self.0 / 100) * 100
    }
}

impl std::fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for ReplyCode {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

/// An enhanced mail system status code as defined in RFC 3463.
///
/// Rendered as `class.subject.detail` between the reply code and the text
/// when the ENHANCEDSTATUSCODES extension is in effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnhancedCode {
    /// Status class: 2 success, 4 persistent transient failure, 5 permanent failure.
    pub class: u16,
    /// Status subject (0 other, 1 addressing, 2 mailbox, 3 mail system,
    /// 4 network, 5 delivery protocol, 6 content, 7 policy).
    pub subject: u16,
    /// Subject-specific detail.
    pub detail: u16,
}

impl EnhancedCode {
    /// Create an enhanced status code triple.
    #[must_use]
    pub const fn new(class: u16, subject: u16, detail: u16) -> Self {
        Self {
            class,
            subject,
            detail,
        }
    }
}

impl std::fmt::Display for EnhancedCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.class, self.subject, self.detail)
    }
}
