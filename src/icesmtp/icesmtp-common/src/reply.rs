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

use crate::{EnhancedCode, ReplyCode};

/// An SMTP reply sent by the server to the client, as defined in
/// RFC 5321 section 4.2.
///
/// A reply carries a code, an optional enhanced status code and zero or
/// more text lines. Multi-line replies use the `code-text` separator on
/// every line but the last, which uses `code text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    code: ReplyCode,
    enhanced: Option<EnhancedCode>,
    lines: Vec<String>,
}

impl Reply {
    /// Create a single-line reply.
    pub fn new(code: ReplyCode, text: impl Into<String>) -> Self {
        Self {
            code,
            enhanced: None,
            lines: vec![text.into()],
        }
    }

    /// Create a single-line reply carrying an enhanced status code.
    pub fn with_enhanced(code: ReplyCode, enhanced: EnhancedCode, text: impl Into<String>) -> Self {
        Self {
            code,
            enhanced: Some(enhanced),
            lines: vec![text.into()],
        }
    }

    /// Create a multi-line reply.
    pub fn multiline<I, S>(code: ReplyCode, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            code,
            enhanced: None,
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    /// Create a reply with no text at all.
    #[must_use]
    pub const fn bare(code: ReplyCode) -> Self {
        Self {
            code,
            enhanced: None,
            lines: Vec::new(),
        }
    }

    /// Attach an enhanced status code to this reply.
    #[must_use]
    pub fn enhanced(mut self, enhanced: EnhancedCode) -> Self {
        self.enhanced = Some(enhanced);
        self
    }

    /// The reply code.
    #[must_use]
    pub const fn code(&self) -> ReplyCode {
        self.code
    }

    /// The enhanced status code, if any.
    #[must_use]
    pub const fn enhanced_code(&self) -> Option<EnhancedCode> {
        self.enhanced
    }

    /// The text lines of this reply.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Serialize this reply into its wire form, CRLF terminated.
    #[must_use]
    pub fn to_wire(&self) -> String {
        let code = self.code;
        if self.lines.is_empty() {
            return match self.enhanced {
                Some(enhanced) => format!("{code} {enhanced}\r\n"),
                None => format!("{code}\r\n"),
            };
        }

        let mut out = String::new();
        let last = self.lines.len() - 1;
        for (i, line) in self.lines.iter().enumerate() {
            let sep = if i == last { ' ' } else { '-' };
            match self.enhanced {
                Some(enhanced) => {
                    out.push_str(&format!("{code}{sep}{enhanced} {line}\r\n"));
                }
                None => out.push_str(&format!("{code}{sep}{line}\r\n")),
            }
        }
        out
    }
}

impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_wire())
    }
}

/// The fixed set of prebuilt replies reused across the engine.
impl Reply {
    /// `211 System status`
    #[must_use]
    pub fn system_status() -> Self {
        Self::new(ReplyCode::SYSTEM_STATUS, "System status")
    }

    /// `214 Help available`
    #[must_use]
    pub fn help_message() -> Self {
        Self::new(ReplyCode::HELP_MESSAGE, "Help available")
    }

    /// `220 Service ready`
    #[must_use]
    pub fn service_ready() -> Self {
        Self::new(ReplyCode::SERVICE_READY, "Service ready")
    }

    /// `221 Bye`
    #[must_use]
    pub fn bye() -> Self {
        Self::new(ReplyCode::SERVICE_CLOSING, "Bye")
    }

    /// `250 OK`
    #[must_use]
    pub fn ok() -> Self {
        Self::new(ReplyCode::OK, "OK")
    }

    /// `251 User not local; will forward`
    #[must_use]
    pub fn user_not_local_forward() -> Self {
        Self::new(ReplyCode::USER_NOT_LOCAL_FORWARD, "User not local; will forward")
    }

    /// `252 Cannot VRFY user`
    #[must_use]
    pub fn cannot_vrfy() -> Self {
        Self::new(
            ReplyCode::CANNOT_VRFY,
            "Cannot VRFY user; try RCPT to attempt delivery",
        )
    }

    /// `354 Start mail input`
    #[must_use]
    pub fn start_mail_input() -> Self {
        Self::new(
            ReplyCode::START_MAIL_INPUT,
            "Start mail input; end with <CRLF>.<CRLF>",
        )
    }

    /// `421 Service not available`
    #[must_use]
    pub fn service_not_available() -> Self {
        Self::new(
            ReplyCode::SERVICE_NOT_AVAILABLE,
            "Service not available, closing transmission channel",
        )
    }

    /// `450 Mailbox unavailable` (transient)
    #[must_use]
    pub fn mailbox_busy() -> Self {
        Self::new(
            ReplyCode::MAILBOX_BUSY,
            "Requested mail action not taken: mailbox unavailable",
        )
    }

    /// `451 Local error in processing`
    #[must_use]
    pub fn local_error() -> Self {
        Self::new(
            ReplyCode::LOCAL_ERROR,
            "Requested action aborted: local error in processing",
        )
    }

    /// `452 Insufficient system storage`
    #[must_use]
    pub fn insufficient_storage() -> Self {
        Self::new(
            ReplyCode::INSUFFICIENT_STORAGE,
            "Requested action not taken: insufficient system storage",
        )
    }

    /// `454 TLS not available`
    #[must_use]
    pub fn tls_not_available() -> Self {
        Self::new(
            ReplyCode::TLS_NOT_AVAILABLE,
            "TLS not available due to temporary reason",
        )
    }

    /// `455 Server unable to accommodate parameters`
    #[must_use]
    pub fn params_not_accommodated() -> Self {
        Self::new(
            ReplyCode::PARAMS_NOT_ACCOMMODATED,
            "Server unable to accommodate parameters",
        )
    }

    /// `500 Syntax error, command unrecognized`
    #[must_use]
    pub fn syntax_error() -> Self {
        Self::new(ReplyCode::SYNTAX_ERROR, "Syntax error, command unrecognized")
    }

    /// `501 Syntax error in parameters or arguments`
    #[must_use]
    pub fn syntax_error_params() -> Self {
        Self::new(
            ReplyCode::SYNTAX_ERROR_PARAMS,
            "Syntax error in parameters or arguments",
        )
    }

    /// `502 Command not implemented`
    #[must_use]
    pub fn command_not_implemented() -> Self {
        Self::new(ReplyCode::NOT_IMPLEMENTED, "Command not implemented")
    }

    /// `503 Bad sequence of commands`
    #[must_use]
    pub fn bad_sequence() -> Self {
        Self::new(ReplyCode::BAD_SEQUENCE, "Bad sequence of commands")
    }

    /// `504 Command parameter not implemented`
    #[must_use]
    pub fn param_not_implemented() -> Self {
        Self::new(
            ReplyCode::PARAM_NOT_IMPLEMENTED,
            "Command parameter not implemented",
        )
    }

    /// `530 Must issue a STARTTLS command first`
    #[must_use]
    pub fn starttls_required() -> Self {
        Self::new(ReplyCode::STARTTLS_REQUIRED, "Must issue STARTTLS first")
    }

    /// `550 Mailbox unavailable`
    #[must_use]
    pub fn mailbox_unavailable() -> Self {
        Self::new(ReplyCode::MAILBOX_UNAVAILABLE, "Mailbox unavailable")
    }

    /// `551 User not local`
    #[must_use]
    pub fn user_not_local() -> Self {
        Self::new(ReplyCode::USER_NOT_LOCAL, "User not local")
    }

    /// `552 Exceeded storage allocation`
    #[must_use]
    pub fn exceeded_storage() -> Self {
        Self::new(ReplyCode::EXCEEDED_STORAGE, "Exceeded storage allocation")
    }

    /// `553 Mailbox name not allowed`
    #[must_use]
    pub fn mailbox_name_invalid() -> Self {
        Self::new(ReplyCode::MAILBOX_NAME_INVALID, "Mailbox name not allowed")
    }

    /// `554 Transaction failed`
    #[must_use]
    pub fn transaction_failed() -> Self {
        Self::new(ReplyCode::TRANSACTION_FAILED, "Transaction failed")
    }

    /// `555 MAIL FROM/RCPT TO parameters not recognized`
    #[must_use]
    pub fn params_not_recognized() -> Self {
        Self::new(
            ReplyCode::PARAMS_NOT_RECOGNIZED,
            "MAIL FROM/RCPT TO parameters not recognized or not implemented",
        )
    }
}
