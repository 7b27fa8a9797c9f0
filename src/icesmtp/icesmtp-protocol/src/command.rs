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

use icesmtp_common::State;

/// An SMTP command verb. Commands are case-insensitive on the wire and
/// stored uppercase internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Verb {
    /// Identify the client with a plain hostname (RFC 5321).
    Helo,
    /// Identify the client and request extended SMTP (RFC 5321).
    Ehlo,
    /// Initiate a mail transaction with MAIL FROM (RFC 5321).
    Mail,
    /// Specify one recipient with RCPT TO (RFC 5321).
    Rcpt,
    /// Begin the message content transfer (RFC 5321).
    Data,
    /// Abort the current mail transaction (RFC 5321).
    Rset,
    /// Do nothing (RFC 5321).
    Noop,
    /// Terminate the session (RFC 5321).
    Quit,
    /// Verify a user or mailbox name (RFC 5321). Frequently disabled.
    Vrfy,
    /// Expand a mailing list (RFC 5321). Frequently disabled.
    Expn,
    /// Request help information (RFC 5321).
    Help,
    /// Negotiate TLS in-band (RFC 3207).
    Starttls,
    /// SASL authentication (RFC 4954).
    Auth,
    /// Anything that is not a recognized verb.
    Unknown,
}

/// ESMTP extension parameters from a MAIL or RCPT command. Keys are
/// uppercased; valueless keywords map to an empty string.
pub type EsmtpParams = std::collections::BTreeMap<String, String>;

/// A parsed SMTP command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// The command verb.
    pub verb: Verb,
    /// The command line as received, without the trailing CRLF.
    pub raw: String,
    /// The argument portion after the verb, trimmed.
    /// For `MAIL FROM:<addr>` this is `FROM:<addr>`.
    pub argument: String,
    /// ESMTP parameters, populated for MAIL and RCPT only.
    pub params: EsmtpParams,
}

/// A parsed reverse-path or forward-path.
///
/// Source routes (`@a,@b:user@domain`) are consumed but semantically
/// ignored, per RFC 5321 appendix C.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MailPath {
    /// The mailbox, `local-part@domain`. Empty for the null path.
    pub address: String,
    /// The deprecated source-route prefix, including its closing colon.
    pub source_route: String,
    /// True for the null reverse-path `<>`, used by bounces and DSNs.
    pub is_null: bool,
}

impl MailPath {
    /// A path with the given address and no source route.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            source_route: String::new(),
            is_null: false,
        }
    }

    /// The null reverse-path `<>`.
    #[must_use]
    pub const fn null() -> Self {
        Self {
            address: String::new(),
            source_route: String::new(),
            is_null: true,
        }
    }

    /// The part of the address before the `@`.
    #[must_use]
    pub fn local_part(&self) -> Option<&str> {
        self.address.split_once('@').map(|(local, _)| local)
    }

    /// The part of the address after the `@`.
    #[must_use]
    pub fn domain(&self) -> Option<&str> {
        self.address.split_once('@').map(|(_, domain)| domain)
    }
}

impl std::fmt::Display for MailPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_null {
            f.write_str("<>")
        } else {
            write!(f, "<{}{}>", self.source_route, self.address)
        }
    }
}

/// The commands legal in a given state. The `Data` state accepts no
/// commands at all, only message content.
#[must_use]
pub const fn allowed_commands(state: State) -> &'static [Verb] {
    match state {
        State::Greeted => &[
            Verb::Helo,
            Verb::Ehlo,
            Verb::Quit,
            Verb::Noop,
            Verb::Help,
            Verb::Rset,
        ],
        State::Identified => &[
            Verb::Helo,
            Verb::Ehlo,
            Verb::Mail,
            Verb::Quit,
            Verb::Noop,
            Verb::Help,
            Verb::Rset,
            Verb::Vrfy,
            Verb::Expn,
            Verb::Starttls,
            Verb::Auth,
        ],
        State::MailFrom => &[Verb::Rcpt, Verb::Rset, Verb::Quit, Verb::Noop, Verb::Help],
        State::RcptTo => &[
            Verb::Rcpt,
            Verb::Data,
            Verb::Rset,
            Verb::Quit,
            Verb::Noop,
            Verb::Help,
        ],
        _ => &[],
    }
}

/// True if `verb` may be dispatched in `state`.
#[must_use]
pub fn is_command_allowed(state: State, verb: Verb) -> bool {
    allowed_commands(state).contains(&verb)
}

/// True if the command must carry an argument.
#[must_use]
pub const fn requires_argument(verb: Verb) -> bool {
    matches!(verb, Verb::Helo | Verb::Ehlo | Verb::Mail | Verb::Rcpt)
}

/// True if the command must not carry an argument.
#[must_use]
pub const fn forbids_argument(verb: Verb) -> bool {
    matches!(verb, Verb::Data | Verb::Rset | Verb::Quit | Verb::Starttls)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verb_round_trip() {
        assert_eq!("HELO".parse::<Verb>().unwrap(), Verb::Helo);
        assert_eq!("STARTTLS".parse::<Verb>().unwrap(), Verb::Starttls);
        assert_eq!(Verb::Rcpt.to_string(), "RCPT");
        assert!("BDAT".parse::<Verb>().is_err());
    }

    #[test]
    fn argument_rules() {
        assert!(requires_argument(Verb::Mail));
        assert!(requires_argument(Verb::Ehlo));
        assert!(!requires_argument(Verb::Noop));
        assert!(forbids_argument(Verb::Quit));
        assert!(forbids_argument(Verb::Starttls));
        assert!(!forbids_argument(Verb::Help));
    }

    #[test]
    fn data_state_accepts_nothing() {
        assert!(allowed_commands(State::Data).is_empty());
        assert!(allowed_commands(State::Terminated).is_empty());
    }

    #[test]
    fn greeted_rejects_mail() {
        assert!(!is_command_allowed(State::Greeted, Verb::Mail));
        assert!(is_command_allowed(State::Greeted, Verb::Ehlo));
        assert!(is_command_allowed(State::Identified, Verb::Mail));
        assert!(is_command_allowed(State::RcptTo, Verb::Data));
        assert!(!is_command_allowed(State::MailFrom, Verb::Data));
    }

    #[test]
    fn path_accessors() {
        let path = MailPath::new("user@example.com");
        assert_eq!(path.local_part(), Some("user"));
        assert_eq!(path.domain(), Some("example.com"));
        assert_eq!(path.to_string(), "<user@example.com>");
        assert_eq!(MailPath::null().to_string(), "<>");
    }
}
