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

use crate::command::{forbids_argument, requires_argument, Command, EsmtpParams, MailPath, Verb};

/// Error while parsing a command line, a mail path or a hostname.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The command line exceeds the configured length cap.
    #[error("command line longer than {limit} bytes (got {length})")]
    CommandTooLong {
        /// The configured cap.
        limit: usize,
        /// The actual line length.
        length: usize,
    },
    /// The command line is empty.
    #[error("empty command")]
    EmptyCommand,
    /// The verb is not a recognized SMTP command.
    #[error("unrecognized command {0:?}")]
    InvalidCommand(String),
    /// The command requires an argument and none was given.
    #[error("{0} requires an argument")]
    MissingArgument(Verb),
    /// The command does not accept an argument but one was given.
    #[error("{0} does not accept arguments")]
    UnexpectedArgument(Verb),
    /// The mail path is malformed.
    #[error("invalid mail path: {0}")]
    InvalidPath(&'static str),
    /// The address inside the path is malformed.
    #[error("invalid email address {0:?}")]
    InvalidAddress(String),
    /// The `FROM:` / `TO:` prefix is missing.
    #[error("missing colon after {0}")]
    MissingColon(PathPrefix),
    /// General syntax error.
    #[error("syntax error: {0}")]
    InvalidSyntax(&'static str),
    /// The line is not valid UTF-8.
    #[error("command line is not valid utf-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

/// The keyword introducing a mail path: `FROM` for MAIL, `TO` for RCPT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum PathPrefix {
    /// The reverse-path prefix of MAIL.
    From,
    /// The forward-path prefix of RCPT.
    To,
}

/// The SMTP command line parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parser {
    /// Longest accepted command line, in bytes including CRLF.
    pub max_command_length: usize,
}

impl Default for Parser {
    fn default() -> Self {
        Self {
            // RFC 5321 section 4.5.3.1.4
            max_command_length: 512,
        }
    }
}

impl Parser {
    /// Parse a single command line, trailing CRLF included.
    ///
    /// # Errors
    ///
    /// * the line exceeds the length cap, is empty, carries an
    ///   unrecognized verb or violates the verb's argument rules
    pub fn parse_command(&self, line: &[u8]) -> Result<Command, ParseError> {
        if self.max_command_length > 0 && line.len() > self.max_command_length {
            return Err(ParseError::CommandTooLong {
                limit: self.max_command_length,
                length: line.len(),
            });
        }

        let line = std::str::from_utf8(line)?;
        let line = line
            .strip_suffix("\r\n")
            .or_else(|| line.strip_suffix('\n'))
            .unwrap_or(line);

        if line.is_empty() {
            return Err(ParseError::EmptyCommand);
        }

        let (verb_text, rest) = match line.split_once(' ') {
            Some((verb, rest)) => (verb, rest),
            None => (line, ""),
        };

        let verb = verb_text
            .trim()
            .to_ascii_uppercase()
            .parse::<Verb>()
            .unwrap_or(Verb::Unknown);
        if verb == Verb::Unknown {
            return Err(ParseError::InvalidCommand(
                verb_text.trim().to_ascii_uppercase(),
            ));
        }

        let argument = rest.trim().to_string();
        if requires_argument(verb) && argument.is_empty() {
            return Err(ParseError::MissingArgument(verb));
        }
        if forbids_argument(verb) && !argument.is_empty() {
            return Err(ParseError::UnexpectedArgument(verb));
        }

        let params = if matches!(verb, Verb::Mail | Verb::Rcpt) {
            parse_esmtp_params(&argument)
        } else {
            EsmtpParams::new()
        };

        Ok(Command {
            verb,
            raw: line.to_string(),
            argument,
            params,
        })
    }
}

/// Extract ESMTP parameters from a MAIL/RCPT argument: everything after
/// the first `>`, split on whitespace. `KEY=VALUE` tokens keep their
/// value, bare keywords map to an empty string; keys are uppercased.
fn parse_esmtp_params(argument: &str) -> EsmtpParams {
    let mut params = EsmtpParams::new();
    let Some(close) = argument.find('>') else {
        return params;
    };
    for token in argument[close + 1..].split_whitespace() {
        match token.split_once('=') {
            Some((key, value)) => {
                params.insert(key.to_ascii_uppercase(), value.to_string());
            }
            None => {
                params.insert(token.to_ascii_uppercase(), String::new());
            }
        }
    }
    params
}

/// Parse the path argument of MAIL or RCPT: `FROM:<path>` / `TO:<path>`,
/// possibly followed by ESMTP parameters which are ignored here.
///
/// # Errors
///
/// * the prefix or its colon is missing
/// * the path is not bracketed
/// * the address is malformed, or a null path is given for `TO`
pub fn parse_mail_path(argument: &str, prefix: PathPrefix) -> Result<MailPath, ParseError> {
    let argument = argument.trim();
    let tag = prefix.to_string();

    let matches_prefix = argument
        .as_bytes()
        .get(..tag.len() + 1)
        .map_or(false, |head| {
            head[..tag.len()].eq_ignore_ascii_case(tag.as_bytes()) && head[tag.len()] == b':'
        });
    if !matches_prefix {
        return Err(ParseError::MissingColon(prefix));
    }

    let rest = argument[tag.len() + 1..].trim();
    if !rest.starts_with('<') {
        return Err(ParseError::InvalidPath("path must start with '<'"));
    }
    let Some(close) = rest.find('>') else {
        return Err(ParseError::InvalidPath("path must end with '>'"));
    };
    let inner = &rest[1..close];

    if inner.is_empty() {
        if prefix == PathPrefix::From {
            return Ok(MailPath::null());
        }
        return Err(ParseError::InvalidPath(
            "null path is only valid as a reverse-path",
        ));
    }

    // Deprecated source route: consume "@a,@b:" and ignore it.
    let (source_route, address) = if inner.starts_with('@') {
        match inner.find(':') {
            Some(colon) => (&inner[..=colon], &inner[colon + 1..]),
            None => ("", inner),
        }
    } else {
        ("", inner)
    };

    if !is_valid_address(address) {
        return Err(ParseError::InvalidAddress(address.to_string()));
    }

    Ok(MailPath {
        address: address.to_string(),
        source_route: source_route.to_string(),
        is_null: false,
    })
}

/// Loose RFC 5321 mailbox validation: exactly one `@`, both sides
/// non-empty, domain drawn from `[A-Za-z0-9.-]` and not edged by `.`
/// or `-`. Address literal domains are not accepted in paths.
fn is_valid_address(address: &str) -> bool {
    let mut parts = address.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => !local.is_empty() && is_valid_domain(domain),
        _ => false,
    }
}

fn is_valid_domain(domain: &str) -> bool {
    if domain.is_empty()
        || domain.starts_with('.')
        || domain.starts_with('-')
        || domain.ends_with('.')
        || domain.ends_with('-')
    {
        return false;
    }
    domain
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}

/// Validate a HELO/EHLO argument: either an address literal `[...]`
/// accepted unchanged, or a DNS name of dot-separated labels.
///
/// # Errors
///
/// * the argument is empty, an unclosed literal, or not a valid DNS name
pub fn parse_helo_hostname(argument: &str) -> Result<String, ParseError> {
    let hostname = argument.trim();
    if hostname.is_empty() {
        return Err(ParseError::InvalidSyntax("hostname required"));
    }

    if hostname.starts_with('[') {
        if !hostname.ends_with(']') {
            return Err(ParseError::InvalidSyntax("unclosed address literal"));
        }
        return Ok(hostname.to_string());
    }

    if !is_valid_hostname(hostname) {
        return Err(ParseError::InvalidSyntax("invalid hostname"));
    }
    Ok(hostname.to_string())
}

fn is_valid_hostname(hostname: &str) -> bool {
    if hostname.is_empty() || hostname.len() > 255 {
        return false;
    }
    hostname.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            && label.starts_with(|c: char| c.is_ascii_alphanumeric())
            && label.ends_with(|c: char| c.is_ascii_alphanumeric())
    })
}

/// Line-level helpers for the DATA phase framing: terminator detection
/// and dot-(un)stuffing, state-free per line.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataLineReader;

impl DataLineReader {
    /// True iff the line, stripped of its CRLF, is the single dot that
    /// terminates the message content.
    #[must_use]
    pub fn is_terminator(line: &[u8]) -> bool {
        let line = line
            .strip_suffix(b"\r\n")
            .or_else(|| line.strip_suffix(b"\n"))
            .unwrap_or(line);
        line == b"."
    }

    /// Remove dot-stuffing: strip exactly one leading dot if present.
    #[must_use]
    pub fn unstuff(line: &[u8]) -> &[u8] {
        match line {
            [b'.', rest @ ..] => rest,
            _ => line,
        }
    }

    /// Apply dot-stuffing: prepend a dot if the line starts with one.
    /// Used when producing data for a client, never in the read path.
    #[must_use]
    pub fn stuff(line: &[u8]) -> std::borrow::Cow<'_, [u8]> {
        if line.first() == Some(&b'.') {
            let mut stuffed = Vec::with_capacity(line.len() + 1);
            stuffed.push(b'.');
            stuffed.extend_from_slice(line);
            std::borrow::Cow::Owned(stuffed)
        } else {
            std::borrow::Cow::Borrowed(line)
        }
    }
}
