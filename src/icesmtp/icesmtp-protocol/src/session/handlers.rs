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

use super::{Engine, HandlerOutcome};
use crate::command::{Command, Verb};
use crate::envelope_builder::MemoryEnvelopeBuilder;
use crate::error::SessionError;
use crate::mailbox::RecipientStatus;
use crate::parser::{parse_helo_hostname, parse_mail_path, PathPrefix};
use crate::tls::TlsPolicy;
use icesmtp_common::{Reply, ReplyCode};
use tokio_util::sync::CancellationToken;

impl Engine {
    pub(super) async fn dispatch(
        &mut self,
        command: &Command,
        shutdown: &CancellationToken,
    ) -> Result<HandlerOutcome, SessionError> {
        match command.verb {
            Verb::Helo => self.handle_helo(command).await,
            Verb::Ehlo => self.handle_ehlo(command).await,
            Verb::Mail => self.handle_mail(command).await,
            Verb::Rcpt => self.handle_rcpt(command).await,
            Verb::Data => self.handle_data(shutdown).await,
            Verb::Rset => self.handle_rset(),
            Verb::Noop => Ok(HandlerOutcome::Reply(Reply::ok())),
            Verb::Quit => self.handle_quit(),
            Verb::Vrfy => Ok(self.handle_vrfy()),
            Verb::Help => Ok(self.handle_help()),
            Verb::Starttls => self.handle_starttls(),
            Verb::Expn | Verb::Auth | Verb::Unknown => {
                Ok(HandlerOutcome::Reply(Reply::command_not_implemented()))
            }
        }
    }

    async fn handle_helo(&mut self, command: &Command) -> Result<HandlerOutcome, SessionError> {
        let Ok(hostname) = parse_helo_hostname(&command.argument) else {
            return Ok(HandlerOutcome::Violation(Reply::syntax_error_params()));
        };

        self.client_hostname = Some(hostname.clone());
        self.state_machine.transition_for_command(Verb::Helo)?;
        self.reset_transaction();

        Ok(HandlerOutcome::Reply(Reply::new(
            ReplyCode::OK,
            format!("{} Hello {hostname}", self.config.server_hostname),
        )))
    }

    async fn handle_ehlo(&mut self, command: &Command) -> Result<HandlerOutcome, SessionError> {
        let Ok(hostname) = parse_helo_hostname(&command.argument) else {
            return Ok(HandlerOutcome::Violation(Reply::syntax_error_params()));
        };

        self.client_hostname = Some(hostname.clone());
        self.state_machine.transition_for_command(Verb::Ehlo)?;
        self.reset_transaction();

        let mut lines = vec![format!("{} Hello {hostname}", self.config.server_hostname)];
        lines.extend(self.advertised_extensions());
        Ok(HandlerOutcome::Reply(Reply::multiline(ReplyCode::OK, lines)))
    }

    /// The extension lines EHLO advertises under the current
    /// configuration and TLS state. HELP derives its STARTTLS line from
    /// the same predicate, so the two can never disagree.
    fn advertised_extensions(&self) -> Vec<String> {
        let extensions = &self.config.extensions;
        let mut lines = Vec::new();
        if extensions.size && self.config.limits.max_message_size > 0 {
            lines.push(format!("SIZE {}", self.config.limits.max_message_size));
        }
        if self.starttls_advertised() {
            lines.push("STARTTLS".to_string());
        }
        if extensions.eight_bit_mime {
            lines.push("8BITMIME".to_string());
        }
        if extensions.pipelining {
            lines.push("PIPELINING".to_string());
        }
        if extensions.enhanced_status_codes {
            lines.push("ENHANCEDSTATUSCODES".to_string());
        }
        if extensions.smtputf8 {
            lines.push("SMTPUTF8".to_string());
        }
        if extensions.help {
            lines.push("HELP".to_string());
        }
        lines
    }

    pub(super) fn starttls_advertised(&self) -> bool {
        self.config.extensions.starttls
            && self.config.tls_policy != TlsPolicy::Disabled
            && !self.conn.is_tls()
    }

    async fn handle_mail(&mut self, command: &Command) -> Result<HandlerOutcome, SessionError> {
        if self.config.tls_policy == TlsPolicy::Required && !self.conn.is_tls() {
            return Ok(HandlerOutcome::Reply(Reply::starttls_required()));
        }

        if self.config.limits.transactions_at_limit(self.stats.transactions) {
            return Ok(HandlerOutcome::Reply(Reply::new(
                ReplyCode::SERVICE_NOT_AVAILABLE,
                "Too many transactions",
            )));
        }

        let Ok(path) = parse_mail_path(&command.argument, PathPrefix::From) else {
            return Ok(HandlerOutcome::Violation(Reply::syntax_error_params()));
        };

        // SIZE declared up front lets us refuse before any content moves.
        if self.config.extensions.size && self.config.limits.max_message_size > 0 {
            let declared = command
                .params
                .get("SIZE")
                .and_then(|value| value.parse::<u64>().ok());
            if let Some(declared) = declared {
                if declared > self.config.limits.max_message_size {
                    return Ok(HandlerOutcome::Reply(Reply::new(
                        ReplyCode::EXCEEDED_STORAGE,
                        "Message size exceeds fixed maximum message size",
                    )));
                }
            }
        }

        if let Some(policy) = self.config.sender_policy.clone() {
            let result = policy.validate_sender(&path, &self.info()).await;
            if !result.accepted {
                return Ok(HandlerOutcome::Reply(result.reply));
            }
        }

        let metadata = self.envelope_metadata();
        let mut builder = self.config.envelope_factory.as_ref().map_or_else(
            || {
                Box::new(MemoryEnvelopeBuilder::new(metadata.clone()))
                    as Box<dyn crate::EnvelopeBuilder>
            },
            |factory| factory.new_builder(metadata.clone()),
        );
        if builder.set_mail_from(path.clone(), command.params.clone()).is_err() {
            return Ok(HandlerOutcome::Reply(Reply::transaction_failed()));
        }
        self.envelope = Some(builder);

        self.state_machine.transition_for_command(Verb::Mail)?;
        self.hook_on_mail_from(&path).await;
        tracing::info!(sender = %path, "mail from accepted");

        Ok(HandlerOutcome::Reply(Reply::ok()))
    }

    async fn handle_rcpt(&mut self, command: &Command) -> Result<HandlerOutcome, SessionError> {
        let Ok(path) = parse_mail_path(&command.argument, PathPrefix::To) else {
            return Ok(HandlerOutcome::Violation(Reply::syntax_error_params()));
        };

        let Some(current) = self
            .envelope
            .as_ref()
            .map(|builder| builder.snapshot().recipient_count())
        else {
            return Ok(HandlerOutcome::Violation(Reply::bad_sequence()));
        };
        if self.config.limits.recipients_at_limit(current) {
            return Ok(HandlerOutcome::Reply(Reply::new(
                ReplyCode::INSUFFICIENT_STORAGE,
                "Too many recipients",
            )));
        }

        let mailbox = std::sync::Arc::clone(&self.config.mailbox);
        let result = mailbox.validate_recipient(&path, &self.info()).await;
        if result.status != RecipientStatus::Accepted {
            return Ok(HandlerOutcome::Reply(result.reply));
        }

        let Some(builder) = self.envelope.as_mut() else {
            return Ok(HandlerOutcome::Violation(Reply::bad_sequence()));
        };
        if builder.add_recipient(path.clone()).is_err() {
            return Ok(HandlerOutcome::Reply(Reply::transaction_failed()));
        }

        self.state_machine.transition_for_command(Verb::Rcpt)?;
        self.hook_on_rcpt_to(&path).await;
        tracing::info!(recipient = %path, "recipient accepted");

        Ok(HandlerOutcome::Reply(Reply::ok()))
    }

    fn handle_rset(&mut self) -> Result<HandlerOutcome, SessionError> {
        self.reset_transaction();
        self.state_machine.reset();
        Ok(HandlerOutcome::Reply(Reply::ok()))
    }

    fn handle_quit(&mut self) -> Result<HandlerOutcome, SessionError> {
        self.state_machine.transition_for_command(Verb::Quit)?;
        self.state_machine.terminate()?;
        Ok(HandlerOutcome::Reply(Reply::bye()))
    }

    fn handle_vrfy(&self) -> HandlerOutcome {
        if !self.config.extensions.vrfy {
            return HandlerOutcome::Reply(Reply::command_not_implemented());
        }
        // Deliberately refuses to enumerate mailboxes.
        HandlerOutcome::Reply(Reply::cannot_vrfy())
    }

    fn handle_help(&self) -> HandlerOutcome {
        if !self.config.extensions.help {
            return HandlerOutcome::Reply(Reply::command_not_implemented());
        }
        let mut lines = vec![
            "Supported commands:".to_string(),
            "HELO EHLO MAIL RCPT DATA".to_string(),
            "RSET NOOP QUIT HELP".to_string(),
        ];
        if self.starttls_advertised() {
            lines.push("STARTTLS".to_string());
        }
        lines.push("For more information, consult RFC 5321".to_string());
        HandlerOutcome::Reply(Reply::multiline(ReplyCode::HELP_MESSAGE, lines))
    }

    fn handle_starttls(&mut self) -> Result<HandlerOutcome, SessionError> {
        if self.config.tls_policy == TlsPolicy::Disabled {
            return Ok(HandlerOutcome::Reply(Reply::command_not_implemented()));
        }
        if self.conn.is_tls() {
            return Ok(HandlerOutcome::Reply(Reply::new(
                ReplyCode::BAD_SEQUENCE,
                "TLS already active",
            )));
        }
        if self.config.tls_provider.is_none() {
            return Ok(HandlerOutcome::Reply(Reply::new(
                ReplyCode::TLS_NOT_AVAILABLE,
                "TLS not available",
            )));
        }

        self.state_machine.transition_for_command(Verb::Starttls)?;
        // The handshake itself runs on the next loop iteration, after
        // this reply reaches the client.
        Ok(HandlerOutcome::Reply(Reply::new(
            ReplyCode::SERVICE_READY,
            "Ready to start TLS",
        )))
    }
}
