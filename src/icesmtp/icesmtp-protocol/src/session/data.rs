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
use crate::command::Verb;
use crate::envelope::Envelope;
use crate::envelope_builder::EnvelopeBuilder;
use crate::error::SessionError;
use crate::parser::DataLineReader;
use icesmtp_common::{Reply, ReplyCode};
use tokio_util::sync::CancellationToken;

enum BodyError {
    Io(std::io::Error),
    Timeout,
    Cancelled,
    Closed,
    LineTooLong,
    TooLarge,
}

impl Engine {
    /// DATA: announce `354`, stream the dot-framed content, then commit
    /// the envelope through the builder and storage. Limit violations
    /// drop the transaction but keep the session; transport failures
    /// tear the session down.
    pub(super) async fn handle_data(
        &mut self,
        shutdown: &CancellationToken,
    ) -> Result<HandlerOutcome, SessionError> {
        self.state_machine.transition_for_command(Verb::Data)?;
        self.hook_on_data_start().await;

        if let Err(err) = self.write_reply(&Reply::start_mail_input()).await {
            let _ = self.state_machine.abort();
            return Err(err);
        }

        let body = match self.read_body(shutdown).await {
            Ok(body) => body,
            Err(BodyError::LineTooLong) => {
                self.fail_transaction();
                return Ok(HandlerOutcome::Reply(Reply::new(
                    ReplyCode::LOCAL_ERROR,
                    "Line too long",
                )));
            }
            Err(BodyError::TooLarge) => {
                self.fail_transaction();
                return Ok(HandlerOutcome::Reply(Reply::new(
                    ReplyCode::EXCEEDED_STORAGE,
                    "Message size exceeds limit",
                )));
            }
            Err(BodyError::Timeout) => {
                let _ = self
                    .write_reply(&Reply::new(
                        ReplyCode::LOCAL_ERROR,
                        "Timeout receiving message data",
                    ))
                    .await;
                let _ = self.state_machine.abort();
                return Err(SessionError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "timed out receiving message data",
                )));
            }
            Err(BodyError::Cancelled) => {
                let _ = self.state_machine.abort();
                return Err(SessionError::Cancelled);
            }
            Err(BodyError::Closed) => {
                let _ = self.state_machine.abort();
                return Err(SessionError::ConnectionClosed);
            }
            Err(BodyError::Io(err)) => {
                let _ = self.state_machine.abort();
                return Err(SessionError::Io(err));
            }
        };

        Ok(HandlerOutcome::Reply(self.commit_envelope(body).await))
    }

    /// Read content lines until the `.` terminator, unstuffing each
    /// line and enforcing the line-length and total-size ceilings. Once
    /// a ceiling is crossed the rest of the content is drained (still
    /// under the data timeout) so the session stays in sync, and the
    /// violation is reported after the terminator.
    async fn read_body(&mut self, shutdown: &CancellationToken) -> Result<Vec<u8>, BodyError> {
        let timeout = self.config.limits.data_read_timeout();
        let mut body = Vec::new();
        let mut violation: Option<BodyError> = None;

        loop {
            let line = tokio::select! {
                () = shutdown.cancelled() => return Err(BodyError::Cancelled),
                line = self.conn.read_line(timeout) => match line {
                    Ok(Some(line)) => line,
                    Ok(None) => return Err(BodyError::Closed),
                    Err(err) if err.kind() == std::io::ErrorKind::TimedOut => {
                        return Err(BodyError::Timeout);
                    }
                    Err(err) => return Err(BodyError::Io(err)),
                },
            };

            if DataLineReader::is_terminator(&line) {
                return violation.map_or(Ok(body), Err);
            }
            if violation.is_some() {
                continue;
            }

            if self.config.limits.line_too_long(line.len()) {
                violation = Some(BodyError::LineTooLong);
                continue;
            }
            let unstuffed = DataLineReader::unstuff(&line);
            let total = body.len() + unstuffed.len();
            if self.config.limits.message_size_exceeded(total as u64) {
                violation = Some(BodyError::TooLarge);
                continue;
            }
            body.extend_from_slice(unstuffed);
        }
    }

    /// Push the streamed content through the builder, finalize, store,
    /// bump the counters and acknowledge. A commit to storage strictly
    /// precedes the `250`; any failure answers `451`, drops the
    /// envelope and returns the session to `Identified`.
    async fn commit_envelope(&mut self, body: Vec<u8>) -> Reply {
        let built = match self.envelope.as_mut() {
            Some(builder) => build_envelope(builder.as_mut(), &body),
            None => Err(Reply::new(ReplyCode::LOCAL_ERROR, "Unable to accept message")),
        };
        let envelope = match built {
            Ok(envelope) => envelope,
            Err(reply) => {
                self.fail_transaction();
                return reply;
            }
        };

        if let Some(storage) = self.config.storage.clone() {
            if let Err(err) = storage.store(std::sync::Arc::clone(&envelope)).await {
                tracing::error!(error = %err, envelope = envelope.id(), "storage error");
                self.fail_transaction();
                return Reply::new(ReplyCode::LOCAL_ERROR, "Unable to store message");
            }
        }

        self.stats.transactions += 1;
        self.stats.messages += 1;
        self.stats.recipients += envelope.recipient_count() as u64;

        let _ = self.state_machine.data_complete();
        self.state_machine.reset();
        self.envelope = None;

        self.hook_on_data_end(&envelope).await;
        tracing::info!(
            envelope = envelope.id(),
            size = envelope.data_size(),
            recipients = envelope.recipient_count(),
            "message received"
        );

        Reply::new(
            ReplyCode::OK,
            format!("OK, message {} accepted", envelope.id()),
        )
    }

    /// Drop the in-flight envelope and walk the machine back to
    /// `Identified` through `DataDone`, the only legal path out of
    /// `Data`.
    pub(super) fn fail_transaction(&mut self) {
        self.reset_transaction();
        let _ = self.state_machine.data_complete();
        self.state_machine.reset();
    }
}

fn build_envelope(
    builder: &mut dyn EnvelopeBuilder,
    body: &[u8],
) -> Result<std::sync::Arc<dyn Envelope>, Reply> {
    let accept_failure = || Reply::new(ReplyCode::LOCAL_ERROR, "Unable to accept message");

    let mut writer = builder.open_data_writer().map_err(|_| accept_failure())?;
    let written = writer.write(body).map_err(|_| accept_failure())?;
    if written != body.len() {
        return Err(accept_failure());
    }
    writer.close().map_err(|_| accept_failure())?;

    builder
        .finalize()
        .map_err(|_| Reply::new(ReplyCode::LOCAL_ERROR, "Unable to finalize message"))
}
