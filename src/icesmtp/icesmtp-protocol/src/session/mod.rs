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

use crate::command::{Command, MailPath};
use crate::connection::Connection;
use crate::envelope::{Envelope, EnvelopeFactory, EnvelopeMetadata};
use crate::envelope_builder::EnvelopeBuilder;
use crate::error::SessionError;
use crate::hooks::SessionHooks;
use crate::id::random_hex;
use crate::mailbox::{Mailbox, SenderPolicy};
use crate::parser::Parser;
use crate::state_machine::StateMachine;
use crate::storage::Storage;
use crate::tls::{TlsError, TlsInfo, TlsPolicy, TlsProvider};
use icesmtp_common::{DisconnectReason, Extensions, Reply, ReplyCode, SessionLimits, State};
use tokio_util::sync::CancellationToken;

mod data;
mod handlers;

/// Everything a session needs besides its connection: identity, limits,
/// extension flags, TLS policy and the collaborator set.
pub struct SessionConfig {
    /// Hostname used in the greeting, EHLO and envelope metadata.
    pub server_hostname: String,
    /// Resource ceilings for this session.
    pub limits: SessionLimits,
    /// Extensions the session advertises and honors.
    pub extensions: Extensions,
    /// When TLS must be used.
    pub tls_policy: TlsPolicy,
    /// TLS configuration source; required for STARTTLS to succeed.
    pub tls_provider: Option<std::sync::Arc<dyn TlsProvider>>,
    /// Recipient validation. Required.
    pub mailbox: std::sync::Arc<dyn Mailbox>,
    /// Sender validation. Absent means every sender is accepted.
    pub sender_policy: Option<std::sync::Arc<dyn SenderPolicy>>,
    /// Message persistence. Absent means DATA completes without
    /// storing anything.
    pub storage: Option<std::sync::Arc<dyn Storage>>,
    /// Envelope backend. Absent means the in-memory default.
    pub envelope_factory: Option<std::sync::Arc<dyn EnvelopeFactory>>,
    /// Lifecycle callbacks.
    pub hooks: Option<std::sync::Arc<dyn SessionHooks>>,
}

impl SessionConfig {
    /// A configuration with default limits and extensions, no TLS and
    /// no optional collaborators.
    pub fn new(server_hostname: impl Into<String>, mailbox: std::sync::Arc<dyn Mailbox>) -> Self {
        Self {
            server_hostname: server_hostname.into(),
            limits: SessionLimits::default(),
            extensions: Extensions::default(),
            tls_policy: TlsPolicy::Disabled,
            tls_provider: None,
            mailbox,
            sender_policy: None,
            storage: None,
            envelope_factory: None,
            hooks: None,
        }
    }
}

/// Monotonically growing per-session counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStats {
    /// When the session started.
    pub started_at: std::time::SystemTime,
    /// When the session ended, once it has.
    pub ended_at: Option<std::time::SystemTime>,
    /// Bytes read from the client.
    pub bytes_read: u64,
    /// Bytes written to the client.
    pub bytes_written: u64,
    /// Command lines read.
    pub commands: u64,
    /// Protocol errors produced.
    pub errors: u64,
    /// Completed mail transactions.
    pub transactions: u32,
    /// Messages received.
    pub messages: u64,
    /// Recipients across all received messages.
    pub recipients: u64,
}

impl SessionStats {
    fn new() -> Self {
        Self {
            started_at: std::time::SystemTime::now(),
            ended_at: None,
            bytes_read: 0,
            bytes_written: 0,
            commands: 0,
            errors: 0,
            transactions: 0,
            messages: 0,
            recipients: 0,
        }
    }
}

/// A read-only snapshot of the session, handed to collaborators and
/// hooks. A value copy, never a live reference into the engine.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// The session identifier, 16 random bytes as lowercase hex.
    pub id: String,
    /// The protocol state at snapshot time.
    pub state: State,
    /// The hostname from the last successful HELO/EHLO.
    pub client_hostname: Option<String>,
    /// The peer address, when known.
    pub client_addr: Option<std::net::SocketAddr>,
    /// This server's hostname.
    pub server_hostname: String,
    /// Whether TLS is active.
    pub tls_active: bool,
    /// The negotiated TLS state, if TLS is active.
    pub tls: Option<TlsInfo>,
    /// Whether the client authenticated.
    pub authenticated: bool,
    /// The authenticated username, if any.
    pub authenticated_user: Option<String>,
    /// The reverse-path of the in-flight transaction, if any.
    pub mail_from: Option<MailPath>,
    /// Recipients accepted so far in the in-flight transaction.
    pub recipient_count: usize,
}

/// A reply produced by a verb handler, tagged with whether it counts
/// against the consecutive-error budget. Policy rejections are ordinary
/// replies; only protocol violations consume budget.
pub(crate) enum HandlerOutcome {
    Reply(Reply),
    Violation(Reply),
}

/// The per-session protocol engine.
///
/// One engine drives one connection through the whole ESMTP
/// conversation: greeting, command loop, DATA streaming, STARTTLS
/// upgrade, and teardown. It owns its connection, parser, state machine
/// and envelope builder exclusively; collaborators are shared.
pub struct Engine {
    config: SessionConfig,
    conn: Connection,
    parser: Parser,
    state_machine: StateMachine,
    session_id: String,
    client_addr: Option<std::net::SocketAddr>,
    client_hostname: Option<String>,
    authenticated_user: Option<String>,
    consecutive_errors: u32,
    envelope: Option<Box<dyn EnvelopeBuilder>>,
    stats: SessionStats,
    disconnected: bool,
}

impl Engine {
    /// A new engine for one connection.
    #[must_use]
    pub fn new(conn: Connection, config: SessionConfig) -> Self {
        let mut parser = Parser::default();
        if config.limits.max_command_length > 0 {
            parser.max_command_length = config.limits.max_command_length;
        }
        Self {
            config,
            conn,
            parser,
            state_machine: StateMachine::new(),
            session_id: random_hex(16),
            client_addr: None,
            client_hostname: None,
            authenticated_user: None,
            consecutive_errors: 0,
            envelope: None,
            stats: SessionStats::new(),
            disconnected: false,
        }
    }

    /// Record the peer address for logging and envelope metadata.
    #[must_use]
    pub fn with_client_addr(mut self, addr: std::net::SocketAddr) -> Self {
        self.client_addr = Some(addr);
        self
    }

    /// Use a preset session identifier instead of a random one.
    #[must_use]
    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = id.into();
        self
    }

    /// The session identifier.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The current protocol state.
    #[must_use]
    pub const fn state(&self) -> State {
        self.state_machine.state()
    }

    /// The session counters, with connection byte counts folded in.
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        let mut stats = self.stats.clone();
        stats.bytes_read = self.conn.bytes_read();
        stats.bytes_written = self.conn.bytes_written();
        stats
    }

    /// A read-only snapshot of the session.
    #[must_use]
    pub fn info(&self) -> SessionInfo {
        let snapshot = self.envelope.as_ref().map(|builder| builder.snapshot());
        SessionInfo {
            id: self.session_id.clone(),
            state: self.state_machine.state(),
            client_hostname: self.client_hostname.clone(),
            client_addr: self.client_addr,
            server_hostname: self.config.server_hostname.clone(),
            tls_active: self.conn.is_tls(),
            tls: self.conn.tls_info().cloned(),
            authenticated: self.authenticated_user.is_some(),
            authenticated_user: self.authenticated_user.clone(),
            mail_from: snapshot.as_ref().map(|e| e.mail_from().clone()),
            recipient_count: snapshot.as_ref().map_or(0, |e| e.recipient_count()),
        }
    }

    /// Drive the session to completion.
    ///
    /// Sends the greeting, then loops: read a command line, parse,
    /// check legality, dispatch, reply. The loop leaves through QUIT, a
    /// fatal error, the error budget, or cancellation of `shutdown` —
    /// cancelling the token from any task is the way to close a running
    /// session. Every exit path fires `on_disconnect` exactly once.
    ///
    /// # Errors
    ///
    /// * transport errors, timeouts, TLS failures, budget exhaustion or
    ///   cancellation; a QUIT-terminated session returns `Ok`
    #[tracing::instrument(name = "session", skip_all, fields(session = %self.session_id))]
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<(), SessionError> {
        self.state_machine.connect()?;
        self.hook_on_connect().await;

        let greeting = Reply::new(
            ReplyCode::SERVICE_READY,
            format!("{} ESMTP icesmtp", self.config.server_hostname),
        );
        if let Err(err) = self.write_reply(&greeting).await {
            return self.disconnect(DisconnectReason::Error, Err(err)).await;
        }
        self.state_machine.greet()?;
        tracing::info!(client = ?self.client_addr, "session started");

        loop {
            if shutdown.is_cancelled() {
                return self
                    .disconnect(DisconnectReason::Timeout, Err(SessionError::Cancelled))
                    .await;
            }
            if self.state_machine.state().is_terminal() {
                break;
            }
            if self.state_machine.state() == State::StartTls {
                match self.perform_tls_handshake().await {
                    Ok(()) => continue,
                    Err(err) => {
                        return self.disconnect(DisconnectReason::TlsFailure, Err(err)).await;
                    }
                }
            }
            if let Err(err) = self.process_command(&shutdown).await {
                let reason = Self::reason_for(&err);
                return self.disconnect(reason, Err(err)).await;
            }
        }

        self.disconnect(DisconnectReason::Normal, Ok(())).await
    }

    /// Read, parse, gate, dispatch and answer exactly one command.
    async fn process_command(&mut self, shutdown: &CancellationToken) -> Result<(), SessionError> {
        let timeout = self.config.limits.command_read_timeout();
        let line = tokio::select! {
            () = shutdown.cancelled() => return Err(SessionError::Cancelled),
            line = self.conn.read_line(timeout) => line?,
        };
        let Some(line) = line else {
            return Err(SessionError::ConnectionClosed);
        };
        self.stats.commands += 1;

        let command = match self.parser.parse_command(&line) {
            Ok(command) => command,
            Err(err) => {
                tracing::debug!(error = %err, "command parse failed");
                return self.protocol_error(Reply::syntax_error()).await;
            }
        };
        tracing::debug!(verb = %command.verb, state = %self.state_machine.state(), "received command");

        if let Err(err) = self.run_command_hook(&command).await {
            self.write_reply(&Reply::transaction_failed()).await?;
            if let Some(io) = err.downcast_ref::<std::io::Error>() {
                return Err(SessionError::Io(std::io::Error::new(
                    io.kind(),
                    err.to_string(),
                )));
            }
            let err = SessionError::Hook(err);
            self.hook_on_error(&err).await;
            return Ok(());
        }

        if !self.state_machine.is_command_allowed(command.verb) {
            return self.protocol_error(Reply::bad_sequence()).await;
        }

        match self.dispatch(&command, shutdown).await? {
            HandlerOutcome::Reply(reply) => {
                self.write_reply(&reply).await?;
                if reply.code().is_positive() {
                    self.consecutive_errors = 0;
                }
                Ok(())
            }
            HandlerOutcome::Violation(reply) => self.protocol_error(reply).await,
        }
    }

    /// Account a protocol error against the budget, then answer with
    /// `reply` — or with `421` and teardown when the budget is gone.
    async fn protocol_error(&mut self, reply: Reply) -> Result<(), SessionError> {
        self.stats.errors += 1;
        self.consecutive_errors += 1;
        if self
            .config
            .limits
            .error_budget_exhausted(self.consecutive_errors)
        {
            self.write_reply(&Reply::new(
                ReplyCode::SERVICE_NOT_AVAILABLE,
                "Too many errors, closing connection",
            ))
            .await?;
            let _ = self.state_machine.abort();
            return Err(SessionError::TooManyErrors);
        }
        self.write_reply(&reply).await?;
        Ok(())
    }

    async fn write_reply(&mut self, reply: &Reply) -> Result<(), SessionError> {
        tracing::trace!(code = reply.code().value(), "sending reply");
        self.conn.send(reply.to_wire().as_bytes(), None).await?;
        Ok(())
    }

    /// Fetch a TLS configuration and run the in-band handshake the
    /// STARTTLS command announced, under the handshake deadline. On
    /// success the session returns to `Greeted` with its identification
    /// and transaction state wiped (RFC 3207 section 4.2).
    async fn perform_tls_handshake(&mut self) -> Result<(), SessionError> {
        let provider = self
            .config
            .tls_provider
            .clone()
            .ok_or_else(|| TlsError::Config("no TLS provider configured".to_string()))
            .map_err(SessionError::Tls)?;
        let tls_config = provider.get_config(None).await.map_err(SessionError::Tls)?;

        let timeout = self.config.limits.tls_handshake_timeout();
        let info = self
            .conn
            .upgrade_tls(tls_config, timeout)
            .await
            .map_err(SessionError::Tls)?;

        self.state_machine.tls_complete()?;
        self.reset_transaction();
        self.client_hostname = None;
        self.hook_on_tls_upgrade(&info).await;
        tracing::info!(version = ?info.version, cipher = ?info.cipher, "TLS established");
        Ok(())
    }

    /// Drop the in-flight envelope, if any.
    fn reset_transaction(&mut self) {
        if let Some(builder) = self.envelope.as_mut() {
            builder.reset();
        }
        self.envelope = None;
    }

    fn envelope_metadata(&self) -> EnvelopeMetadata {
        EnvelopeMetadata {
            session_id: self.session_id.clone(),
            client_hostname: self.client_hostname.clone(),
            client_addr: self.client_addr,
            server_hostname: self.config.server_hostname.clone(),
            tls_active: self.conn.is_tls(),
            tls_version: self.conn.tls_info().and_then(|tls| tls.version.clone()),
            tls_cipher: self.conn.tls_info().and_then(|tls| tls.cipher.clone()),
            authenticated_user: self.authenticated_user.clone(),
        }
    }

    fn reason_for(err: &SessionError) -> DisconnectReason {
        match err {
            SessionError::Cancelled => DisconnectReason::Timeout,
            SessionError::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => {
                DisconnectReason::Timeout
            }
            SessionError::TooManyErrors => DisconnectReason::ResourceLimit,
            SessionError::Tls(_) => DisconnectReason::TlsFailure,
            SessionError::Hook(_) => DisconnectReason::PolicyViolation,
            _ => DisconnectReason::Error,
        }
    }

    /// Close the books on the session: stamp the end time, report the
    /// error (if any) and fire `on_disconnect` exactly once.
    async fn disconnect(
        &mut self,
        reason: DisconnectReason,
        result: Result<(), SessionError>,
    ) -> Result<(), SessionError> {
        if self.disconnected {
            return result;
        }
        self.disconnected = true;
        self.stats.ended_at = Some(std::time::SystemTime::now());
        self.stats.bytes_read = self.conn.bytes_read();
        self.stats.bytes_written = self.conn.bytes_written();

        if let Err(err) = &result {
            self.hook_on_error(err).await;
        }
        if let Some(hooks) = &self.config.hooks {
            hooks.on_disconnect(&self.info(), reason).await;
        }
        tracing::info!(
            %reason,
            commands = self.stats.commands,
            messages = self.stats.messages,
            "session ended"
        );
        result
    }

    async fn run_command_hook(&self, command: &Command) -> anyhow::Result<()> {
        match &self.config.hooks {
            Some(hooks) => hooks.on_command(command, &self.info()).await,
            None => Ok(()),
        }
    }

    async fn hook_on_connect(&self) {
        if let Some(hooks) = &self.config.hooks {
            hooks.on_connect(&self.info()).await;
        }
    }

    async fn hook_on_error(&self, err: &SessionError) {
        if let Some(hooks) = &self.config.hooks {
            hooks.on_error(err, &self.info()).await;
        }
    }

    async fn hook_on_mail_from(&self, sender: &MailPath) {
        if let Some(hooks) = &self.config.hooks {
            hooks.on_mail_from(sender, &self.info()).await;
        }
    }

    async fn hook_on_rcpt_to(&self, recipient: &MailPath) {
        if let Some(hooks) = &self.config.hooks {
            hooks.on_rcpt_to(recipient, &self.info()).await;
        }
    }

    async fn hook_on_data_start(&self) {
        if let Some(hooks) = &self.config.hooks {
            hooks.on_data_start(&self.info()).await;
        }
    }

    async fn hook_on_data_end(&self, envelope: &std::sync::Arc<dyn Envelope>) {
        if let Some(hooks) = &self.config.hooks {
            hooks.on_data_end(envelope, &self.info()).await;
        }
    }

    async fn hook_on_tls_upgrade(&self, info: &TlsInfo) {
        if let Some(hooks) = &self.config.hooks {
            hooks.on_tls_upgrade(info, &self.info()).await;
        }
    }
}
