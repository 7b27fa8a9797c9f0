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

#![allow(dead_code)]

use icesmtp_common::{DisconnectReason, Reply};
use icesmtp_protocol::mock::Mock;
use icesmtp_protocol::{
    Command, Connection, Engine, Envelope, MailPath, Mailbox, RecipientResult, SessionConfig,
    SessionError, SessionHooks, SessionInfo, Storage, StorageError, StorageReceipt, TlsInfo,
};
use tokio_util::sync::CancellationToken;

pub const SERVER: &str = "testserver.com";
pub const GREETING: &str = "220 testserver.com ESMTP icesmtp\r\n";

/// Accepts every recipient.
pub struct AcceptAll;

#[async_trait::async_trait]
impl Mailbox for AcceptAll {
    async fn validate_recipient(&self, _: &MailPath, _: &SessionInfo) -> RecipientResult {
        RecipientResult::accepted()
    }
}

/// Rejects the listed addresses with `550 Mailbox unavailable`.
pub struct RejectList(pub Vec<&'static str>);

#[async_trait::async_trait]
impl Mailbox for RejectList {
    async fn validate_recipient(
        &self,
        recipient: &MailPath,
        _: &SessionInfo,
    ) -> RecipientResult {
        if self.0.contains(&recipient.address.as_str()) {
            RecipientResult::rejected(Reply::mailbox_unavailable())
        } else {
            RecipientResult::accepted()
        }
    }
}

/// Refuses the listed sender addresses with `553 Mailbox name not allowed`.
pub struct DenySenders(pub Vec<&'static str>);

#[async_trait::async_trait]
impl icesmtp_protocol::SenderPolicy for DenySenders {
    async fn validate_sender(
        &self,
        sender: &MailPath,
        _: &SessionInfo,
    ) -> icesmtp_protocol::SenderResult {
        if self.0.contains(&sender.address.as_str()) {
            icesmtp_protocol::SenderResult::rejected(Reply::mailbox_name_invalid())
        } else {
            icesmtp_protocol::SenderResult::accepted()
        }
    }
}

/// Keeps every stored envelope for inspection.
#[derive(Default)]
pub struct CapturingStorage {
    pub envelopes: std::sync::Mutex<Vec<std::sync::Arc<dyn Envelope>>>,
}

#[async_trait::async_trait]
impl Storage for CapturingStorage {
    async fn store(
        &self,
        envelope: std::sync::Arc<dyn Envelope>,
    ) -> Result<StorageReceipt, StorageError> {
        let receipt = StorageReceipt {
            message_id: format!("msg-{}", envelope.id()),
            envelope_id: envelope.id().to_string(),
            stored_at: Some(std::time::SystemTime::now()),
            bytes_written: envelope.data_size(),
            backend: Some("capture".to_string()),
        };
        self.envelopes.lock().unwrap().push(envelope);
        Ok(receipt)
    }
}

/// Always refuses to store.
pub struct FailingStorage;

#[async_trait::async_trait]
impl Storage for FailingStorage {
    async fn store(
        &self,
        envelope: std::sync::Arc<dyn Envelope>,
    ) -> Result<StorageReceipt, StorageError> {
        Err(StorageError::store(envelope.id(), "disk on fire").retryable())
    }
}

/// Records hook firings as event strings.
#[derive(Default)]
pub struct RecordingHooks {
    pub events: std::sync::Mutex<Vec<String>>,
}

impl RecordingHooks {
    pub fn push(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl SessionHooks for RecordingHooks {
    async fn on_connect(&self, _: &SessionInfo) {
        self.push("connect");
    }

    async fn on_disconnect(&self, _: &SessionInfo, reason: DisconnectReason) {
        self.push(format!("disconnect:{reason}"));
    }

    async fn on_mail_from(&self, sender: &MailPath, _: &SessionInfo) {
        self.push(format!("mail_from:{sender}"));
    }

    async fn on_rcpt_to(&self, recipient: &MailPath, _: &SessionInfo) {
        self.push(format!("rcpt_to:{recipient}"));
    }

    async fn on_data_start(&self, _: &SessionInfo) {
        self.push("data_start");
    }

    async fn on_data_end(&self, envelope: &std::sync::Arc<dyn Envelope>, _: &SessionInfo) {
        self.push(format!("data_end:{}", envelope.id()));
    }

    async fn on_tls_upgrade(&self, _: &TlsInfo, _: &SessionInfo) {
        self.push("tls_upgrade");
    }
}

/// Vetoes every command whose verb matches.
pub struct VetoHooks(pub &'static str);

#[async_trait::async_trait]
impl SessionHooks for VetoHooks {
    async fn on_command(&self, command: &Command, _: &SessionInfo) -> anyhow::Result<()> {
        if command.verb.to_string() == self.0 {
            anyhow::bail!("vetoed by test policy");
        }
        Ok(())
    }
}

/// A configuration accepting everything, with no TLS and no storage.
pub fn base_config() -> SessionConfig {
    SessionConfig::new(SERVER, std::sync::Arc::new(AcceptAll))
}

/// Play `input` against a fresh engine and return the server transcript
/// with the run outcome.
pub async fn run_session(
    input: &str,
    config: SessionConfig,
) -> (String, Result<(), SessionError>) {
    let mock = Mock::new(input.as_bytes().to_vec());
    let output = mock.output();
    let mut engine = Engine::new(Connection::new(mock), config);
    let result = engine.run(CancellationToken::new()).await;
    let transcript = String::from_utf8(output.lock().unwrap().clone()).unwrap();
    (transcript, result)
}

/// A self-signed rustls server configuration for TLS-flavored tests.
pub fn test_tls_config() -> std::sync::Arc<icesmtp_protocol::rustls::ServerConfig> {
    use icesmtp_protocol::rustls;

    let cert = rcgen::generate_simple_self_signed([SERVER.to_string()]).unwrap();
    let config = rustls::ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(
            vec![rustls::Certificate(cert.serialize_der().unwrap())],
            rustls::PrivateKey(cert.serialize_private_key_der()),
        )
        .unwrap();
    std::sync::Arc::new(config)
}
