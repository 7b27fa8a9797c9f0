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

mod common;

use common::{base_config, run_session, CapturingStorage, FailingStorage, RecordingHooks, RejectList};
use icesmtp_common::SessionLimits;

#[tokio::test]
async fn full_transaction() {
    let storage = std::sync::Arc::new(CapturingStorage::default());
    let hooks = std::sync::Arc::new(RecordingHooks::default());
    let mut config = base_config();
    config.storage = Some(storage.clone());
    config.hooks = Some(hooks.clone());

    let input = [
        "EHLO client.example.com\r\n",
        "MAIL FROM:<a@b.example>\r\n",
        "RCPT TO:<u@x.example>\r\n",
        "DATA\r\n",
        "Subject: t\r\n",
        "\r\n",
        "hello\r\n",
        ".\r\n",
        "QUIT\r\n",
    ]
    .concat();
    let (transcript, result) = run_session(&input, config).await;
    result.unwrap();

    let lines: Vec<&str> = transcript.lines().collect();
    assert!(lines.contains(&"354 Start mail input; end with <CRLF>.<CRLF>"));
    let accepted = lines
        .iter()
        .find(|line| line.starts_with("250 OK, message "))
        .expect("acceptance line");
    assert!(accepted.ends_with(" accepted"));

    let envelopes = storage.envelopes.lock().unwrap();
    assert_eq!(envelopes.len(), 1);
    let envelope = &envelopes[0];
    assert_eq!(envelope.mail_from().address, "a@b.example");
    assert_eq!(envelope.recipient_count(), 1);
    assert_eq!(envelope.recipients()[0].address, "u@x.example");
    assert_eq!(envelope.data(), b"Subject: t\r\n\r\nhello\r\n");
    assert!(envelope.is_finalized());
    assert_eq!(
        envelope.metadata().client_hostname.as_deref(),
        Some("client.example.com")
    );
    assert_eq!(envelope.metadata().server_hostname, common::SERVER);
    assert!(!envelope.metadata().tls_active);

    // The acceptance line echoes the stored envelope id.
    assert!(accepted.contains(envelope.id()));

    let events = hooks.snapshot();
    assert_eq!(
        events,
        vec![
            "connect".to_string(),
            "mail_from:<a@b.example>".to_string(),
            "rcpt_to:<u@x.example>".to_string(),
            "data_start".to_string(),
            format!("data_end:{}", envelope.id()),
            "disconnect:Normal".to_string(),
        ]
    );
}

#[tokio::test]
async fn dot_stuffing_is_removed() {
    let storage = std::sync::Arc::new(CapturingStorage::default());
    let mut config = base_config();
    config.storage = Some(storage.clone());

    let input = [
        "EHLO c.example\r\n",
        "MAIL FROM:<a@b.example>\r\n",
        "RCPT TO:<u@x.example>\r\n",
        "DATA\r\n",
        "A\r\n",
        "..dotted\r\n",
        "B\r\n",
        ".\r\n",
        "QUIT\r\n",
    ]
    .concat();
    let (_, result) = run_session(&input, config).await;
    result.unwrap();

    let envelopes = storage.envelopes.lock().unwrap();
    assert_eq!(envelopes[0].data(), b"A\r\n.dotted\r\nB\r\n");
}

#[tokio::test]
async fn null_reverse_path() {
    let storage = std::sync::Arc::new(CapturingStorage::default());
    let mut config = base_config();
    config.storage = Some(storage.clone());

    let input = [
        "EHLO c.example\r\n",
        "MAIL FROM:<>\r\n",
        "RCPT TO:<u@x.example>\r\n",
        "DATA\r\n",
        "bounce\r\n",
        ".\r\n",
        "QUIT\r\n",
    ]
    .concat();
    let (transcript, result) = run_session(&input, config).await;
    result.unwrap();
    assert!(!transcript.contains("501"));

    let envelopes = storage.envelopes.lock().unwrap();
    assert!(envelopes[0].mail_from().is_null);
}

#[tokio::test]
async fn rejected_recipient_keeps_the_session() {
    let storage = std::sync::Arc::new(CapturingStorage::default());
    let mut config = base_config();
    config.mailbox = std::sync::Arc::new(RejectList(vec!["none@x.example"]));
    config.storage = Some(storage.clone());

    let input = [
        "EHLO c.example\r\n",
        "MAIL FROM:<a@b.example>\r\n",
        "RCPT TO:<none@x.example>\r\n",
        "RCPT TO:<ok@x.example>\r\n",
        "DATA\r\n",
        "hi\r\n",
        ".\r\n",
        "QUIT\r\n",
    ]
    .concat();
    let (transcript, result) = run_session(&input, config).await;
    result.unwrap();

    assert!(transcript.contains("550 Mailbox unavailable\r\n"));
    let envelopes = storage.envelopes.lock().unwrap();
    assert_eq!(envelopes[0].recipient_count(), 1);
    assert_eq!(envelopes[0].recipients()[0].address, "ok@x.example");
}

#[tokio::test]
async fn declared_size_over_limit_is_rejected_early() {
    let mut config = base_config();
    config.limits = SessionLimits {
        max_message_size: 1024,
        ..SessionLimits::default()
    };

    let input = [
        "EHLO c.example\r\n",
        "MAIL FROM:<a@b.example> SIZE=2048\r\n",
        "RCPT TO:<u@x.example>\r\n",
        "QUIT\r\n",
    ]
    .concat();
    let (transcript, result) = run_session(&input, config).await;
    result.unwrap();

    assert!(transcript.contains("552 Message size exceeds fixed maximum message size\r\n"));
    // No envelope was allocated, so RCPT is out of sequence.
    assert!(transcript.contains("503 Bad sequence of commands\r\n"));
}

#[tokio::test]
async fn declared_size_flows_into_the_envelope() {
    let storage = std::sync::Arc::new(CapturingStorage::default());
    let mut config = base_config();
    config.storage = Some(storage.clone());

    let input = [
        "EHLO c.example\r\n",
        "MAIL FROM:<a@b.example> SIZE=17\r\n",
        "RCPT TO:<u@x.example>\r\n",
        "DATA\r\n",
        "hi\r\n",
        ".\r\n",
        "QUIT\r\n",
    ]
    .concat();
    let (_, result) = run_session(&input, config).await;
    result.unwrap();

    let envelopes = storage.envelopes.lock().unwrap();
    assert_eq!(envelopes[0].declared_size(), 17);
    assert_eq!(
        envelopes[0].esmtp_params().get("SIZE").map(String::as_str),
        Some("17")
    );
}

#[tokio::test]
async fn storage_failure_answers_451_and_continues() {
    let hooks = std::sync::Arc::new(RecordingHooks::default());
    let mut config = base_config();
    config.storage = Some(std::sync::Arc::new(FailingStorage));
    config.hooks = Some(hooks.clone());

    let input = [
        "EHLO c.example\r\n",
        "MAIL FROM:<a@b.example>\r\n",
        "RCPT TO:<u@x.example>\r\n",
        "DATA\r\n",
        "doomed\r\n",
        ".\r\n",
        "MAIL FROM:<a@b.example>\r\n",
        "QUIT\r\n",
    ]
    .concat();
    let (transcript, result) = run_session(&input, config).await;
    result.unwrap();

    assert!(transcript.contains("451 Unable to store message\r\n"));
    assert!(!transcript.contains("250 OK, message"));
    // The session recovered to Identified: a new transaction may begin.
    assert!(transcript.ends_with("250 OK\r\n221 Bye\r\n"));
    // Nothing was committed, so no data_end fired.
    assert!(!hooks
        .snapshot()
        .iter()
        .any(|event| event.starts_with("data_end")));
}

#[tokio::test]
async fn rejected_sender_gets_the_policy_reply() {
    let mut config = base_config();
    config.sender_policy = Some(std::sync::Arc::new(common::DenySenders(vec![
        "spammer@bad.example",
    ])));

    let input = [
        "EHLO c.example\r\n",
        "MAIL FROM:<spammer@bad.example>\r\n",
        "MAIL FROM:<a@b.example>\r\n",
        "QUIT\r\n",
    ]
    .concat();
    let (transcript, result) = run_session(&input, config).await;
    result.unwrap();

    assert!(transcript.contains("553 Mailbox name not allowed\r\n"));
    // The refusal left no transaction behind; a clean MAIL still works.
    assert!(transcript.ends_with("250 OK\r\n221 Bye\r\n"));
}

#[tokio::test]
async fn mailbox_sees_the_transaction_snapshot() {
    struct AssertingMailbox;

    #[async_trait::async_trait]
    impl icesmtp_protocol::Mailbox for AssertingMailbox {
        async fn validate_recipient(
            &self,
            _: &icesmtp_protocol::MailPath,
            session: &icesmtp_protocol::SessionInfo,
        ) -> icesmtp_protocol::RecipientResult {
            assert_eq!(
                session.mail_from.as_ref().map(|path| path.address.as_str()),
                Some("a@b.example")
            );
            assert_eq!(session.client_hostname.as_deref(), Some("c.example"));
            assert!(!session.tls_active);
            icesmtp_protocol::RecipientResult::accepted()
        }
    }

    let mut config = base_config();
    config.mailbox = std::sync::Arc::new(AssertingMailbox);

    let input = [
        "EHLO c.example\r\n",
        "MAIL FROM:<a@b.example>\r\n",
        "RCPT TO:<u@x.example>\r\n",
        "QUIT\r\n",
    ]
    .concat();
    let (transcript, result) = run_session(&input, config).await;
    result.unwrap();
    assert!(!transcript.contains("550"));
}

#[tokio::test]
async fn recipient_limit() {
    let mut config = base_config();
    config.limits = SessionLimits {
        max_recipients: 1,
        ..SessionLimits::default()
    };

    let input = [
        "EHLO c.example\r\n",
        "MAIL FROM:<a@b.example>\r\n",
        "RCPT TO:<u@x.example>\r\n",
        "RCPT TO:<v@x.example>\r\n",
        "QUIT\r\n",
    ]
    .concat();
    let (transcript, result) = run_session(&input, config).await;
    result.unwrap();
    assert!(transcript.contains("452 Too many recipients\r\n"));
}

#[tokio::test]
async fn transaction_limit() {
    let mut config = base_config();
    config.limits = SessionLimits {
        max_transactions: 1,
        ..SessionLimits::default()
    };

    let input = [
        "EHLO c.example\r\n",
        "MAIL FROM:<a@b.example>\r\n",
        "RCPT TO:<u@x.example>\r\n",
        "DATA\r\n",
        "first\r\n",
        ".\r\n",
        "MAIL FROM:<a@b.example>\r\n",
        "QUIT\r\n",
    ]
    .concat();
    let (transcript, result) = run_session(&input, config).await;
    result.unwrap();
    assert!(transcript.contains("421 Too many transactions\r\n"));
}

#[tokio::test]
async fn oversized_body_is_cut_short_and_drained() {
    let storage = std::sync::Arc::new(CapturingStorage::default());
    let mut config = base_config();
    config.limits = SessionLimits {
        max_message_size: 16,
        ..SessionLimits::default()
    };
    config.storage = Some(storage.clone());

    let input = [
        "EHLO c.example\r\n",
        "MAIL FROM:<a@b.example>\r\n",
        "RCPT TO:<u@x.example>\r\n",
        "DATA\r\n",
        "0123456789abcdef\r\n",
        "more content past the limit\r\n",
        ".\r\n",
        "NOOP\r\n",
        "QUIT\r\n",
    ]
    .concat();
    let (transcript, result) = run_session(&input, config).await;
    result.unwrap();

    assert!(transcript.contains("552 Message size exceeds limit\r\n"));
    assert!(storage.envelopes.lock().unwrap().is_empty());
    // The terminator was consumed: NOOP parses as a command, not body.
    assert!(transcript.ends_with("250 OK\r\n221 Bye\r\n"));
}

#[tokio::test]
async fn overlong_body_line_aborts_the_transaction() {
    let mut config = base_config();
    config.limits = SessionLimits {
        max_line_length: 32,
        ..SessionLimits::default()
    };

    let long_line = format!("{}\r\n", "x".repeat(64));
    let input = [
        "EHLO c.example\r\n",
        "MAIL FROM:<a@b.example>\r\n",
        "RCPT TO:<u@x.example>\r\n",
        "DATA\r\n",
        &long_line,
        ".\r\n",
        "QUIT\r\n",
    ]
    .concat();
    let (transcript, result) = run_session(&input, config).await;
    result.unwrap();
    assert!(transcript.contains("451 Line too long\r\n"));
    assert!(transcript.ends_with("221 Bye\r\n"));
}

#[tokio::test]
async fn data_without_storage_still_completes() {
    let input = [
        "EHLO c.example\r\n",
        "MAIL FROM:<a@b.example>\r\n",
        "RCPT TO:<u@x.example>\r\n",
        "DATA\r\n",
        "kept nowhere\r\n",
        ".\r\n",
        "QUIT\r\n",
    ]
    .concat();
    let (transcript, result) = run_session(&input, base_config()).await;
    result.unwrap();
    assert!(transcript.contains("250 OK, message "));
}

#[tokio::test]
async fn duplicate_recipients_are_kept_in_order() {
    let storage = std::sync::Arc::new(CapturingStorage::default());
    let mut config = base_config();
    config.storage = Some(storage.clone());

    let input = [
        "EHLO c.example\r\n",
        "MAIL FROM:<a@b.example>\r\n",
        "RCPT TO:<u@x.example>\r\n",
        "RCPT TO:<u@x.example>\r\n",
        "RCPT TO:<v@x.example>\r\n",
        "DATA\r\n",
        "hi\r\n",
        ".\r\n",
        "QUIT\r\n",
    ]
    .concat();
    let (_, result) = run_session(&input, config).await;
    result.unwrap();

    let envelopes = storage.envelopes.lock().unwrap();
    let addresses: Vec<&str> = envelopes[0]
        .recipients()
        .iter()
        .map(|path| path.address.as_str())
        .collect();
    assert_eq!(addresses, ["u@x.example", "u@x.example", "v@x.example"]);
}

#[tokio::test]
async fn helo_resets_an_open_transaction() {
    let input = [
        "EHLO c.example\r\n",
        "MAIL FROM:<a@b.example>\r\n",
        "EHLO c.example\r\n",
        "RCPT TO:<u@x.example>\r\n",
        "QUIT\r\n",
    ]
    .concat();
    let (transcript, result) = run_session(&input, base_config()).await;
    result.unwrap();
    // The second EHLO dropped the envelope, so RCPT is out of sequence.
    assert!(transcript.contains("503 Bad sequence of commands\r\n"));
}
