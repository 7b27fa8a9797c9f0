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

//! icesmtp protocol engine
//!
//! A server-side SMTP protocol engine: it drives one client connection
//! through the ESMTP conversation (RFC 5321, with STARTTLS, SIZE,
//! 8BITMIME, PIPELINING, ENHANCEDSTATUSCODES and SMTPUTF8) and hands
//! every policy and persistence decision to pluggable collaborators.
//! icesmtp is a protocol library, not a mail server: accepting
//! connections, daemonizing and storing mail belong to the embedder.
//!
//! One [`Engine`] owns one session. The embedder accepts a connection,
//! wraps it in a [`Connection`], builds a [`SessionConfig`] with its
//! [`Mailbox`] (and optionally [`Storage`], [`SenderPolicy`],
//! [`TlsProvider`], [`SessionHooks`]) and calls [`Engine::run`].

#![doc(html_no_source)]
#![deny(missing_docs)]
#![forbid(unsafe_code)]
//
#![warn(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::cargo)]
//
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::std_instead_of_core)]

mod command;
mod connection;
mod envelope;
mod envelope_builder;
mod error;
mod hooks;
mod id;
mod mailbox;
pub mod mock;
mod parser;
mod session;
mod state_machine;
mod storage;
mod tls;

pub use command::{
    allowed_commands, forbids_argument, is_command_allowed, requires_argument, Command,
    EsmtpParams, MailPath, Verb,
};
pub use connection::{BoxedSessionStream, Connection, SessionStream};
pub use envelope::{Envelope, EnvelopeFactory, EnvelopeMetadata};
pub use envelope_builder::{
    BuilderError, DataWriter, EnvelopeBuilder, MemoryEnvelopeBuilder, MemoryEnvelopeFactory,
};
pub use error::SessionError;
pub use hooks::SessionHooks;
pub use mailbox::{Mailbox, RecipientResult, RecipientStatus, SenderPolicy, SenderResult};
pub use parser::{
    parse_helo_hostname, parse_mail_path, DataLineReader, ParseError, Parser, PathPrefix,
};
pub use session::{Engine, SessionConfig, SessionInfo, SessionStats};
pub use state_machine::{allowed_transitions, StateMachine, StateTransitionError};
pub use storage::{Storage, StorageError, StorageOperation, StorageReceipt};
pub use tls::{
    RustlsUpgrader, SniTlsProvider, StaticTlsProvider, TlsClientHello, TlsError, TlsInfo,
    TlsPolicy, TlsProvider, TlsUpgrader,
};

pub use tokio_rustls::rustls;
