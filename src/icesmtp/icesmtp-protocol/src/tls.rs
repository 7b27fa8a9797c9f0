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

use crate::connection::BoxedSessionStream;
use tokio_rustls::rustls;

/// When TLS must be used on a session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum TlsPolicy {
    /// TLS is unavailable; STARTTLS is not advertised.
    #[default]
    Disabled,
    /// STARTTLS is advertised; clients may or may not upgrade.
    Optional,
    /// STARTTLS is advertised; MAIL is refused until TLS is active.
    Required,
    /// The connection is TLS from the first byte (SMTPS); no in-band
    /// negotiation happens.
    Immediate,
}

/// The negotiated state of a TLS connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsInfo {
    /// Negotiated protocol version, e.g. `TLSv1.3`.
    pub version: Option<String>,
    /// Negotiated cipher suite.
    pub cipher: Option<String>,
    /// Server name the client asked for (SNI).
    pub sni: Option<String>,
    /// Whether the client presented a certificate.
    pub client_cert_present: bool,
    /// Whether the presented client certificate chain verified.
    pub client_cert_verified: bool,
}

impl TlsInfo {
    pub(crate) fn from_server_connection(connection: &rustls::ServerConnection) -> Self {
        let version = connection.protocol_version().map(|version| match version {
            rustls::ProtocolVersion::TLSv1_2 => "TLSv1.2".to_string(),
            rustls::ProtocolVersion::TLSv1_3 => "TLSv1.3".to_string(),
            other => format!("{other:?}"),
        });
        let cipher = connection
            .negotiated_cipher_suite()
            .map(|suite| format!("{:?}", suite.suite()));
        let sni = connection.sni_hostname().map(str::to_string);
        let client_cert_present = connection
            .peer_certificates()
            .map_or(false, |certs| !certs.is_empty());
        Self {
            version,
            cipher,
            sni,
            client_cert_present,
            // rustls only surfaces client certificates that passed the
            // configured verifier.
            client_cert_verified: client_cert_present,
        }
    }
}

/// A TLS-related failure, tagged with the phase it happened in.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    /// No usable TLS configuration could be produced.
    #[error("TLS configuration unavailable: {0}")]
    Config(String),
    /// No certificate is available for the requested name.
    #[error("no certificate available for {0:?}")]
    Certificate(String),
    /// The server-role handshake failed.
    #[error("TLS handshake failed")]
    Handshake(#[source] std::io::Error),
    /// The handshake did not complete within the deadline.
    #[error("TLS handshake timed out after {0:?}")]
    HandshakeTimeout(std::time::Duration),
}

/// Information from the TLS ClientHello, for SNI-based selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsClientHello {
    /// The server name from SNI.
    pub server_name: Option<String>,
    /// TLS versions the client offered.
    pub supported_versions: Vec<u16>,
    /// Cipher suites the client offered.
    pub cipher_suites: Vec<u16>,
}

/// Supplies TLS configuration to sessions. Implementations may serve a
/// static configuration or select one per server name; they must be safe
/// to call from many sessions at once.
#[async_trait::async_trait]
pub trait TlsProvider: Send + Sync {
    /// The configuration to accept a handshake with.
    ///
    /// # Errors
    ///
    /// * no configuration is available (for the requested name)
    async fn get_config(
        &self,
        hello: Option<&TlsClientHello>,
    ) -> Result<std::sync::Arc<rustls::ServerConfig>, TlsError>;

    /// The policy in effect for sessions served by this provider.
    fn policy(&self) -> TlsPolicy;
}

/// A provider with one fixed configuration.
pub struct StaticTlsProvider {
    config: std::sync::Arc<rustls::ServerConfig>,
    policy: TlsPolicy,
}

impl StaticTlsProvider {
    /// Wrap an existing rustls configuration.
    #[must_use]
    pub const fn new(config: std::sync::Arc<rustls::ServerConfig>, policy: TlsPolicy) -> Self {
        Self { config, policy }
    }
}

#[async_trait::async_trait]
impl TlsProvider for StaticTlsProvider {
    async fn get_config(
        &self,
        _hello: Option<&TlsClientHello>,
    ) -> Result<std::sync::Arc<rustls::ServerConfig>, TlsError> {
        Ok(std::sync::Arc::clone(&self.config))
    }

    fn policy(&self) -> TlsPolicy {
        self.policy
    }
}

/// A provider selecting the configuration by the SNI server name, with
/// an optional fallback for unknown names.
pub struct SniTlsProvider {
    configs: std::collections::HashMap<String, std::sync::Arc<rustls::ServerConfig>>,
    fallback: Option<std::sync::Arc<rustls::ServerConfig>>,
    policy: TlsPolicy,
}

impl SniTlsProvider {
    /// An empty provider; add configurations before serving sessions.
    #[must_use]
    pub fn new(policy: TlsPolicy) -> Self {
        Self {
            configs: std::collections::HashMap::new(),
            fallback: None,
            policy,
        }
    }

    /// Serve `config` to clients asking for `server_name`.
    pub fn add_config(
        &mut self,
        server_name: impl Into<String>,
        config: std::sync::Arc<rustls::ServerConfig>,
    ) {
        self.configs.insert(server_name.into(), config);
    }

    /// The configuration served when no name matches.
    pub fn set_fallback(&mut self, config: std::sync::Arc<rustls::ServerConfig>) {
        self.fallback = Some(config);
    }
}

#[async_trait::async_trait]
impl TlsProvider for SniTlsProvider {
    async fn get_config(
        &self,
        hello: Option<&TlsClientHello>,
    ) -> Result<std::sync::Arc<rustls::ServerConfig>, TlsError> {
        let requested = hello.and_then(|hello| hello.server_name.as_deref());
        if let Some(name) = requested {
            if let Some(config) = self.configs.get(name) {
                return Ok(std::sync::Arc::clone(config));
            }
        }
        self.fallback.clone().ok_or_else(|| {
            TlsError::Certificate(requested.unwrap_or("<no server name>").to_string())
        })
    }

    fn policy(&self) -> TlsPolicy {
        self.policy
    }
}

/// Performs the in-band server-role handshake for a connection. The
/// engine goes through this seam so tests can substitute the handshake
/// with a scripted stream swap.
#[async_trait::async_trait]
pub trait TlsUpgrader: Send + Sync {
    /// Consume the plain stream and hand back its TLS-wrapped
    /// replacement together with the negotiated state.
    ///
    /// # Errors
    ///
    /// * the handshake failed; the stream is gone and the connection
    ///   must be torn down
    async fn upgrade(
        &self,
        stream: BoxedSessionStream,
        config: std::sync::Arc<rustls::ServerConfig>,
    ) -> Result<(BoxedSessionStream, TlsInfo), TlsError>;
}

/// The production upgrader: a tokio-rustls server-role accept.
#[derive(Debug, Default, Clone, Copy)]
pub struct RustlsUpgrader;

#[async_trait::async_trait]
impl TlsUpgrader for RustlsUpgrader {
    async fn upgrade(
        &self,
        stream: BoxedSessionStream,
        config: std::sync::Arc<rustls::ServerConfig>,
    ) -> Result<(BoxedSessionStream, TlsInfo), TlsError> {
        let acceptor = tokio_rustls::TlsAcceptor::from(config);
        let tls_stream = acceptor
            .accept(stream)
            .await
            .map_err(TlsError::Handshake)?;
        let info = TlsInfo::from_server_connection(tls_stream.get_ref().1);
        Ok((Box::new(tls_stream), info))
    }
}
