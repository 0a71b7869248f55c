mod cache;
pub mod ciphers;
mod client;

pub use cache::{SessionCache, SessionState};
pub use ciphers::{CipherSuite, CipherSuiteId};
pub use client::OpensslClient;

use crate::error::Result;
use crate::net::HostPort;
use async_trait::async_trait;
use openssl::ssl::SslVersion;
use serde::Serialize;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum TlsVersion {
    #[serde(rename = "SSL3.0")]
    Ssl30,
    #[serde(rename = "TLS1.0")]
    Tls10,
    #[serde(rename = "TLS1.1")]
    Tls11,
    #[serde(rename = "TLS1.2")]
    Tls12,
    #[serde(rename = "TLS1.3")]
    Tls13,
}

impl TlsVersion {
    pub const ALL: [TlsVersion; 5] = [
        TlsVersion::Ssl30,
        TlsVersion::Tls10,
        TlsVersion::Tls11,
        TlsVersion::Tls12,
        TlsVersion::Tls13,
    ];

    pub const PROBED: [TlsVersion; 4] = [
        TlsVersion::Ssl30,
        TlsVersion::Tls10,
        TlsVersion::Tls11,
        TlsVersion::Tls12,
    ];

    pub fn wire(self) -> u16 {
        match self {
            TlsVersion::Ssl30 => 0x0300,
            TlsVersion::Tls10 => 0x0301,
            TlsVersion::Tls11 => 0x0302,
            TlsVersion::Tls12 => 0x0303,
            TlsVersion::Tls13 => 0x0304,
        }
    }

    pub fn from_wire(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.wire() == code)
    }

    pub(crate) fn ssl_version(self) -> SslVersion {
        match self {
            TlsVersion::Ssl30 => SslVersion::SSL3,
            TlsVersion::Tls10 => SslVersion::TLS1,
            TlsVersion::Tls11 => SslVersion::TLS1_1,
            TlsVersion::Tls12 => SslVersion::TLS1_2,
            TlsVersion::Tls13 => SslVersion::TLS1_3,
        }
    }

    pub(crate) fn from_ssl_version(version: SslVersion) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|v| v.ssl_version() == version)
    }
}

impl fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TlsVersion::Ssl30 => "SSL3.0",
            TlsVersion::Tls10 => "TLS1.0",
            TlsVersion::Tls11 => "TLS1.1",
            TlsVersion::Tls12 => "TLS1.2",
            TlsVersion::Tls13 => "TLS1.3",
        };
        write!(f, "{}", label)
    }
}

pub fn describe_wire_version(code: u16) -> String {
    match TlsVersion::from_wire(code) {
        Some(version) => version.to_string(),
        None => format!("0x{code:04x}"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiated {
    // wire code
    pub version: u16,
    pub cipher: CipherSuiteId,
}

impl Negotiated {
    pub fn new(version: TlsVersion, cipher: CipherSuiteId) -> Self {
        Self {
            version: version.wire(),
            cipher,
        }
    }
}

#[async_trait]
pub trait TlsClient: Send + Sync {
    async fn handshake(&self, target: &HostPort) -> Result<Negotiated>;

    // Fails with `Unsupported` when the version itself cannot be offered.
    async fn offerable(
        &self,
        _version: TlsVersion,
        candidates: &[CipherSuiteId],
    ) -> Result<Vec<CipherSuiteId>> {
        Ok(candidates.to_vec())
    }

    async fn hello(
        &self,
        target: &HostPort,
        version: TlsVersion,
        offered: &[CipherSuiteId],
    ) -> Result<Negotiated>;

    async fn cached_handshake(
        &self,
        addr: SocketAddr,
        server_name: &str,
        key: &str,
        cache: &Arc<SessionCache>,
    ) -> Result<Negotiated>;
}
