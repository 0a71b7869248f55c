use crate::tls::TlsVersion;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("failed to resolve {host}: {message}")]
    Resolution { host: String, message: String },

    #[error("failed to connect to {addr}: {message}")]
    Connect { addr: String, message: String },

    #[error("TLS handshake with {addr} failed: {message}")]
    Handshake { addr: String, message: String },

    #[error("{addr} violated the protocol at {version}: {detail}")]
    ProtocolViolation {
        addr: String,
        version: TlsVersion,
        detail: String,
    },

    #[error("{version} cannot be tested with the local TLS library: {detail}")]
    Unsupported { version: TlsVersion, detail: String },

    #[error("session cache inconsistent after dialing {addr}: {detail}")]
    Resumption { addr: String, detail: String },

    #[error("invalid input: {0}")]
    Config(String),

    #[error("scan of {host} exceeded its deadline")]
    Timeout { host: String },
}

impl ScanError {
    pub fn is_transport(&self) -> bool {
        matches!(self, ScanError::Connect { .. })
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
