use super::history::History;
use crate::net::{Resolver, SystemResolver, DEFAULT_PORT};
use crate::tls::{OpensslClient, TlsClient};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
    pub scan_timeout: Duration,
    pub default_port: u16,
    pub verbose: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(1),
            handshake_timeout: Duration::from_secs(5),
            scan_timeout: Duration::from_secs(120),
            default_port: DEFAULT_PORT,
            verbose: false,
        }
    }
}

#[derive(Clone)]
pub struct ScanContext {
    pub config: ScanConfig,
    pub history: Arc<History>,
    pub tls: Arc<dyn TlsClient>,
    pub resolver: Arc<dyn Resolver>,
}

impl ScanContext {
    pub fn new(config: ScanConfig) -> Self {
        let tls = OpensslClient::new(config.connect_timeout, config.handshake_timeout);
        Self {
            config,
            history: Arc::new(History::new()),
            tls: Arc::new(tls),
            resolver: Arc::new(SystemResolver),
        }
    }

    pub fn with_tls(mut self, tls: Arc<dyn TlsClient>) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_history(mut self, history: Arc<History>) -> Self {
        self.history = history;
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn after(limit: Duration) -> Self {
        Deadline(Instant::now() + limit)
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.0
    }

    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }
}
