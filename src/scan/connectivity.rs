use super::{Deadline, Family, Grade, Output, ScanContext, ScanResult, Scanner};
use crate::error::ScanError;
use crate::net::{self, HostPort};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::time::timeout;

pub struct DnsLookupScanner;
pub struct TcpDialScanner;
pub struct TlsDialScanner;

static DNS_LOOKUP: DnsLookupScanner = DnsLookupScanner;
static TCP_DIAL: TcpDialScanner = TcpDialScanner;
static TLS_DIAL: TlsDialScanner = TlsDialScanner;

pub static CONNECTIVITY: Family = Family {
    name: "Connectivity",
    description: "Scans for basic connectivity with the host through DNS and TCP/TLS dials",
    scanners: &[&DNS_LOOKUP, &TCP_DIAL, &TLS_DIAL],
};

#[async_trait]
impl Scanner for DnsLookupScanner {
    fn name(&self) -> &'static str {
        "DNSLookup"
    }

    fn description(&self) -> &'static str {
        "Host can be resolved through DNS"
    }

    async fn probe(&self, host: &str, ctx: &ScanContext, deadline: Deadline) -> ScanResult {
        let target = match HostPort::parse(host, ctx.config.default_port) {
            Ok(target) => target,
            Err(err) => return ScanResult::failure(err),
        };

        let lookup = timeout(deadline.remaining(), ctx.resolver.resolve(&target.name)).await;
        let addrs = match lookup {
            Ok(Ok(addrs)) => addrs,
            Ok(Err(err)) => {
                return ScanResult::failure(ScanError::Resolution {
                    host: target.name,
                    message: err.to_string(),
                })
            }
            Err(_) => {
                return ScanResult::failure(ScanError::Timeout { host: target.name });
            }
        };

        if addrs.is_empty() {
            return ScanResult::failure(ScanError::Resolution {
                host: target.name,
                message: "no addresses returned".into(),
            });
        }

        ScanResult::success(Grade::Good, Output::AddressList(addrs))
    }
}

#[async_trait]
impl Scanner for TcpDialScanner {
    fn name(&self) -> &'static str {
        "TCPDial"
    }

    fn description(&self) -> &'static str {
        "Host can be connected to through TCP"
    }

    async fn probe(&self, host: &str, ctx: &ScanContext, deadline: Deadline) -> ScanResult {
        let target = match HostPort::parse(host, ctx.config.default_port) {
            Ok(target) => target,
            Err(err) => return ScanResult::failure(err),
        };

        let limit = ctx.config.connect_timeout.min(deadline.remaining());
        match net::connect_host(&target, limit).await {
            Ok(stream) => {
                let peer = stream.peer_addr().map(|addr| addr.ip());
                drop(stream);
                match peer {
                    Ok(ip) => ScanResult::success(Grade::Good, Output::AddressList(vec![ip])),
                    Err(err) => ScanResult::failure(ScanError::Connect {
                        addr: target.to_string(),
                        message: err.to_string(),
                    }),
                }
            }
            Err(err) => ScanResult::failure(err),
        }
    }
}

#[async_trait]
impl Scanner for TlsDialScanner {
    fn name(&self) -> &'static str {
        "TLSDial"
    }

    fn description(&self) -> &'static str {
        "Host can perform a TLS handshake"
    }

    async fn probe(&self, host: &str, ctx: &ScanContext, deadline: Deadline) -> ScanResult {
        let target = match HostPort::parse(host, ctx.config.default_port) {
            Ok(target) => target,
            Err(err) => return ScanResult::failure(err),
        };

        match timeout(deadline.remaining(), ctx.tls.handshake(&target)).await {
            Ok(Ok(negotiated)) => {
                let mut map = BTreeMap::new();
                if let Some(version) = crate::tls::TlsVersion::from_wire(negotiated.version) {
                    map.insert(version, vec![negotiated.cipher]);
                }
                ScanResult::success(Grade::Good, Output::CipherVersionMap(map))
            }
            Ok(Err(err)) => ScanResult::failure(err),
            Err(_) => ScanResult::failure(ScanError::Timeout {
                host: target.to_string(),
            }),
        }
    }
}
