use crate::error::{Result, ScanError};
use async_trait::async_trait;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

pub const DEFAULT_PORT: u16 = 443;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPort {
    pub name: String,
    pub port: u16,
}

impl HostPort {
    pub fn parse(input: &str, default_port: u16) -> Result<Self> {
        let input = input.trim();
        let (name, port) = if let Some(rest) = input.strip_prefix('[') {
            let (name, tail) = rest
                .split_once(']')
                .ok_or_else(|| ScanError::Config(format!("unterminated bracket in {input:?}")))?;
            match tail {
                "" => (name, None),
                _ => {
                    let port = tail.strip_prefix(':').ok_or_else(|| {
                        ScanError::Config(format!("unexpected text after address in {input:?}"))
                    })?;
                    (name, Some(port))
                }
            }
        } else if input.matches(':').count() == 1 {
            let (name, port) = input.rsplit_once(':').unwrap_or((input, ""));
            (name, Some(port))
        } else {
            (input, None)
        };

        if name.is_empty() {
            return Err(ScanError::Config(format!("missing host name in {input:?}")));
        }

        let port = match port {
            Some(port) => port
                .parse::<u16>()
                .map_err(|_| ScanError::Config(format!("invalid port in {input:?}")))?,
            None => default_port,
        };

        Ok(Self {
            name: name.to_string(),
            port,
        })
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.contains(':') {
            write!(f, "[{}]:{}", self.name, self.port)
        } else {
            write!(f, "{}:{}", self.name, self.port)
        }
    }
}

pub async fn connect_host(target: &HostPort, limit: Duration) -> Result<TcpStream> {
    let fut = TcpStream::connect((target.name.as_str(), target.port));
    finish_connect(target.to_string(), limit, fut).await
}

pub async fn connect_addr(addr: SocketAddr, limit: Duration) -> Result<TcpStream> {
    finish_connect(addr.to_string(), limit, TcpStream::connect(addr)).await
}

async fn finish_connect(
    addr: String,
    limit: Duration,
    fut: impl std::future::Future<Output = std::io::Result<TcpStream>>,
) -> Result<TcpStream> {
    match timeout(limit, fut).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(err)) => Err(ScanError::Connect {
            addr,
            message: err.to_string(),
        }),
        Err(_) => Err(ScanError::Connect {
            addr,
            message: format!("connect timed out after {}ms", limit.as_millis()),
        }),
    }
}

#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, name: &str) -> std::io::Result<Vec<IpAddr>>;
}

#[derive(Clone, Debug, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, name: &str) -> std::io::Result<Vec<IpAddr>> {
        let name = name.to_string();
        tokio::task::spawn_blocking(move || dns_lookup::lookup_host(&name))
            .await
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))?
    }
}
