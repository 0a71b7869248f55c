use super::ciphers::{client_hello_suites, ids_for, openssl_cipher_list};
use super::{CipherSuiteId, Negotiated, SessionCache, TlsClient, TlsVersion};
use crate::error::{Result, ScanError};
use crate::net::{self, HostPort};
use async_trait::async_trait;
use openssl::error::ErrorStack;
use openssl::ssl::{
    HandshakeError, Ssl, SslConnector, SslConnectorBuilder, SslMethod, SslOptions, SslRef,
    SslSessionCacheMode, SslVerifyMode, SslVersion,
};
use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_openssl::SslStream;
use tracing::{debug, warn};

type Capabilities = BTreeMap<TlsVersion, Result<Vec<CipherSuiteId>>>;

#[derive(Clone, Debug)]
pub struct OpensslClient {
    connect_timeout: Duration,
    handshake_timeout: Duration,
    capabilities: Arc<OnceLock<Capabilities>>,
}

impl OpensslClient {
    pub fn new(connect_timeout: Duration, handshake_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            handshake_timeout,
            capabilities: Arc::new(OnceLock::new()),
        }
    }

    fn capabilities(&self) -> &Capabilities {
        self.capabilities.get_or_init(|| {
            TlsVersion::PROBED
                .into_iter()
                .map(|version| {
                    let offer = local_offer(version);
                    match &offer {
                        Ok(ids) => debug!(%version, suites = ids.len(), "local offer"),
                        Err(err) => warn!(%version, error = %err, "version cannot be offered"),
                    }
                    (version, offer)
                })
                .collect()
        })
    }

    async fn complete(
        &self,
        addr: &str,
        ssl: Ssl,
        stream: TcpStream,
    ) -> Result<SslStream<TcpStream>> {
        let mut tls = SslStream::new(ssl, stream).map_err(setup_error)?;
        match timeout(self.handshake_timeout, Pin::new(&mut tls).connect()).await {
            Ok(Ok(())) => Ok(tls),
            Ok(Err(err)) => Err(ScanError::Handshake {
                addr: addr.to_string(),
                message: err.to_string(),
            }),
            Err(_) => Err(ScanError::Timeout {
                host: addr.to_string(),
            }),
        }
    }
}

fn setup_error(err: impl std::fmt::Display) -> ScanError {
    ScanError::Config(format!("TLS client setup failed: {err}"))
}

fn unsupported(version: TlsVersion, err: impl std::fmt::Display) -> ScanError {
    ScanError::Unsupported {
        version,
        detail: err.to_string(),
    }
}

fn permissive_builder() -> std::result::Result<SslConnectorBuilder, ErrorStack> {
    let mut builder = SslConnector::builder(SslMethod::tls_client())?;
    // Only the negotiation is under test, not the certificate.
    builder.set_verify(SslVerifyMode::NONE);
    Ok(builder)
}

fn pin_offer(
    builder: &mut SslConnectorBuilder,
    version: TlsVersion,
    offered: &[CipherSuiteId],
) -> std::result::Result<(), ErrorStack> {
    builder.clear_options(SslOptions::NO_SSLV3 | SslOptions::NO_TLSV1 | SslOptions::NO_TLSV1_1);
    builder.set_options(SslOptions::NO_TICKET);
    builder.set_session_cache_mode(SslSessionCacheMode::OFF);
    builder.set_security_level(0);
    builder.set_min_proto_version(Some(version.ssl_version()))?;
    builder.set_max_proto_version(Some(version.ssl_version()))?;
    builder.set_cipher_list(&openssl_cipher_list(offered))?;
    Ok(())
}

fn pinned_ssl(version: TlsVersion, offered: &[CipherSuiteId], server_name: &str) -> Result<Ssl> {
    let mut builder = permissive_builder().map_err(|e| unsupported(version, e))?;
    pin_offer(&mut builder, version, offered).map_err(|e| unsupported(version, e))?;
    builder
        .build()
        .configure()
        .and_then(|cfg| cfg.verify_hostname(false).into_ssl(server_name))
        .map_err(|e| unsupported(version, e))
}

// Never answers, so the handshake stops right after the ClientHello.
#[derive(Default)]
struct HelloCapture {
    written: Vec<u8>,
}

impl Read for HelloCapture {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::ErrorKind::WouldBlock.into())
    }
}

impl Write for HelloCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// set_cipher_list drops names the library lacks without complaint, so the
// answer is read back from the generated hello.
fn local_offer(version: TlsVersion) -> Result<Vec<CipherSuiteId>> {
    let wanted = ids_for(version);
    let ssl = pinned_ssl(version, &wanted, "localhost")?;
    match ssl.connect(HelloCapture::default()) {
        Err(HandshakeError::WouldBlock(mid)) => {
            let sent = client_hello_suites(&mid.get_ref().written)
                .ok_or_else(|| unsupported(version, "unreadable ClientHello"))?;
            Ok(wanted.into_iter().filter(|id| sent.contains(id)).collect())
        }
        Err(HandshakeError::SetupFailure(err)) => Err(unsupported(version, err)),
        Err(HandshakeError::Failure(mid)) => Err(unsupported(version, mid.error())),
        Ok(_) => Err(unsupported(version, "handshake completed without a peer")),
    }
}

fn negotiated(ssl: &SslRef) -> Negotiated {
    let version = ssl
        .version2()
        .and_then(TlsVersion::from_ssl_version)
        .map(TlsVersion::wire)
        .unwrap_or(0);
    let cipher = ssl
        .current_cipher()
        .map(|cipher| u16::from_be_bytes(cipher.protocol_id()))
        .unwrap_or(0);
    Negotiated {
        version,
        cipher: CipherSuiteId(cipher),
    }
}

#[async_trait]
impl TlsClient for OpensslClient {
    async fn handshake(&self, target: &HostPort) -> Result<Negotiated> {
        let addr = target.to_string();
        let stream = net::connect_host(target, self.connect_timeout).await?;

        let connector = permissive_builder().map_err(setup_error)?.build();
        let ssl = connector
            .configure()
            .and_then(|cfg| cfg.verify_hostname(false).into_ssl(&target.name))
            .map_err(setup_error)?;

        let tls = self.complete(&addr, ssl, stream).await?;
        let result = negotiated(tls.ssl());
        debug!(addr = %addr, cipher = %result.cipher, "default handshake complete");
        Ok(result)
    }

    async fn offerable(
        &self,
        version: TlsVersion,
        candidates: &[CipherSuiteId],
    ) -> Result<Vec<CipherSuiteId>> {
        let local = match self.capabilities().get(&version) {
            Some(offer) => offer.clone()?,
            None => local_offer(version)?,
        };
        Ok(candidates
            .iter()
            .copied()
            .filter(|id| local.contains(id))
            .collect())
    }

    async fn hello(
        &self,
        target: &HostPort,
        version: TlsVersion,
        offered: &[CipherSuiteId],
    ) -> Result<Negotiated> {
        let addr = target.to_string();
        let ssl = pinned_ssl(version, offered, &target.name)?;
        let stream = net::connect_host(target, self.connect_timeout).await?;

        let tls = self.complete(&addr, ssl, stream).await?;
        let result = negotiated(tls.ssl());
        drop(tls);
        debug!(
            addr = %addr,
            %version,
            offered = offered.len(),
            cipher = %result.cipher,
            "hello complete"
        );
        Ok(result)
    }

    async fn cached_handshake(
        &self,
        addr: SocketAddr,
        server_name: &str,
        key: &str,
        cache: &Arc<SessionCache>,
    ) -> Result<Negotiated> {
        let label = addr.to_string();

        let mut builder = permissive_builder().map_err(setup_error)?;
        // Tickets arrive inside the handshake only up to TLS1.2.
        builder
            .set_max_proto_version(Some(SslVersion::TLS1_2))
            .map_err(setup_error)?;
        builder.set_session_cache_mode(SslSessionCacheMode::CLIENT);
        let hook = Arc::clone(cache);
        let hook_key = key.to_string();
        builder.set_new_session_callback(move |_ssl, session| hook.store(&hook_key, session));

        let connector = builder.build();
        let mut ssl = connector
            .configure()
            .and_then(|cfg| cfg.verify_hostname(false).into_ssl(server_name))
            .map_err(setup_error)?;

        if let Some(session) = cache.retrieve(key) {
            // SAFETY: the session was stored by a context built here with the
            // same protocol and cipher configuration.
            unsafe { ssl.set_session(&session) }.map_err(setup_error)?;
        }

        let stream = net::connect_addr(addr, self.connect_timeout).await?;
        let mut tls = self.complete(&label, ssl, stream).await?;
        let result = negotiated(tls.ssl());
        // close_notify keeps the stored session resumable.
        let _ = timeout(self.handshake_timeout, tls.shutdown()).await;
        debug!(addr = %label, key, "cached handshake complete");
        Ok(result)
    }
}
