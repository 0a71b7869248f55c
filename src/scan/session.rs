use super::{Deadline, Family, Grade, Output, ScanContext, ScanResult, Scanner};
use crate::error::ScanError;
use crate::net::HostPort;
use crate::tls::SessionCache;
use async_trait::async_trait;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::debug;

pub struct SessionResumeScanner;

static SESSION_RESUME: SessionResumeScanner = SessionResumeScanner;

pub static TLS_SESSION: Family = Family {
    name: "TLSSession",
    description: "Scans host's implementation of TLS session resumption using session tickets and session IDs",
    scanners: &[&SESSION_RESUME],
};

#[async_trait]
impl Scanner for SessionResumeScanner {
    fn name(&self) -> &'static str {
        "SessionResume"
    }

    fn description(&self) -> &'static str {
        "Host is able to resume sessions across all addresses"
    }

    async fn probe(&self, host: &str, ctx: &ScanContext, deadline: Deadline) -> ScanResult {
        let target = match HostPort::parse(host, ctx.config.default_port) {
            Ok(target) => target,
            Err(err) => return ScanResult::failure(err),
        };

        let mut addrs = match timeout(deadline.remaining(), ctx.resolver.resolve(&target.name)).await
        {
            Ok(Ok(addrs)) if !addrs.is_empty() => addrs,
            Ok(Ok(_)) => {
                return ScanResult::failure(ScanError::Resolution {
                    host: target.name,
                    message: "no addresses returned".into(),
                })
            }
            Ok(Err(err)) => {
                return ScanResult::failure(ScanError::Resolution {
                    host: target.name,
                    message: err.to_string(),
                })
            }
            Err(_) => return ScanResult::failure(ScanError::Timeout { host: target.name }),
        };

        // One dial per distinct address; repeats would share a cache key.
        let mut seen = HashSet::new();
        addrs.retain(|ip| seen.insert(*ip));

        let cache = Arc::new(SessionCache::new());
        for ip in addrs {
            let addr = SocketAddr::new(ip, target.port);
            let key = addr.to_string();

            if deadline.expired() {
                let err = ScanError::Timeout {
                    host: target.to_string(),
                };
                return ScanResult::partial(Output::SessionKeyMap(cache.snapshot()), err);
            }

            let dial = ctx.tls.cached_handshake(addr, &target.name, &key, &cache);
            let outcome = match timeout(deadline.remaining(), dial).await {
                Ok(Ok(_)) => check_single_session(&cache, &key),
                Ok(Err(err)) => Err(err),
                Err(_) => Err(ScanError::Timeout {
                    host: target.to_string(),
                }),
            };

            if let Err(err) = outcome {
                return ScanResult::partial(Output::SessionKeyMap(cache.snapshot()), err);
            }
            debug!(%addr, "session stored");
        }

        ScanResult::success(Grade::Good, Output::SessionKeyMap(cache.snapshot()))
    }
}

fn check_single_session(cache: &SessionCache, key: &str) -> Result<(), ScanError> {
    match cache.stored_count(key) {
        1 => Ok(()),
        0 => Err(ScanError::Resumption {
            addr: key.to_string(),
            detail: "server issued no session".into(),
        }),
        n => Err(ScanError::Resumption {
            addr: key.to_string(),
            detail: format!("{n} sessions stored under one key"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::net::Resolver;
    use crate::scan::ScanConfig;
    use crate::tls::{CipherSuiteId, Negotiated, SessionState, TlsClient, TlsVersion};
    use std::net::IpAddr;
    use std::sync::Mutex;

    struct FixedResolver(Vec<IpAddr>);

    #[async_trait]
    impl Resolver for FixedResolver {
        async fn resolve(&self, _name: &str) -> std::io::Result<Vec<IpAddr>> {
            Ok(self.0.clone())
        }
    }

    struct Backends {
        issued: Vec<(IpAddr, usize)>,
        dialed: Mutex<Vec<SocketAddr>>,
    }

    impl Backends {
        fn new(issued: &[(&str, usize)]) -> Self {
            Self {
                issued: issued
                    .iter()
                    .map(|(ip, n)| (ip.parse().unwrap(), *n))
                    .collect(),
                dialed: Mutex::new(Vec::new()),
            }
        }

        fn addrs(&self) -> Vec<IpAddr> {
            self.issued.iter().map(|(ip, _)| *ip).collect()
        }
    }

    #[async_trait]
    impl TlsClient for Backends {
        async fn handshake(&self, target: &HostPort) -> Result<Negotiated> {
            Err(ScanError::Config(format!("unexpected handshake with {target}")))
        }

        async fn hello(
            &self,
            target: &HostPort,
            _version: TlsVersion,
            _offered: &[CipherSuiteId],
        ) -> Result<Negotiated> {
            Err(ScanError::Config(format!("unexpected hello to {target}")))
        }

        async fn cached_handshake(
            &self,
            addr: SocketAddr,
            server_name: &str,
            key: &str,
            cache: &Arc<SessionCache>,
        ) -> Result<Negotiated> {
            assert_eq!(server_name, "lb.test");
            self.dialed.lock().unwrap().push(addr);
            let count = self
                .issued
                .iter()
                .find(|(ip, _)| *ip == addr.ip())
                .map(|(_, n)| *n)
                .unwrap_or(0);
            for i in 0..count {
                cache.store_state(
                    key,
                    SessionState {
                        id: format!("{:02x}{:02x}", addr.port() % 256, i),
                        version: Some(TlsVersion::Tls12),
                    },
                );
            }
            Ok(Negotiated::new(TlsVersion::Tls12, CipherSuiteId(0xc02f)))
        }
    }

    fn ctx_for(backends: Arc<Backends>) -> ScanContext {
        let resolver = Arc::new(FixedResolver(backends.addrs()));
        ScanContext::new(ScanConfig::default())
            .with_tls(backends)
            .with_resolver(resolver)
    }

    #[tokio::test]
    async fn consistent_backends_grade_good() {
        let backends = Arc::new(Backends::new(&[("192.0.2.1", 1), ("192.0.2.2", 1)]));
        let ctx = ctx_for(backends.clone());

        let result = SESSION_RESUME.scan("lb.test:8443", &ctx).await;
        assert!(result.error.is_none(), "{:?}", result.error);
        assert_eq!(result.grade, Grade::Good);

        let Some(Output::SessionKeyMap(map)) = result.output else {
            panic!("missing session map");
        };
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["192.0.2.1:8443", "192.0.2.2:8443"]);
        assert!(map.values().all(|states| states.len() == 1));
        assert_eq!(backends.dialed.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_session_fails_fast_and_names_address() {
        let backends = Arc::new(Backends::new(&[
            ("192.0.2.1", 1),
            ("192.0.2.2", 0),
            ("192.0.2.3", 1),
        ]));
        let ctx = ctx_for(backends.clone());

        let result = SESSION_RESUME.scan("lb.test", &ctx).await;
        assert_ne!(result.grade, Grade::Good);
        match &result.error {
            Some(ScanError::Resumption { addr, .. }) => assert_eq!(addr, "192.0.2.2:443"),
            other => panic!("unexpected error {other:?}"),
        }
        let dialed = backends.dialed.lock().unwrap().clone();
        assert_eq!(dialed.len(), 2);
        assert!(ctx.history.get_all("SessionResume", "lb.test").is_none());
    }

    #[tokio::test]
    async fn repeated_addresses_are_dialed_once() {
        let backends = Arc::new(Backends::new(&[
            ("192.0.2.1", 1),
            ("192.0.2.2", 1),
            ("192.0.2.1", 1),
        ]));
        let ctx = ctx_for(backends.clone());

        let result = SESSION_RESUME.scan("lb.test", &ctx).await;
        assert!(result.error.is_none(), "{:?}", result.error);
        assert_eq!(result.grade, Grade::Good);
        let dialed = backends.dialed.lock().unwrap().clone();
        assert_eq!(
            dialed,
            vec![
                "192.0.2.1:443".parse::<SocketAddr>().unwrap(),
                "192.0.2.2:443".parse().unwrap(),
            ]
        );
    }

    #[tokio::test]
    async fn duplicate_sessions_fail() {
        let backends = Arc::new(Backends::new(&[("192.0.2.1", 2)]));
        let ctx = ctx_for(backends);

        let result = SESSION_RESUME.scan("lb.test", &ctx).await;
        assert!(result
            .error
            .as_ref()
            .is_some_and(|e| e.to_string().contains("2 sessions")));
        assert!(matches!(result.output, Some(Output::SessionKeyMap(_))));
    }

    #[test]
    fn single_session_check() {
        let cache = SessionCache::new();
        assert!(check_single_session(&cache, "k").is_err());
        cache.store_state(
            "k",
            SessionState {
                id: "ab".into(),
                version: None,
            },
        );
        assert!(check_single_session(&cache, "k").is_ok());
    }
}
