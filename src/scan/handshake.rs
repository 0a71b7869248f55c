use super::{Deadline, Family, Grade, Output, ScanContext, ScanResult, Scanner};
use crate::error::{Result, ScanError};
use crate::net::HostPort;
use crate::tls::{ciphers, describe_wire_version, CipherSuiteId, TlsClient, TlsVersion};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::time::timeout;
use tracing::{debug, warn};

pub struct CipherSuiteScanner;

static CIPHER_SUITE: CipherSuiteScanner = CipherSuiteScanner;

pub static TLS_HANDSHAKE: Family = Family {
    name: "TLSHandshake",
    description: "Scans for host's SSL and TLS version and cipher suite negotiation",
    scanners: &[&CIPHER_SUITE],
};

#[async_trait]
impl Scanner for CipherSuiteScanner {
    fn name(&self) -> &'static str {
        "CipherSuite"
    }

    fn description(&self) -> &'static str {
        "Determines host's supported cipher suites by SSL/TLS version, in preference order"
    }

    async fn probe(&self, host: &str, ctx: &ScanContext, deadline: Deadline) -> ScanResult {
        let target = match HostPort::parse(host, ctx.config.default_port) {
            Ok(target) => target,
            Err(err) => return ScanResult::failure(err),
        };

        let mut map = BTreeMap::new();
        let mut violation = None;
        let mut untested: Vec<(TlsVersion, String)> = Vec::new();

        for version in TlsVersion::PROBED {
            let catalog = ciphers::ids_for(version);
            let candidates = match ctx.tls.offerable(version, &catalog).await {
                Ok(candidates) => candidates,
                Err(ScanError::Unsupported { detail, .. }) => {
                    warn!(host = %target, %version, %detail, "version cannot be offered locally");
                    untested.push((version, detail));
                    continue;
                }
                Err(err) => return ScanResult::partial(Output::CipherVersionMap(map), err),
            };

            let missing: Vec<String> = catalog
                .iter()
                .filter(|id| !candidates.contains(id))
                .map(|id| id.to_string())
                .collect();
            if !missing.is_empty() {
                warn!(host = %target, %version, suites = %missing.join(","), "suites cannot be offered locally");
                untested.push((version, format!("cannot offer {}", missing.join(", "))));
            }

            let mut accepted = Vec::new();
            let outcome = enumerate_version(
                ctx.tls.as_ref(),
                &target,
                version,
                &candidates,
                deadline,
                &mut accepted,
            )
            .await;
            if !accepted.is_empty() {
                map.insert(version, accepted);
            }

            match outcome {
                Ok(()) => {}
                Err(err @ ScanError::ProtocolViolation { .. }) => {
                    warn!(host = %target, %version, error = %err, "abandoning version");
                    violation.get_or_insert(err);
                }
                Err(ScanError::Unsupported { detail, .. }) => {
                    warn!(host = %target, %version, %detail, "version cannot be offered locally");
                    untested.push((version, detail));
                }
                Err(err) => return ScanResult::partial(Output::CipherVersionMap(map), err),
            }
        }

        if let Some(err) = violation {
            return ScanResult::partial(Output::CipherVersionMap(map), err);
        }
        if let Some((version, _)) = untested.first() {
            let detail = untested
                .iter()
                .map(|(version, detail)| format!("{version}: {detail}"))
                .collect::<Vec<_>>()
                .join("; ");
            let err = ScanError::Unsupported {
                version: *version,
                detail,
            };
            return ScanResult::partial(Output::CipherVersionMap(map), err);
        }

        let grade = grade(&map);
        ScanResult::success(grade, Output::CipherVersionMap(map))
    }
}

// A refused handshake ends the walk normally. Every other failure is
// returned after whatever was already appended.
pub async fn enumerate_version(
    tls: &dyn TlsClient,
    target: &HostPort,
    version: TlsVersion,
    candidates: &[CipherSuiteId],
    deadline: Deadline,
    accepted: &mut Vec<CipherSuiteId>,
) -> Result<()> {
    let mut candidates = candidates.to_vec();
    while !candidates.is_empty() {
        if deadline.expired() {
            return Err(ScanError::Timeout {
                host: target.to_string(),
            });
        }

        let hello = timeout(deadline.remaining(), tls.hello(target, version, &candidates)).await;
        let negotiated = match hello {
            Ok(Ok(negotiated)) => negotiated,
            Ok(Err(ScanError::Handshake { message, .. })) => {
                debug!(host = %target, %version, %message, "no further suites accepted");
                return Ok(());
            }
            Ok(Err(err)) => return Err(err),
            Err(_) => {
                return Err(ScanError::Timeout {
                    host: target.to_string(),
                })
            }
        };

        if negotiated.version != version.wire() {
            return Err(ScanError::ProtocolViolation {
                addr: target.to_string(),
                version,
                detail: format!(
                    "server negotiated {} instead",
                    describe_wire_version(negotiated.version)
                ),
            });
        }

        let Some(index) = candidates.iter().position(|c| *c == negotiated.cipher) else {
            return Err(ScanError::ProtocolViolation {
                addr: target.to_string(),
                version,
                detail: format!("server chose {} which was not offered", negotiated.cipher),
            });
        };

        candidates.remove(index);
        accepted.push(negotiated.cipher);
    }

    Ok(())
}

pub fn grade(map: &BTreeMap<TlsVersion, Vec<CipherSuiteId>>) -> Grade {
    let negotiated = |version: &TlsVersion| map.get(version).is_some_and(|c| !c.is_empty());
    if negotiated(&TlsVersion::Ssl30) {
        Grade::Legacy
    } else if TlsVersion::PROBED.iter().any(negotiated) {
        Grade::Good
    } else {
        Grade::Bad
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::ScanConfig;
    use crate::tls::{Negotiated, SessionCache};
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const A: CipherSuiteId = CipherSuiteId(0xc030);
    const B: CipherSuiteId = CipherSuiteId(0xc02f);
    const C: CipherSuiteId = CipherSuiteId(0x002f);

    #[derive(Default)]
    struct ScriptedServer {
        prefs: HashMap<TlsVersion, Vec<CipherSuiteId>>,
        rogue: HashMap<TlsVersion, Negotiated>,
        // local stack gaps
        unavailable: HashMap<TlsVersion, String>,
        missing: Vec<CipherSuiteId>,
        unreachable: bool,
        silent: bool,
        hellos: AtomicUsize,
        offered: std::sync::Mutex<Vec<(TlsVersion, Vec<CipherSuiteId>)>>,
    }

    impl ScriptedServer {
        fn accepting(version: TlsVersion, prefs: &[CipherSuiteId]) -> Self {
            let mut server = Self::default();
            server.prefs.insert(version, prefs.to_vec());
            server
        }
    }

    #[async_trait]
    impl TlsClient for ScriptedServer {
        async fn handshake(&self, target: &HostPort) -> Result<Negotiated> {
            Err(ScanError::Config(format!("unexpected handshake with {target}")))
        }

        async fn offerable(
            &self,
            version: TlsVersion,
            candidates: &[CipherSuiteId],
        ) -> Result<Vec<CipherSuiteId>> {
            if let Some(detail) = self.unavailable.get(&version) {
                return Err(ScanError::Unsupported {
                    version,
                    detail: detail.clone(),
                });
            }
            Ok(candidates
                .iter()
                .copied()
                .filter(|id| !self.missing.contains(id))
                .collect())
        }

        async fn hello(
            &self,
            target: &HostPort,
            version: TlsVersion,
            offered: &[CipherSuiteId],
        ) -> Result<Negotiated> {
            self.hellos.fetch_add(1, Ordering::SeqCst);
            self.offered
                .lock()
                .unwrap()
                .push((version, offered.to_vec()));
            if self.silent {
                return Err(ScanError::Timeout {
                    host: target.to_string(),
                });
            }
            if self.unreachable {
                return Err(ScanError::Connect {
                    addr: target.to_string(),
                    message: "connection refused".into(),
                });
            }
            if let Some(rogue) = self.rogue.get(&version) {
                return Ok(*rogue);
            }
            self.prefs
                .get(&version)
                .and_then(|prefs| prefs.iter().find(|c| offered.contains(c)))
                .map(|c| Negotiated::new(version, *c))
                .ok_or_else(|| ScanError::Handshake {
                    addr: target.to_string(),
                    message: "handshake failure".into(),
                })
        }

        async fn cached_handshake(
            &self,
            addr: SocketAddr,
            _server_name: &str,
            _key: &str,
            _cache: &Arc<SessionCache>,
        ) -> Result<Negotiated> {
            Err(ScanError::Config(format!("unexpected cached handshake with {addr}")))
        }
    }

    fn ctx_for(server: Arc<ScriptedServer>) -> ScanContext {
        ScanContext::new(ScanConfig::default()).with_tls(server)
    }

    #[tokio::test]
    async fn discovers_preference_order_at_single_version() {
        let server = Arc::new(ScriptedServer::accepting(TlsVersion::Tls12, &[A, B, C]));
        let ctx = ctx_for(server.clone());

        let result = CIPHER_SUITE.scan("test.local", &ctx).await;
        assert!(result.error.is_none());
        assert_eq!(result.grade, Grade::Good);

        let mut expected = BTreeMap::new();
        expected.insert(TlsVersion::Tls12, vec![A, B, C]);
        assert_eq!(result.output, Some(Output::CipherVersionMap(expected)));

        // One refused hello at each of SSL3.0, TLS1.0 and TLS1.1, plus 3 + 1 at TLS1.2.
        assert_eq!(server.hellos.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn server_preference_wins_over_offer_order() {
        // Offered order follows the catalog, which lists A before C.
        let server = Arc::new(ScriptedServer::accepting(TlsVersion::Tls12, &[C, A]));
        let ctx = ctx_for(server);

        let result = CIPHER_SUITE.scan("test.local", &ctx).await;
        match result.output {
            Some(Output::CipherVersionMap(map)) => {
                assert_eq!(map.get(&TlsVersion::Tls12), Some(&vec![C, A]));
            }
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[tokio::test]
    async fn candidates_reset_for_each_version() {
        let mut server = ScriptedServer::accepting(TlsVersion::Tls10, &[C]);
        server.prefs.insert(TlsVersion::Tls12, vec![A, C]);
        let ctx = ctx_for(Arc::new(server));

        let result = CIPHER_SUITE.scan("test.local", &ctx).await;
        let Some(Output::CipherVersionMap(map)) = result.output else {
            panic!("missing cipher map");
        };
        assert_eq!(map.get(&TlsVersion::Tls10), Some(&vec![C]));
        assert_eq!(map.get(&TlsVersion::Tls12), Some(&vec![A, C]));
        assert!(!map.contains_key(&TlsVersion::Ssl30));
    }

    #[tokio::test]
    async fn ssl3_support_grades_legacy() {
        let mut server = ScriptedServer::accepting(TlsVersion::Ssl30, &[CipherSuiteId(0x0005)]);
        server.prefs.insert(TlsVersion::Tls12, vec![A]);
        let ctx = ctx_for(Arc::new(server));

        let result = CIPHER_SUITE.scan("test.local", &ctx).await;
        assert!(result.error.is_none());
        assert_eq!(result.grade, Grade::Legacy);
    }

    #[tokio::test]
    async fn refusing_everything_grades_bad_without_error() {
        let server = Arc::new(ScriptedServer::default());
        let ctx = ctx_for(server.clone());

        let result = CIPHER_SUITE.scan("test.local", &ctx).await;
        assert!(result.error.is_none());
        assert_eq!(result.grade, Grade::Bad);
        assert_eq!(
            result.output,
            Some(Output::CipherVersionMap(BTreeMap::new()))
        );
        assert_eq!(server.hellos.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn unoffered_cipher_is_a_violation_for_that_version_only() {
        let mut server = ScriptedServer::accepting(TlsVersion::Tls12, &[A, B]);
        server.rogue.insert(
            TlsVersion::Tls10,
            Negotiated::new(TlsVersion::Tls10, CipherSuiteId(0xfefe)),
        );
        let ctx = ctx_for(Arc::new(server));

        let result = CIPHER_SUITE.scan("test.local", &ctx).await;
        assert_eq!(result.grade, Grade::Bad);
        assert!(matches!(
            result.error,
            Some(ScanError::ProtocolViolation {
                version: TlsVersion::Tls10,
                ..
            })
        ));

        let Some(Output::CipherVersionMap(map)) = result.output else {
            panic!("partial map should be kept");
        };
        assert_eq!(map.get(&TlsVersion::Tls12), Some(&vec![A, B]));
        assert!(!map.contains_key(&TlsVersion::Tls10));
        assert!(ctx.history.get_all("CipherSuite", "test.local").is_none());
    }

    #[tokio::test]
    async fn version_mismatch_is_a_violation() {
        let mut server = ScriptedServer::default();
        server
            .rogue
            .insert(TlsVersion::Ssl30, Negotiated::new(TlsVersion::Tls12, A));
        let server = Arc::new(server);

        let target = HostPort::parse("test.local", 443).unwrap();
        let mut accepted = Vec::new();
        let err = enumerate_version(
            server.as_ref(),
            &target,
            TlsVersion::Ssl30,
            &[A, C],
            Deadline::after(std::time::Duration::from_secs(5)),
            &mut accepted,
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("TLS1.2 instead"));
        assert!(accepted.is_empty());
        assert_eq!(server.hellos.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unreachable_host_surfaces_connect_error() {
        let server = Arc::new(ScriptedServer {
            unreachable: true,
            ..Default::default()
        });
        let ctx = ctx_for(server.clone());

        let result = CIPHER_SUITE.scan("test.local", &ctx).await;
        assert!(matches!(result.error, Some(ScanError::Connect { .. })));
        assert!(result.error.as_ref().is_some_and(ScanError::is_transport));
        assert_eq!(result.grade, Grade::Bad);
        assert_eq!(server.hellos.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_deadline_stops_before_dialing() {
        let server = Arc::new(ScriptedServer::accepting(TlsVersion::Tls12, &[A]));
        let ctx = ctx_for(server.clone());

        let deadline = Deadline::after(std::time::Duration::ZERO);
        let result = CIPHER_SUITE.probe("test.local", &ctx, deadline).await;
        assert!(matches!(result.error, Some(ScanError::Timeout { .. })));
        assert_eq!(server.hellos.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn version_the_local_stack_cannot_offer_is_reported() {
        let mut server = ScriptedServer::accepting(TlsVersion::Tls12, &[A, B]);
        server
            .unavailable
            .insert(TlsVersion::Ssl30, "no protocols available".into());
        let server = Arc::new(server);
        let ctx = ctx_for(server.clone());

        let result = CIPHER_SUITE.scan("test.local", &ctx).await;
        assert_eq!(result.grade, Grade::Bad);
        match &result.error {
            Some(ScanError::Unsupported { version, detail }) => {
                assert_eq!(*version, TlsVersion::Ssl30);
                assert!(detail.contains("no protocols available"));
            }
            other => panic!("unexpected error {other:?}"),
        }

        let Some(Output::CipherVersionMap(map)) = &result.output else {
            panic!("partial map should be kept");
        };
        assert_eq!(map.get(&TlsVersion::Tls12), Some(&vec![A, B]));
        assert!(!map.contains_key(&TlsVersion::Ssl30));
        assert!(ctx.history.get_all("CipherSuite", "test.local").is_none());

        let offered = server.offered.lock().unwrap();
        assert!(offered.iter().all(|(version, _)| *version != TlsVersion::Ssl30));
        // TLS1.0 and TLS1.1 refuse once each, TLS1.2 takes 2 + 1.
        assert_eq!(server.hellos.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn suites_the_local_stack_drops_are_not_offered_and_are_reported() {
        let rc4 = CipherSuiteId(0x0005);
        let mut server = ScriptedServer::accepting(TlsVersion::Tls10, &[rc4, C]);
        server.missing = vec![rc4];
        let server = Arc::new(server);
        let ctx = ctx_for(server.clone());

        let result = CIPHER_SUITE.scan("test.local", &ctx).await;
        let Some(ScanError::Unsupported { version, detail }) = &result.error else {
            panic!("expected a local capability error, got {:?}", result.error);
        };
        assert_eq!(*version, TlsVersion::Ssl30);
        assert!(detail.contains(&rc4.to_string()));
        assert!(detail.contains("TLS1.2"));

        let Some(Output::CipherVersionMap(map)) = &result.output else {
            panic!("partial map should be kept");
        };
        assert_eq!(map.get(&TlsVersion::Tls10), Some(&vec![C]));

        let offered = server.offered.lock().unwrap();
        assert!(offered.iter().all(|(_, suites)| !suites.contains(&rc4)));
    }

    #[tokio::test]
    async fn handshake_timeout_aborts_with_partial_map() {
        let server = Arc::new(ScriptedServer {
            silent: true,
            ..Default::default()
        });
        let ctx = ctx_for(server.clone());

        let result = CIPHER_SUITE.scan("test.local", &ctx).await;
        assert!(matches!(result.error, Some(ScanError::Timeout { .. })));
        assert_eq!(result.grade, Grade::Bad);
        assert_eq!(
            result.output,
            Some(Output::CipherVersionMap(BTreeMap::new()))
        );
        assert!(ctx.history.get_all("CipherSuite", "test.local").is_none());
        assert_eq!(server.hellos.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn grading_policy() {
        let mut map = BTreeMap::new();
        assert_eq!(grade(&map), Grade::Bad);
        map.insert(TlsVersion::Tls11, vec![C]);
        assert_eq!(grade(&map), Grade::Good);
        map.insert(TlsVersion::Ssl30, vec![]);
        assert_eq!(grade(&map), Grade::Good);
        map.insert(TlsVersion::Ssl30, vec![C]);
        assert_eq!(grade(&map), Grade::Legacy);
    }
}
