use crate::error::ScanError;
use crate::tls::{CipherSuiteId, SessionState, TlsVersion};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Grade {
    Bad,
    Legacy,
    Good,
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grade::Bad => write!(f, "Bad"),
            Grade::Legacy => write!(f, "Legacy"),
            Grade::Good => write!(f, "Good"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Output {
    AddressList(Vec<IpAddr>),
    CipherVersionMap(BTreeMap<TlsVersion, Vec<CipherSuiteId>>),
    SessionKeyMap(BTreeMap<String, Vec<SessionState>>),
}

impl Output {
    pub fn describe(&self) -> &'static str {
        match self {
            Output::AddressList(_) => "Addresses the host name resolved or connected to",
            Output::CipherVersionMap(_) => {
                "Cipher suites accepted by the host per SSL/TLS version, in preference order"
            }
            Output::SessionKeyMap(_) => "Sessions issued by the host per dialed address",
        }
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = match self {
            Output::AddressList(addrs) => addrs.iter().map(|a| a.to_string()).collect(),
            Output::CipherVersionMap(map) => map
                .iter()
                .flat_map(|(version, ciphers)| {
                    ciphers.iter().map(move |c| format!("{version}\t{c}"))
                })
                .collect(),
            Output::SessionKeyMap(map) => map
                .iter()
                .map(|(key, states)| {
                    let states: Vec<String> = states.iter().map(|s| s.to_string()).collect();
                    format!("{key}: {}", states.join(", "))
                })
                .collect(),
        };
        write!(f, "{}", lines.join("\n"))
    }
}

// The grade is `Bad` whenever `error` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanResult {
    pub grade: Grade,
    pub output: Option<Output>,
    pub error: Option<ScanError>,
}

impl ScanResult {
    pub fn success(grade: Grade, output: Output) -> Self {
        Self {
            grade,
            output: Some(output),
            error: None,
        }
    }

    pub fn failure(error: ScanError) -> Self {
        Self {
            grade: Grade::Bad,
            output: None,
            error: Some(error),
        }
    }

    pub fn partial(output: Output, error: ScanError) -> Self {
        Self {
            grade: Grade::Bad,
            output: Some(output),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
