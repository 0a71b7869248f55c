use crate::scan::{Grade, Output, ScanConfig, ScanResult};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone)]
pub struct Config {
    pub hosts: Vec<String>,
    pub input: Option<String>,
    pub family_filter: Regex,
    pub scanner_filter: Regex,
    pub list: bool,
    pub concurrency: usize,
    pub scan: ScanConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub verbose: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jsonl,
    Pretty,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Jsonl => write!(f, "jsonl"),
            OutputFormat::Pretty => write!(f, "pretty"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub host: String,
    pub family: &'static str,
    pub scanner: &'static str,
    pub grade: Grade,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Output>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ScanReport {
    pub fn new(host: &str, family: &'static str, scanner: &'static str, result: ScanResult) -> Self {
        Self {
            host: host.to_string(),
            family,
            scanner,
            grade: result.grade,
            output: result.output,
            error: result.error.map(|err| err.to_string()),
            timestamp: Utc::now(),
        }
    }

    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HostReport {
    pub host: String,
    pub reports: Vec<ScanReport>,
}

impl HostReport {
    pub fn failures(&self) -> usize {
        self.reports.iter().filter(|r| r.failed()).count()
    }
}
