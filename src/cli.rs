use crate::model::{Config, OutputConfig, OutputFormat};
use crate::net::DEFAULT_PORT;
use crate::scan::ScanConfig;
use anyhow::Context;
use clap::{ArgAction, Parser};
use regex::Regex;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(author, version, about = "TLS posture scanner", long_about = None)]
pub struct Cli {
    /// Hosts to scan, as host or host:port
    #[arg(value_name = "HOST")]
    pub hosts: Vec<String>,

    /// File containing hosts (one per line)
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    pub input: Option<String>,

    /// Regex selecting scan families by name
    #[arg(long = "family", value_name = "REGEX", default_value = "")]
    pub family: String,

    /// Regex selecting scanners by name
    #[arg(long = "scanner", value_name = "REGEX", default_value = "")]
    pub scanner: String,

    /// List the selected families and scanners, then exit
    #[arg(long = "list", action = ArgAction::SetTrue)]
    pub list: bool,

    /// Include descriptions and scanner output
    #[arg(short = 'v', long = "verbose", action = ArgAction::SetTrue)]
    pub verbose: bool,

    /// Hosts scanned in parallel
    #[arg(long = "concurrency", default_value_t = 4)]
    pub concurrency: usize,

    /// Connect timeout in milliseconds
    #[arg(long = "connect-timeout", default_value_t = 1000)]
    pub connect_timeout_ms: u64,

    /// TLS handshake timeout in milliseconds
    #[arg(long = "handshake-timeout", default_value_t = 5000)]
    pub handshake_timeout_ms: u64,

    /// Upper bound on a single scanner run in milliseconds
    #[arg(long = "scan-timeout", default_value_t = 120_000)]
    pub scan_timeout_ms: u64,

    /// Output format
    #[arg(long = "output", default_value_t = OutputFormat::Pretty)]
    pub output: OutputFormat,
}

impl Cli {
    pub fn into_config(self) -> anyhow::Result<Config> {
        if self.concurrency == 0 {
            anyhow::bail!("concurrency must be greater than zero");
        }

        if !self.list && self.hosts.is_empty() && self.input.is_none() {
            anyhow::bail!("at least one host or --input is required");
        }

        let family_filter = Regex::new(&self.family)
            .with_context(|| format!("invalid --family pattern {:?}", self.family))?;
        let scanner_filter = Regex::new(&self.scanner)
            .with_context(|| format!("invalid --scanner pattern {:?}", self.scanner))?;

        Ok(Config {
            hosts: self.hosts,
            input: self.input,
            family_filter,
            scanner_filter,
            list: self.list,
            concurrency: self.concurrency,
            scan: ScanConfig {
                connect_timeout: Duration::from_millis(self.connect_timeout_ms),
                handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
                scan_timeout: Duration::from_millis(self.scan_timeout_ms),
                default_port: DEFAULT_PORT,
                verbose: self.verbose,
            },
            output: OutputConfig {
                format: self.output,
                verbose: self.verbose,
            },
        })
    }
}
