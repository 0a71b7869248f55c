pub mod connectivity;
mod context;
pub mod handshake;
mod history;
pub mod registry;
mod result;
pub mod session;

pub use context::{Deadline, ScanConfig, ScanContext};
pub use history::{History, HistoryEntry};
pub use registry::{all_families, select, Selection};
pub use result::{Grade, Output, ScanResult};

use async_trait::async_trait;
use tracing::{info, warn};

#[async_trait]
pub trait Scanner: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;

    // Implementations must not touch the history.
    async fn probe(&self, host: &str, ctx: &ScanContext, deadline: Deadline) -> ScanResult;

    fn label(&self, verbose: bool) -> String {
        if verbose {
            format!("{}: {}", self.name(), self.description())
        } else {
            self.name().to_string()
        }
    }

    async fn scan(&self, host: &str, ctx: &ScanContext) -> ScanResult {
        let deadline = Deadline::after(ctx.config.scan_timeout);
        let result = self.probe(host, ctx, deadline).await;
        match (&result.error, &result.output) {
            (None, Some(output)) => {
                ctx.history.record(self.name(), host, output.clone());
                info!(scanner = self.name(), host, grade = %result.grade, "scan complete");
            }
            (None, None) => {
                info!(scanner = self.name(), host, grade = %result.grade, "scan complete");
            }
            (Some(err), _) => {
                warn!(scanner = self.name(), host, error = %err, "scan failed");
            }
        }
        result
    }
}

impl std::fmt::Debug for dyn Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

pub struct Family {
    pub name: &'static str,
    pub description: &'static str,
    pub scanners: &'static [&'static dyn Scanner],
}

impl Family {
    pub fn label(&self, verbose: bool) -> String {
        if verbose {
            format!("{}: {}", self.name, self.description)
        } else {
            self.name.to_string()
        }
    }
}

impl std::fmt::Debug for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.scanners.iter().map(|s| s.name()).collect();
        f.debug_struct("Family")
            .field("name", &self.name)
            .field("scanners", &names)
            .finish()
    }
}
