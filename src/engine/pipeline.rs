use crate::model::{HostReport, ScanReport};
use crate::scan::{ScanContext, Scanner, Selection};
use crate::util::now_millis;
use tracing::{debug, instrument};

#[instrument(skip(ctx, selections))]
pub async fn scan_host(ctx: &ScanContext, host: &str, selections: &[Selection]) -> HostReport {
    let start = now_millis();
    let mut reports = Vec::new();

    for selection in selections {
        for scanner in &selection.scanners {
            let result = scanner.scan(host, ctx).await;
            reports.push(ScanReport::new(
                host,
                selection.family.name,
                scanner.name(),
                result,
            ));
        }
    }

    let total = now_millis() - start;
    debug!(target = %host, ms = total, scans = reports.len(), "processed host");

    HostReport {
        host: host.to_string(),
        reports,
    }
}
