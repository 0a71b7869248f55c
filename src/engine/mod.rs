pub mod pipeline;

use crate::model::Config;
use crate::output::OutputChannel;
use crate::scan::{all_families, select, ScanContext, Selection};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use pipeline::scan_host;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, instrument};

pub struct Engine {
    cfg: Config,
    sink: OutputChannel,
    ctx: ScanContext,
    selections: Arc<Vec<Selection>>,
    sem: Arc<Semaphore>,
    failures: Arc<AtomicUsize>,
}

impl Engine {
    pub fn new(cfg: Config, sink: OutputChannel) -> anyhow::Result<Self> {
        let ctx = ScanContext::new(cfg.scan.clone());
        Self::with_context(cfg, sink, ctx)
    }

    pub fn with_context(cfg: Config, sink: OutputChannel, ctx: ScanContext) -> anyhow::Result<Self> {
        let selections = select(all_families(), &cfg.family_filter, &cfg.scanner_filter);
        if selections.is_empty() {
            anyhow::bail!("no scanners match the given --family/--scanner filters");
        }

        Ok(Self {
            sem: Arc::new(Semaphore::new(cfg.concurrency)),
            selections: Arc::new(selections),
            failures: Arc::new(AtomicUsize::new(0)),
            cfg,
            sink,
            ctx,
        })
    }

    #[instrument(skip(self))]
    pub async fn run(&mut self) -> anyhow::Result<usize> {
        let (mut stream, reader) = crate::input::stream_hosts(&self.cfg).await?;
        let mut tasks = FuturesUnordered::new();

        while let Some(host) = stream.next().await {
            let permit = self.sem.clone().acquire_owned().await?;
            let ctx = self.ctx.clone();
            let selections = Arc::clone(&self.selections);
            let sink = self.sink.clone();
            let failures = Arc::clone(&self.failures);
            tasks.push(tokio::spawn(async move {
                let _permit = permit;
                let report = scan_host(&ctx, &host, &selections).await;
                failures.fetch_add(report.failures(), Ordering::Relaxed);
                if let Err(err) = sink.emit(report).await {
                    tracing::error!(error = %err, "failed to emit host report");
                }
            }));
        }

        while let Some(joined) = tasks.next().await {
            joined?;
        }
        reader.await??;

        let failures = self.failures.load(Ordering::Relaxed);
        info!(failures, "scan finished");
        Ok(failures)
    }
}
