use clap::Parser;
use tls_posture::cli::Cli;
use tls_posture::engine::Engine;
use tls_posture::output::{render_listing, OutputChannel};
use tls_posture::scan::{all_families, select};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let cfg = cli.into_config()?;

    if cfg.list {
        let selections = select(all_families(), &cfg.family_filter, &cfg.scanner_filter);
        print!("{}", render_listing(&selections, cfg.output.verbose));
        return Ok(());
    }

    let sink = OutputChannel::new(cfg.output.clone())?;
    let mut engine = Engine::new(cfg, sink.clone())?;
    let failures = engine.run().await?;
    sink.shutdown().await?;

    if failures > 0 {
        anyhow::bail!("{failures} scan(s) failed");
    }
    Ok(())
}
