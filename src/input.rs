use crate::model::Config;
use crate::net::HostPort;
use anyhow::Context;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

pub type HostReader = JoinHandle<anyhow::Result<()>>;

// The input file is opened before any host is streamed, so a missing file
// fails the run instead of being skipped. Read errors after that surface
// through the returned reader handle.
pub async fn stream_hosts(cfg: &Config) -> anyhow::Result<(ReceiverStream<String>, HostReader)> {
    let (tx, rx) = mpsc::channel(256);
    let default_port = cfg.scan.default_port;

    let file = match &cfg.input {
        Some(path) => Some(
            File::open(path)
                .await
                .with_context(|| format!("cannot open input {}", path))?,
        ),
        None => None,
    };

    let hosts = cfg.hosts.clone();
    let path = cfg.input.clone().unwrap_or_default();
    let reader = tokio::spawn(feed(hosts, file, path, default_port, tx));

    Ok((ReceiverStream::new(rx), reader))
}

async fn feed(
    hosts: Vec<String>,
    file: Option<File>,
    path: String,
    default_port: u16,
    tx: mpsc::Sender<String>,
) -> anyhow::Result<()> {
    for host in hosts {
        if !send_host(&host, default_port, &tx).await {
            return Ok(());
        }
    }
    if let Some(file) = file {
        read_file(file, default_port, &tx)
            .await
            .with_context(|| format!("cannot read input {}", path))?;
    }
    Ok(())
}

async fn read_file(file: File, default_port: u16, tx: &mpsc::Sender<String>) -> anyhow::Result<()> {
    let mut reader = BufReader::new(file).lines();
    while let Some(line) = reader.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if !send_host(trimmed, default_port, tx).await {
            break;
        }
    }
    Ok(())
}

async fn send_host(raw: &str, default_port: u16, tx: &mpsc::Sender<String>) -> bool {
    match normalize_host(raw, default_port) {
        Some(host) => tx.send(host).await.is_ok(),
        None => {
            tracing::warn!(line = %raw, "skipping invalid host");
            true
        }
    }
}

pub fn normalize_host(raw: &str, default_port: u16) -> Option<String> {
    HostPort::parse(raw.trim(), default_port)
        .ok()
        .map(|target| target.to_string())
}
