use crate::model::{HostReport, OutputConfig, OutputFormat};
use crate::scan::{Scanner, Selection};
use std::fmt::Write as _;
use std::io::{BufWriter, Write};

pub struct OutputSink<W: Write = std::io::Stdout> {
    cfg: OutputConfig,
    writer: BufWriter<W>,
}

impl OutputSink {
    pub fn new(cfg: OutputConfig) -> Self {
        Self::with_writer(cfg, std::io::stdout())
    }
}

impl<W: Write> OutputSink<W> {
    pub fn with_writer(cfg: OutputConfig, writer: W) -> Self {
        Self {
            cfg,
            writer: BufWriter::new(writer),
        }
    }

    pub fn write_report(&mut self, report: &HostReport) -> anyhow::Result<()> {
        match self.cfg.format {
            OutputFormat::Jsonl => {
                for scan in &report.reports {
                    let line = serde_json::to_string(scan)?;
                    writeln!(self.writer, "{line}")?;
                }
            }
            OutputFormat::Pretty => {
                self.writer
                    .write_all(render_pretty(report, self.cfg.verbose).as_bytes())?;
            }
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn flush(&mut self) {
        let _ = self.writer.flush();
    }

    pub fn into_inner(self) -> anyhow::Result<W> {
        self.writer
            .into_inner()
            .map_err(|err| anyhow::anyhow!("failed to flush output: {}", err.error()))
    }
}

pub fn render_pretty(report: &HostReport, verbose: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Scanning {}", report.host);

    let mut family = "";
    for scan in &report.reports {
        if verbose && scan.family != family {
            family = scan.family;
            let _ = writeln!(out, "[{family}]");
        }
        let _ = writeln!(out, "{}: {}", scan.scanner, scan.grade);
        if verbose {
            if let Some(output) = &scan.output {
                for line in output.to_string().lines() {
                    let _ = writeln!(out, "    {line}");
                }
            }
        }
        if let Some(err) = &scan.error {
            let _ = writeln!(out, "    error: {err}");
        }
    }
    out
}

pub fn render_listing(selections: &[Selection], verbose: bool) -> String {
    let mut out = String::new();
    for selection in selections {
        let _ = writeln!(out, "{}", selection.family.label(verbose));
        for scanner in &selection.scanners {
            let _ = writeln!(out, "    {}", scanner.label(verbose));
        }
    }
    out
}
