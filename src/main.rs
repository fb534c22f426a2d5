// Command-line entry point for archlens.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use archlens::api::RunSummaryDto;
use archlens::application::{AnalysisRun, RawConfig, RunState};
use archlens::application::config::CONFIG_FILE_NAME;
use archlens::ports::json_exporter::JsonExporter;
use archlens::ports::ReportExporter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Repository root to analyze
    root: PathBuf,

    /// Configuration file (defaults to <root>/archlens.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ignore and do not write the on-disk cache
    #[arg(long)]
    no_cache: bool,

    /// Process files one at a time on the main thread
    #[arg(long)]
    sequential: bool,

    /// Maximum worker threads
    #[arg(short, long)]
    workers: Option<i64>,

    /// Framework name, or `auto`
    #[arg(short, long)]
    framework: Option<String>,

    /// Phase to skip (can specify multiple)
    #[arg(long = "disable")]
    disable: Vec<String>,

    /// Output file path (JSON); stdout when omitted
    #[arg(short, long)]
    output: Option<String>,

    /// Pretty-print the JSON report
    #[arg(long)]
    pretty: bool,

    /// Write counts and phase statistics instead of the full model
    #[arg(long)]
    summary: bool,
}

impl Cli {
    /// Configuration file values, overridden by command-line flags.
    fn raw_config(&self) -> Result<RawConfig> {
        let mut raw = match &self.config {
            Some(path) => RawConfig::from_file(path)?,
            None => {
                let default = self.root.join(CONFIG_FILE_NAME);
                if default.is_file() {
                    RawConfig::from_file(&default)?
                } else {
                    RawConfig::default()
                }
            }
        };

        if self.no_cache {
            raw.incremental = Some(false);
        }
        if self.sequential {
            raw.parallel = Some(false);
        }
        if self.workers.is_some() {
            raw.max_workers = self.workers;
        }
        if self.framework.is_some() {
            raw.framework = self.framework.clone();
        }
        raw.disabled_phases.extend(self.disable.iter().cloned());
        Ok(raw)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.raw_config()?.validate()?;
    let run = AnalysisRun::new(&cli.root, config)
        .with_context(|| format!("Cannot analyze {}", cli.root.display()))?;

    let report = run.execute();
    let summary = RunSummaryDto::from(&report);
    for phase in &summary.phases {
        info!(
            "{}: {:?}, {} added, {} cached, {} extracted, {} failed",
            phase.phase, phase.status, phase.entities_added, phase.cache_hits, phase.cache_misses, phase.failed
        );
    }
    info!(
        "{} endpoints, {} models, {} actors, {} use cases ({} framework)",
        summary.model.endpoints,
        summary.model.models,
        summary.model.actors,
        summary.model.use_cases,
        summary.model.framework
    );

    let exporter = JsonExporter {
        pretty: cli.pretty,
        summary: cli.summary,
    };
    match &cli.output {
        Some(path) => {
            exporter
                .export(&report, path)
                .with_context(|| format!("Failed to write report to {}", path))?;
            info!("Report written to {}", path);
        }
        None => {
            let json = exporter.to_json(&report)?;
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}", json)?;
        }
    }

    if report.state == RunState::Failed {
        bail!(
            "analysis stopped early: {}",
            report.failure.as_deref().unwrap_or("unknown failure")
        );
    }
    Ok(())
}
