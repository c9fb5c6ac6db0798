use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use coupon_core::{
    build_index, BuildReport, MetricValue, ResultCache, SourceConfig, SourceStatus,
    ValidationEngine, ValidatorConfig,
};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "coupon-check")]
#[command(about = "Validate coupon codes against 2-3 independent code lists", long_about = None)]
pub struct Cli {
    /// TOML or JSON config file
    #[arg(short, long, env = "COUPON_CHECK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Source list, in bit order; repeat 2-3 times. Replaces configured sources.
    #[arg(short, long = "source")]
    pub sources: Vec<PathBuf>,

    /// Result cache capacity
    #[arg(long)]
    pub cache_capacity: Option<usize>,

    /// Ingest sources one after another instead of in parallel
    #[arg(long)]
    pub sequential: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build the index and print the per-source report
    Index,
    /// Build the index, then validate codes from arguments or stdin
    Check {
        /// Codes to validate; read one per line from stdin when empty
        codes: Vec<String>,
        /// Print validation counters after the last code
        #[arg(long)]
        metrics: bool,
    },
}

impl Cli {
    /// Merge the config file (if any) with command line overrides.
    pub fn resolve_config(&self) -> Result<ValidatorConfig> {
        let mut config = match &self.config {
            Some(path) => ValidatorConfig::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => ValidatorConfig::default(),
        };
        if !self.sources.is_empty() {
            config.sources = self.sources.iter().map(SourceConfig::new).collect();
        }
        if let Some(capacity) = self.cache_capacity {
            config.cache_capacity = capacity;
        }
        if self.sequential {
            config.ingest.parallel = false;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        config.validate()?;
        Ok(config)
    }

    pub async fn run(self, config: ValidatorConfig) -> Result<()> {
        let report = build(&config).await?;
        print_report(&report);
        report.ensure_quorum_capable()?;

        match self.command {
            Command::Index => Ok(()),
            Command::Check { codes, metrics } => {
                let engine = ValidationEngine::new(
                    Arc::clone(&report.index),
                    Arc::new(ResultCache::new(config.cache_capacity)),
                );
                if codes.is_empty() {
                    check_stdin(&engine).await?;
                } else {
                    for code in &codes {
                        print_decision(&engine, code);
                    }
                }
                if metrics {
                    print_metrics(&engine);
                }
                Ok(())
            }
        }
    }
}

async fn build(config: &ValidatorConfig) -> Result<BuildReport> {
    let openers = config.source_openers();
    let ingest = config.ingest.clone();
    let report = tokio::task::spawn_blocking(move || build_index(&openers, &ingest))
        .await
        .context("index build task failed")??;
    Ok(report)
}

async fn check_stdin(engine: &ValidationEngine) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        print_decision(engine, &line);
    }
    Ok(())
}

fn print_decision(engine: &ValidationEngine, code: &str) {
    let verdict = if engine.is_valid(code) { "valid" } else { "invalid" };
    println!("{}\t{}", code.trim(), verdict);
}

fn print_report(report: &BuildReport) {
    eprintln!(
        "{:<4} {:<40} {:<8} {:>10} {:>12} {:>10} {:>10}",
        "BIT", "SOURCE", "FORMAT", "LINES", "CODES", "SKIPPED", "ELAPSED"
    );
    eprintln!("{}", "-".repeat(100));
    for source in &report.sources {
        let format = source
            .compression
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        eprintln!(
            "{:<4} {:<40} {:<8} {:>10} {:>12} {:>10} {:>9.2}s",
            source.bit.position(),
            source.name,
            format,
            source.lines_read,
            source.codes_indexed,
            source.lines_skipped,
            source.elapsed.as_secs_f64()
        );
        if let SourceStatus::Failed(reason) = &source.status {
            eprintln!("     skipped: {}", reason);
        }
    }
    eprintln!(
        "Indexed {} unique coupons from {}/{} sources in {:.2}s",
        report.index_size,
        report.ingested_count(),
        report.sources.len(),
        report.total_elapsed.as_secs_f64()
    );
}

fn print_metrics(engine: &ValidationEngine) {
    for metric in engine.metrics().collect() {
        let (kind, value) = match metric.value {
            MetricValue::Counter(v) => ("counter", v.to_string()),
            MetricValue::Gauge(v) => ("gauge", format!("{v:.4}")),
        };
        eprintln!("# HELP {} {}", metric.name, metric.help);
        eprintln!("# TYPE {} {}", metric.name, kind);
        eprintln!("{} {}", metric.name, value);
    }
    let cache = engine.cache().stats();
    eprintln!(
        "# cache size={} hits={} misses={} evictions={}",
        cache.size, cache.hits, cache.misses, cache.evictions
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sources_override_config() {
        let cli = Cli::parse_from([
            "coupon-check",
            "--source",
            "/data/a.gz",
            "-s",
            "/data/b.gz",
            "--cache-capacity",
            "10",
            "--sequential",
            "index",
        ]);
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[1].path, PathBuf::from("/data/b.gz"));
        assert_eq!(config.cache_capacity, 10);
        assert!(!config.ingest.parallel);
    }

    #[test]
    fn test_single_source_rejected() {
        let cli = Cli::parse_from(["coupon-check", "-s", "/data/a.gz", "index"]);
        assert!(cli.resolve_config().is_err());
    }

    #[test]
    fn test_check_codes_parsed() {
        let cli = Cli::parse_from([
            "coupon-check",
            "-s",
            "/a.gz",
            "-s",
            "/b.gz",
            "check",
            "SAVE1234",
            "OTHERCOD",
            "--metrics",
        ]);
        match cli.command {
            Command::Check { codes, metrics } => {
                assert_eq!(codes, vec!["SAVE1234", "OTHERCOD"]);
                assert!(metrics);
            }
            Command::Index => panic!("expected check"),
        }
    }
}
