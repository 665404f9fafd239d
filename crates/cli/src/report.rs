//! Run output: results files, metrics textfile and console reports.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Serialize;
use sha2::{Digest, Sha256};
use warmer_core::ledger::StatusCounts;
use warmer_core::{metrics, Config, LedgerStats, RunPlan, RunSummary, SanitizedConfig};

/// Short hash of the effective configuration, secrets excluded.
pub fn config_hash(config: &Config) -> String {
    let sanitized = SanitizedConfig::from(config);
    let json = serde_json::to_string(&sanitized).unwrap_or_default();
    let hash = format!("{:x}", Sha256::digest(json.as_bytes()));
    hash[..16].to_string()
}

#[derive(Serialize)]
struct ResultsFile<'a> {
    version: &'a str,
    config_hash: &'a str,
    #[serde(flatten)]
    summary: &'a RunSummary,
}

fn results_file_name(finished_at: DateTime<Utc>) -> String {
    format!("results_{}.json", finished_at.format("%Y%m%d_%H%M%S"))
}

/// Write `summary` as `results_<timestamp>.json` under `dir`.
pub fn write_results(dir: &Path, summary: &RunSummary, config_hash: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create results directory {}", dir.display()))?;

    let path = dir.join(results_file_name(summary.finished_at));
    let file = ResultsFile {
        version: env!("CARGO_PKG_VERSION"),
        config_hash,
        summary,
    };
    let json = serde_json::to_string_pretty(&file).context("Failed to serialize run summary")?;
    fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// Write all core metrics in the Prometheus text format, replacing `path` atomically.
pub fn write_metrics_textfile(path: &Path) -> Result<()> {
    let registry = Registry::new();
    for metric in metrics::all_metrics() {
        registry
            .register(metric)
            .context("Failed to register metric")?;
    }

    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .context("Failed to encode metrics")?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let tmp = path.with_extension("prom.tmp");
    fs::write(&tmp, buffer).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

fn status_line(label: &str, counts: &StatusCounts) -> String {
    format!(
        "{:<15} {:>8} total  {:>8} success  {:>8} failed  {:>8} pending  {:>8} stale  ({:.1}% cached)",
        label,
        counts.total,
        counts.success,
        counts.failed,
        counts.pending,
        counts.stale,
        counts.success_rate()
    )
}

pub fn render_stats(stats: &LedgerStats) -> String {
    let mut out = Vec::new();
    out.push(format!(
        "Ledger statistics ({} backend, collected {})",
        stats.backend,
        stats.collected_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out.push(status_line("Artists", &stats.artists));
    out.push(status_line("Release groups", &stats.release_groups));
    out.push(format!(
        "{:<15} {:>8} attempted {:>7} success  {:>8} stale",
        "Text search", stats.text_search_attempted, stats.text_search_success, stats.text_search_stale
    ));
    if stats.recheck_hours == 0 {
        out.push("Freshness re-checks disabled".to_string());
    } else {
        out.push(format!("Freshness window: {} hours", stats.recheck_hours));
    }
    out.join("\n")
}

pub fn render_plan(plan: &RunPlan) -> String {
    let mut out = Vec::new();
    out.push(format!(
        "Dry run{}: {} new artists, {} new release groups from inventory",
        if plan.discovery { " (discovery mode)" } else { "" },
        plan.sync.artists_new,
        plan.sync.release_groups_new
    ));
    if let Some(manual) = &plan.manual {
        out.push(format!(
            "Manual entries: {} new artists, {} new release groups",
            manual.artists_new, manual.release_groups_new
        ));
    }
    for phase in &plan.phases {
        out.push(format!(
            "{:<15} {:>8} to probe  (new {}, retry {}, forced {}, stale {})",
            phase.phase.as_str(),
            phase.selected,
            phase.selection.new,
            phase.selection.failed_retry,
            phase.selection.forced,
            phase.selection.stale
        ));
    }
    for skipped in &plan.skipped {
        out.push(format!("{:<15} skipped ({:?})", skipped.phase.as_str(), skipped.reason));
    }
    out.join("\n")
}
