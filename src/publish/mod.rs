// src/publish/mod.rs
pub mod summary;
pub mod table;
pub mod write;

pub use summary::{AuditSummary, CohortCounts};
pub use table::{build_snapshot, snapshot_schema};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::info;

use crate::config::PipelineConfig;
use crate::pipeline::PipelineRun;

pub const HARMONIZED_SNAPSHOT: &str = "harmonized_all";
pub const CLEAN_SNAPSHOT: &str = "clean";
pub const QCA_READY_SNAPSHOT: &str = "qca_ready";
pub const SUMMARY_FILE: &str = "summary.txt";
pub const MANIFEST_FILE: &str = "manifest.json";

/// One named snapshot on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    /// Logical name, e.g. `clean`; the files use the configured stem.
    pub name: String,
    pub rows: usize,
    pub parquet: PathBuf,
    pub csv: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishedArtifacts {
    pub snapshots: Vec<Snapshot>,
    pub summary: PathBuf,
    pub manifest: PathBuf,
}

impl PublishedArtifacts {
    pub fn snapshot(&self, name: &str) -> Option<&Snapshot> {
        self.snapshots.iter().find(|s| s.name == name)
    }
}

#[derive(Serialize)]
struct Manifest<'a> {
    generated_at: String,
    snapshots: &'a [Snapshot],
    summary: &'a Path,
    config: &'a PipelineConfig,
    counts: &'a AuditSummary,
}

fn publish_snapshot(
    run: &PipelineRun,
    dir: &Path,
    name: &str,
    stem: &str,
    rows: &[usize],
) -> Result<Snapshot> {
    let batch = build_snapshot(&run.scored, &run.outcome, rows)
        .with_context(|| format!("building snapshot {}", name))?;
    let parquet = dir.join(format!("{}.parquet", stem));
    let csv = dir.join(format!("{}.csv", stem));
    write::write_parquet(&batch, &parquet)?;
    write::write_csv(&batch, &csv)?;
    info!(snapshot = name, rows = rows.len(), "snapshot published");
    Ok(Snapshot {
        name: name.to_string(),
        rows: rows.len(),
        parquet,
        csv,
    })
}

/// Write the three snapshots, the audit summary and the manifest into
/// `config.output_dir`, replacing whatever a previous run left there.
#[tracing::instrument(level = "info", skip_all, fields(dir = %config.output_dir.display()))]
pub fn publish(run: &PipelineRun, config: &PipelineConfig) -> Result<PublishedArtifacts> {
    let dir = &config.output_dir;
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let names = &config.snapshot_names;
    let all_rows: Vec<usize> = (0..run.scored.len()).collect();

    let snapshots = vec![
        publish_snapshot(run, dir, HARMONIZED_SNAPSHOT, &names.harmonized, &all_rows)?,
        publish_snapshot(run, dir, CLEAN_SNAPSHOT, &names.clean, &run.clean_rows())?,
        publish_snapshot(run, dir, QCA_READY_SNAPSHOT, &names.qca_ready, &run.qca_ready_rows())?,
    ];

    let summary = run.summary();
    let summary_path = dir.join(SUMMARY_FILE);
    write::write_text(&summary_path, &summary.render())?;

    let manifest_path = dir.join(MANIFEST_FILE);
    let manifest = Manifest {
        generated_at: Utc::now().to_rfc3339(),
        snapshots: &snapshots,
        summary: &summary_path,
        config,
        counts: &summary,
    };
    let json = serde_json::to_string_pretty(&manifest).context("serializing manifest")?;
    write::write_text(&manifest_path, &json)?;

    Ok(PublishedArtifacts {
        snapshots,
        summary: summary_path,
        manifest: manifest_path,
    })
}
