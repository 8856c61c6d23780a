// src/pipeline.rs
//! Stage ordering: load → harmonize → score → quality gate → outliers → publish.

use anyhow::{Context, Result};
use std::time::Instant;
use tracing::info;

use crate::config::{PipelineConfig, Strictness};
use crate::outlier::{detect, OutlierFlag, OutlierReport};
use crate::process::{harmonize_table, load_table, score_all, HarmonizeReport, RawTable, ScoredRecord};
use crate::publish::{publish, AuditSummary, PublishedArtifacts};
use crate::quality::{assess_all, QualityFlag};
use crate::reliability::{factorability, subscale_reliability, Factorability, SubscaleReliability};
use crate::schema::{CohortSpec, Subscale};
use crate::sensitivity::{compare_strictness, SensitivityRow};

/// Quality gate + outlier detection for one strictness, aligned with the
/// scored records it was computed from.
#[derive(Debug, Clone)]
pub struct CleaningOutcome {
    pub strictness: Strictness,
    pub quality: Vec<QualityFlag>,
    pub outliers: OutlierReport,
}

impl CleaningOutcome {
    pub fn post_qc(&self) -> usize {
        self.quality.iter().filter(|q| q.included).count()
    }

    pub fn outlier_flag(&self, idx: usize) -> Option<OutlierFlag> {
        self.outliers.flags.get(idx).copied().flatten()
    }

    /// Quality-passed and not flagged as an outlier.
    pub fn is_clean(&self, idx: usize) -> bool {
        self.quality[idx].included && !self.outlier_flag(idx).map_or(false, |f| f.is_outlier)
    }

    pub fn clean_count(&self) -> usize {
        (0..self.quality.len()).filter(|&i| self.is_clean(i)).count()
    }

    /// The clean subset of `scored`, in input order.
    pub fn clean_records<'a>(
        &'a self,
        scored: &'a [ScoredRecord],
    ) -> impl Iterator<Item = &'a ScoredRecord> + 'a {
        scored
            .iter()
            .enumerate()
            .filter(move |(i, _)| self.is_clean(*i))
            .map(|(_, r)| r)
    }
}

/// Complete on the variables configurational analysis and clustering use:
/// `age`, `ses`, the four subscale means and the total.
pub fn is_qca_ready(rec: &ScoredRecord) -> bool {
    rec.record.age.is_some()
        && rec.record.ses.is_some()
        && Subscale::ALL.iter().all(|&s| rec.scores.mean(s).is_some())
        && rec.scores.total.is_some()
}

/// Run the quality gate, then fit outliers over the records it let through.
pub fn clean_scored(
    scored: &[ScoredRecord],
    strictness: Strictness,
    config: &PipelineConfig,
) -> Result<CleaningOutcome> {
    let quality = assess_all(scored, strictness);
    let outliers = detect(
        scored,
        &quality,
        &config.active_items(),
        config.outlier_p_value,
    )?;
    Ok(CleaningOutcome {
        strictness,
        quality,
        outliers,
    })
}

/// Everything one run computed.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub cohorts: Vec<HarmonizeReport>,
    pub scored: Vec<ScoredRecord>,
    pub outcome: CleaningOutcome,
    pub reliability: Vec<SubscaleReliability>,
    /// KMO and Bartlett over the clean set.
    pub factorability: Factorability,
    pub sensitivity: Vec<SensitivityRow>,
}

impl PipelineRun {
    pub fn summary(&self) -> AuditSummary {
        AuditSummary::from_run(self)
    }

    /// Positions of the clean records, in input order.
    pub fn clean_rows(&self) -> Vec<usize> {
        (0..self.scored.len())
            .filter(|&i| self.outcome.is_clean(i))
            .collect()
    }

    /// Clean records that are also complete for QCA.
    pub fn qca_ready_rows(&self) -> Vec<usize> {
        self.clean_rows()
            .into_iter()
            .filter(|&i| is_qca_ready(&self.scored[i]))
            .collect()
    }
}

/// Read every selected cohort. Fails on the first unreadable table, before
/// anything downstream has run.
pub fn load_cohorts(config: &PipelineConfig) -> Result<Vec<(CohortSpec, RawTable)>> {
    config
        .selected_cohorts()
        .into_iter()
        .map(|spec| {
            let path = config.cohort_path(spec);
            let table = load_table(&path, spec.sheet.as_deref())
                .with_context(|| format!("loading cohort {} from {}", spec.year, path.display()))?;
            Ok((spec.clone(), table))
        })
        .collect()
}

/// The in-memory core: no file I/O.
#[tracing::instrument(level = "info", skip_all, fields(cohorts = tables.len()))]
pub fn run_core(config: &PipelineConfig, tables: &[(CohortSpec, RawTable)]) -> Result<PipelineRun> {
    config.validate()?;

    let mut harmonized = Vec::new();
    let mut cohorts = Vec::with_capacity(tables.len());
    for (spec, table) in tables {
        let (records, report) = harmonize_table(table, spec);
        harmonized.extend(records);
        cohorts.push(report);
    }

    let scored = score_all(&harmonized);
    let outcome = clean_scored(&scored, config.strictness, config)?;

    let clean: Vec<&ScoredRecord> = outcome.clean_records(&scored).collect();
    let active = config.active_items();
    let reliability = subscale_reliability(&clean, &active);
    let factorability = factorability(&clean, &active);
    let sensitivity = compare_strictness(&scored, config)?;

    Ok(PipelineRun {
        cohorts,
        scored,
        outcome,
        reliability,
        factorability,
        sensitivity,
    })
}

/// Full batch: validate, load, compute, publish.
pub fn run(config: &PipelineConfig) -> Result<(PipelineRun, PublishedArtifacts)> {
    let start = Instant::now();
    config.validate()?;
    let tables = load_cohorts(config)?;
    let run = run_core(config, &tables)?;
    let artifacts = publish(&run, config).context("publishing datasets")?;
    let summary = run.summary();
    info!(
        raw = summary.raw,
        post_qc = summary.post_qc,
        clean = summary.post_outlier,
        elapsed = ?start.elapsed(),
        "pipeline complete"
    );
    Ok((run, artifacts))
}
