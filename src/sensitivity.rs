// src/sensitivity.rs
//! Case-selection sensitivity: how each attention-check strictness changes
//! sample size, outlier count and reliability.

use anyhow::Result;
use serde::Serialize;
use tracing::debug;

use crate::config::{PipelineConfig, Strictness};
use crate::pipeline::clean_scored;
use crate::process::{score::mean_present, ScoredRecord};
use crate::reliability::{factorability, subscale_reliability, Factorability, SubscaleReliability};

#[derive(Debug, Clone, Serialize)]
pub struct SensitivityRow {
    pub strictness: Strictness,
    pub post_qc: usize,
    pub outliers: usize,
    pub clean: usize,
    pub reliability: Vec<SubscaleReliability>,
    pub factorability: Factorability,
}

impl SensitivityRow {
    /// Mean alpha over the subscales where it is defined.
    pub fn mean_alpha(&self) -> Option<f64> {
        mean_present(self.reliability.iter().map(|r| r.alpha))
    }
}

/// Re-run the quality gate and outlier detection under every strictness.
/// The outlier reference is re-fitted for each level.
#[tracing::instrument(level = "info", skip(scored, config), fields(n = scored.len()))]
pub fn compare_strictness(
    scored: &[ScoredRecord],
    config: &PipelineConfig,
) -> Result<Vec<SensitivityRow>> {
    let active = config.active_items();
    let mut rows = Vec::with_capacity(Strictness::ALL.len());
    for strictness in Strictness::ALL {
        let outcome = clean_scored(scored, strictness, config)?;
        let clean: Vec<&ScoredRecord> = outcome.clean_records(scored).collect();
        let row = SensitivityRow {
            strictness,
            post_qc: outcome.post_qc(),
            outliers: outcome.outliers.flagged,
            clean: clean.len(),
            reliability: subscale_reliability(&clean, &active),
            factorability: factorability(&clean, &active),
        };
        debug!(strictness = strictness.as_str(), clean = row.clean, "sensitivity row");
        rows.push(row);
    }
    Ok(rows)
}
