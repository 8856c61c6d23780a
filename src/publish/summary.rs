// src/publish/summary.rs
use serde::Serialize;
use std::{collections::BTreeMap, fmt::Write};

use crate::config::Strictness;
use crate::pipeline::PipelineRun;
use crate::reliability::{Factorability, SubscaleReliability};
use crate::sensitivity::SensitivityRow;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CohortCounts {
    pub raw: usize,
    pub post_qc: usize,
    pub clean: usize,
}

/// Audit counts for one run. Contains nothing time- or host-dependent, so
/// the same input always renders the same text.
#[derive(Debug, Clone, Serialize)]
pub struct AuditSummary {
    pub strictness: Strictness,
    pub outlier_p_value: f64,
    pub active_items: usize,
    pub threshold: f64,
    pub raw: usize,
    pub post_qc: usize,
    pub post_outlier: usize,
    pub dropped: usize,
    pub dropped_qc: usize,
    pub dropped_outliers: usize,
    /// Quality-passed records with missing items; kept but not distance-scored.
    pub incomplete: usize,
    /// Clean records complete on age, ses and every score.
    pub qca_ready: usize,
    pub per_cohort: BTreeMap<i32, CohortCounts>,
    pub reliability: Vec<SubscaleReliability>,
    pub factorability: Factorability,
    pub sensitivity: Vec<SensitivityRow>,
}

impl AuditSummary {
    pub fn from_run(run: &PipelineRun) -> Self {
        let outcome = &run.outcome;
        let mut per_cohort: BTreeMap<i32, CohortCounts> = BTreeMap::new();
        for (i, rec) in run.scored.iter().enumerate() {
            let c = per_cohort.entry(rec.record.year).or_default();
            c.raw += 1;
            if outcome.quality[i].included {
                c.post_qc += 1;
            }
            if outcome.is_clean(i) {
                c.clean += 1;
            }
        }

        let raw = run.scored.len();
        let post_qc = outcome.post_qc();
        let post_outlier = outcome.clean_count();
        AuditSummary {
            strictness: outcome.strictness,
            outlier_p_value: outcome.outliers.p_value,
            active_items: outcome.outliers.degrees_of_freedom,
            threshold: outcome.outliers.threshold,
            raw,
            post_qc,
            post_outlier,
            dropped: raw - post_outlier,
            dropped_qc: raw - post_qc,
            dropped_outliers: post_qc - post_outlier,
            incomplete: outcome.outliers.incomplete,
            qca_ready: run.qca_ready_rows().len(),
            per_cohort,
            reliability: run.reliability.clone(),
            factorability: run.factorability,
            sensitivity: run.sensitivity.clone(),
        }
    }

    /// Plain-text audit report.
    pub fn render(&self) -> String {
        let mut out = String::new();
        // writing into a String cannot fail
        let _ = self.render_into(&mut out);
        out
    }

    fn render_into(&self, out: &mut String) -> std::fmt::Result {
        writeln!(out, "IRI harmonization audit")?;
        writeln!(out, "=======================")?;
        writeln!(out, "strictness:            {}", self.strictness.as_str())?;
        writeln!(out, "outlier p-value:       {}", self.outlier_p_value)?;
        writeln!(out, "active items (df):     {}", self.active_items)?;
        writeln!(out, "chi-squared cut-off:   {:.4}", self.threshold)?;
        writeln!(out)?;
        writeln!(out, "raw count:             {}", self.raw)?;
        writeln!(out, "post-QC count:         {}", self.post_qc)?;
        writeln!(out, "post-outlier count:    {}", self.post_outlier)?;
        writeln!(out, "dropped count:         {}", self.dropped)?;
        writeln!(out, "  by attention checks: {}", self.dropped_qc)?;
        writeln!(out, "  as outliers:         {}", self.dropped_outliers)?;
        writeln!(out, "incomplete (kept):     {}", self.incomplete)?;
        writeln!(out, "QCA-ready count:       {}", self.qca_ready)?;
        writeln!(out)?;

        writeln!(out, "{:<8} {:>8} {:>8} {:>8}", "cohort", "raw", "post-QC", "clean")?;
        for (year, c) in &self.per_cohort {
            writeln!(out, "{:<8} {:>8} {:>8} {:>8}", year, c.raw, c.post_qc, c.clean)?;
        }
        writeln!(out)?;

        writeln!(out, "reliability (Cronbach's alpha, clean set)")?;
        for r in &self.reliability {
            writeln!(
                out,
                "  {}: alpha={} items={} cases={}",
                r.subscale,
                fmt_alpha(r.alpha),
                r.items,
                r.cases
            )?;
        }
        writeln!(
            out,
            "factorability ({} items, {} cases): {}",
            self.factorability.items,
            self.factorability.cases,
            fmt_factorability(&self.factorability)
        )?;
        writeln!(out)?;

        writeln!(out, "case selection sensitivity")?;
        for row in &self.sensitivity {
            let alphas: Vec<String> = row
                .reliability
                .iter()
                .map(|r| format!("{}:{}", r.subscale, fmt_alpha(r.alpha)))
                .collect();
            writeln!(
                out,
                "  {:<8} N post-QC={} outliers={} clean={} mean alpha={} ({}) {}",
                row.strictness.as_str(),
                row.post_qc,
                row.outliers,
                row.clean,
                fmt_alpha(row.mean_alpha()),
                alphas.join(", "),
                fmt_factorability(&row.factorability)
            )?;
        }
        Ok(())
    }
}

fn fmt_alpha(alpha: Option<f64>) -> String {
    alpha.map_or_else(|| "n/a".to_string(), |a| format!("{:.3}", a))
}

fn fmt_factorability(f: &Factorability) -> String {
    let kmo = fmt_alpha(f.kmo);
    match f.bartlett {
        Some(b) => format!(
            "KMO={} Bartlett chi2={:.2} df={} p={:.4}",
            kmo, b.chi_square, b.df, b.p_value
        ),
        None => format!("KMO={} Bartlett=n/a", kmo),
    }
}
