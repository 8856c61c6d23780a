// src/outlier.rs
//! Multivariate outlier detection by squared Mahalanobis distance.

use anyhow::{anyhow, Result};
use nalgebra::{DMatrix, DVector};
use statrs::distribution::{ChiSquared, ContinuousCDF};
use tracing::{debug, info, warn};

use crate::process::ScoredRecord;
use crate::quality::QualityFlag;
use crate::schema::CanonicalItem;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierFlag {
    /// Squared Mahalanobis distance, D².
    pub distance_sq: f64,
    pub is_outlier: bool,
}

/// Upper `p_value` tail cut-off of χ² with `df` degrees of freedom.
pub fn chi_squared_threshold(p_value: f64, df: usize) -> Result<f64> {
    if df == 0 {
        return Err(anyhow!("chi-squared threshold needs at least one degree of freedom"));
    }
    if !(p_value > 0.0 && p_value < 1.0) {
        return Err(anyhow!("p-value {} outside (0, 1)", p_value));
    }
    match ChiSquared::new(df as f64) {
        Ok(dist) => Ok(dist.inverse_cdf(1.0 - p_value)),
        Err(e) => Err(anyhow!("chi-squared with df={}: {}", df, e)),
    }
}

/// Mean vector and pseudo-inverted covariance of a reference population.
#[derive(Debug, Clone)]
pub struct ReferenceModel {
    mean: DVector<f64>,
    precision: DMatrix<f64>,
    cases: usize,
}

impl ReferenceModel {
    /// Fit over complete rows, each of length `dims`.
    ///
    /// With fewer than two rows the covariance is taken as zero, which makes
    /// every distance zero.
    pub fn fit(rows: &[Vec<f64>], dims: usize) -> Result<Self> {
        let n = rows.len();
        if let Some(bad) = rows.iter().find(|r| r.len() != dims) {
            return Err(anyhow!(
                "reference row has {} values, expected {}",
                bad.len(),
                dims
            ));
        }
        if n == 0 {
            return Ok(Self {
                mean: DVector::zeros(dims),
                precision: DMatrix::zeros(dims, dims),
                cases: 0,
            });
        }

        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        let data = DMatrix::from_row_slice(n, dims, &flat);
        let mean = DVector::from_iterator(dims, (0..dims).map(|j| data.column(j).mean()));

        if n < 2 {
            warn!(cases = n, "reference population too small; distances collapse to zero");
            return Ok(Self {
                mean,
                precision: DMatrix::zeros(dims, dims),
                cases: n,
            });
        }

        let mut centered = data;
        for j in 0..dims {
            let m = mean[j];
            centered.column_mut(j).iter_mut().for_each(|v| *v -= m);
        }
        let covariance = centered.tr_mul(&centered) / (n - 1) as f64;

        if n <= dims {
            warn!(
                cases = n,
                dims, "fewer complete cases than items; covariance is singular"
            );
        }
        let precision = pseudo_inverse(covariance)?;
        Ok(Self {
            mean,
            precision,
            cases: n,
        })
    }

    /// D² = (x − μ)ᵀ Σ⁺ (x − μ).
    pub fn distance_sq(&self, x: &[f64]) -> f64 {
        let diff = DVector::from_column_slice(x) - &self.mean;
        diff.dot(&(&self.precision * &diff)).max(0.0)
    }

    pub fn cases(&self) -> usize {
        self.cases
    }

    pub fn mean(&self) -> &DVector<f64> {
        &self.mean
    }
}

/// Moore–Penrose pseudo-inverse through SVD. Singular values below
/// `max(σ) · dim · ε` count as zero.
pub(crate) fn pseudo_inverse(m: DMatrix<f64>) -> Result<DMatrix<f64>> {
    let dim = m.nrows().max(m.ncols());
    let svd = m.svd(true, true);
    let tol = svd.singular_values.max() * dim as f64 * f64::EPSILON;
    debug!(tol, "pseudo-inverse tolerance");
    svd.pseudo_inverse(tol).map_err(|e| anyhow!(e))
}

/// Outcome of one detection pass.
#[derive(Debug, Clone)]
pub struct OutlierReport {
    /// Per record, in input order. `None` for records that failed the
    /// quality gate or miss an active item.
    pub flags: Vec<Option<OutlierFlag>>,
    pub p_value: f64,
    pub threshold: f64,
    pub degrees_of_freedom: usize,
    pub reference_cases: usize,
    /// Quality-passed records left out of fitting because of missing items.
    pub incomplete: usize,
    pub flagged: usize,
}

/// Fit the reference distribution over quality-passed complete cases and
/// flag every such case whose D² exceeds the χ² cut-off.
#[tracing::instrument(level = "info", skip(records, quality, items), fields(n = records.len(), items = items.len()))]
pub fn detect(
    records: &[ScoredRecord],
    quality: &[QualityFlag],
    items: &[CanonicalItem],
    p_value: f64,
) -> Result<OutlierReport> {
    if records.len() != quality.len() {
        return Err(anyhow!(
            "{} records but {} quality flags",
            records.len(),
            quality.len()
        ));
    }
    let threshold = chi_squared_threshold(p_value, items.len())?;

    // complete item vectors of the quality-passed population, by record position
    let vectors: Vec<Option<Vec<f64>>> = records
        .iter()
        .zip(quality)
        .map(|(r, q)| {
            if q.included {
                r.record.items.complete_on(items)
            } else {
                None
            }
        })
        .collect();
    let reference: Vec<Vec<f64>> = vectors.iter().flatten().cloned().collect();
    let incomplete = quality
        .iter()
        .zip(&vectors)
        .filter(|(q, v)| q.included && v.is_none())
        .count();

    let model = ReferenceModel::fit(&reference, items.len())?;

    let flags: Vec<Option<OutlierFlag>> = vectors
        .iter()
        .map(|v| {
            v.as_ref().map(|x| {
                let distance_sq = model.distance_sq(x);
                OutlierFlag {
                    distance_sq,
                    is_outlier: distance_sq > threshold,
                }
            })
        })
        .collect();
    let flagged = flags.iter().flatten().filter(|f| f.is_outlier).count();

    info!(
        reference = model.cases(),
        incomplete,
        flagged,
        threshold,
        "outlier detection done"
    );
    Ok(OutlierReport {
        flags,
        p_value,
        threshold,
        degrees_of_freedom: items.len(),
        reference_cases: model.cases(),
        incomplete,
        flagged,
    })
}
