// src/reliability.rs
//! Cronbach's alpha per subscale, plus KMO and Bartlett's sphericity over
//! the whole active item set.

use nalgebra::DMatrix;
use serde::Serialize;
use statrs::distribution::{ChiSquared, ContinuousCDF};
use tracing::debug;

use crate::outlier::pseudo_inverse;
use crate::process::ScoredRecord;
use crate::schema::{CanonicalItem, Subscale};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SubscaleReliability {
    pub subscale: Subscale,
    pub items: usize,
    pub cases: usize,
    pub alpha: Option<f64>,
}

/// Sample variance (n − 1 divisor).
fn sample_variance(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    Some(values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64)
}

/// α = k/(k−1) · (1 − Σ var(item) / var(total)) over complete rows.
pub fn cronbach_alpha(rows: &[Vec<f64>]) -> Option<f64> {
    let k = rows.first()?.len();
    if k < 2 || rows.len() < 2 {
        return None;
    }
    let item_var_sum: f64 = (0..k)
        .map(|j| {
            let col: Vec<f64> = rows.iter().map(|r| r[j]).collect();
            sample_variance(&col).unwrap_or(0.0)
        })
        .sum();
    let totals: Vec<f64> = rows.iter().map(|r| r.iter().sum()).collect();
    let total_var = sample_variance(&totals)?;
    if total_var <= 0.0 {
        return None;
    }
    let k = k as f64;
    Some(k / (k - 1.0) * (1.0 - item_var_sum / total_var))
}

/// Alpha for every subscale, using only the subscale's `active` items and the
/// records complete on them.
pub fn subscale_reliability(
    records: &[&ScoredRecord],
    active: &[CanonicalItem],
) -> Vec<SubscaleReliability> {
    Subscale::ALL
        .iter()
        .map(|&subscale| {
            let items: Vec<CanonicalItem> = subscale.items().filter(|i| active.contains(i)).collect();
            let rows: Vec<Vec<f64>> = records
                .iter()
                .filter_map(|r| r.record.items.complete_on(&items))
                .collect();
            SubscaleReliability {
                subscale,
                items: items.len(),
                cases: rows.len(),
                alpha: cronbach_alpha(&rows),
            }
        })
        .collect()
}

/// Bartlett's test that the item correlation matrix is not the identity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sphericity {
    pub chi_square: f64,
    pub df: usize,
    pub p_value: f64,
}

/// Whether the active items are fit for factoring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Factorability {
    pub items: usize,
    pub cases: usize,
    /// Overall Kaiser-Meyer-Olkin measure of sampling adequacy.
    pub kmo: Option<f64>,
    pub bartlett: Option<Sphericity>,
}

/// Pearson correlation matrix of complete rows. `None` with fewer than two
/// rows or when an item has no variance.
pub fn correlation_matrix(rows: &[Vec<f64>]) -> Option<DMatrix<f64>> {
    let n = rows.len();
    let p = rows.first()?.len();
    if n < 2 || p == 0 {
        return None;
    }
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    let mut data = DMatrix::from_row_slice(n, p, &flat);
    for j in 0..p {
        let m = data.column(j).mean();
        data.column_mut(j).iter_mut().for_each(|v| *v -= m);
    }
    let cov = data.tr_mul(&data) / (n - 1) as f64;
    let sd: Vec<f64> = (0..p).map(|j| cov[(j, j)].sqrt()).collect();
    if sd.iter().any(|s| !(*s > 0.0)) {
        return None;
    }
    Some(DMatrix::from_fn(p, p, |i, j| {
        if i == j {
            1.0
        } else {
            cov[(i, j)] / (sd[i] * sd[j])
        }
    }))
}

/// KMO = Σ r²ᵢⱼ / (Σ r²ᵢⱼ + Σ a²ᵢⱼ) over i ≠ j, with a the anti-image
/// (partial) correlations taken from the inverse of `corr`.
pub fn kmo(corr: &DMatrix<f64>) -> Option<f64> {
    let p = corr.nrows();
    if p < 2 {
        return None;
    }
    let inv = pseudo_inverse(corr.clone()).ok()?;
    let (mut r2, mut a2) = (0.0, 0.0);
    for i in 0..p {
        for j in 0..p {
            if i == j {
                continue;
            }
            let scale = inv[(i, i)] * inv[(j, j)];
            if !(scale > 0.0) {
                return None;
            }
            r2 += corr[(i, j)].powi(2);
            a2 += (inv[(i, j)] / scale.sqrt()).powi(2);
        }
    }
    (r2 + a2 > 0.0).then(|| r2 / (r2 + a2))
}

/// χ² = −(n − 1 − (2p + 5)/6) · ln|R| on p(p − 1)/2 degrees of freedom.
/// `None` when R is singular or `cases` is too small for the correction.
pub fn bartlett_sphericity(corr: &DMatrix<f64>, cases: usize) -> Option<Sphericity> {
    let p = corr.nrows();
    if p < 2 {
        return None;
    }
    let det = corr.determinant();
    // numerically singular
    if !(det > f64::EPSILON) {
        return None;
    }
    let factor = cases as f64 - 1.0 - (2.0 * p as f64 + 5.0) / 6.0;
    if factor <= 0.0 {
        return None;
    }
    let chi_square = (-det.ln() * factor).max(0.0);
    let df = p * (p - 1) / 2;
    let dist = ChiSquared::new(df as f64).ok()?;
    Some(Sphericity {
        chi_square,
        df,
        p_value: 1.0 - dist.cdf(chi_square),
    })
}

/// KMO and Bartlett over the records complete on every `active` item.
pub fn factorability(records: &[&ScoredRecord], active: &[CanonicalItem]) -> Factorability {
    let rows: Vec<Vec<f64>> = records
        .iter()
        .filter_map(|r| r.record.items.complete_on(active))
        .collect();
    let corr = correlation_matrix(&rows);
    let out = Factorability {
        items: active.len(),
        cases: rows.len(),
        kmo: corr.as_ref().and_then(kmo),
        bartlett: corr.as_ref().and_then(|c| bartlett_sphericity(c, rows.len())),
    };
    debug!(cases = out.cases, kmo = ?out.kmo, "factorability");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfectly_parallel_items_have_alpha_one() {
        let rows: Vec<Vec<f64>> = (1..=5).map(|v| vec![v as f64; 3]).collect();
        let a = cronbach_alpha(&rows).unwrap();
        assert!((a - 1.0).abs() < 1e-12);
    }

    #[test]
    fn known_small_example() {
        // item vars 1, 1, 1/3; totals 5, 7, 10 have variance 19/3
        let rows = vec![
            vec![1.0, 2.0, 2.0],
            vec![2.0, 3.0, 2.0],
            vec![3.0, 4.0, 3.0],
        ];
        let expected = 1.5 * (1.0 - (1.0 + 1.0 + 1.0 / 3.0) / (19.0 / 3.0));
        assert!((cronbach_alpha(&rows).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn degenerate_inputs_are_undefined() {
        assert_eq!(cronbach_alpha(&[]), None);
        assert_eq!(cronbach_alpha(&[vec![1.0, 2.0]]), None);
        assert_eq!(cronbach_alpha(&[vec![1.0], vec![2.0]]), None);
        assert_eq!(cronbach_alpha(&[vec![3.0, 3.0], vec![3.0, 3.0]]), None);
    }

    fn three_items() -> Vec<Vec<f64>> {
        [[1, 2, 1], [2, 2, 3], [3, 4, 2], [4, 3, 5], [5, 5, 4], [2, 1, 2]]
            .iter()
            .map(|r| r.iter().map(|&v| f64::from(v)).collect())
            .collect()
    }

    #[test]
    fn kmo_and_bartlett_on_known_data() {
        let corr = correlation_matrix(&three_items()).unwrap();
        assert!((corr[(0, 1)] - 0.815_384_615_384_615_5).abs() < 1e-12);
        assert!((corr[(1, 2)] - 0.446_153_846_153_846_1).abs() < 1e-12);

        let k = kmo(&corr).unwrap();
        assert!((k - 0.440_051_445_304_976).abs() < 1e-9, "kmo {}", k);

        let b = bartlett_sphericity(&corr, 6).unwrap();
        assert_eq!(b.df, 3);
        assert!((b.chi_square - 8.680_353_156_671_89).abs() < 1e-9, "chi2 {}", b.chi_square);
        assert!((b.p_value - 0.033_856_957_567_218_5).abs() < 1e-6, "p {}", b.p_value);
    }

    #[test]
    fn factorability_is_undefined_on_degenerate_data() {
        // a constant item has no correlation
        let constant: Vec<Vec<f64>> = (1..=5).map(|v| vec![f64::from(v), 3.0]).collect();
        assert!(correlation_matrix(&constant).is_none());

        // collinear items: singular R, no Bartlett statistic
        let collinear: Vec<Vec<f64>> = (1..=5)
            .map(|v| {
                let v = f64::from(v);
                vec![v, 2.0 * v, (v * 7.0) % 5.0]
            })
            .collect();
        let corr = correlation_matrix(&collinear).unwrap();
        assert!(bartlett_sphericity(&corr, 5).is_none());

        // too few cases for the small-sample correction
        let corr = correlation_matrix(&three_items()).unwrap();
        assert!(bartlett_sphericity(&corr, 2).is_none());
    }
}
