// src/process/score.rs

use super::harmonize::HarmonizedRecord;
use crate::schema::Subscale;

/// Subscale means and the overall IRI mean. `None` when nothing was answered.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SubscaleScores {
    pub means: [Option<f64>; 4],
    pub total: Option<f64>,
}

impl SubscaleScores {
    pub fn mean(&self, subscale: Subscale) -> Option<f64> {
        self.means[subscale.ordinal()]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub record: HarmonizedRecord,
    pub scores: SubscaleScores,
}

/// Mean of the present values; `None` if there are none.
pub fn mean_present<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let (sum, n) = values
        .into_iter()
        .flatten()
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

pub fn score_record(record: &HarmonizedRecord) -> SubscaleScores {
    let mut means = [None; 4];
    for sub in Subscale::ALL {
        means[sub.ordinal()] = mean_present(sub.items().map(|it| record.items.get(it)));
    }
    SubscaleScores {
        means,
        total: mean_present(means),
    }
}

#[tracing::instrument(level = "info", skip(records), fields(n = records.len()))]
pub fn score_all(records: &[HarmonizedRecord]) -> Vec<ScoredRecord> {
    records
        .iter()
        .map(|r| ScoredRecord {
            scores: score_record(r),
            record: r.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::harmonize::AttentionChecks;
    use crate::schema::{CanonicalItem, ItemResponses};
    use proptest::prelude::*;

    fn record_with(values: &[(&str, f64)]) -> HarmonizedRecord {
        let mut items = ItemResponses::default();
        for (id, v) in values {
            items.set(id.parse::<CanonicalItem>().unwrap(), Some(*v));
        }
        HarmonizedRecord {
            respondent_id: None,
            year: 2024,
            age: None,
            gender: None,
            ses: None,
            checks: AttentionChecks::default(),
            items,
        }
    }

    #[test]
    fn missing_items_are_skipped_not_zeroed() {
        let r = record_with(&[("FS1", 4.0), ("FS5", 2.0), ("PT3", 5.0)]);
        let s = score_record(&r);
        assert_eq!(s.mean(Subscale::Fantasy), Some(3.0));
        assert_eq!(s.mean(Subscale::PerspectiveTaking), Some(5.0));
        assert_eq!(s.mean(Subscale::EmpathicConcern), None);
        assert_eq!(s.mean(Subscale::PersonalDistress), None);
        assert_eq!(s.total, Some(4.0));
    }

    #[test]
    fn nothing_answered_propagates_missing() {
        let s = score_record(&record_with(&[]));
        assert_eq!(s.means, [None; 4]);
        assert_eq!(s.total, None);
    }

    proptest! {
        #[test]
        fn full_subscale_mean_is_arithmetic_mean(
            mut vals in proptest::collection::vec(1u8..=5, 7),
            rotate in 0usize..7,
        ) {
            let ids: Vec<String> = Subscale::EmpathicConcern.items().map(|i| i.id()).collect();
            let expected = vals.iter().map(|&v| f64::from(v)).sum::<f64>() / 7.0;

            let pairs: Vec<(&str, f64)> = ids.iter().map(|s| s.as_str()).zip(vals.iter().map(|&v| f64::from(v))).collect();
            let a = score_record(&record_with(&pairs)).mean(Subscale::EmpathicConcern).unwrap();

            vals.rotate_left(rotate);
            let pairs: Vec<(&str, f64)> = ids.iter().map(|s| s.as_str()).zip(vals.iter().map(|&v| f64::from(v))).collect();
            let b = score_record(&record_with(&pairs)).mean(Subscale::EmpathicConcern).unwrap();

            prop_assert!((a - expected).abs() < 1e-12);
            prop_assert!((a - b).abs() < 1e-12);
        }
    }
}
