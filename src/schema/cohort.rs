// src/schema/cohort.rs
//! Declarative per-cohort transform rules.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    path::PathBuf,
};

use super::types::CanonicalItem;

/// Native response scale of a cohort's item columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseScale {
    /// 0–4; shifted by +1 onto the common scale.
    #[serde(rename = "0-4")]
    ZeroToFour,
    /// 1–5; already on the common scale.
    #[serde(rename = "1-5")]
    OneToFive,
}

impl ResponseScale {
    pub fn offset(&self) -> f64 {
        match self {
            ResponseScale::ZeroToFour => 1.0,
            ResponseScale::OneToFive => 0.0,
        }
    }

    pub fn native_range(&self) -> (f64, f64) {
        match self {
            ResponseScale::ZeroToFour => (0.0, 4.0),
            ResponseScale::OneToFive => (1.0, 5.0),
        }
    }
}

/// Lower bound of the common scale.
pub const COMMON_MIN: f64 = 1.0;
/// Upper bound of the common scale.
pub const COMMON_MAX: f64 = 5.0;

/// Flip a response on the common 1–5 scale.
pub fn reverse_code(value: f64) -> f64 {
    (COMMON_MAX + 1.0) - value
}

/// Non-item columns every harmonized record carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaField {
    RespondentId,
    Age,
    Gender,
    Ses,
    #[serde(rename = "AC1_commitment")]
    Commitment,
    #[serde(rename = "AC2_check_expected5")]
    CheckExpectsFive,
    #[serde(rename = "AC3_check_expected1")]
    CheckExpectsOne,
}

impl MetaField {
    pub const ALL: [MetaField; 7] = [
        MetaField::RespondentId,
        MetaField::Age,
        MetaField::Gender,
        MetaField::Ses,
        MetaField::Commitment,
        MetaField::CheckExpectsFive,
        MetaField::CheckExpectsOne,
    ];

    /// Column name used in published tables.
    pub fn column(&self) -> &'static str {
        match self {
            MetaField::RespondentId => "respondent_id",
            MetaField::Age => "age",
            MetaField::Gender => "gender",
            MetaField::Ses => "ses",
            MetaField::Commitment => "AC1_commitment",
            MetaField::CheckExpectsFive => "AC2_check_expected5",
            MetaField::CheckExpectsOne => "AC3_check_expected1",
        }
    }
}

impl fmt::Display for MetaField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// A harmonized target column: either an IRI item or a meta field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetField {
    Item(CanonicalItem),
    Meta(MetaField),
}

impl fmt::Display for TargetField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetField::Item(item) => item.fmt(f),
            TargetField::Meta(meta) => meta.fmt(f),
        }
    }
}

/// Raw header spellings seen across cohorts for the meta columns.
pub static META_ALIASES: Lazy<HashMap<&'static str, MetaField>> = Lazy::new(|| {
    HashMap::from([
        ("ID", MetaField::RespondentId),
        ("iri_id", MetaField::RespondentId),
        ("respondent_id", MetaField::RespondentId),
        ("age", MetaField::Age),
        ("gender", MetaField::Gender),
        ("ses", MetaField::Ses),
        ("economic_level", MetaField::Ses),
        ("socioeconomic_level", MetaField::Ses),
        ("AC1", MetaField::Commitment),
        ("iri_commitment", MetaField::Commitment),
        ("AC1_commitment", MetaField::Commitment),
        ("AC2", MetaField::CheckExpectsFive),
        ("iri_ac1_rta5", MetaField::CheckExpectsFive),
        ("AC2_check_expected5", MetaField::CheckExpectsFive),
        ("AC3", MetaField::CheckExpectsOne),
        ("iri_ac2_rta1", MetaField::CheckExpectsOne),
        ("AC3_check_expected1", MetaField::CheckExpectsOne),
    ])
});

/// How one cohort's raw table maps onto the canonical schema.
///
/// Adding a cohort or fixing a reverse-coding mistake is a change to this
/// record, never to the harmonization code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortSpec {
    /// Cohort year; written into every record's `year` column.
    pub year: i32,
    /// Raw table, relative paths resolve against the configured raw directory.
    pub path: PathBuf,
    /// Worksheet to read for workbook inputs; first sheet when unset.
    #[serde(default)]
    pub sheet: Option<String>,
    pub scale: ResponseScale,
    /// Prefix in front of canonical item ids, e.g. `E` (`EFS1`) or `iri_` (`iri_FS1`).
    #[serde(default)]
    pub item_prefix: String,
    /// Explicit raw column → canonical field entries. Checked before the
    /// prefix rule and the built-in meta aliases.
    #[serde(default)]
    pub rename: BTreeMap<String, TargetField>,
    /// Items stored in the opposite direction in this cohort.
    #[serde(default)]
    pub reverse_items: Vec<CanonicalItem>,
}

impl CohortSpec {
    pub fn needs_reversal(&self, item: CanonicalItem) -> bool {
        self.reverse_items.contains(&item)
    }

    /// Candidate raw header names for `field`, in priority order.
    pub fn candidate_headers(&self, field: TargetField) -> Vec<String> {
        let mut out: Vec<String> = self
            .rename
            .iter()
            .filter(|(_, target)| **target == field)
            .map(|(raw, _)| raw.clone())
            .collect();
        match field {
            TargetField::Item(item) => out.push(format!("{}{}", self.item_prefix, item)),
            TargetField::Meta(meta) => {
                let mut aliases: Vec<&str> = META_ALIASES
                    .iter()
                    .filter(|(_, m)| **m == meta)
                    .map(|(alias, _)| *alias)
                    .collect();
                aliases.sort_unstable();
                out.extend(aliases.into_iter().map(str::to_string));
            }
        }
        out
    }
}

/// The three cohorts of the MAP-8 IRI study.
///
/// 2023 is on a 0–4 scale with items already reversed upstream; 2024 uses an
/// `E` prefix; 2025 uses an `iri_` prefix and stores FS7 and PD13 unreversed.
pub fn default_cohorts() -> Vec<CohortSpec> {
    let reversed_2025 = ["FS7", "PD13"]
        .iter()
        .filter_map(|id| id.parse().ok())
        .collect();
    vec![
        CohortSpec {
            year: 2023,
            path: PathBuf::from("1_2023_data_IRI.xlsx"),
            sheet: None,
            scale: ResponseScale::ZeroToFour,
            item_prefix: String::new(),
            rename: BTreeMap::new(),
            reverse_items: Vec::new(),
        },
        CohortSpec {
            year: 2024,
            path: PathBuf::from("2_2024_data_IRI.xlsx"),
            sheet: None,
            scale: ResponseScale::OneToFive,
            item_prefix: "E".into(),
            rename: BTreeMap::new(),
            reverse_items: Vec::new(),
        },
        CohortSpec {
            year: 2025,
            path: PathBuf::from("3_2025_data_IRI.xlsx"),
            sheet: None,
            scale: ResponseScale::OneToFive,
            item_prefix: "iri_".into(),
            rename: BTreeMap::new(),
            reverse_items: reversed_2025,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn reverse_coding_is_involutive(v in 1u8..=5) {
            let v = f64::from(v);
            prop_assert_eq!(reverse_code(reverse_code(v)), v);
            prop_assert!((COMMON_MIN..=COMMON_MAX).contains(&reverse_code(v)));
        }
    }

    #[test]
    fn default_2025_cohort_reverses_fs7_and_pd13() {
        let cohorts = default_cohorts();
        let c25 = cohorts.iter().find(|c| c.year == 2025).unwrap();
        let ids: Vec<String> = c25.reverse_items.iter().map(|i| i.id()).collect();
        assert_eq!(ids, vec!["FS7", "PD13"]);
        assert!(cohorts
            .iter()
            .filter(|c| c.year != 2025)
            .all(|c| c.reverse_items.is_empty()));
    }

    #[test]
    fn rename_entries_win_over_prefix_and_aliases() {
        let mut spec = default_cohorts().remove(1);
        let fs1: CanonicalItem = "FS1".parse().unwrap();
        spec.rename.insert("fantasy_01".into(), TargetField::Item(fs1));
        spec.rename
            .insert("folio".into(), TargetField::Meta(MetaField::RespondentId));

        assert_eq!(
            spec.candidate_headers(TargetField::Item(fs1)),
            vec!["fantasy_01".to_string(), "EFS1".to_string()]
        );
        let ids = spec.candidate_headers(TargetField::Meta(MetaField::RespondentId));
        assert_eq!(ids[0], "folio");
        assert!(ids.contains(&"iri_id".to_string()));
    }

    #[test]
    fn cohort_spec_reads_from_yaml() {
        let yaml = r#"
year: 2026
path: wave4.csv
scale: "0-4"
item_prefix: "w4_"
rename:
  folio: respondent_id
  trap_a: AC2_check_expected5
  fan1: FS1
reverse_items: [EC4, PT3]
"#;
        let spec: CohortSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.scale, ResponseScale::ZeroToFour);
        assert_eq!(
            spec.rename.get("trap_a"),
            Some(&TargetField::Meta(MetaField::CheckExpectsFive))
        );
        assert_eq!(
            spec.rename.get("fan1"),
            Some(&TargetField::Item("FS1".parse().unwrap()))
        );
        assert!(spec.needs_reversal("PT3".parse().unwrap()));
        assert!(!spec.needs_reversal("FS7".parse().unwrap()));
    }
}
