// src/process/harmonize.rs
//! Schema unification: one cohort's raw table → canonical records.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::raw_table::RawTable;
use super::utils::{parse_number, parse_text};
use crate::schema::{
    reverse_code, CanonicalItem, CohortSpec, ItemResponses, MetaField, TargetField, COMMON_MAX,
    COMMON_MIN,
};

/// Coded gender: 1 = male, 2 = female.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "hombre" | "masculino" | "male" | "1" | "1.0" => Some(Gender::Male),
            "mujer" | "femenino" | "female" | "2" | "2.0" => Some(Gender::Female),
            _ => None,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Gender::Male => 1,
            Gender::Female => 2,
        }
    }
}

/// One attention-check cell. A cell holding text that is not a number was
/// still answered, so it is kept apart from an empty cell.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum CheckAnswer {
    #[default]
    Absent,
    Value(f64),
    Unparsable,
}

impl CheckAnswer {
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return CheckAnswer::Absent;
        };
        if parse_text(raw).is_none() {
            return CheckAnswer::Absent;
        }
        match parse_number(raw) {
            Some(v) => CheckAnswer::Value(v),
            None => CheckAnswer::Unparsable,
        }
    }

    /// Numeric answer, if there is one.
    pub fn value(&self) -> Option<f64> {
        match self {
            CheckAnswer::Value(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_unparsable(&self) -> bool {
        matches!(self, CheckAnswer::Unparsable)
    }
}

impl From<Option<f64>> for CheckAnswer {
    fn from(v: Option<f64>) -> Self {
        v.map_or(CheckAnswer::Absent, CheckAnswer::Value)
    }
}

/// The three embedded attention checks, on their raw values.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AttentionChecks {
    pub commitment: Option<f64>,
    /// Correct answer is 5.
    pub expects_five: CheckAnswer,
    /// Correct answer is 1.
    pub expects_one: CheckAnswer,
}

/// A respondent in canonical form. Every present item is on the 1–5 scale.
#[derive(Debug, Clone, PartialEq)]
pub struct HarmonizedRecord {
    pub respondent_id: Option<String>,
    pub year: i32,
    pub age: Option<f64>,
    pub gender: Option<Gender>,
    pub ses: Option<f64>,
    pub checks: AttentionChecks,
    pub items: ItemResponses,
}

/// What harmonizing one cohort had to tolerate.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HarmonizeReport {
    pub year: i32,
    pub rows: usize,
    /// Canonical fields with no matching raw column.
    pub missing_columns: Vec<String>,
    /// Item cells that were present but not a number.
    pub unparsable_cells: usize,
    /// Item cells outside the cohort's native scale.
    pub out_of_range_cells: usize,
    /// Attention-check cells answered with something other than a number.
    pub unparsable_checks: usize,
}

/// Resolved column positions for one table.
struct ColumnMap {
    items: Vec<(CanonicalItem, Option<usize>)>,
    meta: BTreeMap<MetaField, Option<usize>>,
}

impl ColumnMap {
    fn resolve(table: &RawTable, spec: &CohortSpec, report: &mut HarmonizeReport) -> Self {
        let mut lookup = |field: TargetField| -> Option<usize> {
            let found = spec
                .candidate_headers(field)
                .iter()
                .find_map(|h| table.column_index(h));
            if found.is_none() {
                report.missing_columns.push(field.to_string());
            }
            found
        };

        let items = CanonicalItem::all()
            .map(|item| (item, lookup(TargetField::Item(item))))
            .collect();
        let meta = MetaField::ALL
            .iter()
            .map(|&m| (m, lookup(TargetField::Meta(m))))
            .collect();
        ColumnMap { items, meta }
    }

    fn meta_cell<'a>(&self, row: &'a [String], field: MetaField) -> Option<&'a str> {
        self.meta
            .get(&field)
            .copied()
            .flatten()
            .and_then(|i| row.get(i))
            .map(String::as_str)
    }
}

/// Translate `table` into canonical records using `spec`.
///
/// Never fails: absent columns become missing fields and bad cells become
/// missing values; both are counted in the returned report.
#[tracing::instrument(level = "info", skip(table, spec), fields(year = spec.year, rows = table.rows.len()))]
pub fn harmonize_table(
    table: &RawTable,
    spec: &CohortSpec,
) -> (Vec<HarmonizedRecord>, HarmonizeReport) {
    let mut report = HarmonizeReport {
        year: spec.year,
        rows: table.rows.len(),
        ..Default::default()
    };
    let columns = ColumnMap::resolve(table, spec, &mut report);
    if !report.missing_columns.is_empty() {
        warn!(
            year = spec.year,
            missing = ?report.missing_columns,
            "raw columns absent; filling with missing"
        );
    }

    let (native_min, native_max) = spec.scale.native_range();
    let offset = spec.scale.offset();

    let mut records = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        let mut items = ItemResponses::default();
        for &(item, col) in &columns.items {
            let Some(raw) = col.and_then(|i| row.get(i)) else {
                continue;
            };
            let Some(value) = parse_number(raw) else {
                if parse_text(raw).is_some() {
                    report.unparsable_cells += 1;
                }
                continue;
            };
            if value < native_min || value > native_max {
                report.out_of_range_cells += 1;
                continue;
            }
            let mut common = value + offset;
            if spec.needs_reversal(item) {
                common = reverse_code(common);
            }
            debug_assert!((COMMON_MIN..=COMMON_MAX).contains(&common));
            items.set(item, Some(common));
        }

        let number = |f: MetaField| columns.meta_cell(row, f).and_then(parse_number);
        let check = |f: MetaField| CheckAnswer::parse(columns.meta_cell(row, f));
        let checks = AttentionChecks {
            commitment: number(MetaField::Commitment),
            expects_five: check(MetaField::CheckExpectsFive),
            expects_one: check(MetaField::CheckExpectsOne),
        };
        report.unparsable_checks += usize::from(checks.expects_five.is_unparsable())
            + usize::from(checks.expects_one.is_unparsable());
        records.push(HarmonizedRecord {
            respondent_id: columns
                .meta_cell(row, MetaField::RespondentId)
                .and_then(parse_text),
            year: spec.year,
            age: number(MetaField::Age),
            gender: columns.meta_cell(row, MetaField::Gender).and_then(Gender::parse),
            ses: number(MetaField::Ses),
            checks,
            items,
        });
    }

    if report.unparsable_checks > 0 {
        warn!(
            year = spec.year,
            unparsable = report.unparsable_checks,
            "non-numeric attention-check answers; counted as failed"
        );
    }
    if report.unparsable_cells + report.out_of_range_cells > 0 {
        warn!(
            year = spec.year,
            unparsable = report.unparsable_cells,
            out_of_range = report.out_of_range_cells,
            "item cells set to missing"
        );
    }
    debug!(year = spec.year, records = records.len(), "cohort harmonized");
    (records, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{default_cohorts, ResponseScale};
    use proptest::prelude::*;
    use std::path::PathBuf;

    fn table(headers: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
            source: PathBuf::from("mem.csv"),
        }
    }

    fn item(id: &str) -> CanonicalItem {
        id.parse().unwrap()
    }

    fn spec(year: i32) -> CohortSpec {
        default_cohorts()
            .into_iter()
            .find(|c| c.year == year)
            .unwrap()
    }

    #[test]
    fn zero_to_four_cohort_is_shifted() {
        let t = table(
            &["ID", "FS1", "EC2", "PT3", "age", "gender"],
            &[&["a", "0", "4", "2", "19", "Mujer"]],
        );
        let (recs, report) = harmonize_table(&t, &spec(2023));
        assert_eq!(recs.len(), 1);
        let r = &recs[0];
        assert_eq!(r.year, 2023);
        assert_eq!(r.respondent_id.as_deref(), Some("a"));
        assert_eq!(r.items.get(item("FS1")), Some(1.0));
        assert_eq!(r.items.get(item("EC2")), Some(5.0));
        assert_eq!(r.items.get(item("PT3")), Some(3.0));
        assert_eq!(r.items.get(item("PD6")), None);
        assert_eq!(r.gender, Some(Gender::Female));
        assert_eq!(r.age, Some(19.0));
        assert!(report.missing_columns.contains(&"PD6".to_string()));
        assert!(report.missing_columns.contains(&"AC2_check_expected5".to_string()));
    }

    #[test]
    fn prefixed_cohort_with_reversal() {
        let t = table(
            &["iri_id", "iri_FS1", "iri_FS7", "iri_PD13", "iri_ac1_rta5", "iri_ac2_rta1", "socioeconomic_level"],
            &[&["7", "2", "1", "5", "5", "2", "3"]],
        );
        let (recs, _) = harmonize_table(&t, &spec(2025));
        let r = &recs[0];
        assert_eq!(r.items.get(item("FS1")), Some(2.0));
        assert_eq!(r.items.get(item("FS7")), Some(5.0));
        assert_eq!(r.items.get(item("PD13")), Some(1.0));
        assert_eq!(r.checks.expects_five, CheckAnswer::Value(5.0));
        assert_eq!(r.checks.expects_one, CheckAnswer::Value(2.0));
        assert_eq!(r.ses, Some(3.0));
    }

    #[test]
    fn empty_reversal_list_leaves_values_alone() {
        let t = table(&["iri_FS7"], &[&["1"]]);
        let mut s = spec(2025);
        s.reverse_items.clear();
        let (recs, _) = harmonize_table(&t, &s);
        assert_eq!(recs[0].items.get(item("FS7")), Some(1.0));
    }

    #[test]
    fn bad_cells_become_missing_not_zero() {
        let t = table(&["EFS1", "EFS5", "EFS7"], &[&["9", "often", ""]]);
        let (recs, report) = harmonize_table(&t, &spec(2024));
        assert_eq!(recs[0].items.get(item("FS1")), None);
        assert_eq!(recs[0].items.get(item("FS5")), None);
        assert_eq!(recs[0].items.get(item("FS7")), None);
        assert_eq!(report.out_of_range_cells, 1);
        assert_eq!(report.unparsable_cells, 1);
    }

    #[test]
    fn custom_rename_table_is_honoured() {
        let mut s = CohortSpec {
            year: 2030,
            path: PathBuf::from("x.csv"),
            sheet: None,
            scale: ResponseScale::OneToFive,
            item_prefix: String::new(),
            rename: Default::default(),
            reverse_items: vec![item("EC4")],
        };
        s.rename.insert("empathy_4".into(), TargetField::Item(item("EC4")));
        s.rename.insert("trap".into(), TargetField::Meta(MetaField::CheckExpectsOne));
        let t = table(&["empathy_4", "trap"], &[&["2", "1"]]);
        let (recs, _) = harmonize_table(&t, &s);
        assert_eq!(recs[0].items.get(item("EC4")), Some(4.0));
        assert_eq!(recs[0].checks.expects_one, CheckAnswer::Value(1.0));
    }

    #[test]
    fn gender_codes() {
        assert_eq!(Gender::parse(" HOMBRE "), Some(Gender::Male));
        assert_eq!(Gender::parse("2.0"), Some(Gender::Female));
        assert_eq!(Gender::parse("otro"), None);
        assert_eq!(Gender::Female.code(), 2);
    }

    #[test]
    fn text_check_answers_are_answered_not_absent() {
        let t = table(
            &["iri_id", "iri_ac1_rta5", "iri_ac2_rta1"],
            &[&["a", "De acuerdo", "Nunca"], &["b", "NA", " "], &["c", "5", "1"]],
        );
        let (recs, report) = harmonize_table(&t, &spec(2025));
        assert_eq!(recs[0].checks.expects_five, CheckAnswer::Unparsable);
        assert_eq!(recs[0].checks.expects_one, CheckAnswer::Unparsable);
        assert_eq!(recs[1].checks.expects_five, CheckAnswer::Absent);
        assert_eq!(recs[1].checks.expects_one, CheckAnswer::Absent);
        assert_eq!(recs[2].checks.expects_five.value(), Some(5.0));
        assert_eq!(report.unparsable_checks, 2);
    }

    fn raw_cell() -> impl Strategy<Value = String> {
        prop_oneof![
            (-3i32..9).prop_map(|v| v.to_string()),
            (-30i32..90).prop_map(|v| format!("{:.1}", f64::from(v) / 10.0)),
            Just(String::new()),
            Just("NA".to_string()),
            Just("a veces".to_string()),
        ]
    }

    proptest! {
        #[test]
        fn present_items_always_land_on_common_scale(
            cells in proptest::collection::vec(raw_cell(), 28),
            zero_based in any::<bool>(),
            reversed in any::<bool>(),
        ) {
            let spec = CohortSpec {
                year: 2030,
                path: PathBuf::from("x.csv"),
                sheet: None,
                scale: if zero_based { ResponseScale::ZeroToFour } else { ResponseScale::OneToFive },
                item_prefix: String::new(),
                rename: Default::default(),
                reverse_items: if reversed { CanonicalItem::all().collect() } else { Vec::new() },
            };
            let headers: Vec<String> = CanonicalItem::all().map(|i| i.id()).collect();
            let t = RawTable {
                headers,
                rows: vec![cells.clone()],
                source: PathBuf::from("mem.csv"),
            };
            let (recs, report) = harmonize_table(&t, &spec);
            let (lo, hi) = spec.scale.native_range();
            let mut dropped = 0;
            for (item, raw) in CanonicalItem::all().zip(&cells) {
                let got = recs[0].items.get(item);
                match parse_number(raw) {
                    Some(v) if v >= lo && v <= hi => {
                        let common = v + spec.scale.offset();
                        let want = if reversed { reverse_code(common) } else { common };
                        prop_assert_eq!(got, Some(want));
                    }
                    Some(_) => {
                        dropped += 1;
                        prop_assert_eq!(got, None);
                    }
                    None => prop_assert_eq!(got, None),
                }
                if let Some(v) = got {
                    prop_assert!((COMMON_MIN..=COMMON_MAX).contains(&v));
                }
            }
            prop_assert_eq!(report.out_of_range_cells, dropped);
        }
    }
}
