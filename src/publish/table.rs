// src/publish/table.rs
use anyhow::{Context, Result};
use arrow::{
    array::{ArrayRef, BooleanArray, Float64Array, Int32Array, StringArray, UInt8Array},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use std::sync::Arc;

use crate::pipeline::CleaningOutcome;
use crate::process::ScoredRecord;
use crate::schema::{CanonicalItem, MetaField, Subscale};

pub const TOTAL_COLUMN: &str = "IRI_total";
pub const FAIL_COUNT_COLUMN: &str = "attention_fail_count";
pub const INCLUDED_COLUMN: &str = "included_after_qc";
pub const DISTANCE_COLUMN: &str = "mahalanobis_d2";
pub const OUTLIER_COLUMN: &str = "is_outlier";

/// Column layout shared by every published snapshot.
pub fn snapshot_schema() -> Schema {
    let mut fields = vec![
        Field::new(MetaField::RespondentId.column(), DataType::Utf8, true),
        Field::new("year", DataType::Int32, false),
        Field::new(MetaField::Age.column(), DataType::Float64, true),
        Field::new(MetaField::Gender.column(), DataType::Int32, true),
        Field::new(MetaField::Ses.column(), DataType::Float64, true),
        Field::new(MetaField::Commitment.column(), DataType::Float64, true),
        Field::new(MetaField::CheckExpectsFive.column(), DataType::Float64, true),
        Field::new(MetaField::CheckExpectsOne.column(), DataType::Float64, true),
    ];
    fields.extend(CanonicalItem::all().map(|item| Field::new(item.id(), DataType::Float64, true)));
    fields.extend(
        Subscale::ALL
            .iter()
            .map(|s| Field::new(s.mean_column(), DataType::Float64, true)),
    );
    fields.push(Field::new(TOTAL_COLUMN, DataType::Float64, true));
    fields.push(Field::new(FAIL_COUNT_COLUMN, DataType::UInt8, false));
    fields.push(Field::new(INCLUDED_COLUMN, DataType::Boolean, false));
    fields.push(Field::new(DISTANCE_COLUMN, DataType::Float64, true));
    fields.push(Field::new(OUTLIER_COLUMN, DataType::Boolean, true));
    Schema::new(fields)
}

fn f64_column<F>(recs: &[&ScoredRecord], get: F) -> ArrayRef
where
    F: Fn(&ScoredRecord) -> Option<f64>,
{
    Arc::new(Float64Array::from(
        recs.iter().map(|&r| get(r)).collect::<Vec<Option<f64>>>(),
    ))
}

/// Build a batch from the records at `rows` (positions into `scored`).
pub fn build_snapshot(
    scored: &[ScoredRecord],
    outcome: &CleaningOutcome,
    rows: &[usize],
) -> Result<RecordBatch> {
    let recs: Vec<&ScoredRecord> = rows.iter().map(|&i| &scored[i]).collect();

    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(
            recs.iter()
                .map(|r| r.record.respondent_id.clone())
                .collect::<Vec<Option<String>>>(),
        )) as ArrayRef,
        Arc::new(Int32Array::from(
            recs.iter().map(|r| r.record.year).collect::<Vec<i32>>(),
        )) as ArrayRef,
        f64_column(&recs, |r| r.record.age),
        Arc::new(Int32Array::from(
            recs.iter()
                .map(|r| r.record.gender.map(|g| g.code()))
                .collect::<Vec<Option<i32>>>(),
        )) as ArrayRef,
        f64_column(&recs, |r| r.record.ses),
        f64_column(&recs, |r| r.record.checks.commitment),
        f64_column(&recs, |r| r.record.checks.expects_five.value()),
        f64_column(&recs, |r| r.record.checks.expects_one.value()),
    ];
    for item in CanonicalItem::all() {
        columns.push(f64_column(&recs, |r| r.record.items.get(item)));
    }
    for sub in Subscale::ALL {
        columns.push(f64_column(&recs, |r| r.scores.mean(sub)));
    }
    columns.push(f64_column(&recs, |r| r.scores.total));

    columns.push(Arc::new(UInt8Array::from(
        rows.iter()
            .map(|&i| outcome.quality[i].failures)
            .collect::<Vec<u8>>(),
    )));
    columns.push(Arc::new(BooleanArray::from(
        rows.iter()
            .map(|&i| outcome.quality[i].included)
            .collect::<Vec<bool>>(),
    )));
    columns.push(Arc::new(Float64Array::from(
        rows.iter()
            .map(|&i| outcome.outlier_flag(i).map(|f| f.distance_sq))
            .collect::<Vec<Option<f64>>>(),
    )));
    columns.push(Arc::new(BooleanArray::from(
        rows.iter()
            .map(|&i| outcome.outlier_flag(i).map(|f| f.is_outlier))
            .collect::<Vec<Option<bool>>>(),
    )));

    RecordBatch::try_new(Arc::new(snapshot_schema()), columns)
        .context("building snapshot record batch")
}
