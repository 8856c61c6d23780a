// src/quality.rs
//! Attention-check quality gate.

use tracing::info;

use crate::config::Strictness;
use crate::process::{AttentionChecks, CheckAnswer, ScoredRecord};

/// Correct answer for the "select strongly agree" check.
pub const EXPECTED_CHECK_A: f64 = 5.0;
/// Correct answer for the "select strongly disagree" check.
pub const EXPECTED_CHECK_B: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityFlag {
    /// Failed checks, 0..=2.
    pub failures: u8,
    pub included: bool,
}

fn check_fails(answer: CheckAnswer, expected: f64) -> bool {
    match answer {
        // an unanswered check cannot be failed
        CheckAnswer::Absent => false,
        CheckAnswer::Value(v) => v != expected,
        CheckAnswer::Unparsable => true,
    }
}

pub fn failure_count(checks: &AttentionChecks) -> u8 {
    u8::from(check_fails(checks.expects_five, EXPECTED_CHECK_A))
        + u8::from(check_fails(checks.expects_one, EXPECTED_CHECK_B))
}

pub fn assess(checks: &AttentionChecks, strictness: Strictness) -> QualityFlag {
    let failures = failure_count(checks);
    QualityFlag {
        failures,
        included: strictness.admits(failures),
    }
}

/// One flag per record, same order.
#[tracing::instrument(level = "info", skip(records), fields(n = records.len(), strictness = strictness.as_str()))]
pub fn assess_all(records: &[ScoredRecord], strictness: Strictness) -> Vec<QualityFlag> {
    let flags: Vec<QualityFlag> = records
        .iter()
        .map(|r| assess(&r.record.checks, strictness))
        .collect();
    let passed = flags.iter().filter(|f| f.included).count();
    info!(passed, failed = flags.len() - passed, "quality gate applied");
    flags
}
