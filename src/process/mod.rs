// src/process/mod.rs
pub mod harmonize;
pub mod load;
pub mod raw_table;
pub mod score;
pub mod utils;

pub use harmonize::{
    harmonize_table, AttentionChecks, CheckAnswer, Gender, HarmonizeReport, HarmonizedRecord,
};
pub use load::load_table;
pub use raw_table::RawTable;
pub use score::{score_all, score_record, ScoredRecord, SubscaleScores};
