// src/bin/inspect_snapshot.rs
use anyhow::{Context, Result};
use arrow::{record_batch::RecordBatch, util::pretty::print_batches};
use clap::Parser;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::{fs::File, path::PathBuf};

/// Print the schema, row count and first rows of a published snapshot.
#[derive(Parser)]
#[command(author, version)]
struct Args {
    path: PathBuf,
    /// Rows to print.
    #[arg(short = 'n', long, default_value_t = 10)]
    rows: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let file = File::open(&args.path).with_context(|| format!("opening {}", args.path.display()))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("reading parquet footer of {}", args.path.display()))?;
    let total_rows = builder.metadata().file_metadata().num_rows();
    let schema = builder.schema().clone();

    println!("=== Snapshot: {} ===", args.path.display());
    println!("Total rows: {}", total_rows);
    println!();
    println!("=== Schema ===");
    for field in schema.fields() {
        println!(
            "- {:<24} {:<10} {}",
            field.name(),
            field.data_type().to_string(),
            if field.is_nullable() { "nullable" } else { "" }
        );
    }
    println!();

    let reader = builder.with_limit(args.rows).build()?;
    let batches: Vec<RecordBatch> = reader.collect::<Result<_, _>>()?;
    if !batches.is_empty() {
        println!("=== First {} rows ===", args.rows);
        print_batches(&batches)?;
    }
    Ok(())
}
