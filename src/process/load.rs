// src/process/load.rs
use anyhow::{anyhow, bail, Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use csv::ReaderBuilder;
use std::{fs::File, io::BufReader, path::Path};
use tracing::{debug, info};

use super::raw_table::RawTable;
use super::utils::{clean_str, format_float_cell};

/// Read one cohort table. `.csv` goes through the csv reader, workbook
/// extensions through calamine. Any read or parse problem is an error: a
/// cohort that cannot be read in full must stop the run.
#[tracing::instrument(level = "info", skip(path, sheet), fields(path = %path.display()))]
pub fn load_table(path: &Path, sheet: Option<&str>) -> Result<RawTable> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let table = match ext.as_str() {
        "csv" | "txt" => load_csv(path)?,
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => load_workbook(path, sheet)?,
        other => bail!(
            "unsupported input format `{}` for {}",
            other,
            path.display()
        ),
    };

    if table.headers.is_empty() {
        bail!("{} has no header row", path.display());
    }
    info!(
        rows = table.rows.len(),
        columns = table.headers.len(),
        "loaded raw table"
    );
    Ok(table)
}

fn load_csv(path: &Path) -> Result<RawTable> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(BufReader::new(file));

    let headers: Vec<String> = rdr
        .headers()
        .with_context(|| format!("Failed to read header of {}", path.display()))?
        .iter()
        .map(|h| clean_str(h.trim_start_matches('\u{feff}')))
        .collect();

    let mut rows = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let record = result
            .with_context(|| format!("CSV parse error in {} at record {}", path.display(), idx))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(RawTable {
        headers,
        rows,
        source: path.to_path_buf(),
    })
}

fn load_workbook(path: &Path, sheet: Option<&str>) -> Result<RawTable> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open workbook {}", path.display()))?;

    let range = match sheet {
        Some(name) => workbook
            .worksheet_range(name)
            .with_context(|| format!("Failed to read sheet `{}` of {}", name, path.display()))?,
        None => workbook
            .worksheet_range_at(0)
            .ok_or_else(|| anyhow!("{} contains no worksheets", path.display()))?
            .with_context(|| format!("Failed to read first sheet of {}", path.display()))?,
    };

    let mut rows_iter = range.rows();
    let headers: Vec<String> = match rows_iter.next() {
        Some(row) => row.iter().map(|c| clean_str(&cell_to_string(c))).collect(),
        None => Vec::new(),
    };
    let width = headers.len();

    let mut rows = Vec::with_capacity(range.height().saturating_sub(1));
    for row in rows_iter {
        let mut cells: Vec<String> = row.iter().map(cell_to_string).collect();
        cells.resize(width, String::new());
        rows.push(cells);
    }
    debug!(sheet = ?sheet, rows = rows.len(), "workbook range read");

    Ok(RawTable {
        headers,
        rows,
        source: path.to_path_buf(),
    })
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::Float(f) => format_float_cell(*f),
        Data::Int(i) => i.to_string(),
        Data::String(s) => s.clone(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}
