use std::path::PathBuf;

/// One cohort's table exactly as read from disk: headers plus untyped cells.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    /// Header row of the sheet, whitespace-trimmed.
    pub headers: Vec<String>,
    /// Data rows; every row has `headers.len()` cells.
    pub rows: Vec<Vec<String>>,
    /// File the table was read from, for log context.
    pub source: PathBuf,
}

impl RawTable {
    /// Position of the first header equal to `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
