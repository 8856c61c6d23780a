/// Trim whitespace + strip outer quotes if present.
pub fn clean_str(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// Spellings spreadsheets and exports use for an empty cell.
fn is_missing_token(s: &str) -> bool {
    s.is_empty() || matches!(s.to_ascii_lowercase().as_str(), "na" | "nan" | "n/a" | "null" | "none" | "-")
}

/// Parse a numeric cell. Empty and NA-style cells are `None`, so are cells
/// that do not hold a finite number.
pub fn parse_number(raw: &str) -> Option<f64> {
    let s = clean_str(raw);
    if is_missing_token(&s) {
        return None;
    }
    s.replace(',', ".").parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Text cell, `None` when empty.
pub fn parse_text(raw: &str) -> Option<String> {
    let s = clean_str(raw);
    if is_missing_token(&s) {
        None
    } else {
        Some(s)
    }
}

/// Render a workbook float the way a person typed it: `17` not `17.0`.
pub fn format_float_cell(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_and_missing_tokens() {
        assert_eq!(parse_number(" 3 "), Some(3.0));
        assert_eq!(parse_number("\"4\""), Some(4.0));
        assert_eq!(parse_number("2,5"), Some(2.5));
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("NA"), None);
        assert_eq!(parse_number("agree"), None);
        assert_eq!(parse_number("inf"), None);
    }

    #[test]
    fn text_cells() {
        assert_eq!(parse_text("  Mujer "), Some("Mujer".to_string()));
        assert_eq!(parse_text("  "), None);
    }

    #[test]
    fn float_cells_render_like_typed() {
        assert_eq!(format_float_cell(17.0), "17");
        assert_eq!(format_float_cell(2.5), "2.5");
    }
}
