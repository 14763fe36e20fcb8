//! Strictly positional parse of one output file.
//!
//! The model binary writes four fixed header lines (version, title, field
//! names, units) followed by one whitespace-delimited data row per day.
//! Files shorter than five lines, or containing NUL bytes, parse to an
//! empty table rather than an error.

use crate::table::OutputTable;
use crate::OutputResult;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Read one output file into an [`OutputTable`].
///
/// The only hard error is failing to read the file itself; every defect in
/// the file's contents degrades to an empty or truncated table with a
/// warning naming the file.
pub fn read_output_file(path: &Path) -> OutputResult<OutputTable> {
    let bytes = fs::read(path)?;

    if bytes.contains(&0) {
        warn!(
            "{} contains NULL bytes, treating as empty. Consider re-running the simulation.",
            path.display()
        );
        return Ok(OutputTable::default());
    }

    let text = String::from_utf8_lossy(&bytes);
    Ok(parse_output_text(&text))
}

fn parse_output_text(text: &str) -> OutputTable {
    let mut table = OutputTable::default();

    for (line_num, line) in text.lines().enumerate() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match line_num {
            // `ApsimVersion = 7.4` style: everything after the `=` sign.
            0 => table.model_version = joined_tail(&tokens),
            1 => table.title = joined_tail(&tokens),
            2 => {
                table.fields = tokens.iter().map(|t| t.to_string()).collect();
                table.columns = vec![Vec::new(); table.fields.len()];
            }
            3 => table.units = tokens.iter().map(|t| t.to_string()).collect(),
            _ => {
                // Zip positionally against the field list; excess positions
                // on either side are dropped.
                let n = tokens.len().min(table.fields.len());
                for (column, token) in table.columns.iter_mut().zip(tokens.iter().take(n)) {
                    column.push(token.to_string());
                }
            }
        }
    }

    // A header-only file carries no data; rows must cover every field or
    // none, so drop ragged trailing columns left by a truncated last line.
    if let Some(min_len) = table.columns.iter().map(Vec::len).min() {
        for column in &mut table.columns {
            column.truncate(min_len);
        }
    }

    table
}

fn joined_tail(tokens: &[&str]) -> Option<String> {
    if tokens.len() > 2 {
        Some(tokens[2..].join(" "))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
ApsimVersion = 7.4
Title = NARR32_maize_00979
Date yield biomass
(dd/mm/yyyy) (kg/ha) (kg/ha)
01/01/2000 0  0
02/01/2000   125.5 300.1
";

    #[test]
    fn parses_headers_and_rows() {
        let t = parse_output_text(SAMPLE);
        assert_eq!(t.model_version.as_deref(), Some("7.4"));
        assert_eq!(t.title.as_deref(), Some("NARR32_maize_00979"));
        assert_eq!(t.fields, vec!["Date", "yield", "biomass"]);
        assert_eq!(t.units, vec!["(dd/mm/yyyy)", "(kg/ha)", "(kg/ha)"]);
        assert_eq!(t.row_count(), 2);
        assert_eq!(t.columns[1], vec!["0", "125.5"]);
    }

    #[test]
    fn every_column_has_equal_length() {
        let t = parse_output_text(SAMPLE);
        for column in &t.columns {
            assert_eq!(column.len(), t.row_count());
        }
    }

    #[test]
    fn short_file_yields_empty_table() {
        let t = parse_output_text("ApsimVersion = 7.4\nTitle = x_1\nDate yield\n");
        assert!(t.is_empty());
        assert_eq!(t.fields, vec!["Date", "yield"]);
    }

    #[test]
    fn excess_row_tokens_are_truncated() {
        let text = "a = v\nb = t_1\nDate yield\n(d) (kg)\n01/01/2000 5 extra tokens\n";
        let t = parse_output_text(text);
        assert_eq!(t.row_count(), 1);
        assert_eq!(t.columns[1], vec!["5"]);
    }

    #[test]
    fn missing_row_tokens_zip_to_shorter_length() {
        let text = "a = v\nb = t_1\nDate yield rain\n(d) (kg) (mm)\n01/01/2000 5\n";
        let t = parse_output_text(text);
        // The rain column got no value, so the row is dropped entirely.
        assert_eq!(t.row_count(), 0);
    }

    #[test]
    fn null_bytes_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.out");
        std::fs::write(&path, b"a = v\nb = t\nDate\n(d)\n\x0001/01/2000\n").unwrap();
        let t = read_output_file(&path).unwrap();
        assert!(t.is_empty());
        assert!(t.fields.is_empty());
    }
}
