//! Per-run relational store.
//!
//! Persists parsed output tables into a fresh SQLite file: one `apsimOutput`
//! row per simulated day (keyed by a leading point_id column) plus the
//! `outputFields` catalog mapping field names to unit strings.

use crate::dates::{to_iso_date, unit_to_format, ISO_DATE_UNIT};
use crate::StoreResult;
use ag_output::OutputTable;
use rusqlite::{params_from_iter, Connection};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

pub const OUTPUT_TABLE: &str = "apsimOutput";
pub const FIELDS_TABLE: &str = "outputFields";

/// Declared SQLite type for a known output field. Unrecognized fields get
/// no declared type and fall back to SQLite's dynamic typing.
fn field_type(field: &str) -> &'static str {
    const REAL_FIELDS: [&str; 8] = [
        "yield", "biomass", "mint", "maxt", "rain", "radn", "lai", "irr_fasw",
    ];
    if REAL_FIELDS.contains(&field) {
        "REAL"
    } else if field.eq_ignore_ascii_case("date") {
        "TEXT"
    } else {
        ""
    }
}

fn is_date_field(field: &str) -> bool {
    field.eq_ignore_ascii_case("date")
}

/// Save a batch of output tables to `db_path`, replacing any prior store of
/// the same name. The schema and the `outputFields` rows come from the first
/// non-empty table; empty tables are skipped. Returns the number of daily
/// rows written.
pub fn save_output_tables(db_path: &Path, tables: &[OutputTable]) -> StoreResult<usize> {
    let Some(schema) = tables.iter().find(|t| !t.is_empty()) else {
        warn!("no non-empty output tables, skipping database save");
        return Ok(0);
    };

    if db_path.is_file() {
        fs::remove_file(db_path)?;
    }
    let mut conn = Connection::open(db_path)?;

    // point_id leads, then one column per field in file order.
    let mut columns = vec!["\"point_id\" INTEGER".to_string()];
    for field in &schema.fields {
        columns.push(format!("\"{}\" {}", field, field_type(field)).trim_end().to_string());
    }
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} ({});\n\
         CREATE TABLE IF NOT EXISTS {} (name TEXT PRIMARY KEY, units TEXT);",
        OUTPUT_TABLE,
        columns.join(", "),
        FIELDS_TABLE,
    ))?;

    let placeholders = vec!["?"; schema.fields.len() + 1].join(",");
    let insert_sql = format!("INSERT INTO {} VALUES ({})", OUTPUT_TABLE, placeholders);

    let mut total_rows = 0usize;
    for table in tables {
        if table.is_empty() {
            continue;
        }
        if table.fields != schema.fields {
            warn!(
                "output table '{}' has a different field set, skipping",
                table.title.as_deref().unwrap_or("<untitled>")
            );
            continue;
        }
        let Some(point_id) = table.point_id() else {
            warn!(
                "output table '{}' has no parseable point id, skipping",
                table.title.as_deref().unwrap_or("<untitled>")
            );
            continue;
        };

        // Normalize dates to ISO unless the file already uses it.
        let date_format = table.field_index("Date").or_else(|| table.field_index("date")).and_then(|i| {
            let unit = table.units.get(i)?;
            if unit != ISO_DATE_UNIT {
                Some((i, unit_to_format(unit)))
            } else {
                None
            }
        });

        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&insert_sql)?;
            for row in 0..table.row_count() {
                let mut values: Vec<String> = Vec::with_capacity(table.fields.len() + 1);
                values.push(point_id.to_string());
                for (col, column) in table.columns.iter().enumerate() {
                    let raw = &column[row];
                    match &date_format {
                        Some((date_col, format)) if *date_col == col => {
                            values.push(to_iso_date(raw, format))
                        }
                        _ => values.push(raw.clone()),
                    }
                }
                stmt.execute(params_from_iter(values.iter()))?;
                total_rows += 1;
            }
        }
        tx.commit()?;
    }

    // Field catalog: first non-empty table defines the units for the batch.
    {
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT OR IGNORE INTO {} VALUES (?, ?)",
                FIELDS_TABLE
            ))?;
            for (field, unit) in schema.fields.iter().zip(schema.units.iter()) {
                stmt.execute([field, unit])?;
            }
        }
        tx.commit()?;
    }

    info!("saved {} rows to {}", total_rows, db_path.display());
    Ok(total_rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_fields_are_typed() {
        assert_eq!(field_type("yield"), "REAL");
        assert_eq!(field_type("irr_fasw"), "REAL");
        assert_eq!(field_type("Date"), "TEXT");
        assert_eq!(field_type("esw"), "");
    }
}
