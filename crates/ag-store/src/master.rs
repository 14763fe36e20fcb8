//! Master run database.
//!
//! One file-backed store shared by every run of an experiment: run
//! parameters keyed by run id, the yearly aggregation of each run's daily
//! output, the shared field catalog, and the static grid-point lookup.

use crate::config::RunConfig;
use crate::sink::{FIELDS_TABLE, OUTPUT_TABLE};
use crate::{StoreError, StoreResult};
use ag_yearly::{aggregate_point, PointDailyData, YearlyRecord};
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Upper bound on daily rows held in memory per database read. The chunk
/// size is derived from the first point's row count and degrades when a
/// run's points have inconsistent row counts.
pub const MAX_CHUNK_ROWS: usize = 1_500_000;

pub struct MasterDb {
    conn: Connection,
}

impl MasterDb {
    /// Open the master database, creating the `runParameters` and
    /// `gridPoints` tables from the grid lookup CSV on first open.
    pub fn open(path: &Path, grid_lut_path: &Path) -> StoreResult<Self> {
        let fresh = !path.is_file();
        let conn = Connection::open(path)?;
        let db = Self { conn };
        if fresh {
            db.create_tables(grid_lut_path)?;
        }
        Ok(db)
    }

    fn create_tables(&self, grid_lut_path: &Path) -> StoreResult<()> {
        self.conn.execute_batch(
            "CREATE TABLE runParameters (
                run_id INTEGER PRIMARY KEY,
                met TEXT,
                crop TEXT,
                resolution REAL,
                clock_start TEXT,
                clock_end TEXT,
                crit_fr_asw REAL,
                sow_start TEXT,
                sow_end TEXT,
                harvest_date TEXT,
                soil_name TEXT
            );",
        )?;
        self.load_grid_points(grid_lut_path)
    }

    /// Populate `gridPoints` from the grid lookup CSV. `point_id` becomes
    /// an INTEGER column; every other column is carried as TEXT.
    fn load_grid_points(&self, grid_lut_path: &Path) -> StoreResult<()> {
        let mut reader = csv::Reader::from_path(grid_lut_path)?;
        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let point_col = headers
            .iter()
            .position(|h| h == "point_id")
            .ok_or(StoreError::GridColumnMissing { column: "point_id" })?;

        let columns: Vec<String> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| {
                if i == point_col {
                    format!("\"{}\" INTEGER", h)
                } else {
                    format!("\"{}\" TEXT", h)
                }
            })
            .collect();
        self.conn.execute_batch(&format!(
            "CREATE TABLE gridPoints ({});",
            columns.join(", ")
        ))?;

        let placeholders = vec!["?"; headers.len()].join(",");
        let mut stmt = self
            .conn
            .prepare(&format!("INSERT INTO gridPoints VALUES ({})", placeholders))?;
        for record in reader.records() {
            let record = record?;
            let values: Vec<String> = record.iter().map(str::to_string).collect();
            stmt.execute(params_from_iter(values.iter()))?;
        }
        Ok(())
    }

    /// Insert or update the `runParameters` row for a run. Returns `true`
    /// when the run was already present (an update), which tells the caller
    /// to skip re-aggregating yearly output.
    pub fn upsert_run_parameters(&self, run_id: i64, cfg: &RunConfig) -> StoreResult<bool> {
        let insert = self.conn.execute(
            "INSERT INTO runParameters VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
            params![
                run_id,
                cfg.met,
                cfg.crop,
                cfg.resolution,
                cfg.clock_start,
                cfg.clock_end,
                cfg.crit_fr_asw,
                cfg.sow_start,
                cfg.sow_end,
                cfg.harvest_date,
                cfg.soil_name,
            ],
        );
        match insert {
            Ok(_) => Ok(false),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                self.conn.execute(
                    "UPDATE runParameters SET met=?2, crop=?3, resolution=?4, clock_start=?5,
                     clock_end=?6, crit_fr_asw=?7, sow_start=?8, sow_end=?9, harvest_date=?10,
                     soil_name=?11 WHERE run_id=?1",
                    params![
                        run_id,
                        cfg.met,
                        cfg.crop,
                        cfg.resolution,
                        cfg.clock_start,
                        cfg.clock_end,
                        cfg.crit_fr_asw,
                        cfg.sow_start,
                        cfg.sow_end,
                        cfg.harvest_date,
                        cfg.soil_name,
                    ],
                )?;
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Per-point sowing dates for a run: `auto` means each point uses its
    /// own `sow_start` from `gridPoints`, anything else applies uniformly.
    fn sow_dates(&self, run_id: i64) -> StoreResult<SowDates> {
        let sow_start: Option<String> = self
            .conn
            .query_row(
                "SELECT sow_start FROM runParameters WHERE run_id = ?1",
                [run_id],
                |row| row.get(0),
            )
            .optional()?
            .flatten();

        match sow_start.as_deref() {
            Some("auto") => {
                let mut per_point = HashMap::new();
                let mut stmt = self
                    .conn
                    .prepare("SELECT point_id, sow_start FROM gridPoints")?;
                let rows = stmt.query_map([], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
                })?;
                for row in rows {
                    let (point, sow) = row?;
                    per_point.insert(point, sow);
                }
                Ok(SowDates::PerPoint(per_point))
            }
            Some(date) => Ok(SowDates::Uniform(date.to_string())),
            None => Ok(SowDates::Uniform(String::new())),
        }
    }

    /// Aggregate one run's daily output into the master yearly table.
    /// A set `update` flag means the run's rows may already exist; the
    /// write is skipped so yearly output is never duplicated.
    pub fn update_yearly_output(
        &mut self,
        run_db_path: &Path,
        run_id: i64,
        update: bool,
        max_chunk_rows: usize,
    ) -> StoreResult<usize> {
        if update {
            warn!("run {} data may already exist, skipping write", run_id);
            return Ok(0);
        }

        let sow_dates = self.sow_dates(run_id)?;
        let run_conn = Connection::open(run_db_path)?;
        let fields = output_fields(&run_conn)?;
        let Some(yield_field) = fields.iter().find(|f| *f == "yield") else {
            warn!("run {} has no yield field, skipping aggregation", run_id);
            return Ok(0);
        };
        let yield_field = yield_field.clone();

        let (point_ids, chunk_rows, points_per_chunk) =
            chunk_info(&run_conn, max_chunk_rows)?;
        info!(
            "aggregating run {}: {} points, {} per chunk",
            run_id,
            point_ids.len(),
            points_per_chunk
        );

        let mut written = 0usize;
        let mut offset = 0usize;
        let mut chunk: Vec<DailyRow> = Vec::new();
        for (p, point_id) in point_ids.iter().enumerate() {
            if p % points_per_chunk == 0 {
                chunk = read_daily_chunk(&run_conn, &fields, chunk_rows, offset)?;
                offset += chunk_rows;
            }

            let Some(sow) = sow_dates.for_point(*point_id) else {
                warn!("no sowing date for point {}, skipping", point_id);
                continue;
            };

            let data = point_daily_data(&chunk, *point_id, &fields)?;
            if data.is_empty() {
                // The chunk heuristic assumed uniform row counts; a point
                // falling outside its chunk shows up empty here.
                warn!("no daily rows for point {} in chunk, skipping", point_id);
                continue;
            }
            let records = match aggregate_point(&data, &yield_field, &sow) {
                Ok(records) => records,
                Err(e) => {
                    warn!("point {}: {}, skipping", point_id, e);
                    continue;
                }
            };
            written += self.append_yearly_records(*point_id, run_id, &records)?;
        }
        Ok(written)
    }

    fn append_yearly_records(
        &mut self,
        point_id: i64,
        run_id: i64,
        records: &[YearlyRecord],
    ) -> StoreResult<usize> {
        let Some(first) = records.first() else {
            return Ok(0);
        };
        let aux_fields: Vec<&String> = first.averages.keys().collect();

        // Yearly table is created lazily from the first observed field set.
        let mut columns = vec![
            "\"point_id\" INTEGER".to_string(),
            "\"sow_year\" INTEGER".to_string(),
            "\"yield\" REAL".to_string(),
            "\"harvest_date\" TEXT".to_string(),
        ];
        columns.extend(aux_fields.iter().map(|f| format!("\"{}\" REAL", f)));
        columns.push("\"run_id\" INTEGER".to_string());
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} ({});",
            OUTPUT_TABLE,
            columns.join(", ")
        ))?;

        let placeholders = vec!["?"; columns.len()].join(",");
        let tx = self.conn.transaction()?;
        let mut written = 0usize;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} VALUES ({})",
                OUTPUT_TABLE, placeholders
            ))?;
            for record in records {
                let mut values: Vec<Value> = vec![
                    Value::Integer(point_id),
                    Value::Integer(record.sow_year as i64),
                    real_or_null(record.yield_value),
                    record
                        .harvest_date
                        .map(|d| Value::Text(d.format("%Y-%m-%d").to_string()))
                        .unwrap_or(Value::Null),
                ];
                for field in &aux_fields {
                    values.push(real_or_null(record.averages[field.as_str()]));
                }
                values.push(Value::Integer(run_id));
                stmt.execute(params_from_iter(values))?;
                written += 1;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    /// Merge a run's field catalog into the shared one; first writer wins.
    pub fn merge_output_fields(&self, run_db_path: &Path) -> StoreResult<()> {
        let run_conn = Connection::open(run_db_path)?;
        let mut stmt = run_conn.prepare(&format!("SELECT name, units FROM {}", FIELDS_TABLE))?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })?;

        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (name TEXT PRIMARY KEY, units TEXT);",
            FIELDS_TABLE
        ))?;
        let mut insert = self
            .conn
            .prepare(&format!("INSERT OR IGNORE INTO {} VALUES (?, ?)", FIELDS_TABLE))?;
        for row in rows {
            let (name, units) = row?;
            insert.execute(params![name, units])?;
        }
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

enum SowDates {
    Uniform(String),
    PerPoint(HashMap<i64, String>),
}

impl SowDates {
    fn for_point(&self, point_id: i64) -> Option<String> {
        match self {
            SowDates::Uniform(date) if date.is_empty() => None,
            SowDates::Uniform(date) => Some(date.clone()),
            SowDates::PerPoint(map) => map.get(&point_id).cloned(),
        }
    }
}

fn real_or_null(v: f64) -> Value {
    if v.is_nan() {
        Value::Null
    } else {
        Value::Real(v)
    }
}

fn output_fields(run_conn: &Connection) -> StoreResult<Vec<String>> {
    let mut stmt = run_conn.prepare(&format!("SELECT name FROM {}", FIELDS_TABLE))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut fields = Vec::new();
    for row in rows {
        fields.push(row?);
    }
    Ok(fields)
}

/// Distinct point ids plus the chunking parameters: assumes every point has
/// the same number of daily rows as the first one (best effort).
fn chunk_info(
    run_conn: &Connection,
    max_chunk_rows: usize,
) -> StoreResult<(Vec<i64>, usize, usize)> {
    let mut stmt =
        run_conn.prepare(&format!("SELECT DISTINCT point_id FROM {}", OUTPUT_TABLE))?;
    let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
    let mut point_ids = Vec::new();
    for row in rows {
        point_ids.push(row?);
    }
    if point_ids.is_empty() {
        return Ok((point_ids, max_chunk_rows.max(1), 1));
    }

    let rows_per_point: usize = run_conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM {} WHERE point_id = ?1",
            OUTPUT_TABLE
        ),
        [point_ids[0]],
        |row| row.get::<_, i64>(0).map(|n| n as usize),
    )?;
    let rows_per_point = rows_per_point.max(1);
    let points_per_chunk = (max_chunk_rows / rows_per_point).max(1);
    Ok((
        point_ids,
        rows_per_point * points_per_chunk,
        points_per_chunk,
    ))
}

struct DailyRow {
    point_id: i64,
    values: Vec<Value>,
}

fn read_daily_chunk(
    run_conn: &Connection,
    fields: &[String],
    limit: usize,
    offset: usize,
) -> StoreResult<Vec<DailyRow>> {
    let field_list = fields
        .iter()
        .map(|f| format!("\"{}\"", f))
        .collect::<Vec<_>>()
        .join(", ");
    let mut stmt = run_conn.prepare(&format!(
        "SELECT point_id, {} FROM {} LIMIT ?1 OFFSET ?2",
        field_list, OUTPUT_TABLE
    ))?;
    let rows = stmt.query_map(params![limit as i64, offset as i64], |row| {
        let point_id: i64 = row.get(0)?;
        let mut values = Vec::with_capacity(fields.len());
        for i in 0..fields.len() {
            values.push(row.get::<_, Value>(i + 1)?);
        }
        Ok(DailyRow { point_id, values })
    })?;

    let mut chunk = Vec::new();
    for row in rows {
        chunk.push(row?);
    }
    Ok(chunk)
}

fn value_to_f64(v: &Value) -> f64 {
    match v {
        Value::Integer(n) => *n as f64,
        Value::Real(r) => *r,
        Value::Text(s) => s.parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

/// Assemble one point's rows from a chunk into an ordered daily series.
fn point_daily_data(
    chunk: &[DailyRow],
    point_id: i64,
    fields: &[String],
) -> StoreResult<PointDailyData> {
    let date_col = fields.iter().position(|f| f.eq_ignore_ascii_case("date"));

    let mut dates = Vec::new();
    let mut columns: BTreeMap<String, Vec<f64>> = fields
        .iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != date_col)
        .map(|(_, f)| (f.clone(), Vec::new()))
        .collect();

    for row in chunk.iter().filter(|r| r.point_id == point_id) {
        let date = date_col
            .and_then(|i| match &row.values[i] {
                Value::Text(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d").ok(),
                _ => None,
            });
        let Some(date) = date else {
            warn!("point {}: row with unparseable date, skipping", point_id);
            continue;
        };
        dates.push(date);
        for (i, field) in fields.iter().enumerate() {
            if Some(i) == date_col {
                continue;
            }
            if let Some(column) = columns.get_mut(field) {
                column.push(value_to_f64(&row.values[i]));
            }
        }
    }

    Ok(PointDailyData::new(dates, columns)?)
}

/// Update the master database with every run in `[start_run, end_run]`.
/// Run directories live next to the master file, named by run id, each
/// holding a `config.ini` and the run's private store.
pub fn update_master(
    master_path: &Path,
    grid_lut_path: &Path,
    start_run: i64,
    end_run: Option<i64>,
) -> StoreResult<()> {
    let end_run = end_run.unwrap_or(start_run);
    let base = master_path.parent().unwrap_or_else(|| Path::new("."));
    let mut db = MasterDb::open(master_path, grid_lut_path)?;

    let total = end_run - start_run + 1;
    for (i, run_id) in (start_run..=end_run).enumerate() {
        println!("Saving run: {} ({}/{})...", run_id, i + 1, total);
        let run_path = base.join(run_id.to_string());

        let cfg = match RunConfig::from_file(&run_path.join("config.ini")) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("run {}: {}, skipping", run_id, e);
                continue;
            }
        };
        let update = db.upsert_run_parameters(run_id, &cfg)?;

        let run_db_path = match find_run_db(&run_path) {
            Ok(path) => path,
            Err(e) => {
                warn!("run {}: {}, skipping", run_id, e);
                continue;
            }
        };
        db.update_yearly_output(&run_db_path, run_id, update, MAX_CHUNK_ROWS)?;
        db.merge_output_fields(&run_db_path)?;
    }
    Ok(())
}

/// The run's private store lives at `<run>/data/apsimData.sqlite`, or at
/// the run directory root when the batch driver wrote it in place.
pub fn find_run_db(run_path: &Path) -> StoreResult<PathBuf> {
    for candidate in [
        run_path.join("data").join("apsimData.sqlite"),
        run_path.join("apsimData.sqlite"),
    ] {
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(StoreError::RunDbNotFound {
        path: run_path.to_path_buf(),
    })
}
