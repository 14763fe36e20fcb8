//! ag-yearly: year-boundary yield resolution and growing-season averages.
//!
//! Converts a per-point daily time series into one record per calendar
//! year: a resolved yield value, an inferred harvest date, and seasonal
//! means of the auxiliary daily variables. Crops still standing on
//! December 31 are resolved by scanning into the following year.

pub mod averages;
pub mod series;
pub mod yield_resolve;

pub use averages::season_averages;
pub use series::PointDailyData;
pub use yield_resolve::{resolve_yearly_yield, SeasonState, YearlyYield};

use std::collections::BTreeMap;

pub type YearlyResult<T> = Result<T, YearlyError>;

#[derive(thiserror::Error, Debug)]
pub enum YearlyError {
    #[error("Mismatched series lengths for {field}: {len} values vs {dates} dates")]
    LengthMismatch {
        field: String,
        len: usize,
        dates: usize,
    },

    #[error("Invalid sowing date: {0}")]
    InvalidSowDate(String),

    #[error("Unknown field: {0}")]
    UnknownField(String),
}

/// One yearly summary row for a point: resolved yield, inferred harvest
/// date, and the growing-season mean of each auxiliary field.
#[derive(Debug, Clone)]
pub struct YearlyRecord {
    pub sow_year: i32,
    /// NaN when the season could not be resolved (simulation horizon ended).
    pub yield_value: f64,
    pub harvest_date: Option<chrono::NaiveDate>,
    pub averages: BTreeMap<String, f64>,
}

/// Resolve yearly yields for one point and attach growing-season averages
/// of every field except the date index and the yield itself.
///
/// `sow_day_month` is the location's sowing-window start in `dd-mmm` form
/// (for example `15-apr`).
pub fn aggregate_point(
    data: &PointDailyData,
    yield_field: &str,
    sow_day_month: &str,
) -> YearlyResult<Vec<YearlyRecord>> {
    let yields = resolve_yearly_yield(data, yield_field)?;

    let aux_fields: Vec<String> = data
        .field_names()
        .filter(|f| !f.eq_ignore_ascii_case("date") && *f != yield_field)
        .map(str::to_string)
        .collect();

    let averages = season_averages(data, &yields, sow_day_month, &aux_fields)?;

    Ok(yields
        .into_iter()
        .zip(averages)
        .map(|(y, avgs)| YearlyRecord {
            sow_year: y.sow_year,
            yield_value: y.yield_value,
            harvest_date: y.harvest_date,
            averages: avgs,
        })
        .collect())
}
