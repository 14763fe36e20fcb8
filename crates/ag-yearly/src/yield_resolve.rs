//! Year-boundary yield resolution.
//!
//! Yield in the daily output is cumulative within a season: it grows to a
//! peak and resets to zero at harvest. Per calendar year this module
//! resolves a single yield value and the inferred harvest date, including
//! crops that are still in the ground on December 31 and only peak in the
//! following year.

use crate::series::PointDailyData;
use crate::YearlyResult;
use chrono::{Days, NaiveDate};
use tracing::warn;

/// Per-point scan state across calendar years.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeasonState {
    /// Scanning within the normal Jan 1 - Dec 31 window.
    InYear,
    /// The previous year's crop was still standing on December 31; the
    /// current window starts at the carried-over date instead of Jan 1.
    ScanningOverlap,
    /// The daily series ended mid-scan. Every remaining year resolves to
    /// an unknown (NaN) yield. Note this cannot be told apart from a
    /// genuinely unfinished growing season at the end of a truncated
    /// dataset; both land here.
    Exhausted,
}

/// Resolved yield for one calendar year.
#[derive(Debug, Clone)]
pub struct YearlyYield {
    pub sow_year: i32,
    /// NaN when the simulation horizon ended before the season resolved.
    pub yield_value: f64,
    /// `None` for zero-yield years and unresolved (NaN) years.
    pub harvest_date: Option<NaiveDate>,
}

/// Resolve one yield value and harvest date per calendar year present in
/// the series, in ascending year order.
pub fn resolve_yearly_yield(
    data: &PointDailyData,
    field: &str,
) -> YearlyResult<Vec<YearlyYield>> {
    let mut out = Vec::new();
    let mut state = SeasonState::InYear;
    let mut carry_start: Option<NaiveDate> = None;

    for year in data.years() {
        if state == SeasonState::Exhausted {
            out.push(unresolved(year));
            continue;
        }

        let window_start = match carry_start.take() {
            Some(day) => {
                state = SeasonState::InYear;
                day
            }
            None => jan1(year),
        };
        let window_end = dec31(year);

        let last_value = match data.value_on(field, window_end) {
            Some(v) => v,
            None => {
                // Simulation ended mid-year; expected at the tail of the
                // horizon but possibly a simulation that never finished.
                warn!(
                    "no {} value on {}, out of simulation range; setting year {} as unknown",
                    field, window_end, year
                );
                state = SeasonState::Exhausted;
                out.push(unresolved(year));
                continue;
            }
        };
        let window_max = data
            .window_max(field, window_start, window_end)
            .unwrap_or(f64::NAN);

        if window_max == 0.0 {
            // Nothing grew all year.
            out.push(YearlyYield {
                sow_year: year,
                yield_value: 0.0,
                harvest_date: None,
            });
        } else if last_value == 0.0 {
            // Season completed within the window; harvest on the latest
            // day attaining the maximum.
            let harvest = data.latest_date_at(field, window_start, window_end, window_max);
            out.push(YearlyYield {
                sow_year: year,
                yield_value: window_max,
                harvest_date: harvest,
            });
        } else if last_value > 0.0 {
            // Crop still standing at year end: walk forward until the
            // value stops increasing.
            state = SeasonState::ScanningOverlap;
            let mut running = last_value;
            let mut harvest = window_end;
            let mut day = window_end;
            loop {
                day = day + Days::new(1);
                match data.value_on(field, day) {
                    None => {
                        warn!(
                            "{} out of simulation range while scanning season overlap; setting year {} as unknown",
                            day, year
                        );
                        state = SeasonState::Exhausted;
                        out.push(unresolved(year));
                        break;
                    }
                    Some(v) if v >= running => {
                        running = v;
                        harvest = day;
                    }
                    Some(_) => {
                        // First decreasing day: the season ended the day
                        // before, and next year's window starts here.
                        carry_start = Some(day);
                        out.push(YearlyYield {
                            sow_year: year,
                            yield_value: running,
                            harvest_date: Some(harvest),
                        });
                        break;
                    }
                }
            }
        } else {
            // Negative or NaN daily yield; should not occur.
            warn!("no case for daily {} data in year {}, skipping", field, year);
        }
    }

    Ok(out)
}

fn unresolved(year: i32) -> YearlyYield {
    YearlyYield {
        sow_year: year,
        yield_value: f64::NAN,
        harvest_date: None,
    }
}

fn jan1(year: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, 1, 1).expect("valid date")
}

fn dec31(year: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, 12, 31).expect("valid date")
}
