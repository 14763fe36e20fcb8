//! Growing-season averages of auxiliary daily variables.

use crate::series::PointDailyData;
use crate::yield_resolve::YearlyYield;
use crate::{YearlyError, YearlyResult};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Parse a `dd-mmm` sowing-window start such as `15-apr` into (day, month).
pub fn parse_day_month(s: &str) -> YearlyResult<(u32, u32)> {
    const MONTHS: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let invalid = || YearlyError::InvalidSowDate(s.to_string());

    let (day, month) = s.split_once('-').ok_or_else(invalid)?;
    let day: u32 = day.trim().parse().map_err(|_| invalid())?;
    let month = MONTHS
        .iter()
        .position(|m| month.trim().eq_ignore_ascii_case(m))
        .ok_or_else(invalid)? as u32
        + 1;
    if day == 0 || day > 31 {
        return Err(invalid());
    }
    Ok((day, month))
}

/// Mean of each auxiliary field over [sow date, harvest date] for every
/// resolved year, in the same order as `yields`. Years without a concrete
/// harvest date get NaN for every field.
pub fn season_averages(
    data: &PointDailyData,
    yields: &[YearlyYield],
    sow_day_month: &str,
    fields: &[String],
) -> YearlyResult<Vec<BTreeMap<String, f64>>> {
    let (sow_day, sow_month) = parse_day_month(sow_day_month)?;
    for field in fields {
        if !data.field_names().any(|f| f == field) {
            return Err(YearlyError::UnknownField(field.clone()));
        }
    }

    let mut out = Vec::with_capacity(yields.len());
    for year in yields {
        let mut averages = BTreeMap::new();
        let sow_date = NaiveDate::from_ymd_opt(year.sow_year, sow_month, sow_day);
        for field in fields {
            let mean = match (year.harvest_date, sow_date) {
                (Some(harvest), Some(sow)) => data.window_mean(field, sow, harvest),
                _ => f64::NAN,
            };
            averages.insert(field.clone(), mean);
        }
        out.push(averages);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Days;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_day_month_case_insensitively() {
        assert_eq!(parse_day_month("15-apr").unwrap(), (15, 4));
        assert_eq!(parse_day_month("1-Dec").unwrap(), (1, 12));
        assert!(parse_day_month("32-apr").is_err());
        assert!(parse_day_month("april").is_err());
    }

    #[test]
    fn averages_span_sow_to_harvest() {
        let dates: Vec<NaiveDate> = (0..365).map(|i| date(2001, 1, 1) + Days::new(i)).collect();
        let mut fields = BTreeMap::new();
        // rain is 2.0 through June 30 (day index 180), then 4.0.
        fields.insert(
            "rain".to_string(),
            (0..365).map(|i| if i <= 180 { 2.0 } else { 4.0 }).collect(),
        );
        let data = PointDailyData::new(dates, fields).unwrap();

        let yields = vec![YearlyYield {
            sow_year: 2001,
            yield_value: 100.0,
            harvest_date: Some(date(2001, 6, 30)),
        }];
        let avgs = season_averages(&data, &yields, "1-may", &["rain".to_string()]).unwrap();
        assert_eq!(avgs[0]["rain"], 2.0);
    }

    #[test]
    fn unresolved_year_gets_nan() {
        let data = PointDailyData::new(
            vec![date(2001, 1, 1)],
            BTreeMap::from([("rain".to_string(), vec![1.0])]),
        )
        .unwrap();
        let yields = vec![YearlyYield {
            sow_year: 2001,
            yield_value: f64::NAN,
            harvest_date: None,
        }];
        let avgs = season_averages(&data, &yields, "15-apr", &["rain".to_string()]).unwrap();
        assert!(avgs[0]["rain"].is_nan());
    }

    #[test]
    fn unknown_field_is_an_error() {
        let data = PointDailyData::default();
        let err = season_averages(&data, &[], "15-apr", &["ghost".to_string()]).unwrap_err();
        assert!(matches!(err, YearlyError::UnknownField(_)));
    }
}
