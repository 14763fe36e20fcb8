//! Daily time series for a single point.

use crate::{YearlyError, YearlyResult};
use chrono::{Datelike, NaiveDate};
use std::collections::{BTreeMap, HashMap};

/// Ordered daily records for one point: a date index plus one numeric
/// vector per field, all of equal length. Dates need not be contiguous;
/// gaps simply have no value.
#[derive(Debug, Clone, Default)]
pub struct PointDailyData {
    dates: Vec<NaiveDate>,
    index: HashMap<NaiveDate, usize>,
    fields: BTreeMap<String, Vec<f64>>,
}

impl PointDailyData {
    pub fn new(dates: Vec<NaiveDate>, fields: BTreeMap<String, Vec<f64>>) -> YearlyResult<Self> {
        for (name, values) in &fields {
            if values.len() != dates.len() {
                return Err(YearlyError::LengthMismatch {
                    field: name.clone(),
                    len: values.len(),
                    dates: dates.len(),
                });
            }
        }
        let index = dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();
        Ok(Self {
            dates,
            index,
            fields,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Unique calendar years present, ascending.
    pub fn years(&self) -> Vec<i32> {
        let mut years: Vec<i32> = self.dates.iter().map(|d| d.year()).collect();
        years.sort_unstable();
        years.dedup();
        years
    }

    pub fn value_on(&self, field: &str, date: NaiveDate) -> Option<f64> {
        let i = *self.index.get(&date)?;
        self.fields.get(field).map(|v| v[i])
    }

    fn window_values<'a>(
        &'a self,
        field: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Option<impl Iterator<Item = (NaiveDate, f64)> + 'a> {
        let values = self.fields.get(field)?;
        Some(
            self.dates
                .iter()
                .zip(values.iter())
                .filter(move |(d, _)| **d >= start && **d <= end)
                .map(|(d, v)| (*d, *v)),
        )
    }

    /// Maximum value in the inclusive window, skipping NaN. `None` when the
    /// window holds no data at all.
    pub fn window_max(&self, field: &str, start: NaiveDate, end: NaiveDate) -> Option<f64> {
        self.window_values(field, start, end)?
            .map(|(_, v)| v)
            .filter(|v| !v.is_nan())
            .fold(None, |acc: Option<f64>, v| {
                Some(acc.map_or(v, |a| a.max(v)))
            })
    }

    /// Latest date in the window whose value equals `target` (the plateau
    /// rule: the maximum may occur on several days).
    pub fn latest_date_at(
        &self,
        field: &str,
        start: NaiveDate,
        end: NaiveDate,
        target: f64,
    ) -> Option<NaiveDate> {
        self.window_values(field, start, end)?
            .filter(|(_, v)| *v == target)
            .map(|(d, _)| d)
            .last()
    }

    /// Mean over the inclusive window, skipping NaN. NaN when the window
    /// holds no usable data.
    pub fn window_mean(&self, field: &str, start: NaiveDate, end: NaiveDate) -> f64 {
        let (sum, count) = match self.window_values(field, start, end) {
            Some(values) => values
                .map(|(_, v)| v)
                .filter(|v| !v.is_nan())
                .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1)),
            None => (0.0, 0),
        };
        if count == 0 {
            f64::NAN
        } else {
            sum / count as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn series() -> PointDailyData {
        let dates = vec![date(2000, 1, 1), date(2000, 1, 2), date(2000, 1, 3)];
        let mut fields = BTreeMap::new();
        fields.insert("yield".to_string(), vec![0.0, 5.0, 5.0]);
        fields.insert("rain".to_string(), vec![1.0, 3.0, f64::NAN]);
        PointDailyData::new(dates, fields).unwrap()
    }

    #[test]
    fn rejects_mismatched_lengths() {
        let mut fields = BTreeMap::new();
        fields.insert("yield".to_string(), vec![1.0]);
        let err = PointDailyData::new(vec![], fields).unwrap_err();
        assert!(matches!(err, YearlyError::LengthMismatch { .. }));
    }

    #[test]
    fn window_max_and_plateau_argmax() {
        let s = series();
        let (a, b) = (date(2000, 1, 1), date(2000, 1, 3));
        assert_eq!(s.window_max("yield", a, b), Some(5.0));
        assert_eq!(s.latest_date_at("yield", a, b, 5.0), Some(date(2000, 1, 3)));
    }

    #[test]
    fn window_mean_skips_nan() {
        let s = series();
        let mean = s.window_mean("rain", date(2000, 1, 1), date(2000, 1, 3));
        assert_eq!(mean, 2.0);
    }

    #[test]
    fn out_of_range_window_is_none() {
        let s = series();
        assert_eq!(
            s.window_max("yield", date(2001, 1, 1), date(2001, 12, 31)),
            None
        );
        assert!(s
            .window_mean("rain", date(2001, 1, 1), date(2001, 12, 31))
            .is_nan());
    }
}
