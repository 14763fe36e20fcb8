//! Run configuration files.
//!
//! The document builder leaves a flat `key = value` settings file in each
//! run directory. Only the keys recorded in `runParameters` matter here;
//! everything else (soil, fertilizer, management settings) is consumed by
//! the builder itself and ignored.

use crate::{StoreError, StoreResult};
use std::fs;
use std::path::Path;
use tracing::warn;

/// The subset of run settings persisted to the master `runParameters` table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunConfig {
    pub met: Option<String>,
    pub crop: Option<String>,
    pub resolution: Option<f64>,
    pub clock_start: Option<String>,
    pub clock_end: Option<String>,
    pub crit_fr_asw: Option<f64>,
    pub sow_start: Option<String>,
    pub sow_end: Option<String>,
    pub harvest_date: Option<String>,
    pub soil_name: Option<String>,
}

impl RunConfig {
    pub fn from_file(path: &Path) -> StoreResult<Self> {
        if !path.is_file() {
            return Err(StoreError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }
        let text = fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    fn parse(text: &str) -> Self {
        let mut cfg = Self::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('[') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            match key {
                "met" => cfg.met = Some(value.to_string()),
                "crop" => cfg.crop = Some(value.to_string()),
                "resolution" => cfg.resolution = parse_number(key, value),
                "clock_start" => cfg.clock_start = Some(value.to_string()),
                "clock_end" => cfg.clock_end = Some(value.to_string()),
                "crit_fr_asw" => cfg.crit_fr_asw = parse_number(key, value),
                "sow_start" => cfg.sow_start = Some(value.to_string()),
                "sow_end" => cfg.sow_end = Some(value.to_string()),
                "harvest_date" => cfg.harvest_date = Some(value.to_string()),
                "soilName" | "soil_name" => cfg.soil_name = Some(value.to_string()),
                _ => {}
            }
        }
        cfg
    }
}

fn parse_number(key: &str, value: &str) -> Option<f64> {
    match value.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("invalid numeric value for {}: '{}', skipping", key, value);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_keys_ignores_rest() {
        let cfg = RunConfig::parse(
            "[apsimPreprocessor]\n\
             met = NARR32\n\
             crop = maize\n\
             resolution = 32\n\
             crit_fr_asw = 0.5\n\
             sow_start = 15-apr\n\
             soilName = HCL\n\
             mass = 1000\n",
        );
        assert_eq!(cfg.met.as_deref(), Some("NARR32"));
        assert_eq!(cfg.crop.as_deref(), Some("maize"));
        assert_eq!(cfg.resolution, Some(32.0));
        assert_eq!(cfg.crit_fr_asw, Some(0.5));
        assert_eq!(cfg.sow_start.as_deref(), Some("15-apr"));
        assert_eq!(cfg.soil_name.as_deref(), Some("HCL"));
    }

    #[test]
    fn bad_numbers_become_none() {
        let cfg = RunConfig::parse("resolution = thirty-two\n");
        assert_eq!(cfg.resolution, None);
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = RunConfig::from_file(Path::new("/nonexistent/config.ini")).unwrap_err();
        assert!(matches!(err, StoreError::ConfigNotFound { .. }));
    }
}
