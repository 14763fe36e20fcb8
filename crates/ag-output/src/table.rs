//! In-memory form of one simulation output file.

/// Parsed contents of one output file: four header lines plus data rows,
/// held column-wise. An empty table (no data rows) is a valid terminal
/// state for a simulation that produced no output.
#[derive(Debug, Clone, Default)]
pub struct OutputTable {
    /// Simulation title, e.g. `NARR32_maize_00979`.
    pub title: Option<String>,
    /// Version string of the model binary that produced the file.
    pub model_version: Option<String>,
    /// Field names in file order (line 3).
    pub fields: Vec<String>,
    /// Unit strings positionally matching `fields` (line 4).
    pub units: Vec<String>,
    /// One value vector per field, all of equal length.
    pub columns: Vec<Vec<String>>,
}

impl OutputTable {
    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    pub fn field_index(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == field)
    }

    pub fn unit_of(&self, field: &str) -> Option<&str> {
        self.field_index(field)
            .and_then(|i| self.units.get(i))
            .map(String::as_str)
    }

    /// Point identifier encoded as the trailing `_NNN` suffix of the title.
    pub fn point_id(&self) -> Option<i64> {
        let title = self.title.as_deref()?;
        title.rsplit('_').next()?.parse().ok()
    }
}
