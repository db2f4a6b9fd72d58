//! JSON files of raw records, used to feed upserts
//!
//! ```json
//! {
//!   "table": "manifest",
//!   "records": [
//!     {"participant_id": "01", "visit_id": "BL", "datatype": ["anat"]}
//!   ]
//! }
//! ```

use crate::error::{Error, Result};
use crate::schema::RawRow;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// A batch of records for one table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordBatch {
    /// Table kind this batch is meant for, if recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    pub records: Vec<RawRow>,
}

impl RecordBatch {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            records: Vec::new(),
        }
    }

    pub fn add_record(&mut self, record: RawRow) {
        self.records.push(record);
    }

    /// Load a batch file from JSON
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| Error::FileRead {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(Error::Json)
    }

    /// Save the batch file to JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::raw_row;
    use crate::table::CellValue;

    #[test]
    fn test_batch_serialization() {
        let mut batch = RecordBatch::new("manifest");
        batch.add_record(raw_row([("participant_id", "01"), ("visit_id", "BL")]));
        batch.add_record(raw_row([
            ("participant_id", CellValue::from("02")),
            ("session_id", CellValue::Empty),
        ]));

        let json = serde_json::to_string_pretty(&batch).unwrap();
        let loaded: RecordBatch = serde_json::from_str(&json).unwrap();

        assert_eq!(loaded, batch);
        assert_eq!(loaded.records[1]["session_id"], CellValue::Empty);
    }

    #[test]
    fn test_batch_without_table() {
        let loaded: RecordBatch =
            serde_json::from_str(r#"{"records": [{"id": 1, "tags": ["a", "b"]}]}"#).unwrap();
        assert_eq!(loaded.table, None);
        assert_eq!(loaded.records[0]["id"], CellValue::Integer(1));
    }
}
