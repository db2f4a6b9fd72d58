//! Options for saving tables, loadable from JSON

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// How [`Table::save_with_backup`](crate::Table::save_with_backup) writes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveOptions {
    /// Backup directory name next to the target; defaults to `.<stem>s`
    pub backup_dir: Option<String>,
    /// Link the target to its backup with a relative path
    pub use_relative_path: bool,
    /// Sort on the index key before comparing and writing
    pub sort: bool,
    pub dry_run: bool,
    /// Compare with the existing file text as written, so a reordering
    /// alone counts as a change
    pub order_sensitive: bool,
    /// Fail on I/O errors (other than a missing file) while comparing with
    /// the existing file, instead of treating them as "no prior content"
    pub strict_existing_check: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            backup_dir: None,
            use_relative_path: true,
            sort: true,
            dry_run: false,
            order_sensitive: false,
            strict_existing_check: false,
        }
    }
}

impl SaveOptions {
    /// Load options from a JSON file; missing keys keep their defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| Error::FileRead {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(Error::Json)
    }

    /// Save the options to JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}
