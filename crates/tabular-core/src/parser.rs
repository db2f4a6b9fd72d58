//! Tab-separated reader and writer for tabular files
//!
//! Every cell is read as text: deciding types is the schema's job.

use crate::error::{Error, Result};
use crate::table::CellValue;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

/// The only field separator accepted
pub const SEPARATOR: u8 = b'\t';

/// Cell contents read back as empty cells
pub const NA_VALUES: &[&str] = &[
    "", "NA", "N/A", "n/a", "NaN", "nan", "null", "NULL", "None", "<NA>", "#N/A",
];

/// Header and text cells of a file, before any schema is involved
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

/// Read a tab-separated file
pub fn read_tsv<P: AsRef<Path>>(path: P) -> Result<RawTable> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    read_records(BufReader::new(file), path)
}

/// Parse tab-separated content from a string (useful for testing)
pub fn parse_tsv_str(content: &str, source_name: &str) -> Result<RawTable> {
    read_records(content.as_bytes(), &PathBuf::from(source_name))
}

fn read_records<R: Read>(reader: R, path: &Path) -> Result<RawTable> {
    let mut tsv_reader = csv::ReaderBuilder::new()
        .delimiter(SEPARATOR)
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = tsv_reader.headers().map_err(|e| Error::Csv {
        path: path.to_path_buf(),
        source: e,
    })?;

    let columns: Vec<String> = headers.iter().map(str::to_string).collect();

    if columns.is_empty() {
        return Err(Error::LoadFormat {
            path: path.to_path_buf(),
            message: "no columns found".to_string(),
        });
    }

    // A comma-separated file parses as one wide column
    if columns.len() == 1 && columns[0].contains(',') {
        return Err(Error::LoadFormat {
            path: path.to_path_buf(),
            message: "it looks like the file is comma-separated; columns must be separated \
                      by tabs, not commas"
                .to_string(),
        });
    }

    let mut rows = Vec::new();
    for (row_idx, result) in tsv_reader.records().enumerate() {
        let record = result.map_err(|e| Error::Csv {
            path: path.to_path_buf(),
            source: e,
        })?;

        if record.len() > columns.len() {
            return Err(Error::LoadFormat {
                path: path.to_path_buf(),
                message: format!(
                    "row {} has {} cells but the header has {} columns",
                    row_idx + 1,
                    record.len(),
                    columns.len()
                ),
            });
        }

        let mut cells: Vec<CellValue> = record.iter().map(CellValue::from_text).collect();

        // Pad with empty cells if row is shorter than header
        cells.resize(columns.len(), CellValue::Empty);

        rows.push(cells);
    }

    Ok(RawTable { columns, rows })
}

/// Render a header and rows as tab-separated text
pub fn write_tsv(columns: &[String], rows: &[Vec<CellValue>]) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(SEPARATOR)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    let csv_err = |e: csv::Error| Error::Csv {
        path: PathBuf::from("<memory>"),
        source: e,
    };

    writer.write_record(columns).map_err(csv_err)?;
    for row in rows {
        writer
            .write_record(row.iter().map(CellValue::to_string_value))
            .map_err(csv_err)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| Error::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| {
        Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })
}
