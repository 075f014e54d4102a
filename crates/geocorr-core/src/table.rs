//! Raw tabular input and CSV import/export.
//!
//! A [`RawTable`] is exactly what the upload collaborator hands over: a name,
//! a header row and string cells. Nothing is interpreted here; the column
//! mapper and the model parsers give the cells meaning.

use crate::error::{GeocorrError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{Read, Write};
use std::path::Path;

/// SHA-256 digest of a table's content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest(pub [u8; 32]);

impl ContentDigest {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// An uninterpreted table: header plus string rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable {
    /// Table name, usually the file stem
    pub name: String,

    /// Header cells as they appear in the source
    pub headers: Vec<String>,

    /// Data rows; every row has `headers.len()` cells
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(name: impl Into<String>, headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { name: name.into(), headers, rows }
    }

    /// Read a delimited table from any reader
    pub fn from_reader<R: Read>(name: impl Into<String>, reader: R) -> Result<Self> {
        let mut csv_reader =
            csv::ReaderBuilder::new().trim(csv::Trim::All).flexible(true).from_reader(reader);

        let headers: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();
        let width = headers.len();

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            // Skip fully blank lines that spreadsheet exports like to append
            if record.iter().all(str::is_empty) {
                continue;
            }
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            row.resize(width, String::new());
            rows.push(row);
        }

        Ok(Self { name: name.into(), headers, rows })
    }

    /// Read a CSV file; the table is named after the file stem
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(GeocorrError::InputNotFound { path: path.to_path_buf() });
        }
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("table")
            .to_string();
        let file = std::fs::File::open(path)?;
        Self::from_reader(name, file)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Digest over header and cells. The table name is not part of it, so
    /// renaming a file does not invalidate cached results.
    pub fn content_digest(&self) -> ContentDigest {
        let mut hasher = Sha256::new();
        hasher.update((self.headers.len() as u64).to_le_bytes());
        for header in &self.headers {
            hash_cell(&mut hasher, header);
        }
        hasher.update((self.rows.len() as u64).to_le_bytes());
        for row in &self.rows {
            for cell in row {
                hash_cell(&mut hasher, cell);
            }
        }
        ContentDigest(hasher.finalize().into())
    }
}

fn hash_cell(hasher: &mut Sha256, cell: &str) {
    hasher.update((cell.len() as u64).to_le_bytes());
    hasher.update(cell.as_bytes());
}

/// Write rows as CSV; the header is the serde field names of `T`
pub fn write_csv<T: Serialize, W: Write>(rows: &[T], writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Read rows previously written with [`write_csv`]
pub fn read_csv<T: DeserializeOwned, R: Read>(reader: R) -> Result<Vec<T>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();
    for row in csv_reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

/// Write rows to a CSV file, creating parent directories as needed
pub fn write_csv_file<T: Serialize>(rows: &[T], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    write_csv(rows, std::io::BufWriter::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_reader_trims_and_pads() {
        let data = "Hole ID, Easting ,Northing\nBH1, 10.5,20\nBH2,11\n,,\n";
        let table = RawTable::from_reader("holes", data.as_bytes()).unwrap();

        assert_eq!(table.headers, vec!["Hole ID", "Easting", "Northing"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0], vec!["BH1", "10.5", "20"]);
        assert_eq!(table.rows[1], vec!["BH2", "11", ""]);
    }

    #[test]
    fn test_digest_ignores_name_but_not_content() {
        let a = RawTable::new("a", vec!["x".into()], vec![vec!["1".into()]]);
        let b = RawTable::new("b", vec!["x".into()], vec![vec!["1".into()]]);
        let c = RawTable::new("a", vec!["x".into()], vec![vec!["2".into()]]);

        assert_eq!(a.content_digest(), b.content_digest());
        assert_ne!(a.content_digest(), c.content_digest());
    }

    #[test]
    fn test_digest_separates_cells() {
        let a = RawTable::new("t", vec!["h".into()], vec![vec!["ab".into(), "c".into()]]);
        let b = RawTable::new("t", vec!["h".into()], vec![vec!["a".into(), "bc".into()]]);
        assert_ne!(a.content_digest(), b.content_digest());
    }

    #[test]
    fn test_missing_file() {
        let result = RawTable::from_path(Path::new("/nonexistent/geocorr/table.csv"));
        assert!(matches!(result, Err(GeocorrError::InputNotFound { .. })));
    }
}
