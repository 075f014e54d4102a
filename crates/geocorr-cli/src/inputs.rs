//! Reading input tables from disk

use anyhow::{Context, Result};
use geocorr_core::schema::TablePurpose;
use geocorr_core::table::RawTable;
use geocorr_merge::InputTable;
use std::path::{Path, PathBuf};

/// Expand directories into the CSV files they contain, sorted by name
pub fn expand_paths(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(path)
                .with_context(|| format!("Failed to read directory {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_csv(p))
                .collect();
            found.sort();

            if found.is_empty() {
                tracing::warn!("No CSV files found in {}", path.display());
            }
            files.extend(found);
        } else {
            files.push(path.clone());
        }
    }

    Ok(files)
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
}

/// Read every file under `paths` as a table of the given purpose
pub fn read_tables(purpose: TablePurpose, paths: &[PathBuf]) -> Result<Vec<InputTable>> {
    let mut tables = Vec::new();

    for path in expand_paths(paths)? {
        let table = RawTable::from_path(&path)
            .with_context(|| format!("Failed to read {} table {}", purpose, path.display()))?;
        tracing::debug!("Read {} table '{}' ({} rows)", purpose, table.name, table.len());
        tables.push(InputTable::new(purpose, table));
    }

    Ok(tables)
}
