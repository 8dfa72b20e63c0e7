//! Data loading utilities

use crate::error::{Result, SeroError};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

/// CSV loader for record tables
#[derive(Debug, Clone)]
pub struct DataLoader {
    /// Rows used to infer column types
    infer_schema_length: usize,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    /// Create a new data loader
    pub fn new() -> Self {
        Self {
            infer_schema_length: 1000,
        }
    }

    /// Set how many rows are scanned to infer column types
    pub fn with_infer_schema_length(mut self, n: usize) -> Self {
        self.infer_schema_length = n.max(1);
        self
    }

    fn check_file(path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(SeroError::FileNotFound(path.display().to_string()));
        }
        if std::fs::metadata(path)?.len() == 0 {
            return Err(SeroError::EmptyFile(path.display().to_string()));
        }
        Ok(())
    }

    /// Load a CSV file with a header row
    pub fn load_csv(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let path = path.as_ref();
        Self::check_file(path)?;

        let start = Instant::now();
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(self.infer_schema_length))
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?;

        if df.height() == 0 {
            return Err(SeroError::EmptyFile(path.display().to_string()));
        }

        info!(
            path = %path.display(),
            rows = df.height(),
            columns = df.width(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Loaded CSV"
        );
        Ok(df)
    }

    /// Size and shape of a CSV file without parsing it fully
    pub fn file_info(&self, path: impl AsRef<Path>) -> Result<FileInfo> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SeroError::FileNotFound(path.display().to_string()));
        }
        let file_size = std::fs::metadata(path)?.len();

        let reader = BufReader::new(File::open(path)?);
        let mut lines = reader.lines();
        let header = lines.next().transpose()?.unwrap_or_default();
        let columns: Vec<String> = header
            .split(',')
            .map(|s| s.trim().trim_matches('"').to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let mut n_rows = 0;
        for line in lines {
            if !line?.trim().is_empty() {
                n_rows += 1;
            }
        }

        Ok(FileInfo {
            path: path.to_path_buf(),
            file_size,
            n_rows,
            n_cols: columns.len(),
            columns,
        })
    }
}

/// File information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: PathBuf,
    pub file_size: u64,
    pub n_rows: usize,
    pub n_cols: usize,
    pub columns: Vec<String>,
}

/// Write `df` as CSV with a header row
pub fn save_csv(df: &mut DataFrame, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    Ok(())
}
