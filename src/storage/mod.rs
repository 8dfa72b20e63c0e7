//! Relational persistence of record tables (SQLite)
//!
//! Cleaned datasets are kept in a single-file SQLite database so later runs
//! can reload them without repeating ingestion.

use crate::error::{Result, SeroError};
use crate::preprocessing::is_numeric_dtype;
use polars::prelude::*;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Behaviour when the destination table already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IfExists {
    /// Refuse to write
    Fail,
    /// Drop and recreate
    Replace,
    /// Insert after existing rows
    Append,
}

impl std::str::FromStr for IfExists {
    type Err = SeroError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fail" => Ok(IfExists::Fail),
            "replace" => Ok(IfExists::Replace),
            "append" => Ok(IfExists::Append),
            other => Err(SeroError::InvalidParameter {
                name: "if_exists".to_string(),
                value: other.to_string(),
                reason: "expected fail, replace or append".to_string(),
            }),
        }
    }
}

/// One row of `PRAGMA table_info`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub cid: i64,
    pub name: String,
    pub data_type: String,
    pub not_null: bool,
    pub primary_key: bool,
}

/// Table store backed by one SQLite connection
pub struct TableStore {
    conn: Connection,
}

impl TableStore {
    /// Open (or create) a database file; parent directories are created
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "Opened table store");
        Ok(Self { conn })
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Whether `table` exists
    pub fn has_table(&self, table: &str) -> Result<bool> {
        validate_identifier(table)?;
        let found: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Names of all user tables, sorted
    pub fn list_tables(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    /// Write `df` into `table`; returns the number of rows inserted
    pub fn save_table(&mut self, table: &str, df: &DataFrame, if_exists: IfExists) -> Result<usize> {
        validate_identifier(table)?;
        let exists = self.has_table(table)?;

        let tx = self.conn.transaction()?;
        match (exists, if_exists) {
            (true, IfExists::Fail) => {
                return Err(SeroError::StorageError(format!(
                    "table '{}' already exists",
                    table
                )));
            }
            (true, IfExists::Replace) => {
                tx.execute(&format!("DROP TABLE {}", quote(table)), [])?;
                tx.execute(&create_statement(table, df), [])?;
            }
            (true, IfExists::Append) => {}
            (false, _) => {
                tx.execute(&create_statement(table, df), [])?;
            }
        }

        let columns: Vec<Vec<Value>> = df
            .get_columns()
            .iter()
            .map(column_values)
            .collect::<Result<_>>()?;
        let names: Vec<String> = df.get_column_names().iter().map(|n| quote(n.as_str())).collect();
        let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{}", i)).collect();
        let insert = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(table),
            names.join(", "),
            placeholders.join(", ")
        );

        {
            let mut stmt = tx.prepare(&insert)?;
            for row in 0..df.height() {
                stmt.execute(params_from_iter(columns.iter().map(|c| &c[row])))?;
            }
        }
        tx.commit()?;

        info!(table, rows = df.height(), columns = df.width(), mode = ?if_exists, "Saved table");
        Ok(df.height())
    }

    /// Read a whole table back as a DataFrame
    pub fn load_table(&self, table: &str) -> Result<DataFrame> {
        let schema = self.table_schema(table)?;

        let mut stmt = self.conn.prepare(&format!("SELECT * FROM {}", quote(table)))?;
        let n_cols = stmt.column_count();
        let mut values: Vec<Vec<Value>> = vec![Vec::new(); n_cols];
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            for (j, col) in values.iter_mut().enumerate() {
                col.push(row.get::<_, Value>(j)?);
            }
        }

        let columns: Vec<Column> = schema
            .iter()
            .zip(values)
            .map(|(info, vals)| build_series(info, vals).into())
            .collect();
        let df = DataFrame::new(columns)?;
        debug!(table, rows = df.height(), "Loaded table");
        Ok(df)
    }

    /// Column layout of `table`
    pub fn table_schema(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        if !self.has_table(table)? {
            return Err(SeroError::StorageError(format!("table '{}' does not exist", table)));
        }
        let mut stmt = self.conn.prepare(&format!("PRAGMA table_info({})", quote(table)))?;
        let info = stmt
            .query_map([], |row| {
                Ok(ColumnInfo {
                    cid: row.get(0)?,
                    name: row.get(1)?,
                    data_type: row.get(2)?,
                    not_null: row.get::<_, i64>(3)? != 0,
                    primary_key: row.get::<_, i64>(5)? != 0,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(info)
    }
}

fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(SeroError::InvalidParameter {
            name: "table".to_string(),
            value: name.to_string(),
            reason: "must match [A-Za-z_][A-Za-z0-9_]*".to_string(),
        })
    }
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn sql_type(dtype: &DataType) -> &'static str {
    match dtype {
        DataType::Float32 | DataType::Float64 => "REAL",
        DataType::Boolean => "INTEGER",
        dt if is_numeric_dtype(dt) => "INTEGER",
        _ => "TEXT",
    }
}

fn create_statement(table: &str, df: &DataFrame) -> String {
    let cols: Vec<String> = df
        .get_columns()
        .iter()
        .map(|c| format!("{} {}", quote(c.name().as_str()), sql_type(c.dtype())))
        .collect();
    format!("CREATE TABLE {} ({})", quote(table), cols.join(", "))
}

fn column_values(column: &Column) -> Result<Vec<Value>> {
    let values = match sql_type(column.dtype()) {
        "REAL" => column
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .map(|v| match v {
                Some(x) if x.is_finite() => Value::Real(x),
                _ => Value::Null,
            })
            .collect(),
        "INTEGER" => column
            .cast(&DataType::Int64)?
            .i64()?
            .into_iter()
            .map(|v| v.map_or(Value::Null, Value::Integer))
            .collect(),
        _ => column
            .cast(&DataType::String)?
            .str()?
            .into_iter()
            .map(|v| v.map_or(Value::Null, |s| Value::Text(s.to_string())))
            .collect(),
    };
    Ok(values)
}

fn build_series(info: &ColumnInfo, values: Vec<Value>) -> Series {
    let name = PlSmallStr::from(info.name.as_str());
    match info.data_type.to_ascii_uppercase().as_str() {
        "INTEGER" => {
            let v: Vec<Option<i64>> = values
                .into_iter()
                .map(|v| match v {
                    Value::Integer(i) => Some(i),
                    Value::Real(x) => Some(x as i64),
                    _ => None,
                })
                .collect();
            Series::new(name, v)
        }
        "REAL" => {
            let v: Vec<Option<f64>> = values
                .into_iter()
                .map(|v| match v {
                    Value::Real(x) => Some(x),
                    Value::Integer(i) => Some(i as f64),
                    _ => None,
                })
                .collect();
            Series::new(name, v)
        }
        _ => {
            let v: Vec<Option<String>> = values
                .into_iter()
                .map(|v| match v {
                    Value::Text(s) => Some(s),
                    Value::Integer(i) => Some(i.to_string()),
                    Value::Real(x) => Some(x.to_string()),
                    _ => None,
                })
                .collect();
            Series::new(name, v)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cases() -> DataFrame {
        df!(
            "AGE" => &[Some(25.0), None, Some(40.0)],
            "CITY" => &[Some("Recife"), Some("Olinda"), None],
            "VDRL_RESULT" => &[0i64, 1, 0],
        )
        .unwrap()
    }

    #[test]
    fn test_save_and_load() {
        let mut store = TableStore::open_in_memory().unwrap();
        let n = store.save_table("syphilis_cases", &cases(), IfExists::Fail).unwrap();
        assert_eq!(n, 3);

        let loaded = store.load_table("syphilis_cases").unwrap();
        assert_eq!(loaded.shape(), (3, 3));
        let age = loaded.column("AGE").unwrap().f64().unwrap();
        assert_eq!(age.get(1), None);
        assert_eq!(age.get(2), Some(40.0));
        let city = loaded.column("CITY").unwrap().str().unwrap();
        assert_eq!(city.get(0), Some("Recife"));
        assert_eq!(city.get(2), None);
    }

    #[test]
    fn test_if_exists_policies() {
        let mut store = TableStore::open_in_memory().unwrap();
        store.save_table("t", &cases(), IfExists::Fail).unwrap();

        let err = store.save_table("t", &cases(), IfExists::Fail).unwrap_err();
        assert!(matches!(err, SeroError::StorageError(_)));

        store.save_table("t", &cases(), IfExists::Append).unwrap();
        assert_eq!(store.load_table("t").unwrap().height(), 6);

        store.save_table("t", &cases(), IfExists::Replace).unwrap();
        assert_eq!(store.load_table("t").unwrap().height(), 3);
    }

    #[test]
    fn test_table_schema() {
        let mut store = TableStore::open_in_memory().unwrap();
        store.save_table("t", &cases(), IfExists::Fail).unwrap();
        let schema = store.table_schema("t").unwrap();
        let types: Vec<(&str, &str)> = schema
            .iter()
            .map(|c| (c.name.as_str(), c.data_type.as_str()))
            .collect();
        assert_eq!(types, vec![("AGE", "REAL"), ("CITY", "TEXT"), ("VDRL_RESULT", "INTEGER")]);
    }

    #[test]
    fn test_rejects_bad_table_name() {
        let mut store = TableStore::open_in_memory().unwrap();
        let err = store.save_table("cases; DROP", &cases(), IfExists::Fail).unwrap_err();
        assert!(matches!(err, SeroError::InvalidParameter { .. }));
    }

    #[test]
    fn test_missing_table() {
        let store = TableStore::open_in_memory().unwrap();
        assert!(matches!(store.load_table("nope"), Err(SeroError::StorageError(_))));
    }

    #[test]
    fn test_if_exists_from_str() {
        assert_eq!("Replace".parse::<IfExists>().unwrap(), IfExists::Replace);
        assert!("upsert".parse::<IfExists>().is_err());
    }
}
