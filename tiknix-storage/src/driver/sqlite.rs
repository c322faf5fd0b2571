//! SQLite driver.
//!
//! A single connection behind `Arc<Mutex<_>>`. Statements are short and run
//! inline; the lock is never held across an await point.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use tiknix_core::{Binding, QueryError, Row, TiknixResult};

use super::Driver;

#[derive(Clone)]
pub struct SqliteDriver {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for SqliteDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDriver")
            .field("path", &self.path)
            .finish()
    }
}

impl SqliteDriver {
    /// Open (creating if needed) a database file.
    pub fn open<P: AsRef<Path>>(path: P) -> TiknixResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| QueryError::ConnectionUnavailable {
                reason: format!("{}: {}", parent.display(), e),
            })?;
        }
        let conn = Connection::open(path).map_err(|e| QueryError::ConnectionUnavailable {
            reason: format!("{}: {}", path.display(), e),
        })?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> TiknixResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| QueryError::ConnectionUnavailable {
            reason: e.to_string(),
        })?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run several `;`-separated statements without bindings (DDL, seeds).
    pub fn execute_batch(&self, sql: &str) -> TiknixResult<()> {
        self.lock()?
            .execute_batch(sql)
            .map_err(|e| QueryError::failed(sql, e))?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, QueryError> {
        self.conn.lock().map_err(|e| QueryError::ConnectionUnavailable {
            reason: e.to_string(),
        })
    }

    fn to_sql_value(binding: &Binding) -> SqlValue {
        match binding {
            Binding::Null => SqlValue::Null,
            Binding::Integer(i) => SqlValue::Integer(*i),
            Binding::Real(f) => SqlValue::Real(*f),
            Binding::Text(s) => SqlValue::Text(s.clone()),
        }
    }

    fn value_as_json(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<serde_json::Value> {
        Ok(match row.get_ref(idx)? {
            ValueRef::Null => serde_json::Value::Null,
            ValueRef::Integer(i) => serde_json::Value::Number(i.into()),
            ValueRef::Real(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ValueRef::Text(s) => serde_json::Value::String(String::from_utf8_lossy(s).into_owned()),
            ValueRef::Blob(b) => serde_json::Value::String(hex::encode(b)),
        })
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    async fn fetch_all(&self, sql: &str, bindings: &[Binding]) -> TiknixResult<Vec<Row>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql).map_err(|e| QueryError::failed(sql, e))?;

        let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let column_count = columns.len();

        let rows = stmt
            .query_map(params_from_iter(bindings.iter().map(Self::to_sql_value)), |row| {
                let mut values = Vec::with_capacity(column_count);
                for idx in 0..column_count {
                    values.push(Self::value_as_json(row, idx)?);
                }
                Ok(Row::new(columns.clone(), values))
            })
            .map_err(|e| QueryError::failed(sql, e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| QueryError::failed(sql, e))?;

        Ok(rows)
    }

    async fn execute(&self, sql: &str, bindings: &[Binding]) -> TiknixResult<u64> {
        let conn = self.lock()?;
        let affected = conn
            .execute(sql, params_from_iter(bindings.iter().map(Self::to_sql_value)))
            .map_err(|e| QueryError::failed(sql, e))?;
        Ok(affected as u64)
    }
}
