//! Durable permission rows (`authcontrol`).

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use tiknix_core::{AccessLevel, Binding, PermissionRow, Row, TiknixResult, Timestamp};
use tiknix_storage::Driver;
use tracing::debug;

const CREATED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Backing store for permission rows.
#[async_trait]
pub trait PermissionStore: Send + Sync + std::fmt::Debug {
    async fn load_all(&self) -> TiknixResult<Vec<PermissionRow>>;

    async fn insert(&self, row: &PermissionRow) -> TiknixResult<()>;

    /// Add one to the row's `validcount`. Matches control and method
    /// case-insensitively; returns rows touched.
    async fn increment_valid_count(&self, control: &str, method: &str) -> TiknixResult<u64>;

    /// Update the row's level and description, inserting it if absent.
    async fn upsert(&self, row: &PermissionRow) -> TiknixResult<()>;

    async fn delete(&self, control: &str, method: &str) -> TiknixResult<u64>;
}

/// `authcontrol` table behind any [`Driver`].
#[derive(Debug, Clone)]
pub struct SqlPermissionStore<D> {
    driver: D,
}

impl<D: Driver> SqlPermissionStore<D> {
    pub fn new(driver: D) -> Self {
        Self { driver }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Create `authcontrol` if it does not exist.
    pub async fn ensure_schema(&self) -> TiknixResult<()> {
        self.driver
            .execute(
                "CREATE TABLE IF NOT EXISTS authcontrol (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    control TEXT NOT NULL,
                    method TEXT NOT NULL,
                    level INTEGER NOT NULL,
                    description TEXT,
                    validcount INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT
                )",
                &[],
            )
            .await?;
        self.driver
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_authcontrol_control_method
                    ON authcontrol (control, method)",
                &[],
            )
            .await?;
        Ok(())
    }

    fn row_from(row: &Row) -> Option<PermissionRow> {
        let control = row.get_str("control")?;
        let method = row.get_str("method")?;
        let level = row.get_i64("level")?;
        Some(PermissionRow {
            control: control.to_string(),
            method: method.to_string(),
            level: AccessLevel::new(level),
            description: row.get_str("description").map(str::to_string),
            valid_count: row.get_i64("validcount").unwrap_or(0),
            created_at: row.get_str("created_at").and_then(parse_created_at),
        })
    }
}

fn parse_created_at(text: &str) -> Option<Timestamp> {
    NaiveDateTime::parse_from_str(text, CREATED_AT_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

fn format_created_at(at: Option<Timestamp>) -> String {
    at.unwrap_or_else(Utc::now)
        .format(CREATED_AT_FORMAT)
        .to_string()
}

fn description_binding(row: &PermissionRow) -> Binding {
    row.description.clone().into()
}

#[async_trait]
impl<D: Driver + std::fmt::Debug> PermissionStore for SqlPermissionStore<D> {
    async fn load_all(&self) -> TiknixResult<Vec<PermissionRow>> {
        let rows = self
            .driver
            .fetch_all(
                "SELECT control, method, level, description, validcount, created_at
                 FROM authcontrol",
                &[],
            )
            .await?;

        let total = rows.len();
        let permissions: Vec<PermissionRow> = rows.iter().filter_map(Self::row_from).collect();
        if permissions.len() != total {
            debug!(
                skipped = total - permissions.len(),
                "Skipped authcontrol rows with missing fields"
            );
        }
        Ok(permissions)
    }

    async fn insert(&self, row: &PermissionRow) -> TiknixResult<()> {
        self.driver
            .execute(
                "INSERT INTO authcontrol (control, method, level, description, validcount, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
                &[
                    row.control.as_str().into(),
                    row.method.as_str().into(),
                    row.level.value().into(),
                    description_binding(row),
                    row.valid_count.into(),
                    format_created_at(row.created_at).into(),
                ],
            )
            .await?;
        Ok(())
    }

    async fn increment_valid_count(&self, control: &str, method: &str) -> TiknixResult<u64> {
        self.driver
            .execute(
                "UPDATE authcontrol SET validcount = validcount + 1
                 WHERE LOWER(control) = ? AND LOWER(method) = ?",
                &[control.to_lowercase().into(), method.to_lowercase().into()],
            )
            .await
    }

    async fn upsert(&self, row: &PermissionRow) -> TiknixResult<()> {
        let updated = self
            .driver
            .execute(
                "UPDATE authcontrol SET level = ?, description = ?
                 WHERE LOWER(control) = ? AND LOWER(method) = ?",
                &[
                    row.level.value().into(),
                    description_binding(row),
                    row.control.to_lowercase().into(),
                    row.method.to_lowercase().into(),
                ],
            )
            .await?;
        if updated == 0 {
            self.insert(row).await?;
        }
        Ok(())
    }

    async fn delete(&self, control: &str, method: &str) -> TiknixResult<u64> {
        self.driver
            .execute(
                "DELETE FROM authcontrol WHERE LOWER(control) = ? AND LOWER(method) = ?",
                &[control.to_lowercase().into(), method.to_lowercase().into()],
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiknix_storage::SqliteDriver;

    async fn store() -> SqlPermissionStore<SqliteDriver> {
        let store = SqlPermissionStore::new(SqliteDriver::open_in_memory().unwrap());
        store.ensure_schema().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_insert_and_load() {
        let store = store().await;
        store
            .insert(&PermissionRow::new("Reports", "generate", AccessLevel::ADMIN).with_description("reports"))
            .await
            .unwrap();

        let rows = store.load_all().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].control, "Reports");
        assert_eq!(rows[0].level, AccessLevel::ADMIN);
        assert_eq!(rows[0].description.as_deref(), Some("reports"));
        assert!(rows[0].created_at.is_some());
    }

    #[tokio::test]
    async fn test_ensure_schema_is_idempotent() {
        let store = store().await;
        store.ensure_schema().await.unwrap();
    }

    #[tokio::test]
    async fn test_increment_valid_count_ignores_case() {
        let store = store().await;
        store
            .insert(&PermissionRow::new("Reports", "Generate", AccessLevel::ADMIN))
            .await
            .unwrap();

        assert_eq!(store.increment_valid_count("REPORTS", "generate").await.unwrap(), 1);
        assert_eq!(store.increment_valid_count("reports", "missing").await.unwrap(), 0);
        assert_eq!(store.load_all().await.unwrap()[0].valid_count, 1);
    }

    #[tokio::test]
    async fn test_upsert_and_delete() {
        let store = store().await;
        store
            .upsert(&PermissionRow::new("widgets", "list", AccessLevel::MEMBER))
            .await
            .unwrap();
        store
            .upsert(&PermissionRow::new("Widgets", "LIST", AccessLevel::ROOT))
            .await
            .unwrap();

        let rows = store.load_all().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].level, AccessLevel::ROOT);

        assert_eq!(store.delete("WIDGETS", "list").await.unwrap(), 1);
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[test]
    fn test_created_at_format() {
        let parsed = parse_created_at("2024-03-01 12:30:00").unwrap();
        assert_eq!(format_created_at(Some(parsed)), "2024-03-01 12:30:00");
        assert!(parse_created_at("yesterday").is_none());
    }
}
