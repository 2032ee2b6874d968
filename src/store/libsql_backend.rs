//! libSQL implementation of the `Database` trait.
//!
//! Supports local file and in-memory databases. Preference records are
//! stored as a JSON payload next to the columns used for lookup.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, Row, Rows, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::questionnaire::FinalizedPreferences;
use crate::store::migrations;
use crate::store::traits::{Database, StoredItinerary};

/// One shared connection; libSQL connections are safe to use concurrently.
pub struct LibSqlBackend {
    conn: Connection,
    // Owns the database the connection was opened from.
    _db: LibSqlDatabase,
}

impl LibSqlBackend {
    /// Open or create the database file at `path`, creating parent
    /// directories as needed, and migrate it.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| {
                DatabaseError::Pool(format!("create directory {}: {e}", dir.display()))
            })?;
        }
        let backend = Self::open(path).await?;
        info!(path = %path.display(), "Trip database ready");
        Ok(backend)
    }

    /// Throwaway in-memory database.
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        Self::open(Path::new(":memory:")).await
    }

    async fn open(target: &Path) -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(target)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("open {}: {e}", target.display())))?;
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("connect: {e}")))?;

        let backend = Self { conn, _db: db };
        backend.run_migrations().await?;
        Ok(backend)
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Serialization(format!("timestamp '{raw}': {e}")))
}

async fn next_row(rows: &mut Rows, op: &str) -> Result<Option<Row>, DatabaseError> {
    rows.next()
        .await
        .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))
}

fn row_text(row: &Row, idx: i32, op: &str) -> Result<String, DatabaseError> {
    row.get::<String>(idx)
        .map_err(|e| DatabaseError::Query(format!("{op}: column {idx}: {e}")))
}

fn parse_payload(payload: &str) -> Result<FinalizedPreferences, DatabaseError> {
    serde_json::from_str(payload).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(&self.conn).await
    }

    async fn insert_preferences(&self, prefs: &FinalizedPreferences) -> Result<(), DatabaseError> {
        let payload =
            serde_json::to_string(prefs).map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        self.conn
            .execute(
                "INSERT INTO travel_preferences (id, user_id, payload, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    prefs.id.to_string(),
                    prefs.user_id.as_str(),
                    payload,
                    prefs.created_at.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_preferences: {e}")))?;

        debug!(id = %prefs.id, user_id = %prefs.user_id, "Stored travel preferences");
        Ok(())
    }

    async fn get_preferences(&self, id: Uuid) -> Result<Option<FinalizedPreferences>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT payload FROM travel_preferences WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_preferences: {e}")))?;

        match next_row(&mut rows, "get_preferences").await? {
            Some(row) => parse_payload(&row_text(&row, 0, "get_preferences")?).map(Some),
            None => Ok(None),
        }
    }

    async fn list_preferences(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<FinalizedPreferences>, DatabaseError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut rows = self
            .conn
            .query(
                "SELECT payload FROM travel_preferences
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2",
                params![user_id, limit],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_preferences: {e}")))?;

        let mut records = Vec::new();
        while let Some(row) = next_row(&mut rows, "list_preferences").await? {
            records.push(parse_payload(&row_text(&row, 0, "list_preferences")?)?);
        }
        Ok(records)
    }

    async fn save_itinerary(&self, itinerary: &StoredItinerary) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT INTO itineraries (preferences_id, model, content, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (preferences_id) DO UPDATE SET
                    model = ?2, content = ?3, created_at = ?4",
                params![
                    itinerary.preferences_id.to_string(),
                    itinerary.model.as_str(),
                    itinerary.content.as_str(),
                    itinerary.created_at.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_itinerary: {e}")))?;
        Ok(())
    }

    async fn get_itinerary(
        &self,
        preferences_id: Uuid,
    ) -> Result<Option<StoredItinerary>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT model, content, created_at FROM itineraries WHERE preferences_id = ?1",
                params![preferences_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_itinerary: {e}")))?;

        let Some(row) = next_row(&mut rows, "get_itinerary").await? else {
            return Ok(None);
        };
        Ok(Some(StoredItinerary {
            preferences_id,
            model: row_text(&row, 0, "get_itinerary")?,
            content: row_text(&row, 1, "get_itinerary")?,
            created_at: parse_timestamp(&row_text(&row, 2, "get_itinerary")?)?,
        }))
    }
}
