//! Schema migrations.
//!
//! Versions are recorded in `schema_versions`. Each pending migration runs in
//! its own transaction together with its version row, so a failed step
//! leaves the schema at the previous version.

use libsql::Connection;
use tracing::{debug, info};

use crate::error::DatabaseError;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// Ordered; append only.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "travel_preferences",
        sql: "CREATE TABLE travel_preferences (
                  id TEXT PRIMARY KEY,
                  user_id TEXT NOT NULL,
                  payload TEXT NOT NULL,
                  created_at TEXT NOT NULL
              );
              CREATE INDEX idx_travel_preferences_user
                  ON travel_preferences(user_id, created_at);",
    },
    Migration {
        version: 2,
        name: "generated_itineraries",
        sql: "CREATE TABLE itineraries (
                  preferences_id TEXT PRIMARY KEY
                      REFERENCES travel_preferences(id) ON DELETE CASCADE,
                  model TEXT NOT NULL,
                  content TEXT NOT NULL,
                  created_at TEXT NOT NULL
              );",
    },
];

pub fn latest_version() -> i64 {
    MIGRATIONS.iter().map(|m| m.version).max().unwrap_or(0)
}

/// Bring the schema up to [`latest_version`].
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_versions (
             version INTEGER PRIMARY KEY,
             name TEXT NOT NULL,
             applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
         );",
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("schema_versions: {e}")))?;

    let applied = schema_version(conn).await?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > applied).collect();
    if pending.is_empty() {
        debug!(version = applied, "Schema is current");
        return Ok(());
    }

    for migration in pending {
        apply(conn, migration).await?;
        info!(version = migration.version, name = migration.name, "Applied migration");
    }
    Ok(())
}

async fn apply(conn: &Connection, migration: &Migration) -> Result<(), DatabaseError> {
    // Version and name are constants.
    let batch = format!(
        "BEGIN;\n{}\nINSERT INTO schema_versions (version, name) VALUES ({}, '{}');\nCOMMIT;",
        migration.sql, migration.version, migration.name
    );
    if let Err(e) = conn.execute_batch(&batch).await {
        // The transaction may never have opened.
        let _ = conn.execute_batch("ROLLBACK;").await;
        return Err(DatabaseError::Migration(format!(
            "V{} {}: {e}",
            migration.version, migration.name
        )));
    }
    Ok(())
}

/// Highest applied version, 0 on a fresh database.
pub(crate) async fn schema_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_versions", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("schema_version: {e}")))?;

    let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("schema_version: {e}")))?
    else {
        return Ok(0);
    };
    row.get::<i64>(0)
        .map_err(|e| DatabaseError::Migration(format!("schema_version: {e}")))
}
