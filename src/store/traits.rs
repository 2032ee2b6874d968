//! Backend-agnostic `Database` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::questionnaire::FinalizedPreferences;

/// A generated itinerary saved against its preference record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredItinerary {
    pub preferences_id: Uuid,
    pub model: String,
    /// Raw model output, before formatting.
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Preferences ─────────────────────────────────────────────────

    /// Append a finalized record. Records are never updated.
    async fn insert_preferences(&self, prefs: &FinalizedPreferences) -> Result<(), DatabaseError>;

    async fn get_preferences(&self, id: Uuid) -> Result<Option<FinalizedPreferences>, DatabaseError>;

    /// A user's records, most recent first.
    async fn list_preferences(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<FinalizedPreferences>, DatabaseError>;

    // ── Itineraries ─────────────────────────────────────────────────

    async fn save_itinerary(&self, itinerary: &StoredItinerary) -> Result<(), DatabaseError>;

    async fn get_itinerary(
        &self,
        preferences_id: Uuid,
    ) -> Result<Option<StoredItinerary>, DatabaseError>;
}
