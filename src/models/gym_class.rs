use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// A scheduled class instance, owned by the calendar
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GymClass {
    pub id: Uuid,
    pub title: String,
    pub instructor_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_cancelled: bool,
}

impl GymClass {
    /// Whether the class has started as of `now`
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        self.start_time < now
    }

    /// Finds a class by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let class = sqlx::query_as::<_, Self>(
            r#"
            SELECT id, title, instructor_id, start_time, end_time, is_cancelled
            FROM gym_classes
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(class)
    }
}
