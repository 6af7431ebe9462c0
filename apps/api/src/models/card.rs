use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BusinessCardRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub slug: String,
    pub full_name: String,
    pub title: Option<String>,
    pub company: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub bio: Option<String>,
    pub theme: String,
    pub is_public: bool,
    pub view_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What anonymous visitors see: no owner id, no counters.
#[derive(Debug, Clone, Serialize)]
pub struct PublicCard {
    pub slug: String,
    pub full_name: String,
    pub title: Option<String>,
    pub company: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub bio: Option<String>,
    pub theme: String,
}

impl From<BusinessCardRow> for PublicCard {
    fn from(row: BusinessCardRow) -> Self {
        Self {
            slug: row.slug,
            full_name: row.full_name,
            title: row.title,
            company: row.company,
            email: row.email,
            phone: row.phone,
            website: row.website,
            bio: row.bio,
            theme: row.theme,
        }
    }
}
