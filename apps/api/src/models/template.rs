use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Placeholder replaced by the tracking (or destination) URL.
pub const URL_PLACEHOLDER: &str = "{url}";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MessageTemplateRow {
    pub id: Uuid,
    pub experiment_id: Uuid,
    pub content: String,
    pub image_pool: Vec<Uuid>,
    /// Comma-delimited, e.g. "#quit,#smokefree".
    pub hashtags: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MessageTemplateRow {
    pub fn hashtag_list(&self) -> Vec<&str> {
        self.hashtags
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .collect()
    }
}
