use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::{Medium, Platform};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MessageRow {
    pub id: Uuid,
    pub experiment_id: Uuid,
    pub message_template_id: Uuid,
    pub platform: String,
    pub medium: String,
    pub cycle: i32,
    /// "with" | "without"
    pub image_present: String,
    pub image_id: Option<Uuid>,
    pub content: String,
    pub promoted_website_url: String,
    pub scheduled_date_time: DateTime<Utc>,
    pub social_media_profile_id: Uuid,
    pub publish_status: String,
    pub created_at: DateTime<Utc>,
}

impl MessageRow {
    /// Campaign ids only exist for Facebook and Instagram ads.
    pub fn campaign_id_applicable(&self) -> bool {
        self.medium == Medium::Ad.as_str()
            && (self.platform == Platform::Facebook.as_str()
                || self.platform == Platform::Instagram.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TrackingLinkRow {
    pub id: Uuid,
    pub message_id: Uuid,
    pub remote_id: String,
    pub remote_uri: String,
    pub tracking_url: String,
    pub destination_url: String,
}

/// A fully specified message ready to persist. Content may still hold the URL placeholder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewMessage {
    pub id: Uuid,
    pub experiment_id: Uuid,
    pub message_template_id: Uuid,
    pub platform: Platform,
    pub medium: Medium,
    pub cycle: u32,
    pub image_id: Option<Uuid>,
    pub content: String,
    pub promoted_website_url: String,
    pub scheduled_date_time: DateTime<Utc>,
    pub social_media_profile_id: Uuid,
}

impl NewMessage {
    pub fn image_present(&self) -> &'static str {
        if self.image_id.is_some() {
            "with"
        } else {
            "without"
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTrackingLink {
    pub remote_id: String,
    pub remote_uri: String,
    pub tracking_url: String,
    pub destination_url: String,
}

/// Listing shape for generated messages.
#[derive(Debug, Clone, Serialize)]
pub struct MessageSummary {
    #[serde(flatten)]
    pub message: MessageRow,
    pub campaign_id_applicable: bool,
}

impl From<MessageRow> for MessageSummary {
    fn from(message: MessageRow) -> Self {
        let campaign_id_applicable = message.campaign_id_applicable();
        Self {
            message,
            campaign_id_applicable,
        }
    }
}
