use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{Medium, Platform};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SocialMediaProfileRow {
    pub id: Uuid,
    pub experiment_id: Uuid,
    pub name: String,
    pub platform: String,
    pub allowed_mediums: Vec<String>,
}

/// A target account, typed for matching against combos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialMediaProfile {
    pub id: Uuid,
    pub name: String,
    pub platform: Platform,
    pub allowed_mediums: Vec<Medium>,
}

impl SocialMediaProfile {
    pub fn can_post(&self, platform: Platform, medium: Medium) -> bool {
        self.platform == platform && self.allowed_mediums.contains(&medium)
    }
}

impl TryFrom<SocialMediaProfileRow> for SocialMediaProfile {
    type Error = AppError;

    fn try_from(row: SocialMediaProfileRow) -> Result<Self, Self::Error> {
        let allowed_mediums = row
            .allowed_mediums
            .iter()
            .map(|m| m.parse::<Medium>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SocialMediaProfile {
            id: row.id,
            name: row.name,
            platform: row.platform.parse()?,
            allowed_mediums,
        })
    }
}
