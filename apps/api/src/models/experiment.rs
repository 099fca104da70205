use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExperimentRow {
    pub id: Uuid,
    pub name: String,
    pub message_distribution_start_date: NaiveDate,
    /// IANA zone name, e.g. "America/Los_Angeles".
    pub timezone: String,
    pub number_of_cycles: i32,
    pub messages_per_network_per_day: i32,
    pub days_between_posting: i32,
    pub platforms: Vec<String>,
    pub mediums: Vec<String>,
    pub image_policy: String,
    pub facebook_posting_times: Option<String>,
    pub instagram_posting_times: Option<String>,
    pub twitter_posting_times: Option<String>,
    pub tracking_link_mode: String,
    pub click_meter_group_id: Option<i64>,
    pub click_meter_domain_id: Option<i64>,
    pub promoted_website_url: String,
    pub created_at: DateTime<Utc>,
}

impl ExperimentRow {
    /// URL-safe identifier used in campaign parameters, e.g. "TCORS 2" → "tcors-2".
    pub fn to_param(&self) -> String {
        parameterize(&self.name)
    }
}

/// Whether generated messages carry an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImagePolicy {
    None,
    All,
    /// Presence is decided per (template, cycle).
    Mixed,
}

impl FromStr for ImagePolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "none" | "no_messages" => Ok(ImagePolicy::None),
            "all" | "all_messages" => Ok(ImagePolicy::All),
            "mixed" => Ok(ImagePolicy::Mixed),
            other => Err(AppError::Configuration(format!("Unknown image policy '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingLinkMode {
    ExternalService,
    Local,
}

impl FromStr for TrackingLinkMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "external_service" | "click_meter" => Ok(TrackingLinkMode::ExternalService),
            "local" => Ok(TrackingLinkMode::Local),
            other => Err(AppError::Configuration(format!(
                "Unknown tracking link mode '{other}'"
            ))),
        }
    }
}

pub fn parameterize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}
