//! Parameter Resolver: turns stored experiment configuration into the bundle a
//! generation run consumes. Every configuration problem surfaces here, before
//! anything is persisted or retired.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Tz;
use reqwest::Url;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::generation::calendar::{parse_posting_times, parse_timezone};
use crate::generation::support_matrix::valid_combos;
use crate::models::experiment::{ExperimentRow, ImagePolicy, TrackingLinkMode};
use crate::models::profile::{SocialMediaProfile, SocialMediaProfileRow};
use crate::models::template::MessageTemplateRow;
use crate::models::{Combo, Medium, Platform};

#[derive(Debug, Clone)]
pub struct GenerationParameters {
    pub experiment: ExperimentRow,
    pub combos: Vec<Combo>,
    pub image_policy: ImagePolicy,
    pub cycles: u32,
    /// Batch size: one message per posting time per day.
    pub messages_per_day: usize,
    pub days_between_posting: u32,
    pub posting_times: HashMap<Platform, Vec<NaiveTime>>,
    pub start_date: NaiveDate,
    pub timezone: Tz,
    pub templates: Vec<MessageTemplateRow>,
    pub profiles: Vec<SocialMediaProfile>,
    pub tracking_mode: TrackingLinkMode,
    pub total_count: usize,
}

impl GenerationParameters {
    pub fn from_parts(
        experiment: ExperimentRow,
        templates: Vec<MessageTemplateRow>,
        profiles: Vec<SocialMediaProfile>,
    ) -> Result<Self, AppError> {
        let combos = experiment_combos(&experiment)?;
        if combos.is_empty() {
            return Err(AppError::Configuration(
                "No valid platform and medium combination is selected".to_string(),
            ));
        }
        if templates.is_empty() {
            return Err(AppError::Configuration(
                "The experiment has no message templates".to_string(),
            ));
        }

        let cycles = positive(experiment.number_of_cycles, "Number of cycles")?;
        let messages_per_day =
            positive(experiment.messages_per_network_per_day, "Messages per network per day")?
                as usize;
        let days_between_posting = positive(experiment.days_between_posting, "Days between posting")?;

        let mut posting_times = HashMap::new();
        for combo in &combos {
            if posting_times.contains_key(&combo.platform) {
                continue;
            }
            let raw = posting_times_for(&experiment, combo.platform).ok_or_else(|| {
                AppError::Configuration(format!("No posting times set for {}", combo.platform))
            })?;
            let times = parse_posting_times(raw)?;
            if times.len() != messages_per_day {
                return Err(AppError::Configuration(format!(
                    "{} has {} posting times but {} messages per day are required",
                    combo.platform,
                    times.len(),
                    messages_per_day
                )));
            }
            posting_times.insert(combo.platform, times);
        }

        let timezone = parse_timezone(&experiment.timezone)?;
        let image_policy: ImagePolicy = experiment.image_policy.parse()?;
        let tracking_mode: TrackingLinkMode = experiment.tracking_link_mode.parse()?;

        if tracking_mode == TrackingLinkMode::ExternalService
            && (experiment.click_meter_group_id.is_none()
                || experiment.click_meter_domain_id.is_none())
        {
            return Err(AppError::Configuration(
                "Tracked links need a Click Meter group and domain".to_string(),
            ));
        }
        Url::parse(&experiment.promoted_website_url).map_err(|e| {
            AppError::Configuration(format!(
                "Invalid promoted website URL '{}': {e}",
                experiment.promoted_website_url
            ))
        })?;

        let total_count = expected_count(cycles, combos.len(), templates.len());

        Ok(Self {
            start_date: experiment.message_distribution_start_date,
            experiment,
            combos,
            image_policy,
            cycles,
            messages_per_day,
            days_between_posting,
            posting_times,
            timezone,
            templates,
            profiles,
            tracking_mode,
            total_count,
        })
    }
}

/// cycles × |valid combos| × template_count
pub fn expected_count(cycles: u32, combo_count: usize, template_count: usize) -> usize {
    cycles as usize * combo_count * template_count
}

/// Selected combos that pass the support matrix, platforms outer and mediums inner.
pub fn experiment_combos(experiment: &ExperimentRow) -> Result<Vec<Combo>, AppError> {
    let platforms: Vec<Platform> = dedup(
        experiment
            .platforms
            .iter()
            .map(|p| p.parse())
            .collect::<Result<_, _>>()?,
    );
    let mediums: Vec<Medium> = dedup(
        experiment
            .mediums
            .iter()
            .map(|m| m.parse())
            .collect::<Result<_, _>>()?,
    );
    Ok(valid_combos(&platforms, &mediums))
}

fn dedup<T: PartialEq>(items: Vec<T>) -> Vec<T> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn positive(value: i32, name: &str) -> Result<u32, AppError> {
    if value < 1 {
        return Err(AppError::Configuration(format!(
            "{name} must be at least 1, got {value}"
        )));
    }
    Ok(value as u32)
}

fn posting_times_for(experiment: &ExperimentRow, platform: Platform) -> Option<&str> {
    match platform {
        Platform::Facebook => experiment.facebook_posting_times.as_deref(),
        Platform::Instagram => experiment.instagram_posting_times.as_deref(),
        Platform::Twitter => experiment.twitter_posting_times.as_deref(),
    }
}

pub async fn load_experiment(pool: &PgPool, experiment_id: Uuid) -> Result<ExperimentRow, AppError> {
    sqlx::query_as::<_, ExperimentRow>(
        r#"
        SELECT id, name, message_distribution_start_date, timezone, number_of_cycles,
               messages_per_network_per_day, days_between_posting, platforms, mediums,
               image_policy, facebook_posting_times, instagram_posting_times,
               twitter_posting_times, tracking_link_mode, click_meter_group_id,
               click_meter_domain_id, promoted_website_url, created_at
        FROM experiments
        WHERE id = $1
        "#,
    )
    .bind(experiment_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Experiment {experiment_id} not found")))
}

pub async fn load_templates(
    pool: &PgPool,
    experiment_id: Uuid,
) -> Result<Vec<MessageTemplateRow>, AppError> {
    let templates = sqlx::query_as::<_, MessageTemplateRow>(
        r#"
        SELECT id, experiment_id, content, image_pool, hashtags, created_at
        FROM message_templates
        WHERE experiment_id = $1
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(experiment_id)
    .fetch_all(pool)
    .await?;
    Ok(templates)
}

pub async fn load_profiles(
    pool: &PgPool,
    experiment_id: Uuid,
) -> Result<Vec<SocialMediaProfile>, AppError> {
    let rows = sqlx::query_as::<_, SocialMediaProfileRow>(
        r#"
        SELECT id, experiment_id, name, platform, allowed_mediums
        FROM social_media_profiles
        WHERE experiment_id = $1
        ORDER BY name ASC
        "#,
    )
    .bind(experiment_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(SocialMediaProfile::try_from).collect()
}

/// Loads and validates everything a run needs for one experiment.
pub async fn resolve_parameters(
    pool: &PgPool,
    experiment_id: Uuid,
) -> Result<GenerationParameters, AppError> {
    let experiment = load_experiment(pool, experiment_id).await?;
    let templates = load_templates(pool, experiment_id).await?;
    let profiles = load_profiles(pool, experiment_id).await?;
    GenerationParameters::from_parts(experiment, templates, profiles)
}
