//! Axum route handlers for the Message Generation API.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::generation::generator::MessageGenerator;
use crate::generation::parameters::{
    expected_count, experiment_combos, load_experiment, load_templates, resolve_parameters,
};
use crate::generation::progress::ProgressReporter;
use crate::generation::rotation::StdRandomSource;
use crate::generation::store::{MessageStore, PgMessageStore};
use crate::generation::tracking::build_provisioner;
use crate::models::message::MessageSummary;
use crate::state::AppState;

pub const DEFAULT_PAGE_SIZE: u32 = 90;
const MAX_PAGE_SIZE: u32 = 500;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub generated_count: usize,
    pub degraded_count: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct MessageCountResponse {
    /// cycles × valid combos × templates for the current configuration.
    pub expected_count: usize,
    /// Messages currently persisted.
    pub generated_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct MessageListResponse {
    pub messages: Vec<MessageSummary>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/experiments/:id/messages/generate
///
/// Replaces every generated message for the experiment. Progress is published
/// on the configured channel while the run is in flight.
pub async fn handle_generate_messages(
    State(state): State<AppState>,
    Path(experiment_id): Path<Uuid>,
) -> Result<Json<GenerateResponse>, AppError> {
    let params = resolve_parameters(&state.db, experiment_id).await?;

    let provisioner = build_provisioner(
        params.tracking_mode,
        &state.click_meter,
        state.tracking_gate.clone(),
        state.config.tracking_gate_capacity(),
    );
    let reporter = ProgressReporter::new(
        state.progress.clone(),
        state.config.progress_channel.clone(),
        state.config.progress_timeout,
    );

    let summary = MessageGenerator::new(
        Arc::new(PgMessageStore::new(state.db.clone())),
        provisioner,
        state.profile_selector.clone(),
        reporter,
        Box::new(StdRandomSource::from_entropy()),
        state.run_locks.clone(),
    )
    .with_failure_policy(state.config.tracking_failure_policy)
    .run(&params)
    .await?;

    Ok(Json(GenerateResponse {
        generated_count: summary.generated_count,
        degraded_count: summary.degraded_count,
        duration_ms: summary.duration.as_millis() as u64,
    }))
}

/// GET /api/v1/experiments/:id/messages/count
pub async fn handle_message_count(
    State(state): State<AppState>,
    Path(experiment_id): Path<Uuid>,
) -> Result<Json<MessageCountResponse>, AppError> {
    let experiment = load_experiment(&state.db, experiment_id).await?;
    let templates = load_templates(&state.db, experiment_id).await?;
    let combos = experiment_combos(&experiment)?;
    let cycles = experiment.number_of_cycles.max(0) as u32;

    let generated_count = PgMessageStore::new(state.db.clone())
        .count_messages(experiment_id)
        .await?;

    Ok(Json(MessageCountResponse {
        expected_count: expected_count(cycles, combos.len(), templates.len()),
        generated_count,
    }))
}

/// GET /api/v1/experiments/:id/messages?page=&per_page=
///
/// Generated messages ordered by scheduled time. Pages start at 1.
pub async fn handle_list_messages(
    State(state): State<AppState>,
    Path(experiment_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<Json<MessageListResponse>, AppError> {
    let (page, per_page) = page_window(&query)?;

    // 404 for unknown experiments rather than an empty page
    load_experiment(&state.db, experiment_id).await?;

    let store = PgMessageStore::new(state.db.clone());
    let total = store.count_messages(experiment_id).await?;
    let rows = store
        .list_messages(
            experiment_id,
            i64::from(per_page),
            i64::from(page - 1) * i64::from(per_page),
        )
        .await?;

    Ok(Json(MessageListResponse {
        messages: rows.into_iter().map(MessageSummary::from).collect(),
        page,
        per_page,
        total,
    }))
}

fn page_window(query: &ListQuery) -> Result<(u32, u32), AppError> {
    let page = query.page.unwrap_or(1);
    let per_page = query.per_page.unwrap_or(DEFAULT_PAGE_SIZE);
    if page == 0 {
        return Err(AppError::Validation("page starts at 1".to_string()));
    }
    if per_page == 0 || per_page > MAX_PAGE_SIZE {
        return Err(AppError::Validation(format!(
            "per_page must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }
    Ok((page, per_page))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_window_defaults() {
        let window = page_window(&ListQuery {
            page: None,
            per_page: None,
        })
        .unwrap();
        assert_eq!(window, (1, DEFAULT_PAGE_SIZE));
    }

    #[test]
    fn test_page_window_rejects_zero_and_oversize() {
        for (page, per_page) in [(Some(0), None), (None, Some(0)), (None, Some(501))] {
            let err = page_window(&ListQuery { page, per_page }).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
    }
}
