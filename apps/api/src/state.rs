use std::sync::Arc;

use sqlx::PgPool;

use crate::click_meter::ClickMeterClient;
use crate::config::Config;
use crate::generation::profile_selector::ProfileSelector;
use crate::generation::progress::ProgressChannel;
use crate::generation::rate_gate::RateGate;
use crate::generation::run_lock::RunLocks;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub click_meter: ClickMeterClient,
    /// One gate per process: the tracking service limit applies to the API key,
    /// not to a single run.
    pub tracking_gate: Arc<RateGate>,
    /// Pluggable profile selection. Default: round robin. Swap via PROFILE_SELECTION.
    pub profile_selector: Arc<dyn ProfileSelector>,
    /// Redis PUBLISH in production.
    pub progress: Arc<dyn ProgressChannel>,
    /// Serializes generation runs per experiment.
    pub run_locks: RunLocks,
}
