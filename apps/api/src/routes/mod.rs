pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::generation::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Message Generation API
        .route(
            "/api/v1/experiments/:id/messages",
            get(handlers::handle_list_messages),
        )
        .route(
            "/api/v1/experiments/:id/messages/count",
            get(handlers::handle_message_count),
        )
        .route(
            "/api/v1/experiments/:id/messages/generate",
            post(handlers::handle_generate_messages),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::extract::{Path, State};
    use axum::http::{Request, StatusCode};
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    use super::*;
    use crate::click_meter::ClickMeterClient;
    use crate::config::Config;
    use crate::generation::generator::ProvisioningFailurePolicy;
    use crate::generation::profile_selector::{build_selector, ProfileSelection};
    use crate::generation::rate_gate::RateGate;
    use crate::generation::run_lock::RunLocks;
    use crate::generation::testing::RecordingChannel;

    /// State whose pool never connects; only routes that fail before touching
    /// the database can be exercised.
    fn offline_state() -> AppState {
        let config = Config {
            database_url: "postgres://promoter@127.0.0.1:1/promoter".to_string(),
            redis_url: "redis://127.0.0.1:1".to_string(),
            click_meter_api_key: None,
            click_meter_api_url: "http://127.0.0.1:1".to_string(),
            click_meter_rate_limit: 10,
            throttle_enabled: false,
            rate_gate_max_wait: None,
            progress_channel: "progress".to_string(),
            progress_timeout: Duration::from_millis(50),
            profile_selection: ProfileSelection::RoundRobin,
            tracking_failure_policy: ProvisioningFailurePolicy::Abort,
            port: 0,
            rust_log: "info".to_string(),
        };
        AppState {
            db: PgPoolOptions::new()
                .acquire_timeout(Duration::from_millis(100))
                .connect_lazy(&config.database_url)
                .unwrap(),
            click_meter: ClickMeterClient::new(&config.click_meter_api_url, None).unwrap(),
            tracking_gate: Arc::new(RateGate::new(false, None)),
            profile_selector: build_selector(config.profile_selection),
            progress: Arc::new(RecordingChannel::default()),
            run_locks: RunLocks::new(),
            config,
        }
    }

    #[tokio::test]
    async fn test_health() {
        let response = build_router(offline_state())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["service"], "promoter-api");
    }

    #[tokio::test]
    async fn test_list_rejects_zero_page_size() {
        let uri = format!("/api/v1/experiments/{}/messages?per_page=0", uuid::Uuid::new_v4());
        let response = build_router(offline_state())
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_malformed_experiment_id_is_client_error() {
        let response = build_router(offline_state())
            .oneshot(
                Request::post("/api/v1/experiments/not-a-uuid/messages/generate")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_generate_handler_can_run_on_worker_threads() {
        fn assert_send<T: Send>(_: &T) {}
        let future =
            handlers::handle_generate_messages(State(offline_state()), Path(uuid::Uuid::new_v4()));
        assert_send(&future);
    }

    #[tokio::test]
    async fn test_generate_without_database_is_server_error() {
        let uri = format!("/api/v1/experiments/{}/messages/generate", uuid::Uuid::new_v4());
        let response = build_router(offline_state())
            .oneshot(Request::post(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "DATABASE_ERROR");
    }
}
