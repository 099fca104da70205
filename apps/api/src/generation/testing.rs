//! Fakes and fixtures shared by the generation tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::errors::AppError;
use crate::generation::progress::ProgressChannel;
use crate::generation::rate_gate::RateGate;
use crate::generation::rotation::RandomSource;
use crate::generation::store::MessageStore;
use crate::generation::tracking::{Provisioned, TrackingLinkProvisioner};
use crate::models::experiment::{ExperimentRow, TrackingLinkMode};
use crate::models::message::{MessageRow, NewMessage, NewTrackingLink, TrackingLinkRow};
use crate::models::profile::SocialMediaProfile;
use crate::models::template::MessageTemplateRow;
use crate::models::{Medium, Platform};

// ────────────────────────────────────────────────────────────────────────────
// Randomness
// ────────────────────────────────────────────────────────────────────────────

/// Replays scripted draws. Permutations of length 0 or 1 are never taken from
/// the script; exhausted scripts fall back to identity, index 0 and heads.
#[derive(Debug, Default)]
pub struct ScriptedRandomSource {
    permutations: VecDeque<Vec<usize>>,
    indices: VecDeque<usize>,
    coins: VecDeque<bool>,
}

impl ScriptedRandomSource {
    pub fn new(permutations: Vec<Vec<usize>>) -> Self {
        Self {
            permutations: permutations.into(),
            ..Self::default()
        }
    }

    pub fn with_indices(mut self, indices: Vec<usize>) -> Self {
        self.indices = indices.into();
        self
    }

    pub fn with_coins(mut self, coins: Vec<bool>) -> Self {
        self.coins = coins.into();
        self
    }
}

impl RandomSource for ScriptedRandomSource {
    fn permutation(&mut self, len: usize) -> Vec<usize> {
        if len > 1 {
            if let Some(order) = self.permutations.pop_front() {
                assert_eq!(order.len(), len, "scripted permutation has the wrong length");
                return order;
            }
        }
        (0..len).collect()
    }

    fn index(&mut self, len: usize) -> usize {
        self.indices.pop_front().unwrap_or(0) % len
    }

    fn coin(&mut self) -> bool {
        self.coins.pop_front().unwrap_or(true)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Fixtures
// ────────────────────────────────────────────────────────────────────────────

pub fn make_templates(n: usize) -> Vec<MessageTemplateRow> {
    let experiment_id = Uuid::new_v4();
    (0..n)
        .map(|i| MessageTemplateRow {
            id: Uuid::new_v4(),
            experiment_id,
            content: format!("Template {i} {{url}}"),
            image_pool: vec![],
            hashtags: None,
            created_at: Utc.timestamp_opt(1_490_000_000 + i as i64, 0).unwrap(),
        })
        .collect()
}

/// One cycle of facebook ads, one message a day at 12:30 PM Pacific from 2017-04-10.
pub fn make_experiment(mode: TrackingLinkMode) -> ExperimentRow {
    ExperimentRow {
        id: Uuid::new_v4(),
        name: "TCORS 2".to_string(),
        message_distribution_start_date: NaiveDate::from_ymd_opt(2017, 4, 10).unwrap(),
        timezone: "America/Los_Angeles".to_string(),
        number_of_cycles: 1,
        messages_per_network_per_day: 1,
        days_between_posting: 1,
        platforms: vec!["facebook".to_string()],
        mediums: vec!["ad".to_string()],
        image_policy: "none".to_string(),
        facebook_posting_times: Some("12:30 PM".to_string()),
        instagram_posting_times: Some("12:30 PM".to_string()),
        twitter_posting_times: Some("12:30 PM".to_string()),
        tracking_link_mode: match mode {
            TrackingLinkMode::ExternalService => "external_service",
            TrackingLinkMode::Local => "local",
        }
        .to_string(),
        click_meter_group_id: Some(1),
        click_meter_domain_id: Some(2),
        promoted_website_url: "https://quit.example.org/start".to_string(),
        created_at: Utc::now(),
    }
}

pub fn make_new_message(experiment: &ExperimentRow) -> NewMessage {
    NewMessage {
        id: Uuid::new_v4(),
        experiment_id: experiment.id,
        message_template_id: Uuid::new_v4(),
        platform: Platform::Facebook,
        medium: Medium::Ad,
        cycle: 0,
        image_id: None,
        content: "Quit today {url}".to_string(),
        promoted_website_url: format!("{}?utm_source=facebook", experiment.promoted_website_url),
        scheduled_date_time: Utc::now(),
        social_media_profile_id: Uuid::new_v4(),
    }
}

pub fn make_profile(platform: Platform, mediums: &[Medium]) -> SocialMediaProfile {
    SocialMediaProfile {
        id: Uuid::new_v4(),
        name: format!("{platform} account"),
        platform,
        allowed_mediums: mediums.to_vec(),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Fakes
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingChannel {
    published: Mutex<Vec<(String, Value)>>,
}

impl RecordingChannel {
    pub fn published(&self) -> Vec<(String, Value)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressChannel for RecordingChannel {
    async fn publish(&self, channel: &str, payload: Value) -> anyhow::Result<()> {
        self.published
            .lock()
            .unwrap()
            .push((channel.to_string(), payload));
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryMessageStore {
    messages: Mutex<Vec<MessageRow>>,
    links: Mutex<Vec<TrackingLinkRow>>,
    fail_retirement: AtomicBool,
}

impl InMemoryMessageStore {
    pub fn messages(&self) -> Vec<MessageRow> {
        self.messages.lock().unwrap().clone()
    }

    pub fn links(&self) -> Vec<TrackingLinkRow> {
        self.links.lock().unwrap().clone()
    }

    pub fn fail_retirement(&self, fail: bool) {
        self.fail_retirement.store(fail, Ordering::SeqCst);
    }

    fn message_ids(&self, experiment_id: Uuid) -> Vec<Uuid> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.experiment_id == experiment_id)
            .map(|m| m.id)
            .collect()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn tracking_links(&self, experiment_id: Uuid) -> Result<Vec<TrackingLinkRow>, AppError> {
        tokio::task::yield_now().await;
        let ids = self.message_ids(experiment_id);
        Ok(self
            .links
            .lock()
            .unwrap()
            .iter()
            .filter(|l| ids.contains(&l.message_id))
            .cloned()
            .collect())
    }

    async fn retire_messages(&self, experiment_id: Uuid) -> Result<u64, AppError> {
        tokio::task::yield_now().await;
        if self.fail_retirement.load(Ordering::SeqCst) {
            return Err(AppError::Internal(anyhow::anyhow!("store unavailable")));
        }
        let ids = self.message_ids(experiment_id);
        self.links
            .lock()
            .unwrap()
            .retain(|l| !ids.contains(&l.message_id));
        self.messages
            .lock()
            .unwrap()
            .retain(|m| m.experiment_id != experiment_id);
        Ok(ids.len() as u64)
    }

    async fn insert_message(&self, message: &NewMessage) -> Result<(), AppError> {
        // Store calls yield, as a database round trip would.
        tokio::task::yield_now().await;
        self.messages.lock().unwrap().push(MessageRow {
            id: message.id,
            experiment_id: message.experiment_id,
            message_template_id: message.message_template_id,
            platform: message.platform.as_str().to_string(),
            medium: message.medium.as_str().to_string(),
            cycle: message.cycle as i32,
            image_present: message.image_present().to_string(),
            image_id: message.image_id,
            content: message.content.clone(),
            promoted_website_url: message.promoted_website_url.clone(),
            scheduled_date_time: message.scheduled_date_time,
            social_media_profile_id: message.social_media_profile_id,
            publish_status: "pending".to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn finalize_message(
        &self,
        message_id: Uuid,
        content: &str,
        link: Option<&NewTrackingLink>,
    ) -> Result<(), AppError> {
        let mut messages = self.messages.lock().unwrap();
        let message = messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| AppError::NotFound(format!("Message {message_id} not found")))?;
        message.content = content.to_string();

        if let Some(link) = link {
            self.links.lock().unwrap().push(TrackingLinkRow {
                id: Uuid::new_v4(),
                message_id,
                remote_id: link.remote_id.clone(),
                remote_uri: link.remote_uri.clone(),
                tracking_url: link.tracking_url.clone(),
                destination_url: link.destination_url.clone(),
            });
        }
        Ok(())
    }

    async fn count_messages(&self, experiment_id: Uuid) -> Result<i64, AppError> {
        Ok(self.message_ids(experiment_id).len() as i64)
    }

    async fn list_messages(
        &self,
        experiment_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MessageRow>, AppError> {
        let mut rows: Vec<MessageRow> = self
            .messages()
            .into_iter()
            .filter(|m| m.experiment_id == experiment_id)
            .collect();
        rows.sort_by_key(|m| m.scheduled_date_time);
        Ok(rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }
}

/// Stands in for the tracking service. In external mode it passes the gate
/// twice per provisioned link and once per retirement, like the real client.
pub struct RecordingProvisioner {
    mode: TrackingLinkMode,
    gate: Arc<RateGate>,
    provisioned: AtomicUsize,
    /// 1-based provision call that fails; 0 means never.
    fail_on: AtomicUsize,
    retired: Mutex<Vec<String>>,
}

impl RecordingProvisioner {
    pub fn new(mode: TrackingLinkMode, gate: Arc<RateGate>) -> Self {
        Self {
            mode,
            gate,
            provisioned: AtomicUsize::new(0),
            fail_on: AtomicUsize::new(0),
            retired: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_on(&self, call: usize) {
        self.fail_on.store(call, Ordering::SeqCst);
    }

    pub fn retired(&self) -> Vec<String> {
        self.retired.lock().unwrap().clone()
    }
}

#[async_trait]
impl TrackingLinkProvisioner for RecordingProvisioner {
    async fn provision(
        &self,
        _experiment: &ExperimentRow,
        message: &NewMessage,
    ) -> Result<Provisioned, AppError> {
        if self.mode == TrackingLinkMode::Local {
            return Ok(Provisioned::Direct(message.promoted_website_url.clone()));
        }

        let call = self.provisioned.fetch_add(1, Ordering::SeqCst) + 1;
        self.gate.acquire(9).await?;
        if self.fail_on.load(Ordering::SeqCst) == call {
            return Err(AppError::Provisioning(format!("create call {call} rejected")));
        }
        self.gate.acquire(9).await?;

        Ok(Provisioned::Tracked(NewTrackingLink {
            remote_id: call.to_string(),
            remote_uri: format!("/datapoints/{call}"),
            tracking_url: format!("https://trk.example.com/{call}"),
            destination_url: message.promoted_website_url.clone(),
        }))
    }

    async fn retire(&self, link: &TrackingLinkRow) -> Result<(), AppError> {
        if self.mode == TrackingLinkMode::ExternalService {
            self.gate.acquire(9).await?;
        }
        self.retired.lock().unwrap().push(link.remote_id.clone());
        Ok(())
    }

    fn mode(&self) -> TrackingLinkMode {
        self.mode
    }
}

/// Tracking service on a local port. Datapoint ids start at 100; lookups and
/// deletes answer with the configured status.
#[derive(Clone)]
pub struct StubTrackingService {
    next_id: Arc<AtomicI64>,
    deleted: Arc<Mutex<Vec<i64>>>,
    lookup_status: StatusCode,
    delete_status: StatusCode,
}

impl StubTrackingService {
    pub fn new() -> Self {
        Self {
            next_id: Arc::new(AtomicI64::new(100)),
            deleted: Arc::new(Mutex::new(Vec::new())),
            lookup_status: StatusCode::OK,
            delete_status: StatusCode::OK,
        }
    }

    pub fn lookup_status(mut self, status: StatusCode) -> Self {
        self.lookup_status = status;
        self
    }

    pub fn delete_status(mut self, status: StatusCode) -> Self {
        self.delete_status = status;
        self
    }

    /// Every datapoint id a DELETE was received for, whatever the answer.
    pub fn deleted(&self) -> Vec<i64> {
        self.deleted.lock().unwrap().clone()
    }

    /// Serves the stub and returns its base URL.
    pub async fn serve(&self) -> String {
        let router = Router::new()
            .route("/datapoints", post(stub_create))
            .route("/datapoints/:id", get(stub_lookup).delete(stub_delete))
            .with_state(self.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}")
    }
}

async fn stub_create(State(stub): State<StubTrackingService>) -> Json<Value> {
    let id = stub.next_id.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "id": id, "uri": format!("/datapoints/{id}") }))
}

async fn stub_lookup(State(stub): State<StubTrackingService>, Path(id): Path<i64>) -> Response {
    if stub.lookup_status != StatusCode::OK {
        return (stub.lookup_status, Json(json!({ "errorMessage": "Lookup failed" }))).into_response();
    }
    Json(json!({
        "id": id,
        "trackingCode": format!("https://trk.example.com/{id}"),
        "typeTL": { "url": "https://quit.example.org/start" },
    }))
    .into_response()
}

async fn stub_delete(State(stub): State<StubTrackingService>, Path(id): Path<i64>) -> Response {
    stub.deleted.lock().unwrap().push(id);
    if stub.delete_status != StatusCode::OK {
        return (stub.delete_status, Json(json!({ "errorMessage": "Datapoint not found" })))
            .into_response();
    }
    StatusCode::OK.into_response()
}

pub fn make_link_row(message_id: Uuid, remote_id: i64) -> TrackingLinkRow {
    TrackingLinkRow {
        id: Uuid::new_v4(),
        message_id,
        remote_id: remote_id.to_string(),
        remote_uri: format!("/datapoints/{remote_id}"),
        tracking_url: format!("https://trk.example.com/{remote_id}"),
        destination_url: "https://quit.example.org/start".to_string(),
    }
}
