//! Tracking-Link Provisioner: pluggable per experiment.
//!
//! `ClickMeterProvisioner` creates a remote tracking link behind the shared
//! [`RateGate`]; `LocalProvisioner` makes no remote call and hands back the
//! destination URL unchanged.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::click_meter::{ClickMeterClient, ClickMeterError};
use crate::errors::AppError;
use crate::generation::rate_gate::RateGate;
use crate::models::experiment::{ExperimentRow, TrackingLinkMode};
use crate::models::message::{NewMessage, NewTrackingLink, TrackingLinkRow};
use crate::models::{Medium, Platform};

/// Outcome of provisioning: a remote link, or the destination used directly.
#[derive(Debug, Clone, PartialEq)]
pub enum Provisioned {
    Tracked(NewTrackingLink),
    Direct(String),
}

impl Provisioned {
    /// URL substituted for the template placeholder.
    pub fn url(&self) -> &str {
        match self {
            Provisioned::Tracked(link) => &link.tracking_url,
            Provisioned::Direct(url) => url,
        }
    }
}

#[async_trait]
pub trait TrackingLinkProvisioner: Send + Sync {
    async fn provision(
        &self,
        experiment: &ExperimentRow,
        message: &NewMessage,
    ) -> Result<Provisioned, AppError>;

    /// Removes a link left over from an earlier generation.
    async fn retire(&self, link: &TrackingLinkRow) -> Result<(), AppError>;

    fn mode(&self) -> TrackingLinkMode;
}

pub struct ClickMeterProvisioner {
    client: ClickMeterClient,
    gate: Arc<RateGate>,
    capacity_per_second: u32,
}

impl ClickMeterProvisioner {
    pub fn new(client: ClickMeterClient, gate: Arc<RateGate>, capacity_per_second: u32) -> Self {
        Self {
            client,
            gate,
            capacity_per_second,
        }
    }

    /// Best-effort removal of a datapoint that will not be persisted.
    async fn discard(&self, id: i64) {
        let outcome = match self.gate.acquire(self.capacity_per_second).await {
            Ok(()) => self.client.delete_datapoint(id).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(reason) = outcome {
            warn!("Datapoint {id} was created but could not be removed: {reason}");
        }
    }
}

#[async_trait]
impl TrackingLinkProvisioner for ClickMeterProvisioner {
    async fn provision(
        &self,
        experiment: &ExperimentRow,
        message: &NewMessage,
    ) -> Result<Provisioned, AppError> {
        let (group_id, domain_id) = experiment
            .click_meter_group_id
            .zip(experiment.click_meter_domain_id)
            .ok_or_else(|| {
                AppError::Configuration(
                    "Click Meter group and domain ids are required for tracked links".to_string(),
                )
            })?;
        let title = message_param(&experiment.to_param(), message.id);

        self.gate.acquire(self.capacity_per_second).await?;
        let created = self
            .client
            .create_datapoint(&title, group_id, domain_id, &message.promoted_website_url)
            .await
            .map_err(|e| AppError::Provisioning(format!("create {title}: {e}")))?;

        let lookup = match self.gate.acquire(self.capacity_per_second).await {
            Ok(()) => self.client.get_datapoint(created.id).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        let datapoint = match lookup {
            Ok(datapoint) => datapoint,
            Err(e) => {
                // No row will reference this datapoint, so nothing could retire it later.
                self.discard(created.id).await;
                return Err(AppError::Provisioning(format!("lookup {}: {e}", created.id)));
            }
        };

        Ok(Provisioned::Tracked(NewTrackingLink {
            remote_id: created.id.to_string(),
            remote_uri: created.uri,
            tracking_url: datapoint.tracking_code,
            destination_url: datapoint
                .type_tl
                .map(|t| t.url)
                .unwrap_or_else(|| message.promoted_website_url.clone()),
        }))
    }

    async fn retire(&self, link: &TrackingLinkRow) -> Result<(), AppError> {
        let id: i64 = link.remote_id.parse().map_err(|_| {
            AppError::Provisioning(format!("Malformed remote id '{}'", link.remote_id))
        })?;
        self.gate.acquire(self.capacity_per_second).await?;
        match self.client.delete_datapoint(id).await {
            Ok(()) => Ok(()),
            // Gone already, e.g. removed by an earlier run that failed before its commit.
            Err(ClickMeterError::NotFound(reason)) => {
                debug!("Datapoint {id} already removed: {reason}");
                Ok(())
            }
            Err(e) => Err(AppError::Provisioning(format!("delete {id}: {e}"))),
        }
    }

    fn mode(&self) -> TrackingLinkMode {
        TrackingLinkMode::ExternalService
    }
}

pub struct LocalProvisioner;

#[async_trait]
impl TrackingLinkProvisioner for LocalProvisioner {
    async fn provision(
        &self,
        _experiment: &ExperimentRow,
        message: &NewMessage,
    ) -> Result<Provisioned, AppError> {
        Ok(Provisioned::Direct(message.promoted_website_url.clone()))
    }

    async fn retire(&self, _link: &TrackingLinkRow) -> Result<(), AppError> {
        Ok(())
    }

    fn mode(&self) -> TrackingLinkMode {
        TrackingLinkMode::Local
    }
}

/// Picks the provisioner the experiment's tracking mode calls for.
pub fn build_provisioner(
    mode: TrackingLinkMode,
    client: &ClickMeterClient,
    gate: Arc<RateGate>,
    capacity_per_second: u32,
) -> Arc<dyn TrackingLinkProvisioner> {
    match mode {
        TrackingLinkMode::ExternalService => Arc::new(ClickMeterProvisioner::new(
            client.clone(),
            gate,
            capacity_per_second,
        )),
        TrackingLinkMode::Local => Arc::new(LocalProvisioner),
    }
}

/// "{experiment_param}-message-{id}"; also the utm_content of the destination.
pub fn message_param(experiment_param: &str, message_id: Uuid) -> String {
    format!("{experiment_param}-message-{message_id}")
}

/// The promoted website URL tagged with campaign parameters for one message.
pub fn destination_url(
    website_url: &str,
    experiment_param: &str,
    message_id: Uuid,
    platform: Platform,
    medium: Medium,
) -> Result<String, AppError> {
    let mut url = Url::parse(website_url).map_err(|e| {
        AppError::Configuration(format!("Invalid promoted website URL '{website_url}': {e}"))
    })?;
    url.query_pairs_mut()
        .append_pair("utm_source", platform.as_str())
        .append_pair("utm_medium", medium.as_str())
        .append_pair("utm_campaign", experiment_param)
        .append_pair("utm_content", &message_param(experiment_param, message_id));
    Ok(url.into())
}
