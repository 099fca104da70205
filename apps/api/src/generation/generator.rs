//! Message Generation: orchestrates one full regeneration for an experiment.
//!
//! Flow: eligibility check → retire prior output → for every cycle × combo ×
//!       batch × slot: allocate → pick profile → schedule → persist → report →
//!       provision → finalize → report.
//!
//! A run either completes with exactly `cycles × |combos| × templates` messages
//! or fails. A failed run may leave a partial set behind; regenerating restores
//! a consistent state.

use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::generation::allocation::AllocationCache;
use crate::generation::calendar::CalendarScheduler;
use crate::generation::parameters::GenerationParameters;
use crate::generation::profile_selector::{eligible_profiles, ProfileSelector};
use crate::generation::progress::{ProgressReporter, MESSAGE_GENERATED, TRACKING_LINK_CREATED};
use crate::generation::rotation::{RandomSource, RotationSelector};
use crate::generation::run_lock::RunLocks;
use crate::generation::store::MessageStore;
use crate::generation::tracking::{destination_url, Provisioned, TrackingLinkProvisioner};
use crate::models::message::NewMessage;
use crate::models::template::{MessageTemplateRow, URL_PLACEHOLDER};
use crate::models::Combo;

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

/// What to do when the tracking service fails for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningFailurePolicy {
    /// Fail the run.
    Abort,
    /// Use the destination URL directly and count the message as degraded.
    FallbackToDestination,
}

impl FromStr for ProvisioningFailurePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "abort" => Ok(ProvisioningFailurePolicy::Abort),
            "fallback_direct" => Ok(ProvisioningFailurePolicy::FallbackToDestination),
            other => anyhow::bail!(
                "TRACKING_FAILURE_POLICY must be abort or fallback_direct, got '{other}'"
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationSummary {
    pub generated_count: usize,
    /// Messages that fell back to the destination URL.
    pub degraded_count: usize,
    #[serde(skip)]
    pub duration: Duration,
}

/// Position of one message in the enumeration.
#[derive(Debug, Clone, Copy)]
struct Slot<'a> {
    cycle: u32,
    combo: Combo,
    batch_index: usize,
    slot_index: usize,
    template: &'a MessageTemplateRow,
}

/// Per-run state discarded when the run ends.
struct RunState {
    allocations: AllocationCache,
    calendar: CalendarScheduler,
    experiment_param: String,
    generated: usize,
    degraded: usize,
}

// ────────────────────────────────────────────────────────────────────────────
// Generation pipeline
// ────────────────────────────────────────────────────────────────────────────

/// Composes the engine's collaborators. Built fresh for every run.
pub struct MessageGenerator {
    store: Arc<dyn MessageStore>,
    provisioner: Arc<dyn TrackingLinkProvisioner>,
    selector: Arc<dyn ProfileSelector>,
    reporter: ProgressReporter,
    rng: Box<dyn RandomSource>,
    run_locks: RunLocks,
    failure_policy: ProvisioningFailurePolicy,
}

impl MessageGenerator {
    pub fn new(
        store: Arc<dyn MessageStore>,
        provisioner: Arc<dyn TrackingLinkProvisioner>,
        selector: Arc<dyn ProfileSelector>,
        reporter: ProgressReporter,
        rng: Box<dyn RandomSource>,
        run_locks: RunLocks,
    ) -> Self {
        Self {
            store,
            provisioner,
            selector,
            reporter,
            rng,
            run_locks,
            failure_policy: ProvisioningFailurePolicy::Abort,
        }
    }

    pub fn with_failure_policy(mut self, policy: ProvisioningFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Replaces every generated message of the experiment with a fresh set.
    /// Runs for the same experiment are serialized.
    pub async fn run(mut self, params: &GenerationParameters) -> Result<GenerationSummary, AppError> {
        let experiment_id = params.experiment.id;
        let _exclusive = self.run_locks.acquire(experiment_id).await;
        let started = Instant::now();
        info!(
            "Generating {} messages for experiment {} ({} cycles, {} combos, {} templates, {:?} links)",
            params.total_count,
            experiment_id,
            params.cycles,
            params.combos.len(),
            params.templates.len(),
            self.provisioner.mode()
        );

        // Nothing is retired if a combo can never be staffed.
        check_eligibility(params)?;

        let calendar = CalendarScheduler::new(
            params.start_date,
            params.timezone,
            params.templates.len(),
            params.messages_per_day,
            params.days_between_posting,
            params.posting_times.clone(),
        )?;

        self.retire_prior(experiment_id).await?;

        let mut run = RunState {
            allocations: AllocationCache::new(),
            calendar,
            experiment_param: params.experiment.to_param(),
            generated: 0,
            degraded: 0,
        };
        let mut rotation = RotationSelector::new();

        for cycle in 0..params.cycles {
            for &combo in &params.combos {
                let batches = rotation.batches(
                    combo,
                    &params.templates,
                    params.messages_per_day,
                    self.rng.as_mut(),
                );
                for (batch_index, batch) in batches.iter().enumerate() {
                    for (slot_index, &template) in batch.iter().enumerate() {
                        let slot = Slot {
                            cycle,
                            combo,
                            batch_index,
                            slot_index,
                            template,
                        };
                        self.emit(params, &mut run, slot).await?;
                    }
                }
            }
        }

        let duration = started.elapsed();
        if run.generated != params.total_count {
            warn!(
                "Experiment {} produced {} messages, expected {}",
                experiment_id, run.generated, params.total_count
            );
        }
        info!(
            "Generated {} messages for experiment {} in {}ms ({} degraded)",
            run.generated,
            experiment_id,
            duration.as_millis(),
            run.degraded
        );

        Ok(GenerationSummary {
            generated_count: run.generated,
            degraded_count: run.degraded,
            duration,
        })
    }

    /// Removes remote tracking links first, then the messages and link rows
    /// in one transaction. Any failure is fatal for the run.
    async fn retire_prior(&self, experiment_id: Uuid) -> Result<(), AppError> {
        let links = self
            .store
            .tracking_links(experiment_id)
            .await
            .map_err(|e| AppError::Retirement(e.to_string()))?;

        for link in &links {
            self.provisioner
                .retire(link)
                .await
                .map_err(|e| AppError::Retirement(format!("link {}: {e}", link.remote_id)))?;
        }

        let deleted = self
            .store
            .retire_messages(experiment_id)
            .await
            .map_err(|e| AppError::Retirement(e.to_string()))?;

        info!(
            "Retired {} messages and {} tracking links for experiment {}",
            deleted,
            links.len(),
            experiment_id
        );
        Ok(())
    }

    async fn emit(
        &mut self,
        params: &GenerationParameters,
        run: &mut RunState,
        slot: Slot<'_>,
    ) -> Result<(), AppError> {
        let Slot {
            cycle,
            combo,
            batch_index,
            slot_index,
            template,
        } = slot;

        let allocation = run
            .allocations
            .resolve(template, cycle, params.image_policy, self.rng.as_mut())
            .await;

        let eligible = eligible_profiles(&params.profiles, combo.platform, combo.medium);
        let profile = self
            .selector
            .pick(&eligible, combo.platform, combo.medium)
            .ok_or(AppError::EligibilityExhausted {
                platform: combo.platform,
                medium: combo.medium,
            })?;

        let scheduled_date_time = run
            .calendar
            .schedule(cycle, combo, batch_index, slot_index)?;

        let id = Uuid::new_v4();
        let message = NewMessage {
            id,
            experiment_id: params.experiment.id,
            message_template_id: template.id,
            platform: combo.platform,
            medium: combo.medium,
            cycle,
            image_id: allocation.image_id,
            content: compose_content(&template.content, allocation.hashtag.as_deref()),
            promoted_website_url: destination_url(
                &params.experiment.promoted_website_url,
                &run.experiment_param,
                id,
                combo.platform,
                combo.medium,
            )?,
            scheduled_date_time,
            social_media_profile_id: profile.id,
        };

        self.store.insert_message(&message).await?;
        run.generated += 1;
        debug!(
            "Message {} for {} cycle {} day {} slot {} at {}",
            id, combo, cycle, batch_index, slot_index, scheduled_date_time
        );
        self.reporter
            .report(run.generated, params.total_count, MESSAGE_GENERATED)
            .await;

        let provisioned = match self.provisioner.provision(&params.experiment, &message).await {
            Ok(provisioned) => provisioned,
            Err(AppError::Provisioning(reason))
                if self.failure_policy == ProvisioningFailurePolicy::FallbackToDestination =>
            {
                warn!("Message {id} falls back to its destination URL: {reason}");
                run.degraded += 1;
                Provisioned::Direct(message.promoted_website_url.clone())
            }
            Err(e) => return Err(e),
        };

        let content = message.content.replace(URL_PLACEHOLDER, provisioned.url());
        let link = match &provisioned {
            Provisioned::Tracked(link) => Some(link),
            Provisioned::Direct(_) => None,
        };
        self.store.finalize_message(id, &content, link).await?;

        self.reporter
            .report(run.generated, params.total_count, TRACKING_LINK_CREATED)
            .await;
        Ok(())
    }
}

/// Fails when some combo has no profile able to post it.
fn check_eligibility(params: &GenerationParameters) -> Result<(), AppError> {
    match params
        .combos
        .iter()
        .find(|c| eligible_profiles(&params.profiles, c.platform, c.medium).is_empty())
    {
        Some(combo) => Err(AppError::EligibilityExhausted {
            platform: combo.platform,
            medium: combo.medium,
        }),
        None => Ok(()),
    }
}

fn compose_content(template: &str, hashtag: Option<&str>) -> String {
    match hashtag {
        Some(tag) => format!("{template} {tag}"),
        None => template.to_string(),
    }
}
