//! Progress Reporter: best-effort notifications while a run is in flight.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

pub const MESSAGE_GENERATED: &str = "Message generated";
pub const TRACKING_LINK_CREATED: &str = "Tracking link created";

/// Publish side of a pub/sub transport.
#[async_trait]
pub trait ProgressChannel: Send + Sync {
    async fn publish(&self, channel: &str, payload: Value) -> anyhow::Result<()>;
}

/// Redis PUBLISH, one multiplexed connection per call.
pub struct RedisProgressChannel {
    client: redis::Client,
}

impl RedisProgressChannel {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProgressChannel for RedisProgressChannel {
    async fn publish(&self, channel: &str, payload: Value) -> anyhow::Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.publish::<_, _, ()>(channel, payload.to_string()).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent<'a> {
    pub value: usize,
    pub total: usize,
    pub event: &'a str,
}

#[derive(Clone)]
pub struct ProgressReporter {
    channel: Arc<dyn ProgressChannel>,
    channel_name: String,
    timeout: Duration,
}

impl ProgressReporter {
    pub fn new(channel: Arc<dyn ProgressChannel>, channel_name: String, timeout: Duration) -> Self {
        Self {
            channel,
            channel_name,
            timeout,
        }
    }

    /// Never fails: delivery errors and timeouts are logged and dropped.
    pub async fn report(&self, current: usize, total: usize, label: &str) {
        let payload = match serde_json::to_value(ProgressEvent {
            value: current,
            total,
            event: label,
        }) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Progress update {current}/{total} not serializable: {e}");
                return;
            }
        };

        match tokio::time::timeout(self.timeout, self.channel.publish(&self.channel_name, payload))
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Progress update {current}/{total} not delivered: {e}"),
            Err(_) => warn!(
                "Progress update {current}/{total} timed out after {}ms",
                self.timeout.as_millis()
            ),
        }
    }
}
