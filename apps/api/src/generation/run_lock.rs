//! Per-experiment run exclusion. A second run for the same experiment waits
//! until the first one has released its guard, so retire-then-insert never
//! interleaves. Scope is one process, the same scope as the tracking rate gate.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::info;
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct RunLocks {
    inner: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl RunLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Held for the whole run; dropping the guard lets the next run in.
    pub async fn acquire(&self, experiment_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.lock().await;
            // Entries nobody holds or waits on are dropped.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(experiment_id).or_default().clone()
        };

        match lock.clone().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                info!("Experiment {experiment_id} is already generating; waiting for that run");
                lock.lock_owned().await
            }
        }
    }

    #[cfg(test)]
    pub async fn tracked(&self) -> usize {
        self.inner.lock().await.len()
    }
}
