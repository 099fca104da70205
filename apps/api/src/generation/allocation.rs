//! Allocation Cache: image and hashtag picks memoized per (template, cycle).
//!
//! Every combo that posts a template within one cycle reuses the same image and
//! hashtag; the next cycle draws again. Scoped to a single generation run.

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::generation::rotation::RandomSource;
use crate::models::experiment::ImagePolicy;
use crate::models::template::MessageTemplateRow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Allocation {
    pub image_id: Option<Uuid>,
    pub hashtag: Option<String>,
}

#[derive(Default)]
pub struct AllocationCache {
    entries: Mutex<HashMap<(Uuid, u32), Allocation>>,
}

impl AllocationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the memoized allocation, computing it on first access.
    ///
    /// The lock is held while computing, so concurrent first callers for the same
    /// key wait for the winner and observe its value.
    pub async fn resolve(
        &self,
        template: &MessageTemplateRow,
        cycle: u32,
        policy: ImagePolicy,
        rng: &mut dyn RandomSource,
    ) -> Allocation {
        let mut entries = self.entries.lock().await;
        entries
            .entry((template.id, cycle))
            .or_insert_with(|| allocate(template, policy, rng))
            .clone()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

fn allocate(
    template: &MessageTemplateRow,
    policy: ImagePolicy,
    rng: &mut dyn RandomSource,
) -> Allocation {
    let wants_image = match policy {
        ImagePolicy::None => false,
        ImagePolicy::All => true,
        ImagePolicy::Mixed => rng.coin(),
    };

    let image_id = if wants_image && !template.image_pool.is_empty() {
        Some(template.image_pool[rng.index(template.image_pool.len())])
    } else {
        None
    };

    let hashtags = template.hashtag_list();
    let hashtag = if hashtags.is_empty() {
        None
    } else {
        Some(hashtags[rng.index(hashtags.len())].to_string())
    };

    Allocation { image_id, hashtag }
}
