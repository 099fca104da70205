//! Template Rotation Selector: splits the template pool into day-sized batches.
//!
//! The pool is cut into consecutive batches of `batch_size`; the order of the full
//! batches and the order inside every batch are drawn from an injected
//! [`RandomSource`]. A short remainder batch always stays last.
//!
//! Within one run, the first batch handed out for a combo never repeats the
//! ordering of an earlier cycle's first batch while distinct orderings remain.

use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::warn;
use uuid::Uuid;

use crate::models::template::MessageTemplateRow;
use crate::models::Combo;

/// Re-draws attempted before a repeated first batch is accepted.
const MAX_REDRAWS: usize = 16;

/// Source of all randomness in a generation run. Injected so tests can script it.
pub trait RandomSource: Send + Sync {
    /// A permutation of `0..len`.
    fn permutation(&mut self, len: usize) -> Vec<usize>;
    /// An index in `0..len`; `len` is never zero.
    fn index(&mut self, len: usize) -> usize;
    fn coin(&mut self) -> bool;
}

/// `StdRng`-backed source. Seeded from entropy in production.
pub struct StdRandomSource(StdRng);

impl StdRandomSource {
    pub fn from_entropy() -> Self {
        Self(StdRng::from_entropy())
    }

    #[cfg(test)]
    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl RandomSource for StdRandomSource {
    fn permutation(&mut self, len: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..len).collect();
        order.shuffle(&mut self.0);
        order
    }

    fn index(&mut self, len: usize) -> usize {
        self.0.gen_range(0..len)
    }

    fn coin(&mut self) -> bool {
        self.0.gen_bool(0.5)
    }
}

/// Per-run rotation state. One instance per generation run.
#[derive(Default)]
pub struct RotationSelector {
    first_batches: HashMap<Combo, HashSet<Vec<Uuid>>>,
}

impl RotationSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Batches for one (cycle, combo). Call once per cycle for each combo.
    pub fn batches<'a>(
        &mut self,
        combo: Combo,
        templates: &'a [MessageTemplateRow],
        batch_size: usize,
        rng: &mut dyn RandomSource,
    ) -> Vec<Vec<&'a MessageTemplateRow>> {
        if templates.is_empty() || batch_size == 0 {
            return Vec::new();
        }

        let chunks: Vec<&[MessageTemplateRow]> = templates.chunks(batch_size).collect();
        let seen = self.first_batches.entry(combo).or_default();
        let exhausted = seen.len() as u64 >= distinct_first_batches(&chunks, batch_size);

        let mut attempt = 0;
        loop {
            let batches = draw(&chunks, batch_size, rng);
            let first: Vec<Uuid> = batches[0].iter().map(|t| t.id).collect();

            if !seen.contains(&first) {
                seen.insert(first);
                return batches;
            }
            attempt += 1;
            if exhausted || attempt > MAX_REDRAWS {
                warn!(
                    "Rotation for {} repeats an earlier cycle's first batch after {} draws",
                    combo, attempt
                );
                return batches;
            }
        }
    }
}

fn draw<'a>(
    chunks: &[&'a [MessageTemplateRow]],
    batch_size: usize,
    rng: &mut dyn RandomSource,
) -> Vec<Vec<&'a MessageTemplateRow>> {
    let full = chunks.iter().filter(|c| c.len() == batch_size).count();

    let mut order = rng.permutation(full);
    if full < chunks.len() {
        order.push(full);
    }

    order
        .into_iter()
        .map(|i| {
            let chunk = chunks[i];
            rng.permutation(chunk.len())
                .into_iter()
                .map(|j| &chunk[j])
                .collect()
        })
        .collect()
}

/// How many distinct orderings a first batch can take, saturating.
fn distinct_first_batches(chunks: &[&[MessageTemplateRow]], batch_size: usize) -> u64 {
    let candidates: Vec<usize> = if chunks.iter().any(|c| c.len() == batch_size) {
        chunks
            .iter()
            .filter(|c| c.len() == batch_size)
            .map(|c| c.len())
            .collect()
    } else {
        chunks.iter().map(|c| c.len()).collect()
    };
    candidates
        .into_iter()
        .map(|n| (1..=n as u64).fold(1u64, |acc, k| acc.saturating_mul(k)))
        .fold(0u64, |acc, f| acc.saturating_add(f))
}
