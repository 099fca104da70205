//! Profile Selector: chooses one eligible account per message.
//!
//! The generator filters the experiment's profiles down to those that can post
//! the combo; the selector only decides among them.

use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::models::profile::SocialMediaProfile;
use crate::models::{Medium, Platform};

pub trait ProfileSelector: Send + Sync {
    /// `eligible` is never empty.
    fn pick<'a>(
        &self,
        eligible: &[&'a SocialMediaProfile],
        platform: Platform,
        medium: Medium,
    ) -> Option<&'a SocialMediaProfile>;
}

/// Cycles through eligible profiles in order, across all combos.
#[derive(Default)]
pub struct RoundRobinSelector {
    next: AtomicUsize,
}

impl ProfileSelector for RoundRobinSelector {
    fn pick<'a>(
        &self,
        eligible: &[&'a SocialMediaProfile],
        _platform: Platform,
        _medium: Medium,
    ) -> Option<&'a SocialMediaProfile> {
        if eligible.is_empty() {
            return None;
        }
        let turn = self.next.fetch_add(1, Ordering::Relaxed);
        Some(eligible[turn % eligible.len()])
    }
}

/// Uniform pick from its own generator, so a seeded selector replays its picks.
pub struct RandomSelector {
    rng: Mutex<StdRng>,
}

impl RandomSelector {
    pub fn from_entropy() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    #[cfg(test)]
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
        }
    }
}

impl ProfileSelector for RandomSelector {
    fn pick<'a>(
        &self,
        eligible: &[&'a SocialMediaProfile],
        _platform: Platform,
        _medium: Medium,
    ) -> Option<&'a SocialMediaProfile> {
        if eligible.is_empty() {
            return None;
        }
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Some(eligible[rng.gen_range(0..eligible.len())])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileSelection {
    RoundRobin,
    Random,
}

impl FromStr for ProfileSelection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "round_robin" => Ok(ProfileSelection::RoundRobin),
            "random" => Ok(ProfileSelection::Random),
            other => anyhow::bail!("PROFILE_SELECTION must be round_robin or random, got '{other}'"),
        }
    }
}

pub fn build_selector(selection: ProfileSelection) -> Arc<dyn ProfileSelector> {
    match selection {
        ProfileSelection::RoundRobin => Arc::new(RoundRobinSelector::default()),
        ProfileSelection::Random => Arc::new(RandomSelector::from_entropy()),
    }
}

/// Profiles able to post the given combo.
pub fn eligible_profiles(
    profiles: &[SocialMediaProfile],
    platform: Platform,
    medium: Medium,
) -> Vec<&SocialMediaProfile> {
    profiles
        .iter()
        .filter(|p| p.can_post(platform, medium))
        .collect()
}
