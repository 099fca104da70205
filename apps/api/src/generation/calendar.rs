//! Calendar Scheduler: maps (cycle, combo, batch, slot) to an absolute timestamp.
//!
//! day_offset = cycle × days_per_cycle + batch_index, where
//! days_per_cycle = ceil(template_count / batch_size). The calendar date is
//! start_date + day_offset × days_between_posting; the time of day is the
//! platform's posting time at `slot_index`, read in the campaign timezone.

use std::collections::HashMap;

use chrono::{DateTime, Days, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::errors::AppError;
use crate::models::{Combo, Platform};

#[derive(Debug, Clone)]
pub struct CalendarScheduler {
    start_date: NaiveDate,
    timezone: Tz,
    days_per_cycle: u32,
    days_between_posting: u32,
    posting_times: HashMap<Platform, Vec<NaiveTime>>,
}

impl CalendarScheduler {
    pub fn new(
        start_date: NaiveDate,
        timezone: Tz,
        template_count: usize,
        batch_size: usize,
        days_between_posting: u32,
        posting_times: HashMap<Platform, Vec<NaiveTime>>,
    ) -> Result<Self, AppError> {
        if batch_size == 0 {
            return Err(AppError::Configuration(
                "Messages per day must be at least 1".to_string(),
            ));
        }
        if days_between_posting == 0 {
            return Err(AppError::Configuration(
                "Days between posting must be at least 1".to_string(),
            ));
        }
        let days_per_cycle = u32::try_from(template_count.div_ceil(batch_size)).map_err(|_| {
            AppError::Configuration(format!(
                "{template_count} templates at {batch_size} per day do not fit a cycle"
            ))
        })?;
        Ok(Self {
            start_date,
            timezone,
            days_per_cycle,
            days_between_posting,
            posting_times,
        })
    }

    pub fn days_per_cycle(&self) -> u32 {
        self.days_per_cycle
    }

    pub fn schedule(
        &self,
        cycle: u32,
        combo: Combo,
        batch_index: usize,
        slot_index: usize,
    ) -> Result<DateTime<Utc>, AppError> {
        let times = self.posting_times.get(&combo.platform).ok_or_else(|| {
            AppError::Configuration(format!("No posting times for {}", combo.platform))
        })?;
        let time = times.get(slot_index).ok_or_else(|| {
            AppError::Configuration(format!(
                "{} has {} posting times but slot {} was requested",
                combo.platform,
                times.len(),
                slot_index + 1
            ))
        })?;

        let day_offset = u64::from(cycle) * u64::from(self.days_per_cycle) + batch_index as u64;
        let date = self
            .start_date
            .checked_add_days(Days::new(day_offset * u64::from(self.days_between_posting)))
            .ok_or_else(|| {
                AppError::Configuration(format!("Day offset {day_offset} is out of range"))
            })?;

        self.localize(date.and_time(*time))
    }

    /// Ambiguous local times take the earlier instant; times inside a DST gap
    /// move forward by an hour.
    fn localize(&self, naive: NaiveDateTime) -> Result<DateTime<Utc>, AppError> {
        self.timezone
            .from_local_datetime(&naive)
            .earliest()
            .or_else(|| {
                self.timezone
                    .from_local_datetime(&(naive + Duration::hours(1)))
                    .earliest()
            })
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| {
                AppError::Configuration(format!("{naive} does not exist in {}", self.timezone))
            })
    }
}

/// Parses "12:30 AM,08:30 AM,2:30 PM" (12-hour) or "00:30,14:30" (24-hour).
pub fn parse_posting_times(raw: &str) -> Result<Vec<NaiveTime>, AppError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            NaiveTime::parse_from_str(&s.to_ascii_uppercase(), "%I:%M %p")
                .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
                .map_err(|_| AppError::Configuration(format!("Invalid posting time '{s}'")))
        })
        .collect()
}

pub fn parse_timezone(name: &str) -> Result<Tz, AppError> {
    name.parse::<Tz>()
        .map_err(|_| AppError::Configuration(format!("Unknown timezone '{name}'")))
}
