// Message Generation Engine
// Enumerates, schedules and provisions every message of an experiment in one run.
// Tracking-service calls go through click_meter and the shared rate gate only.

pub mod allocation;
pub mod calendar;
pub mod generator;
pub mod handlers;
pub mod parameters;
pub mod profile_selector;
pub mod progress;
pub mod rate_gate;
pub mod rotation;
pub mod run_lock;
pub mod store;
pub mod support_matrix;
pub mod tracking;

#[cfg(test)]
pub mod testing;
