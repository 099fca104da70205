//! Rate Gate: sliding-window admission control for billed tracking-service calls.
//!
//! One gate is shared by every caller in a generation run. Admission is serialized
//! through a single lock, so at most `capacity_per_second` acquisitions complete in
//! any rolling one-second window no matter how many workers are waiting.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout, Duration, Instant};

use crate::errors::AppError;

const WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum GateError {
    #[error("rate gate wait exceeded {0:?}")]
    Timeout(Duration),
}

impl From<GateError> for AppError {
    fn from(e: GateError) -> Self {
        AppError::Provisioning(e.to_string())
    }
}

pub struct RateGate {
    window: Mutex<VecDeque<Instant>>,
    /// When false, admissions are counted but never delayed.
    throttle: bool,
    max_wait: Option<Duration>,
    admitted: AtomicU64,
}

impl RateGate {
    pub fn new(throttle: bool, max_wait: Option<Duration>) -> Self {
        Self {
            window: Mutex::new(VecDeque::new()),
            throttle,
            max_wait,
            admitted: AtomicU64::new(0),
        }
    }

    /// Blocks until admission keeps the rolling one-second count within
    /// `capacity_per_second`. A capacity of zero is treated as one.
    pub async fn acquire(&self, capacity_per_second: u32) -> Result<(), GateError> {
        match self.max_wait {
            Some(limit) => timeout(limit, self.admit(capacity_per_second))
                .await
                .map_err(|_| GateError::Timeout(limit))?,
            None => self.admit(capacity_per_second).await,
        }
        self.admitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Total acquisitions completed through this gate.
    pub fn admitted(&self) -> u64 {
        self.admitted.load(Ordering::Relaxed)
    }

    async fn admit(&self, capacity_per_second: u32) {
        if !self.throttle {
            return;
        }
        let capacity = capacity_per_second.max(1) as usize;
        let mut window = self.window.lock().await;

        loop {
            let now = Instant::now();
            while window
                .front()
                .is_some_and(|&admitted_at| now.duration_since(admitted_at) >= WINDOW)
            {
                window.pop_front();
            }

            match window.front() {
                Some(&oldest) if window.len() >= capacity => {
                    sleep(WINDOW - now.duration_since(oldest)).await;
                }
                _ => {
                    window.push_back(now);
                    return;
                }
            }
        }
    }
}
