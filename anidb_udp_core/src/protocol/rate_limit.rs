//! Request spacing for the AniDB UDP API
//!
//! The server bans clients that flood it, so every outgoing request waits
//! here first, whatever the session or ban state.

use log::{debug, trace};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};

/// Enforces a minimum interval between consecutive requests
///
/// Waiters are served first-come-first-served: the tokio mutex is fair and is
/// held across the sleep, so a later caller cannot overtake an earlier one.
#[derive(Debug)]
pub struct RateLimiter {
    /// Last permitted send
    last_request: Mutex<Option<Instant>>,
    /// Minimum delay between requests
    min_interval: Duration,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval,
        }
    }

    /// Limiter allowing `requests` sends per `window`
    pub fn per_window(requests: u32, window: Duration) -> Self {
        Self::new(window / requests.max(1))
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until the next send is permitted and claim the slot
    pub async fn ensure_rate(&self) {
        trace!("Rate limiter: acquiring last_request lock...");
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                debug!("Rate limiter: waiting {wait_time:?} to respect rate limit");
                sleep(wait_time).await;
            } else {
                trace!("Rate limiter: no wait needed, {elapsed:?} since last request");
            }
        } else {
            trace!("Rate limiter: no previous request, proceeding immediately");
        }

        *last = Some(Instant::now());
    }

    /// Time of the last permitted send
    pub async fn last_request(&self) -> Option<Instant> {
        *self.last_request.lock().await
    }
}

impl Default for RateLimiter {
    /// One request every two seconds
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}
