//! Request pacing
//!
//! The engine is single-connection per account by design; this gate adds a
//! minimum spacing between service requests so sustained iteration stays
//! below the service's rate thresholds instead of bouncing off 429s.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

/// Default spacing between service requests.
const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(250);

/// Serializes requests with a minimum interval between them.
#[derive(Debug)]
pub struct RequestPacer {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RequestPacer {
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Waits until the minimum interval since the previous acquisition has
    /// elapsed, then records this request.
    pub async fn acquire(&self) {
        let mut last = self.last_request.lock().await;
        let now = Instant::now();

        if let Some(previous) = *last {
            let elapsed = now.duration_since(previous);
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                trace!(wait_ms = wait.as_millis() as u64, "Pacing request");
                tokio::time::sleep(wait).await;
            }
        }

        *last = Some(Instant::now());
    }
}

impl Default for RequestPacer {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL)
    }
}
