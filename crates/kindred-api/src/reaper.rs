use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::state::{AppState, run_db};

/// Background task that archives expired circles.
///
/// Expiry is already enforced lazily on every read and join path; this only
/// keeps the `status` column tidy for circles nobody touches again.
pub async fn run_archive_loop(state: AppState, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        match run_db(&state, |db| db.archive_expired_circles(Utc::now())).await {
            Ok(count) => {
                if count > 0 {
                    info!("Reaper: archived {} expired circles", count);
                }
            }
            Err(e) => {
                warn!("Reaper error: {:?}", e);
            }
        }
    }
}
