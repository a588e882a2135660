use std::time::Duration;

use tracing::{error, info};

use crate::listings::repo;
use crate::state::AppState;

/// Background task flipping listings past their expiry to `expired`. The
/// claim predicate also checks the expiry timestamp, so a listing is never
/// claimable in the window between passing expiry and the next tick.
pub async fn run(state: AppState) {
    let period = Duration::from_secs(state.config.expiry_sweep_seconds.max(1));
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        match repo::expire_overdue(&state.db).await {
            Ok(0) => {}
            Ok(count) => info!(count, "listings expired"),
            Err(e) => error!(error = %e, "expiry sweep failed"),
        }
    }
}
