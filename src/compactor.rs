use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::Engine;

/// Compact once at least `threshold` events were appended since the last
/// compaction. Returns the number of events in the new WAL, if it ran.
pub async fn compact_if_due(engine: &Engine, threshold: u64) -> Option<usize> {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        return None;
    }
    match engine.compact_wal().await {
        Ok(kept) => {
            info!("compacted WAL: {appends} appends since last compaction, {kept} events kept");
            Some(kept)
        }
        Err(e) => {
            warn!("WAL compaction failed: {e}");
            None
        }
    }
}

/// Background task that periodically compacts the WAL.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    // The first tick completes immediately.
    interval.tick().await;
    loop {
        interval.tick().await;
        if compact_if_due(&engine, threshold).await.is_none() {
            debug!("compactor: nothing to do");
        }
    }
}
