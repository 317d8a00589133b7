//! Periodic and on-demand cycle scheduling.
//!
//! A single loop owns the cadence: an interval tick or a message on the
//! trigger channel each runs one cycle. Cycle failures are logged and the
//! loop keeps going; the per-host lock inside the engine serializes any
//! overlap between the two paths.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::engine::Engine;

pub async fn run(engine: Arc<Engine>, interval: Duration, mut trigger_rx: mpsc::Receiver<()>) {
    tracing::info!(
        "scheduler started for host {} (interval {}s)",
        engine.host_id(),
        interval.as_secs()
    );

    // First tick fires immediately so a fresh start shows data right away.
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_one(&engine, "scheduled").await;
            }
            Some(()) = trigger_rx.recv() => {
                run_one(&engine, "on-demand").await;
            }
        }
    }
}

async fn run_one(engine: &Engine, origin: &str) {
    match engine.run_cycle().await {
        Ok(_) => {}
        Err(e) => {
            // Non-fatal: state rolled back, next cycle retries fresh.
            tracing::error!("{} cycle failed: {}", origin, e);
        }
    }
}
