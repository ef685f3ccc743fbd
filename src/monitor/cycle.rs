use std::sync::{Arc, Weak};

use tokio::time::{self, Instant};

use super::controller::MonitorInner;

// Set to false to silence per-cycle logging
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// One capture → submit → record → (maybe) stimulate pass.
///
/// Runs as its own task so the sampling tick never waits on it; the busy
/// flag claimed for `epoch` keeps a second cycle from starting meanwhile.
/// Only a weak handle to the session is kept across the awaits, so dropping
/// the last `Monitor` mid-cycle ends the session instead of the cycle.
pub(crate) async fn run_cycle(session: Weak<MonitorInner>, epoch: u64) {
    let Some(inner) = session.upgrade() else {
        return;
    };
    let frame_source = Arc::clone(&inner.frame_source);
    let decision_client = Arc::clone(&inner.decision_client);
    let config = inner.config.clone();
    let capture_budget = inner.settings.sample_interval;
    drop(inner);

    let cycle_start = Instant::now();
    let frame = match time::timeout(capture_budget, frame_source.capture_frame()).await {
        Ok(Some(frame)) => frame,
        Ok(None) => {
            log_debug!("no frame captured, skipping cycle");
            abandon(&session, epoch);
            return;
        }
        Err(_) => {
            log_warn!(
                "capture exceeded {}ms, skipping cycle",
                capture_budget.as_millis()
            );
            abandon(&session, epoch);
            return;
        }
    };
    let capture_ms = cycle_start.elapsed().as_millis();

    let submit_start = Instant::now();
    let decision = match decision_client.submit(&frame, &config).await {
        Ok(decision) => decision,
        Err(err) => {
            // Per-cycle failure: the next tick is the retry.
            log_debug!("submission failed after {}ms: {err}", submit_start.elapsed().as_millis());
            abandon(&session, epoch);
            return;
        }
    };
    let submit_ms = submit_start.elapsed().as_millis();

    let Some(inner) = session.upgrade() else {
        log_debug!("session dropped, discarding decision");
        return;
    };
    match inner.complete_cycle(epoch, frame, decision) {
        Some(triggered) => log_info!(
            "cycle finished in {}ms (capture: {}ms, submit: {}ms, stimulus: {})",
            cycle_start.elapsed().as_millis(),
            capture_ms,
            submit_ms,
            triggered
        ),
        None => log_debug!("discarding decision from a cancelled cycle"),
    }
}

fn abandon(session: &Weak<MonitorInner>, epoch: u64) {
    if let Some(inner) = session.upgrade() {
        inner.abandon_cycle(epoch);
    }
}
