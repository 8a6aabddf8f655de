use std::sync::Arc;

use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::PersistenceError;

use super::outbox::{Delivery, Outbox};

// Set to false to silence routine cycle logging
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(60);

/// Outcome of one pass over the Pending backlog.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub attempted: usize,
    pub synced: usize,
    pub still_pending: usize,
    pub skipped: usize,
    pub errors: usize,
    pub cancelled: bool,
}

/// Re-delivers Pending records until `cancel_token` fires.
///
/// The first cycle runs immediately so a backlog left by a previous run is
/// picked up at startup. A failing or panicking cycle is logged and the loop
/// carries on with the next tick.
pub async fn reconciliation_loop(
    outbox: Arc<Outbox>,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    log_info!(
        "reconciliation loop started (interval {}s)",
        interval.as_secs_f64()
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Own task so a panic inside a cycle surfaces as a JoinError here.
                let cycle = tokio::spawn({
                    let outbox = outbox.clone();
                    let token = cancel_token.clone();
                    async move { run_cycle(&outbox, &token).await }
                });

                match cycle.await {
                    Ok(Ok(report)) if report.attempted > 0 => log_info!(
                        "reconciliation cycle: {} attempted, {} synced, {} still pending, {} skipped, {} errors",
                        report.attempted, report.synced, report.still_pending, report.skipped, report.errors
                    ),
                    Ok(Ok(_)) => log_debug!("reconciliation cycle: nothing pending"),
                    Ok(Err(err)) => log_error!("reconciliation cycle failed: {err}"),
                    Err(err) => log_error!("reconciliation cycle aborted: {err}"),
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("reconciliation loop shutting down");
                break;
            }
        }
    }
}

/// Attempts every Pending record once, oldest first.
///
/// A record that fails stays Pending and the pass moves on to the next one.
/// Only failing to read the backlog itself fails the cycle. Cancellation stops
/// the pass before the next record, never in the middle of one.
pub async fn run_cycle(
    outbox: &Outbox,
    cancel_token: &CancellationToken,
) -> Result<CycleReport, PersistenceError> {
    let mut report = CycleReport::default();
    if cancel_token.is_cancelled() {
        report.cancelled = true;
        return Ok(report);
    }

    let pending = outbox.pending().await?;
    if !pending.is_empty() {
        log_info!("found {} pending record(s) to sync", pending.len());
    }

    for record in &pending {
        // Checked between records only; a delivery that has started runs to
        // completion so an accepted submission is always recorded as Synced.
        if cancel_token.is_cancelled() {
            report.cancelled = true;
            break;
        }

        report.attempted += 1;
        match outbox.deliver(record).await {
            Ok(Delivery::Synced) => report.synced += 1,
            Ok(Delivery::Pending) => report.still_pending += 1,
            Ok(Delivery::AlreadySynced | Delivery::InFlight) => report.skipped += 1,
            Err(err) => {
                report.errors += 1;
                log_warn!("could not reconcile record {}: {err}", record.id);
            }
        }
    }

    Ok(report)
}
