use crate::refresh::{RefreshOutcome, RefreshPipeline};
use crate::utils::fmt_duration;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, broadcast};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace, warn};

/// How long an in-flight refresh may run after shutdown is signalled.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Runs the refresh pipeline on a fixed period.
///
/// Ticks are independent: a failed or panicked refresh is logged and the loop
/// carries on to the next tick. A tick that lands while the previous refresh
/// is still running is skipped rather than queued.
pub struct RefreshScheduler {
    pipeline: Arc<RefreshPipeline>,
    interval: Duration,
    trigger: Arc<Notify>,
}

impl RefreshScheduler {
    pub fn new(pipeline: Arc<RefreshPipeline>, interval: Duration, trigger: Arc<Notify>) -> Self {
        Self {
            pipeline,
            interval,
            trigger,
        }
    }

    /// Synchronous startup refresh, run once before the periodic loop so the
    /// cache is populated before the first reader arrives.
    pub async fn warm_up(&self) -> RefreshOutcome {
        info!("Warming snapshot cache");
        let outcome = self.pipeline.refresh().await;
        log_outcome(&outcome);
        outcome
    }

    /// Runs the periodic loop until `shutdown_rx` fires.
    ///
    /// The first tick is one full interval after start; pair with
    /// [`Self::warm_up`] for an immediate refresh. A notification on the
    /// trigger runs a tick right away.
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            interval = fmt_duration(self.interval),
            "Refresh scheduler started"
        );

        let mut next_run = time::Instant::now() + self.interval;
        let mut current_work: Option<(tokio::task::JoinHandle<()>, CancellationToken)> = None;

        loop {
            tokio::select! {
                _ = self.trigger.notified() => {
                    info!("Snapshot refresh triggered manually");
                    next_run = time::Instant::now();
                    continue;
                }
                _ = time::sleep_until(next_run) => {
                    if let Some((ref handle, _)) = current_work
                        && !handle.is_finished()
                    {
                        trace!("Previous refresh still running, skipping tick");
                        next_run = time::Instant::now() + self.interval;
                        continue;
                    }

                    let cancel_token = CancellationToken::new();
                    let work_handle = tokio::spawn({
                        let pipeline = self.pipeline.clone();
                        let cancel_token = cancel_token.clone();
                        async move {
                            tokio::select! {
                                outcome = pipeline.refresh() => log_outcome(&outcome),
                                _ = cancel_token.cancelled() => {
                                    trace!("Refresh cancelled by shutdown");
                                }
                            }
                        }
                    });

                    current_work = Some((work_handle, cancel_token));
                    next_run = time::Instant::now() + self.interval;
                }
                _ = shutdown_rx.recv() => {
                    info!("Refresh scheduler received shutdown signal");

                    if let Some((handle, cancel_token)) = current_work.take() {
                        cancel_token.cancel();
                        if time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
                            warn!("Refresh did not stop within {}s, abandoning", SHUTDOWN_GRACE.as_secs());
                        }
                    }

                    info!("Refresh scheduler exiting gracefully");
                    break;
                }
            }
        }
    }
}

fn log_outcome(outcome: &RefreshOutcome) {
    match outcome {
        RefreshOutcome::Refreshed { degraded, .. } if degraded.is_empty() => {
            trace!("Refresh cycle complete");
        }
        RefreshOutcome::Refreshed { degraded, .. } => {
            warn!(?degraded, "Refresh cycle completed with degraded portions");
        }
        RefreshOutcome::FailedOpen { .. } => {
            error!("Refresh cycle failed upstream, empty snapshot published");
        }
        RefreshOutcome::Retained => {
            error!("Refresh cycle failed upstream, previous snapshot retained");
        }
        RefreshOutcome::NotWritten { .. } => {
            error!("Refresh cycle could not write the cache");
        }
    }
}
