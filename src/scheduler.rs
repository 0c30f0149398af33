//! Runs discovery passes on a fixed interval until shutdown.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::discovery::{DiscoveryError, DiscoveryReport, EpisodeDiscovery};

/// Default time between passes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// A unit of periodic work.
#[async_trait]
pub trait DiscoveryJob: Send + Sync {
    async fn run_pass(&self, token: &CancellationToken) -> Result<DiscoveryReport, DiscoveryError>;
}

#[async_trait]
impl DiscoveryJob for EpisodeDiscovery {
    async fn run_pass(&self, token: &CancellationToken) -> Result<DiscoveryReport, DiscoveryError> {
        self.find_new_episodes(token).await
    }
}

pub struct Scheduler {
    job: Arc<dyn DiscoveryJob>,
    period: Duration,
}

impl Scheduler {
    /// A zero `period` is raised to one second.
    pub fn new(job: Arc<dyn DiscoveryJob>, period: Duration) -> Self {
        Self {
            job,
            period: period.max(Duration::from_secs(1)),
        }
    }

    /// Runs a pass now and then once per period until `token` is cancelled.
    ///
    /// Passes are awaited inline, so they never overlap. Ticks missed while a
    /// pass runs long are delayed rather than fired in a burst. A failed
    /// pass is logged and the next tick proceeds normally.
    ///
    /// Returns the number of passes that completed successfully.
    pub async fn run(&self, token: CancellationToken) -> u64 {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut completed = 0;

        tracing::info!(
            period_secs = self.period.as_secs(),
            "Scheduler started"
        );

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.job.run_pass(&token).await {
                Ok(report) => {
                    completed += 1;
                    tracing::debug!(
                        episodes_announced = report.episodes_announced,
                        "Scheduled pass finished"
                    );
                }
                Err(DiscoveryError::Cancelled) => break,
                Err(e) => {
                    tracing::error!(error = %e, "Discovery pass failed, retrying at next tick");
                }
            }
        }

        tracing::info!(passes = completed, "Scheduler stopped");
        completed
    }
}
