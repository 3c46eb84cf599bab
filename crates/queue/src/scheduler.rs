//! Scheduled jobs for periodic expiry sweeps.

#![allow(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use sanction_common::SchedulerSettings;
use sanction_core::{ExpiryService, LedgerService};
use sanction_db::repositories::LiveTable;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

/// Shortest period a sweep runs at; `tokio::time::interval` rejects zero.
pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Scheduled job types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduledJob {
    /// Expire running warnings past their end time.
    ExpireWarnings,
    /// Expire overdue mute and softban rows whose timers were lost.
    SweepLiveEntries,
    /// Flip elapsed ban, kick and freeze records to inactive.
    ReconcilePunishments,
}

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval for the warning sweep (default: 30 seconds).
    pub warning_sweep_interval: Duration,
    /// Interval for the mute/softban sweep (default: 5 minutes).
    pub live_sweep_interval: Duration,
    /// Interval for reconciliation (default: 10 minutes).
    pub reconcile_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            warning_sweep_interval: Duration::from_secs(30),
            live_sweep_interval: Duration::from_secs(300),
            reconcile_interval: Duration::from_secs(600),
        }
    }
}

impl From<&SchedulerSettings> for SchedulerConfig {
    fn from(settings: &SchedulerSettings) -> Self {
        Self {
            warning_sweep_interval: settings.warning_sweep_interval(),
            live_sweep_interval: settings.live_sweep_interval(),
            reconcile_interval: settings.reconcile_interval(),
        }
    }
}

impl SchedulerConfig {
    /// Interval of a job, never shorter than [`MIN_INTERVAL`].
    #[must_use]
    pub fn interval_for(&self, job: ScheduledJob) -> Duration {
        let interval = match job {
            ScheduledJob::ExpireWarnings => self.warning_sweep_interval,
            ScheduledJob::SweepLiveEntries => self.live_sweep_interval,
            ScheduledJob::ReconcilePunishments => self.reconcile_interval,
        };
        interval.max(MIN_INTERVAL)
    }
}

/// Job executor trait for scheduled jobs.
#[async_trait::async_trait]
pub trait JobExecutor: Send + Sync {
    /// Execute the due-warning sweep.
    async fn expire_warnings(&self) -> Result<u64, Box<dyn std::error::Error + Send + Sync>>;

    /// Execute the mute/softban sweep.
    async fn sweep_live_entries(&self) -> Result<u64, Box<dyn std::error::Error + Send + Sync>>;

    /// Execute the ban/kick/freeze reconciliation.
    async fn reconcile_punishments(
        &self,
    ) -> Result<u64, Box<dyn std::error::Error + Send + Sync>>;

    /// Run one job by type.
    async fn run(&self, job: ScheduledJob) -> Result<u64, Box<dyn std::error::Error + Send + Sync>> {
        match job {
            ScheduledJob::ExpireWarnings => self.expire_warnings().await,
            ScheduledJob::SweepLiveEntries => self.sweep_live_entries().await,
            ScheduledJob::ReconcilePunishments => self.reconcile_punishments().await,
        }
    }
}

/// Executor backed by the ledger and expiry services.
#[derive(Clone)]
pub struct LedgerJobExecutor {
    ledger: LedgerService,
    expiry: ExpiryService,
}

impl LedgerJobExecutor {
    #[must_use]
    pub const fn new(ledger: LedgerService, expiry: ExpiryService) -> Self {
        Self { ledger, expiry }
    }
}

#[async_trait::async_trait]
impl JobExecutor for LedgerJobExecutor {
    async fn expire_warnings(&self) -> Result<u64, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.ledger.warnings().expire_due_warnings().await?)
    }

    async fn sweep_live_entries(&self) -> Result<u64, Box<dyn std::error::Error + Send + Sync>> {
        let mut total = 0;
        for table in LiveTable::ALL {
            total += self.expiry.sweep_live(table).await?;
        }
        Ok(total)
    }

    async fn reconcile_punishments(
        &self,
    ) -> Result<u64, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.expiry.reconcile_permanent_types().await?)
    }
}

/// Run the scheduler with the given configuration and executor.
///
/// Spawns one task per job and returns their handles. Each sweep tolerates
/// overlap with timers and other sweeps, so missed ticks are skipped rather
/// than replayed.
pub fn run_scheduler<E: JobExecutor + 'static>(
    config: SchedulerConfig,
    executor: Arc<E>,
) -> Vec<JoinHandle<()>> {
    [
        ScheduledJob::ExpireWarnings,
        ScheduledJob::SweepLiveEntries,
        ScheduledJob::ReconcilePunishments,
    ]
    .into_iter()
    .map(|job| {
        let executor = executor.clone();
        let period = config.interval_for(job);
        tokio::spawn(async move {
            let mut interval = interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                match executor.run(job).await {
                    Ok(count) => {
                        if count > 0 {
                            tracing::info!(?job, count, "Scheduled job expired punishments");
                        }
                    }
                    Err(e) => {
                        tracing::error!(?job, error = %e, "Scheduled job failed");
                    }
                }
            }
        })
    })
    .collect()
}
