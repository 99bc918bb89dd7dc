//! Interval scheduler: one timer task per target
//!
//! Each timer polls every [`POLL_INTERVAL`]. Once its target's interval has
//! elapsed it starts a new interval from that tick and runs a backup, whether
//! or not the backup succeeds. Timers never wait on each other.

use crate::config::{select_targets, Target};
use crate::managers::backup::BackupManager;
use anyhow::Result;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info};

pub const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Something that can back up a target on behalf of a timer
#[async_trait]
pub trait BackupRunner: Send + Sync {
    async fn run_backup(&self, target: &Target) -> Result<()>;
}

#[async_trait]
impl BackupRunner for BackupManager {
    async fn run_backup(&self, target: &Target) -> Result<()> {
        self.perform_backup(target).await.map(|_| ())
    }
}

pub struct Scheduler {
    runner: Arc<dyn BackupRunner>,
    poll_interval: Duration,
}

impl Scheduler {
    pub fn new(runner: Arc<dyn BackupRunner>) -> Self {
        Self {
            runner,
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run a timer per target until `shutdown` completes, then stop them all
    pub async fn run_until<F>(&self, targets: Vec<Target>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut timers = JoinSet::new();
        for target in targets {
            info!(
                "Scheduling target '{}' ({})",
                target.id, target.backup.schedule
            );
            timers.spawn(run_timer(self.runner.clone(), target, self.poll_interval));
        }
        info!("Scheduler started with {} timer(s)", timers.len());

        tokio::select! {
            _ = shutdown => info!("Shutdown requested, stopping scheduler"),
            _ = async {
                while let Some(result) = timers.join_next().await {
                    if let Err(e) = result {
                        error!("Scheduler timer stopped unexpectedly: {}", e);
                    }
                }
            } => {}
        }

        timers.abort_all();
        while timers.join_next().await.is_some() {}
        info!("Scheduler stopped");
    }
}

async fn run_timer(runner: Arc<dyn BackupRunner>, target: Target, poll_interval: Duration) {
    let interval = target.backup.schedule.interval();
    let mut next_run = Instant::now() + interval;

    loop {
        tokio::time::sleep(poll_interval).await;
        let now = Instant::now();
        if now < next_run {
            continue;
        }

        // Cadence follows the tick that started the run, not its duration
        next_run = now + interval;
        info!("Running scheduled backup for target: {}", target.id);
        if let Err(e) = runner.run_backup(&target).await {
            error!("Scheduled backup failed for target '{}': {:#}", target.id, e);
        }
    }
}

/// Schedule `targets` (or only `target_id`) until Ctrl-C
pub async fn schedule_backups(
    runner: Arc<dyn BackupRunner>,
    targets: &[Target],
    target_id: Option<&str>,
) -> Result<()> {
    let selected = select_targets(targets, target_id)?;

    Scheduler::new(runner)
        .run_until(selected, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    Ok(())
}
