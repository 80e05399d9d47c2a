//! Maintenance scheduler
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Version: 0.3.0-alpha
//! Date: 2025-07-02
//!
//! Runs the broadcast expiry sweep, the retention purge and the presence
//! offline check on independent intervals until cancelled.

use std::{future::Future, sync::Arc, time::Duration};

use beacon_common::{config::BeaconConfig, DiscoveryError, Result};
use metrics::counter;
use tokio::{task::JoinHandle, time};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::service::DiscoveryService;

/// Counts from one pass of every maintenance job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub broadcasts_swept: u64,
    pub broadcasts_purged: u64,
    pub users_marked_offline: u64,
}

/// Interval of each job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceSchedule {
    pub sweep: Duration,
    pub purge: Duration,
    pub presence: Duration,
}

impl From<&BeaconConfig> for MaintenanceSchedule {
    fn from(config: &BeaconConfig) -> Self {
        Self {
            sweep: Duration::from_secs(config.broadcast.sweep_interval_s),
            purge: Duration::from_secs(config.broadcast.purge_interval_s),
            presence: Duration::from_secs(config.presence.offline_check_interval_s.max(1)),
        }
    }
}

#[derive(Debug)]
pub struct MaintenanceScheduler {
    service: Arc<DiscoveryService>,
    schedule: MaintenanceSchedule,
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl MaintenanceScheduler {
    pub fn new(service: Arc<DiscoveryService>, schedule: MaintenanceSchedule) -> Self {
        Self {
            service,
            schedule,
            token: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    /// Token that stops every job when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.handles.is_empty()
    }

    #[instrument(level = "debug", skip(self))]
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(DiscoveryError::Internal("scheduler already running".into()));
        }

        let service = self.service.clone();
        self.handles.push(spawn_job("broadcast sweep", self.schedule.sweep, self.token.clone(), move || {
            let service = service.clone();
            async move { service.broadcasts().sweep_expired().await }
        }));

        let service = self.service.clone();
        self.handles.push(spawn_job("broadcast purge", self.schedule.purge, self.token.clone(), move || {
            let service = service.clone();
            async move { service.broadcasts().purge_expired_rows().await }
        }));

        let service = self.service.clone();
        self.handles.push(spawn_job("presence offline check", self.schedule.presence, self.token.clone(), move || {
            let service = service.clone();
            async move { service.presence().expire_stale().await }
        }));

        info!("⏰ Maintenance scheduler started");
        Ok(())
    }

    /// Cancel all jobs and wait for them to finish
    #[instrument(level = "debug", skip(self))]
    pub async fn stop(&mut self) {
        self.token.cancel();
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                error!("❌ Maintenance job ended abnormally: {}", e);
            }
        }
        info!("🛑 Maintenance scheduler stopped");
    }
}

impl Drop for MaintenanceScheduler {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

fn spawn_job<F, Fut>(name: &'static str, period: Duration, token: CancellationToken, job: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<u64>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        // first tick completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    match job().await {
                        Ok(count) => info!("⏰ {} affected {} rows", name, count),
                        Err(e) => {
                            counter!("beacon_maintenance_failures_total", "job" => name, "kind" => e.kind())
                                .increment(1);
                            error!("❌ {} failed: {}", name, e);
                        }
                    }
                }
            }
        }
    })
}

/// Run every maintenance job once, in order
#[instrument(level = "debug", skip(service))]
pub async fn run_once(service: &DiscoveryService) -> Result<MaintenanceReport> {
    Ok(MaintenanceReport {
        broadcasts_swept: service.broadcasts().sweep_expired().await?,
        broadcasts_purged: service.broadcasts().purge_expired_rows().await?,
        users_marked_offline: service.presence().expire_stale().await?,
    })
}
