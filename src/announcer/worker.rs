//! Background announcement worker.
//!
//! Polls pending announcements on an interval. Each referral is handed to
//! the announcer and then marked announced by id, so a referral that fails
//! delivery stays pending and is retried on the next pass.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::Announcer;
use crate::service::{ReferralService, ServiceError};

/// Handle to a running announcement worker. Dropping it stops the worker.
pub struct WorkerHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Signal the worker to stop.
    pub fn stop(&self) {
        let _ = self.cancel.send(true);
    }

    /// Signal the worker to stop and wait for it to exit.
    pub async fn shutdown(self) {
        self.stop();
        if let Err(e) = self.task.await {
            warn!(error = %e, "announcement worker exited abnormally");
        }
    }
}

/// Announces verified referrals and marks them announced.
pub struct AnnouncementWorker {
    service: Arc<ReferralService>,
    announcer: Arc<dyn Announcer>,
    interval: Duration,
}

impl AnnouncementWorker {
    pub fn new(service: Arc<ReferralService>, announcer: Arc<dyn Announcer>) -> Self {
        Self {
            service,
            announcer,
            interval: Duration::from_secs(60),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run a single pass. Returns how many referrals were announced.
    pub async fn run_once(&self) -> Result<usize, ServiceError> {
        let pending = self.service.pending_announcements().await?;
        if pending.is_empty() {
            return Ok(0);
        }
        debug!(count = pending.len(), "announcing pending referrals");

        let mut announced = 0;
        for referral in pending {
            if let Err(e) = self.announcer.announce(&referral).await {
                warn!(
                    id = %referral.id,
                    announcer = self.announcer.name(),
                    error = %e,
                    "announcement failed, will retry"
                );
                continue;
            }

            match self.service.mark_announced_by_id(&referral.id).await {
                Ok(_) => announced += 1,
                // Marked concurrently through the API.
                Err(ServiceError::NotFound(message)) => {
                    debug!(id = %referral.id, %message, "referral no longer pending");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(announced)
    }

    /// Spawn the polling loop.
    pub fn spawn(self) -> WorkerHandle {
        let (cancel_tx, mut cancel_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            info!(
                interval_secs = self.interval.as_secs(),
                announcer = self.announcer.name(),
                "announcement worker started"
            );

            loop {
                tokio::select! {
                    _ = tokio::time::sleep(self.interval) => {
                        match self.run_once().await {
                            Ok(0) => {}
                            Ok(count) => info!(count, "referrals announced"),
                            Err(e) => error!(error = %e, "announcement pass failed"),
                        }
                    }
                    changed = cancel_rx.changed() => {
                        // A dropped handle closes the channel and also stops the worker.
                        if changed.is_err() || *cancel_rx.borrow() {
                            info!("announcement worker stopped");
                            break;
                        }
                    }
                }
            }
        });

        WorkerHandle {
            cancel: cancel_tx,
            task,
        }
    }
}
