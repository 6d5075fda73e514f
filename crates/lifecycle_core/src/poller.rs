//! Recurring progress poll, alive only while the asset sits in a polling status.

use std::{
    sync::{Arc, Mutex, Weak},
    time::Duration,
};

use shared::{
    domain::{AssetId, LifecycleStatus},
    error::LifecycleError,
    protocol::ProgressSnapshot,
};
use status_registry::StatusWriter;
use tokio::{
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, warn};

use crate::{lock, services::Installer};

pub struct ProgressPoller {
    asset_id: AssetId,
    installer: Arc<dyn Installer>,
    writer: Arc<StatusWriter>,
    cache: Arc<Mutex<ProgressSnapshot>>,
    period: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
    /// Aborted loops not yet reaped; `shutdown` awaits them.
    retired: Mutex<Vec<JoinHandle<()>>>,
}

impl ProgressPoller {
    pub fn new(
        asset_id: AssetId,
        installer: Arc<dyn Installer>,
        writer: Arc<StatusWriter>,
        cache: Arc<Mutex<ProgressSnapshot>>,
        period: Duration,
    ) -> Self {
        Self {
            asset_id,
            installer,
            writer,
            cache,
            period,
            task: Mutex::new(None),
            retired: Mutex::new(Vec::new()),
        }
    }

    /// Starts or stops the loop to match `status`.
    pub fn sync(&self, status: LifecycleStatus) {
        if status.polls_progress() {
            self.start();
        } else {
            self.stop();
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.task)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    fn start(&self) {
        let mut task = lock(&self.task);
        if task.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let asset_id = self.asset_id.clone();
        let installer = Arc::clone(&self.installer);
        let writer = Arc::downgrade(&self.writer);
        let cache = Arc::clone(&self.cache);
        let period = self.period;

        debug!(asset = %asset_id, ?period, "poller: started");
        *task = Some(tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                let Some(writer) = Weak::upgrade(&writer) else {
                    break;
                };
                if !writer.current().polls_progress() {
                    debug!(asset = %asset_id, "poller: status left polling set");
                    break;
                }
                match poll_once(&asset_id, installer.as_ref(), &writer, &cache).await {
                    Ok(percent) => debug!(asset = %asset_id, ?percent, "poller: progress"),
                    Err(LifecycleError::StaleProgress(_)) => {
                        debug!(asset = %asset_id, "poller: no snapshot, keeping cached progress")
                    }
                    Err(err) => warn!(asset = %asset_id, error = %err, "poller: tick failed"),
                }
            }
        }));
    }

    pub fn stop(&self) {
        let task = lock(&self.task).take();
        if let Some(task) = task {
            task.abort();
            let mut retired = lock(&self.retired);
            retired.retain(|task| !task.is_finished());
            retired.push(task);
            debug!(asset = %self.asset_id, "poller: stopped");
        }
    }

    /// Stops the loop and waits until every task it ever spawned has been dropped.
    pub async fn shutdown(&self) {
        self.stop();
        let retired = std::mem::take(&mut *lock(&self.retired));
        for task in retired {
            let _ = task.await;
        }
        debug!(asset = %self.asset_id, "poller: shut down");
    }
}

impl Drop for ProgressPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One poll tick. A missing snapshot leaves both the cache and the registry untouched.
pub(crate) async fn poll_once(
    asset_id: &AssetId,
    installer: &dyn Installer,
    writer: &StatusWriter,
    cache: &Mutex<ProgressSnapshot>,
) -> Result<Option<f64>, LifecycleError> {
    let snapshot = installer
        .fetch_progress(asset_id)
        .await
        .map_err(|err| LifecycleError::subsystem("fetch_progress", asset_id, err))?
        .ok_or_else(|| LifecycleError::StaleProgress(asset_id.clone()))?;

    let percent = snapshot.percent_complete();
    *lock(cache) = snapshot;
    writer.set_progress(percent);
    Ok(percent)
}

#[cfg(test)]
#[path = "tests/poller_tests.rs"]
mod tests;
