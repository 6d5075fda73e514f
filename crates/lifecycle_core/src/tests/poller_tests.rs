use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use shared::{
    domain::{AssetId, LifecycleStatus},
    error::LifecycleError,
    protocol::ProgressSnapshot,
};
use status_registry::{StatusRegistry, StatusWriter};

use super::{poll_once, ProgressPoller};
use crate::fakes::TestInstaller;

const PERIOD: Duration = Duration::from_millis(1500);

fn snapshot(percent: f64) -> ProgressSnapshot {
    ProgressSnapshot {
        percent: Some(percent),
        transferred_bytes: 420,
        total_bytes: 1000,
        eta: Some(Duration::from_secs(30)),
    }
}

struct Rig {
    registry: StatusRegistry,
    installer: Arc<TestInstaller>,
    writer: Arc<StatusWriter>,
    cache: Arc<Mutex<ProgressSnapshot>>,
}

impl Rig {
    fn new(status: LifecycleStatus) -> Self {
        let registry = StatusRegistry::new();
        let writer = Arc::new(registry.claim(AssetId::from("AppZ")).unwrap());
        writer.set_status(status, None);
        Self {
            registry,
            installer: Arc::new(TestInstaller::not_installed()),
            writer,
            cache: Arc::new(Mutex::new(ProgressSnapshot::default())),
        }
    }

    fn poller(&self) -> ProgressPoller {
        ProgressPoller::new(
            AssetId::from("AppZ"),
            self.installer.clone(),
            Arc::clone(&self.writer),
            Arc::clone(&self.cache),
            PERIOD,
        )
    }

    fn cached(&self) -> ProgressSnapshot {
        self.cache.lock().unwrap().clone()
    }

    fn registry_progress(&self) -> Option<f64> {
        self.registry
            .entry(&AssetId::from("AppZ"))
            .and_then(|entry| entry.progress)
    }
}

#[tokio::test]
async fn missing_snapshot_keeps_cache_and_registry() {
    let rig = Rig::new(LifecycleStatus::Installing);
    *rig.cache.lock().unwrap() = snapshot(0.1);
    rig.writer.set_progress(Some(0.1));
    rig.installer.push_progress(None).await;

    let result = poll_once(
        &AssetId::from("AppZ"),
        rig.installer.as_ref(),
        &rig.writer,
        &rig.cache,
    )
    .await;

    assert!(matches!(result, Err(LifecycleError::StaleProgress(_))));
    assert_eq!(rig.cached(), snapshot(0.1));
    assert_eq!(rig.registry_progress(), Some(0.1));
}

#[tokio::test]
async fn fresh_snapshot_replaces_cache_and_updates_registry() {
    let rig = Rig::new(LifecycleStatus::Updating);
    rig.installer.push_progress(Some(snapshot(0.42))).await;

    let percent = poll_once(
        &AssetId::from("AppZ"),
        rig.installer.as_ref(),
        &rig.writer,
        &rig.cache,
    )
    .await
    .unwrap();

    assert_eq!(percent, Some(0.42));
    assert_eq!(rig.cached(), snapshot(0.42));
    assert_eq!(rig.registry_progress(), Some(0.42));
    assert_eq!(
        rig.registry.get_status(&AssetId::from("AppZ")),
        Some(LifecycleStatus::Updating)
    );
}

#[tokio::test(start_paused = true)]
async fn stale_tick_then_fresh_tick() {
    let rig = Rig::new(LifecycleStatus::Installing);
    rig.installer.push_progress(None).await;
    rig.installer.push_progress(Some(snapshot(0.42))).await;
    let poller = rig.poller();
    let mut events = rig.registry.subscribe();

    poller.sync(LifecycleStatus::Installing);
    assert!(poller.is_running());

    tokio::time::sleep(Duration::from_millis(1600)).await;
    assert_eq!(rig.installer.progress_polls().await, 1);
    assert_eq!(rig.cached(), ProgressSnapshot::default());
    assert!(events.try_recv().is_err());

    tokio::time::sleep(PERIOD).await;
    assert_eq!(rig.installer.progress_polls().await, 2);
    assert_eq!(rig.cached().percent, Some(0.42));
    let event = events.try_recv().unwrap();
    assert_eq!(event.status, LifecycleStatus::Installing);
    assert_eq!(event.progress, Some(0.42));

    poller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn sync_stops_polling_outside_polling_statuses() {
    let rig = Rig::new(LifecycleStatus::Repairing);
    let poller = rig.poller();

    poller.sync(LifecycleStatus::Repairing);
    assert!(poller.is_running());

    rig.writer.set_status(LifecycleStatus::Idle, None);
    poller.sync(LifecycleStatus::Idle);
    assert!(!poller.is_running());

    tokio::time::sleep(PERIOD * 4).await;
    assert_eq!(rig.installer.progress_polls().await, 0);
}

#[tokio::test(start_paused = true)]
async fn loop_exits_once_status_leaves_polling_set() {
    let rig = Rig::new(LifecycleStatus::Updating);
    let poller = rig.poller();
    poller.sync(LifecycleStatus::Updating);

    tokio::time::sleep(Duration::from_millis(1600)).await;
    assert_eq!(rig.installer.progress_polls().await, 1);

    // Written behind the poller's back: the next tick notices and ends the loop.
    rig.writer.set_status(LifecycleStatus::Playing, None);
    tokio::time::sleep(PERIOD).await;
    tokio::task::yield_now().await;

    assert!(!poller.is_running());
    assert_eq!(rig.installer.progress_polls().await, 1);
}

#[tokio::test(start_paused = true)]
async fn starting_twice_keeps_a_single_loop() {
    let rig = Rig::new(LifecycleStatus::Installing);
    let poller = rig.poller();

    poller.sync(LifecycleStatus::Installing);
    poller.sync(LifecycleStatus::Updating);

    tokio::time::sleep(Duration::from_millis(1600)).await;
    assert_eq!(rig.installer.progress_polls().await, 1);
    poller.shutdown().await;
    assert!(!poller.is_running());
}

#[tokio::test(start_paused = true)]
async fn shutdown_reaps_loops_stopped_earlier() {
    let rig = Rig::new(LifecycleStatus::Installing);
    let poller = rig.poller();

    poller.sync(LifecycleStatus::Installing);
    poller.sync(LifecycleStatus::Idle);
    poller.sync(LifecycleStatus::Updating);
    poller.stop();

    poller.shutdown().await;
    drop(poller);

    assert_eq!(Arc::strong_count(&rig.writer), 1);
}
