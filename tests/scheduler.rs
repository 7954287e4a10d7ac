//! Periodic refresh loop: ticking, fault isolation, manual trigger and shutdown.

mod helpers;

use auction_pulse::refresh::RefreshScheduler;
use auction_pulse::services::Service;
use auction_pulse::services::scheduler::SchedulerService;
use auction_pulse::state::{ServiceStatus, ServiceStatusRegistry};
use helpers::{Harness, Mode, harness};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, broadcast};
use tokio::task::JoinHandle;

struct Running {
    handle: JoinHandle<()>,
    shutdown_tx: broadcast::Sender<()>,
    trigger: Arc<Notify>,
}

fn start(h: &Harness, interval: Duration) -> Running {
    let trigger = Arc::new(Notify::new());
    let scheduler = Arc::new(RefreshScheduler::new(
        h.pipeline.clone(),
        interval,
        trigger.clone(),
    ));
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(async move { scheduler.run(shutdown_rx).await });
    Running {
        handle,
        shutdown_tx,
        trigger,
    }
}

async fn stop(running: Running) {
    running.shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(10), running.handle)
        .await
        .expect("scheduler did not stop")
        .unwrap();
}

/// Poll until the source has seen at least `n` cycles.
async fn wait_for_cycles(h: &Harness, n: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while h.source.cycles() < n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("only {} of {n} cycles ran", h.source.cycles()));
}

#[tokio::test]
async fn warm_up_refreshes_synchronously() {
    let h = harness(Mode::Healthy);
    let scheduler = RefreshScheduler::new(
        h.pipeline.clone(),
        Duration::from_secs(300),
        Arc::new(Notify::new()),
    );

    assert!(scheduler.warm_up().await.is_success());
    assert_eq!(h.source.cycles(), 1);
    assert!(h.cache_file.exists());
}

#[tokio::test]
async fn first_tick_waits_one_interval() {
    let h = harness(Mode::Healthy);
    let running = start(&h, Duration::from_secs(3600));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.source.cycles(), 0);

    stop(running).await;
}

#[tokio::test]
async fn ticks_repeat_every_interval() {
    let h = harness(Mode::Healthy);
    let running = start(&h, Duration::from_millis(50));

    wait_for_cycles(&h, 3).await;
    assert!(h.pipeline.health().last_success.is_some());

    stop(running).await;
}

#[tokio::test]
async fn failed_ticks_do_not_stop_the_loop() {
    let h = harness(Mode::Down);
    let running = start(&h, Duration::from_millis(50));

    wait_for_cycles(&h, 3).await;
    let health = h.pipeline.health();
    assert!(health.last_success.is_none());
    assert!(health.consecutive_failures >= 2);

    // Recovery on a later tick.
    h.source.set_mode(Mode::Healthy);
    let seen = h.source.cycles();
    wait_for_cycles(&h, seen + 2).await;
    assert!(h.pipeline.health().last_success.is_some());

    stop(running).await;
}

#[tokio::test]
async fn manual_trigger_runs_an_immediate_tick() {
    let h = harness(Mode::Healthy);
    let running = start(&h, Duration::from_secs(3600));

    running.trigger.notify_one();
    wait_for_cycles(&h, 1).await;
    assert!(h.pipeline.store().lookup().await.is_some());

    stop(running).await;
}

#[tokio::test]
async fn shutdown_interrupts_a_slow_refresh() {
    let h = harness(Mode::Slow(Duration::from_secs(1)));
    let running = start(&h, Duration::from_millis(20));

    wait_for_cycles(&h, 1).await;
    let started = std::time::Instant::now();
    stop(running).await;
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn warmed_scheduler_is_hosted_by_the_scheduler_service() {
    let h = harness(Mode::Healthy);
    let scheduler = Arc::new(RefreshScheduler::new(
        h.pipeline.clone(),
        Duration::from_secs(3600),
        Arc::new(Notify::new()),
    ));
    assert!(scheduler.warm_up().await.is_success());

    let statuses = ServiceStatusRegistry::new();
    let mut service = SchedulerService::new(scheduler, statuses.clone());
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(async move { service.run(shutdown_rx).await });

    tokio::time::timeout(Duration::from_secs(5), async {
        while statuses.all().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("scheduler service never reported a status");
    assert_eq!(statuses.all()[0].1, ServiceStatus::Active);

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
    assert_eq!(statuses.all()[0].1, ServiceStatus::Disabled);
    assert_eq!(h.source.cycles(), 1);
}
